//! handlers/ticket_handler.rs
use actix_web::{web, HttpRequest, HttpResponse};

use crate::auth::{validate_admin_auth, validate_cron_auth};
use crate::config::app_config::AuthSecrets;
use crate::error::ControlError;
use crate::handlers::{parse_json, parse_query};
use crate::models::ticket_model::{TicketListQuery, TicketPatchRequest};
use crate::services::ticket_service::{parse_filter, TicketService};

/// GET /admin/tickets?status=&trigger=&priority=&limit=&offset=
pub async fn list_tickets_endpoint(
    req: HttpRequest,
    secrets: web::Data<AuthSecrets>,
    ticket_service: web::Data<TicketService>,
) -> Result<HttpResponse, ControlError> {
    validate_cron_auth(&req, &secrets)?;
    let query: TicketListQuery = parse_query(&req)?;
    let filter = parse_filter(&query)?;
    let page = ticket_service.list(&filter).await?;
    Ok(HttpResponse::Ok().json(page))
}

/// GET /admin/tickets/{id}
/// Lectura: mismo secreto que el listado.
pub async fn get_ticket_endpoint(
    req: HttpRequest,
    secrets: web::Data<AuthSecrets>,
    ticket_service: web::Data<TicketService>,
    path: web::Path<String>,
) -> Result<HttpResponse, ControlError> {
    validate_cron_auth(&req, &secrets)?;
    let ticket = ticket_service.get(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ticket))
}

/// PATCH /admin/tickets/{id}
pub async fn patch_ticket_endpoint(
    req: HttpRequest,
    secrets: web::Data<AuthSecrets>,
    ticket_service: web::Data<TicketService>,
    path: web::Path<String>,
    body: web::Bytes,
) -> Result<HttpResponse, ControlError> {
    let actor = validate_admin_auth(&req, &secrets)?;
    let patch: TicketPatchRequest = parse_json(&body)?;
    let ticket = ticket_service
        .patch(&actor.name, &path.into_inner(), patch)
        .await?;
    Ok(HttpResponse::Ok().json(ticket))
}
