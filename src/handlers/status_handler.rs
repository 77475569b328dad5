//! handlers/status_handler.rs
//! Salud del ejecutor, vista consolidada para el operador y bitácora.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::auth::{validate_admin_auth, validate_cron_auth};
use crate::config::app_config::AuthSecrets;
use crate::error::ControlError;
use crate::handlers::parse_query;
use crate::models::risk_model::RankOptions;
use crate::models::ticket_model::{TicketFilter, TicketStatus};
use crate::services::audit_service::AuditService;
use crate::services::executor_service::ExecutorService;
use crate::services::risk_service::RiskService;
use crate::services::rollout_service::RolloutService;
use crate::services::ticket_service::TicketService;

const DEFAULT_RUN_HISTORY: u32 = 20;
const MAX_RUN_HISTORY: u32 = 100;
const DEFAULT_AUDIT_PAGE: u32 = 50;
const MAX_AUDIT_PAGE: u32 = 500;
const COMMAND_CENTER_QUEUE: usize = 20;
const COMMAND_CENTER_TICKETS: u32 = 10;
const COMMAND_CENTER_ACTIONS: u32 = 20;

#[derive(Deserialize)]
pub struct LimitQuery {
    limit: Option<u32>,
}

/// GET /health
pub async fn health_endpoint() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

/// GET /admin/executor-status?limit=
pub async fn executor_status_endpoint(
    req: HttpRequest,
    secrets: web::Data<AuthSecrets>,
    executor: web::Data<ExecutorService>,
) -> Result<HttpResponse, ControlError> {
    validate_cron_auth(&req, &secrets)?;
    let query: LimitQuery = parse_query(&req)?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_RUN_HISTORY)
        .clamp(1, MAX_RUN_HISTORY);
    let status = executor.status(limit).await?;
    Ok(HttpResponse::Ok().json(status))
}

/// GET /admin/command-center
/// Junta cola, tickets, acciones recientes y salud en una sola respuesta.
pub async fn command_center_endpoint(
    req: HttpRequest,
    secrets: web::Data<AuthSecrets>,
    risk_service: web::Data<RiskService>,
    ticket_service: web::Data<TicketService>,
    audit_service: web::Data<AuditService>,
    rollout_service: web::Data<RolloutService>,
    executor: web::Data<ExecutorService>,
) -> Result<HttpResponse, ControlError> {
    validate_admin_auth(&req, &secrets)?;

    let queue_opts = RankOptions {
        limit: COMMAND_CENTER_QUEUE,
        ..RankOptions::default()
    };
    let open_filter = TicketFilter {
        status: Some(TicketStatus::Open),
        limit: COMMAND_CENTER_TICKETS,
        ..TicketFilter::default()
    };

    let (queue, counts, open_tickets, actions, rollout, executor_status) = futures::try_join!(
        risk_service.risk_queue(&queue_opts),
        ticket_service.counts(),
        ticket_service.list(&open_filter),
        audit_service.list_recent(COMMAND_CENTER_ACTIONS),
        rollout_service.get_config(),
        executor.status(DEFAULT_RUN_HISTORY),
    )?;

    Ok(HttpResponse::Ok().json(json!({
        "generatedAt": Utc::now(),
        "riskQueue": queue,
        "tickets": {
            "counts": counts,
            "open": open_tickets,
        },
        "recentActions": actions,
        "rollout": rollout,
        "executor": executor_status,
    })))
}

/// GET /admin/audit-log?limit=
pub async fn audit_log_endpoint(
    req: HttpRequest,
    secrets: web::Data<AuthSecrets>,
    audit_service: web::Data<AuditService>,
) -> Result<HttpResponse, ControlError> {
    validate_admin_auth(&req, &secrets)?;
    let query: LimitQuery = parse_query(&req)?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_AUDIT_PAGE)
        .clamp(1, MAX_AUDIT_PAGE);
    let entries = audit_service.list_recent(limit).await?;
    Ok(HttpResponse::Ok().json(json!({ "items": entries })))
}
