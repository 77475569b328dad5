//! handlers/rollout_handler.rs
use actix_web::{web, HttpRequest, HttpResponse};

use crate::auth::{validate_admin_auth, validate_cron_auth};
use crate::config::app_config::AuthSecrets;
use crate::error::ControlError;
use crate::handlers::parse_json;
use crate::models::rollout_model::RolloutControlRequest;
use crate::services::rollout_service::RolloutService;

/// GET /admin/rollout-config
pub async fn rollout_config_endpoint(
    req: HttpRequest,
    secrets: web::Data<AuthSecrets>,
    rollout_service: web::Data<RolloutService>,
) -> Result<HttpResponse, ControlError> {
    validate_cron_auth(&req, &secrets)?;
    let config = rollout_service.get_config().await?;
    Ok(HttpResponse::Ok().json(config))
}

/// POST /admin/rollout-control
/// Solo cambia configuración; nunca dispara envíos.
pub async fn rollout_control_endpoint(
    req: HttpRequest,
    secrets: web::Data<AuthSecrets>,
    rollout_service: web::Data<RolloutService>,
    body: web::Bytes,
) -> Result<HttpResponse, ControlError> {
    let actor = validate_admin_auth(&req, &secrets)?;
    let control: RolloutControlRequest = parse_json(&body)?;
    let config = rollout_service.apply_control(&actor.name, control).await?;
    Ok(HttpResponse::Ok().json(config))
}
