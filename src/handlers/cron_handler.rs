//! handlers/cron_handler.rs
use actix_web::{web, HttpRequest, HttpResponse};

use crate::auth::validate_cron_auth;
use crate::config::app_config::AuthSecrets;
use crate::error::ControlError;
use crate::services::executor_service::ExecutorService;

/// POST /cron/run-executor
pub async fn run_executor_endpoint(
    req: HttpRequest,
    secrets: web::Data<AuthSecrets>,
    executor: web::Data<ExecutorService>,
) -> Result<HttpResponse, ControlError> {
    let actor = validate_cron_auth(&req, &secrets)?;
    log::info!("(run_executor_endpoint) Corrida solicitada por {}", actor.name);

    let summary = executor.run().await?;
    Ok(HttpResponse::Ok().json(summary))
}
