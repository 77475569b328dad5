use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;

use crate::config::app_config::AppConfig;
use crate::logger::init_logger;
use crate::services::audit_service::AuditService;
use crate::services::delivery_service::{DeliveryClient, HttpDeliveryClient};
use crate::services::executor_service::ExecutorService;
use crate::services::guide_service::GuideService;
use crate::services::phone_resolver::{PhoneResolver, SqliteContactStore};
use crate::services::rate_limit_service::RateLimiter;
use crate::services::risk_service::RiskService;
use crate::services::rollout_service::RolloutService;
use crate::services::run_service::RunService;
use crate::services::ticket_service::TicketService;

mod app;
mod auth;
mod config;
mod db;
mod error;
mod handlers;
mod logger;
mod models;
mod pii;
mod services;

#[cfg(test)]
mod tests;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok(); // Cargar .env al inicio
    init_logger();

    let config = AppConfig::from_env().context("Configuración inválida")?;
    let db_pool = db::setup_database(&config.database_url).await?;

    let guide_service = GuideService::new(db_pool.clone());
    let audit_service = AuditService::new(db_pool.clone());
    let rollout_service = RolloutService::new(db_pool.clone());
    let risk_service = RiskService::new(
        db_pool.clone(),
        guide_service.clone(),
        config.risk.clone(),
    );
    let ticket_service = TicketService::new(db_pool.clone(), config.tickets.clone());
    let resolver = PhoneResolver::new(Arc::new(SqliteContactStore::new(db_pool.clone())));

    let delivery: Option<Arc<dyn DeliveryClient>> =
        match HttpDeliveryClient::from_settings(&config.delivery)? {
            Some(client) => Some(Arc::new(client)),
            None => {
                log::warn!("DELIVERY_API_URL no definido: el ejecutor solo simula");
                None
            }
        };

    let executor = ExecutorService::new(
        rollout_service.clone(),
        risk_service.clone(),
        guide_service,
        resolver,
        RateLimiter::new(db_pool.clone()),
        ticket_service.clone(),
        RunService::new(db_pool.clone()),
        delivery,
        config.executor.clone(),
    );

    let secrets = web::Data::new(config.secrets.clone());
    let executor = web::Data::new(executor);
    let risk_service = web::Data::new(risk_service);
    let rollout_service = web::Data::new(rollout_service);
    let ticket_service = web::Data::new(ticket_service);
    let audit_service = web::Data::new(audit_service);

    log::info!(
        "Levantando servidor en {}:{}",
        config.bind_host,
        config.bind_port
    );
    HttpServer::new(move || {
        App::new()
            .app_data(secrets.clone())
            .app_data(executor.clone())
            .app_data(risk_service.clone())
            .app_data(rollout_service.clone())
            .app_data(ticket_service.clone())
            .app_data(audit_service.clone())
            .configure(app::init_app)
    })
    .bind((config.bind_host.as_str(), config.bind_port))?
    .run()
    .await?;
    Ok(())
}
