//! app.rs
//! Tabla de rutas. Cada ruta conocida responde 405 ante un método distinto.
use actix_web::web;

use crate::error::method_not_allowed;
use crate::handlers::{
    cron_handler, risk_handler, rollout_handler, status_handler, ticket_handler,
};

pub fn init_app(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/health")
            .route(web::get().to(status_handler::health_endpoint))
            .default_service(web::to(method_not_allowed)),
    )
    .service(
        web::resource("/cron/run-executor")
            .route(web::post().to(cron_handler::run_executor_endpoint))
            .default_service(web::to(method_not_allowed)),
    )
    .service(
        web::scope("/admin")
            .service(
                web::resource("/risk-queue")
                    .route(web::get().to(risk_handler::risk_queue_endpoint))
                    .default_service(web::to(method_not_allowed)),
            )
            .service(
                web::resource("/risk-flags")
                    .route(web::get().to(risk_handler::get_risk_flags_endpoint))
                    .route(web::put().to(risk_handler::put_risk_flags_endpoint))
                    .default_service(web::to(method_not_allowed)),
            )
            .service(
                web::resource("/rollout-config")
                    .route(web::get().to(rollout_handler::rollout_config_endpoint))
                    .default_service(web::to(method_not_allowed)),
            )
            .service(
                web::resource("/rollout-control")
                    .route(web::post().to(rollout_handler::rollout_control_endpoint))
                    .default_service(web::to(method_not_allowed)),
            )
            .service(
                web::resource("/tickets")
                    .route(web::get().to(ticket_handler::list_tickets_endpoint))
                    .default_service(web::to(method_not_allowed)),
            )
            .service(
                web::resource("/tickets/{id}")
                    .route(web::get().to(ticket_handler::get_ticket_endpoint))
                    .route(web::patch().to(ticket_handler::patch_ticket_endpoint))
                    .default_service(web::to(method_not_allowed)),
            )
            .service(
                web::resource("/executor-status")
                    .route(web::get().to(status_handler::executor_status_endpoint))
                    .default_service(web::to(method_not_allowed)),
            )
            .service(
                web::resource("/command-center")
                    .route(web::get().to(status_handler::command_center_endpoint))
                    .default_service(web::to(method_not_allowed)),
            )
            .service(
                web::resource("/audit-log")
                    .route(web::get().to(status_handler::audit_log_endpoint))
                    .default_service(web::to(method_not_allowed)),
            ),
    );
}
