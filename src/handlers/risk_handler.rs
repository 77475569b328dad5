//! handlers/risk_handler.rs
use actix_web::{web, HttpRequest, HttpResponse};

use crate::auth::{validate_admin_auth, validate_cron_auth};
use crate::config::app_config::AuthSecrets;
use crate::error::ControlError;
use crate::handlers::{parse_json, parse_query};
use crate::models::risk_model::{
    RankOptions, RiskFlagsUpdate, RiskLevel, RiskQueueQuery, DEFAULT_QUEUE_LIMIT, MAX_QUEUE_LIMIT,
};
use crate::services::risk_service::RiskService;

/// GET /admin/risk-queue?level=&limit=&includeTerminal=
pub async fn risk_queue_endpoint(
    req: HttpRequest,
    secrets: web::Data<AuthSecrets>,
    risk_service: web::Data<RiskService>,
) -> Result<HttpResponse, ControlError> {
    validate_cron_auth(&req, &secrets)?;
    let query: RiskQueueQuery = parse_query(&req)?;
    let opts = parse_queue_query(&query)?;
    let queue = risk_service.risk_queue(&opts).await?;
    Ok(HttpResponse::Ok().json(queue))
}

/// GET /admin/risk-flags
pub async fn get_risk_flags_endpoint(
    req: HttpRequest,
    secrets: web::Data<AuthSecrets>,
    risk_service: web::Data<RiskService>,
) -> Result<HttpResponse, ControlError> {
    validate_admin_auth(&req, &secrets)?;
    let flags = risk_service.get_flags().await?;
    Ok(HttpResponse::Ok().json(flags))
}

/// PUT /admin/risk-flags
pub async fn put_risk_flags_endpoint(
    req: HttpRequest,
    secrets: web::Data<AuthSecrets>,
    risk_service: web::Data<RiskService>,
    body: web::Bytes,
) -> Result<HttpResponse, ControlError> {
    let actor = validate_admin_auth(&req, &secrets)?;
    let update: RiskFlagsUpdate = parse_json(&body)?;
    let flags = risk_service.update_flags(&actor.name, update).await?;
    Ok(HttpResponse::Ok().json(flags))
}

fn parse_queue_query(query: &RiskQueueQuery) -> Result<RankOptions, ControlError> {
    let level = match query.level.as_deref().filter(|l| !l.is_empty()) {
        Some(raw) => Some(
            RiskLevel::parse(raw)
                .ok_or_else(|| ControlError::Validation(format!("nivel desconocido: {}", raw)))?,
        ),
        None => None,
    };
    Ok(RankOptions {
        level,
        limit: query
            .limit
            .unwrap_or(DEFAULT_QUEUE_LIMIT)
            .clamp(1, MAX_QUEUE_LIMIT),
        include_terminal: query.include_terminal.unwrap_or(false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_query_defaults_and_caps() {
        let opts = parse_queue_query(&RiskQueueQuery {
            level: None,
            limit: None,
            include_terminal: None,
        })
        .unwrap();
        assert_eq!(opts.limit, DEFAULT_QUEUE_LIMIT);
        assert!(!opts.include_terminal);

        let opts = parse_queue_query(&RiskQueueQuery {
            level: Some("high".into()),
            limit: Some(10_000),
            include_terminal: Some(true),
        })
        .unwrap();
        assert_eq!(opts.level, Some(RiskLevel::High));
        assert_eq!(opts.limit, MAX_QUEUE_LIMIT);
    }

    #[test]
    fn unknown_level_is_rejected() {
        let err = parse_queue_query(&RiskQueueQuery {
            level: Some("CRITICAL".into()),
            limit: None,
            include_terminal: None,
        });
        assert!(matches!(err, Err(ControlError::Validation(_))));
    }
}
