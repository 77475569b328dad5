//! error.rs
//! Taxonomía de errores expuesta por HTTP.
//!
//! Los servicios trabajan con `anyhow::Result`; los handlers convierten a
//! `ControlError`, que decide el código HTTP. Ningún cuerpo de error incluye
//! detalles internos ni datos de la guía.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    /// Falta el header Authorization o no tiene forma `Bearer <token>`
    #[error("unauthenticated")]
    Unauthenticated,

    /// El token no coincide con el secreto configurado
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ResponseError for ControlError {
    fn status_code(&self) -> StatusCode {
        match self {
            ControlError::Unauthenticated | ControlError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            ControlError::Validation(_) | ControlError::InvalidAction(_) => {
                StatusCode::BAD_REQUEST
            }
            ControlError::NotFound(_) => StatusCode::NOT_FOUND,
            ControlError::InvalidTransition { .. } => StatusCode::CONFLICT,
            ControlError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = match self {
            // Mismo cuerpo para ambos casos: no se revela cuál secreto falló
            ControlError::Unauthenticated | ControlError::InvalidCredentials => {
                json!({ "error": "unauthorized" })
            }
            ControlError::Validation(msg) => json!({ "error": "validation_error", "message": msg }),
            ControlError::InvalidAction(action) => {
                json!({ "error": "invalid_action", "message": format!("unknown action '{}'", action) })
            }
            ControlError::NotFound(what) => json!({ "error": "not_found", "message": what }),
            ControlError::InvalidTransition { from, to } => json!({
                "error": "invalid_transition",
                "message": format!("cannot move from {} to {}", from, to)
            }),
            ControlError::Internal(e) => {
                log::error!("(error_response) Error interno: {:#}", e);
                json!({ "error": "internal error" })
            }
        };
        HttpResponse::build(status).json(body)
    }
}

/// Respuesta 405 para rutas conocidas con método incorrecto.
pub async fn method_not_allowed() -> HttpResponse {
    HttpResponse::MethodNotAllowed().json(json!({ "error": "method not allowed" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn auth_failures_share_status() {
        assert_eq!(
            ControlError::Unauthenticated.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ControlError::InvalidCredentials.status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn validation_maps_to_400() {
        let err = ControlError::Validation("perRun must be positive".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ControlError::InvalidAction("explode".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn not_found_maps_to_404() {
        let err = ControlError::NotFound("ticket".into());
        assert_eq!(err.error_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn internal_maps_to_500() {
        let err = ControlError::from(anyhow!("sqlite exploded at /var/db"));
        assert_eq!(
            err.error_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
