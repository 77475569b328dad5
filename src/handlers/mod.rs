//! handlers/mod.rs
//! Endpoints HTTP. Cada handler valida el secreto que le corresponde antes
//! de leer query o body, así una petición sin credenciales siempre es 401.
pub mod cron_handler;
pub mod risk_handler;
pub mod rollout_handler;
pub mod status_handler;
pub mod ticket_handler;

use actix_web::{web, HttpRequest};
use serde::de::DeserializeOwned;

use crate::error::ControlError;

pub(crate) fn parse_query<T: DeserializeOwned>(req: &HttpRequest) -> Result<T, ControlError> {
    web::Query::<T>::from_query(req.query_string())
        .map(web::Query::into_inner)
        .map_err(|e| {
            log::warn!("(parse_query) Query rechazada en {}: {}", req.path(), e);
            ControlError::Validation("query inválida".to_string())
        })
}

pub(crate) fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ControlError> {
    serde_json::from_slice(body).map_err(|e| {
        log::warn!("(parse_json) Body rechazado: {}", e);
        ControlError::Validation("cuerpo JSON inválido".to_string())
    })
}
