//! auth.rs
//! Verificación de los dos secretos compartidos (CRON y ADMIN).
//!
//! Ambos lados se pasan por SHA-256 antes de comparar en tiempo constante,
//! así la diferencia de largo tampoco corta antes la comparación.

use actix_web::HttpRequest;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::config::app_config::AuthSecrets;
use crate::error::ControlError;

pub const ACTOR_HEADER: &str = "X-Admin-Actor";
const DEFAULT_ADMIN_ACTOR: &str = "admin";
const CRON_ACTOR: &str = "cron";
const MAX_ACTOR_LEN: usize = 64;

/// Quién hizo la petición. `name` termina en la bitácora de auditoría.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub name: String,
}

pub fn validate_admin_auth(
    req: &HttpRequest,
    secrets: &AuthSecrets,
) -> Result<Actor, ControlError> {
    let token = bearer_token(req)?;
    if !secret_matches(token, &secrets.admin_secret) {
        log::warn!("(validate_admin_auth) Credencial rechazada en {}", req.path());
        return Err(ControlError::InvalidCredentials);
    }
    let name = req
        .headers()
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(sanitize_actor)
        .unwrap_or_else(|| DEFAULT_ADMIN_ACTOR.to_string());
    Ok(Actor { name })
}

pub fn validate_cron_auth(req: &HttpRequest, secrets: &AuthSecrets) -> Result<Actor, ControlError> {
    let token = bearer_token(req)?;
    if !secret_matches(token, &secrets.cron_secret) {
        log::warn!("(validate_cron_auth) Credencial rechazada en {}", req.path());
        return Err(ControlError::InvalidCredentials);
    }
    Ok(Actor {
        name: CRON_ACTOR.to_string(),
    })
}

fn bearer_token(req: &HttpRequest) -> Result<&str, ControlError> {
    let header = req
        .headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ControlError::Unauthenticated)?;

    let (scheme, token) = header
        .split_once(' ')
        .ok_or(ControlError::Unauthenticated)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(ControlError::Unauthenticated);
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(ControlError::Unauthenticated);
    }
    Ok(token)
}

fn secret_matches(candidate: &str, expected: &str) -> bool {
    let a = Sha256::digest(candidate.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.as_slice().ct_eq(b.as_slice()).into()
}

/// Deja solo `[A-Za-z0-9._@-]`, máximo 64 caracteres. `None` si queda vacío.
fn sanitize_actor(raw: &str) -> Option<String> {
    let clean: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '@' | '-'))
        .take(MAX_ACTOR_LEN)
        .collect();
    (!clean.is_empty()).then_some(clean)
}
