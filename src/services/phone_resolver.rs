//! services/phone_resolver.rs
//! Resolución justo-a-tiempo del teléfono de contacto de una guía.
//!
//! El valor vive dentro de `Phone`, que no es `Clone` ni `Serialize` y cuyo
//! `Debug` no muestra el número. Nada aquí guarda el resultado: cada llamada
//! va a la fuente de verdad.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Pool, Sqlite};
use thiserror::Error;


/// Teléfono resuelto. Solo se puede leer con `expose()`.
pub struct Phone(String);

impl Phone {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Phone(<redacted>)")
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no phone on record")]
    NotFound,
    /// Reintentable por el llamador dentro de su propio presupuesto
    #[error("transient fetch error")]
    TransientFetch(#[source] anyhow::Error),
}

/// Fuente de datos de contacto.
#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn fetch_phone(&self, guide_id: &str) -> Result<Option<String>>;
}

#[derive(Clone, Debug)]
pub struct SqliteContactStore {
    db_pool: Pool<Sqlite>,
}

impl SqliteContactStore {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        SqliteContactStore { db_pool }
    }
}

#[async_trait]
impl ContactStore for SqliteContactStore {
    async fn fetch_phone(&self, guide_id: &str) -> Result<Option<String>> {
        let phone: Option<Option<String>> =
            sqlx::query_scalar("SELECT phone FROM guides WHERE guide_id = ?1")
                .bind(guide_id)
                .fetch_optional(&self.db_pool)
                .await
                .context("Fallo al consultar contacto")?;
        Ok(phone.flatten())
    }
}

#[derive(Clone)]
pub struct PhoneResolver {
    store: Arc<dyn ContactStore>,
}

impl PhoneResolver {
    pub fn new(store: Arc<dyn ContactStore>) -> Self {
        PhoneResolver { store }
    }

    pub async fn resolve(&self, guide_id: &str) -> Result<Phone, ResolveError> {
        match self.store.fetch_phone(guide_id).await {
            Ok(Some(raw)) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    Err(ResolveError::NotFound)
                } else {
                    Ok(Phone(trimmed.to_string()))
                }
            }
            Ok(None) => Err(ResolveError::NotFound),
            Err(e) => {
                log::warn!(
                    "(resolve) Falla transitoria consultando contacto de guide_id={}",
                    guide_id
                );
                Err(ResolveError::TransientFetch(e))
            }
        }
    }
}
