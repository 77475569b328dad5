//! services/rate_limit_service.rs
//! Contadores de límite de envío en la base compartida.
//!
//! Cada reserva es un UPDATE condicional (`hits < limit`), así dos workers o
//! dos corridas concurrentes no pueden pasarse del límite.

use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use sqlx::{Pool, Sqlite};

use crate::services::phone_resolver::Phone;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitScope {
    Run,
    Carrier,
    Phone,
}

impl LimitScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitScope::Run => "run",
            LimitScope::Carrier => "carrier",
            LimitScope::Phone => "phone",
        }
    }
}

/// Llave HMAC efímera de una corrida. Vive en memoria solo durante la corrida,
/// así el digest guardado en `rate_counters` no se puede asociar a un número.
pub struct RunKey([u8; 32]);

impl RunKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        RunKey(bytes)
    }

    pub fn phone_key(&self, phone: &Phone) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.0).expect("HMAC acepta llaves de cualquier largo");
        mac.update(phone.expose().as_bytes());
        let digest = mac.finalize().into_bytes();
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

#[derive(Clone, Debug)]
pub struct RateLimiter {
    db_pool: Pool<Sqlite>,
}

impl RateLimiter {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        RateLimiter { db_pool }
    }

    /// Intenta reservar un cupo. `Ok(false)` si el contador ya llegó al límite.
    pub async fn try_acquire(
        &self,
        run_id: &str,
        scope: LimitScope,
        key: &str,
        limit: u32,
    ) -> Result<bool> {
        sqlx::query(
            r#"
            INSERT INTO rate_counters (run_id, scope, counter_key, hits)
            VALUES (?1, ?2, ?3, 0)
            ON CONFLICT (run_id, scope, counter_key) DO NOTHING
            "#,
        )
        .bind(run_id)
        .bind(scope.as_str())
        .bind(key)
        .execute(&self.db_pool)
        .await
        .context("Fallo al crear contador")?;

        let result = sqlx::query(
            r#"
            UPDATE rate_counters
            SET hits = hits + 1
            WHERE run_id = ?1 AND scope = ?2 AND counter_key = ?3 AND hits < ?4
            "#,
        )
        .bind(run_id)
        .bind(scope.as_str())
        .bind(key)
        .bind(i64::from(limit))
        .execute(&self.db_pool)
        .await
        .context("Fallo al incrementar contador")?;

        Ok(result.rows_affected() == 1)
    }

    /// Devuelve un cupo reservado que finalmente no se usó.
    pub async fn release(&self, run_id: &str, scope: LimitScope, key: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE rate_counters
            SET hits = hits - 1
            WHERE run_id = ?1 AND scope = ?2 AND counter_key = ?3 AND hits > 0
            "#,
        )
        .bind(run_id)
        .bind(scope.as_str())
        .bind(key)
        .execute(&self.db_pool)
        .await
        .context("Fallo al liberar contador")?;
        Ok(())
    }

    #[cfg(test)]
    pub async fn current(&self, run_id: &str, scope: LimitScope, key: &str) -> Result<u32> {
        let hits: Option<i64> = sqlx::query_scalar(
            "SELECT hits FROM rate_counters WHERE run_id = ?1 AND scope = ?2 AND counter_key = ?3",
        )
        .bind(run_id)
        .bind(scope.as_str())
        .bind(key)
        .fetch_optional(&self.db_pool)
        .await
        .context("Fallo al leer contador")?;
        Ok(hits.unwrap_or(0).max(0) as u32)
    }

    /// Borra los contadores de una corrida terminada (incluye los digests por teléfono).
    pub async fn clear_run(&self, run_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM rate_counters WHERE run_id = ?1")
            .bind(run_id)
            .execute(&self.db_pool)
            .await
            .context("Fallo al limpiar contadores")?;
        Ok(())
    }
}
