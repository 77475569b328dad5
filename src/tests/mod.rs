//! tests/mod.rs
//! Utilidades compartidas por las pruebas: base en memoria, guías de
//! ejemplo y un proveedor de mensajería falso.

mod executor_tests;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};

use crate::config::app_config::{
    AuthSecrets, ExecutorSettings, RiskWeights, TicketThresholds,
};
use crate::db::{run_migrations, ts};
use crate::services::delivery_service::{DeliveryClient, DeliveryRequest, DeliveryResult};
use crate::services::executor_service::ExecutorService;
use crate::services::guide_service::GuideService;
use crate::services::phone_resolver::{ContactStore, PhoneResolver};
use crate::services::rate_limit_service::RateLimiter;
use crate::services::risk_service::RiskService;
use crate::services::rollout_service::RolloutService;
use crate::services::run_service::RunService;
use crate::services::ticket_service::TicketService;

pub const CRON_SECRET: &str = "test-cron-secret";
pub const ADMIN_SECRET: &str = "test-admin-secret";

/// Una sola conexión: cada conexión nueva a `sqlite::memory:` sería otra base.
pub async fn memory_pool() -> Pool<Sqlite> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("sqlite en memoria");
    run_migrations(&pool).await.expect("migraciones");
    pool
}

pub fn test_secrets() -> AuthSecrets {
    AuthSecrets {
        cron_secret: CRON_SECRET.to_string(),
        admin_secret: ADMIN_SECRET.to_string(),
    }
}

/// Settings con reintentos rápidos para no dormir en las pruebas.
pub fn fast_settings() -> ExecutorSettings {
    ExecutorSettings {
        retry_base_delay: Duration::from_millis(1),
        retry_max_delay: Duration::from_millis(5),
        ..ExecutorSettings::default()
    }
}

pub async fn insert_guide(
    pool: &Pool<Sqlite>,
    guide_id: &str,
    carrier: &str,
    city: &str,
    status: &str,
    days_stuck: i64,
    phone: Option<&str>,
) {
    let last_status_at = Utc::now() - ChronoDuration::days(days_stuck) - ChronoDuration::minutes(5);
    sqlx::query(
        r#"
        INSERT INTO guides (guide_id, carrier, city, status, has_novelty, last_status_at, phone)
        VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6)
        "#,
    )
    .bind(guide_id)
    .bind(carrier)
    .bind(city)
    .bind(status)
    .bind(ts(last_status_at))
    .bind(phone)
    .execute(pool)
    .await
    .expect("insert guide");
}

pub async fn set_rollout(
    pool: &Pool<Sqlite>,
    phase: &str,
    enabled: bool,
    per_run: i64,
    per_phone: Option<i64>,
    per_carrier: Option<i64>,
) {
    sqlx::query(
        r#"
        UPDATE rollout_config
        SET phase = ?1, executor_enabled = ?2, per_run = ?3, per_phone = ?4, per_carrier = ?5
        WHERE id = 1
        "#,
    )
    .bind(phase)
    .bind(enabled)
    .bind(per_run)
    .bind(per_phone)
    .bind(per_carrier)
    .execute(pool)
    .await
    .expect("update rollout");
}

pub async fn set_risky(pool: &Pool<Sqlite>, cities: &[&str], carriers: &[&str]) {
    let cities = serde_json::to_string(cities).expect("json");
    let carriers = serde_json::to_string(carriers).expect("json");
    sqlx::query("UPDATE risk_flags SET risky_cities = ?1, risky_carriers = ?2 WHERE id = 1")
        .bind(cities)
        .bind(carriers)
        .execute(pool)
        .await
        .expect("update risk flags");
}

pub fn risk_service(pool: &Pool<Sqlite>) -> RiskService {
    RiskService::new(
        pool.clone(),
        GuideService::new(pool.clone()),
        RiskWeights::default(),
    )
}

pub fn ticket_service(pool: &Pool<Sqlite>) -> TicketService {
    TicketService::new(pool.clone(), TicketThresholds::default())
}

pub fn executor(
    pool: &Pool<Sqlite>,
    contacts: Arc<dyn ContactStore>,
    delivery: Option<Arc<dyn DeliveryClient>>,
    settings: ExecutorSettings,
) -> ExecutorService {
    ExecutorService::new(
        RolloutService::new(pool.clone()),
        risk_service(pool),
        GuideService::new(pool.clone()),
        PhoneResolver::new(contacts),
        RateLimiter::new(pool.clone()),
        ticket_service(pool),
        RunService::new(pool.clone()),
        delivery,
        settings,
    )
}

/// Proveedor falso: responde por guía (por defecto `Delivered`) y anota
/// qué guías recibió, nunca el número.
#[derive(Default)]
pub struct ScriptedDelivery {
    responses: HashMap<String, DeliveryResult>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedDelivery {
    pub fn with(mut self, guide_id: &str, result: DeliveryResult) -> Self {
        self.responses.insert(guide_id.to_string(), result);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        let mut calls = self.calls.lock().expect("lock").clone();
        calls.sort();
        calls
    }
}

#[async_trait]
impl DeliveryClient for ScriptedDelivery {
    async fn deliver(&self, req: DeliveryRequest<'_>) -> DeliveryResult {
        self.calls
            .lock()
            .expect("lock")
            .push(req.guide_id.to_string());
        self.responses
            .get(req.guide_id)
            .copied()
            .unwrap_or(DeliveryResult::Delivered)
    }
}
