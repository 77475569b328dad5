//! config/app_config.rs
//! Estructuras globales de configuración: secretos, umbrales de riesgo,
//! ventanas de tickets y presupuesto del ejecutor.
//!
//! Todo se lee del entorno (cargado desde `.env` con dotenv) y cada valor
//! numérico tiene un default razonable.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Secretos de autenticación. Nunca se serializan.
#[derive(Clone)]
pub struct AuthSecrets {
    pub cron_secret: String,
    pub admin_secret: String,
}

impl std::fmt::Debug for AuthSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthSecrets { .. }")
    }
}

/// Pesos y cortes del puntaje de riesgo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskWeights {
    pub risky_city: u32,
    pub risky_carrier: u32,
    pub per_stale_day: u32,
    pub stale_days_cap: u32,
    pub novelty_flag: u32,
    pub at_office_status: u32,
    pub novelty_status: u32,
    pub high_threshold: u32,
    pub medium_threshold: u32,
}

impl Default for RiskWeights {
    fn default() -> Self {
        RiskWeights {
            risky_city: 30,
            risky_carrier: 30,
            per_stale_day: 5,
            stale_days_cap: 6,
            novelty_flag: 20,
            at_office_status: 15,
            novelty_status: 10,
            high_threshold: 60,
            medium_threshold: 30,
        }
    }
}

/// Ventanas que disparan tickets por estado de la guía.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketThresholds {
    /// Días en oficina de la transportadora antes de abrir AT_OFFICE_STILL
    pub at_office_days: i64,
    /// Días en oficina a partir de los cuales el ticket es prioridad alta
    pub at_office_alta_days: i64,
    /// Horas sin movimiento después de contactar al cliente
    pub no_movement_grace_hours: i64,
}

impl Default for TicketThresholds {
    fn default() -> Self {
        TicketThresholds {
            at_office_days: 3,
            at_office_alta_days: 7,
            no_movement_grace_hours: 48,
        }
    }
}

/// Presupuesto y reintentos de una corrida del ejecutor.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub action_type: String,
    pub candidate_limit: usize,
    pub concurrency: usize,
    pub soft_deadline: Duration,
    pub phone_fetch_attempts: u32,
    pub delivery_max_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub action_cooldown_hours: i64,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        ExecutorSettings {
            action_type: "delivery_reminder".to_string(),
            candidate_limit: 200,
            concurrency: 4,
            soft_deadline: Duration::from_millis(45_000),
            phone_fetch_attempts: 2,
            delivery_max_attempts: 3,
            retry_base_delay: Duration::from_millis(200),
            retry_max_delay: Duration::from_millis(2_000),
            action_cooldown_hours: 24,
        }
    }
}

/// Proveedor de mensajería saliente. Sin URL el ejecutor no puede enviar.
#[derive(Debug, Clone, Default)]
pub struct DeliverySettings {
    pub api_url: Option<String>,
    pub api_token: Option<String>,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_host: String,
    pub bind_port: u16,
    pub database_url: String,
    pub secrets: AuthSecrets,
    pub risk: RiskWeights,
    pub tickets: TicketThresholds,
    pub executor: ExecutorSettings,
    pub delivery: DeliverySettings,
}

impl AppConfig {
    /// Lee toda la configuración del entorno.
    /// Falla si falta algún secreto o si ambos secretos son iguales.
    pub fn from_env() -> Result<Self> {
        let cron_secret = required("CRON_SECRET")?;
        let admin_secret = required("ADMIN_SECRET")?;
        let secrets = AuthSecrets {
            cron_secret,
            admin_secret,
        };
        validate_secrets(&secrets)?;

        let risk_default = RiskWeights::default();
        let risk = RiskWeights {
            risky_city: parsed("RISK_WEIGHT_CITY", risk_default.risky_city)?,
            risky_carrier: parsed("RISK_WEIGHT_CARRIER", risk_default.risky_carrier)?,
            per_stale_day: parsed("RISK_WEIGHT_STALE_DAY", risk_default.per_stale_day)?,
            stale_days_cap: parsed("RISK_STALE_DAYS_CAP", risk_default.stale_days_cap)?,
            novelty_flag: parsed("RISK_WEIGHT_NOVELTY", risk_default.novelty_flag)?,
            at_office_status: parsed("RISK_WEIGHT_AT_OFFICE", risk_default.at_office_status)?,
            novelty_status: parsed("RISK_WEIGHT_NOVELTY_STATUS", risk_default.novelty_status)?,
            high_threshold: parsed("RISK_HIGH_THRESHOLD", risk_default.high_threshold)?,
            medium_threshold: parsed("RISK_MEDIUM_THRESHOLD", risk_default.medium_threshold)?,
        };
        if risk.medium_threshold > risk.high_threshold {
            return Err(anyhow!(
                "RISK_MEDIUM_THRESHOLD ({}) no puede superar RISK_HIGH_THRESHOLD ({})",
                risk.medium_threshold,
                risk.high_threshold
            ));
        }

        let tickets_default = TicketThresholds::default();
        let tickets = TicketThresholds {
            at_office_days: parsed("AT_OFFICE_DAYS", tickets_default.at_office_days)?,
            at_office_alta_days: parsed(
                "AT_OFFICE_ALTA_DAYS",
                tickets_default.at_office_alta_days,
            )?,
            no_movement_grace_hours: parsed(
                "NO_MOVEMENT_GRACE_HOURS",
                tickets_default.no_movement_grace_hours,
            )?,
        };

        let ex = ExecutorSettings::default();
        let executor = ExecutorSettings {
            action_type: env::var("EXECUTOR_ACTION_TYPE").unwrap_or(ex.action_type),
            candidate_limit: parsed("EXECUTOR_CANDIDATE_LIMIT", ex.candidate_limit)?,
            concurrency: parsed("EXECUTOR_CONCURRENCY", ex.concurrency)?.max(1),
            soft_deadline: Duration::from_millis(parsed(
                "RUN_SOFT_DEADLINE_MS",
                ex.soft_deadline.as_millis() as u64,
            )?),
            phone_fetch_attempts: parsed("PHONE_FETCH_ATTEMPTS", ex.phone_fetch_attempts)?.max(1),
            delivery_max_attempts: parsed("DELIVERY_MAX_ATTEMPTS", ex.delivery_max_attempts)?
                .max(1),
            retry_base_delay: Duration::from_millis(parsed(
                "RETRY_BASE_DELAY_MS",
                ex.retry_base_delay.as_millis() as u64,
            )?),
            retry_max_delay: Duration::from_millis(parsed(
                "RETRY_MAX_DELAY_MS",
                ex.retry_max_delay.as_millis() as u64,
            )?),
            action_cooldown_hours: parsed("ACTION_COOLDOWN_HOURS", ex.action_cooldown_hours)?,
        };

        let delivery = DeliverySettings {
            api_url: env::var("DELIVERY_API_URL").ok().filter(|s| !s.is_empty()),
            api_token: env::var("DELIVERY_API_TOKEN").ok().filter(|s| !s.is_empty()),
            request_timeout: Duration::from_millis(parsed("DELIVERY_TIMEOUT_MS", 10_000u64)?),
        };

        Ok(AppConfig {
            bind_host: env::var("BIND_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            bind_port: parsed("PORT", 5022u16)?,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:data/control_plane.db?mode=rwc".to_string()),
            secrets,
            risk,
            tickets,
            executor,
            delivery,
        })
    }
}

/// Los dos secretos deben existir y ser distintos: uno no puede abrir las rutas del otro.
pub fn validate_secrets(secrets: &AuthSecrets) -> Result<()> {
    if secrets.cron_secret.trim().is_empty() || secrets.admin_secret.trim().is_empty() {
        return Err(anyhow!("CRON_SECRET y ADMIN_SECRET no pueden estar vacíos"));
    }
    if secrets.cron_secret == secrets.admin_secret {
        return Err(anyhow!("CRON_SECRET y ADMIN_SECRET deben ser distintos"));
    }
    Ok(())
}

fn required(key: &str) -> Result<String> {
    env::var(key).map_err(|_| anyhow!("No se definió {}", key))
}

fn parsed<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("Valor inválido para {}: {}", key, e)),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_secrets_are_rejected() {
        let secrets = AuthSecrets {
            cron_secret: "same".into(),
            admin_secret: "same".into(),
        };
        assert!(validate_secrets(&secrets).is_err());
    }

    #[test]
    fn empty_secret_is_rejected() {
        let secrets = AuthSecrets {
            cron_secret: "  ".into(),
            admin_secret: "admin".into(),
        };
        assert!(validate_secrets(&secrets).is_err());
    }

    #[test]
    fn secrets_debug_is_redacted() {
        let secrets = AuthSecrets {
            cron_secret: "cron-value".into(),
            admin_secret: "admin-value".into(),
        };
        let printed = format!("{:?}", secrets);
        assert!(!printed.contains("cron-value"));
        assert!(!printed.contains("admin-value"));
    }
}
