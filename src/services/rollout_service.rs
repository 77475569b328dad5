//! services/rollout_service.rs
//! Fase, habilitación del ejecutor y límites de envío.
//!
//! Este servicio nunca dispara envíos: solo cambia el estado que la próxima
//! corrida lee. Cada lectura va a la base (nada de caché por request).

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite};

use crate::db::{parse_ts, ts};
use crate::error::ControlError;
use crate::models::rollout_model::{RateLimits, RolloutConfig, RolloutControlRequest, RolloutPhase};
use crate::services::audit_service;

#[derive(Clone, Debug)]
pub struct RolloutService {
    db_pool: Pool<Sqlite>,
}

/// Acción ya validada de POST /admin/rollout-control
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolloutControl {
    Pause,
    Resume,
    AdjustLimits(RateLimits),
    SetPhase(RolloutPhase),
}

impl RolloutControl {
    fn audit_name(&self) -> &'static str {
        match self {
            RolloutControl::Pause => "rollout.pause",
            RolloutControl::Resume => "rollout.resume",
            RolloutControl::AdjustLimits(_) => "rollout.adjust_limits",
            RolloutControl::SetPhase(_) => "rollout.set_phase",
        }
    }
}

impl RolloutService {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        RolloutService { db_pool }
    }

    pub async fn get_config(&self) -> Result<RolloutConfig> {
        let row = sqlx::query(
            r#"
            SELECT phase, executor_enabled, per_run, per_phone, per_carrier,
                   updated_at, updated_by
            FROM rollout_config
            WHERE id = 1
            "#,
        )
        .fetch_one(&self.db_pool)
        .await
        .context("No se encontró rollout_config")?;

        let phase_raw: String = row.try_get("phase")?;
        let phase = RolloutPhase::parse(&phase_raw)
            .with_context(|| format!("Fase desconocida en rollout_config: {}", phase_raw))?;
        let enabled: i64 = row.try_get("executor_enabled")?;
        let per_run: i64 = row.try_get("per_run")?;
        let per_phone: Option<i64> = row.try_get("per_phone")?;
        let per_carrier: Option<i64> = row.try_get("per_carrier")?;
        let updated_at: String = row.try_get("updated_at")?;

        Ok(RolloutConfig {
            phase,
            executor_enabled: enabled != 0,
            rate_limits: RateLimits {
                per_run: to_limit(per_run),
                per_phone: per_phone.map(to_limit),
                per_carrier: per_carrier.map(to_limit),
            },
            updated_at: parse_ts(&updated_at)?,
            updated_by: row.try_get("updated_by")?,
        })
    }

    /// Valida y aplica una acción de control; deja auditoría en la misma transacción.
    pub async fn apply_control(
        &self,
        actor: &str,
        req: RolloutControlRequest,
    ) -> Result<RolloutConfig, ControlError> {
        let control = parse_control(req)?;
        let now = ts(Utc::now());

        let mut tx = self
            .db_pool
            .begin()
            .await
            .context("Fallo al abrir transacción de rollout")?;

        let summary = match &control {
            RolloutControl::Pause | RolloutControl::Resume => {
                let enabled = matches!(control, RolloutControl::Resume);
                sqlx::query(
                    r#"
                    UPDATE rollout_config
                    SET executor_enabled = ?1, updated_at = ?2, updated_by = ?3
                    WHERE id = 1
                    "#,
                )
                .bind(enabled as i64)
                .bind(&now)
                .bind(actor)
                .execute(&mut *tx)
                .await
                .context("Fallo al cambiar executor_enabled")?;
                format!("executor_enabled={}", enabled)
            }
            RolloutControl::AdjustLimits(limits) => {
                sqlx::query(
                    r#"
                    UPDATE rollout_config
                    SET per_run = ?1, per_phone = ?2, per_carrier = ?3,
                        updated_at = ?4, updated_by = ?5
                    WHERE id = 1
                    "#,
                )
                .bind(i64::from(limits.per_run))
                .bind(limits.per_phone.map(i64::from))
                .bind(limits.per_carrier.map(i64::from))
                .bind(&now)
                .bind(actor)
                .execute(&mut *tx)
                .await
                .context("Fallo al ajustar límites")?;
                format!(
                    "per_run={} per_phone={} per_carrier={}",
                    limits.per_run,
                    fmt_opt(limits.per_phone),
                    fmt_opt(limits.per_carrier)
                )
            }
            RolloutControl::SetPhase(phase) => {
                sqlx::query(
                    r#"
                    UPDATE rollout_config
                    SET phase = ?1, updated_at = ?2, updated_by = ?3
                    WHERE id = 1
                    "#,
                )
                .bind(phase.as_str())
                .bind(&now)
                .bind(actor)
                .execute(&mut *tx)
                .await
                .context("Fallo al cambiar fase")?;
                format!("phase={}", phase.as_str())
            }
        };

        audit_service::append(&mut *tx, actor, control.audit_name(), &summary).await?;
        tx.commit().await.context("Fallo al confirmar rollout")?;

        log::info!(
            "(apply_control) {} aplicado por actor={}",
            control.audit_name(),
            actor
        );
        Ok(self.get_config().await?)
    }
}

/// Traduce el body crudo a una acción válida.
pub fn parse_control(req: RolloutControlRequest) -> Result<RolloutControl, ControlError> {
    match req.action.trim() {
        "pause" => Ok(RolloutControl::Pause),
        "resume" => Ok(RolloutControl::Resume),
        "adjustLimits" => {
            let force = req.force.unwrap_or(false);
            let per_run = req
                .per_run
                .ok_or_else(|| ControlError::Validation("perRun es obligatorio".to_string()))?;
            Ok(RolloutControl::AdjustLimits(RateLimits {
                per_run: validate_limit("perRun", per_run, force)?,
                per_phone: req
                    .per_phone
                    .map(|v| validate_limit("perPhone", v, force))
                    .transpose()?,
                per_carrier: req
                    .per_carrier
                    .map(|v| validate_limit("perCarrier", v, force))
                    .transpose()?,
            }))
        }
        "setPhase" => {
            let raw = req
                .phase
                .ok_or_else(|| ControlError::Validation("phase es obligatorio".to_string()))?;
            RolloutPhase::parse(&raw)
                .map(RolloutControl::SetPhase)
                .ok_or_else(|| ControlError::Validation(format!("fase desconocida: {}", raw)))
        }
        other => Err(ControlError::InvalidAction(other.to_string())),
    }
}

/// Negativos nunca; cero solo con `force`.
fn validate_limit(field: &str, value: i64, force: bool) -> Result<u32, ControlError> {
    if value < 0 {
        return Err(ControlError::Validation(format!(
            "{} no puede ser negativo",
            field
        )));
    }
    if value == 0 && !force {
        return Err(ControlError::Validation(format!(
            "{} en cero requiere force=true",
            field
        )));
    }
    u32::try_from(value)
        .map_err(|_| ControlError::Validation(format!("{} fuera de rango", field)))
}

fn to_limit(raw: i64) -> u32 {
    u32::try_from(raw.max(0)).unwrap_or(u32::MAX)
}

fn fmt_opt(value: Option<u32>) -> String {
    value.map_or_else(|| "none".to_string(), |v| v.to_string())
}
