//! services/risk_service.rs
//! Puntaje de riesgo por guía y cola priorizada.
//!
//! Los flags se leen de la base en cada llamada; no hay caché que pueda
//! ocultar una actualización hecha por un admin.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Pool, Row, Sqlite};

use crate::config::app_config::RiskWeights;
use crate::db::{parse_ts, ts};
use crate::error::ControlError;
use crate::models::guide_model::Guide;
use crate::models::risk_model::{
    RankOptions, RankedGuide, RiskFlagConfig, RiskFlagsUpdate, RiskLevel, RiskQueueResponse,
};
use crate::services::audit_service;
use crate::services::guide_service::GuideService;

/// Máximo de entradas por conjunto de flags
const MAX_FLAG_ENTRIES: usize = 500;
const MAX_FLAG_LEN: usize = 80;

#[derive(Clone, Debug)]
pub struct RiskService {
    db_pool: Pool<Sqlite>,
    guides: GuideService,
    weights: RiskWeights,
}

impl RiskService {
    pub fn new(db_pool: Pool<Sqlite>, guides: GuideService, weights: RiskWeights) -> Self {
        RiskService {
            db_pool,
            guides,
            weights,
        }
    }

    pub fn weights(&self) -> &RiskWeights {
        &self.weights
    }

    pub async fn get_flags(&self) -> Result<RiskFlagConfig> {
        let row = sqlx::query(
            r#"
            SELECT risky_cities, risky_carriers, updated_at, updated_by
            FROM risk_flags
            WHERE id = 1
            "#,
        )
        .fetch_one(&self.db_pool)
        .await
        .context("No se encontró la configuración de flags de riesgo")?;

        let cities: String = row.try_get("risky_cities")?;
        let carriers: String = row.try_get("risky_carriers")?;
        let updated_at: String = row.try_get("updated_at")?;

        Ok(RiskFlagConfig {
            risky_cities: serde_json::from_str(&cities).context("risky_cities corrupto")?,
            risky_carriers: serde_json::from_str(&carriers).context("risky_carriers corrupto")?,
            updated_at: parse_ts(&updated_at)?,
            updated_by: row.try_get("updated_by")?,
        })
    }

    /// Reemplaza ambos conjuntos y deja entrada de auditoría en la misma transacción.
    pub async fn update_flags(
        &self,
        actor: &str,
        update: RiskFlagsUpdate,
    ) -> Result<RiskFlagConfig, ControlError> {
        let cities = clean_flag_set("riskyCities", update.risky_cities)?;
        let carriers = clean_flag_set("riskyCarriers", update.risky_carriers)?;
        let now = Utc::now();

        let mut tx = self
            .db_pool
            .begin()
            .await
            .context("Fallo al abrir transacción de flags")?;

        sqlx::query(
            r#"
            UPDATE risk_flags
            SET risky_cities = ?1,
                risky_carriers = ?2,
                updated_at = ?3,
                updated_by = ?4
            WHERE id = 1
            "#,
        )
        .bind(serde_json::to_string(&cities).context("serializando ciudades")?)
        .bind(serde_json::to_string(&carriers).context("serializando transportadoras")?)
        .bind(ts(now))
        .bind(actor)
        .execute(&mut *tx)
        .await
        .context("Fallo al actualizar risk_flags")?;

        let summary = format!(
            "risky_cities={} risky_carriers={}",
            cities.len(),
            carriers.len()
        );
        audit_service::append(&mut *tx, actor, "risk_flags.update", &summary).await?;
        tx.commit().await.context("Fallo al confirmar flags")?;

        Ok(RiskFlagConfig {
            risky_cities: cities,
            risky_carriers: carriers,
            updated_at: now,
            updated_by: actor.to_string(),
        })
    }

    /// Lee flags y guías frescos y devuelve la cola ordenada.
    pub async fn risk_queue(&self, opts: &RankOptions) -> Result<RiskQueueResponse> {
        let flags = self.get_flags().await?;
        let batch = self.guides.list_guides(opts.include_terminal).await?;
        if batch.skipped > 0 {
            log::warn!(
                "(risk_queue) {} guías ilegibles quedaron fuera de la cola",
                batch.skipped
            );
        }
        let now = Utc::now();
        let items = rank(&batch.guides, &flags, &self.weights, opts, now);
        Ok(RiskQueueResponse {
            generated_at: now,
            total: items.len(),
            items,
        })
    }
}

fn clean_flag_set(field: &str, values: Vec<String>) -> Result<BTreeSet<String>, ControlError> {
    if values.len() > MAX_FLAG_ENTRIES {
        return Err(ControlError::Validation(format!(
            "{} admite a lo sumo {} entradas",
            field, MAX_FLAG_ENTRIES
        )));
    }
    let mut out = BTreeSet::new();
    for value in values {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.chars().count() > MAX_FLAG_LEN {
            return Err(ControlError::Validation(format!(
                "{} contiene un valor demasiado largo",
                field
            )));
        }
        out.insert(trimmed.to_string());
    }
    Ok(out)
}

/// Puntaje aditivo: cada señal suma, ninguna resta. Las guías en estado
/// terminal puntúan 0.
pub fn score(
    guide: &Guide,
    flags: &RiskFlagConfig,
    weights: &RiskWeights,
    now: DateTime<Utc>,
) -> u32 {
    if guide.is_terminal() {
        return 0;
    }

    let mut total = 0u32;
    if flags.is_risky_city(&guide.city) {
        total = total.saturating_add(weights.risky_city);
    }
    if flags.is_risky_carrier(&guide.carrier) {
        total = total.saturating_add(weights.risky_carrier);
    }

    let stale_days = guide.days_without_movement(now).min(i64::from(weights.stale_days_cap));
    let stale_days = u32::try_from(stale_days).unwrap_or(0);
    total = total.saturating_add(weights.per_stale_day.saturating_mul(stale_days));

    if guide.has_novelty {
        total = total.saturating_add(weights.novelty_flag);
    }
    if guide.is_at_office() {
        total = total.saturating_add(weights.at_office_status);
    }
    if guide.status.trim().eq_ignore_ascii_case("novelty") {
        total = total.saturating_add(weights.novelty_status);
    }
    total
}

pub fn level_for(score: u32, weights: &RiskWeights) -> RiskLevel {
    if score >= weights.high_threshold {
        RiskLevel::High
    } else if score >= weights.medium_threshold {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Orden: puntaje descendente, luego la guía más estancada primero, luego id.
pub fn rank(
    guides: &[Guide],
    flags: &RiskFlagConfig,
    weights: &RiskWeights,
    opts: &RankOptions,
    now: DateTime<Utc>,
) -> Vec<RankedGuide> {
    let mut ranked: Vec<RankedGuide> = guides
        .iter()
        .filter(|g| opts.include_terminal || !g.is_terminal())
        .map(|g| {
            let s = score(g, flags, weights, now);
            RankedGuide {
                guide_id: g.guide_id.clone(),
                carrier: g.carrier.clone(),
                city: g.city.clone(),
                status: g.status.clone(),
                score: s,
                level: level_for(s, weights),
                days_without_movement: g.days_without_movement(now),
                last_status_at: g.last_status_at,
            }
        })
        .filter(|r| opts.level.map_or(true, |lvl| r.level == lvl))
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.last_status_at.cmp(&b.last_status_at))
            .then_with(|| a.guide_id.cmp(&b.guide_id))
    });
    ranked.truncate(opts.limit);
    ranked
}
