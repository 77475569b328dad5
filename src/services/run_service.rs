//! services/run_service.rs
//! Persistencia de ActionPlans y RunSummaries.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use uuid::Uuid;

use crate::db::{parse_ts, ts};
use crate::models::run_model::{ActionPlan, ActionPlanStatus, RunStatus, RunSummary};

#[derive(Clone, Debug)]
pub struct RunService {
    db_pool: Pool<Sqlite>,
}

impl RunService {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        RunService { db_pool }
    }

    /// Crea el plan en PLANNED solo si no hay otro PLANNED/SENT para la misma
    /// (guía, acción) en esta corrida o dentro de la ventana de enfriamiento.
    /// Una sola sentencia: la verificación y el insert son atómicos.
    pub async fn insert_plan_if_absent(
        &self,
        run_id: &str,
        guide_id: &str,
        action_type: &str,
        now: DateTime<Utc>,
        cooldown_hours: i64,
    ) -> Result<Option<ActionPlan>> {
        let plan = ActionPlan {
            id: Uuid::new_v4().to_string(),
            run_id: run_id.to_string(),
            guide_id: guide_id.to_string(),
            action_type: action_type.to_string(),
            scheduled_at: now,
            status: ActionPlanStatus::Planned,
            detail: None,
        };
        let cutoff = now - Duration::hours(cooldown_hours.max(0));

        let result = sqlx::query(
            r#"
            INSERT INTO action_plans (id, run_id, guide_id, action_type, scheduled_at, status, detail)
            SELECT ?1, ?2, ?3, ?4, ?5, 'PLANNED', NULL
            WHERE NOT EXISTS (
                SELECT 1 FROM action_plans
                WHERE guide_id = ?3
                  AND action_type = ?4
                  AND status IN ('PLANNED', 'SENT')
                  AND (run_id = ?2 OR scheduled_at >= ?6)
            )
            "#,
        )
        .bind(&plan.id)
        .bind(&plan.run_id)
        .bind(&plan.guide_id)
        .bind(&plan.action_type)
        .bind(ts(plan.scheduled_at))
        .bind(ts(cutoff))
        .execute(&self.db_pool)
        .await
        .context("Fallo al insertar action_plan")?;

        if result.rows_affected() == 1 {
            Ok(Some(plan))
        } else {
            Ok(None)
        }
    }

    /// Cierra un plan. Solo aplica si sigue en PLANNED (los terminales no cambian).
    pub async fn finish_plan(
        &self,
        plan_id: &str,
        status: ActionPlanStatus,
        detail: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE action_plans
            SET status = ?2, detail = ?3
            WHERE id = ?1 AND status = 'PLANNED'
            "#,
        )
        .bind(plan_id)
        .bind(status.as_str())
        .bind(detail)
        .execute(&self.db_pool)
        .await
        .context("Fallo al cerrar action_plan")?;
        Ok(result.rows_affected() == 1)
    }

    #[cfg(test)]
    pub async fn plans_for_run(&self, run_id: &str) -> Result<Vec<ActionPlan>> {
        let rows = sqlx::query(
            r#"
            SELECT id, run_id, guide_id, action_type, scheduled_at, status, detail
            FROM action_plans
            WHERE run_id = ?1
            ORDER BY scheduled_at ASC
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.db_pool)
        .await
        .context("Fallo al listar action_plans")?;

        let mut plans = Vec::with_capacity(rows.len());
        for r in rows {
            let status_raw: String = r.try_get("status")?;
            let scheduled_at: String = r.try_get("scheduled_at")?;
            plans.push(ActionPlan {
                id: r.try_get("id")?,
                run_id: r.try_get("run_id")?,
                guide_id: r.try_get("guide_id")?,
                action_type: r.try_get("action_type")?,
                scheduled_at: parse_ts(&scheduled_at)?,
                status: ActionPlanStatus::parse(&status_raw)
                    .with_context(|| format!("Estado de plan desconocido: {}", status_raw))?,
                detail: r.try_get("detail")?,
            });
        }
        Ok(plans)
    }

    /// Escribe el resumen una sola vez; un segundo intento con el mismo run_id falla.
    pub async fn save_summary(&self, summary: &RunSummary) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO run_summaries (
                run_id, started_at, duration_ms, phase, planned, would_send, sent,
                success, failed_4xx, failed_5xx, skipped_duplicate, skipped_rate_limit,
                skipped_no_contact, errors, tickets_created, not_admitted, status
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
        )
        .bind(&summary.run_id)
        .bind(ts(summary.started_at))
        .bind(summary.duration_ms as i64)
        .bind(&summary.phase)
        .bind(summary.planned)
        .bind(summary.would_send)
        .bind(summary.sent)
        .bind(summary.success)
        .bind(summary.failed_4xx)
        .bind(summary.failed_5xx)
        .bind(summary.skipped_duplicate)
        .bind(summary.skipped_rate_limit)
        .bind(summary.skipped_no_contact)
        .bind(summary.errors)
        .bind(summary.tickets_created)
        .bind(summary.not_admitted)
        .bind(summary.status.as_str())
        .execute(&self.db_pool)
        .await
        .context("Fallo al guardar run_summary")?;
        Ok(())
    }

    pub async fn recent_runs(&self, limit: u32) -> Result<Vec<RunSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT run_id, started_at, duration_ms, phase, planned, would_send, sent,
                   success, failed_4xx, failed_5xx, skipped_duplicate, skipped_rate_limit,
                   skipped_no_contact, errors, tickets_created, not_admitted, status
            FROM run_summaries
            ORDER BY started_at DESC
            LIMIT ?1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.db_pool)
        .await
        .context("Fallo al listar run_summaries")?;

        rows.iter().map(summary_from_row).collect()
    }
}

fn summary_from_row(r: &SqliteRow) -> Result<RunSummary> {
    let started_at: String = r.try_get("started_at")?;
    let status_raw: String = r.try_get("status")?;
    let duration_ms: i64 = r.try_get("duration_ms")?;
    Ok(RunSummary {
        run_id: r.try_get("run_id")?,
        started_at: parse_ts(&started_at)?,
        duration_ms: duration_ms.max(0) as u64,
        phase: r.try_get("phase")?,
        planned: r.try_get("planned")?,
        would_send: r.try_get("would_send")?,
        sent: r.try_get("sent")?,
        success: r.try_get("success")?,
        failed_4xx: r.try_get("failed_4xx")?,
        failed_5xx: r.try_get("failed_5xx")?,
        skipped_duplicate: r.try_get("skipped_duplicate")?,
        skipped_rate_limit: r.try_get("skipped_rate_limit")?,
        skipped_no_contact: r.try_get("skipped_no_contact")?,
        errors: r.try_get("errors")?,
        tickets_created: r.try_get("tickets_created")?,
        not_admitted: r.try_get("not_admitted")?,
        status: RunStatus::parse(&status_raw)
            .with_context(|| format!("Estado de corrida desconocido: {}", status_raw))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::memory_pool;
    use actix_rt::test;

    #[test]
    async fn plan_is_unique_within_cooldown() {
        let runs = RunService::new(memory_pool().await);
        let now = Utc::now();

        let first = runs
            .insert_plan_if_absent("r1", "G1", "delivery_reminder", now, 24)
            .await
            .unwrap()
            .expect("plan");
        assert!(runs
            .insert_plan_if_absent("r1", "G1", "delivery_reminder", now, 24)
            .await
            .unwrap()
            .is_none());

        runs.finish_plan(&first.id, ActionPlanStatus::Sent, None)
            .await
            .unwrap();
        assert!(runs
            .insert_plan_if_absent("r2", "G1", "delivery_reminder", now, 24)
            .await
            .unwrap()
            .is_none());

        // Fuera de la ventana vuelve a planificarse
        let later = now + Duration::hours(25);
        assert!(runs
            .insert_plan_if_absent("r3", "G1", "delivery_reminder", later, 24)
            .await
            .unwrap()
            .is_some());
    }

    #[test]
    async fn failed_plans_do_not_block_and_terminal_plans_stay() {
        let runs = RunService::new(memory_pool().await);
        let now = Utc::now();
        let plan = runs
            .insert_plan_if_absent("r1", "G2", "delivery_reminder", now, 24)
            .await
            .unwrap()
            .expect("plan");
        assert!(runs
            .finish_plan(&plan.id, ActionPlanStatus::Failed, Some("http_404"))
            .await
            .unwrap());
        assert!(!runs
            .finish_plan(&plan.id, ActionPlanStatus::Sent, None)
            .await
            .unwrap());

        assert!(runs
            .insert_plan_if_absent("r2", "G2", "delivery_reminder", now, 24)
            .await
            .unwrap()
            .is_some());
    }

    #[test]
    async fn summaries_are_listed_newest_first() {
        let runs = RunService::new(memory_pool().await);
        let older = RunSummary::empty("old".into(), Utc::now() - Duration::minutes(10), "simulation");
        let mut newer = RunSummary::empty("new".into(), Utc::now(), "full");
        newer.sent = 3;
        runs.save_summary(&older).await.unwrap();
        runs.save_summary(&newer).await.unwrap();

        let recent = runs.recent_runs(10).await.unwrap();
        assert_eq!(recent[0].run_id, "new");
        assert_eq!(recent[0].sent, 3);
        assert_eq!(recent[1].phase, "simulation");
    }
}
