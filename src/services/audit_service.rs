//! services/audit_service.rs
//! Log de auditoría append-only para toda mutación administrativa.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite, SqliteConnection};
use uuid::Uuid;

use crate::db::{parse_ts, ts};
use crate::models::audit_model::AdminAction;

#[derive(Clone, Debug)]
pub struct AuditService {
    db_pool: Pool<Sqlite>,
}

impl AuditService {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        AuditService { db_pool }
    }

    /// Registra una acción administrativa. `summary` debe armarse solo con
    /// identificadores y códigos, nunca con texto libre del usuario.
    pub async fn log_admin_action(
        &self,
        actor: &str,
        action: &str,
        summary: &str,
    ) -> Result<AdminAction> {
        let mut conn = self
            .db_pool
            .acquire()
            .await
            .context("Fallo al obtener conexión para auditoría")?;
        append(&mut *conn, actor, action, summary).await
    }

    pub async fn list_recent(&self, limit: u32) -> Result<Vec<AdminAction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, actor, action, summary, created_at
            FROM admin_actions
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.db_pool)
        .await
        .context("Fallo al listar auditoría")?;

        let mut result = Vec::with_capacity(rows.len());
        for r in rows {
            let created_at: String = r.try_get("created_at")?;
            result.push(AdminAction {
                id: r.try_get("id")?,
                actor: r.try_get("actor")?,
                action: r.try_get("action")?,
                summary: r.try_get("summary")?,
                timestamp: parse_ts(&created_at)?,
            });
        }
        Ok(result)
    }
}

/// Inserta la entrada usando la conexión (o transacción) del llamador, para
/// que el cambio y su auditoría se confirmen juntos.
pub(crate) async fn append(
    conn: &mut SqliteConnection,
    actor: &str,
    action: &str,
    summary: &str,
) -> Result<AdminAction> {
    let entry = AdminAction {
        id: Uuid::new_v4().to_string(),
        actor: actor.to_string(),
        action: action.to_string(),
        summary: summary.to_string(),
        timestamp: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO admin_actions (id, actor, action, summary, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.actor)
    .bind(&entry.action)
    .bind(&entry.summary)
    .bind(ts(entry.timestamp))
    .execute(&mut *conn)
    .await
    .context("Fallo al insertar admin_action")?;

    log::info!(
        "(audit) actor={} action={} summary={}",
        entry.actor,
        entry.action,
        entry.summary
    );
    Ok(entry)
}
