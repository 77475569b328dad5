//! services/guide_service.rs
//! Lectura de guías desde la fuente de verdad. Este servicio nunca
//! selecciona la columna `phone`.

use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

use crate::db::parse_ts;
use crate::models::guide_model::Guide;

const GUIDE_COLUMNS: &str = r#"
    g.guide_id, g.carrier, g.city, g.status, g.has_novelty, g.last_status_at,
    (SELECT MAX(p.scheduled_at) FROM action_plans p
      WHERE p.guide_id = g.guide_id AND p.status = 'SENT') AS last_contact_at
"#;

/// Guías decodificadas más la cuenta de filas que no se pudieron leer.
#[derive(Debug, Default)]
pub struct GuideBatch {
    pub guides: Vec<Guide>,
    pub skipped: u32,
}

#[derive(Clone, Debug)]
pub struct GuideService {
    db_pool: Pool<Sqlite>,
}

impl GuideService {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        GuideService { db_pool }
    }

    /// Lista guías; sin `include_terminal` se omiten entregadas/devueltas/canceladas.
    /// Una fila corrupta se registra y se omite; no tumba el listado completo.
    pub async fn list_guides(&self, include_terminal: bool) -> Result<GuideBatch> {
        let filter = if include_terminal {
            ""
        } else {
            "WHERE lower(g.status) NOT IN ('delivered', 'returned', 'cancelled')"
        };
        let sql = format!("SELECT {GUIDE_COLUMNS} FROM guides g {filter}");

        let rows = sqlx::query(&sql)
            .fetch_all(&self.db_pool)
            .await
            .context("Fallo al listar guías")?;

        let mut batch = GuideBatch::default();
        for row in &rows {
            match guide_from_row(row) {
                Ok(guide) => batch.guides.push(guide),
                Err(e) => {
                    let guide_id: Option<String> = row.try_get("guide_id").ok();
                    log::warn!(
                        "(list_guides) Guía {} omitida: {:#}",
                        guide_id.as_deref().unwrap_or("<sin id>"),
                        e
                    );
                    batch.skipped += 1;
                }
            }
        }
        Ok(batch)
    }
}

fn guide_from_row(row: &SqliteRow) -> Result<Guide> {
    let last_status_at: String = row.try_get("last_status_at")?;
    let last_contact_at: Option<String> = row.try_get("last_contact_at")?;
    let has_novelty: i64 = row.try_get("has_novelty")?;

    Ok(Guide {
        guide_id: row.try_get("guide_id")?,
        carrier: row.try_get("carrier")?,
        city: row.try_get("city")?,
        status: row.try_get("status")?,
        has_novelty: has_novelty != 0,
        last_status_at: parse_ts(&last_status_at)?,
        last_contact_at: last_contact_at.as_deref().map(parse_ts).transpose()?,
    })
}
