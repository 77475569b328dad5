//! db.rs
//! Conexión a SQLite, migraciones y formato de timestamps.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};

pub async fn setup_database(db_url: &str) -> Result<Pool<Sqlite>> {
    if let Some(path) = db_url
        .strip_prefix("sqlite:")
        .map(|rest| rest.split('?').next().unwrap_or(rest))
    {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() && !path.starts_with(':') {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("No se pudo crear directorio {:?}", parent))?;
            }
        }
    }

    log::info!("(setup_database) Conectando a SQLite en {}", db_url);
    let db_pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect(db_url)
        .await
        .context("No se pudo conectar a la base de datos SQLite")?;

    run_migrations(&db_pool).await?;
    Ok(db_pool)
}

/// Corre migraciones con sqlx
pub async fn run_migrations(db_pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(db_pool)
        .await
        .context("Fallo en migraciones")?;
    Ok(())
}

/// Timestamps como RFC 3339 con milisegundos y sufijo `Z`, para que el orden
/// lexicográfico coincida con el cronológico.
pub fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Timestamp inválido: {}", raw))?;
    Ok(parsed.with_timezone(&Utc))
}
