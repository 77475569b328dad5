use chrono::{DateTime, Utc};
use serde::Serialize;

/// Entrada del log de auditoría (append-only). `summary` nunca lleva PII.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminAction {
    pub id: String,
    pub actor: String,
    pub action: String,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
}
