use chrono::{DateTime, Utc};
use serde::Serialize;

/// Estados terminales: la guía ya no necesita intervención.
pub const TERMINAL_STATUSES: [&str; 3] = ["delivered", "returned", "cancelled"];

/// Guía/envío tal como lo ve el núcleo. El teléfono NO forma parte de este
/// struct; solo `PhoneResolver` lo consulta.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Guide {
    pub guide_id: String,
    pub carrier: String,
    pub city: String,
    pub status: String, // "pending", "in_transit", "at_office", "novelty", "delivered", ...
    pub has_novelty: bool,
    pub last_status_at: DateTime<Utc>,
    /// Último envío exitoso de una acción (derivado de action_plans)
    pub last_contact_at: Option<DateTime<Utc>>,
}

impl Guide {
    pub fn is_terminal(&self) -> bool {
        let status = self.status.trim().to_lowercase();
        TERMINAL_STATUSES.contains(&status.as_str())
    }

    pub fn is_at_office(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case("at_office")
    }

    /// Días completos desde el último cambio de estado.
    pub fn days_without_movement(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_status_at).num_days().max(0)
    }
}
