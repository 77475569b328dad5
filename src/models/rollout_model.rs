//! models/rollout_model.rs
//! Fase de despliegue, habilitación del ejecutor y límites de envío.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RolloutPhase {
    /// Solo cuenta `wouldSend`; no resuelve teléfonos ni envía
    Simulation,
    /// Envía únicamente a guías en banda HIGH
    Pilot,
    Full,
}

impl RolloutPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RolloutPhase::Simulation => "simulation",
            RolloutPhase::Pilot => "pilot",
            RolloutPhase::Full => "full",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "simulation" => Some(RolloutPhase::Simulation),
            "pilot" => Some(RolloutPhase::Pilot),
            "full" => Some(RolloutPhase::Full),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimits {
    pub per_run: u32,
    pub per_phone: Option<u32>,
    pub per_carrier: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RolloutConfig {
    pub phase: RolloutPhase,
    pub executor_enabled: bool,
    pub rate_limits: RateLimits,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

/// Body de POST /admin/rollout-control. `action` se valida en el servicio
/// para poder responder `InvalidAction` en vez de un error de parseo.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolloutControlRequest {
    pub action: String,
    pub phase: Option<String>,
    pub per_run: Option<i64>,
    pub per_phone: Option<i64>,
    pub per_carrier: Option<i64>,
    /// Permite límites en cero (equivale a frenar envíos sin pausar)
    pub force: Option<bool>,
}
