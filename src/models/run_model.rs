//! models/run_model.rs
//! ActionPlan y RunSummary. Ninguno de los dos guarda datos de contacto.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionPlanStatus {
    Planned,
    Sent,
    Skipped,
    Failed,
}

impl ActionPlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionPlanStatus::Planned => "PLANNED",
            ActionPlanStatus::Sent => "SENT",
            ActionPlanStatus::Skipped => "SKIPPED",
            ActionPlanStatus::Failed => "FAILED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PLANNED" => Some(ActionPlanStatus::Planned),
            "SENT" => Some(ActionPlanStatus::Sent),
            "SKIPPED" => Some(ActionPlanStatus::Skipped),
            "FAILED" => Some(ActionPlanStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPlan {
    pub id: String,
    pub run_id: String,
    pub guide_id: String,
    pub action_type: String,
    pub scheduled_at: DateTime<Utc>,
    pub status: ActionPlanStatus,
    /// Código corto ("simulated", "rate_limited", "http_404", ...)
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Paused,
    /// Se alcanzó el deadline suave antes de admitir todas las guías
    Partial,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::Paused => "paused",
            RunStatus::Partial => "partial",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "completed" => Some(RunStatus::Completed),
            "paused" => Some(RunStatus::Paused),
            "partial" => Some(RunStatus::Partial),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub phase: String,
    pub planned: u32,
    pub would_send: u32,
    pub sent: u32,
    pub success: u32,
    #[serde(rename = "failed4xx")]
    pub failed_4xx: u32,
    #[serde(rename = "failed5xx")]
    pub failed_5xx: u32,
    pub skipped_duplicate: u32,
    pub skipped_rate_limit: u32,
    pub skipped_no_contact: u32,
    pub errors: u32,
    pub tickets_created: u32,
    pub not_admitted: u32,
    pub status: RunStatus,
}

impl RunSummary {
    pub fn empty(run_id: String, started_at: DateTime<Utc>, phase: &str) -> Self {
        RunSummary {
            run_id,
            started_at,
            duration_ms: 0,
            phase: phase.to_string(),
            planned: 0,
            would_send: 0,
            sent: 0,
            success: 0,
            failed_4xx: 0,
            failed_5xx: 0,
            skipped_duplicate: 0,
            skipped_rate_limit: 0,
            skipped_no_contact: 0,
            errors: 0,
            tickets_created: 0,
            not_admitted: 0,
            status: RunStatus::Completed,
        }
    }
}

/// Salud del ejecutor para /admin/executor-status y command-center
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorHealth {
    pub status: String, // "healthy", "degraded", "paused", "idle"
    pub executor_enabled: bool,
    pub phase: String,
    pub last_run_at: Option<DateTime<Utc>>,
    pub failure_rate: f64,
    pub runs_considered: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorStatusResponse {
    pub health: ExecutorHealth,
    pub last_run: Option<RunSummary>,
    pub recent_runs: Vec<RunSummary>,
}

/// Resultado clasificado de la acción sobre una guía, tal como lo recibe el
/// motor de tickets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Success,
    /// El proveedor respondió 4xx
    Failed4xx(u16),
    /// Se agotó el presupuesto de reintentos (5xx, red o consulta de contacto)
    Failed5xx,
    /// No se intentó la acción (simulada, duplicada, límite, sin contacto)
    Skipped,
}
