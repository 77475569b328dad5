//! models/ticket_model.rs
//! Tickets de soporte: disparadores, máquina de estados y prioridades.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketTrigger {
    /// Error de cliente (4xx) no reintentable del proveedor
    #[serde(rename = "FAILED_4XX")]
    Failed4xx,
    /// Se agotaron los reintentos ante 5xx
    #[serde(rename = "FAILED_5XX_RETRIES")]
    Failed5xxRetries,
    NoMovementAfterContact,
    AtOfficeStill,
}

impl TicketTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketTrigger::Failed4xx => "FAILED_4XX",
            TicketTrigger::Failed5xxRetries => "FAILED_5XX_RETRIES",
            TicketTrigger::NoMovementAfterContact => "NO_MOVEMENT_AFTER_CONTACT",
            TicketTrigger::AtOfficeStill => "AT_OFFICE_STILL",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "FAILED_4XX" => Some(TicketTrigger::Failed4xx),
            "FAILED_5XX_RETRIES" => Some(TicketTrigger::Failed5xxRetries),
            "NO_MOVEMENT_AFTER_CONTACT" => Some(TicketTrigger::NoMovementAfterContact),
            "AT_OFFICE_STILL" => Some(TicketTrigger::AtOfficeStill),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "OPEN",
            TicketStatus::InProgress => "IN_PROGRESS",
            TicketStatus::Resolved => "RESOLVED",
            TicketStatus::Closed => "CLOSED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "OPEN" => Some(TicketStatus::Open),
            "IN_PROGRESS" => Some(TicketStatus::InProgress),
            "RESOLVED" => Some(TicketStatus::Resolved),
            "CLOSED" => Some(TicketStatus::Closed),
            _ => None,
        }
    }

    /// Cuenta para la unicidad (guía, disparador)
    pub fn is_open(&self) -> bool {
        matches!(self, TicketStatus::Open | TicketStatus::InProgress)
    }

    /// OPEN -> IN_PROGRESS -> RESOLVED -> CLOSED, más OPEN -> CLOSED.
    /// De CLOSED no se sale.
    pub fn can_transition_to(&self, next: TicketStatus) -> bool {
        use TicketStatus::*;
        matches!(
            (self, next),
            (Open, InProgress) | (Open, Closed) | (InProgress, Resolved) | (Resolved, Closed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketPriority {
    Alta,
    Media,
}

impl TicketPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketPriority::Alta => "alta",
            TicketPriority::Media => "media",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "alta" => Some(TicketPriority::Alta),
            "media" => Some(TicketPriority::Media),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: String,
    pub guide_id: String,
    pub trigger: TicketTrigger,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub carrier: Option<String>,
    pub guide_status: Option<String>,
    pub occurrences: u32,
    pub resolution_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Query de GET /admin/tickets
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TicketListQuery {
    pub status: Option<String>,
    pub trigger: Option<String>,
    pub priority: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Filtros ya validados
#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    pub trigger: Option<TicketTrigger>,
    pub priority: Option<TicketPriority>,
    pub limit: u32,
    pub offset: u32,
}

pub const DEFAULT_TICKET_PAGE: u32 = 50;
pub const MAX_TICKET_PAGE: u32 = 200;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketPatchRequest {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub resolution_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketListResponse {
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
    pub items: Vec<Ticket>,
}

/// Conteos por estado/prioridad para el command center
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketCounts {
    pub open: u64,
    pub in_progress: u64,
    pub resolved: u64,
    pub closed: u64,
    pub open_alta: u64,
}
