//! models/risk_model.rs
//! Flags de riesgo editables por admin y la cola priorizada.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskFlagConfig {
    pub risky_cities: BTreeSet<String>,
    pub risky_carriers: BTreeSet<String>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

impl RiskFlagConfig {
    pub fn is_risky_city(&self, city: &str) -> bool {
        contains_normalized(&self.risky_cities, city)
    }

    pub fn is_risky_carrier(&self, carrier: &str) -> bool {
        contains_normalized(&self.risky_carriers, carrier)
    }
}

fn contains_normalized(set: &BTreeSet<String>, value: &str) -> bool {
    let needle = normalize(value);
    !needle.is_empty() && set.iter().any(|entry| normalize(entry) == needle)
}

/// Comparación sin mayúsculas ni espacios sobrantes.
pub fn normalize(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Body de PUT /admin/risk-flags
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskFlagsUpdate {
    pub risky_cities: Vec<String>,
    pub risky_carriers: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "HIGH" => Some(RiskLevel::High),
            "MEDIUM" => Some(RiskLevel::Medium),
            "LOW" => Some(RiskLevel::Low),
            _ => None,
        }
    }
}

/// Opciones de `rank`.
#[derive(Debug, Clone)]
pub struct RankOptions {
    pub level: Option<RiskLevel>,
    pub limit: usize,
    pub include_terminal: bool,
}

pub const DEFAULT_QUEUE_LIMIT: usize = 50;
pub const MAX_QUEUE_LIMIT: usize = 500;

impl Default for RankOptions {
    fn default() -> Self {
        RankOptions {
            level: None,
            limit: DEFAULT_QUEUE_LIMIT,
            include_terminal: false,
        }
    }
}

/// Query de GET /admin/risk-queue
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskQueueQuery {
    pub level: Option<String>,
    pub limit: Option<usize>,
    pub include_terminal: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedGuide {
    pub guide_id: String,
    pub carrier: String,
    pub city: String,
    pub status: String,
    pub score: u32,
    pub level: RiskLevel,
    pub days_without_movement: i64,
    pub last_status_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskQueueResponse {
    pub generated_at: DateTime<Utc>,
    pub total: usize,
    pub items: Vec<RankedGuide>,
}
