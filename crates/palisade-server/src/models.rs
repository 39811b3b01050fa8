//! Request and response DTOs for the API.

use serde::{Deserialize, Serialize};

use palisade_core::classifier::{ThreatCategory, ThreatLevel};
use palisade_core::firewall::Verdict;
use palisade_core::policy::{Action, RuleDefinition};
use palisade_ledger::{AuditRecord, LedgerStats};

/// POST /check request body.
#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    /// Text to analyze.
    pub prompt: String,
    /// Optional caller identity.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Optional session identity.
    #[serde(default)]
    pub session_id: Option<String>,
}

/// POST /check response body.
#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub action: Action,
    pub allowed: bool,
    pub threat_score: f64,
    pub threat_level: ThreatLevel,
    pub categories: Vec<ThreatCategory>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sanitized_prompt: Option<String>,
    pub processing_time_ms: f64,
}

impl From<Verdict> for CheckResponse {
    fn from(verdict: Verdict) -> Self {
        Self {
            action: verdict.action,
            allowed: verdict.allowed,
            threat_score: verdict.threat_score,
            threat_level: verdict.threat_level,
            categories: verdict.classification.categories.clone(),
            message: verdict.message,
            sanitized_prompt: verdict.sanitized_prompt,
            processing_time_ms: verdict.duration_us as f64 / 1000.0,
        }
    }
}

/// One entry in a batch check response.
#[derive(Debug, Serialize)]
pub struct BatchEntry {
    pub prompt: String,
    pub action: Action,
    pub allowed: bool,
    pub threat_score: f64,
    pub threat_level: ThreatLevel,
}

/// POST /batch response body.
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub total: usize,
    pub allowed: usize,
    pub blocked: usize,
    pub results: Vec<BatchEntry>,
}

/// GET /stats response body.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_requests: u64,
    pub blocked: u64,
    pub sanitized: u64,
    pub allowed: u64,
    pub threats_detected: u64,
    pub block_rate: f64,
    pub sanitize_rate: f64,
    pub threat_rate: f64,
}

impl From<LedgerStats> for StatsResponse {
    fn from(stats: LedgerStats) -> Self {
        Self {
            total_requests: stats.total_requests,
            blocked: stats.blocked,
            sanitized: stats.sanitized,
            allowed: stats.allowed,
            threats_detected: stats.threats_detected,
            block_rate: stats.block_rate,
            sanitize_rate: stats.sanitize_rate,
            threat_rate: stats.threat_rate,
        }
    }
}

/// GET /threats query parameters.
#[derive(Debug, Deserialize)]
pub struct ThreatsQuery {
    /// Maximum number of records to return.
    #[serde(default = "default_threat_limit")]
    pub limit: usize,
}

fn default_threat_limit() -> usize {
    10
}

/// GET /threats response body.
#[derive(Debug, Serialize)]
pub struct ThreatsResponse {
    pub threats: Vec<AuditRecord>,
    pub count: usize,
}

/// GET /rules response body.
#[derive(Debug, Serialize)]
pub struct RulesResponse {
    pub rules: Vec<RuleDefinition>,
    pub count: usize,
}

/// PUT /rules response body.
#[derive(Debug, Serialize)]
pub struct LoadRulesResponse {
    pub loaded: usize,
}

/// DELETE /rules/{name} response body.
#[derive(Debug, Serialize)]
pub struct RuleRemovedResponse {
    pub removed: String,
}

/// GET /health response body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

impl HealthResponse {
    /// The healthy response for this build.
    pub fn healthy() -> Self {
        Self {
            status: "healthy",
            service: "palisade",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}
