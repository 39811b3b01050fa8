//! Audit records and aggregate counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use palisade_core::classifier::{ThreatCategory, ThreatLevel};
use palisade_core::firewall::{FirewallRequest, Verdict};
use palisade_core::policy::Action;

/// Maximum preview length in characters.
const PREVIEW_MAX_LEN: usize = 50;

/// One decision, flattened and denormalized for append-only storage.
/// Self-contained: no record references any other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique record identifier.
    pub record_id: String,
    /// Decision time.
    pub timestamp: DateTime<Utc>,
    /// Caller identity, when known.
    pub user_id: Option<String>,
    /// Session identity, when known.
    pub session_id: Option<String>,
    /// The submitted text.
    pub prompt: String,
    /// SHA-256 of the submitted text, for matching without quoting it.
    pub prompt_hash: String,
    /// Truncated, control-character-free preview of the text.
    pub preview: String,
    /// Action the policy prescribed.
    pub action: Action,
    /// Whether the request was allowed through.
    pub allowed: bool,
    /// Whether a sanitized rewrite was produced.
    pub sanitized: bool,
    /// Risk score from classification.
    pub threat_score: f64,
    /// Severity tier from classification.
    pub threat_level: ThreatLevel,
    /// Category tags from classification.
    pub categories: Vec<ThreatCategory>,
    /// Classifier confidence.
    pub confidence: f64,
    /// Name of the rule that decided the request.
    pub policy_matched: String,
    /// Outcome summary from the verdict.
    pub message: String,
    /// End-to-end processing latency in microseconds.
    pub duration_us: u64,
}

impl AuditRecord {
    /// Builds a record from one decided request, assigning a fresh id.
    pub fn from_decision(request: &FirewallRequest, verdict: &Verdict) -> Self {
        Self {
            record_id: Uuid::new_v4().to_string(),
            timestamp: verdict.timestamp,
            user_id: request.user_id.clone(),
            session_id: request.session_id.clone(),
            prompt: request.prompt.clone(),
            prompt_hash: hash_prompt(&request.prompt),
            preview: create_preview(&request.prompt),
            action: verdict.action,
            allowed: verdict.allowed,
            sanitized: verdict.sanitized_prompt.is_some(),
            threat_score: verdict.threat_score,
            threat_level: verdict.threat_level,
            categories: verdict.classification.categories.clone(),
            confidence: verdict.classification.confidence,
            policy_matched: verdict.rule_match.policy_name.clone(),
            message: verdict.message.clone(),
            duration_us: verdict.duration_us,
        }
    }
}

/// Running totals over recorded decisions. Monotonically non-decreasing
/// until an explicit reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    /// Every recorded decision.
    pub total_requests: u64,
    /// Decisions with the block action.
    pub blocked: u64,
    /// Decisions with the sanitize action.
    pub sanitized: u64,
    /// Decisions with the allow action.
    pub allowed: u64,
    /// Decisions whose severity tier was high or critical.
    pub threats_detected: u64,
}

impl Counters {
    /// Applies one decision. The action bucket and the threat counter are
    /// independent increments.
    pub fn apply(&mut self, action: Action, level: ThreatLevel) {
        self.total_requests += 1;

        match action {
            Action::Block => self.blocked += 1,
            Action::Sanitize => self.sanitized += 1,
            Action::Allow => self.allowed += 1,
            Action::Log | Action::Alert => {}
        }

        if level.is_threat() {
            self.threats_detected += 1;
        }
    }
}

/// Counters plus derived rates, computed at read time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LedgerStats {
    /// Every recorded decision.
    pub total_requests: u64,
    /// Decisions with the block action.
    pub blocked: u64,
    /// Decisions with the sanitize action.
    pub sanitized: u64,
    /// Decisions with the allow action.
    pub allowed: u64,
    /// Decisions whose severity tier was high or critical.
    pub threats_detected: u64,
    /// Blocked percentage of total requests; 0 when no requests.
    pub block_rate: f64,
    /// Sanitized percentage of total requests; 0 when no requests.
    pub sanitize_rate: f64,
    /// Threat percentage of total requests; 0 when no requests.
    pub threat_rate: f64,
}

impl From<Counters> for LedgerStats {
    fn from(counters: Counters) -> Self {
        let rate = |count: u64| {
            if counters.total_requests == 0 {
                0.0
            } else {
                count as f64 / counters.total_requests as f64 * 100.0
            }
        };

        Self {
            total_requests: counters.total_requests,
            blocked: counters.blocked,
            sanitized: counters.sanitized,
            allowed: counters.allowed,
            threats_detected: counters.threats_detected,
            block_rate: rate(counters.blocked),
            sanitize_rate: rate(counters.sanitized),
            threat_rate: rate(counters.threats_detected),
        }
    }
}

/// Hashes a prompt with SHA-256, hex-encoded.
pub fn hash_prompt(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    let result = hasher.finalize();
    hex_encode(result)
}

/// Creates a preview from a prompt (truncated, control characters removed).
pub fn create_preview(prompt: &str) -> String {
    let cleaned: String = prompt
        .chars()
        .filter(|c| !c.is_control())
        .take(PREVIEW_MAX_LEN)
        .collect();

    if prompt.chars().count() > PREVIEW_MAX_LEN {
        format!("{}...", cleaned)
    } else {
        cleaned
    }
}

fn hex_encode(bytes: impl AsRef<[u8]>) -> String {
    const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

    let bytes = bytes.as_ref();
    let mut hex = String::with_capacity(bytes.len() * 2);
    for &byte in bytes {
        hex.push(HEX_CHARS[(byte >> 4) as usize] as char);
        hex.push(HEX_CHARS[(byte & 0xf) as usize] as char);
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_distinct() {
        let hash1 = hash_prompt("hello");
        let hash2 = hash_prompt("hello");
        let hash3 = hash_prompt("world");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn preview_truncates_long_prompts() {
        assert_eq!(create_preview("short"), "short");
        assert_eq!(
            create_preview("a".repeat(100).as_str()),
            format!("{}...", "a".repeat(50))
        );
    }

    #[test]
    fn preview_strips_control_characters() {
        assert_eq!(create_preview("a\nb\tc"), "abc");
    }

    #[test]
    fn counters_bucket_exactly_one_action() {
        let mut counters = Counters::default();
        counters.apply(Action::Block, ThreatLevel::Critical);
        counters.apply(Action::Sanitize, ThreatLevel::High);
        counters.apply(Action::Allow, ThreatLevel::Safe);
        counters.apply(Action::Log, ThreatLevel::Medium);
        counters.apply(Action::Alert, ThreatLevel::Low);

        assert_eq!(counters.total_requests, 5);
        assert_eq!(counters.blocked, 1);
        assert_eq!(counters.sanitized, 1);
        assert_eq!(counters.allowed, 1);
        // Log and alert increment no bucket, so the bucket sum trails total.
        assert!(counters.blocked + counters.sanitized + counters.allowed <= counters.total_requests);
    }

    #[test]
    fn threat_counter_is_independent_of_action() {
        let mut counters = Counters::default();
        counters.apply(Action::Allow, ThreatLevel::High);
        counters.apply(Action::Block, ThreatLevel::Low);

        assert_eq!(counters.threats_detected, 1);
        assert_eq!(counters.blocked, 1);
        assert_eq!(counters.allowed, 1);
    }

    #[test]
    fn rates_are_zero_for_empty_ledger() {
        let stats = LedgerStats::from(Counters::default());
        assert_eq!(stats.block_rate, 0.0);
        assert_eq!(stats.sanitize_rate, 0.0);
        assert_eq!(stats.threat_rate, 0.0);
    }

    #[test]
    fn rates_are_percentages() {
        let mut counters = Counters::default();
        counters.apply(Action::Block, ThreatLevel::Critical);
        counters.apply(Action::Allow, ThreatLevel::Safe);
        counters.apply(Action::Allow, ThreatLevel::Safe);
        counters.apply(Action::Allow, ThreatLevel::Safe);

        let stats = LedgerStats::from(counters);
        assert_eq!(stats.block_rate, 25.0);
        assert_eq!(stats.threat_rate, 25.0);
        assert_eq!(stats.sanitize_rate, 0.0);
    }

    #[test]
    fn record_round_trips_through_json() {
        let request = FirewallRequest::new("test prompt").with_user("u1");
        let verdict = sample_verdict(&request);
        let record = AuditRecord::from_decision(&request, &verdict);

        let json = serde_json::to_string(&record).unwrap();
        let back: AuditRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.record_id, record.record_id);
        assert_eq!(back.prompt, "test prompt");
        assert_eq!(back.action, Action::Allow);
    }

    #[test]
    fn record_ids_are_unique() {
        let request = FirewallRequest::new("same prompt");
        let verdict = sample_verdict(&request);

        let a = AuditRecord::from_decision(&request, &verdict);
        let b = AuditRecord::from_decision(&request, &verdict);
        assert_ne!(a.record_id, b.record_id);
    }

    fn sample_verdict(request: &FirewallRequest) -> Verdict {
        use palisade_core::classifier::Classification;
        use palisade_core::policy::RuleMatch;

        Verdict {
            action: Action::Allow,
            allowed: true,
            original_prompt: request.prompt.clone(),
            sanitized_prompt: None,
            threat_score: 0.0,
            threat_level: ThreatLevel::Safe,
            classification: Classification::safe(),
            rule_match: RuleMatch::default_allow(),
            message: "Request allowed".to_string(),
            timestamp: Utc::now(),
            duration_us: 42,
        }
    }
}
