//! The audit ledger.
//!
//! Observes every firewall decision: appends a self-contained record to
//! durable storage, mirrors high-severity records to a flagged stream, and
//! keeps running aggregate counters in memory. Durable writes are
//! best-effort; their failure is an operational warning, never a request
//! failure.

use std::path::Path;
use std::sync::Mutex;

use tracing::{info, warn};

use palisade_core::firewall::{AuditRecorder, FirewallRequest, RecordError, Verdict};

use crate::error::{LedgerError, Result};
use crate::record::{AuditRecord, Counters, LedgerStats};
use crate::sink::{AuditSink, JsonlSink, MemorySink};

/// Audit ledger over a pair of append-only sinks.
pub struct AuditLedger {
    /// Every decision, in arrival order.
    audit: Box<dyn AuditSink>,
    /// Only high/critical decisions, in arrival order.
    flagged: Box<dyn AuditSink>,
    /// In-memory aggregate counters; one guard keeps each record's
    /// increments all-or-nothing with respect to `clear`.
    counters: Mutex<Counters>,
}

impl AuditLedger {
    /// Creates a ledger over the given sinks.
    pub fn with_sinks(audit: Box<dyn AuditSink>, flagged: Box<dyn AuditSink>) -> Self {
        Self {
            audit,
            flagged,
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Creates an in-memory ledger.
    pub fn in_memory() -> Self {
        Self::with_sinks(Box::new(MemorySink::new()), Box::new(MemorySink::new()))
    }

    /// Creates a JSONL-file ledger inside the given directory, writing
    /// `audit.jsonl` and `threats.jsonl`.
    pub fn jsonl(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let audit = JsonlSink::new(dir.join("audit.jsonl"))?;
        let flagged = JsonlSink::new(dir.join("threats.jsonl"))?;

        info!(dir = %dir.display(), "audit ledger opened");
        Ok(Self::with_sinks(Box::new(audit), Box::new(flagged)))
    }

    /// Records one decision and returns the assigned record id.
    ///
    /// Counters always update; sink appends are best-effort and surfaced
    /// as warnings when they fail.
    pub fn record(&self, request: &FirewallRequest, verdict: &Verdict) -> Result<String> {
        let record = AuditRecord::from_decision(request, verdict);

        {
            let mut counters = self.counters.lock().map_err(|_| LedgerError::Poisoned)?;
            counters.apply(record.action, record.threat_level);
        }

        if let Err(err) = self.audit.append(&record) {
            warn!(error = %err, "audit append failed; counters still updated");
        }

        if record.threat_level.is_threat() {
            if let Err(err) = self.flagged.append(&record) {
                warn!(error = %err, "flagged append failed");
            }
        }

        Ok(record.record_id)
    }

    /// Current aggregate counters with derived rates.
    pub fn stats(&self) -> LedgerStats {
        let counters = self
            .counters
            .lock()
            .map(|c| *c)
            .unwrap_or_default();
        LedgerStats::from(counters)
    }

    /// Up to `limit` most-recent high/critical records, in arrival order
    /// with the newest last. Read failures degrade to an empty list.
    pub fn recent_flagged(&self, limit: usize) -> Vec<AuditRecord> {
        match self.flagged.tail(limit) {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "failed to read flagged records");
                Vec::new()
            }
        }
    }

    /// Up to `limit` most-recent records of any severity, in arrival order.
    pub fn recent(&self, limit: usize) -> Vec<AuditRecord> {
        match self.audit.tail(limit) {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "failed to read audit records");
                Vec::new()
            }
        }
    }

    /// Wipes all records and zeroes all counters. Holding the counter
    /// guard for the whole operation keeps it atomic with respect to the
    /// counter side of concurrent `record` calls.
    pub fn clear(&self) -> Result<()> {
        let mut counters = self.counters.lock().map_err(|_| LedgerError::Poisoned)?;

        self.audit.clear()?;
        self.flagged.clear()?;
        *counters = Counters::default();

        info!("audit ledger cleared");
        Ok(())
    }
}

impl AuditRecorder for AuditLedger {
    fn record(
        &self,
        request: &FirewallRequest,
        verdict: &Verdict,
    ) -> std::result::Result<String, RecordError> {
        AuditLedger::record(self, request, verdict).map_err(|err| RecordError(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use palisade_core::classifier::{Classification, ThreatLevel};
    use palisade_core::policy::{Action, RuleMatch};

    fn verdict(action: Action, score: f64) -> Verdict {
        let level = ThreatLevel::from_score(score);
        Verdict {
            action,
            allowed: action != Action::Block,
            original_prompt: "p".to_string(),
            sanitized_prompt: if action == Action::Sanitize {
                Some("p cleaned".to_string())
            } else {
                None
            },
            threat_score: score,
            threat_level: level,
            classification: Classification {
                score,
                level,
                is_flagged: score >= 40.0,
                categories: Vec::new(),
                confidence: 0.7,
                details: serde_json::Value::Null,
            },
            rule_match: RuleMatch::default_allow(),
            message: String::new(),
            timestamp: Utc::now(),
            duration_us: 5,
        }
    }

    fn request(prompt: &str) -> FirewallRequest {
        FirewallRequest::new(prompt)
    }

    #[test]
    fn record_returns_unique_ids() {
        let ledger = AuditLedger::in_memory();
        let mut ids = std::collections::HashSet::new();

        for i in 0..50 {
            let id = ledger
                .record(&request(&format!("p{}", i)), &verdict(Action::Allow, 0.0))
                .unwrap();
            assert!(ids.insert(id), "duplicate record id");
        }
    }

    #[test]
    fn counters_track_action_buckets() {
        let ledger = AuditLedger::in_memory();
        ledger.record(&request("a"), &verdict(Action::Block, 90.0)).unwrap();
        ledger.record(&request("b"), &verdict(Action::Sanitize, 70.0)).unwrap();
        ledger.record(&request("c"), &verdict(Action::Allow, 0.0)).unwrap();
        ledger.record(&request("d"), &verdict(Action::Log, 45.0)).unwrap();

        let stats = ledger.stats();
        assert_eq!(stats.total_requests, 4);
        assert_eq!(stats.blocked, 1);
        assert_eq!(stats.sanitized, 1);
        assert_eq!(stats.allowed, 1);
        assert!(stats.blocked + stats.sanitized + stats.allowed <= stats.total_requests);
    }

    #[test]
    fn threat_counter_follows_severity_not_action() {
        let ledger = AuditLedger::in_memory();
        // High severity but allowed: still a detected threat.
        ledger.record(&request("a"), &verdict(Action::Allow, 65.0)).unwrap();
        // Blocked but low severity: not a detected threat.
        ledger.record(&request("b"), &verdict(Action::Block, 25.0)).unwrap();

        let stats = ledger.stats();
        assert_eq!(stats.threats_detected, 1);
        assert_eq!(stats.blocked, 1);
    }

    #[test]
    fn rates_compute_on_read() {
        let ledger = AuditLedger::in_memory();
        assert_eq!(ledger.stats().block_rate, 0.0);

        ledger.record(&request("a"), &verdict(Action::Block, 90.0)).unwrap();
        ledger.record(&request("b"), &verdict(Action::Allow, 0.0)).unwrap();

        let stats = ledger.stats();
        assert_eq!(stats.block_rate, 50.0);
        assert_eq!(stats.threat_rate, 50.0);
    }

    #[test]
    fn recent_flagged_only_returns_high_and_critical() {
        let ledger = AuditLedger::in_memory();
        ledger.record(&request("safe"), &verdict(Action::Allow, 0.0)).unwrap();
        ledger.record(&request("medium"), &verdict(Action::Log, 45.0)).unwrap();
        ledger.record(&request("high"), &verdict(Action::Sanitize, 70.0)).unwrap();
        ledger.record(&request("critical"), &verdict(Action::Block, 95.0)).unwrap();

        let flagged = ledger.recent_flagged(10);
        assert_eq!(flagged.len(), 2);
        assert_eq!(flagged[0].prompt, "high");
        assert_eq!(flagged[1].prompt, "critical");
    }

    #[test]
    fn recent_flagged_respects_limit_and_order() {
        let ledger = AuditLedger::in_memory();
        for i in 0..6 {
            ledger
                .record(&request(&format!("threat {}", i)), &verdict(Action::Block, 90.0))
                .unwrap();
        }

        let flagged = ledger.recent_flagged(3);
        assert_eq!(flagged.len(), 3);
        // Arrival order, newest last.
        assert_eq!(flagged[0].prompt, "threat 3");
        assert_eq!(flagged[2].prompt, "threat 5");
    }

    #[test]
    fn clear_wipes_records_and_counters() {
        let ledger = AuditLedger::in_memory();
        ledger.record(&request("a"), &verdict(Action::Block, 95.0)).unwrap();
        ledger.clear().unwrap();

        let stats = ledger.stats();
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.blocked, 0);
        assert!(ledger.recent(10).is_empty());
        assert!(ledger.recent_flagged(10).is_empty());
    }

    #[test]
    fn jsonl_ledger_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let ledger = AuditLedger::jsonl(dir.path()).unwrap();
            ledger.record(&request("persisted"), &verdict(Action::Block, 95.0)).unwrap();
        }

        // Records are durable; counters are in-memory and start fresh.
        let ledger = AuditLedger::jsonl(dir.path()).unwrap();
        let tail = ledger.recent(10);
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].prompt, "persisted");
        assert_eq!(ledger.stats().total_requests, 0);
    }

    #[test]
    fn concurrent_records_have_unique_ids_and_exact_totals() {
        use std::sync::Arc;

        let ledger = Arc::new(AuditLedger::in_memory());
        let mut handles = Vec::new();

        for t in 0..8 {
            let ledger = Arc::clone(&ledger);
            handles.push(std::thread::spawn(move || {
                let mut ids = Vec::new();
                for i in 0..25 {
                    let id = ledger
                        .record(
                            &FirewallRequest::new(format!("t{} p{}", t, i)),
                            &verdict(Action::Allow, 0.0),
                        )
                        .unwrap();
                    ids.push(id);
                }
                ids
            }));
        }

        let mut all_ids = std::collections::HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(all_ids.insert(id), "duplicate record id under concurrency");
            }
        }

        assert_eq!(ledger.stats().total_requests, 200);
        assert_eq!(ledger.stats().allowed, 200);
    }

    #[test]
    fn ledger_implements_the_recorder_contract() {
        let ledger: Box<dyn AuditRecorder> = Box::new(AuditLedger::in_memory());
        let id = ledger
            .record(&request("via trait"), &verdict(Action::Allow, 0.0))
            .unwrap();
        assert!(!id.is_empty());
    }
}
