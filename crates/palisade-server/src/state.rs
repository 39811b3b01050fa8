//! Application state for the API server.

use std::sync::{Arc, RwLock};

use palisade_core::classifier::{LexicalClassifier, ThreatClassifier};
use palisade_core::firewall::{AuditRecorder, Firewall};
use palisade_core::policy::PolicyEngine;
use palisade_core::sanitizer::Sanitizer;
use palisade_ledger::AuditLedger;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// The decision pipeline.
    pub firewall: Arc<Firewall>,
    /// Shared policy engine, also held by the firewall; rule management
    /// through this handle is visible to in-flight checks.
    pub policy: Arc<RwLock<PolicyEngine>>,
    /// The audit ledger, also the firewall's recorder.
    pub ledger: Arc<AuditLedger>,
}

impl AppState {
    /// Creates application state from explicitly constructed components.
    pub fn with_components(
        classifier: Box<dyn ThreatClassifier>,
        engine: PolicyEngine,
        ledger: AuditLedger,
    ) -> Self {
        let policy = Arc::new(RwLock::new(engine));
        let ledger = Arc::new(ledger);
        let recorder: Arc<dyn AuditRecorder> = ledger.clone();

        let firewall = Arc::new(Firewall::new(
            classifier,
            policy.clone(),
            Sanitizer::new(),
            Some(recorder),
        ));

        Self {
            firewall,
            policy,
            ledger,
        }
    }

    /// Creates state with the lexical classifier, default policy, and an
    /// in-memory ledger.
    pub fn in_memory() -> Self {
        Self::with_components(
            Box::new(LexicalClassifier::new()),
            PolicyEngine::new(),
            AuditLedger::in_memory(),
        )
    }
}
