//! The decision orchestrator.
//!
//! Composes classifier, policy engine, and sanitizer into one
//! request/response cycle and hands every verdict to the audit recorder
//! before returning it.

use std::sync::{Arc, RwLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::classifier::{Classification, ThreatClassifier, ThreatLevel};
use crate::policy::{Action, PolicyEngine, RuleMatch};
use crate::sanitizer::Sanitizer;

/// One incoming check request. Immutable for the duration of the check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirewallRequest {
    /// The submitted text.
    pub prompt: String,
    /// Caller identity, when known.
    pub user_id: Option<String>,
    /// Session identity, when known.
    pub session_id: Option<String>,
    /// Arrival time.
    pub timestamp: DateTime<Utc>,
}

impl FirewallRequest {
    /// Creates a request arriving now.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            user_id: None,
            session_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Sets the caller identity.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the session identity.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// The firewall's decision for one request. Read-only history once
/// produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    /// The action the matched policy prescribed.
    pub action: Action,
    /// False if and only if the action is block.
    pub allowed: bool,
    /// The text as submitted.
    pub original_prompt: String,
    /// The rewritten text; present if and only if the action is sanitize.
    pub sanitized_prompt: Option<String>,
    /// Risk score from classification.
    pub threat_score: f64,
    /// Severity tier from classification.
    pub threat_level: ThreatLevel,
    /// The full classification result.
    pub classification: Classification,
    /// The rule that decided this request.
    pub rule_match: RuleMatch,
    /// Human-readable outcome summary.
    pub message: String,
    /// Decision time.
    pub timestamp: DateTime<Utc>,
    /// End-to-end processing latency in microseconds.
    pub duration_us: u64,
}

/// Errors a single check can fail with. Nothing here is fatal to the
/// process; each rejects exactly one request.
#[derive(Debug, Error)]
pub enum FirewallError {
    /// The request carried no usable text.
    #[error("prompt must not be empty")]
    EmptyPrompt,

    /// The shared policy engine lock was poisoned by a panicking writer.
    #[error("policy engine lock poisoned")]
    PolicyPoisoned,
}

/// Error returned by an audit recorder.
#[derive(Debug, Error)]
#[error("audit record failed: {0}")]
pub struct RecordError(pub String);

/// Where decided verdicts are recorded.
///
/// Implemented by the audit ledger; recording is best-effort from the
/// firewall's point of view and never fails a request.
pub trait AuditRecorder: Send + Sync {
    /// Appends one decision and returns the assigned record id.
    fn record(&self, request: &FirewallRequest, verdict: &Verdict) -> Result<String, RecordError>;
}

/// The firewall engine: classify, evaluate policy, optionally sanitize,
/// record, respond.
pub struct Firewall {
    classifier: Box<dyn ThreatClassifier>,
    policy: Arc<RwLock<PolicyEngine>>,
    sanitizer: Sanitizer,
    recorder: Option<Arc<dyn AuditRecorder>>,
}

impl Firewall {
    /// Creates a firewall from explicitly constructed components.
    pub fn new(
        classifier: Box<dyn ThreatClassifier>,
        policy: Arc<RwLock<PolicyEngine>>,
        sanitizer: Sanitizer,
        recorder: Option<Arc<dyn AuditRecorder>>,
    ) -> Self {
        Self {
            classifier,
            policy,
            sanitizer,
            recorder,
        }
    }

    /// The shared policy engine handle, for rule management alongside
    /// concurrent checks.
    pub fn policy(&self) -> &Arc<RwLock<PolicyEngine>> {
        &self.policy
    }

    /// The active classifier strategy name.
    pub fn classifier_name(&self) -> &'static str {
        self.classifier.name()
    }

    /// Checks one request and returns the verdict.
    pub fn check(&self, request: FirewallRequest) -> Result<Verdict, FirewallError> {
        if request.prompt.trim().is_empty() {
            return Err(FirewallError::EmptyPrompt);
        }

        let start = Instant::now();

        let classification = self.classifier.classify(&request.prompt);

        let rule_match = {
            let engine = self
                .policy
                .read()
                .map_err(|_| FirewallError::PolicyPoisoned)?;
            engine.evaluate(&classification)
        };

        let mut verdict = self.execute_action(&request, classification, rule_match);
        verdict.duration_us = start.elapsed().as_micros() as u64;

        if let Some(recorder) = &self.recorder {
            match recorder.record(&request, &verdict) {
                Ok(record_id) => debug!(%record_id, action = verdict.action.as_str(), "verdict recorded"),
                Err(err) => warn!(error = %err, "failed to record verdict"),
            }
        }

        Ok(verdict)
    }

    /// Checks bare text with no caller identity.
    pub fn check_prompt(&self, prompt: &str) -> Result<Verdict, FirewallError> {
        self.check(FirewallRequest::new(prompt))
    }

    fn execute_action(
        &self,
        request: &FirewallRequest,
        classification: Classification,
        rule_match: RuleMatch,
    ) -> Verdict {
        let action = rule_match.action;

        let (allowed, sanitized_prompt, message) = match action {
            Action::Block => (
                false,
                None,
                "Request blocked due to security policy".to_string(),
            ),
            Action::Sanitize => {
                let sanitized = self.sanitizer.sanitize(&request.prompt);
                let message = format!("Prompt sanitized: {} changes made", sanitized.changes.len());
                (true, Some(sanitized.text), message)
            }
            Action::Allow | Action::Log | Action::Alert => {
                (true, None, "Request allowed".to_string())
            }
        };

        Verdict {
            action,
            allowed,
            original_prompt: request.prompt.clone(),
            sanitized_prompt,
            threat_score: classification.score,
            threat_level: classification.level,
            classification,
            rule_match,
            message,
            timestamp: Utc::now(),
            duration_us: 0,
        }
    }
}
