//! Palisade Core - the prompt firewall decision pipeline.
//!
//! Text submitted to an LLM flows through four stages: threat
//! classification, ordered policy matching, optional sanitization, and
//! audit recording. This crate implements the first three plus the
//! orchestrator; the ledger lives in `palisade-ledger` and plugs in
//! through the [`firewall::AuditRecorder`] trait.
//!
//! # Example
//!
//! ```
//! use std::sync::{Arc, RwLock};
//!
//! use palisade_core::classifier::LexicalClassifier;
//! use palisade_core::firewall::Firewall;
//! use palisade_core::policy::{Action, PolicyEngine};
//! use palisade_core::sanitizer::Sanitizer;
//!
//! let firewall = Firewall::new(
//!     Box::new(LexicalClassifier::new()),
//!     Arc::new(RwLock::new(PolicyEngine::new())),
//!     Sanitizer::new(),
//!     None,
//! );
//!
//! let verdict = firewall.check_prompt("What is the capital of France?").unwrap();
//! assert_eq!(verdict.action, Action::Allow);
//! assert!(verdict.allowed);
//! ```

pub mod classifier;
pub mod firewall;
pub mod policy;
pub mod sanitizer;

pub use classifier::{
    Classification, LexicalClassifier, RemoteClassifier, RemoteConfig, ThreatCategory,
    ThreatClassifier, ThreatLevel,
};
pub use firewall::{
    AuditRecorder, Firewall, FirewallError, FirewallRequest, RecordError, Verdict,
};
pub use policy::{Action, PolicyEngine, PolicyError, RuleDefinition, RuleMatch};
pub use sanitizer::{SanitizeOptions, Sanitized, Sanitizer};
