//! Lexical phrase-matching classifier.
//!
//! Scores text by counting known adversarial phrases. Fast enough to run
//! on every request and the fallback for every other strategy.

use serde_json::json;

use super::{Classification, ThreatCategory, ThreatClassifier, ThreatLevel};

/// Points contributed by each matched phrase.
const MATCH_WEIGHT: f64 = 20.0;

/// Scores at or above this mark the text as flagged.
const FLAG_THRESHOLD: f64 = 40.0;

/// Confidence reported for lexical matches. Lower than a model-backed
/// strategy would report, since substring presence is a coarse signal.
const LEXICAL_CONFIDENCE: f64 = 0.7;

/// Adversarial phrases checked against lowercased input. Each phrase
/// contributes [`MATCH_WEIGHT`] points at most once.
const ADVERSARIAL_PHRASES: &[&str] = &[
    "ignore previous instructions",
    "ignore all previous",
    "disregard",
    "forget everything",
    "new instructions",
    "system prompt",
    "you are now",
    "roleplay as",
    "jailbreak",
    "dan mode",
    "developer mode",
];

/// Phrase-presence classifier over a fixed adversarial vocabulary.
#[derive(Debug, Clone, Default)]
pub struct LexicalClassifier;

impl LexicalClassifier {
    /// Creates a new lexical classifier.
    pub fn new() -> Self {
        Self
    }

    fn derive_categories(text_lower: &str) -> Vec<ThreatCategory> {
        let mut categories = Vec::new();
        if text_lower.contains("ignore") || text_lower.contains("disregard") {
            categories.push(ThreatCategory::PromptInjection);
        }
        if text_lower.contains("roleplay") || text_lower.contains("you are now") {
            categories.push(ThreatCategory::Jailbreak);
        }
        if text_lower.contains("system") {
            categories.push(ThreatCategory::SystemManipulation);
        }
        categories
    }
}

impl ThreatClassifier for LexicalClassifier {
    fn classify(&self, text: &str) -> Classification {
        let text_lower = text.to_lowercase();

        let matches = ADVERSARIAL_PHRASES
            .iter()
            .filter(|phrase| text_lower.contains(*phrase))
            .count();

        let score = (matches as f64 * MATCH_WEIGHT).min(100.0);
        let level = ThreatLevel::from_score(score);

        Classification {
            score,
            level,
            is_flagged: score >= FLAG_THRESHOLD,
            categories: Self::derive_categories(&text_lower),
            confidence: LEXICAL_CONFIDENCE,
            details: json!({
                "matches": matches,
                "method": "lexical",
            }),
        }
    }

    fn name(&self) -> &'static str {
        "lexical"
    }
}
