//! Threat levels, categories, and classification results.

use serde::{Deserialize, Serialize};

/// Severity tiers for classified text, ordered from harmless to critical.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ThreatLevel {
    /// No adversarial signal detected.
    #[default]
    Safe,
    /// Weak signal, normally allowed.
    Low,
    /// Moderate signal, worth recording.
    Medium,
    /// Strong signal, candidate for rewriting.
    High,
    /// Unambiguous attack, candidate for blocking.
    Critical,
}

impl ThreatLevel {
    /// Maps a 0-100 risk score onto a tier.
    ///
    /// Breakpoints are 20/40/60/80: a score of exactly 40 is `Medium`,
    /// exactly 80 is `Critical`.
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            ThreatLevel::Critical
        } else if score >= 60.0 {
            ThreatLevel::High
        } else if score >= 40.0 {
            ThreatLevel::Medium
        } else if score >= 20.0 {
            ThreatLevel::Low
        } else {
            ThreatLevel::Safe
        }
    }

    /// Returns the storage/wire name for this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLevel::Safe => "safe",
            ThreatLevel::Low => "low",
            ThreatLevel::Medium => "medium",
            ThreatLevel::High => "high",
            ThreatLevel::Critical => "critical",
        }
    }

    /// Parses a level from its wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "safe" => Some(ThreatLevel::Safe),
            "low" => Some(ThreatLevel::Low),
            "medium" => Some(ThreatLevel::Medium),
            "high" => Some(ThreatLevel::High),
            "critical" => Some(ThreatLevel::Critical),
            _ => None,
        }
    }

    /// Returns true for the tiers the audit ledger counts as threats.
    pub fn is_threat(&self) -> bool {
        *self >= ThreatLevel::High
    }
}

/// Threat categories that classified text can be tagged with.
///
/// Tags are not mutually exclusive; a single prompt can carry several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatCategory {
    /// Attempts to override or displace prior instructions.
    PromptInjection,
    /// Attempts to escape the assistant's assigned role.
    Jailbreak,
    /// References to the system prompt or system-level behavior.
    SystemManipulation,
}

impl ThreatCategory {
    /// Returns all categories.
    pub fn all() -> &'static [ThreatCategory] {
        &[
            ThreatCategory::PromptInjection,
            ThreatCategory::Jailbreak,
            ThreatCategory::SystemManipulation,
        ]
    }

    /// Returns the storage/wire name for this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatCategory::PromptInjection => "prompt_injection",
            ThreatCategory::Jailbreak => "jailbreak",
            ThreatCategory::SystemManipulation => "system_manipulation",
        }
    }

    /// Parses a category from its wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "prompt_injection" => Some(ThreatCategory::PromptInjection),
            "jailbreak" => Some(ThreatCategory::Jailbreak),
            "system_manipulation" => Some(ThreatCategory::SystemManipulation),
            _ => None,
        }
    }
}

/// Result of classifying one piece of text. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    /// Risk score on a continuous 0-100 scale.
    pub score: f64,
    /// Severity tier derived from the score.
    pub level: ThreatLevel,
    /// Whether the text is considered adversarial.
    pub is_flagged: bool,
    /// Category tags; set semantics, order carries no meaning.
    pub categories: Vec<ThreatCategory>,
    /// Strategy confidence (0.0 to 1.0).
    pub confidence: f64,
    /// Free-form diagnostic details from the strategy.
    #[serde(default)]
    pub details: serde_json::Value,
}

impl Classification {
    /// A zero-score, safe classification.
    pub fn safe() -> Self {
        Self {
            score: 0.0,
            level: ThreatLevel::Safe,
            is_flagged: false,
            categories: Vec::new(),
            confidence: 1.0,
            details: serde_json::Value::Null,
        }
    }

    /// Returns true if the given category was tagged.
    pub fn has_category(&self, category: ThreatCategory) -> bool {
        self.categories.contains(&category)
    }

    /// Score expressed as a 0.0-1.0 fraction, the scale policy thresholds use.
    pub fn score_fraction(&self) -> f64 {
        self.score / 100.0
    }
}

impl Default for Classification {
    fn default() -> Self {
        Self::safe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_totally_ordered() {
        assert!(ThreatLevel::Safe < ThreatLevel::Low);
        assert!(ThreatLevel::Low < ThreatLevel::Medium);
        assert!(ThreatLevel::Medium < ThreatLevel::High);
        assert!(ThreatLevel::High < ThreatLevel::Critical);
    }

    #[test]
    fn level_from_score_boundaries_are_exact() {
        assert_eq!(ThreatLevel::from_score(0.0), ThreatLevel::Safe);
        assert_eq!(ThreatLevel::from_score(19.999), ThreatLevel::Safe);
        assert_eq!(ThreatLevel::from_score(20.0), ThreatLevel::Low);
        assert_eq!(ThreatLevel::from_score(39.999), ThreatLevel::Low);
        assert_eq!(ThreatLevel::from_score(40.0), ThreatLevel::Medium);
        assert_eq!(ThreatLevel::from_score(59.999), ThreatLevel::Medium);
        assert_eq!(ThreatLevel::from_score(60.0), ThreatLevel::High);
        assert_eq!(ThreatLevel::from_score(79.999), ThreatLevel::High);
        assert_eq!(ThreatLevel::from_score(80.0), ThreatLevel::Critical);
        assert_eq!(ThreatLevel::from_score(100.0), ThreatLevel::Critical);
    }

    #[test]
    fn high_and_critical_are_threats() {
        assert!(!ThreatLevel::Safe.is_threat());
        assert!(!ThreatLevel::Low.is_threat());
        assert!(!ThreatLevel::Medium.is_threat());
        assert!(ThreatLevel::High.is_threat());
        assert!(ThreatLevel::Critical.is_threat());
    }

    #[test]
    fn level_round_trips_through_wire_name() {
        for level in [
            ThreatLevel::Safe,
            ThreatLevel::Low,
            ThreatLevel::Medium,
            ThreatLevel::High,
            ThreatLevel::Critical,
        ] {
            assert_eq!(ThreatLevel::parse(level.as_str()), Some(level));
        }
        assert_eq!(ThreatLevel::parse("bogus"), None);
    }

    #[test]
    fn category_serialization_is_snake_case() {
        assert_eq!(
            serde_json::to_string(&ThreatCategory::PromptInjection).unwrap(),
            "\"prompt_injection\""
        );
        assert_eq!(
            serde_json::to_string(&ThreatLevel::Critical).unwrap(),
            "\"critical\""
        );
    }

    #[test]
    fn safe_classification_has_no_categories() {
        let c = Classification::safe();
        assert_eq!(c.score, 0.0);
        assert_eq!(c.level, ThreatLevel::Safe);
        assert!(!c.is_flagged);
        assert!(c.categories.is_empty());
        assert!(!c.has_category(ThreatCategory::Jailbreak));
    }

    #[test]
    fn score_fraction_matches_policy_scale() {
        let c = Classification {
            score: 65.0,
            ..Classification::safe()
        };
        assert!((c.score_fraction() - 0.65).abs() < f64::EPSILON);
    }
}
