//! Rule policy over classification results.
//!
//! An ordered list of rules maps classifications to actions. Evaluation is
//! first-match-wins: the earliest enabled rule whose conditions all hold
//! decides the outcome, and later rules are never consulted.

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::classifier::{Classification, ThreatCategory, ThreatLevel};

/// Action a matched rule prescribes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Pass the text through unchanged.
    #[default]
    Allow,
    /// Reject the request.
    Block,
    /// Rewrite the text before passing it on.
    Sanitize,
    /// Allow, and note the decision for review.
    Log,
    /// Allow, and raise an operator alert downstream.
    Alert,
}

impl Action {
    /// Returns the storage/wire name for this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Allow => "allow",
            Action::Block => "block",
            Action::Sanitize => "sanitize",
            Action::Log => "log",
            Action::Alert => "alert",
        }
    }

    /// Parses an action from its wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "allow" => Some(Action::Allow),
            "block" => Some(Action::Block),
            "sanitize" => Some(Action::Sanitize),
            "log" => Some(Action::Log),
            "alert" => Some(Action::Alert),
            _ => None,
        }
    }
}

/// A single policy rule.
///
/// `threshold` is compared against `score / 100`, while `severity` is
/// compared against the tier; both predicates must hold. The two scales are
/// deliberately independent: a rule can be authored so that it never fires,
/// and that is a policy-authoring concern, not an engine concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    /// Unique name within the active rule set.
    pub name: String,
    /// Disabled rules never match.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Action taken when the rule matches.
    #[serde(default = "default_action")]
    pub action: Action,
    /// Minimum severity tier for a match.
    #[serde(default = "default_severity")]
    pub severity: ThreatLevel,
    /// Minimum score fraction (0.0 to 1.0) for a match.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Human-readable description, used as the match reason.
    #[serde(default)]
    pub description: String,
    /// Category conditions: when non-empty, at least one listed category
    /// must be present on the classification.
    #[serde(default)]
    pub categories: Vec<ThreatCategory>,
}

fn default_enabled() -> bool {
    true
}

fn default_action() -> Action {
    Action::Log
}

fn default_severity() -> ThreatLevel {
    ThreatLevel::Medium
}

fn default_threshold() -> f64 {
    0.5
}

impl RuleDefinition {
    /// Creates an enabled rule with no category conditions.
    pub fn new(
        name: impl Into<String>,
        action: Action,
        severity: ThreatLevel,
        threshold: f64,
    ) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            action,
            severity,
            threshold,
            description: String::new(),
            categories: Vec::new(),
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the category conditions.
    pub fn with_categories(mut self, categories: Vec<ThreatCategory>) -> Self {
        self.categories = categories;
        self
    }

    /// Sets whether the rule is enabled.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Checks whether this rule matches the classification.
    pub fn matches(&self, classification: &Classification) -> bool {
        if !self.enabled {
            return false;
        }

        if classification.score_fraction() < self.threshold {
            return false;
        }

        if classification.level < self.severity {
            return false;
        }

        if !self.categories.is_empty()
            && !self
                .categories
                .iter()
                .any(|c| classification.has_category(*c))
        {
            return false;
        }

        true
    }

    /// Builds the match record for this rule against a classification.
    fn to_match(&self, classification: &Classification) -> RuleMatch {
        let reason = if self.description.is_empty() {
            format!("Matched policy: {}", self.name)
        } else {
            self.description.clone()
        };

        RuleMatch {
            policy_name: self.name.clone(),
            action: self.action,
            severity: self.severity,
            reason,
            metadata: json!({
                "threshold": self.threshold,
                "detection_score": classification.score,
            }),
        }
    }
}

/// The rule (or synthetic default) that decided a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleMatch {
    /// Name of the rule that fired, or `default_allow`.
    pub policy_name: String,
    /// Action the rule prescribes.
    pub action: Action,
    /// Severity the rule was written for.
    pub severity: ThreatLevel,
    /// Why the rule matched.
    pub reason: String,
    /// Auxiliary evaluation data.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl RuleMatch {
    /// The synthetic match returned when no rule fires.
    pub fn default_allow() -> Self {
        Self {
            policy_name: "default_allow".to_string(),
            action: Action::Allow,
            severity: ThreatLevel::Safe,
            reason: "No policy matched - default allow".to_string(),
            metadata: serde_json::Value::Null,
        }
    }
}

/// Errors produced by rule-set validation and loading.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The document could not be parsed into the rule schema.
    #[error("invalid policy document: {0}")]
    Parse(#[from] serde_json::Error),

    /// A rule has an empty name.
    #[error("rule {index}: name must not be empty")]
    EmptyName {
        /// Zero-based rule position in the document.
        index: usize,
    },

    /// Two rules share a name.
    #[error("duplicate rule name: {0}")]
    DuplicateName(String),

    /// A threshold falls outside the fraction scale.
    #[error("rule '{name}': threshold {value} outside 0.0..=1.0")]
    ThresholdRange {
        /// Offending rule name.
        name: String,
        /// Rejected threshold value.
        value: f64,
    },
}

/// Top-level shape of a policy document.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PolicyDocument {
    #[serde(default)]
    policies: Vec<RuleDefinition>,
}

/// Ordered, first-match-wins policy engine.
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    rules: Vec<RuleDefinition>,
}

impl PolicyEngine {
    /// Creates an engine with the built-in default rules.
    pub fn new() -> Self {
        Self {
            rules: Self::default_rules(),
        }
    }

    /// Creates an engine with no rules; everything falls through to the
    /// synthetic default allow.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Creates an engine from a validated rule list.
    pub fn with_rules(rules: Vec<RuleDefinition>) -> Result<Self, PolicyError> {
        Self::validate(&rules)?;
        Ok(Self { rules })
    }

    /// The built-in default rule set, evaluated in this order.
    pub fn default_rules() -> Vec<RuleDefinition> {
        vec![
            RuleDefinition::new(
                "block_critical_threats",
                Action::Block,
                ThreatLevel::Critical,
                0.85,
            )
            .with_description("Block critical threats immediately"),
            RuleDefinition::new(
                "sanitize_high_threats",
                Action::Sanitize,
                ThreatLevel::High,
                0.65,
            )
            .with_description("Sanitize high-severity prompts"),
            RuleDefinition::new("log_medium_threats", Action::Log, ThreatLevel::Medium, 0.40)
                .with_description("Log medium-severity prompts"),
            RuleDefinition::new("allow_safe_prompts", Action::Allow, ThreatLevel::Safe, 0.0)
                .with_description("Allow safe prompts"),
        ]
    }

    /// The active rules, in evaluation order.
    pub fn rules(&self) -> &[RuleDefinition] {
        &self.rules
    }

    /// Evaluates a classification against the active rules in order and
    /// returns the first match, or the synthetic default allow.
    pub fn evaluate(&self, classification: &Classification) -> RuleMatch {
        for rule in &self.rules {
            if rule.matches(classification) {
                return rule.to_match(classification);
            }
        }

        RuleMatch::default_allow()
    }

    /// Replaces the active rule set from a policy document string.
    ///
    /// On any parse or validation failure the active set is left untouched
    /// and the typed error is returned. Returns the number of loaded rules.
    pub fn load_str(&mut self, document: &str) -> Result<usize, PolicyError> {
        let value: serde_json::Value = serde_json::from_str(document)?;
        self.load_value(value)
    }

    /// Replaces the active rule set from a parsed policy document.
    pub fn load_value(&mut self, document: serde_json::Value) -> Result<usize, PolicyError> {
        let parsed: PolicyDocument = serde_json::from_value(document)?;
        Self::validate(&parsed.policies)?;

        self.rules = parsed.policies;
        Ok(self.rules.len())
    }

    /// Appends one rule to the active set after validating it against the
    /// rules already present.
    pub fn add_rule(&mut self, rule: RuleDefinition) -> Result<(), PolicyError> {
        if rule.name.is_empty() {
            return Err(PolicyError::EmptyName {
                index: self.rules.len(),
            });
        }
        if self.rules.iter().any(|r| r.name == rule.name) {
            return Err(PolicyError::DuplicateName(rule.name));
        }
        if !(0.0..=1.0).contains(&rule.threshold) {
            return Err(PolicyError::ThresholdRange {
                name: rule.name,
                value: rule.threshold,
            });
        }

        self.rules.push(rule);
        Ok(())
    }

    /// Removes a rule by name. Returns true if a rule was removed.
    pub fn remove_rule(&mut self, name: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| r.name != name);
        self.rules.len() < before
    }

    fn validate(rules: &[RuleDefinition]) -> Result<(), PolicyError> {
        let mut seen = Vec::with_capacity(rules.len());

        for (index, rule) in rules.iter().enumerate() {
            if rule.name.is_empty() {
                return Err(PolicyError::EmptyName { index });
            }
            if seen.contains(&rule.name.as_str()) {
                return Err(PolicyError::DuplicateName(rule.name.clone()));
            }
            if !(0.0..=1.0).contains(&rule.threshold) {
                return Err(PolicyError::ThresholdRange {
                    name: rule.name.clone(),
                    value: rule.threshold,
                });
            }
            seen.push(rule.name.as_str());
        }

        Ok(())
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}
