//! Prompt sanitization.
//!
//! Rewrites detected adversarial phrasing, sensitive identifiers, and
//! injection syntax with placeholder tokens. Three rule families run in a
//! fixed order; within a family, rules run in list order. Placeholders are
//! shaped so that no later pattern can match them, which makes the whole
//! pass idempotent.

use regex::Regex;

/// One detect-and-rewrite rule.
struct RewriteRule {
    regex: Regex,
    replacement: &'static str,
    note: &'static str,
}

impl RewriteRule {
    fn new(pattern: &str, replacement: &'static str, note: &'static str) -> Self {
        Self {
            regex: Regex::new(pattern).expect("invalid sanitizer pattern"),
            replacement,
            note,
        }
    }
}

/// Per-call family toggles. All families are enabled by default.
#[derive(Debug, Clone, Copy)]
pub struct SanitizeOptions {
    /// Rewrite malicious instruction phrasing.
    pub instructions: bool,
    /// Redact sensitive identifiers (SSN, card, email, phone, keys).
    pub pii: bool,
    /// Remove SQL injection fragments.
    pub sql: bool,
}

impl Default for SanitizeOptions {
    fn default() -> Self {
        Self {
            instructions: true,
            pii: true,
            sql: true,
        }
    }
}

/// Result of sanitizing one prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct Sanitized {
    /// The rewritten text.
    pub text: String,
    /// One entry per rule that actually matched, in application order.
    pub changes: Vec<String>,
}

/// Ordered detect-and-rewrite sanitizer.
pub struct Sanitizer {
    instruction_rules: Vec<RewriteRule>,
    pii_rules: Vec<RewriteRule>,
    sql_rules: Vec<RewriteRule>,
    whitespace: Regex,
}

impl Sanitizer {
    /// Creates a sanitizer with the built-in rule families.
    pub fn new() -> Self {
        Self {
            instruction_rules: Self::build_instruction_rules(),
            pii_rules: Self::build_pii_rules(),
            sql_rules: Self::build_sql_rules(),
            whitespace: Regex::new(r"\s+").expect("invalid whitespace pattern"),
        }
    }

    /// Sanitizes with all families enabled.
    pub fn sanitize(&self, text: &str) -> Sanitized {
        self.sanitize_with(text, SanitizeOptions::default())
    }

    /// Sanitizes with the given family toggles.
    pub fn sanitize_with(&self, text: &str, options: SanitizeOptions) -> Sanitized {
        let mut current = text.to_string();
        let mut changes = Vec::new();

        if options.instructions {
            Self::apply_family(&self.instruction_rules, &mut current, &mut changes);
        }
        if options.pii {
            Self::apply_family(&self.pii_rules, &mut current, &mut changes);
        }
        if options.sql {
            Self::apply_family(&self.sql_rules, &mut current, &mut changes);
        }

        let collapsed = self
            .whitespace
            .replace_all(&current, " ")
            .trim()
            .to_string();

        Sanitized {
            text: collapsed,
            changes,
        }
    }

    /// Returns true if any sensitive-data pattern matches the text.
    pub fn contains_pii(&self, text: &str) -> bool {
        self.pii_rules.iter().any(|rule| rule.regex.is_match(text))
    }

    fn apply_family(rules: &[RewriteRule], current: &mut String, changes: &mut Vec<String>) {
        for rule in rules {
            if rule.regex.is_match(current) {
                *current = rule.regex.replace_all(current, rule.replacement).into_owned();
                changes.push(rule.note.to_string());
            }
        }
    }

    fn build_instruction_rules() -> Vec<RewriteRule> {
        vec![
            RewriteRule::new(
                r"(?i)ignore\s+(all\s+)?(previous|prior|above)\s+instructions?",
                "[INSTRUCTION_REMOVED]",
                "rewrote instruction override",
            ),
            RewriteRule::new(
                r"(?i)disregard\s+(all\s+)?(previous|prior|above)",
                "[INSTRUCTION_REMOVED]",
                "rewrote disregard directive",
            ),
            RewriteRule::new(
                r"(?i)forget\s+(everything|all|what)",
                "[INSTRUCTION_REMOVED]",
                "rewrote memory reset phrasing",
            ),
            RewriteRule::new(
                r"(?i)new\s+instructions?:",
                "[INSTRUCTION_REMOVED]",
                "rewrote injected instruction header",
            ),
            RewriteRule::new(
                r"(?i)system\s+prompt:",
                "[SYSTEM_REMOVED]",
                "rewrote system prompt header",
            ),
            RewriteRule::new(
                r"(?i)you\s+are\s+now\s+",
                "[ROLE_REMOVED] ",
                "rewrote role reassignment",
            ),
            RewriteRule::new(
                r"(?i)roleplay\s+as",
                "[ROLEPLAY_REMOVED]",
                "rewrote roleplay request",
            ),
            RewriteRule::new(
                r"(?i)pretend\s+(you\s+are|to\s+be)",
                "[PRETEND_REMOVED]",
                "rewrote pretend request",
            ),
            RewriteRule::new(
                r"(?i)\bdan\s+mode\b",
                "[MODE_REMOVED]",
                "rewrote mode override",
            ),
            RewriteRule::new(
                r"(?i)\bdeveloper\s+mode\b",
                "[MODE_REMOVED]",
                "rewrote mode override",
            ),
        ]
    }

    fn build_pii_rules() -> Vec<RewriteRule> {
        vec![
            RewriteRule::new(
                r"\b\d{3}-\d{2}-\d{4}\b",
                "[SSN_REDACTED]",
                "redacted SSN",
            ),
            RewriteRule::new(r"\b\d{9}\b", "[SSN_REDACTED]", "redacted SSN"),
            RewriteRule::new(
                r"\b\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{4}\b",
                "[CARD_REDACTED]",
                "redacted payment card number",
            ),
            RewriteRule::new(
                r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
                "[EMAIL_REDACTED]",
                "redacted email address",
            ),
            RewriteRule::new(
                r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b",
                "[PHONE_REDACTED]",
                "redacted phone number",
            ),
            RewriteRule::new(
                r"\(\d{3}\)\s*\d{3}[-.]?\d{4}",
                "[PHONE_REDACTED]",
                "redacted phone number",
            ),
            RewriteRule::new(
                r"\bsk-[A-Za-z0-9]{32,}",
                "[API_KEY_REDACTED]",
                "redacted API key",
            ),
            RewriteRule::new(
                r"[A-Za-z0-9_-]{32,}",
                "[TOKEN_REDACTED]",
                "redacted opaque token",
            ),
        ]
    }

    fn build_sql_rules() -> Vec<RewriteRule> {
        vec![
            RewriteRule::new(
                r"(?i)';?\s*(drop|delete|insert|update|select)\s+",
                "[SQL_REMOVED] ",
                "removed SQL statement",
            ),
            RewriteRule::new(
                r"(?i)\b(or|and)\s+1\s*=\s*1\b",
                "[SQL_REMOVED]",
                "removed SQL tautology",
            ),
            RewriteRule::new(r"--\s*$", "", "removed trailing SQL comment"),
        ]
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new()
    }
}
