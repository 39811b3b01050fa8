//! Remote classifier strategy.
//!
//! Delegates scoring to an external HTTP service that implements the
//! score contract: given text, return a risk fraction in [0, 1], an
//! optional confidence, and zero or more category tags. Any transport or
//! decode failure degrades to the lexical classifier; callers never see
//! the failure.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::{Classification, LexicalClassifier, ThreatCategory, ThreatClassifier, ThreatLevel};

/// Configuration for the remote scoring endpoint.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Scoring endpoint URL, e.g. `http://127.0.0.1:9300/score`.
    pub endpoint: String,
    /// Per-request timeout. Bounds how long a slow scorer can stall a check.
    pub timeout: Duration,
    /// Risk fraction at or above which the text is flagged.
    pub flag_threshold: f64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            timeout: Duration::from_secs(2),
            flag_threshold: 0.5,
        }
    }
}

impl RemoteConfig {
    /// Creates a config for the given endpoint with default timeout and
    /// flag threshold.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }
}

/// Wire shape returned by the external scorer.
#[derive(Debug, Clone, Deserialize)]
struct ExternalScore {
    /// Risk fraction in [0, 1].
    #[serde(alias = "threat_score")]
    risk: f64,
    /// Scorer confidence in [0, 1], when reported.
    #[serde(default)]
    confidence: Option<f64>,
    /// Category tag names; unknown tags are ignored.
    #[serde(default)]
    categories: Vec<String>,
    /// Free-form diagnostics passed through to the classification.
    #[serde(default)]
    details: Option<serde_json::Value>,
}

/// HTTP-backed classifier with a built-in lexical fallback.
pub struct RemoteClassifier {
    client: reqwest::blocking::Client,
    endpoint: reqwest::Url,
    flag_threshold: f64,
    fallback: LexicalClassifier,
}

impl RemoteClassifier {
    /// Builds a remote classifier, or `None` when the configuration is
    /// unusable (malformed endpoint, client construction failure).
    ///
    /// Per-request failures are handled later by falling back; only a
    /// configuration that can never work is rejected here.
    pub fn try_new(config: RemoteConfig) -> Option<Self> {
        let endpoint = match reqwest::Url::parse(&config.endpoint) {
            Ok(url) => url,
            Err(err) => {
                warn!(endpoint = %config.endpoint, error = %err, "invalid remote classifier endpoint");
                return None;
            }
        };

        let client = match reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
        {
            Ok(client) => client,
            Err(err) => {
                warn!(error = %err, "failed to build remote classifier client");
                return None;
            }
        };

        Some(Self {
            client,
            endpoint,
            flag_threshold: config.flag_threshold.clamp(0.0, 1.0),
            fallback: LexicalClassifier::new(),
        })
    }

    fn request_score(&self, text: &str) -> Result<ExternalScore, reqwest::Error> {
        self.client
            .post(self.endpoint.clone())
            .json(&json!({ "text": text }))
            .send()?
            .error_for_status()?
            .json()
    }

    /// Maps the external score contract onto a [`Classification`].
    ///
    /// Tier breakpoints are 0.3/0.5/0.7/0.9 fractions; flagging uses the
    /// configured threshold rather than the lexical 40-point mark.
    fn map_score(&self, score: ExternalScore) -> Classification {
        let risk = score.risk.clamp(0.0, 1.0);

        let level = if risk >= 0.9 {
            ThreatLevel::Critical
        } else if risk >= 0.7 {
            ThreatLevel::High
        } else if risk >= 0.5 {
            ThreatLevel::Medium
        } else if risk >= 0.3 {
            ThreatLevel::Low
        } else {
            ThreatLevel::Safe
        };

        let mut categories: Vec<ThreatCategory> = Vec::new();
        for name in &score.categories {
            if let Some(category) = ThreatCategory::parse(name) {
                if !categories.contains(&category) {
                    categories.push(category);
                }
            }
        }

        Classification {
            score: risk * 100.0,
            level,
            is_flagged: risk >= self.flag_threshold,
            categories,
            confidence: score.confidence.unwrap_or(0.0).clamp(0.0, 1.0),
            details: json!({
                "method": "remote",
                "upstream": score.details.unwrap_or(serde_json::Value::Null),
            }),
        }
    }
}

impl ThreatClassifier for RemoteClassifier {
    fn classify(&self, text: &str) -> Classification {
        match self.request_score(text) {
            Ok(score) => self.map_score(score),
            Err(err) => {
                debug!(error = %err, "remote classifier unavailable, using lexical fallback");
                self.fallback.classify(text)
            }
        }
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}
