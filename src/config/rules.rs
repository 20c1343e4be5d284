//! HTTP fault-injection rule configuration.

use crate::store::{Failure, Rule};
use anyhow::bail;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleConfig {
    pub target: String,
    pub failure: FailureConfig,
}

/// Failure as written in YAML. Field names use snake_case here while the
/// persisted JSON uses camelCase; both map onto [`Failure`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FailureConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub latency_ms: u64,
    #[serde(default)]
    pub error_code: u16,
    #[serde(default)]
    pub probability: f64,
}

impl RuleConfig {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.target.is_empty() {
            bail!("rule target must not be empty");
        }
        match self.failure.kind.as_str() {
            "latency" | "timeout" => {}
            "error" => {
                if !(100..=599).contains(&self.failure.error_code) {
                    bail!(
                        "rule for {}: error_code {} outside [100, 599]",
                        self.target,
                        self.failure.error_code
                    );
                }
            }
            "flaky" => {
                if !(0.0..=1.0).contains(&self.failure.probability) {
                    bail!(
                        "rule for {}: probability {} outside [0, 1]",
                        self.target,
                        self.failure.probability
                    );
                }
            }
            // Unknown types are stored and pass traffic through unchanged.
            other => warn!(rule_target = %self.target, "unknown failure type {other:?} in config"),
        }
        Ok(())
    }

    /// Convert into a store rule with a fresh id, enabled by default.
    pub fn into_rule(self) -> Rule {
        Rule {
            id: Uuid::new_v4().to_string(),
            target: self.target,
            enabled: true,
            category: Some("api".to_string()),
            failure: Failure {
                kind: self.failure.kind,
                latency_ms: self.failure.latency_ms,
                error_code: self.failure.error_code,
                probability: self.failure.probability,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_error_code_range() {
        let rule = RuleConfig {
            target: "https://example.test".to_string(),
            failure: FailureConfig {
                kind: "error".to_string(),
                error_code: 99,
                ..FailureConfig::default()
            },
        };
        assert!(rule.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_unknown_kind() {
        let rule = RuleConfig {
            target: "https://example.test".to_string(),
            failure: FailureConfig {
                kind: "brownout".to_string(),
                ..FailureConfig::default()
            },
        };
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn test_into_rule() {
        let rule = RuleConfig {
            target: "https://example.test/a".to_string(),
            failure: FailureConfig {
                kind: "flaky".to_string(),
                probability: 0.25,
                ..FailureConfig::default()
            },
        }
        .into_rule();

        assert!(!rule.id.is_empty());
        assert!(rule.enabled);
        assert_eq!(rule.category.as_deref(), Some("api"));
        assert_eq!(rule.failure.probability, 0.25);
    }
}
