//! Wire types for fault-injection rules.
//!
//! The persisted file and the control API exchange rules as a flat record
//! with an explicit `type` tag inside `failure`. `FailureKind` is the
//! discriminated view used at decision sites; the flat layout is kept for
//! wire compatibility with existing rule files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Latency standing in for the `timeout` failure type, chosen to exceed
/// typical client timeouts.
pub const TIMEOUT_LATENCY_MS: u64 = 30_000;

/// A fault-injection directive matched against reconstructed target URLs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub target: String,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub failure: Failure,
}

/// Flat failure record. Fields irrelevant to the tagged type are left at
/// their zero value and skipped during serialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "latencyMs", default, skip_serializing_if = "is_zero_u64")]
    pub latency_ms: u64,
    #[serde(rename = "errorCode", default, skip_serializing_if = "is_zero_u16")]
    pub error_code: u16,
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub probability: f64,
}

fn is_zero_u64(v: &u64) -> bool {
    *v == 0
}

fn is_zero_u16(v: &u16) -> bool {
    *v == 0
}

fn is_zero_f64(v: &f64) -> bool {
    *v == 0.0
}

/// Discriminated view of a [`Failure`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FailureKind {
    /// Delay, then forward.
    Latency(Duration),
    /// Respond with the given status; the upstream is never contacted.
    Error(u16),
    /// Trigger a 503 with the given probability, otherwise forward.
    Flaky(f64),
    /// Mapped to [`TIMEOUT_LATENCY_MS`] of latency.
    Timeout,
    /// Unrecognized tag; traffic passes through unchanged.
    Unknown,
}

impl Failure {
    pub fn latency(latency_ms: u64) -> Self {
        Self {
            kind: "latency".to_string(),
            latency_ms,
            ..Self::default()
        }
    }

    pub fn error(error_code: u16) -> Self {
        Self {
            kind: "error".to_string(),
            error_code,
            ..Self::default()
        }
    }

    pub fn flaky(probability: f64) -> Self {
        Self {
            kind: "flaky".to_string(),
            probability,
            ..Self::default()
        }
    }

    pub fn timeout() -> Self {
        Self {
            kind: "timeout".to_string(),
            ..Self::default()
        }
    }

    /// Probabilities outside [0, 1] are clamped at the boundaries.
    pub fn kind(&self) -> FailureKind {
        match self.kind.as_str() {
            "latency" => FailureKind::Latency(Duration::from_millis(self.latency_ms)),
            "error" => FailureKind::Error(self.error_code),
            "flaky" => FailureKind::Flaky(self.probability.clamp(0.0, 1.0)),
            "timeout" => FailureKind::Timeout,
            _ => FailureKind::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind_mapping() {
        assert_eq!(
            Failure::latency(250).kind(),
            FailureKind::Latency(Duration::from_millis(250))
        );
        assert_eq!(Failure::error(503).kind(), FailureKind::Error(503));
        assert_eq!(Failure::flaky(0.5).kind(), FailureKind::Flaky(0.5));
        assert_eq!(Failure::timeout().kind(), FailureKind::Timeout);
        let unknown = Failure {
            kind: "chaos-monkey".to_string(),
            ..Failure::default()
        };
        assert_eq!(unknown.kind(), FailureKind::Unknown);
    }

    #[test]
    fn test_probability_clamped_at_boundaries() {
        assert_eq!(Failure::flaky(1.7).kind(), FailureKind::Flaky(1.0));
        assert_eq!(Failure::flaky(-0.3).kind(), FailureKind::Flaky(0.0));
    }

    #[test]
    fn test_rule_json_round_trip() {
        let rule = Rule {
            id: "r-1".to_string(),
            target: "https://example.test/a".to_string(),
            enabled: true,
            category: Some("api".to_string()),
            failure: Failure::error(502),
        };
        let json = serde_json::to_string(&rule).unwrap();
        assert!(json.contains(r#""errorCode":502"#));
        assert!(!json.contains("latencyMs"));
        let back: Rule = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rule);
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let json = r#"{
            "id": "r-2",
            "target": "https://example.test",
            "enabled": false,
            "failure": {"type": "latency", "latencyMs": 100, "jitterMs": 5},
            "addedBy": "cli"
        }"#;
        let rule: Rule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.failure.latency_ms, 100);
        assert!(!rule.enabled);
        assert_eq!(rule.category, None);
    }
}
