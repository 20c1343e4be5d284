//! Fault decision logic and injected response bodies.

use crate::store::{FailureKind, Rule, TIMEOUT_LATENCY_MS};
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::CONTENT_TYPE;
use hyper::{Response, StatusCode};
use rand::Rng;
use std::time::Duration;
use tracing::warn;

/// Fixed body of an injected `error` response.
pub const ERROR_BODY: &str = "FaultLine: Injected Error Response";
/// Fixed body of a triggered `flaky` response.
pub const FLAKY_BODY: &str = "FaultLine: Injected Flaky Error";

#[derive(Debug, Clone, PartialEq)]
pub enum FaultDecision {
    /// Sleep, then forward to the target.
    Delay(Duration),
    /// Respond synthetically; the upstream is never contacted.
    Respond { status: u16, body: &'static str },
    /// Forward unchanged.
    PassThrough,
}

/// Decide what to do with a request that matched `rule`. The RNG is
/// injected so tests can drive the flaky draw deterministically.
pub fn decide_fault(rule: &Rule, rng: &mut impl Rng) -> FaultDecision {
    match rule.failure.kind() {
        FailureKind::Latency(duration) => FaultDecision::Delay(duration),
        FailureKind::Error(status) if (100..=599).contains(&status) => FaultDecision::Respond {
            status,
            body: ERROR_BODY,
        },
        FailureKind::Error(status) => {
            warn!(rule = %rule.id, status, "error code out of range, proxying normally");
            FaultDecision::PassThrough
        }
        FailureKind::Flaky(probability) => {
            if rng.gen::<f64>() < probability {
                FaultDecision::Respond {
                    status: 503,
                    body: FLAKY_BODY,
                }
            } else {
                FaultDecision::PassThrough
            }
        }
        FailureKind::Timeout => FaultDecision::Delay(Duration::from_millis(TIMEOUT_LATENCY_MS)),
        FailureKind::Unknown => {
            warn!(rule = %rule.id, kind = %rule.failure.kind, "unknown failure type, proxying normally");
            FaultDecision::PassThrough
        }
    }
}

pub async fn apply_latency(duration: Duration) {
    tokio::time::sleep(duration).await;
}

/// Build an injected response with one of the fixed bodies.
pub fn injected_response(status: u16, body: &'static str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR))
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from_static(body.as_bytes())))
        .unwrap()
}
