//! Request handling: target extraction, rule matching, fault injection.

use super::client::HttpClient;
use super::fault::{apply_latency, decide_fault, injected_response, FaultDecision};
use super::forwarding::forward_request;
use super::headers::{preflight_response, rewrite_cors};
use super::response_ext::ResponseExt;
use crate::store::SharedRuleStore;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::body::Incoming;
use hyper::header::ORIGIN;
use hyper::{Method, Request, Response, StatusCode, Uri};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Reconstruct the target URL from the request path: the single leading `/`
/// is the delimiter, everything after it is the target, and a raw query
/// string is re-appended.
pub fn extract_target(uri: &Uri) -> String {
    let path = uri.path();
    let mut target = path.strip_prefix('/').unwrap_or(path).to_string();
    if let Some(query) = uri.query() {
        target.push('?');
        target.push_str(query);
    }
    target
}

pub async fn handle_request(
    store: &SharedRuleStore,
    http_client: &HttpClient,
    req: Request<Incoming>,
    remote_addr: SocketAddr,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, Infallible> {
    let start = Instant::now();
    let method = req.method().clone();
    let origin = req.headers().get(ORIGIN).cloned();

    if method == Method::OPTIONS {
        debug!(remote = %remote_addr, "answering CORS preflight");
        return Ok(preflight_response(StatusCode::OK, origin.as_ref()).into_boxed());
    }

    let target = extract_target(req.uri());
    debug!(%method, url = %target, remote = %remote_addr, "received request");

    // Pick up rule edits made by other processes through the shared file.
    if let Err(e) = store.reload_if_modified() {
        warn!("failed to reload rule file: {e}");
    }

    let decision = match store.find_match(&target) {
        Some(rule) => {
            info!(rule = %rule.id, rule_target = %rule.target, kind = %rule.failure.kind, "rule matched");
            decide_fault(&rule, &mut rand::thread_rng())
        }
        None => FaultDecision::PassThrough,
    };

    let mut response = match decision {
        FaultDecision::Respond { status, body } => {
            info!(
                %method,
                url = %target,
                remote = %remote_addr,
                status,
                bytes = body.len(),
                duration_ms = start.elapsed().as_millis() as u64,
                "injected"
            );
            injected_response(status, body).into_boxed()
        }
        FaultDecision::Delay(duration) => {
            info!(url = %target, delay_ms = duration.as_millis() as u64, "injecting latency");
            apply_latency(duration).await;
            forward_request(http_client, req, &target, remote_addr, start).await
        }
        FaultDecision::PassThrough => {
            forward_request(http_client, req, &target, remote_addr, start).await
        }
    };

    rewrite_cors(&mut response, origin.as_ref());
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    #[test]
    fn test_extract_target_strips_single_slash() {
        assert_eq!(
            extract_target(&uri("/https://example.test/a/x")),
            "https://example.test/a/x"
        );
    }

    #[test]
    fn test_extract_target_preserves_query() {
        assert_eq!(
            extract_target(&uri("/https://example.test/a?page=2&sort=asc")),
            "https://example.test/a?page=2&sort=asc"
        );
    }

    #[test]
    fn test_extract_target_keeps_inner_slashes() {
        // Only the leading slash delimits; double slashes in the scheme
        // belong to the target.
        assert_eq!(
            extract_target(&uri("http://proxy.local/http://a/b//c")),
            "http://a/b//c"
        );
    }

    #[test]
    fn test_extract_target_empty_path() {
        assert_eq!(extract_target(&uri("http://proxy.local/")), "");
    }
}
