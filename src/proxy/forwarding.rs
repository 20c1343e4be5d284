//! Request forwarding toward the target embedded in the request path.

use super::body::{AccessLog, CountingBody};
use super::client::HttpClient;
use super::response_ext::ResponseExt;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE, HOST};
use hyper::{Request, Response, StatusCode, Uri};
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{debug, error, info};

pub static X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Plain-text error response helper.
pub fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from(message.to_string())))
        .unwrap()
}

/// Forward `req` to `target`, streaming the response body back without
/// buffering. The outgoing request uses the target's own scheme, host and
/// path; the incoming prefixed path never reaches the upstream.
pub async fn forward_request(
    http_client: &HttpClient,
    req: Request<Incoming>,
    target: &str,
    remote_addr: SocketAddr,
    start: Instant,
) -> Response<BoxBody<Bytes, hyper::Error>> {
    let target_uri: Uri = match target.parse() {
        Ok(uri) => uri,
        Err(e) => return bad_target(target, remote_addr, &e.to_string()),
    };
    let authority = match (target_uri.scheme(), target_uri.authority()) {
        (Some(_), Some(authority)) => authority.clone(),
        _ => return bad_target(target, remote_addr, "not an absolute URL"),
    };

    let (parts, body) = req.into_parts();

    let mut builder = Request::builder().method(parts.method.clone()).uri(target_uri);
    for (name, value) in parts.headers.iter() {
        if name != HOST {
            builder = builder.header(name, value);
        }
    }
    // The upstream sees its own host; the original one travels along.
    match HeaderValue::from_str(authority.as_str()) {
        Ok(host) => builder = builder.header(HOST, host),
        Err(_) => return bad_target(target, remote_addr, "invalid authority"),
    }
    if let Some(original_host) = parts.headers.get(HOST) {
        builder = builder.header(&X_FORWARDED_HOST, original_host);
    }

    let upstream_req = builder.body(BoxBody::new(body)).unwrap();

    debug!(url = target, "forwarding request");
    match http_client.request(upstream_req).await {
        Ok(upstream_response) => {
            let (response_parts, response_body) = upstream_response.into_parts();
            let counted = CountingBody::new(
                BoxBody::new(response_body),
                AccessLog {
                    method: parts.method,
                    target: target.to_string(),
                    remote_addr,
                    status: response_parts.status,
                    start,
                },
            );
            Response::from_parts(response_parts, BoxBody::new(counted))
        }
        Err(e) => {
            error!(url = target, "failed to reach upstream: {e}");
            error_response(
                StatusCode::BAD_GATEWAY,
                &format!("FaultLine: upstream unreachable: {e}"),
            )
            .into_boxed()
        }
    }
}

fn bad_target(
    target: &str,
    remote_addr: SocketAddr,
    reason: &str,
) -> Response<BoxBody<Bytes, hyper::Error>> {
    info!(url = target, remote = %remote_addr, reason, "rejecting request without absolute target URL");
    error_response(
        StatusCode::BAD_REQUEST,
        &format!(
            "FaultLine: invalid target URL {target:?} ({reason}); \
             request paths must embed an absolute URL, e.g. /https://api.example.test/users"
        ),
    )
    .into_boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response() {
        let response = error_response(StatusCode::BAD_GATEWAY, "nope");
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
    }
}
