//! Request/response types and helpers for the control API.

use crate::proxy::headers::{preflight_response, rewrite_cors};
use crate::store::Failure;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::HeaderValue;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};

/// Incoming rule payload for POST and PUT. The id always comes from the
/// server (POST) or the URL (PUT), never from the body.
#[derive(Debug, Deserialize)]
pub struct RulePayload {
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub failure: Failure,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string_pretty(body).unwrap_or_else(|_| "{}".to_string());
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(json)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from("Internal Server Error"))))
}

pub fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let error = ErrorResponse {
        errors: vec![ErrorDetail {
            code: status.as_str().to_string(),
            message: message.to_string(),
        }],
    };
    json_response(status, &error)
}

pub fn not_found() -> Response<Full<Bytes>> {
    error_response(StatusCode::NOT_FOUND, "Not Found")
}

pub fn no_content() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

/// Preflight answer for the showcase UI.
pub fn preflight(origin: Option<&HeaderValue>) -> Response<Full<Bytes>> {
    preflight_response(StatusCode::NO_CONTENT, origin)
}

/// The API sets the same single allow-origin contract as the proxy.
pub fn apply_cors(response: &mut Response<Full<Bytes>>, origin: Option<&HeaderValue>) {
    rewrite_cors(response, origin);
}

pub async fn collect_body(req: Request<Incoming>) -> Result<Bytes, String> {
    req.collect()
        .await
        .map(|c| c.to_bytes())
        .map_err(|e| format!("Failed to read request body: {e}"))
}
