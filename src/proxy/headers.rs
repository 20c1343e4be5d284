//! CORS header rewriting.
//!
//! The proxy owns the CORS surface: whatever the upstream sent is stripped
//! and replaced with a single `Access-Control-Allow-Origin`, so browsers
//! never see duplicate values.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN,
};
use hyper::{Response, StatusCode};

pub static VALUE_ANY_ORIGIN: HeaderValue = HeaderValue::from_static("*");
pub static VALUE_ALLOW_METHODS: HeaderValue =
    HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS");
pub static VALUE_ALLOW_HEADERS: HeaderValue = HeaderValue::from_static("Content-Type");

fn allow_origin(origin: Option<&HeaderValue>) -> HeaderValue {
    origin.cloned().unwrap_or_else(|| VALUE_ANY_ORIGIN.clone())
}

/// Drop any upstream CORS headers and set a single allow-origin: the
/// incoming `Origin` when present, `*` otherwise.
pub fn rewrite_cors<B>(response: &mut Response<B>, origin: Option<&HeaderValue>) {
    let headers = response.headers_mut();
    headers.remove(ACCESS_CONTROL_ALLOW_ORIGIN);
    headers.remove(ACCESS_CONTROL_ALLOW_HEADERS);
    headers.remove(ACCESS_CONTROL_ALLOW_METHODS);
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin(origin));
}

/// Answer an `OPTIONS` preflight directly with the CORS trio.
pub fn preflight_response(status: StatusCode, origin: Option<&HeaderValue>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin(origin));
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, VALUE_ALLOW_METHODS.clone());
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, VALUE_ALLOW_HEADERS.clone());
    response
}
