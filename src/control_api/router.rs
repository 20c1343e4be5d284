//! Route dispatch for the control API.

use super::handlers;
use super::types::{apply_cors, not_found, preflight};
use crate::store::SharedRuleStore;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::ORIGIN;
use hyper::{Method, Request, Response};
use tracing::debug;

pub async fn route_request(
    req: Request<Incoming>,
    store: SharedRuleStore,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let origin = req.headers().get(ORIGIN).cloned();
    debug!(%method, %path, "control API request");

    let mut response = match (&method, path.as_str()) {
        (&Method::OPTIONS, _) => return Ok(preflight(origin.as_ref())),
        (&Method::GET, "/health") => handlers::handle_health(),
        (&Method::GET, "/api/rules") => handlers::handle_list(&store),
        (&Method::POST, "/api/rules") => handlers::handle_add(req, &store).await,
        _ => match path.strip_prefix("/api/rules/") {
            Some(id) if !id.is_empty() && !id.contains('/') => match method {
                Method::PUT => handlers::handle_update(id, req, &store).await,
                Method::DELETE => handlers::handle_delete(id, &store),
                _ => not_found(),
            },
            _ => not_found(),
        },
    };

    apply_cors(&mut response, origin.as_ref());
    Ok(response)
}
