//! Rule CRUD handlers.

use super::types::{
    collect_body, error_response, json_response, no_content, RulePayload,
};
use crate::store::{Rule, SharedRuleStore};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

pub fn handle_health() -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &json!({ "status": "ok" }))
}

/// GET /api/rules
pub fn handle_list(store: &SharedRuleStore) -> Response<Full<Bytes>> {
    // CLI edits land in the shared file; pick them up before answering.
    if let Err(e) = store.reload_if_modified() {
        warn!("failed to reload rule file: {e}");
    }
    json_response(StatusCode::OK, &store.get_all())
}

/// POST /api/rules
pub async fn handle_add(req: Request<Incoming>, store: &SharedRuleStore) -> Response<Full<Bytes>> {
    let payload = match parse_payload(req).await {
        Ok(p) => p,
        Err(response) => return response,
    };

    let rule = Rule {
        id: Uuid::new_v4().to_string(),
        target: payload.target,
        // New rules always start active.
        enabled: true,
        category: payload.category.or_else(|| Some("api".to_string())),
        failure: payload.failure,
    };
    store.add(rule.clone());
    info!(rule = %rule.id, rule_target = %rule.target, "rule added");
    json_response(StatusCode::CREATED, &rule)
}

/// PUT /api/rules/{id}
pub async fn handle_update(
    id: &str,
    req: Request<Incoming>,
    store: &SharedRuleStore,
) -> Response<Full<Bytes>> {
    let payload = match parse_payload(req).await {
        Ok(p) => p,
        Err(response) => return response,
    };

    let rule = Rule {
        id: id.to_string(),
        target: payload.target,
        enabled: payload.enabled,
        category: payload.category,
        failure: payload.failure,
    };
    if !store.update(rule.clone()) {
        return error_response(StatusCode::NOT_FOUND, "Rule not found");
    }
    info!(rule = %rule.id, enabled = rule.enabled, "rule updated");
    json_response(StatusCode::OK, &rule)
}

/// DELETE /api/rules/{id}
pub fn handle_delete(id: &str, store: &SharedRuleStore) -> Response<Full<Bytes>> {
    if !store.delete(id) {
        return error_response(StatusCode::NOT_FOUND, "Rule not found");
    }
    info!(rule = %id, "rule deleted");
    no_content()
}

async fn parse_payload(req: Request<Incoming>) -> Result<RulePayload, Response<Full<Bytes>>> {
    let body = collect_body(req)
        .await
        .map_err(|msg| error_response(StatusCode::BAD_REQUEST, &msg))?;
    serde_json::from_slice(&body)
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "Invalid request body"))
}
