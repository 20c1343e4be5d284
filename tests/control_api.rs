//! End-to-end tests for the control API.

use faultline::control_api::ControlApiServer;
use faultline::store::{Failure, FileRuleStore, Rule, RuleStore, SharedRuleStore};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use uuid::Uuid;

async fn start_api(store: SharedRuleStore) -> (SocketAddr, broadcast::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let server = ControlApiServer::new(store);
    tokio::spawn(async move {
        server.serve(listener, shutdown_rx).await.unwrap();
    });
    (addr, shutdown_tx)
}

fn file_store(dir: &tempfile::TempDir) -> (SharedRuleStore, PathBuf) {
    let path = dir.path().join("rules.json");
    let store: SharedRuleStore = Arc::new(FileRuleStore::new(Some(path.clone())));
    (store, path)
}

#[tokio::test]
async fn test_rule_crud_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let (store, path) = file_store(&dir);
    let (api, _shutdown) = start_api(store).await;
    let client = reqwest::Client::new();
    let base = format!("http://{api}/api/rules");

    // Empty to start.
    let rules: Vec<Value> = client.get(&base).send().await.unwrap().json().await.unwrap();
    assert!(rules.is_empty());

    // Create assigns an id, enables, and defaults the category.
    let response = client
        .post(&base)
        .json(&json!({
            "target": "https://api.example.test/users",
            "failure": {"type": "error", "errorCode": 503}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let created: Value = response.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();
    assert!(!id.is_empty());
    assert_eq!(created["enabled"], json!(true));
    assert_eq!(created["category"], json!("api"));
    assert_eq!(created["failure"]["errorCode"], json!(503));

    // Persistence reflects the mutation before the call returned.
    let on_disk = std::fs::read_to_string(&path).unwrap();
    assert!(on_disk.contains("https://api.example.test/users"));

    // Update toggles enabled.
    let response = client
        .put(format!("{base}/{id}"))
        .json(&json!({
            "target": "https://api.example.test/users",
            "enabled": false,
            "failure": {"type": "error", "errorCode": 503}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let rules: Vec<Value> = client.get(&base).send().await.unwrap().json().await.unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0]["enabled"], json!(false));

    // Delete, then the id is gone.
    let response = client
        .delete(format!("{base}/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);
    let response = client
        .delete(format!("{base}/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let rules: Vec<Value> = client.get(&base).send().await.unwrap().json().await.unwrap();
    assert!(rules.is_empty());
}

#[tokio::test]
async fn test_update_unknown_rule_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _path) = file_store(&dir);
    let (api, _shutdown) = start_api(store).await;

    let response = reqwest::Client::new()
        .put(format!("http://{api}/api/rules/{}", Uuid::new_v4()))
        .json(&json!({"target": "https://x", "failure": {"type": "latency", "latencyMs": 10}}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_invalid_body_is_400() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _path) = file_store(&dir);
    let (api, _shutdown) = start_api(store).await;

    let response = reqwest::Client::new()
        .post(format!("http://{api}/api/rules"))
        .header("Content-Type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_health_and_unknown_routes() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _path) = file_store(&dir);
    let (api, _shutdown) = start_api(store).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("http://{api}/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = client
        .get(format!("http://{api}/api/unknown"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_preflight_and_cors_headers() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _path) = file_store(&dir);
    let (api, _shutdown) = start_api(store).await;
    let client = reqwest::Client::new();

    let response = client
        .request(
            reqwest::Method::OPTIONS,
            format!("http://{api}/api/rules"),
        )
        .header("Origin", "http://localhost:5173")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "http://localhost:5173"
    );

    // Plain responses carry the single allow-origin too.
    let response = client
        .get(format!("http://{api}/api/rules"))
        .header("Origin", "http://localhost:5173")
        .send()
        .await
        .unwrap();
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "http://localhost:5173"
    );
}

#[tokio::test]
async fn test_list_picks_up_external_file_edits() {
    let dir = tempfile::tempdir().unwrap();
    let (store, path) = file_store(&dir);
    let (api, _shutdown) = start_api(store).await;
    let client = reqwest::Client::new();
    let base = format!("http://{api}/api/rules");

    client
        .post(&base)
        .json(&json!({"target": "https://a", "failure": {"type": "latency", "latencyMs": 5}}))
        .send()
        .await
        .unwrap();

    // A CLI invocation in another process edits the same file.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let cli_store = FileRuleStore::new(Some(path));
    cli_store.add(Rule {
        id: "cli-added".to_string(),
        target: "https://b".to_string(),
        enabled: true,
        category: Some("database".to_string()),
        failure: Failure::flaky(0.5),
    });

    let rules: Vec<Value> = client.get(&base).send().await.unwrap().json().await.unwrap();
    let ids: Vec<&str> = rules.iter().filter_map(|r| r["id"].as_str()).collect();
    assert!(ids.contains(&"cli-added"), "got {ids:?}");
    assert_eq!(rules.len(), 2);
}
