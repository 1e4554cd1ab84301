//! [apps/manager/tests/device_lifecycle_test.rs]
//!
//! Drives the router end to end over an in-memory Store and a tiny local
//! DVP device stub, covering register → poll → baseline mismatch → ack.

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tower::ServiceExt;
use vm_manager::config::Config;
use vm_manager::state::AppState;

const API_TOKEN: &str = "test-admin-token";

async fn test_state() -> AppState {
    let store = vm_store::Store::connect(":memory:").await.expect("connect memory store");
    let config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_path: ":memory:".to_string(),
        poll_workers: 4,
        registration_token: None,
        default_cluster_id: "default".to_string(),
        default_cluster_name: "default".to_string(),
        poll_interval_s: 0,
        webhook_url: None,
        api_token: Some(API_TOKEN.to_string()),
        session_ttl_s: 3600,
        probe_timeout: std::time::Duration::from_millis(500),
        fetch_timeout: std::time::Duration::from_millis(500),
        discovery_timeout: std::time::Duration::from_millis(500),
    };
    AppState::new(store, config)
}

/// Spawns a minimal DVP v1 device on a random local port, returning its
/// port. The device always reports the same `main_version`.
async fn spawn_fake_device(main_version: &'static str) -> u16 {
    async fn status(main_version: axum::extract::State<&'static str>) -> Json<Value> {
        Json(json!({
            "protocol": "dvp",
            "protocol_version": 1,
            "device": {"id": "dev-001", "vendor": "acme", "model": "widget-3000"},
            "versions": {"main": main_version.0, "firmware": "1.0.0"},
        }))
    }
    let router = Router::new().route("/status", get(status)).with_state(main_version);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind fake device");
    let addr: SocketAddr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    addr.port()
}

fn admin_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("X-Api-Token", API_TOKEN)
        .body(Body::from(body.to_string()))
        .expect("build request")
}

#[tokio::test]
async fn register_then_poll_reports_no_baseline_until_one_is_set() {
    let state = test_state().await;
    let router = vm_manager::routes::build_router(state.clone());
    let port = spawn_fake_device("1.2.3").await;

    let register_body = json!({
        "cluster_id": "default",
        "ip": "127.0.0.1",
        "port": port,
        "protocol": "dvp1-http",
        "path": "/status",
        "auth_type": "none",
    });
    let response = router
        .clone()
        .oneshot(admin_request("POST", "/api/v1/register", register_body))
        .await
        .expect("register request");
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert_eq!(body["action"], "created");
    let device_id = body["device_id"].as_str().unwrap().to_string();

    let poll_response = router
        .clone()
        .oneshot(admin_request("POST", "/api/v1/poll", json!({})))
        .await
        .expect("poll request");
    assert_eq!(poll_response.status(), StatusCode::OK);
    let summary: Value =
        serde_json::from_slice(&axum::body::to_bytes(poll_response.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert_eq!(summary["ok"], 1);
    assert_eq!(summary["results"][0]["state"], "no_baseline");

    let status_response = router
        .clone()
        .oneshot(admin_request("GET", "/api/v1/status", Value::Null))
        .await
        .expect("status request");
    let views: Value =
        serde_json::from_slice(&axum::body::to_bytes(status_response.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert_eq!(views[0]["device"]["id"], device_id);
    assert_eq!(views[0]["state"], "no_baseline");
}

#[tokio::test]
async fn poll_against_mismatched_baseline_flags_mismatch() {
    let state = test_state().await;
    let router = vm_manager::routes::build_router(state.clone());
    let port = spawn_fake_device("9.9.9").await;

    let register_body = json!({
        "cluster_id": "default",
        "ip": "127.0.0.1",
        "port": port,
        "protocol": "dvp1-http",
        "path": "/status",
        "auth_type": "none",
    });
    router
        .clone()
        .oneshot(admin_request("POST", "/api/v1/register", register_body))
        .await
        .expect("register request");

    let baseline_body = json!({
        "cluster_id": "default",
        "vendor": "acme",
        "model": "widget-3000",
        "expected_main_version": "1.0.0",
        "allowed_main_globs": ["1.0.*"],
    });
    let baseline_response = router
        .clone()
        .oneshot(admin_request("POST", "/api/v1/baselines", baseline_body))
        .await
        .expect("baseline request");
    assert_eq!(baseline_response.status(), StatusCode::OK);

    let poll_response = router
        .clone()
        .oneshot(admin_request("POST", "/api/v1/poll", json!({})))
        .await
        .expect("poll request");
    let summary: Value =
        serde_json::from_slice(&axum::body::to_bytes(poll_response.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert_eq!(summary["results"][0]["state"], "mismatch");

    let events_response = router
        .clone()
        .oneshot(admin_request("GET", "/api/v1/events", Value::Null))
        .await
        .expect("events request");
    let events: Value =
        serde_json::from_slice(&axum::body::to_bytes(events_response.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert!(events.as_array().unwrap().iter().any(|e| e["event_type"] == "state_change"));
}

#[tokio::test]
async fn status_and_poll_require_authentication() {
    let state = test_state().await;
    let router = vm_manager::routes::build_router(state);

    let request = Request::builder()
        .method("GET")
        .uri("/api/v1/status")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/poll")
        .header("content-type", "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder().method("GET").uri("/healthz").body(Body::empty()).unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
