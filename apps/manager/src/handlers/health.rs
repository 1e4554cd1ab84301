//! [apps/manager/src/handlers/health.rs]
//!
//! Always-public endpoints (spec.md §4.9's "public" class).

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn healthz() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

pub async fn info(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "name": "vm-manager",
        "version": env!("CARGO_PKG_VERSION"),
        "default_cluster_id": state.config.default_cluster_id,
        "poll_interval_s": state.config.poll_interval_s,
    }))
}
