//! [apps/manager/src/handlers/discover.rs]
//!
//! `POST /api/v1/discover` (spec.md §4.8) — admin class.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::errors::ApiError;
use crate::services::discovery::{DiscoveryRequest, DiscoverySummary, DEFAULT_MAX_HOSTS};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(run_discover))
}

#[derive(Debug, Deserialize)]
pub struct DiscoverRequestBody {
    pub cluster_id: Option<String>,
    pub cidr: Option<String>,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_auth_type")]
    pub auth_type: String,
    pub auth_token: Option<String>,
    pub max_hosts: Option<usize>,
}

fn default_port() -> u16 {
    80
}
fn default_protocol() -> String {
    "http".to_string()
}
fn default_path() -> String {
    "/status".to_string()
}
fn default_auth_type() -> String {
    "none".to_string()
}

async fn run_discover(
    State(state): State<AppState>,
    Json(body): Json<DiscoverRequestBody>,
) -> Result<Json<DiscoverySummary>, ApiError> {
    let req = DiscoveryRequest {
        cluster_id: body.cluster_id.unwrap_or_else(|| state.config.default_cluster_id.clone()),
        cidr: body.cidr,
        hosts: body.hosts,
        port: body.port,
        protocol: body.protocol,
        path: body.path,
        auth_type: body.auth_type,
        auth_token: body.auth_token,
        max_hosts: body.max_hosts.unwrap_or(DEFAULT_MAX_HOSTS),
    };
    let summary = state.discovery.run(req).await?;
    Ok(Json(summary))
}
