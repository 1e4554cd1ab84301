//! [apps/manager/src/handlers/status.rs]
//!
//! `GET /api/v1/status` (spec.md §4.1 `list_status`) — login class.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use vm_store::repositories::status::{DeviceStatusView, StatusRepository};

use crate::errors::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_status))
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub cluster_id: Option<String>,
}

async fn list_status(
    State(state): State<AppState>,
    Query(q): Query<StatusQuery>,
) -> Result<Json<Vec<DeviceStatusView>>, ApiError> {
    let repo = StatusRepository::new(state.store.clone());
    let rows = repo.list_status(q.cluster_id.as_deref()).await?;
    Ok(Json(rows))
}
