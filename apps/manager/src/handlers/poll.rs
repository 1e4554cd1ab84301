//! [apps/manager/src/handlers/poll.rs]
//!
//! `POST /api/v1/poll` (spec.md §4.5) — on-demand fan-out, admin class.
//! Shares its fan-out code with the periodic loop via `Scheduler::run_pass`.

use std::time::Duration;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::errors::ApiError;
use crate::services::scheduler::PollSummary;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(run_poll))
}

#[derive(Debug, Deserialize, Default)]
pub struct PollRequest {
    pub device_id: Option<String>,
    pub timeout_s: Option<u64>,
}

async fn run_poll(
    State(state): State<AppState>,
    Json(body): Json<PollRequest>,
) -> Result<Json<PollSummary>, ApiError> {
    let probe_timeout = body.timeout_s.map(Duration::from_secs);
    let summary = state.scheduler.run_pass(body.device_id.as_deref(), probe_timeout).await?;
    Ok(Json(summary))
}
