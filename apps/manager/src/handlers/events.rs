//! [apps/manager/src/handlers/events.rs]
//!
//! `GET /api/v1/events` — login class, newest first, optional device
//! filter (spec.md §4.1 `list(limit, device_id?)`).

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use vm_domain::entities::Event;
use vm_store::repositories::event::EventRepository;

use crate::errors::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_events))
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub device_id: Option<String>,
    pub limit: Option<u32>,
}

async fn list_events(
    State(state): State<AppState>,
    Query(q): Query<EventsQuery>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let repo = EventRepository::new(state.store.clone());
    let limit = q.limit.unwrap_or(100).min(1000);
    let rows = repo.list(limit, q.device_id.as_deref()).await?;
    Ok(Json(rows))
}
