//! [apps/manager/src/handlers/baselines.rs]
//!
//! Baseline CRUD, keyed on `(cluster_id, vendor, model)` (spec.md §3).
//! Admin class.

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use vm_domain::entities::Baseline;
use vm_store::repositories::baseline::BaselineRepository;

use crate::errors::ApiError;
use crate::state::AppState;

pub fn read_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_baselines))
        .route("/{vendor}/{model}", get(get_baseline))
}

pub fn write_router() -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::post(upsert_baseline))
        .route("/{vendor}/{model}", delete(delete_baseline))
}

#[derive(Debug, Deserialize)]
pub struct UpsertBaselineRequest {
    pub cluster_id: String,
    pub vendor: String,
    pub model: String,
    pub expected_main_version: Option<String>,
    #[serde(default)]
    pub allowed_main_globs: Vec<String>,
    pub note: Option<String>,
    pub effective_from: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ClusterVendorModelQuery {
    pub cluster_id: String,
}

async fn upsert_baseline(
    State(state): State<AppState>,
    Json(body): Json<UpsertBaselineRequest>,
) -> Result<Json<Baseline>, ApiError> {
    let repo = BaselineRepository::new(state.store.clone());
    let baseline = Baseline {
        cluster_id: body.cluster_id,
        vendor: body.vendor,
        model: body.model,
        expected_main_version: body.expected_main_version,
        allowed_main_globs: body.allowed_main_globs,
        note: body.note,
        effective_from: body.effective_from,
    };
    repo.upsert(&baseline).await?;
    Ok(Json(baseline))
}

async fn get_baseline(
    State(state): State<AppState>,
    Path((vendor, model)): Path<(String, String)>,
    Query(q): Query<ClusterVendorModelQuery>,
) -> Result<Json<Baseline>, ApiError> {
    let repo = BaselineRepository::new(state.store.clone());
    let baseline = repo
        .get(&q.cluster_id, &vendor, &model)
        .await?
        .ok_or_else(|| ApiError::not_found("baseline_not_found"))?;
    Ok(Json(baseline))
}

#[derive(Debug, Deserialize)]
pub struct ListBaselinesQuery {
    pub cluster_id: Option<String>,
}

async fn list_baselines(
    State(state): State<AppState>,
    Query(q): Query<ListBaselinesQuery>,
) -> Result<Json<Vec<Baseline>>, ApiError> {
    let repo = BaselineRepository::new(state.store.clone());
    Ok(Json(repo.list(q.cluster_id.as_deref()).await?))
}

async fn delete_baseline(
    State(state): State<AppState>,
    Path((vendor, model)): Path<(String, String)>,
    Query(q): Query<ClusterVendorModelQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let repo = BaselineRepository::new(state.store.clone());
    repo.delete(&q.cluster_id, &vendor, &model).await?;
    Ok(Json(serde_json::json!({"ok": true})))
}
