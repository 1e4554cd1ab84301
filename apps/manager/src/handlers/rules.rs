//! [apps/manager/src/handlers/rules.rs]
//!
//! Controlled-file rule CRUD, same shape as baselines (spec.md §3/§4.1).
//! Admin class.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use vm_domain::entities::{ControlledFileRule, RuleMode};
use vm_store::repositories::rule::RuleRepository;

use crate::errors::ApiError;
use crate::state::AppState;

pub fn read_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_rules))
        .route("/{vendor}/{model}", get(get_rule))
}

pub fn write_router() -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::post(upsert_rule))
        .route("/{vendor}/{model}", axum::routing::delete(delete_rule))
}

#[derive(Debug, Deserialize)]
pub struct UpsertRuleRequest {
    pub cluster_id: String,
    pub vendor: String,
    pub model: String,
    pub paths: Vec<String>,
    pub mode: String,
    pub max_bytes: u32,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClusterVendorModelQuery {
    pub cluster_id: String,
}

async fn upsert_rule(
    State(state): State<AppState>,
    Json(body): Json<UpsertRuleRequest>,
) -> Result<Json<ControlledFileRule>, ApiError> {
    let repo = RuleRepository::new(state.store.clone());
    let rule = ControlledFileRule {
        cluster_id: body.cluster_id,
        vendor: body.vendor,
        model: body.model,
        paths: body.paths,
        mode: RuleMode::parse(&body.mode),
        max_bytes: body.max_bytes,
        note: body.note,
    };
    repo.upsert(&rule).await?;
    Ok(Json(rule))
}

async fn get_rule(
    State(state): State<AppState>,
    Path((vendor, model)): Path<(String, String)>,
    Query(q): Query<ClusterVendorModelQuery>,
) -> Result<Json<ControlledFileRule>, ApiError> {
    let repo = RuleRepository::new(state.store.clone());
    let rule = repo
        .get(&q.cluster_id, &vendor, &model)
        .await?
        .ok_or_else(|| ApiError::not_found("rule_not_found"))?;
    Ok(Json(rule))
}

#[derive(Debug, Deserialize)]
pub struct ListRulesQuery {
    pub cluster_id: Option<String>,
}

async fn list_rules(
    State(state): State<AppState>,
    Query(q): Query<ListRulesQuery>,
) -> Result<Json<Vec<ControlledFileRule>>, ApiError> {
    let repo = RuleRepository::new(state.store.clone());
    Ok(Json(repo.list(q.cluster_id.as_deref()).await?))
}

async fn delete_rule(
    State(state): State<AppState>,
    Path((vendor, model)): Path<(String, String)>,
    Query(q): Query<ClusterVendorModelQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let repo = RuleRepository::new(state.store.clone());
    repo.delete(&q.cluster_id, &vendor, &model).await?;
    Ok(Json(serde_json::json!({"ok": true})))
}
