//! [apps/manager/src/handlers/catalog.rs]
//!
//! Version catalog CRUD (spec.md §3/§4.1). Entries are also auto-created
//! with null metadata by the reconciler's `ensure_entry` call — this
//! surface is for operators to annotate them with changelog/risk data.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use vm_domain::entities::VersionCatalogEntry;
use vm_store::repositories::catalog::CatalogRepository;

use crate::errors::ApiError;
use crate::state::AppState;

pub fn read_router() -> Router<AppState> {
    Router::new().route("/", get(list_entries))
}

pub fn write_router() -> Router<AppState> {
    Router::new().route("/", axum::routing::post(upsert_entry))
}

#[derive(Debug, Deserialize)]
pub struct UpsertCatalogRequest {
    pub vendor: String,
    pub model: String,
    pub main_version: String,
    pub changelog_md: Option<String>,
    pub released_at: Option<DateTime<Utc>>,
    pub risk_level: Option<String>,
    pub checksum: Option<String>,
}

async fn upsert_entry(
    State(state): State<AppState>,
    Json(body): Json<UpsertCatalogRequest>,
) -> Result<Json<VersionCatalogEntry>, ApiError> {
    let repo = CatalogRepository::new(state.store.clone());
    let entry = VersionCatalogEntry {
        vendor: body.vendor,
        model: body.model,
        main_version: body.main_version,
        changelog_md: body.changelog_md,
        released_at: body.released_at,
        risk_level: body.risk_level,
        checksum: body.checksum,
    };
    repo.upsert(&entry).await?;
    Ok(Json(entry))
}

#[derive(Debug, Deserialize)]
pub struct ListCatalogQuery {
    pub vendor: Option<String>,
    pub model: Option<String>,
}

async fn list_entries(
    State(state): State<AppState>,
    Query(q): Query<ListCatalogQuery>,
) -> Result<Json<Vec<VersionCatalogEntry>>, ApiError> {
    let repo = CatalogRepository::new(state.store.clone());
    Ok(Json(repo.list(q.vendor.as_deref(), q.model.as_deref()).await?))
}
