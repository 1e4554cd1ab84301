//! [apps/manager/src/handlers/clusters.rs]
//!
//! Cluster CRUD (spec.md §3/§4.1). Admin class — clusters are an
//! operator-facing grouping concept, not something devices touch.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use vm_domain::entities::Cluster;
use vm_store::repositories::cluster::ClusterRepository;

use crate::errors::ApiError;
use crate::state::AppState;

pub fn read_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_clusters))
        .route("/{id}", get(get_cluster))
}

pub fn write_router() -> Router<AppState> {
    Router::new().route("/", post(create_cluster))
}

#[derive(Debug, Deserialize)]
pub struct CreateClusterRequest {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

async fn create_cluster(
    State(state): State<AppState>,
    Json(body): Json<CreateClusterRequest>,
) -> Result<Json<Cluster>, ApiError> {
    let repo = ClusterRepository::new(state.store.clone());
    let cluster = repo.create(&body.id, &body.name, body.description.as_deref()).await?;
    Ok(Json(cluster))
}

async fn get_cluster(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Cluster>, ApiError> {
    let repo = ClusterRepository::new(state.store.clone());
    let cluster = repo.get(&id).await?.ok_or_else(|| ApiError::not_found("cluster_not_found"))?;
    Ok(Json(cluster))
}

async fn list_clusters(State(state): State<AppState>) -> Result<Json<Vec<Cluster>>, ApiError> {
    let repo = ClusterRepository::new(state.store.clone());
    Ok(Json(repo.list().await?))
}
