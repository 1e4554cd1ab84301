//! [apps/manager/src/handlers/devices.rs]
//!
//! Device CRUD plus the three device-lifecycle endpoints spec.md §4.7
//! groups with it: self-registration, controlled-file acknowledgment,
//! and the per-device version history view.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vm_domain::entities::{AuthType, Device};
use vm_domain::wire::{infer_identity, DvpPayload};
use vm_dvp::{poll_device, ProbeTarget};
use vm_store::repositories::catalog::CatalogRepository;
use vm_store::repositories::device::{DeviceRepository, DeviceUpdate, UpsertAction};
use vm_store::repositories::event::{EventRepository, NewEvent};
use vm_store::repositories::snapshot::{NewSnapshot, SnapshotRepository};

use crate::errors::ApiError;
use crate::middleware::{Identity, Role};
use crate::state::AppState;

pub fn read_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_devices))
        .route("/{id}", get(get_device))
        .route("/{id}/version-history", get(version_history))
}

pub fn write_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_device))
        .route("/{id}", axum::routing::patch(update_device).delete(delete_device))
        .route("/{id}/ack-controlled-files", post(ack_controlled_files))
}

pub fn register_router() -> Router<AppState> {
    Router::new().route("/", post(register))
}

#[derive(Debug, Deserialize)]
pub struct ListDevicesQuery {
    pub cluster_id: Option<String>,
    #[serde(default)]
    pub enabled_only: bool,
}

async fn list_devices(
    State(state): State<AppState>,
    Query(q): Query<ListDevicesQuery>,
) -> Result<Json<Vec<Device>>, ApiError> {
    let repo = DeviceRepository::new(state.store.clone());
    Ok(Json(repo.list(q.cluster_id.as_deref(), q.enabled_only).await?))
}

async fn get_device(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Device>, ApiError> {
    let repo = DeviceRepository::new(state.store.clone());
    let device = repo.get(&id).await?.ok_or_else(|| ApiError::not_found("device_not_found"))?;
    Ok(Json(device))
}

#[derive(Debug, Deserialize)]
#[allow(clippy::too_many_arguments)]
pub struct CreateDeviceRequest {
    pub cluster_id: String,
    pub device_key: String,
    pub vendor: String,
    pub model: String,
    pub ip: String,
    pub port: u16,
    pub protocol: String,
    pub path: String,
    #[serde(default)]
    pub auth_type: String,
    pub auth_token: Option<String>,
}

async fn create_device(
    State(state): State<AppState>,
    Json(body): Json<CreateDeviceRequest>,
) -> Result<Json<Device>, ApiError> {
    let repo = DeviceRepository::new(state.store.clone());
    let id = Device::new_id();
    let device = repo
        .create(
            &id,
            &body.cluster_id,
            &body.device_key,
            &body.vendor,
            &body.model,
            &body.ip,
            body.port,
            &body.protocol,
            &body.path,
            AuthType::parse(&body.auth_type),
            body.auth_token.as_deref(),
        )
        .await?;
    Ok(Json(device))
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateDeviceRequest {
    pub cluster_id: Option<String>,
    pub vendor: Option<String>,
    pub model: Option<String>,
    #[serde(default)]
    pub line_no: Option<Option<String>>,
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub protocol: Option<String>,
    pub path: Option<String>,
    pub auth_type: Option<String>,
    #[serde(default)]
    pub auth_token: Option<Option<String>>,
    pub enabled: Option<bool>,
}

async fn update_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateDeviceRequest>,
) -> Result<Json<Device>, ApiError> {
    let repo = DeviceRepository::new(state.store.clone());
    let patch = DeviceUpdate {
        cluster_id: body.cluster_id,
        vendor: body.vendor,
        model: body.model,
        line_no: body.line_no,
        ip: body.ip,
        port: body.port,
        protocol: body.protocol,
        path: body.path,
        auth_type: body.auth_type.as_deref().map(AuthType::parse),
        auth_token: body.auth_token,
        enabled: body.enabled,
    };
    repo.update(&id, patch).await?;
    let device = repo.get(&id).await?.ok_or_else(|| ApiError::not_found("device_not_found"))?;
    Ok(Json(device))
}

async fn delete_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let repo = DeviceRepository::new(state.store.clone());
    repo.delete(&id).await?;
    Ok(Json(serde_json::json!({"ok": true})))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub registration_token: Option<String>,
    pub cluster_id: Option<String>,
    pub device_key: Option<String>,
    pub vendor: Option<String>,
    pub model: Option<String>,
    #[serde(default)]
    pub ip: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_auth_type")]
    pub auth_type: String,
    pub auth_token: Option<String>,
    /// Alternative to `ip`/`port`/`path`/`protocol`: an `http://host[:port][/path]`
    /// URL, parsed and used to override those fields (original_source/server.py
    /// `_parse_dvp_url`).
    pub dvp_url: Option<String>,
    #[serde(default)]
    pub prefer_remote_ip: bool,
    #[serde(default = "default_true")]
    pub record_snapshot: bool,
}

fn default_port() -> u16 {
    80
}
fn default_protocol() -> String {
    "dvp1-http".to_string()
}
fn default_path() -> String {
    "/.well-known/device-version".to_string()
}
fn default_auth_type() -> String {
    "none".to_string()
}
fn default_true() -> bool {
    true
}

/// Parses an `http://host[:port][/path]` URL into DVP probe coordinates.
/// Mirrors `original_source/server.py`'s `_parse_dvp_url`: only the `http`
/// scheme is accepted, the hostname is required, and a missing path falls
/// back to the well-known DVP path.
struct ParsedDvpUrl {
    ip: String,
    port: u16,
    path: String,
}

fn parse_dvp_url(url: &str) -> Option<ParsedDvpUrl> {
    let rest = url.strip_prefix("http://")?;
    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, "/.well-known/device-version"),
    };
    if authority.is_empty() {
        return None;
    }
    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port_str)) => (host, port_str.parse::<u16>().ok()?),
        None => (authority, 80),
    };
    if host.is_empty() {
        return None;
    }
    let path = if path.is_empty() { "/.well-known/device-version" } else { path };
    Some(ParsedDvpUrl { ip: host.to_string(), port, path: path.to_string() })
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub device_id: String,
    pub action: String,
}

/// `POST /api/v1/register` (spec.md §4.7). Gated by a configured
/// registration token when one exists; otherwise falls back to requiring
/// an admin session, since this route sits outside the `require_admin`
/// layer to let the token-only path work without a session.
async fn register(
    State(state): State<AppState>,
    identity: Option<Extension<Identity>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    match &state.config.registration_token {
        Some(expected) => {
            let provided = body.registration_token.as_deref().unwrap_or("");
            if provided != expected {
                return Err(ApiError::new(StatusCode::UNAUTHORIZED, "invalid_registration_token"));
            }
        }
        None => match identity {
            Some(Extension(Identity { role: Role::Admin, .. })) => {}
            _ => return Err(ApiError::new(StatusCode::UNAUTHORIZED, "admin_session_required")),
        },
    }

    let cluster_id = body.cluster_id.unwrap_or_else(|| state.config.default_cluster_id.clone());

    let mut ip = body.ip.clone();
    let mut port = body.port;
    let mut path = body.path.clone();
    let mut protocol = body.protocol.clone();

    if let Some(dvp_url) = body.dvp_url.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let parsed = parse_dvp_url(dvp_url).ok_or_else(|| ApiError::bad_request("invalid_dvp_url"))?;
        ip = parsed.ip;
        port = parsed.port;
        path = parsed.path;
        protocol = "dvp1-http".to_string();
    }

    if body.prefer_remote_ip || ip.is_empty() {
        let peer = connect_info.ok_or_else(|| ApiError::bad_request("missing_remote_ip"))?;
        ip = peer.0.ip().to_string();
    }

    let (device_key, vendor, model, probe_result) = if let (Some(key), Some(vendor), Some(model)) =
        (&body.device_key, &body.vendor, &body.model)
    {
        (key.clone(), vendor.clone(), model.clone(), None)
    } else {
        let target = ProbeTarget {
            protocol: &protocol,
            ip: &ip,
            port,
            path: &path,
            auth_type: &body.auth_type,
            auth_token: body.auth_token.as_deref(),
        };
        let result = poll_device(&state.http_client, target, state.config.probe_timeout).await;
        if !result.success {
            return Err(ApiError::bad_request(format!(
                "probe_failed:{}",
                result.error.unwrap_or_else(|| "unknown_error".to_string())
            )));
        }
        let payload: DvpPayload = result
            .payload
            .clone()
            .and_then(|v| serde_json::from_value(v).ok())
            .ok_or_else(|| ApiError::bad_request("invalid_json:not a DVP payload"))?;
        let identity =
            infer_identity(&payload).ok_or_else(|| ApiError::bad_request("missing_device_fields"))?;
        (identity.device_serial, identity.supplier, identity.device_type, Some(result))
    };

    let devices = DeviceRepository::new(state.store.clone());
    let (device_id, action) = devices
        .upsert_by_key(&cluster_id, &device_key, &vendor, &model, &ip, port, &protocol, &path)
        .await?;

    if body.record_snapshot {
        if let Some(result) = probe_result {
            let snapshots = SnapshotRepository::new(state.store.clone());
            snapshots
                .record(NewSnapshot {
                    device_id: &device_id,
                    success: true,
                    http_status: result.http_status,
                    latency_ms: result.latency_ms,
                    error: None,
                    protocol_version: result.protocol_version,
                    main_version: result.main_version.as_deref(),
                    firmware_version: result.firmware_version.as_deref(),
                    payload: result.payload.as_ref(),
                })
                .await?;
        }
    }

    let action = match action {
        UpsertAction::Created => "created",
        UpsertAction::Updated => "updated",
    };
    Ok(Json(RegisterResponse { device_id, action: action.to_string() }))
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub ok: bool,
    pub ack_change_event_id: i64,
}

async fn ack_controlled_files(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AckResponse>, ApiError> {
    let events = EventRepository::new(state.store.clone());
    let change = events
        .latest_unacknowledged_controlled_files_change(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("no_pending_change"))?;

    let ack_id = events
        .create(NewEvent {
            device_id: &id,
            event_type: "controlled_files_ack",
            old_state: None,
            new_state: Some("ok"),
            message: None,
            payload: Some(&serde_json::json!({"acknowledged_event_id": change.id})),
        })
        .await?;

    let devices = DeviceRepository::new(state.store.clone());
    devices.update_state(&id, "ok").await?;

    Ok(Json(AckResponse { ok: true, ack_change_event_id: ack_id }))
}

#[derive(Debug, Serialize)]
pub struct VersionHistoryEntry {
    pub main_version: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub sample_count: usize,
    pub changelog_md: Option<String>,
    pub released_at: Option<DateTime<Utc>>,
    pub risk_level: Option<String>,
    pub checksum: Option<String>,
}

const VERSION_HISTORY_SCAN_LIMIT: u32 = 50_000;

async fn version_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<VersionHistoryEntry>>, ApiError> {
    let devices = DeviceRepository::new(state.store.clone());
    let device = devices.get(&id).await?.ok_or_else(|| ApiError::not_found("device_not_found"))?;

    let snapshots = SnapshotRepository::new(state.store.clone());
    let rows = snapshots.list(&id, VERSION_HISTORY_SCAN_LIMIT, 0, true).await?;

    let mut grouped: BTreeMap<String, (DateTime<Utc>, DateTime<Utc>, usize)> = BTreeMap::new();
    for snap in rows {
        let Some(version) = snap.main_version else { continue };
        grouped
            .entry(version)
            .and_modify(|(first, last, count)| {
                if snap.observed_at < *first {
                    *first = snap.observed_at;
                }
                if snap.observed_at > *last {
                    *last = snap.observed_at;
                }
                *count += 1;
            })
            .or_insert((snap.observed_at, snap.observed_at, 1));
    }

    let catalog = CatalogRepository::new(state.store.clone());
    let mut out = Vec::with_capacity(grouped.len());
    for (version, (first_seen, last_seen, sample_count)) in grouped {
        let entry = catalog.get(&device.vendor, &device.model, &version).await?;
        out.push(VersionHistoryEntry {
            main_version: version,
            first_seen,
            last_seen,
            sample_count,
            changelog_md: entry.as_ref().and_then(|e| e.changelog_md.clone()),
            released_at: entry.as_ref().and_then(|e| e.released_at),
            risk_level: entry.as_ref().and_then(|e| e.risk_level.clone()),
            checksum: entry.as_ref().and_then(|e| e.checksum.clone()),
        });
    }
    out.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));

    Ok(Json(out))
}
