//! Persisted entities. Field shapes mirror the `vm-store` schema closely
//! enough that a repository can build one of these straight from a row,
//! but this module has no knowledge of SQL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthType {
    None,
    Bearer,
    XDeviceToken,
}

impl Default for AuthType {
    fn default() -> Self {
        AuthType::None
    }
}

impl AuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthType::None => "none",
            AuthType::Bearer => "bearer",
            AuthType::XDeviceToken => "x-device-token",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "bearer" => AuthType::Bearer,
            "x-device-token" => AuthType::XDeviceToken,
            _ => AuthType::None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub cluster_id: String,
    pub device_key: String,
    pub vendor: String,
    pub model: String,
    pub line_no: Option<String>,
    pub ip: String,
    pub port: u16,
    pub protocol: String,
    pub path: String,
    pub auth_type: AuthType,
    pub auth_token: Option<String>,
    pub enabled: bool,
    pub last_state: Option<String>,
    pub last_state_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Device {
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Baseline {
    pub cluster_id: String,
    pub vendor: String,
    pub model: String,
    pub expected_main_version: String,
    pub allowed_main_globs: Vec<String>,
    pub note: Option<String>,
    pub effective_from: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionCatalogEntry {
    pub vendor: String,
    pub model: String,
    pub main_version: String,
    pub changelog_md: Option<String>,
    pub released_at: Option<DateTime<Utc>>,
    pub risk_level: Option<String>,
    pub checksum: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleMode {
    Auto,
    Inline,
    Fetch,
}

impl RuleMode {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "inline" => RuleMode::Inline,
            "fetch" => RuleMode::Fetch,
            _ => RuleMode::Auto,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleMode::Auto => "auto",
            RuleMode::Inline => "inline",
            RuleMode::Fetch => "fetch",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlledFileRule {
    pub cluster_id: String,
    pub vendor: String,
    pub model: String,
    pub paths: Vec<String>,
    pub mode: RuleMode,
    pub max_bytes: u32,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: i64,
    pub device_id: String,
    pub observed_at: DateTime<Utc>,
    pub success: bool,
    pub http_status: Option<u16>,
    pub latency_ms: Option<i64>,
    pub error: Option<String>,
    pub protocol_version: Option<i32>,
    pub main_version: Option<String>,
    pub firmware_version: Option<String>,
    pub payload: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationSource {
    Inline,
    Fetch,
}

impl ObservationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservationSource::Inline => "inline",
            ObservationSource::Fetch => "fetch",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlledFileObservation {
    pub device_id: String,
    pub path: String,
    pub fingerprint: String,
    pub snapshot_id: i64,
    pub content_b64: Option<String>,
    pub encoding: Option<String>,
    pub content_type: Option<String>,
    pub truncated: bool,
    pub source: ObservationSource,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub device_id: String,
    pub created_at: DateTime<Utc>,
    pub event_type: String,
    pub old_state: Option<String>,
    pub new_state: Option<String>,
    pub message: Option<String>,
    pub payload: Option<Value>,
}

pub const EVENT_STATE_CHANGE: &str = "state_change";
pub const EVENT_VERSION_OBSERVED: &str = "version_observed";
pub const EVENT_VERSION_CHANGE: &str = "version_change";
pub const EVENT_CONTROLLED_FILES_CHANGE: &str = "controlled_files_change";
pub const EVENT_CONTROLLED_FILES_ACK: &str = "controlled_files_ack";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
