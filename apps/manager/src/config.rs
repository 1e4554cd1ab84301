//! [apps/manager/src/config.rs]
//!
//! Process configuration is read entirely from the environment at
//! startup (§4.12) — there is deliberately no argument-parsing crate in
//! this workspace; `VM_*` variables correspond 1:1 to the non-normative
//! CLI surface in spec.md §6.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub poll_workers: usize,
    pub registration_token: Option<String>,
    pub default_cluster_id: String,
    pub default_cluster_name: String,
    pub poll_interval_s: u64,
    pub webhook_url: Option<String>,
    pub api_token: Option<String>,
    pub session_ttl_s: i64,
    pub probe_timeout: Duration,
    pub fetch_timeout: Duration,
    pub discovery_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env_or("VM_HOST", "0.0.0.0"),
            port: env_parse_or("VM_PORT", 8080),
            database_path: env_or("VM_DB", "vm.sqlite"),
            poll_workers: env_parse_or("VM_POLL_WORKERS", 10),
            registration_token: env_opt("VM_REGISTRATION_TOKEN"),
            default_cluster_id: env_or("VM_DEFAULT_CLUSTER_ID", "default"),
            default_cluster_name: env_or("VM_DEFAULT_CLUSTER_NAME", "default"),
            poll_interval_s: env_parse_or("VM_POLL_INTERVAL_S", 0),
            webhook_url: env_opt("VM_WEBHOOK_URL"),
            api_token: env_opt("VM_API_TOKEN"),
            session_ttl_s: env_parse_or("VM_SESSION_TTL_S", 12 * 60 * 60),
            probe_timeout: Duration::from_millis(2000),
            fetch_timeout: Duration::from_millis(5000),
            discovery_timeout: Duration::from_millis(800),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
