//! [libs/core/dvp/src/lib.rs]
//!
//! DVP v1 client (C2, spec.md §4.2). One GET per probe, normalized into a
//! `PollResult` that is always `Ok` to its caller — every failure mode is a
//! value, not a `Result::Err`, because a failed probe is still a
//! successfully-observed `Snapshot` row. The validation order below
//! mirrors the original Python poller exactly: transport error, non-200
//! status, invalid JSON, wrong protocol tag, missing `versions.main`.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use vm_domain::wire::FileFetchResponse;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(2000);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_millis(800);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollResult {
    pub success: bool,
    pub http_status: Option<u16>,
    pub latency_ms: Option<i64>,
    pub error: Option<String>,
    pub protocol_version: Option<i32>,
    pub main_version: Option<String>,
    pub firmware_version: Option<String>,
    pub payload: Option<Value>,
}

impl PollResult {
    fn failure(error: impl Into<String>, http_status: Option<u16>, latency_ms: Option<i64>) -> Self {
        PollResult {
            success: false,
            http_status,
            latency_ms,
            error: Some(error.into()),
            protocol_version: None,
            main_version: None,
            firmware_version: None,
            payload: None,
        }
    }
}

/// The device fields the client needs; deliberately not `vm_domain::Device`
/// itself so this crate can be exercised without pulling in the store.
#[derive(Debug, Clone)]
pub struct ProbeTarget<'a> {
    pub protocol: &'a str,
    pub ip: &'a str,
    pub port: u16,
    pub path: &'a str,
    pub auth_type: &'a str,
    pub auth_token: Option<&'a str>,
}

fn apply_auth(mut req: reqwest::RequestBuilder, auth_type: &str, token: Option<&str>) -> reqwest::RequestBuilder {
    let token = token.unwrap_or("");
    match auth_type {
        "bearer" => req = req.header("Authorization", format!("Bearer {token}")),
        "x-device-token" => req = req.header("X-Device-Token", token),
        _ => {}
    }
    req
}

/// Performs one probe and returns a normalized result. Never returns `Err`
/// — every transport or protocol failure is encoded as `success=false`.
#[tracing::instrument(skip(client, target), fields(ip = target.ip, port = target.port))]
pub async fn poll_device(client: &reqwest::Client, target: ProbeTarget<'_>, timeout: Duration) -> PollResult {
    if target.protocol != "dvp1-http" {
        return PollResult::failure(
            format!("unsupported_device_protocol:{}", target.protocol),
            None,
            None,
        );
    }
    poll_dvp1_http(client, target, timeout).await
}

async fn poll_dvp1_http(client: &reqwest::Client, target: ProbeTarget<'_>, timeout: Duration) -> PollResult {
    let url = format!("http://{}:{}{}", target.ip, target.port, target.path);
    let mut req = client.get(&url).header("Accept", "application/json").timeout(timeout);
    req = apply_auth(req, target.auth_type, target.auth_token);

    let started = Instant::now();
    let sent = req.send().await;
    let latency_ms = started.elapsed().as_millis() as i64;

    let response = match sent {
        Ok(r) => r,
        Err(e) => {
            let error = if e.is_timeout() || e.is_connect() {
                format!("url_error:{e}")
            } else {
                format!("exception:reqwest::Error:{e}")
            };
            return PollResult::failure(error, None, Some(latency_ms));
        }
    };

    let status = response.status().as_u16();
    if status != 200 {
        return PollResult::failure(format!("http_status:{status}"), Some(status), Some(latency_ms));
    }

    let raw = match response.text().await {
        Ok(t) => t,
        Err(e) => return PollResult::failure(format!("exception:reqwest::Error:{e}"), Some(status), Some(latency_ms)),
    };

    let payload: Value = match serde_json::from_str(&raw) {
        Ok(v) => v,
        Err(e) => {
            return PollResult::failure(
                format!("invalid_json:serde_json::Error:{e}"),
                Some(status),
                Some(latency_ms),
            )
        }
    };

    let obj = match payload.as_object() {
        Some(o) => o,
        None => {
            return PollResult::failure(
                "invalid_json:serde_json::Error:payload is not a JSON object",
                Some(status),
                Some(latency_ms),
            )
        }
    };

    let protocol = obj.get("protocol").and_then(Value::as_str).unwrap_or("");
    let protocol_version_raw = obj.get("protocol_version");
    let protocol_version_i64 = protocol_version_raw.and_then(Value::as_i64);
    let is_dvp1 = protocol == "dvp" && protocol_version_i64 == Some(1);

    if !is_dvp1 {
        return PollResult {
            success: false,
            http_status: Some(status),
            latency_ms: Some(latency_ms),
            error: Some("unsupported_protocol".to_string()),
            protocol_version: protocol_version_i64.map(|n| n as i32),
            main_version: None,
            firmware_version: None,
            payload: Some(payload),
        };
    }

    let versions = obj.get("versions").and_then(Value::as_object);
    let main_version = versions
        .and_then(|v| v.get("main"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let firmware_version = versions
        .and_then(|v| v.get("firmware"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    if main_version.is_none() {
        return PollResult {
            success: false,
            http_status: Some(status),
            latency_ms: Some(latency_ms),
            error: Some("missing_versions.main".to_string()),
            protocol_version: Some(1),
            main_version: None,
            firmware_version,
            payload: Some(payload),
        };
    }

    PollResult {
        success: true,
        http_status: Some(status),
        latency_ms: Some(latency_ms),
        error: None,
        protocol_version: Some(1),
        main_version,
        firmware_version,
        payload: Some(payload),
    }
}

#[derive(Debug, Error)]
pub enum DvpError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid json response: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Secondary fetch used by the differ's `fetch` mode (§4.3). Unlike
/// `poll_device`, failures here are real errors — the differ decides
/// whether to swallow them.
#[tracing::instrument(skip(client, target))]
pub async fn fetch_device_file(
    client: &reqwest::Client,
    target: &ProbeTarget<'_>,
    path: &str,
    timeout: Duration,
) -> Result<FileFetchResponse, DvpError> {
    let encoded_path = urlencoding_minimal(path);
    let url = format!(
        "http://{}:{}/.well-known/device-version/file?path={}",
        target.ip, target.port, encoded_path
    );
    let mut req = client.get(&url).header("Accept", "application/json").timeout(timeout);
    req = apply_auth(req, target.auth_type, target.auth_token);
    let response = req.send().await?;
    let body = response.text().await?;
    let parsed: FileFetchResponse = serde_json::from_str(&body)?;
    Ok(parsed)
}

/// Percent-encodes a path for the `path=` query parameter without pulling
/// in a dedicated URL-encoding crate — the character set devices report
/// is a small, predictable POSIX/Windows path alphabet.
fn urlencoding_minimal(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_protocol_short_circuits_without_io() {
        let target = ProbeTarget {
            protocol: "modbus-tcp",
            ip: "10.0.0.1",
            port: 502,
            path: "/",
            auth_type: "none",
            auth_token: None,
        };
        let result = tokio_test_block_on(poll_device(&reqwest::Client::new(), target, DEFAULT_PROBE_TIMEOUT));
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("unsupported_device_protocol:modbus-tcp"));
        assert!(result.latency_ms.is_none());
    }

    #[test]
    fn percent_encoding_covers_path_separators() {
        assert_eq!(urlencoding_minimal("/etc/app/config.yml"), "%2Fetc%2Fapp%2Fconfig.yml");
    }

    // Minimal single-threaded block_on so this crate's unit tests don't need
    // the `rt` feature enabled on the non-dev build of tokio.
    fn tokio_test_block_on<F: std::future::Future>(fut: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("build current-thread runtime for test")
            .block_on(fut)
    }
}
