//! [apps/manager/src/services/discovery.rs]
//!
//! Discovery (C8, spec.md §4.8): expand a host list or CIDR range into a
//! bounded set of targets, probe each concurrently, and upsert the
//! responders. Concurrency is unbounded at the `tokio::spawn` level but
//! capped in practice by `max_hosts`.

use std::net::IpAddr;
use std::time::Duration;

use ipnet::IpNet;
use serde::Serialize;
use tokio::task::JoinSet;
use vm_domain::wire::{infer_identity, DvpPayload};
use vm_dvp::{poll_device, ProbeTarget};
use vm_store::repositories::device::{DeviceRepository, UpsertAction};
use vm_store::repositories::snapshot::{NewSnapshot, SnapshotRepository};
use vm_store::{DbError, Store};

pub const DEFAULT_MAX_HOSTS: usize = 1024;

pub struct DiscoveryRequest {
    pub cluster_id: String,
    pub cidr: Option<String>,
    pub hosts: Vec<String>,
    pub port: u16,
    pub protocol: String,
    pub path: String,
    pub auth_type: String,
    pub auth_token: Option<String>,
    pub max_hosts: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TargetOutcome {
    Created { ip: String, device_id: String },
    Updated { ip: String, device_id: String },
    Failed { ip: String, error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoverySummary {
    pub targets: usize,
    pub created: usize,
    pub updated: usize,
    pub results: Vec<TargetOutcome>,
}

/// Parses `cidr`/`hosts` into a bounded, deduplicated address list. An
/// invalid CIDR is the only hard error; an oversized range is silently
/// truncated to `max_hosts` per spec.md §8's boundary test.
pub fn expand_targets(cidr: Option<&str>, hosts: &[String], max_hosts: usize) -> Result<Vec<IpAddr>, String> {
    let mut out: Vec<IpAddr> = Vec::new();

    if let Some(cidr) = cidr {
        let net: IpNet = cidr.parse().map_err(|e| format!("invalid_cidr:{e}"))?;
        for ip in net.hosts() {
            if out.len() >= max_hosts {
                break;
            }
            out.push(ip);
        }
    }

    for host in hosts {
        if out.len() >= max_hosts {
            break;
        }
        match host.parse::<IpAddr>() {
            Ok(ip) => out.push(ip),
            Err(e) => return Err(format!("invalid_host:{host}:{e}")),
        }
    }

    out.truncate(max_hosts);
    Ok(out)
}

pub struct Discovery {
    store: Store,
    http_client: reqwest::Client,
    timeout: Duration,
}

impl Discovery {
    pub fn new(store: Store, http_client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            store,
            http_client,
            timeout,
        }
    }

    pub async fn run(&self, req: DiscoveryRequest) -> Result<DiscoverySummary, DbError> {
        let targets = expand_targets(req.cidr.as_deref(), &req.hosts, req.max_hosts)
            .map_err(|e| DbError::Mapping(e))?;

        let mut set = JoinSet::new();
        for ip in &targets {
            let client = self.http_client.clone();
            let ip = ip.to_string();
            let port = req.port;
            let protocol = req.protocol.clone();
            let path = req.path.clone();
            let auth_type = req.auth_type.clone();
            let auth_token = req.auth_token.clone();
            let timeout = self.timeout;
            set.spawn(async move {
                let target = ProbeTarget {
                    protocol: &protocol,
                    ip: &ip,
                    port,
                    path: &path,
                    auth_type: &auth_type,
                    auth_token: auth_token.as_deref(),
                };
                let result = poll_device(&client, target, timeout).await;
                (ip, result)
            });
        }

        let devices = DeviceRepository::new(self.store.clone());
        let snapshots = SnapshotRepository::new(self.store.clone());

        let mut results = Vec::with_capacity(targets.len());
        let mut created = 0usize;
        let mut updated = 0usize;

        while let Some(joined) = set.join_next().await {
            let (ip, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    results.push(TargetOutcome::Failed {
                        ip: "unknown".to_string(),
                        error: format!("task_panicked:{e}"),
                    });
                    continue;
                }
            };

            if !result.success {
                results.push(TargetOutcome::Failed {
                    ip,
                    error: result.error.unwrap_or_else(|| "unknown_error".to_string()),
                });
                continue;
            }

            let payload = match result.payload.clone().map(serde_json::from_value::<DvpPayload>) {
                Some(Ok(payload)) => payload,
                _ => {
                    results.push(TargetOutcome::Failed {
                        ip,
                        error: "invalid_json:not a DVP payload".to_string(),
                    });
                    continue;
                }
            };

            let Some(identity) = infer_identity(&payload) else {
                results.push(TargetOutcome::Failed {
                    ip,
                    error: "missing_device_fields".to_string(),
                });
                continue;
            };

            let upsert = devices
                .upsert_by_key(
                    &req.cluster_id,
                    &identity.device_serial,
                    &identity.supplier,
                    &identity.device_type,
                    &ip,
                    req.port,
                    &req.protocol,
                    &req.path,
                )
                .await?;
            let (device_id, action) = upsert;

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

            match action {
                UpsertAction::Created => {
                    created += 1;
                    results.push(TargetOutcome::Created { ip, device_id });
                }
                UpsertAction::Updated => {
                    updated += 1;
                    results.push(TargetOutcome::Updated { ip, device_id });
                }
            }
        }

        Ok(DiscoverySummary {
            targets: targets.len(),
            created,
            updated,
            results,
        })
    }
}
