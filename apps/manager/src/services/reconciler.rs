//! [apps/manager/src/services/reconciler.rs]
//!
//! The reconciler (C4, spec.md §4.4): one probe-and-record cycle for a
//! single device. Wires the pure DVP client and differ crates to the
//! store, runs the state function, and emits the event trio
//! (`state_change`, `version_observed`/`version_change`,
//! `controlled_files_change`) in the order spec.md fixes.

use std::time::Duration;

use serde_json::Value;
use tracing::warn;
use vm_differ::{
    decode_to_text, diff_fingerprints, normalize_entries, plan_observation, select_controlled,
    unified_diff, DiffOutcome, NormalizedEntry, ObservationPlan,
};
use chrono::Utc;
use vm_domain::entities::{
    Baseline, ControlledFileRule, Device, Event, ObservationSource, EVENT_CONTROLLED_FILES_CHANGE,
    EVENT_STATE_CHANGE, EVENT_VERSION_CHANGE, EVENT_VERSION_OBSERVED,
};
use vm_domain::glob::baseline_allows;
use vm_domain::state::DeviceState;
use vm_domain::wire::DvpFileEntry;
use vm_dvp::{fetch_device_file, poll_device, PollResult, ProbeTarget};
use vm_store::repositories::baseline::BaselineRepository;
use vm_store::repositories::catalog::CatalogRepository;
use vm_store::repositories::device::DeviceRepository;
use vm_store::repositories::event::{EventRepository, NewEvent};
use vm_store::repositories::observation::{NewObservation, ObservationRepository};
use vm_store::repositories::rule::RuleRepository;
use vm_store::repositories::snapshot::{NewSnapshot, SnapshotRepository};
use vm_store::{DbError, Store};

use crate::services::webhook::WebhookNotifier;

/// One entry of the `controlled_files_change` event payload.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FileChange {
    pub path: String,
    pub old_fingerprint: Option<String>,
    pub new_fingerprint: Option<String>,
    pub old_content_b64: Option<String>,
    pub new_content_b64: Option<String>,
    pub diff_unified: Option<String>,
    pub diff_truncated: bool,
}

#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub snapshot_id: i64,
    pub result: PollResult,
    pub state: String,
    pub message: Option<String>,
    pub state_changed: bool,
    pub changes: Vec<FileChange>,
}

pub struct Reconciler {
    store: Store,
    http_client: reqwest::Client,
    webhook: WebhookNotifier,
    probe_timeout: Duration,
    fetch_timeout: Duration,
}

impl Reconciler {
    pub fn new(
        store: Store,
        http_client: reqwest::Client,
        webhook: WebhookNotifier,
        probe_timeout: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            store,
            http_client,
            webhook,
            probe_timeout,
            fetch_timeout,
        }
    }

    /// Runs the full §4.4 procedure for one device. The only errors this
    /// returns are genuine store failures; a failed probe is a normal,
    /// successfully-recorded outcome, not an `Err`.
    pub async fn reconcile(&self, device: &Device) -> Result<ReconcileOutcome, DbError> {
        self.reconcile_with_timeout(device, self.probe_timeout).await
    }

    /// Same as `reconcile`, with an explicit per-call probe timeout — used
    /// by the on-demand `/poll` endpoint's optional `timeout_s`.
    pub async fn reconcile_with_timeout(&self, device: &Device, probe_timeout: Duration) -> Result<ReconcileOutcome, DbError> {
        let snapshots = SnapshotRepository::new(self.store.clone());
        let catalog = CatalogRepository::new(self.store.clone());
        let baselines = BaselineRepository::new(self.store.clone());
        let rules = RuleRepository::new(self.store.clone());
        let events = EventRepository::new(self.store.clone());
        let devices = DeviceRepository::new(self.store.clone());
        let observations = ObservationRepository::new(self.store.clone());

        // Step 1: previous successful snapshot, used both as the version
        // baseline and as the differ's "previous payload".
        let prev_success = snapshots.get_latest_success(&device.id).await?;
        let prev_main = prev_success.as_ref().and_then(|s| s.main_version.clone());

        // Step 2: probe. Never errors.
        let target = ProbeTarget {
            protocol: &device.protocol,
            ip: &device.ip,
            port: device.port,
            path: &device.path,
            auth_type: device.auth_type.as_str(),
            auth_token: device.auth_token.as_deref(),
        };
        let result = poll_device(&self.http_client, target, probe_timeout).await;

        // Step 3: append the snapshot regardless of outcome.
        let snapshot_id = snapshots
            .record(NewSnapshot {
                device_id: &device.id,
                success: result.success,
                http_status: result.http_status,
                latency_ms: result.latency_ms,
                error: result.error.as_deref(),
                protocol_version: result.protocol_version,
                main_version: result.main_version.as_deref(),
                firmware_version: result.firmware_version.as_deref(),
                payload: result.payload.as_ref(),
            })
            .await?;

        // Step 4: register the observed version in the catalog.
        if result.success {
            if let Some(main_version) = &result.main_version {
                catalog.ensure_entry(&device.vendor, &device.model, main_version).await?;
            }
        }

        // Step 5: controlled-file drift, failures swallowed (the snapshot
        // already exists regardless of what the differ does).
        let rule = rules.get(&device.cluster_id, &device.vendor, &device.model).await?;
        let changes = if result.success {
            match self
                .run_differ(
                    &observations,
                    &device.id,
                    &target,
                    rule.as_ref(),
                    result.payload.as_ref(),
                    prev_success.as_ref().and_then(|s| s.payload.as_ref()),
                    snapshot_id,
                )
                .await
            {
                Ok(changes) => changes,
                Err(e) => {
                    warn!(device_id = %device.id, error = %e, "controlled-file differ failed, treating as zero changes");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        // Step 6: state function.
        let baseline = baselines.get(&device.cluster_id, &device.vendor, &device.model).await?;
        let (state, message) = compute_state(&result, baseline.as_ref(), !changes.is_empty());

        // Step 7: state transition, event, webhook.
        let state_changed = device.last_state.as_deref() != Some(state.as_str());
        if state_changed {
            devices.update_state(&device.id, &state).await?;
            let payload = serde_json::json!({
                "device_id": device.id,
                "device_key": device.device_key,
                "observed_main_version": result.main_version,
                "http_status": result.http_status,
                "error": result.error,
                "changes_count": changes.len(),
            });
            let event_id = events
                .create(NewEvent {
                    device_id: &device.id,
                    event_type: EVENT_STATE_CHANGE,
                    old_state: device.last_state.as_deref(),
                    new_state: Some(&state),
                    message: message.as_deref(),
                    payload: Some(&payload),
                })
                .await?;
            self.webhook.notify(&Event {
                id: event_id,
                device_id: device.id.clone(),
                created_at: Utc::now(),
                event_type: EVENT_STATE_CHANGE.to_string(),
                old_state: device.last_state.clone(),
                new_state: Some(state.clone()),
                message: message.clone(),
                payload: Some(payload),
            });
        }

        // Step 8: version events.
        if result.success {
            if let Some(main_version) = &result.main_version {
                if result.main_version != prev_main {
                    let event_type = if prev_main.is_none() {
                        EVENT_VERSION_OBSERVED
                    } else {
                        EVENT_VERSION_CHANGE
                    };
                    let catalog_entry = catalog.get(&device.vendor, &device.model, main_version).await?;
                    let payload = serde_json::json!({
                        "device_id": device.id,
                        "device_key": device.device_key,
                        "previous_main_version": prev_main,
                        "main_version": main_version,
                        "catalog_entry": catalog_entry,
                    });
                    let event_id = events
                        .create(NewEvent {
                            device_id: &device.id,
                            event_type,
                            old_state: prev_main.as_deref(),
                            new_state: Some(main_version),
                            message: None,
                            payload: Some(&payload),
                        })
                        .await?;
                    self.webhook.notify(&Event {
                        id: event_id,
                        device_id: device.id.clone(),
                        created_at: Utc::now(),
                        event_type: event_type.to_string(),
                        old_state: prev_main.clone(),
                        new_state: Some(main_version.clone()),
                        message: None,
                        payload: Some(payload),
                    });
                }
            }
        }

        // Step 9: controlled-file change event.
        if !changes.is_empty() {
            let payload = serde_json::to_value(&changes).unwrap_or(Value::Null);
            let event_id = events
                .create(NewEvent {
                    device_id: &device.id,
                    event_type: EVENT_CONTROLLED_FILES_CHANGE,
                    old_state: None,
                    new_state: None,
                    message: None,
                    payload: Some(&payload),
                })
                .await?;
            self.webhook.notify(&Event {
                id: event_id,
                device_id: device.id.clone(),
                created_at: Utc::now(),
                event_type: EVENT_CONTROLLED_FILES_CHANGE.to_string(),
                old_state: None,
                new_state: None,
                message: None,
                payload: Some(payload),
            });
        }

        Ok(ReconcileOutcome {
            snapshot_id,
            result,
            state,
            message,
            state_changed,
            changes,
        })
    }

    /// §4.3 steps 1-5 with I/O: decides the outcome, then resolves
    /// observation content for baseline captures and changed paths.
    #[allow(clippy::too_many_arguments)]
    async fn run_differ(
        &self,
        observations: &ObservationRepository,
        device_id: &str,
        target: &ProbeTarget<'_>,
        rule: Option<&ControlledFileRule>,
        curr_payload: Option<&Value>,
        prev_payload: Option<&Value>,
        snapshot_id: i64,
    ) -> Result<Vec<FileChange>, DbError> {
        let Some(rule) = rule else {
            return Ok(Vec::new());
        };
        if rule.paths.is_empty() {
            return Ok(Vec::new());
        }

        let curr_files = files_from_payload(curr_payload);
        let prev_files = files_from_payload(prev_payload);

        let outcome = diff_fingerprints(&rule.paths, curr_files.as_deref(), prev_files.as_deref());

        match outcome {
            DiffOutcome::BaselineCapture { to_capture } => {
                for entry in &to_capture {
                    self.ensure_observation(observations, device_id, target, rule, entry, snapshot_id).await;
                }
                Ok(Vec::new())
            }
            DiffOutcome::Changes(pending) => {
                if pending.is_empty() {
                    return Ok(Vec::new());
                }
                let curr_entries = curr_files.as_deref().map(normalize_entries).unwrap_or_default();
                let curr_sel = select_controlled(&curr_entries, &rule.paths);
                let prev_entries = prev_files.as_deref().map(normalize_entries).unwrap_or_default();
                let prev_sel = select_controlled(&prev_entries, &rule.paths);

                let mut out = Vec::with_capacity(pending.len());
                for change in pending {
                    let old_content_b64 = if let Some(inline) =
                        prev_sel.get(&change.path).and_then(|e| e.content_b64.clone())
                    {
                        Some(inline)
                    } else if let Some(fp) = &change.old_fingerprint {
                        observations.get(device_id, &change.path, fp).await?.and_then(|o| o.content_b64)
                    } else {
                        None
                    };

                    let new_content_b64 = match curr_sel.get(&change.path) {
                        Some(entry) => {
                            self.ensure_observation(observations, device_id, target, rule, entry, snapshot_id).await
                        }
                        None => None,
                    };

                    let (diff_unified, diff_truncated) = match (&old_content_b64, &new_content_b64) {
                        (Some(old_b64), Some(new_b64)) => {
                            match (decode_to_text(old_b64), decode_to_text(new_b64)) {
                                (Some(old_text), Some(new_text)) => {
                                    let label_old = format!("{}@{}", change.path, change.old_fingerprint.as_deref().unwrap_or("none"));
                                    let label_new = format!("{}@{}", change.path, change.new_fingerprint.as_deref().unwrap_or("none"));
                                    let diff = unified_diff(&label_old, &label_new, &old_text, &new_text);
                                    (Some(diff.text), diff.truncated)
                                }
                                _ => (None, false),
                            }
                        }
                        _ => (None, false),
                    };

                    out.push(FileChange {
                        path: change.path,
                        old_fingerprint: change.old_fingerprint,
                        new_fingerprint: change.new_fingerprint,
                        old_content_b64,
                        new_content_b64,
                        diff_unified,
                        diff_truncated,
                    });
                }
                Ok(out)
            }
        }
    }

    /// Resolves an observation for one normalized entry, fetching from the
    /// device when the plan requires it. Returns the content, if any
    /// ended up recorded.
    async fn ensure_observation(
        &self,
        observations: &ObservationRepository,
        device_id: &str,
        target: &ProbeTarget<'_>,
        rule: &ControlledFileRule,
        entry: &NormalizedEntry,
        snapshot_id: i64,
    ) -> Option<String> {
        let existing = observations.get(device_id, &entry.path, &entry.fingerprint).await.ok().flatten();
        let plan = plan_observation(existing.as_ref(), entry, rule.mode, rule.max_bytes);

        match plan {
            ObservationPlan::Cached => existing.and_then(|o| o.content_b64),
            ObservationPlan::CaptureInline {
                content_b64,
                encoding,
                content_type,
                truncated,
            } => {
                let _ = observations
                    .record(NewObservation {
                        device_id,
                        path: &entry.path,
                        fingerprint: &entry.fingerprint,
                        snapshot_id,
                        content_b64: Some(&content_b64),
                        encoding: encoding.as_deref(),
                        content_type: content_type.as_deref(),
                        truncated,
                        source: ObservationSource::Inline,
                    })
                    .await;
                Some(content_b64)
            }
            ObservationPlan::NeedsFetch => {
                match fetch_device_file(&self.http_client, target, &entry.path, self.fetch_timeout).await {
                    Ok(fetched) => {
                        let (content_b64, truncated) = vm_differ::truncate_base64(&fetched.content_b64, rule.max_bytes as usize);
                        let _ = observations
                            .record(NewObservation {
                                device_id,
                                path: &entry.path,
                                fingerprint: &entry.fingerprint,
                                snapshot_id,
                                content_b64: Some(&content_b64),
                                encoding: fetched.encoding.as_deref(),
                                content_type: fetched.content_type.as_deref(),
                                truncated,
                                source: ObservationSource::Fetch,
                            })
                            .await;
                        Some(content_b64)
                    }
                    Err(e) => {
                        warn!(path = %entry.path, error = %e, "controlled-file fetch failed");
                        None
                    }
                }
            }
            ObservationPlan::Unobtainable => None,
        }
    }
}

fn files_from_payload(payload: Option<&Value>) -> Option<Vec<DvpFileEntry>> {
    let files_value = payload?.get("files")?;
    if files_value.is_null() {
        return None;
    }
    serde_json::from_value(files_value.clone()).ok()
}

fn compute_state(result: &PollResult, baseline: Option<&Baseline>, changes_non_empty: bool) -> (String, Option<String>) {
    if !result.success {
        return (DeviceState::Offline.as_str().to_string(), result.error.clone());
    }
    let Some(baseline) = baseline else {
        return (DeviceState::NoBaseline.as_str().to_string(), None);
    };
    let observed = result.main_version.as_deref().unwrap_or("");
    if baseline_allows(baseline, observed) {
        let state = if changes_non_empty {
            DeviceState::FilesChanged
        } else {
            DeviceState::Ok
        };
        (state.as_str().to_string(), None)
    } else {
        (
            DeviceState::Mismatch.as_str().to_string(),
            Some(format!(
                "mismatch expected={} observed={}",
                baseline.expected_main_version, observed
            )),
        )
    }
}
