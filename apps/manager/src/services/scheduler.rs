//! [apps/manager/src/services/scheduler.rs]
//!
//! Scheduler (C5, spec.md §4.5): periodic fan-out over enabled devices
//! with bounded concurrency `N`, plus the on-demand `/poll` pass used
//! directly by the API handler. Each worker owns nothing but a semaphore
//! permit; the Reconciler itself is stateless and shared.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use vm_store::repositories::device::DeviceRepository;
use vm_store::Store;

use crate::services::reconciler::Reconciler;

#[derive(Debug, Clone, Serialize)]
pub struct DeviceOutcome {
    pub device_id: String,
    pub device_key: String,
    pub success: bool,
    pub state: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PollSummary {
    pub ok: usize,
    pub fail: usize,
    pub results: Vec<DeviceOutcome>,
}

pub struct Scheduler {
    store: Store,
    reconciler: Arc<Reconciler>,
    concurrency: usize,
    poll_interval_s: u64,
    shutdown: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Scheduler {
    pub fn new(store: Store, reconciler: Arc<Reconciler>, concurrency: usize, poll_interval_s: u64) -> Self {
        Self {
            store,
            reconciler,
            concurrency: concurrency.max(1),
            poll_interval_s,
            shutdown: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Signals the background loop to stop after its current pass.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Runs the periodic loop forever (until shutdown). A no-op when
    /// `poll_interval_s == 0` — periodic polling is disabled.
    pub async fn run_periodic(&self) {
        if self.poll_interval_s == 0 {
            info!("periodic polling disabled (VM_POLL_INTERVAL_S=0)");
            return;
        }
        let period = Duration::from_secs(self.poll_interval_s);
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            let started = Instant::now();
            match self.run_pass(None, None).await {
                Ok(summary) => info!(ok = summary.ok, fail = summary.fail, "periodic poll pass complete"),
                Err(e) => error!(error = %e, "periodic poll pass failed to enumerate devices"),
            }
            let elapsed = started.elapsed();
            let remaining = period.saturating_sub(elapsed);
            tokio::select! {
                _ = tokio::time::sleep(remaining) => {}
                _ = self.notify.notified() => {}
            }
        }
    }

    /// One fan-out pass: all enabled devices, or a single device when
    /// `device_id_filter` is set. Used by both the periodic loop and the
    /// on-demand `/poll` endpoint.
    pub async fn run_pass(
        &self,
        device_id_filter: Option<&str>,
        probe_timeout: Option<Duration>,
    ) -> Result<PollSummary, vm_store::DbError> {
        let devices_repo = DeviceRepository::new(self.store.clone());
        let candidates = match device_id_filter {
            Some(id) => devices_repo.get(id).await?.into_iter().collect::<Vec<_>>(),
            None => devices_repo.list(None, true).await?,
        };

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut set = JoinSet::new();
        for device in candidates {
            let permit = semaphore.clone();
            let reconciler = self.reconciler.clone();
            set.spawn(async move {
                let _permit = permit.acquire_owned().await;
                let outcome = match probe_timeout {
                    Some(timeout) => reconciler.reconcile_with_timeout(&device, timeout).await,
                    None => reconciler.reconcile(&device).await,
                };
                (device.id, device.device_key, outcome)
            });
        }

        let mut ok = 0usize;
        let mut fail = 0usize;
        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            let (device_id, device_key, outcome) = match joined {
                Ok(triple) => triple,
                Err(e) => {
                    warn!(error = %e, "reconcile task panicked");
                    fail += 1;
                    continue;
                }
            };
            match outcome {
                Ok(outcome) => {
                    ok += 1;
                    results.push(DeviceOutcome {
                        device_id,
                        device_key,
                        success: outcome.result.success,
                        state: outcome.state,
                        error: outcome.result.error,
                    });
                }
                Err(e) => {
                    fail += 1;
                    warn!(device_id, error = %e, "reconcile store error");
                    results.push(DeviceOutcome {
                        device_id,
                        device_key,
                        success: false,
                        state: "unknown".to_string(),
                        error: Some(format!("store_failed:{e}")),
                    });
                }
            }
        }

        Ok(PollSummary { ok, fail, results })
    }
}
