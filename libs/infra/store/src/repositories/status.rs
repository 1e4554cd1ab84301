//! [libs/infra/store/src/repositories/status.rs]
//!
//! `list_status` (§4.1): `{device, baseline, latest_snapshot, state,
//! controlled_files_change?}` per device. Implemented as a join against
//! the other repositories rather than new raw SQL, and the sticky
//! `files_changed` label is computed here rather than by mutating
//! `devices.last_state` — per the Open Question decision in §9 to
//! implement stickiness as a read-time join.

use tracing::instrument;
use vm_domain::entities::{Baseline, Device, Event, Snapshot};
use vm_domain::state::{DeviceState, NEVER_POLLED};

use crate::client::Store;
use crate::errors::DbError;
use crate::repositories::baseline::BaselineRepository;
use crate::repositories::device::DeviceRepository;
use crate::repositories::event::EventRepository;
use crate::repositories::snapshot::SnapshotRepository;

#[derive(Debug, Clone, serde::Serialize)]
pub struct DeviceStatusView {
    pub device: Device,
    pub baseline: Option<Baseline>,
    pub latest_snapshot: Option<Snapshot>,
    pub state: String,
    pub controlled_files_change: Option<Event>,
}

pub struct StatusRepository {
    devices: DeviceRepository,
    baselines: BaselineRepository,
    snapshots: SnapshotRepository,
    events: EventRepository,
}

impl StatusRepository {
    pub fn new(store: Store) -> Self {
        Self {
            devices: DeviceRepository::new(store.clone()),
            baselines: BaselineRepository::new(store.clone()),
            snapshots: SnapshotRepository::new(store.clone()),
            events: EventRepository::new(store),
        }
    }

    #[instrument(skip(self))]
    pub async fn list_status(&self, cluster_id: Option<&str>) -> Result<Vec<DeviceStatusView>, DbError> {
        let devices = self.devices.list(cluster_id, false).await?;
        let mut out = Vec::with_capacity(devices.len());
        for device in devices {
            out.push(self.status_for(device).await?);
        }
        Ok(out)
    }

    #[instrument(skip(self, device))]
    async fn status_for(&self, device: Device) -> Result<DeviceStatusView, DbError> {
        let baseline = self.baselines.get(&device.cluster_id, &device.vendor, &device.model).await?;
        let latest_snapshot = self.snapshots.get_latest(&device.id).await?;
        let pending_change = self
            .events
            .latest_unacknowledged_controlled_files_change(&device.id)
            .await?;

        let state = if latest_snapshot.is_none() {
            NEVER_POLLED.to_string()
        } else if pending_change.is_some() {
            DeviceState::FilesChanged.as_str().to_string()
        } else {
            device
                .last_state
                .clone()
                .unwrap_or_else(|| DeviceState::Ok.as_str().to_string())
        };

        Ok(DeviceStatusView {
            device,
            baseline,
            latest_snapshot,
            state,
            controlled_files_change: pending_change,
        })
    }
}
