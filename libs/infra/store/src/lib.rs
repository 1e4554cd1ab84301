//! [libs/infra/store/src/lib.rs]
//!
//! C1 Store (§4.1): a single embedded relational database file per
//! process, fronted by one repository struct per entity family. Callers
//! get a `Store` handle and construct whichever repositories they need
//! from it; repositories are cheap (`Store` is an `Arc` clone).

pub mod client;
pub mod errors;
pub mod repositories;
pub mod schema;

pub use client::Store;
pub use errors::DbError;

pub mod prelude {
    pub use crate::client::Store;
    pub use crate::errors::DbError;
    pub use crate::repositories::auth::{SessionRepository, UserRepository};
    pub use crate::repositories::baseline::BaselineRepository;
    pub use crate::repositories::catalog::CatalogRepository;
    pub use crate::repositories::cluster::ClusterRepository;
    pub use crate::repositories::device::{DeviceRepository, DeviceUpdate, UpsertAction};
    pub use crate::repositories::event::{EventRepository, NewEvent};
    pub use crate::repositories::observation::{NewObservation, ObservationRepository};
    pub use crate::repositories::rule::RuleRepository;
    pub use crate::repositories::snapshot::{NewSnapshot, SnapshotRepository};
    pub use crate::repositories::status::{DeviceStatusView, StatusRepository};
}

#[cfg(test)]
mod tests {
    use super::*;
    use vm_domain::entities::AuthType;

    async fn memory_store() -> Store {
        Store::connect(":memory:").await.expect("connect memory store")
    }

    #[tokio::test]
    async fn schema_applies_and_round_trips_a_device() {
        let store = memory_store().await;
        let clusters = repositories::cluster::ClusterRepository::new(store.clone());
        let devices = repositories::device::DeviceRepository::new(store.clone());

        let cluster = clusters.create("c1", "line-a", None).await.expect("create cluster");
        let device = devices
            .create(
                "d1",
                &cluster.id,
                "dk-1",
                "acme",
                "widget-3000",
                "10.0.0.5",
                8080,
                "dvp1",
                "/status",
                AuthType::None,
                None,
            )
            .await
            .expect("create device");

        let fetched = devices.get(&device.id).await.expect("get device").expect("device exists");
        assert_eq!(fetched.device_key, "dk-1");
        assert_eq!(fetched.cluster_id, cluster.id);
        assert!(fetched.enabled);
    }

    #[tokio::test]
    async fn second_connect_on_same_file_survives_restart() {
        let file = tempfile::NamedTempFile::new().expect("tempfile");
        let path = file.path().to_str().unwrap().to_string();

        let store = Store::connect(&path).await.expect("connect");
        let clusters = repositories::cluster::ClusterRepository::new(store.clone());
        clusters.create("c1", "line-a", None).await.expect("create cluster");
        drop(store);

        let store2 = Store::connect(&path).await.expect("reconnect");
        let clusters2 = repositories::cluster::ClusterRepository::new(store2);
        let found = clusters2.get_by_name("line-a").await.expect("get by name");
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn status_view_reports_never_polled_for_a_fresh_device() {
        let store = memory_store().await;
        let clusters = repositories::cluster::ClusterRepository::new(store.clone());
        let devices = repositories::device::DeviceRepository::new(store.clone());
        let status = repositories::status::StatusRepository::new(store.clone());

        let cluster = clusters.create("c1", "line-a", None).await.expect("create cluster");
        devices
            .create(
                "d1", &cluster.id, "dk-1", "acme", "widget-3000", "10.0.0.5", 8080, "dvp1", "/status",
                AuthType::None, None,
            )
            .await
            .expect("create device");

        let views = status.list_status(None).await.expect("list status");
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].state, "never_polled");
        assert!(views[0].latest_snapshot.is_none());
    }
}
