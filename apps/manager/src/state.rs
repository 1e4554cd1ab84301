//! [apps/manager/src/state.rs]
//!
//! Shared application state handed to every handler via axum's `State`
//! extractor. Repository structs are cheap to construct from a `Store`
//! clone, so `AppState` holds the `Store` itself rather than one
//! repository instance per entity — callers build the repository they
//! need at the call site, matching the teacher's `database_client.clone()`
//! pattern in `state/mod.rs`.

use std::sync::Arc;
use std::time::Duration;

use vm_store::Store;

use crate::config::Config;
use crate::services::discovery::Discovery;
use crate::services::reconciler::Reconciler;
use crate::services::scheduler::Scheduler;
use crate::services::webhook::WebhookNotifier;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub http_client: reqwest::Client,
    pub config: Arc<Config>,
    pub scheduler: Arc<Scheduler>,
    pub discovery: Arc<Discovery>,
}

impl AppState {
    pub fn new(store: Store, config: Config) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("build shared reqwest client");
        let config = Arc::new(config);

        let webhook = WebhookNotifier::new(config.webhook_url.clone());
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            http_client.clone(),
            webhook,
            config.probe_timeout,
            config.fetch_timeout,
        ));
        let scheduler = Arc::new(Scheduler::new(
            store.clone(),
            reconciler,
            config.poll_workers,
            config.poll_interval_s,
        ));
        let discovery = Arc::new(Discovery::new(store.clone(), http_client.clone(), config.discovery_timeout));

        Self {
            store,
            http_client,
            config,
            scheduler,
            discovery,
        }
    }
}
