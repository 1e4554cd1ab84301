//! [apps/manager/src/kernel.rs]
//!
//! Composition root. `ignite` wires the Store and `AppState`; `launch`
//! spawns the periodic scheduler daemon (if enabled) and then serves the
//! HTTP API until the listener is closed.

use tracing::{error, info};

use crate::config::Config;
use crate::routes::build_router;
use crate::state::AppState;

pub struct ManagerKernel {
    config: Config,
    state: AppState,
}

impl ManagerKernel {
    pub async fn ignite(config: Config) -> Self {
        let store = vm_store::Store::connect(&config.database_path)
            .await
            .expect("failed to open store");
        let state = AppState::new(store, config.clone());
        Self { config, state }
    }

    pub async fn launch(self) {
        let scheduler = self.state.scheduler.clone();
        tokio::spawn(async move {
            scheduler.run_periodic().await;
        });

        let router = build_router(self.state);
        let bind_address = self.config.bind_address();

        let listener = tokio::net::TcpListener::bind(&bind_address)
            .await
            .unwrap_or_else(|e| panic!("failed to bind {bind_address}: {e}"));

        info!(bind_address, "vm-manager listening");
        let app = router.into_make_service_with_connect_info::<std::net::SocketAddr>();
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "server loop exited");
            std::process::exit(1);
        }
    }
}
