//! [apps/manager/src/main.rs]

use vm_manager::prelude::*;

fn main() {
    dotenvy::dotenv().ok();
    vm_telemetry::init_tracing("vm_manager");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime");

    runtime.block_on(async {
        let config = Config::from_env();
        let kernel = ManagerKernel::ignite(config).await;
        kernel.launch().await;
    });
}
