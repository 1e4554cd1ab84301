//! [apps/manager/src/routes.rs]
//!
//! Router composition. Three endpoint classes per spec.md §4.9: public
//! (no auth), login (any authenticated session or the admin token), and
//! admin (mutating endpoints, poll, discover). `identify` runs globally so
//! every request carries an `Identity` extension when one resolves;
//! `require_login`/`require_admin` gate the routes that need more.

use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{auth, baselines, catalog, clusters, devices, discover, events, health, poll, rules, status};
use crate::middleware::{identify, require_admin, require_login};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/healthz", get(health::healthz))
        .route("/api/v1/info", get(health::info))
        .nest("/api/v1/auth", auth::router())
        .nest("/api/v1/register", devices::register_router());

    let login_gated = Router::new()
        .nest("/api/v1/status", status::router())
        .nest("/api/v1/events", events::router())
        .nest("/api/v1/clusters", clusters::read_router())
        .nest("/api/v1/baselines", baselines::read_router())
        .nest("/api/v1/rules", rules::read_router())
        .nest("/api/v1/catalog", catalog::read_router())
        .nest("/api/v1/devices", devices::read_router())
        .route_layer(middleware::from_fn(require_login));

    let admin_gated = Router::new()
        .nest("/api/v1/poll", poll::router())
        .nest("/api/v1/discover", discover::router())
        .nest("/api/v1/clusters", clusters::write_router())
        .nest("/api/v1/baselines", baselines::write_router())
        .nest("/api/v1/rules", rules::write_router())
        .nest("/api/v1/catalog", catalog::write_router())
        .nest("/api/v1/devices", devices::write_router())
        .route_layer(middleware::from_fn(require_admin));

    public
        .merge(login_gated)
        .merge(admin_gated)
        .layer(middleware::from_fn_with_state(state.clone(), identify))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
