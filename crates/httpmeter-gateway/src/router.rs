//! Axum router wiring.
//!
//! Ops routes are merged into the caller's routes and the whole router is
//! wrapped in the metrics layer, so the scrape endpoint counts itself too.

use axum::{routing::get, Router};

use crate::{app_state::AppState, obs::HttpMetricsLayer, ops};

/// Ops routes only: `/healthz`, `/readyz` and the scrape endpoint.
pub fn build_router(state: AppState) -> Router {
    with_telemetry(Router::new(), state)
}

/// Add the ops routes to `routes` and instrument every request.
pub fn with_telemetry(routes: Router<AppState>, state: AppState) -> Router {
    let layer = HttpMetricsLayer::new(state.metrics()).path_label(state.cfg().metrics.path_label);
    let endpoint = state.cfg().metrics.endpoint.clone();

    routes
        .route("/healthz", get(ops::healthz))
        .route("/readyz", get(ops::readyz))
        .route(&endpoint, get(ops::metrics))
        .layer(layer)
        .with_state(state)
}
