//! Axum router construction for the Observer API.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the complete Axum router for the Observer server.
///
/// The router includes:
/// - `GET /api/v1/health` -- liveness probe
/// - `GET /api/v1/vehicles` -- list vehicles (`?region=`, `?inside=`)
/// - `GET /api/v1/vehicles/{id}` -- single vehicle
/// - `GET /api/v1/stats` -- processing counters
///
/// CORS allows any origin; every route is read-only.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(handlers::health))
        .route("/api/v1/vehicles", get(handlers::list_vehicles))
        .route("/api/v1/vehicles/{id}", get(handlers::get_vehicle))
        .route("/api/v1/stats", get(handlers::get_stats))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
