//! Observer API server for the Locus geofence engine.
//!
//! A small read-only Axum HTTP server running alongside the detection
//! workers. It exposes:
//!
//! - **Health** (`/api/v1/health`) for liveness probes
//! - **Vehicle state** (`/api/v1/vehicles`, `/api/v1/vehicles/{id}`):
//!   each tracked vehicle's current region and last applied timestamp
//! - **Counters** (`/api/v1/stats`) from [`EngineStats`]
//!
//! Handlers read the shared [`VehicleStateStore`] directly; nothing here
//! can mutate detection state.
//!
//! [`EngineStats`]: locus_core::stats::EngineStats
//! [`VehicleStateStore`]: locus_core::store::VehicleStateStore

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;

// Re-export primary types for convenience.
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use startup::spawn_observer;
pub use state::AppState;
