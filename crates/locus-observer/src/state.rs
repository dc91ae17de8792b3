//! Shared application state for the Observer API server.

use std::sync::Arc;

use locus_core::stats::EngineStats;
use locus_core::store::VehicleStateStore;

/// Handles the observer reads from. Both are shared with the engine.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Per-vehicle detection state.
    pub store: Arc<VehicleStateStore>,
    /// Processing counters.
    pub stats: Arc<EngineStats>,
}

impl AppState {
    /// Wrap the engine's store and counters.
    pub const fn new(store: Arc<VehicleStateStore>, stats: Arc<EngineStats>) -> Self {
        Self { store, stats }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(
            Arc::new(VehicleStateStore::new()),
            Arc::new(EngineStats::new()),
        )
    }
}
