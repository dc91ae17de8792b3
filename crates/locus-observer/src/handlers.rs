//! REST API endpoint handlers for the Observer server.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/v1/health` | Liveness probe, plain `OK` |
//! | `GET` | `/api/v1/vehicles` | All tracked vehicles, sorted by id |
//! | `GET` | `/api/v1/vehicles/{id}` | One vehicle's state |
//! | `GET` | `/api/v1/stats` | Processing counters |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use locus_core::stats::StatsSnapshot;
use locus_types::EntityId;

use crate::error::ObserverError;
use crate::state::AppState;

/// Query parameters for the `GET /api/v1/vehicles` endpoint.
#[derive(Debug, serde::Deserialize)]
pub struct VehiclesQuery {
    /// Only vehicles currently inside the region with this name.
    pub region: Option<String>,
    /// `true` for vehicles inside any region, `false` for those outside all.
    pub inside: Option<bool>,
}

/// Body of `GET /api/v1/stats`.
#[derive(Debug, serde::Serialize)]
pub struct StatsResponse {
    /// Counters since startup.
    #[serde(flatten)]
    pub counters: StatsSnapshot,
    /// Vehicles with known state.
    pub tracked_vehicles: usize,
}

/// Liveness probe.
pub async fn health() -> &'static str {
    "OK"
}

/// List tracked vehicles, optionally filtered by containment.
pub async fn list_vehicles(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VehiclesQuery>,
) -> impl IntoResponse {
    let vehicles: Vec<_> = state
        .store
        .snapshot()
        .into_iter()
        .filter(|vehicle| {
            query.region.as_deref().is_none_or(|name| {
                vehicle
                    .current_region
                    .as_ref()
                    .is_some_and(|region| region.name == name)
            })
        })
        .filter(|vehicle| {
            query
                .inside
                .is_none_or(|inside| vehicle.current_region.is_some() == inside)
        })
        .collect();

    Json(vehicles)
}

/// One vehicle's current region and last applied timestamp.
///
/// # Errors
///
/// Returns [`ObserverError::InvalidQuery`] for a blank id and
/// [`ObserverError::NotFound`] for a vehicle never seen.
pub async fn get_vehicle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ObserverError> {
    let entity_id = EntityId::new(id);
    if entity_id.is_blank() {
        return Err(ObserverError::InvalidQuery(String::from(
            "vehicle id must not be blank",
        )));
    }
    let vehicle = state
        .store
        .get(&entity_id)
        .ok_or_else(|| ObserverError::NotFound(format!("vehicle {entity_id}")))?;
    Ok(Json(vehicle))
}

/// Processing counters and the number of tracked vehicles.
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        counters: state.stats.snapshot(),
        tracked_vehicles: state.store.len(),
    })
}
