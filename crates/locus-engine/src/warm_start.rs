//! Rebuild detection state from last-known positions before intake starts.
//!
//! Each vehicle's most recent recorded position is resolved through the
//! oracle and written with [`VehicleStateStore::seed`]. No events are
//! emitted: the vehicle was already inside that region before the restart.
//! Vehicles whose position is invalid or whose query fails stay Unknown,
//! so their first live update may emit an `Enter` (cold-start window).
//! Every query is bounded by the engine's oracle timeout, so a hung
//! database cannot hold up startup.

use std::time::Duration;

use locus_core::oracle::{Containment, ContainmentOracle};
use locus_core::store::{SeedOutcome, VehicleState, VehicleStateStore};
use locus_types::PositionUpdate;
use tracing::{debug, info, warn};

/// What warm start did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmStartReport {
    /// Vehicles written into the store.
    pub seeded: usize,
    /// Positions that failed validation.
    pub invalid: usize,
    /// Positions whose containment query failed.
    pub oracle_failures: usize,
    /// Seeds skipped because the store already held newer state.
    pub superseded: usize,
}

/// Seed `store` from `positions`, one containment query per vehicle.
pub async fn seed_from_positions(
    positions: impl IntoIterator<Item = PositionUpdate>,
    oracle: &dyn ContainmentOracle,
    oracle_timeout: Duration,
    store: &VehicleStateStore,
) -> WarmStartReport {
    let mut report = WarmStartReport::default();
    for position in positions {
        if let Err(e) = position.validate() {
            warn!(entity_id = %position.entity_id, error = %e, "skipping invalid stored position");
            report.invalid = report.invalid.saturating_add(1);
            continue;
        }
        let containment = tokio::time::timeout(oracle_timeout, oracle.query(position.point))
            .await
            .unwrap_or_else(|_| {
                Containment::failed(format!(
                    "query timed out after {}ms",
                    oracle_timeout.as_millis()
                ))
            });
        let current_region = match containment {
            Containment::Found(region) => Some(region),
            Containment::NotFound => None,
            Containment::QueryFailed { reason } => {
                warn!(entity_id = %position.entity_id, reason = %reason, "warm start query failed");
                report.oracle_failures = report.oracle_failures.saturating_add(1);
                continue;
            }
        };
        let state = VehicleState {
            entity_id: position.entity_id,
            current_region,
            last_applied_at: position.observed_at,
        };
        match store.seed(state) {
            SeedOutcome::Inserted | SeedOutcome::Replaced => {
                report.seeded = report.seeded.saturating_add(1);
            }
            SeedOutcome::Kept => report.superseded = report.superseded.saturating_add(1),
        }
    }
    info!(
        seeded = report.seeded,
        invalid = report.invalid,
        oracle_failures = report.oracle_failures,
        superseded = report.superseded,
        "warm start complete"
    );
    debug!(tracked = store.len(), "state store size after warm start");
    report
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use locus_core::oracle::{Polygon, PolygonOracle};
    use locus_types::{EntityId, GeoPoint, Region};

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn oracle() -> PolygonOracle {
        PolygonOracle::new([(
            Region::new(1, "Zone1"),
            Polygon::rectangle(GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 1.0)).unwrap(),
        )])
    }

    const TIMEOUT: Duration = Duration::from_millis(500);

    struct DownOracle;

    struct HungOracle;

    #[async_trait]
    impl ContainmentOracle for HungOracle {
        async fn query(&self, _point: GeoPoint) -> Containment {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Containment::NotFound
        }
    }

    #[async_trait]
    impl ContainmentOracle for DownOracle {
        async fn query(&self, _point: GeoPoint) -> Containment {
            Containment::failed("connection refused")
        }
    }

    #[tokio::test]
    async fn seeds_inside_and_outside_vehicles() {
        let store = VehicleStateStore::new();
        let report = seed_from_positions(
            [
                PositionUpdate::new("truck-01", 0.5, 0.5, at(10)),
                PositionUpdate::new("truck-02", 5.0, 5.0, at(10)),
                PositionUpdate::new("truck-03", 95.0, 0.0, at(10)),
            ],
            &oracle(),
            TIMEOUT,
            &store,
        )
        .await;

        assert_eq!(report.seeded, 2);
        assert_eq!(report.invalid, 1);
        let inside = store.get(&EntityId::from("truck-01")).unwrap();
        assert_eq!(inside.current_region, Some(Region::new(1, "Zone1")));
        assert_eq!(inside.last_applied_at, at(10));
        assert_eq!(store.get(&EntityId::from("truck-02")).unwrap().current_region, None);
        assert!(store.get(&EntityId::from("truck-03")).is_none());
    }

    #[tokio::test]
    async fn failed_queries_leave_vehicles_unknown() {
        let store = VehicleStateStore::new();
        let report = seed_from_positions(
            [PositionUpdate::new("truck-01", 0.5, 0.5, at(10))],
            &DownOracle,
            TIMEOUT,
            &store,
        )
        .await;
        assert_eq!(report.oracle_failures, 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn never_overwrites_newer_live_state() {
        let store = VehicleStateStore::new();
        store.compare_and_apply(&EntityId::from("truck-01"), None, at(20));

        let report = seed_from_positions(
            [PositionUpdate::new("truck-01", 0.5, 0.5, at(10))],
            &oracle(),
            TIMEOUT,
            &store,
        )
        .await;
        assert_eq!(report.superseded, 1);
        let state = store.get(&EntityId::from("truck-01")).unwrap();
        assert_eq!(state.current_region, None);
        assert_eq!(state.last_applied_at, at(20));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_oracle_times_out_per_vehicle() {
        let store = VehicleStateStore::new();
        let started = tokio::time::Instant::now();
        let report = seed_from_positions(
            [
                PositionUpdate::new("truck-01", 0.5, 0.5, at(10)),
                PositionUpdate::new("truck-02", 0.5, 0.5, at(10)),
            ],
            &HungOracle,
            TIMEOUT,
            &store,
        )
        .await;
        assert_eq!(report.oracle_failures, 2);
        assert!(store.is_empty());
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
