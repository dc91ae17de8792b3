//! Geofence transition detection.
//!
//! For each [`PositionUpdate`] the detector:
//! 1. validates it,
//! 2. asks the [`ContainmentOracle`] for the containing region (outside any
//!    entity lock, bounded by the oracle timeout),
//! 3. compare-and-applies the answer in the [`VehicleStateStore`], which
//!    re-checks staleness atomically,
//! 4. derives the implied transitions (exit before enter) and
//! 5. hands them to the [`EventPublisher`] in order.
//!
//! Per entity the state machine is `Unknown -> Outside | Inside(R)`,
//! `Outside <-> Inside(R)`, `Inside(R) -> Inside(S)`. An event is produced
//! if and only if an applied update changes the containing region.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use locus_types::{EntityId, PositionUpdate, Region, TransitionEvent, TransitionKind};
use tracing::{debug, info, warn};

use crate::error::DetectError;
use crate::oracle::ContainmentOracle;
use crate::publisher::EventPublisher;
use crate::stats::EngineStats;
use crate::store::VehicleStateStore;

/// How an update was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Applied and the containing region changed; these events were published.
    Transitioned(Vec<TransitionEvent>),
    /// Applied but the containing region is the same as before.
    Unchanged,
    /// Older than the entity's last applied update; discarded.
    Stale,
}

/// The transitions implied by moving from `previous` to `current`.
///
/// Exit of the old region always precedes enter of the new one. Equal
/// regions (by id) yield nothing.
pub fn derive_transitions(
    entity_id: &EntityId,
    previous: Option<&Region>,
    current: Option<&Region>,
    at: DateTime<Utc>,
) -> Vec<TransitionEvent> {
    if previous == current {
        return Vec::new();
    }
    previous
        .map(|region| (region, TransitionKind::Exit))
        .into_iter()
        .chain(current.map(|region| (region, TransitionKind::Enter)))
        .map(|(region, kind)| TransitionEvent::new(entity_id.clone(), region.clone(), kind, at))
        .collect()
}

/// Stateless front of the engine; all state lives in the store.
pub struct TransitionDetector {
    store: Arc<VehicleStateStore>,
    oracle: Arc<dyn ContainmentOracle>,
    publisher: Arc<dyn EventPublisher>,
    stats: Arc<EngineStats>,
    oracle_timeout: Duration,
}

impl TransitionDetector {
    /// Wire a detector to its collaborators.
    pub fn new(
        store: Arc<VehicleStateStore>,
        oracle: Arc<dyn ContainmentOracle>,
        publisher: Arc<dyn EventPublisher>,
        oracle_timeout: Duration,
    ) -> Self {
        Self {
            store,
            oracle,
            publisher,
            stats: Arc::new(EngineStats::new()),
            oracle_timeout,
        }
    }

    /// Share an existing stats handle instead of a private one.
    #[must_use]
    pub fn with_stats(mut self, stats: Arc<EngineStats>) -> Self {
        self.stats = stats;
        self
    }

    /// The state store this detector applies to.
    pub const fn store(&self) -> &Arc<VehicleStateStore> {
        &self.store
    }

    /// Counters updated by this detector.
    pub const fn stats(&self) -> &Arc<EngineStats> {
        &self.stats
    }

    /// Run one update through validation, containment, apply and publish.
    ///
    /// Callers must serialize calls per entity; [`WorkerPool`] does. State
    /// is applied atomically, but events are published after the apply
    /// step, so two concurrent calls for one entity may publish out of order.
    ///
    /// [`WorkerPool`]: crate::pool::WorkerPool
    ///
    /// # Errors
    ///
    /// - [`DetectError::Validation`]: nothing was read or written.
    /// - [`DetectError::OracleUnavailable`]: state unchanged; safe to retry
    ///   the same update.
    /// - [`DetectError::Publish`]: state was applied; `pending` holds the
    ///   events still to deliver, see [`TransitionDetector::redeliver`].
    pub async fn process(&self, update: &PositionUpdate) -> Result<Outcome, DetectError> {
        if let Err(e) = update.validate() {
            self.stats.record_invalid();
            return Err(e.into());
        }

        let region_now = self.locate(update).await?;

        let applied = self.store.compare_and_apply(
            &update.entity_id,
            region_now.clone(),
            update.observed_at,
        );
        if !applied.applied {
            self.stats.record_stale();
            debug!(
                entity_id = %update.entity_id,
                observed_at = %update.observed_at,
                "stale update discarded"
            );
            return Ok(Outcome::Stale);
        }

        let events = derive_transitions(
            &update.entity_id,
            applied.previous_region.as_ref(),
            region_now.as_ref(),
            update.observed_at,
        );
        if events.is_empty() {
            self.stats.record_unchanged();
            debug!(entity_id = %update.entity_id, "containment unchanged");
            return Ok(Outcome::Unchanged);
        }

        self.stats.record_transition();
        self.redeliver(events.clone()).await?;
        Ok(Outcome::Transitioned(events))
    }

    /// Publish `events` in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::Publish`] with the failed event and every
    /// event after it.
    pub async fn redeliver(&self, events: Vec<TransitionEvent>) -> Result<(), DetectError> {
        let mut remaining = events.into_iter();
        while let Some(event) = remaining.next() {
            if let Err(e) = self.publisher.publish(&event).await {
                self.stats.record_publish_failure();
                let pending = std::iter::once(event).chain(remaining).collect();
                return Err(DetectError::Publish {
                    pending,
                    reason: e.to_string(),
                });
            }
            self.stats.record_published();
            info!(
                entity_id = %event.entity_id,
                region = %event.region.name,
                region_id = %event.region.id,
                kind = %event.kind,
                at = %event.at,
                "geofence transition"
            );
        }
        Ok(())
    }

    async fn locate(&self, update: &PositionUpdate) -> Result<Option<Region>, DetectError> {
        let reason = match tokio::time::timeout(self.oracle_timeout, self.oracle.query(update.point)).await {
            Ok(containment) => match containment.into_result() {
                Ok(region) => return Ok(region),
                Err(reason) => reason,
            },
            Err(_) => format!(
                "query timed out after {}ms",
                self.oracle_timeout.as_millis()
            ),
        };
        self.stats.record_oracle_failure();
        warn!(
            entity_id = %update.entity_id,
            point = %update.point,
            reason = %reason,
            "containment query failed, state left unchanged"
        );
        Err(DetectError::OracleUnavailable {
            entity_id: update.entity_id.clone(),
            reason,
        })
    }
}

impl std::fmt::Debug for TransitionDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionDetector")
            .field("tracked_entities", &self.store.len())
            .field("oracle_timeout_ms", &self.oracle_timeout.as_millis())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use async_trait::async_trait;
    use chrono::TimeZone;
    use locus_types::{GeoPoint, ValidationError};

    use super::*;
    use crate::oracle::{Containment, Polygon, PolygonOracle};
    use crate::publisher::MemoryPublisher;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn zone1() -> Region {
        Region::new(1, "Zone1")
    }

    fn zone2() -> Region {
        Region::new(2, "Zone2")
    }

    /// Zone1 spans lat/lon 0..1, Zone2 spans lat/lon 2..3.
    fn oracle() -> PolygonOracle {
        PolygonOracle::new([
            (
                zone1(),
                Polygon::rectangle(GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 1.0)).unwrap(),
            ),
            (
                zone2(),
                Polygon::rectangle(GeoPoint::new(2.0, 2.0), GeoPoint::new(3.0, 3.0)).unwrap(),
            ),
        ])
    }

    fn detector_with(
        oracle: Arc<dyn ContainmentOracle>,
    ) -> (TransitionDetector, Arc<MemoryPublisher>) {
        let publisher = Arc::new(MemoryPublisher::new());
        let detector = TransitionDetector::new(
            Arc::new(VehicleStateStore::new()),
            oracle,
            Arc::clone(&publisher) as Arc<dyn EventPublisher>,
            Duration::from_millis(200),
        );
        (detector, publisher)
    }

    fn update(secs: i64, lat: f64, lon: f64) -> PositionUpdate {
        PositionUpdate::new("truck-01", lat, lon, at(secs))
    }

    fn kinds(events: &[TransitionEvent]) -> Vec<(TransitionKind, String)> {
        events
            .iter()
            .map(|e| (e.kind, e.region.name.clone()))
            .collect()
    }

    struct FailingOracle;

    #[async_trait]
    impl ContainmentOracle for FailingOracle {
        async fn query(&self, _point: GeoPoint) -> Containment {
            Containment::failed("connection refused")
        }
    }

    /// Answers the first query from [`oracle`], fails every later one.
    struct DownAfterFirst {
        answered: std::sync::atomic::AtomicBool,
        inner: PolygonOracle,
    }

    #[async_trait]
    impl ContainmentOracle for DownAfterFirst {
        async fn query(&self, point: GeoPoint) -> Containment {
            if self.answered.swap(true, std::sync::atomic::Ordering::SeqCst) {
                return Containment::failed("connection reset");
            }
            self.inner.query(point).await
        }
    }

    struct SlowOracle;

    #[async_trait]
    impl ContainmentOracle for SlowOracle {
        async fn query(&self, _point: GeoPoint) -> Containment {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Containment::NotFound
        }
    }

    #[test]
    fn derive_covers_every_state_change() {
        let id = EntityId::from("t");
        let (z1, z2) = (zone1(), zone2());
        assert!(derive_transitions(&id, None, None, at(0)).is_empty());
        assert!(derive_transitions(&id, Some(&z1), Some(&z1), at(0)).is_empty());
        assert_eq!(
            kinds(&derive_transitions(&id, None, Some(&z1), at(0))),
            vec![(TransitionKind::Enter, "Zone1".to_owned())]
        );
        assert_eq!(
            kinds(&derive_transitions(&id, Some(&z1), None, at(0))),
            vec![(TransitionKind::Exit, "Zone1".to_owned())]
        );
        assert_eq!(
            kinds(&derive_transitions(&id, Some(&z1), Some(&z2), at(0))),
            vec![
                (TransitionKind::Exit, "Zone1".to_owned()),
                (TransitionKind::Enter, "Zone2".to_owned()),
            ]
        );
    }

    #[tokio::test]
    async fn first_update_outside_emits_nothing() {
        let (detector, publisher) = detector_with(Arc::new(oracle()));
        let outcome = detector.process(&update(1, 10.0, 10.0)).await.unwrap();
        assert_eq!(outcome, Outcome::Unchanged);
        assert!(publisher.events().await.is_empty());
        let state = detector.store().get(&EntityId::from("truck-01")).unwrap();
        assert_eq!(state.current_region, None);
    }

    #[tokio::test]
    async fn first_update_inside_emits_enter() {
        let (detector, publisher) = detector_with(Arc::new(oracle()));
        detector.process(&update(1, 0.5, 0.5)).await.unwrap();
        let events = publisher.events().await;
        assert_eq!(kinds(&events), vec![(TransitionKind::Enter, "Zone1".to_owned())]);
        assert_eq!(events[0].at, at(1));
    }

    #[tokio::test]
    async fn direct_move_exits_before_entering() {
        let (detector, publisher) = detector_with(Arc::new(oracle()));
        detector.process(&update(1, 0.5, 0.5)).await.unwrap();
        let outcome = detector.process(&update(2, 2.5, 2.5)).await.unwrap();
        let Outcome::Transitioned(events) = outcome else {
            panic!("expected a transition");
        };
        assert_eq!(
            kinds(&events),
            vec![
                (TransitionKind::Exit, "Zone1".to_owned()),
                (TransitionKind::Enter, "Zone2".to_owned()),
            ]
        );
        assert_eq!(publisher.events().await.len(), 3);
    }

    #[tokio::test]
    async fn stale_update_never_mutates_or_emits() {
        let (detector, publisher) = detector_with(Arc::new(oracle()));
        detector.process(&update(10, 0.5, 0.5)).await.unwrap();
        let outcome = detector.process(&update(5, 2.5, 2.5)).await.unwrap();
        assert_eq!(outcome, Outcome::Stale);
        assert_eq!(publisher.events().await.len(), 1);
        let state = detector.store().get(&EntityId::from("truck-01")).unwrap();
        assert_eq!(state.current_region, Some(zone1()));
        assert_eq!(state.last_applied_at, at(10));
        assert_eq!(detector.stats().snapshot().stale_rejected, 1);
    }

    #[tokio::test]
    async fn invalid_update_is_rejected_before_the_oracle() {
        let (detector, publisher) = detector_with(Arc::new(FailingOracle));
        let result = detector.process(&update(1, 95.0, 0.0)).await;
        assert!(matches!(
            result,
            Err(DetectError::Validation(ValidationError::LatitudeOutOfRange(_)))
        ));
        assert!(detector.store().is_empty());
        assert!(publisher.events().await.is_empty());
        assert_eq!(detector.stats().snapshot().oracle_failures, 0);
    }

    #[tokio::test]
    async fn oracle_failure_is_not_an_exit() {
        let (detector, publisher) = detector_with(Arc::new(FailingOracle));
        let result = detector.process(&update(1, 0.5, 0.5)).await;
        assert!(matches!(result, Err(DetectError::OracleUnavailable { .. })));
        assert!(detector.store().is_empty());
        assert!(publisher.events().await.is_empty());
    }

    #[tokio::test]
    async fn oracle_failure_while_inside_keeps_region() {
        let (detector, publisher) = detector_with(Arc::new(DownAfterFirst {
            answered: std::sync::atomic::AtomicBool::new(false),
            inner: oracle(),
        }));
        detector.process(&update(1, 0.5, 0.5)).await.unwrap();

        let result = detector.process(&update(2, 10.0, 10.0)).await;
        assert!(matches!(result, Err(DetectError::OracleUnavailable { .. })));

        assert_eq!(
            kinds(&publisher.events().await),
            vec![(TransitionKind::Enter, "Zone1".to_owned())]
        );
        let state = detector.store().get(&EntityId::from("truck-01")).unwrap();
        assert_eq!(state.current_region, Some(zone1()));
        assert_eq!(state.last_applied_at, at(1));
    }

    #[tokio::test(start_paused = true)]
    async fn oracle_timeout_is_a_failure() {
        let (detector, _publisher) = detector_with(Arc::new(SlowOracle));
        let result = detector.process(&update(1, 0.5, 0.5)).await;
        let Err(DetectError::OracleUnavailable { reason, .. }) = result else {
            panic!("expected oracle failure");
        };
        assert!(reason.contains("timed out"));
        assert!(detector.store().is_empty());
    }

    #[tokio::test]
    async fn publish_failure_returns_pending_events_in_order() {
        let (detector, publisher) = detector_with(Arc::new(oracle()));
        detector.process(&update(1, 0.5, 0.5)).await.unwrap();

        publisher.fail_next(1);
        let result = detector.process(&update(2, 2.5, 2.5)).await;
        let Err(DetectError::Publish { pending, .. }) = result else {
            panic!("expected publish failure");
        };
        assert_eq!(
            kinds(&pending),
            vec![
                (TransitionKind::Exit, "Zone1".to_owned()),
                (TransitionKind::Enter, "Zone2".to_owned()),
            ]
        );
        // State is applied regardless of delivery.
        let state = detector.store().get(&EntityId::from("truck-01")).unwrap();
        assert_eq!(state.current_region, Some(zone2()));

        detector.redeliver(pending).await.unwrap();
        assert_eq!(publisher.events().await.len(), 3);
    }
}
