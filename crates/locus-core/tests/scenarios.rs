//! End-to-end detection scenarios.
//!
//! Drives the detector and the worker pool with an in-memory polygon
//! oracle and publisher, then checks the emitted event streams against
//! the enter/exit rules.

#![allow(
    clippy::unwrap_used,
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing,
    clippy::cast_possible_wrap
)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use locus_core::detector::{Outcome, TransitionDetector, derive_transitions};
use locus_core::oracle::{ContainmentOracle, Polygon, PolygonOracle};
use locus_core::pool::WorkerPool;
use locus_core::publisher::{EventPublisher, MemoryPublisher};
use locus_core::retry::RetryPolicy;
use locus_core::store::VehicleStateStore;
use locus_types::{
    EntityId, GeoPoint, PositionUpdate, Region, RegionId, TransitionEvent, TransitionKind,
};

const ZONE1: (f64, f64) = (34.05, -118.25);
const OUTSIDE: (f64, f64) = (34.00, -118.00);
const ZONE2: (f64, f64) = (34.15, -118.35);

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn square(center: (f64, f64), half: f64) -> Polygon {
    Polygon::rectangle(
        GeoPoint::new(center.0 - half, center.1 - half),
        GeoPoint::new(center.0 + half, center.1 + half),
    )
    .unwrap()
}

fn city_oracle() -> PolygonOracle {
    PolygonOracle::new([
        (Region::new(1, "Zone1"), square(ZONE1, 0.02)),
        (Region::new(2, "Zone2"), square(ZONE2, 0.02)),
    ])
}

fn build(oracle: PolygonOracle) -> (Arc<TransitionDetector>, Arc<MemoryPublisher>) {
    let publisher = Arc::new(MemoryPublisher::new());
    let detector = Arc::new(TransitionDetector::new(
        Arc::new(VehicleStateStore::new()),
        Arc::new(oracle) as Arc<dyn ContainmentOracle>,
        Arc::clone(&publisher) as Arc<dyn EventPublisher>,
        Duration::from_secs(1),
    ));
    (detector, publisher)
}

fn update(entity: &str, secs: i64, point: (f64, f64)) -> PositionUpdate {
    PositionUpdate::new(entity, point.0, point.1, at(secs))
}

fn summary(events: &[TransitionEvent]) -> Vec<(TransitionKind, &str)> {
    events
        .iter()
        .map(|e| (e.kind, e.region.name.as_str()))
        .collect()
}

/// Enter minus exit for every region must stay in {0, 1} at every prefix,
/// and at most one region may be "open" at a time.
fn assert_balanced(entity: &EntityId, events: &[TransitionEvent]) {
    let mut open: BTreeMap<RegionId, i64> = BTreeMap::new();
    for event in events {
        let balance = open.entry(event.region.id).or_insert(0);
        match event.kind {
            TransitionKind::Enter => *balance += 1,
            TransitionKind::Exit => *balance -= 1,
        }
        assert!(
            (0..=1).contains(balance),
            "{entity}: unbalanced {} in {:?}",
            event.region,
            summary(events)
        );
        let inside = open.values().filter(|b| **b == 1).count();
        assert!(inside <= 1, "{entity}: inside two regions at once");
    }
}

#[tokio::test]
async fn repeated_update_in_same_zone_enters_once() {
    let (detector, publisher) = build(city_oracle());
    detector.process(&update("truck-01", 1, ZONE1)).await.unwrap();
    let second = detector.process(&update("truck-01", 2, ZONE1)).await.unwrap();

    assert_eq!(second, Outcome::Unchanged);
    assert_eq!(
        summary(&publisher.events().await),
        vec![(TransitionKind::Enter, "Zone1")]
    );
}

#[tokio::test]
async fn zone_to_outside_to_other_zone() {
    let (detector, publisher) = build(city_oracle());
    let id = EntityId::from("truck-01");

    detector.process(&update("truck-01", 1, ZONE1)).await.unwrap();
    let before = publisher.events_for(&id).await.len();

    detector.process(&update("truck-01", 2, OUTSIDE)).await.unwrap();
    detector.process(&update("truck-01", 3, ZONE2)).await.unwrap();

    let events = publisher.events_for(&id).await;
    assert_eq!(
        summary(&events[before..]),
        vec![(TransitionKind::Exit, "Zone1"), (TransitionKind::Enter, "Zone2")]
    );
    let state = detector.store().get(&id).unwrap();
    assert_eq!(state.current_region.map(|r| r.name), Some(String::from("Zone2")));
}

#[tokio::test]
async fn out_of_order_update_is_ignored_whatever_it_resolves_to() {
    let (detector, publisher) = build(city_oracle());
    detector.process(&update("truck-01", 10, ZONE1)).await.unwrap();

    for point in [OUTSIDE, ZONE2, ZONE1] {
        let outcome = detector.process(&update("truck-01", 5, point)).await.unwrap();
        assert_eq!(outcome, Outcome::Stale);
    }

    assert_eq!(publisher.events().await.len(), 1);
    let state = detector.store().get(&EntityId::from("truck-01")).unwrap();
    assert_eq!(state.last_applied_at, at(10));
    assert_eq!(detector.stats().snapshot().stale_rejected, 3);
}

#[tokio::test]
async fn direct_move_between_zones_exits_first() {
    let (detector, publisher) = build(city_oracle());
    detector.process(&update("truck-01", 1, ZONE1)).await.unwrap();
    detector.process(&update("truck-01", 2, ZONE2)).await.unwrap();

    assert_eq!(
        summary(&publisher.events().await),
        vec![
            (TransitionKind::Enter, "Zone1"),
            (TransitionKind::Exit, "Zone1"),
            (TransitionKind::Enter, "Zone2"),
        ]
    );
}

#[tokio::test]
async fn overlapping_regions_resolve_to_the_smallest() {
    let oracle = city_oracle().with_region(Region::new(3, "Depot"), square(ZONE1, 0.005));
    let (detector, publisher) = build(oracle);

    detector.process(&update("truck-01", 1, ZONE1)).await.unwrap();
    detector.process(&update("truck-01", 2, (ZONE1.0 + 0.01, ZONE1.1))).await.unwrap();
    detector.process(&update("truck-01", 3, ZONE1)).await.unwrap();

    assert_eq!(
        summary(&publisher.events().await),
        vec![
            (TransitionKind::Enter, "Depot"),
            (TransitionKind::Exit, "Depot"),
            (TransitionKind::Enter, "Zone1"),
            (TransitionKind::Exit, "Zone1"),
            (TransitionKind::Enter, "Depot"),
        ]
    );
}

/// Deterministic route for entity `n`: cycles through zone, outside and
/// the other zone with a per-entity phase.
fn route(n: usize, step: usize) -> (f64, f64) {
    match (n + step) % 4 {
        0 => ZONE1,
        1 | 3 => OUTSIDE,
        _ => ZONE2,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn thousand_entities_through_the_pool_keep_their_own_history() {
    const ENTITIES: usize = 1_000;
    const UPDATES: usize = 10;

    let (detector, publisher) = build(city_oracle());
    let pool = Arc::new(WorkerPool::spawn(
        Arc::clone(&detector),
        8,
        64,
        RetryPolicy::default(),
    ));

    let mut submitters = tokio::task::JoinSet::new();
    for n in 0..ENTITIES {
        let pool = Arc::clone(&pool);
        submitters.spawn(async move {
            let id = format!("truck-{n:04}");
            for step in 0..UPDATES {
                pool.submit(update(&id, step as i64, route(n, step)))
                    .await
                    .unwrap();
                if step % 3 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        });
    }
    while let Some(joined) = submitters.join_next().await {
        joined.unwrap();
    }
    pool.shutdown().await;

    assert_eq!(detector.store().len(), ENTITIES);
    let stats = detector.stats().snapshot();
    assert_eq!(stats.updates_processed, (ENTITIES * UPDATES) as u64);
    assert_eq!(stats.stale_rejected, 0);

    let oracle = city_oracle();
    let mut expected_total = 0;
    for n in 0..ENTITIES {
        let id = EntityId::from(format!("truck-{n:04}"));
        let events = publisher.events_for(&id).await;
        assert_balanced(&id, &events);

        // Replaying the route sequentially must give exactly the same stream.
        let mut current: Option<Region> = None;
        let mut expected = Vec::new();
        for step in 0..UPDATES {
            let (lat, lon) = route(n, step);
            let next = oracle.locate(GeoPoint::new(lat, lon)).cloned();
            expected.extend(derive_transitions(
                &id,
                current.as_ref(),
                next.as_ref(),
                at(step as i64),
            ));
            current = next;
        }
        assert_eq!(summary(&events), summary(&expected), "{id}");
        expected_total += expected.len();

        let state = detector.store().get(&id).unwrap();
        assert_eq!(state.current_region, current, "{id}");
        assert_eq!(state.last_applied_at, at((UPDATES - 1) as i64));
    }
    assert_eq!(publisher.events().await.len(), expected_total);
    assert_eq!(stats.events_published, expected_total as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shuffled_delivery_never_breaks_the_invariant() {
    let (detector, publisher) = build(city_oracle());

    // Each entity's updates arrive reversed and concurrently with others;
    // whatever gets applied, the event stream must stay balanced.
    let mut tasks = tokio::task::JoinSet::new();
    for n in 0..200_usize {
        let detector = Arc::clone(&detector);
        tasks.spawn(async move {
            let id = format!("van-{n:03}");
            for step in (0..6_usize).rev() {
                detector
                    .process(&update(&id, step as i64, route(n, step)))
                    .await
                    .unwrap();
            }
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap();
    }

    for n in 0..200_usize {
        let id = EntityId::from(format!("van-{n:03}"));
        let events = publisher.events_for(&id).await;
        assert_balanced(&id, &events);
        // Only the first (newest) update is applied.
        assert!(events.len() <= 1, "{id}: {:?}", summary(&events));
        assert_eq!(detector.store().get(&id).unwrap().last_applied_at, at(5));
    }
    assert_eq!(detector.stats().snapshot().stale_rejected, 200 * 5);
}
