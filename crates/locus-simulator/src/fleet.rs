//! Vehicle naming, random positions and report payloads.

use std::time::Duration;

use chrono::{DateTime, Utc};
use locus_types::{GeoPoint, LocationMessage, PositionUpdate};
use rand::Rng;

/// Upper bound of the random delay added to each reporting interval.
pub const MAX_JITTER: Duration = Duration::from_secs(1);

/// `truck-01`, `truck-02`, ... for `count` vehicles.
pub fn vehicle_ids(count: usize) -> Vec<String> {
    (1..=count).map(|n| format!("truck-{n:02}")).collect()
}

/// Subject a vehicle reports on.
pub fn location_subject(prefix: &str, vehicle_id: &str) -> String {
    format!("{prefix}.{vehicle_id}.location")
}

/// A point within `spread_deg` of `center` on both axes.
pub fn random_position(rng: &mut impl Rng, center: GeoPoint, spread_deg: f64) -> GeoPoint {
    if spread_deg <= 0.0 {
        return center;
    }
    GeoPoint::new(
        center.latitude + rng.random_range(-spread_deg..=spread_deg),
        center.longitude + rng.random_range(-spread_deg..=spread_deg),
    )
}

/// Delay before the next report: the base interval plus up to one second.
pub fn next_delay(rng: &mut impl Rng, interval: Duration) -> Duration {
    interval.saturating_add(rng.random_range(Duration::ZERO..=MAX_JITTER))
}

/// JSON payload for one report.
///
/// # Errors
///
/// Returns the serialization error, which only happens for non-finite
/// coordinates.
pub fn report_payload(
    vehicle_id: &str,
    point: GeoPoint,
    observed_at: DateTime<Utc>,
) -> serde_json::Result<Vec<u8>> {
    let update = PositionUpdate::new(vehicle_id, point.latitude, point.longitude, observed_at);
    serde_json::to_vec(&LocationMessage::from_update(&update))
}
