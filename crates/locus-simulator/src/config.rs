//! Simulator configuration from environment variables.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `NATS_URL` | `nats://localhost:4222` |
//! | `SIM_VEHICLES` | `50` |
//! | `SIM_INTERVAL_MS` | `2000` |
//! | `SIM_CENTER_LAT` | `34.0522` |
//! | `SIM_CENTER_LON` | `-118.2437` |
//! | `SIM_SPREAD_DEG` | `0.025` |
//! | `SIM_SUBJECT_PREFIX` | `locus.vehicles` |

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context as _, ensure};
use locus_types::GeoPoint;

/// Runtime configuration for the simulator.
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// NATS server URL.
    pub nats_url: String,
    /// Number of simulated vehicles.
    pub vehicles: usize,
    /// Base delay between two reports of one vehicle.
    pub interval: Duration,
    /// Centre of the area positions are drawn from.
    pub center: GeoPoint,
    /// Maximum offset from the centre, in degrees, on each axis.
    pub spread_deg: f64,
    /// Subjects are `{prefix}.{vehicle_id}.location`.
    pub subject_prefix: String,
}

impl SimConfig {
    /// Load from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error naming the variable that failed to parse or
    /// holds an unusable value.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`SimConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let nats_url = lookup("NATS_URL").unwrap_or_else(|| "nats://localhost:4222".to_owned());
        let vehicles: usize = parse_or(&lookup, "SIM_VEHICLES", 50)?;
        let interval_ms: u64 = parse_or(&lookup, "SIM_INTERVAL_MS", 2000)?;
        let latitude: f64 = parse_or(&lookup, "SIM_CENTER_LAT", 34.0522)?;
        let longitude: f64 = parse_or(&lookup, "SIM_CENTER_LON", -118.2437)?;
        let spread_deg: f64 = parse_or(&lookup, "SIM_SPREAD_DEG", 0.025)?;
        let subject_prefix =
            lookup("SIM_SUBJECT_PREFIX").unwrap_or_else(|| "locus.vehicles".to_owned());

        ensure!(vehicles > 0, "SIM_VEHICLES must be > 0");
        ensure!(interval_ms > 0, "SIM_INTERVAL_MS must be > 0");
        ensure!(
            spread_deg.is_finite() && spread_deg >= 0.0,
            "SIM_SPREAD_DEG must be a non-negative number"
        );
        let center = GeoPoint::new(latitude, longitude);
        ensure!(
            locus_types::geo::LATITUDE_RANGE.contains(&latitude)
                && locus_types::geo::LONGITUDE_RANGE.contains(&longitude),
            "simulation centre {center} is not a valid coordinate"
        );

        Ok(Self {
            nats_url,
            vehicles,
            interval: Duration::from_millis(interval_ms),
            center,
            spread_deg,
            subject_prefix,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse()
            .with_context(|| format!("invalid {key}: {raw:?}"))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_los_angeles_fleet() {
        let config = SimConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.vehicles, 50);
        assert_eq!(config.interval, Duration::from_secs(2));
        assert!((config.center.latitude - 34.0522).abs() < 1e-9);
        assert!((config.spread_deg - 0.025).abs() < 1e-9);
        assert_eq!(config.subject_prefix, "locus.vehicles");
    }

    #[test]
    fn overrides_are_parsed() {
        let config = SimConfig::from_lookup(lookup(&[
            ("SIM_VEHICLES", "3"),
            ("SIM_INTERVAL_MS", "250"),
            ("NATS_URL", "nats://bus:4222"),
        ]))
        .unwrap();
        assert_eq!(config.vehicles, 3);
        assert_eq!(config.interval, Duration::from_millis(250));
        assert_eq!(config.nats_url, "nats://bus:4222");
    }

    #[test]
    fn bad_values_name_the_variable() {
        let err = SimConfig::from_lookup(lookup(&[("SIM_VEHICLES", "many")])).unwrap_err();
        assert!(err.to_string().contains("SIM_VEHICLES"));
        assert!(SimConfig::from_lookup(lookup(&[("SIM_VEHICLES", "0")])).is_err());
        assert!(SimConfig::from_lookup(lookup(&[("SIM_CENTER_LAT", "91")])).is_err());
    }
}
