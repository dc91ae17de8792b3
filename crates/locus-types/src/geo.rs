//! WGS84 points and named geofence regions.

use serde::{Deserialize, Serialize};

use crate::ids::RegionId;

/// Latitude bounds in degrees.
pub const LATITUDE_RANGE: core::ops::RangeInclusive<f64> = -90.0..=90.0;

/// Longitude bounds in degrees.
pub const LONGITUDE_RANGE: core::ops::RangeInclusive<f64> = -180.0..=180.0;

/// A WGS84 coordinate (SRID 4326).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees, `[-90, 90]`.
    pub latitude: f64,
    /// Longitude in degrees, `[-180, 180]`.
    pub longitude: f64,
}

impl GeoPoint {
    /// Build a point from latitude and longitude.
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl core::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// A named geofence as reported by the containment oracle.
///
/// Two regions are the same region when their ids match; the name is
/// carried along for outbound events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    /// Region primary key.
    pub id: RegionId,
    /// Human-readable geofence name (unique).
    pub name: String,
}

impl Region {
    /// Build a region from its id and name.
    pub fn new(id: impl Into<RegionId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl PartialEq for Region {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Region {}

impl core::fmt::Display for Region {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}
