//! Position updates and the inbound location wire message.
//!
//! Vehicles publish [`LocationMessage`] JSON on
//! `locus.vehicles.{vehicle_id}.location`. The engine turns each message
//! into a [`PositionUpdate`], stamping the receipt time when the payload
//! carries no `observed_at`, and validates it before anything else
//! touches it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::{GeoPoint, LATITUDE_RANGE, LONGITUDE_RANGE};
use crate::ids::EntityId;

/// Reasons a position update is rejected before any state is read.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// The update carries no entity identifier.
    #[error("entity id is empty")]
    EmptyEntityId,

    /// A coordinate is NaN or infinite.
    #[error("coordinate is not a finite number")]
    NonFiniteCoordinate,

    /// Latitude outside `[-90, 90]`.
    #[error("latitude {0} out of range [-90, 90]")]
    LatitudeOutOfRange(f64),

    /// Longitude outside `[-180, 180]`.
    #[error("longitude {0} out of range [-180, 180]")]
    LongitudeOutOfRange(f64),

    /// The subject names a different vehicle than the payload.
    #[error("subject vehicle {subject} does not match payload vehicle {payload}")]
    EntityMismatch {
        /// Vehicle id taken from the message subject.
        subject: String,
        /// Vehicle id taken from the payload.
        payload: String,
    },
}

/// A single observed position of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    /// The reporting entity.
    pub entity_id: EntityId,
    /// Where it was observed.
    pub point: GeoPoint,
    /// When it was observed.
    pub observed_at: DateTime<Utc>,
}

impl PositionUpdate {
    /// Build an update from its parts.
    pub fn new(
        entity_id: impl Into<EntityId>,
        latitude: f64,
        longitude: f64,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            point: GeoPoint::new(latitude, longitude),
            observed_at,
        }
    }

    /// Check the entity id and coordinate ranges.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.entity_id.is_blank() {
            return Err(ValidationError::EmptyEntityId);
        }
        let GeoPoint {
            latitude,
            longitude,
        } = self.point;
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(ValidationError::NonFiniteCoordinate);
        }
        if !LATITUDE_RANGE.contains(&latitude) {
            return Err(ValidationError::LatitudeOutOfRange(latitude));
        }
        if !LONGITUDE_RANGE.contains(&longitude) {
            return Err(ValidationError::LongitudeOutOfRange(longitude));
        }
        Ok(())
    }
}

/// Inbound wire format published by vehicles.
///
/// ```json
/// { "vehicle_id": "truck-01", "latitude": 34.05, "longitude": -118.24 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationMessage {
    /// Reporting vehicle; may be empty when the subject carries it.
    #[serde(default)]
    pub vehicle_id: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Observation time; receipt time is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<DateTime<Utc>>,
}

impl LocationMessage {
    /// Convert into a [`PositionUpdate`].
    ///
    /// `subject_vehicle` is the id parsed from the message subject, if any.
    /// It fills in an empty payload id; a conflicting id is rejected.
    /// `received_at` stands in for a missing `observed_at`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EntityMismatch`] when subject and payload
    /// name different vehicles.
    pub fn into_update(
        self,
        subject_vehicle: Option<&str>,
        received_at: DateTime<Utc>,
    ) -> Result<PositionUpdate, ValidationError> {
        let entity_id = match subject_vehicle {
            Some(subject) if self.vehicle_id.is_empty() => subject.to_owned(),
            Some(subject) if subject != self.vehicle_id => {
                return Err(ValidationError::EntityMismatch {
                    subject: subject.to_owned(),
                    payload: self.vehicle_id,
                });
            }
            _ => self.vehicle_id,
        };
        Ok(PositionUpdate::new(
            entity_id,
            self.latitude,
            self.longitude,
            self.observed_at.unwrap_or(received_at),
        ))
    }

    /// Build the wire message for an update (used by the simulator).
    pub fn from_update(update: &PositionUpdate) -> Self {
        Self {
            vehicle_id: update.entity_id.to_string(),
            latitude: update.point.latitude,
            longitude: update.point.longitude,
            observed_at: Some(update.observed_at),
        }
    }
}
