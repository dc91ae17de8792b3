//! Enter/exit transition events and the outbound wire message.
//!
//! A [`TransitionEvent`] is produced exactly when an applied update changes
//! an entity's containing region. It is immutable once built and is turned
//! into a [`GeofenceEventMessage`] for publication on
//! `locus.geofence.events`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Region;
use crate::ids::{EntityId, EventId, RegionId};

/// Direction of a boundary crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// The entity moved into the region.
    Enter,
    /// The entity left the region.
    Exit,
}

impl TransitionKind {
    /// Wire name of the kind (`enter` / `exit`).
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enter => "enter",
            Self::Exit => "exit",
        }
    }
}

impl core::fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One enter or exit of one entity for one region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEvent {
    /// Unique id, assigned at creation.
    pub event_id: EventId,
    /// The entity that crossed the boundary.
    pub entity_id: EntityId,
    /// The region whose boundary was crossed.
    pub region: Region,
    /// Enter or exit.
    pub kind: TransitionKind,
    /// `observed_at` of the update that caused the transition.
    pub at: DateTime<Utc>,
}

impl TransitionEvent {
    /// Build a new event with a fresh id.
    pub fn new(
        entity_id: EntityId,
        region: Region,
        kind: TransitionKind,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            entity_id,
            region,
            kind,
            at,
        }
    }

    /// The key downstream consumers deduplicate redeliveries on.
    pub fn dedup_key(&self) -> (&EntityId, RegionId, TransitionKind, DateTime<Utc>) {
        (&self.entity_id, self.region.id, self.kind, self.at)
    }
}

/// Outbound wire format for transition events.
///
/// ```json
/// { "vehicle_id": "truck-01", "geofence_name": "Zone1", "event": "enter",
///   "geofence_id": 1, "at": "2024-05-01T10:00:00Z", "event_id": "..." }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeofenceEventMessage {
    /// Vehicle that crossed the boundary.
    pub vehicle_id: String,
    /// Name of the geofence.
    pub geofence_name: String,
    /// `enter` or `exit`.
    pub event: TransitionKind,
    /// Primary key of the geofence.
    pub geofence_id: RegionId,
    /// Observation time of the causing update.
    pub at: DateTime<Utc>,
    /// Unique event id.
    pub event_id: EventId,
}

impl From<&TransitionEvent> for GeofenceEventMessage {
    fn from(event: &TransitionEvent) -> Self {
        Self {
            vehicle_id: event.entity_id.to_string(),
            geofence_name: event.region.name.clone(),
            event: event.kind,
            geofence_id: event.region.id,
            at: event.at,
            event_id: event.event_id,
        }
    }
}
