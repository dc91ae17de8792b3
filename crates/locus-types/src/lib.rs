//! Shared type definitions for the Locus geofence engine.
//!
//! This crate is the single source of truth for the values that flow
//! through the engine: position updates coming in from the bus, the
//! regions the containment oracle answers with, and the transition
//! events going back out.
//!
//! # Modules
//!
//! - [`ids`] -- Strongly-typed identifiers for entities, regions and events
//! - [`geo`] -- WGS84 points and named regions
//! - [`position`] -- Position updates, inbound wire message, validation
//! - [`transition`] -- Enter/exit transition events and the outbound wire message

pub mod geo;
pub mod ids;
pub mod position;
pub mod transition;

// Re-export all public types at crate root for convenience.
pub use geo::{GeoPoint, Region};
pub use ids::{EntityId, EventId, RegionId};
pub use position::{LocationMessage, PositionUpdate, ValidationError};
pub use transition::{GeofenceEventMessage, TransitionEvent, TransitionKind};
