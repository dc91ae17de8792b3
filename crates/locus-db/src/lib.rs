//! `PostgreSQL`/`PostGIS` layer for the Locus geofence engine.
//!
//! The engine reads two tables: `geofences`, through the
//! [`PostgisOracle`] which answers containment queries, and
//! `vehicle_locations`, through [`PositionHistory`] which supplies the
//! last known position of each vehicle for warm start.
//!
//! # Modules
//!
//! - [`postgres`] -- `PostgreSQL` connection pool and configuration
//! - [`geofence_store`] -- `PostGIS` containment oracle over `geofences`
//! - [`position_history`] -- Latest-position reads from `vehicle_locations`
//! - [`error`] -- Shared error types

pub mod error;
pub mod geofence_store;
pub mod position_history;
pub mod postgres;

// Re-export primary types for convenience.
pub use error::DbError;
pub use geofence_store::{GeofenceRow, PostgisOracle};
pub use position_history::{LatestPosition, PositionHistory};
pub use postgres::{PostgresConfig, PostgresPool};
