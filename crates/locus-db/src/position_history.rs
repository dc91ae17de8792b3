//! Reads from the `vehicle_locations` history table.
//!
//! The engine never writes here; the table is filled by the location
//! service. On startup the latest row per vehicle seeds the state store.

use chrono::{DateTime, Utc};
use locus_types::PositionUpdate;
use sqlx::PgPool;

use crate::error::DbError;

/// The most recent recorded position of one vehicle.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct LatestPosition {
    /// Vehicle identifier.
    pub vehicle_id: String,
    /// `ST_Y` of the stored point.
    pub latitude: f64,
    /// `ST_X` of the stored point.
    pub longitude: f64,
    /// When the position was recorded.
    pub observed_at: DateTime<Utc>,
}

impl LatestPosition {
    /// View the row as a position update.
    pub fn to_update(&self) -> PositionUpdate {
        PositionUpdate::new(
            self.vehicle_id.as_str(),
            self.latitude,
            self.longitude,
            self.observed_at,
        )
    }
}

/// Operations on the `vehicle_locations` table.
pub struct PositionHistory<'a> {
    pool: &'a PgPool,
}

impl<'a> PositionHistory<'a> {
    /// Create a reader bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Latest position of every vehicle, ordered by vehicle id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn latest_positions(&self) -> Result<Vec<LatestPosition>, DbError> {
        let rows = sqlx::query_as::<_, LatestPosition>(
            r#"SELECT DISTINCT ON (vehicle_id)
                     vehicle_id,
                     ST_Y(location) AS latitude,
                     ST_X(location) AS longitude,
                     "timestamp" AS observed_at
              FROM vehicle_locations
              ORDER BY vehicle_id, "timestamp" DESC"#,
        )
        .fetch_all(self.pool)
        .await?;

        tracing::debug!(count = rows.len(), "Loaded latest vehicle positions");
        Ok(rows)
    }
}
