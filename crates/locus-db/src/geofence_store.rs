//! `PostGIS` containment oracle over the `geofences` table.
//!
//! A point is contained when `ST_Contains(area, point)` holds, so points on
//! a boundary are outside. Overlaps resolve to the smallest `ST_Area`, then
//! the lowest id, matching the in-memory oracle.

use async_trait::async_trait;
use locus_core::oracle::{Containment, ContainmentOracle};
use locus_types::{GeoPoint, Region};
use sqlx::PgPool;

use crate::error::DbError;

/// Containing-region lookup. Longitude binds first (`ST_MakePoint(x, y)`).
const CONTAINING_REGION_SQL: &str = r"SELECT id, name
      FROM geofences
      WHERE ST_Contains(area, ST_SetSRID(ST_MakePoint($1, $2), 4326))
      ORDER BY ST_Area(area) ASC, id ASC
      LIMIT 1";

/// A geofence row as returned by the containment query.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct GeofenceRow {
    /// `SERIAL` primary key.
    pub id: i32,
    /// Unique geofence name.
    pub name: String,
}

impl From<GeofenceRow> for Region {
    fn from(row: GeofenceRow) -> Self {
        Self::new(row.id, row.name)
    }
}

/// Containment oracle answering from `PostGIS`.
#[derive(Debug, Clone)]
pub struct PostgisOracle {
    pool: PgPool,
}

impl PostgisOracle {
    /// Oracle over an existing pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The region containing `point`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails. "No row" is
    /// `Ok(None)`, never an error.
    pub async fn containing_region(&self, point: GeoPoint) -> Result<Option<Region>, DbError> {
        let row = sqlx::query_as::<_, GeofenceRow>(CONTAINING_REGION_SQL)
            .bind(point.longitude)
            .bind(point.latitude)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Region::from))
    }
}

#[async_trait]
impl ContainmentOracle for PostgisOracle {
    async fn query(&self, point: GeoPoint) -> Containment {
        match self.containing_region(point).await {
            Ok(Some(region)) => Containment::Found(region),
            Ok(None) => Containment::NotFound,
            Err(e) => Containment::failed(e.to_string()),
        }
    }
}
