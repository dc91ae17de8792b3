//! Containment oracle seam.
//!
//! The engine does not do point-in-polygon work on its own behalf; it asks
//! a [`ContainmentOracle`] which region, if any, contains a point. The
//! answer is a three-way [`Containment`] so that "not inside any region"
//! can never be confused with "the query failed".
//!
//! # Tie-break policy
//!
//! When regions overlap, every oracle must return the region with the
//! **smallest area**, breaking equal areas by **ascending region id**.
//! Repeated queries for an unchanged point therefore always agree, which
//! keeps the enter/exit sequence free of flapping.
//!
//! Implementations:
//! - [`PolygonOracle`] -- in-memory polygons, used for tests and embedding
//! - `locus_db::PostgisOracle` -- the production `PostGIS` query

mod polygon;

use async_trait::async_trait;
use locus_types::{GeoPoint, Region};

pub use polygon::{Polygon, PolygonError, PolygonOracle};

/// Answer to a containment query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Containment {
    /// The point lies in this region (tie-break already applied).
    Found(Region),
    /// The point lies in no region.
    NotFound,
    /// The oracle could not answer. Never to be read as [`Containment::NotFound`].
    QueryFailed {
        /// Why the query failed.
        reason: String,
    },
}

impl Containment {
    /// Shorthand for [`Containment::QueryFailed`].
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::QueryFailed {
            reason: reason.into(),
        }
    }

    /// Collapse into the region (if any), keeping failures as errors.
    ///
    /// # Errors
    ///
    /// Returns the failure reason for [`Containment::QueryFailed`].
    pub fn into_result(self) -> Result<Option<Region>, String> {
        match self {
            Self::Found(region) => Ok(Some(region)),
            Self::NotFound => Ok(None),
            Self::QueryFailed { reason } => Err(reason),
        }
    }
}

/// Answers "which region contains this point".
#[async_trait]
pub trait ContainmentOracle: Send + Sync {
    /// Query the containing region for `point`.
    ///
    /// Implementations report transport or storage errors as
    /// [`Containment::QueryFailed`] rather than panicking or returning
    /// [`Containment::NotFound`].
    async fn query(&self, point: GeoPoint) -> Containment;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_is_not_absence() {
        assert_eq!(Containment::NotFound.into_result(), Ok(None));
        assert_eq!(
            Containment::failed("timeout").into_result(),
            Err(String::from("timeout"))
        );
        let zone = Region::new(1, "Zone1");
        assert_eq!(Containment::Found(zone.clone()).into_result(), Ok(Some(zone)));
    }
}
