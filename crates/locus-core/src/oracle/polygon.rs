//! In-memory polygon oracle.
//!
//! Polygons are simple rings of WGS84 vertices treated as planar
//! lon/lat geometry, the same way `PostGIS` treats `GEOMETRY(Polygon, 4326)`:
//! areas are in square degrees and a point exactly on an edge is *not*
//! contained (`ST_Contains` semantics).

use async_trait::async_trait;
use locus_types::{GeoPoint, Region};

use super::{Containment, ContainmentOracle};

/// Distance below which a point counts as lying on an edge.
const EDGE_TOLERANCE: f64 = 1e-12;

/// Errors building a [`Polygon`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolygonError {
    /// Fewer than three distinct vertices.
    #[error("polygon needs at least 3 vertices, got {0}")]
    TooFewVertices(usize),

    /// A vertex is NaN or infinite.
    #[error("polygon vertex is not finite")]
    NonFiniteVertex,

    /// All vertices are collinear.
    #[error("polygon has zero area")]
    Degenerate,
}

/// A simple polygon (single outer ring, no holes).
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    ring: Vec<GeoPoint>,
    area: f64,
    min: GeoPoint,
    max: GeoPoint,
}

impl Polygon {
    /// Build from vertices. A closing vertex equal to the first is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`PolygonError`] for fewer than 3 vertices, non-finite
    /// coordinates, or zero area.
    pub fn new(mut vertices: Vec<GeoPoint>) -> Result<Self, PolygonError> {
        if vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }
        if vertices.len() < 3 {
            return Err(PolygonError::TooFewVertices(vertices.len()));
        }
        if vertices
            .iter()
            .any(|v| !v.latitude.is_finite() || !v.longitude.is_finite())
        {
            return Err(PolygonError::NonFiniteVertex);
        }
        let area = shoelace_area(&vertices);
        if area <= EDGE_TOLERANCE {
            return Err(PolygonError::Degenerate);
        }
        let (min, max) = bounding_box(&vertices);
        Ok(Self {
            ring: vertices,
            area,
            min,
            max,
        })
    }

    /// Build from `(longitude, latitude)` pairs, the GeoJSON axis order.
    ///
    /// # Errors
    ///
    /// See [`Polygon::new`].
    pub fn from_lon_lat(coords: &[(f64, f64)]) -> Result<Self, PolygonError> {
        Self::new(
            coords
                .iter()
                .map(|&(lon, lat)| GeoPoint::new(lat, lon))
                .collect(),
        )
    }

    /// Axis-aligned rectangle between two corners.
    ///
    /// # Errors
    ///
    /// See [`Polygon::new`].
    pub fn rectangle(south_west: GeoPoint, north_east: GeoPoint) -> Result<Self, PolygonError> {
        Self::new(vec![
            south_west,
            GeoPoint::new(south_west.latitude, north_east.longitude),
            north_east,
            GeoPoint::new(north_east.latitude, south_west.longitude),
        ])
    }

    /// Planar area in square degrees.
    pub const fn area(&self) -> f64 {
        self.area
    }

    /// Strict interior containment (edge points are outside).
    pub fn contains(&self, point: GeoPoint) -> bool {
        if point.latitude < self.min.latitude
            || point.latitude > self.max.latitude
            || point.longitude < self.min.longitude
            || point.longitude > self.max.longitude
        {
            return false;
        }

        let (px, py) = (point.longitude, point.latitude);
        let mut inside = false;
        for (a, b) in edges(&self.ring) {
            let (ax, ay) = (a.longitude, a.latitude);
            let (bx, by) = (b.longitude, b.latitude);
            if on_segment(px, py, ax, ay, bx, by) {
                return false;
            }
            if (ay > py) != (by > py) {
                let x_cross = (bx - ax) * (py - ay) / (by - ay) + ax;
                if px < x_cross {
                    inside = !inside;
                }
            }
        }
        inside
    }
}

/// Consecutive vertex pairs, wrapping from the last vertex back to the first.
fn edges(ring: &[GeoPoint]) -> impl Iterator<Item = (GeoPoint, GeoPoint)> + '_ {
    ring.iter()
        .copied()
        .zip(ring.iter().copied().cycle().skip(1))
}

fn shoelace_area(ring: &[GeoPoint]) -> f64 {
    let twice: f64 = edges(ring)
        .map(|(a, b)| a.longitude * b.latitude - b.longitude * a.latitude)
        .sum();
    (twice / 2.0).abs()
}

fn bounding_box(ring: &[GeoPoint]) -> (GeoPoint, GeoPoint) {
    ring.iter().fold(
        (
            GeoPoint::new(f64::INFINITY, f64::INFINITY),
            GeoPoint::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
        ),
        |(min, max), v| {
            (
                GeoPoint::new(min.latitude.min(v.latitude), min.longitude.min(v.longitude)),
                GeoPoint::new(max.latitude.max(v.latitude), max.longitude.max(v.longitude)),
            )
        },
    )
}

fn on_segment(px: f64, py: f64, ax: f64, ay: f64, bx: f64, by: f64) -> bool {
    let cross = (bx - ax) * (py - ay) - (by - ay) * (px - ax);
    if cross.abs() > EDGE_TOLERANCE {
        return false;
    }
    px >= ax.min(bx) - EDGE_TOLERANCE
        && px <= ax.max(bx) + EDGE_TOLERANCE
        && py >= ay.min(by) - EDGE_TOLERANCE
        && py <= ay.max(by) + EDGE_TOLERANCE
}

/// Oracle over a fixed set of named polygons.
///
/// Regions are kept sorted by `(area, id)` so the first hit is the
/// tie-break winner.
#[derive(Debug, Clone, Default)]
pub struct PolygonOracle {
    regions: Vec<(Region, Polygon)>,
}

impl PolygonOracle {
    /// Oracle with no regions; every query answers [`Containment::NotFound`].
    pub const fn empty() -> Self {
        Self {
            regions: Vec::new(),
        }
    }

    /// Build from region/polygon pairs.
    pub fn new(regions: impl IntoIterator<Item = (Region, Polygon)>) -> Self {
        let mut regions: Vec<(Region, Polygon)> = regions.into_iter().collect();
        regions.sort_by(|(ra, pa), (rb, pb)| {
            pa.area()
                .total_cmp(&pb.area())
                .then_with(|| ra.id.cmp(&rb.id))
        });
        Self { regions }
    }

    /// Add a region, keeping the tie-break order.
    #[must_use]
    pub fn with_region(self, region: Region, polygon: Polygon) -> Self {
        Self::new(self.regions.into_iter().chain(std::iter::once((region, polygon))))
    }

    /// Number of regions.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether no region is defined.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Synchronous lookup used by the async trait method.
    pub fn locate(&self, point: GeoPoint) -> Option<&Region> {
        self.regions
            .iter()
            .find(|(_, polygon)| polygon.contains(point))
            .map(|(region, _)| region)
    }
}

#[async_trait]
impl ContainmentOracle for PolygonOracle {
    async fn query(&self, point: GeoPoint) -> Containment {
        self.locate(point)
            .map_or(Containment::NotFound, |region| Containment::Found(region.clone()))
    }
}
