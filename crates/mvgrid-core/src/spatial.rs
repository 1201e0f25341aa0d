//! Typed geometry values and the spatial attribute declarations attached to entities.
//!
//! Every geometry-bearing entity declares the shape it stores and the
//! coordinate reference system (SRID) the value is expressed in. Most
//! geographically anchored entities use WGS84 (SRID 4326); a few legacy
//! entities (cable subsections, joints, event areas) omit the SRID and are
//! stored as "unspecified/local".
//!
//! Coordinates follow the PostGIS convention: `x` is longitude and `y` is
//! latitude for WGS84 data.
//!
//! # Overlap queries
//!
//! [`SpatialOverlap`] is the extension point used to decide whether an event
//! area touches a cable subsection. [`PlanarOverlap`] treats coordinates as a
//! plane, which is adequate at the distribution-grid scale (a few km).
//!
//! ```
//! use mvgrid_core::spatial::{Coord, Geometry, PlanarOverlap, SpatialOverlap};
//!
//! let cable = Geometry::line_string(vec![Coord::new(0.0, 0.0), Coord::new(2.0, 2.0)]);
//! let dig = Geometry::polygon(vec![
//!     Coord::new(1.0, 0.0),
//!     Coord::new(3.0, 0.0),
//!     Coord::new(3.0, 1.5),
//!     Coord::new(1.0, 1.5),
//!     Coord::new(1.0, 0.0),
//! ]);
//! assert!(PlanarOverlap::default().intersects(&cable, &dig).unwrap());
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{GridError, GridResult};

/// Mean Earth radius used for haversine lengths (km).
const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Spatial reference identifier (EPSG code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Srid(pub u32);

impl Srid {
    /// WGS84 longitude/latitude.
    pub const WGS84: Srid = Srid(4326);
}

impl std::fmt::Display for Srid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
}

impl Coord {
    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    fn distance(&self, other: &Coord) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// A polygon with one exterior ring and optional holes. Rings are closed
/// (first coordinate repeated at the end).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub exterior: Vec<Coord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interiors: Vec<Vec<Coord>>,
}

impl Polygon {
    pub fn new(exterior: Vec<Coord>) -> Self {
        Self {
            exterior,
            interiors: Vec::new(),
        }
    }

    pub fn with_hole(mut self, ring: Vec<Coord>) -> Self {
        self.interiors.push(ring);
        self
    }

    fn rings(&self) -> impl Iterator<Item = &[Coord]> {
        std::iter::once(self.exterior.as_slice()).chain(self.interiors.iter().map(|r| r.as_slice()))
    }
}

/// The coordinate payload of a geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Shape {
    Point(Coord),
    LineString(Vec<Coord>),
    Polygon(Polygon),
    MultiPolygon(Vec<Polygon>),
}

/// Geometry shape discriminant, displayed the way PostGIS names column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryKind {
    Point,
    LineString,
    Polygon,
    MultiPolygon,
}

impl GeometryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryKind::Point => "POINT",
            GeometryKind::LineString => "LINESTRING",
            GeometryKind::Polygon => "POLYGON",
            GeometryKind::MultiPolygon => "MULTIPOLYGON",
        }
    }
}

impl std::fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A geometry value with its coordinate reference system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srid: Option<Srid>,
    pub shape: Shape,
}

impl Geometry {
    pub fn point(x: f64, y: f64) -> Self {
        Self {
            srid: None,
            shape: Shape::Point(Coord::new(x, y)),
        }
    }

    pub fn line_string(coords: Vec<Coord>) -> Self {
        Self {
            srid: None,
            shape: Shape::LineString(coords),
        }
    }

    pub fn polygon(exterior: Vec<Coord>) -> Self {
        Self {
            srid: None,
            shape: Shape::Polygon(Polygon::new(exterior)),
        }
    }

    pub fn multi_polygon(polygons: Vec<Polygon>) -> Self {
        Self {
            srid: None,
            shape: Shape::MultiPolygon(polygons),
        }
    }

    /// Tag the value with a coordinate reference system.
    pub fn with_srid(mut self, srid: Srid) -> Self {
        self.srid = Some(srid);
        self
    }

    pub fn kind(&self) -> GeometryKind {
        match self.shape {
            Shape::Point(_) => GeometryKind::Point,
            Shape::LineString(_) => GeometryKind::LineString,
            Shape::Polygon(_) => GeometryKind::Polygon,
            Shape::MultiPolygon(_) => GeometryKind::MultiPolygon,
        }
    }

    /// Check structural soundness: finite coordinates, lines with at least two
    /// points, closed rings with at least four points.
    pub fn validate(&self) -> GridResult<()> {
        fn check_ring(ring: &[Coord]) -> GridResult<()> {
            if ring.len() < 4 {
                return Err(GridError::InvalidGeometry(format!(
                    "polygon ring needs at least 4 coordinates, got {}",
                    ring.len()
                )));
            }
            if ring.first() != ring.last() {
                return Err(GridError::InvalidGeometry(
                    "polygon ring is not closed".to_string(),
                ));
            }
            Ok(())
        }

        if !self.coords().all(|c| c.is_finite()) {
            return Err(GridError::InvalidGeometry(
                "non-finite coordinate".to_string(),
            ));
        }
        match &self.shape {
            Shape::Point(_) => Ok(()),
            Shape::LineString(coords) if coords.len() < 2 => Err(GridError::InvalidGeometry(
                format!("line needs at least 2 coordinates, got {}", coords.len()),
            )),
            Shape::LineString(_) => Ok(()),
            Shape::Polygon(polygon) => polygon.rings().try_for_each(check_ring),
            Shape::MultiPolygon(polygons) if polygons.is_empty() => Err(
                GridError::InvalidGeometry("multipolygon has no members".to_string()),
            ),
            Shape::MultiPolygon(polygons) => polygons
                .iter()
                .flat_map(|p| p.rings())
                .try_for_each(check_ring),
        }
    }

    fn coords(&self) -> Box<dyn Iterator<Item = &Coord> + '_> {
        match &self.shape {
            Shape::Point(c) => Box::new(std::iter::once(c)),
            Shape::LineString(coords) => Box::new(coords.iter()),
            Shape::Polygon(p) => Box::new(p.rings().flatten()),
            Shape::MultiPolygon(ps) => Box::new(ps.iter().flat_map(|p| p.rings()).flatten()),
        }
    }

    /// Haversine length in km of a WGS84 line. `None` for other shapes or when
    /// the CRS is not WGS84.
    pub fn length_km(&self) -> Option<f64> {
        match (&self.shape, self.srid) {
            (Shape::LineString(coords), Some(Srid::WGS84)) => Some(
                coords
                    .windows(2)
                    .map(|w| haversine_km(&w[0], &w[1]))
                    .sum(),
            ),
            _ => None,
        }
    }

    fn parts(&self) -> Vec<Part<'_>> {
        match &self.shape {
            Shape::Point(c) => vec![Part::Point(*c)],
            Shape::LineString(coords) => vec![Part::Line(coords)],
            Shape::Polygon(p) => vec![Part::Area(p)],
            Shape::MultiPolygon(ps) => ps.iter().map(Part::Area).collect(),
        }
    }
}

fn haversine_km(a: &Coord, b: &Coord) -> f64 {
    let (lat1, lat2) = (a.y.to_radians(), b.y.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.x - a.x).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Declared geometry column of an entity: required shape and CRS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpatialAttribute {
    pub entity: &'static str,
    pub kind: GeometryKind,
    /// `None` marks legacy columns stored without SRID.
    pub srid: Option<Srid>,
}

impl SpatialAttribute {
    pub const fn new(entity: &'static str, kind: GeometryKind, srid: Option<Srid>) -> Self {
        Self { entity, kind, srid }
    }

    /// Validate `geometry` against this declaration, stamping the declared
    /// SRID onto values that carry none.
    pub fn conform(&self, geometry: &mut Geometry) -> GridResult<()> {
        if geometry.kind() != self.kind {
            return Err(GridError::GeometryShapeMismatch {
                entity: self.entity,
                expected: self.kind,
                found: geometry.kind(),
            });
        }
        geometry.validate()?;
        match (self.srid, geometry.srid) {
            (Some(expected), Some(found)) if expected != found => Err(GridError::SridMismatch {
                entity: self.entity,
                expected,
                found,
            }),
            (Some(expected), None) => {
                geometry.srid = Some(expected);
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Implemented by every entity that carries a geometry column.
pub trait Spatial {
    const GEOMETRY: SpatialAttribute;

    fn geometry(&self) -> Option<&Geometry>;

    fn geometry_mut(&mut self) -> Option<&mut Geometry>;

    /// Conform the entity's geometry (if any) to its declaration.
    fn conform_geometry(&mut self) -> GridResult<()> {
        match self.geometry_mut() {
            Some(geometry) => Self::GEOMETRY.conform(geometry),
            None => Ok(()),
        }
    }
}

/// Spatial-overlap capability used to link events and layers to subsections.
pub trait SpatialOverlap: Send + Sync {
    /// True iff the two geometries intersect under their CRS.
    fn intersects(&self, a: &Geometry, b: &Geometry) -> GridResult<bool>;
}

/// Planar intersection test (segment crossings plus point-in-ring).
#[derive(Debug, Clone, Copy)]
pub struct PlanarOverlap {
    /// Coordinate tolerance for touching tests.
    pub tolerance: f64,
}

impl Default for PlanarOverlap {
    fn default() -> Self {
        Self { tolerance: 1e-9 }
    }
}

enum Part<'a> {
    Point(Coord),
    Line(&'a [Coord]),
    Area(&'a Polygon),
}

impl SpatialOverlap for PlanarOverlap {
    fn intersects(&self, a: &Geometry, b: &Geometry) -> GridResult<bool> {
        if let (Some(sa), Some(sb)) = (a.srid, b.srid) {
            if sa != sb {
                return Err(GridError::SridMismatch {
                    entity: "overlap query",
                    expected: sa,
                    found: sb,
                });
            }
        }
        let b_parts = b.parts();
        Ok(a
            .parts()
            .iter()
            .any(|pa| b_parts.iter().any(|pb| self.part_intersects(pa, pb))))
    }
}

impl PlanarOverlap {
    fn part_intersects(&self, a: &Part<'_>, b: &Part<'_>) -> bool {
        match (a, b) {
            (Part::Point(p), Part::Point(q)) => p.distance(q) <= self.tolerance,
            (Part::Point(p), Part::Line(line)) | (Part::Line(line), Part::Point(p)) => line
                .windows(2)
                .any(|s| self.on_segment(p, &s[0], &s[1])),
            (Part::Point(p), Part::Area(poly)) | (Part::Area(poly), Part::Point(p)) => {
                self.point_in_polygon(p, poly)
            }
            (Part::Line(l1), Part::Line(l2)) => l1.windows(2).any(|s| {
                l2.windows(2)
                    .any(|t| self.segments_intersect(&s[0], &s[1], &t[0], &t[1]))
            }),
            (Part::Line(line), Part::Area(poly)) | (Part::Area(poly), Part::Line(line)) => {
                line.iter().any(|c| self.point_in_polygon(c, poly))
                    || self.crosses_boundary(line, poly)
            }
            (Part::Area(p1), Part::Area(p2)) => {
                p1.rings().any(|ring| self.crosses_boundary(ring, p2))
                    || p1
                        .exterior
                        .first()
                        .is_some_and(|c| self.point_in_polygon(c, p2))
                    || p2
                        .exterior
                        .first()
                        .is_some_and(|c| self.point_in_polygon(c, p1))
            }
        }
    }

    fn crosses_boundary(&self, path: &[Coord], poly: &Polygon) -> bool {
        path.windows(2).any(|s| {
            poly.rings().any(|ring| {
                ring.windows(2)
                    .any(|t| self.segments_intersect(&s[0], &s[1], &t[0], &t[1]))
            })
        })
    }

    /// Inside the exterior ring (or on any ring) and not strictly inside a hole.
    fn point_in_polygon(&self, p: &Coord, poly: &Polygon) -> bool {
        if poly
            .rings()
            .any(|ring| ring.windows(2).any(|s| self.on_segment(p, &s[0], &s[1])))
        {
            return true;
        }
        ring_contains(&poly.exterior, p) && !poly.interiors.iter().any(|h| ring_contains(h, p))
    }

    fn on_segment(&self, p: &Coord, a: &Coord, b: &Coord) -> bool {
        let cross = orientation(a, b, p);
        let len = a.distance(b).max(self.tolerance);
        if (cross / len).abs() > self.tolerance {
            return false;
        }
        p.x >= a.x.min(b.x) - self.tolerance
            && p.x <= a.x.max(b.x) + self.tolerance
            && p.y >= a.y.min(b.y) - self.tolerance
            && p.y <= a.y.max(b.y) + self.tolerance
    }

    fn segments_intersect(&self, p1: &Coord, p2: &Coord, q1: &Coord, q2: &Coord) -> bool {
        let d1 = orientation(q1, q2, p1);
        let d2 = orientation(q1, q2, p2);
        let d3 = orientation(p1, p2, q1);
        let d4 = orientation(p1, p2, q2);
        if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
            && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
        {
            return true;
        }
        self.on_segment(p1, q1, q2)
            || self.on_segment(p2, q1, q2)
            || self.on_segment(q1, p1, p2)
            || self.on_segment(q2, p1, p2)
    }
}

/// Cross product of (b - a) x (c - a).
fn orientation(a: &Coord, b: &Coord, c: &Coord) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// Even-odd ray casting.
fn ring_contains(ring: &[Coord], p: &Coord) -> bool {
    let mut inside = false;
    for w in ring.windows(2) {
        let (a, b) = (&w[0], &w[1]);
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if p.x < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}
