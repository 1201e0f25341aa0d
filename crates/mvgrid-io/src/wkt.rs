//! Extended WKT rendering for geometry columns.

use std::fmt::Write;

use mvgrid_core::{Coord, Geometry, Polygon, Shape};

/// Render as EWKT (`SRID=4326;POINT(9.1 48.7)`); the prefix is omitted when
/// the geometry has no SRID.
pub fn to_wkt(geometry: &Geometry) -> String {
    let mut out = String::new();
    if let Some(srid) = geometry.srid {
        let _ = write!(out, "SRID={};", srid);
    }
    match &geometry.shape {
        Shape::Point(c) => {
            out.push_str("POINT(");
            push_coord(&mut out, c);
            out.push(')');
        }
        Shape::LineString(coords) => {
            out.push_str("LINESTRING");
            push_ring(&mut out, coords);
        }
        Shape::Polygon(polygon) => {
            out.push_str("POLYGON");
            push_polygon(&mut out, polygon);
        }
        Shape::MultiPolygon(polygons) => {
            out.push_str("MULTIPOLYGON(");
            for (i, polygon) in polygons.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                push_polygon(&mut out, polygon);
            }
            out.push(')');
        }
    }
    out
}

fn push_coord(out: &mut String, c: &Coord) {
    let _ = write!(out, "{} {}", c.x, c.y);
}

fn push_ring(out: &mut String, coords: &[Coord]) {
    out.push('(');
    for (i, c) in coords.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_coord(out, c);
    }
    out.push(')');
}

fn push_polygon(out: &mut String, polygon: &Polygon) {
    out.push('(');
    push_ring(out, &polygon.exterior);
    for hole in &polygon.interiors {
        out.push(',');
        push_ring(out, hole);
    }
    out.push(')');
}

#[cfg(test)]
mod tests {
    use super::*;
    use mvgrid_core::Srid;

    #[test]
    fn test_point_with_srid() {
        let p = Geometry::point(9.5, 48.25).with_srid(Srid::WGS84);
        assert_eq!(to_wkt(&p), "SRID=4326;POINT(9.5 48.25)");
    }

    #[test]
    fn test_legacy_line_without_srid() {
        let line = Geometry::line_string(vec![Coord::new(0.0, 0.0), Coord::new(1.0, 2.0)]);
        assert_eq!(to_wkt(&line), "LINESTRING(0 0,1 2)");
    }

    #[test]
    fn test_multipolygon_with_hole() {
        let square = |x: f64, s: f64| {
            vec![
                Coord::new(x, x),
                Coord::new(x + s, x),
                Coord::new(x + s, x + s),
                Coord::new(x, x),
            ]
        };
        let poly = Polygon::new(square(0.0, 4.0)).with_hole(square(1.0, 1.0));
        let mp = Geometry::multi_polygon(vec![poly]);
        assert_eq!(
            to_wkt(&mp),
            "MULTIPOLYGON(((0 0,4 0,4 4,0 0),(1 1,2 1,2 2,1 1)))"
        );
    }
}
