//! Region polygon in (lon, lat) order.

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{Error, Result};

const MIN_AREA: f64 = 1e-12;

/// A simple polygon. The ring is implicitly closed: a trailing vertex equal to
/// the first is dropped on construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Polygon {
    vertices: Vec<(f64, f64)>,
}

/// Axis-aligned bounds of a polygon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl Polygon {
    pub fn new(vertices: &[(f64, f64)]) -> Result<Self> {
        let mut vertices = vertices.to_vec();
        if vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }

        if vertices.len() < 3 {
            return Err(Error::InvalidRegion(format!(
                "a polygon needs at least 3 vertices, got {}",
                vertices.len()
            )));
        }

        for &(lon, lat) in &vertices {
            if !lon.is_finite() || !lat.is_finite() {
                return Err(Error::InvalidRegion(format!(
                    "non-finite coordinate ({}, {})",
                    lon, lat
                )));
            }
            if lat.abs() > 90.0 {
                return Err(Error::InvalidRegion(format!(
                    "latitude {} is out of range in ({}, {}); vertices must be (lon, lat), are they swapped?",
                    lat, lon, lat
                )));
            }
            if lon.abs() > 180.0 {
                return Err(Error::InvalidRegion(format!(
                    "longitude {} is out of range in ({}, {})",
                    lon, lon, lat
                )));
            }
        }

        if let Some((a, b)) = first_crossing(&vertices) {
            return Err(Error::InvalidRegion(format!(
                "edges {} and {} intersect; list the vertices in ring order",
                a, b
            )));
        }

        if signed_area(&vertices).abs() < MIN_AREA {
            return Err(Error::InvalidRegion(
                "polygon has no area; its vertices are collinear or repeated".to_string(),
            ));
        }

        Ok(Polygon { vertices })
    }

    pub fn vertices(&self) -> &[(f64, f64)] {
        &self.vertices
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let mut bbox = BoundingBox {
            min_lon: f64::INFINITY,
            min_lat: f64::INFINITY,
            max_lon: f64::NEG_INFINITY,
            max_lat: f64::NEG_INFINITY,
        };
        for &(lon, lat) in self.vertices() {
            bbox.min_lon = bbox.min_lon.min(lon);
            bbox.min_lat = bbox.min_lat.min(lat);
            bbox.max_lon = bbox.max_lon.max(lon);
            bbox.max_lat = bbox.max_lat.max(lat);
        }
        bbox
    }

    /// GeoJSON geometry with an explicitly closed ring.
    pub fn to_geojson(&self) -> Value {
        let mut ring: Vec<[f64; 2]> = self.vertices.iter().map(|&(x, y)| [x, y]).collect();
        ring.push(ring[0]);
        json!({ "type": "Polygon", "coordinates": [ring] })
    }
}

// Shoelace formula, in square degrees.
fn signed_area(vertices: &[(f64, f64)]) -> f64 {
    let n = vertices.len();
    let twice: f64 = (0..n)
        .map(|i| {
            let (x1, y1) = vertices[i];
            let (x2, y2) = vertices[(i + 1) % n];
            x1 * y2 - x2 * y1
        })
        .sum();
    twice / 2.0
}

// Returns the indices of the first pair of non-adjacent edges that touch.
fn first_crossing(vertices: &[(f64, f64)]) -> Option<(usize, usize)> {
    let n = vertices.len();
    let edge = |i: usize| (vertices[i], vertices[(i + 1) % n]);

    for i in 0..n {
        for j in (i + 1)..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            if adjacent {
                continue;
            }
            let (p1, p2) = edge(i);
            let (q1, q2) = edge(j);
            if segments_intersect(p1, p2, q1, q2) {
                return Some((i, j));
            }
        }
    }
    None
}

fn orientation(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> f64 {
    (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0)
}

fn on_segment(a: (f64, f64), b: (f64, f64), p: (f64, f64)) -> bool {
    p.0 >= a.0.min(b.0) && p.0 <= a.0.max(b.0) && p.1 >= a.1.min(b.1) && p.1 <= a.1.max(b.1)
}

fn segments_intersect(p1: (f64, f64), p2: (f64, f64), q1: (f64, f64), q2: (f64, f64)) -> bool {
    let d1 = orientation(q1, q2, p1);
    let d2 = orientation(q1, q2, p2);
    let d3 = orientation(p1, p2, q1);
    let d4 = orientation(p1, p2, q2);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    (d1 == 0.0 && on_segment(q1, q2, p1))
        || (d2 == 0.0 && on_segment(q1, q2, p2))
        || (d3 == 0.0 && on_segment(p1, p2, q1))
        || (d4 == 0.0 && on_segment(p1, p2, q2))
}
