//! Planar parcel polygon.

use geo::{Area, BoundingRect, Coord, EuclideanDistance, LineString, Point, Polygon};

use crate::error::{Result, SlopeError};

/// Axis-aligned bounds in planar metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn span_x(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn span_y(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Bounds grown by `margin` on every side.
    pub fn expanded(&self, margin: f64) -> Self {
        Self {
            min_x: self.min_x - margin,
            min_y: self.min_y - margin,
            max_x: self.max_x + margin,
            max_y: self.max_y + margin,
        }
    }
}

/// Ordered planar vertices, implicitly closed.
///
/// Invariants: at least 3 vertices, no two consecutive vertices equal, and
/// the last vertex differs from the first.
#[derive(Debug, Clone)]
pub struct PlanarPolygon {
    vertices: Vec<(f64, f64)>,
    shape: Polygon<f64>,
}

impl PlanarPolygon {
    /// Build from planar vertices, dropping consecutive duplicates and an
    /// explicit closing vertex.
    pub fn new(points: Vec<(f64, f64)>) -> Result<Self> {
        let mut vertices: Vec<(f64, f64)> = Vec::with_capacity(points.len());
        for p in points {
            if !(p.0.is_finite() && p.1.is_finite()) {
                return Err(SlopeError::InputGeometry(format!(
                    "non-finite planar vertex ({}, {})",
                    p.0, p.1
                )));
            }
            if vertices.last() != Some(&p) {
                vertices.push(p);
            }
        }
        while vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }
        if vertices.len() < 3 {
            return Err(SlopeError::InputGeometry(format!(
                "polygon needs at least 3 vertices, got {}",
                vertices.len()
            )));
        }

        let ring: LineString<f64> = vertices.iter().map(|&(x, y)| Coord { x, y }).collect();
        let shape = Polygon::new(ring, vec![]);
        Ok(Self { vertices, shape })
    }

    pub fn vertices(&self) -> &[(f64, f64)] {
        &self.vertices
    }

    /// Unsigned planar area, m².
    pub fn area_m2(&self) -> f64 {
        self.shape.unsigned_area()
    }

    pub fn area_ha(&self) -> f64 {
        self.area_m2() / 10_000.0
    }

    pub fn bounds(&self) -> Bounds {
        // new() guarantees at least 3 finite vertices, so a rect exists.
        match self.shape.bounding_rect() {
            Some(r) => Bounds {
                min_x: r.min().x,
                min_y: r.min().y,
                max_x: r.max().x,
                max_y: r.max().y,
            },
            None => Bounds { min_x: 0.0, min_y: 0.0, max_x: 0.0, max_y: 0.0 },
        }
    }

    /// Even-odd ray test. Points exactly on an edge may fall either way.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let poly = &self.vertices;
        let mut inside = false;
        let mut j = poly.len() - 1;
        for i in 0..poly.len() {
            let (xi, yi) = poly[i];
            let (xj, yj) = poly[j];
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    /// Euclidean distance from (x, y) to the closest boundary edge.
    pub fn distance_to_boundary(&self, x: f64, y: f64) -> f64 {
        Point::new(x, y).euclidean_distance(self.shape.exterior())
    }
}
