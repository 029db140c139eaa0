//! Geographic ↔ planar projection of parcel vertices.
//!
//! The default working plane is a local tangent plane centred on the mean
//! vertex position (equirectangular approximation):
//!   x = R · (λ − λ0) · cos φ0
//!   y = R · (φ − φ0)
//! with R = 6 371 000 m. Over a few kilometres the distortion is far below
//! the DEM's vertical noise. A DEM delivered in UTM is processed in its own
//! zone instead, so the raster needs no resampling.

use serde::Serialize;

use crate::coords::{GeoVertex, LatLon};
use crate::crs::{wgs84_to_utm, UtmZone};
use crate::error::{Result, SlopeError};

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Local tangent plane anchored at (lat0, lon0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LocalProjection {
    /// Anchor latitude, radians.
    pub lat0: f64,
    /// Anchor longitude, radians.
    pub lon0: f64,
    /// cos(lat0), or 1.0 when that is exactly zero.
    pub cos_lat0: f64,
}

impl LocalProjection {
    /// Anchor the plane at the mean latitude/longitude of `vertices`.
    ///
    /// Fails with `InputGeometry` if fewer than 3 distinct vertices are given.
    pub fn centred_on(vertices: &[GeoVertex]) -> Result<Self> {
        ensure_distinct_vertices(vertices)?;
        let n = vertices.len() as f64;
        let lat0 = vertices.iter().map(|v| v.lat.to_radians()).sum::<f64>() / n;
        let lon0 = vertices.iter().map(|v| v.lon.to_radians()).sum::<f64>() / n;
        let cos_lat0 = match lat0.cos() {
            c if c == 0.0 => 1.0,
            c => c,
        };
        Ok(Self { lat0, lon0, cos_lat0 })
    }

    /// (lon, lat) degrees → (x, y) metres.
    pub fn forward(&self, lon_deg: f64, lat_deg: f64) -> (f64, f64) {
        let x = EARTH_RADIUS_M * (lon_deg.to_radians() - self.lon0) * self.cos_lat0;
        let y = EARTH_RADIUS_M * (lat_deg.to_radians() - self.lat0);
        (x, y)
    }

    /// (x, y) metres → geographic position.
    pub fn inverse(&self, x: f64, y: f64) -> LatLon {
        let lat = self.lat0 + y / EARTH_RADIUS_M;
        let lon = self.lon0 + x / (EARTH_RADIUS_M * self.cos_lat0);
        LatLon::new(lat.to_degrees(), lon.to_degrees())
    }
}

/// The planar frame a run works in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum PlaneFrame {
    Local(LocalProjection),
    Utm { epsg: u32, zone: UtmZone },
}

impl PlaneFrame {
    pub fn forward(&self, lon_deg: f64, lat_deg: f64) -> (f64, f64) {
        match self {
            PlaneFrame::Local(p) => p.forward(lon_deg, lat_deg),
            PlaneFrame::Utm { zone, .. } => wgs84_to_utm(lon_deg, lat_deg, *zone),
        }
    }

    /// Project every vertex into this frame.
    pub fn project(&self, vertices: &[GeoVertex]) -> Vec<(f64, f64)> {
        vertices.iter().map(|v| self.forward(v.lon, v.lat)).collect()
    }

    /// EPSG code of the frame, if it has one.
    pub fn epsg(&self) -> Option<u32> {
        match self {
            PlaneFrame::Local(_) => None,
            PlaneFrame::Utm { epsg, .. } => Some(*epsg),
        }
    }
}

/// At least three pairwise-distinct (lon, lat) positions.
pub fn ensure_distinct_vertices(vertices: &[GeoVertex]) -> Result<()> {
    let mut distinct: Vec<(f64, f64)> = Vec::with_capacity(vertices.len());
    for v in vertices {
        if !(v.lon.is_finite() && v.lat.is_finite()) {
            return Err(SlopeError::InputGeometry(format!(
                "non-finite vertex ({}, {})",
                v.lon, v.lat
            )));
        }
        if !distinct.contains(&(v.lon, v.lat)) {
            distinct.push((v.lon, v.lat));
        }
    }
    if distinct.len() < 3 {
        return Err(SlopeError::InputGeometry(format!(
            "polygon needs at least 3 distinct vertices, got {}",
            distinct.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn square() -> Vec<GeoVertex> {
        vec![
            GeoVertex::new(-47.90, -15.80),
            GeoVertex::new(-47.89, -15.80),
            GeoVertex::new(-47.89, -15.79),
            GeoVertex::new(-47.90, -15.79),
        ]
    }

    #[test]
    fn centre_projects_to_origin() {
        let p = LocalProjection::centred_on(&square()).unwrap();
        let (x, y) = p.forward(-47.895, -15.795);
        assert_abs_diff_eq!(x, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn forward_inverse_roundtrip() {
        let p = LocalProjection::centred_on(&square()).unwrap();
        for v in square() {
            let (x, y) = p.forward(v.lon, v.lat);
            let back = p.inverse(x, y);
            assert_abs_diff_eq!(back.lon, v.lon, epsilon = 1e-9);
            assert_abs_diff_eq!(back.lat, v.lat, epsilon = 1e-9);
        }
    }

    #[test]
    fn one_hundredth_degree_of_latitude() {
        let p = LocalProjection::centred_on(&square()).unwrap();
        let (_, y0) = p.forward(-47.9, -15.80);
        let (_, y1) = p.forward(-47.9, -15.79);
        // R · 0.01° in radians ≈ 1111.95 m
        assert_abs_diff_eq!(y1 - y0, 1111.95, epsilon = 0.01);
    }

    #[test]
    fn rejects_two_distinct_vertices() {
        let v = vec![
            GeoVertex::new(0.0, 0.0),
            GeoVertex::new(1.0, 0.0),
            GeoVertex::new(0.0, 0.0),
        ];
        assert!(matches!(
            LocalProjection::centred_on(&v),
            Err(SlopeError::InputGeometry(_))
        ));
    }

    #[test]
    fn utm_frame_reports_epsg() {
        let frame = PlaneFrame::Utm { epsg: 32722, zone: UtmZone { zone: 22, north: false } };
        assert_eq!(frame.epsg(), Some(32722));
        let (e, _) = frame.forward(-51.0, -15.0);
        assert_abs_diff_eq!(e, 500_000.0, epsilon = 0.01);
    }
}
