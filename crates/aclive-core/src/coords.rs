//! Geographic coordinate types.
//! All coordinate math uses f64 for precision.
use serde::{Deserialize, Serialize};

/// A point on the ellipsoid in geographic coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    /// Latitude in degrees, -90 to +90.
    pub lat: f64,
    /// Longitude in degrees, -180 to +180.
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Convert to radians.
    pub fn to_radians(self) -> (f64, f64) {
        (self.lat.to_radians(), self.lon.to_radians())
    }
}

/// One boundary vertex as read from a parcel file: longitude first, as KML
/// stores it, with an optional altitude in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoVertex {
    pub lon: f64,
    pub lat: f64,
    pub alt: Option<f64>,
}

impl GeoVertex {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat, alt: None }
    }

    pub fn with_alt(lon: f64, lat: f64, alt: f64) -> Self {
        Self { lon, lat, alt: Some(alt) }
    }

    pub fn latlon(&self) -> LatLon {
        LatLon::new(self.lat, self.lon)
    }

    /// Altitude, treating a missing value as 0 m.
    pub fn alt_or_zero(&self) -> f64 {
        self.alt.unwrap_or(0.0)
    }
}

/// True if every vertex shares the same altitude once rounded to 0.01 m,
/// which is how KML exports without terrain look.
pub fn altitudes_uniform(vertices: &[GeoVertex]) -> bool {
    let mut rounded = vertices
        .iter()
        .map(|v| (v.alt_or_zero() * 100.0).round() as i64);
    match rounded.next() {
        Some(first) => rounded.all(|a| a == first),
        None => true,
    }
}

/// Altitude range (max − min) over the vertices, metres.
pub fn altitude_range(vertices: &[GeoVertex]) -> f64 {
    let (lo, hi) = vertices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        let a = v.alt_or_zero();
        (lo.min(a), hi.max(a))
    });
    if lo.is_finite() { hi - lo } else { 0.0 }
}
