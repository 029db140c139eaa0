//! Spatial reference handling for DEM rasters.
//!
//! Only the references a field DEM realistically carries are understood:
//! geographic lon/lat (WGS84, SIRGAS 2000, NAD83, ETRS89) and UTM zones on
//! WGS84 or SIRGAS 2000. The UTM forward transform follows Snyder (1987),
//! USGS Prof. Paper 1395, pp. 61-64. SIRGAS 2000 uses GRS80, which differs
//! from WGS84 by well under a millimetre at parcel scale, so both share the
//! WGS84 constants.

use serde::Serialize;

// ── WGS84 ellipsoid constants ────────────────────────────────────────────

const A: f64 = 6_378_137.0; // semi-major axis (m)
const F: f64 = 1.0 / 298.257_223_563; // flattening
const E2: f64 = 2.0 * F - F * F; // eccentricity squared
const E_PRIME2: f64 = E2 / (1.0 - E2); // second eccentricity squared
const K0: f64 = 0.9996; // UTM scale factor
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// A UTM zone with its hemisphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UtmZone {
    pub zone: u32,
    pub north: bool,
}

/// Spatial reference of a DEM, classified by EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Crs {
    /// Longitude/latitude in degrees.
    Geographic { epsg: u32 },
    /// UTM easting/northing in metres.
    Utm { epsg: u32, zone: UtmZone },
    /// Anything else; carried so the error message can name it.
    Unsupported { epsg: u32 },
}

impl Crs {
    pub fn from_epsg(epsg: u32) -> Self {
        if is_geographic(epsg) {
            Crs::Geographic { epsg }
        } else if let Some(zone) = parse_utm_epsg(epsg) {
            Crs::Utm { epsg, zone }
        } else {
            Crs::Unsupported { epsg }
        }
    }

    pub fn epsg(&self) -> u32 {
        match *self {
            Crs::Geographic { epsg } | Crs::Utm { epsg, .. } | Crs::Unsupported { epsg } => epsg,
        }
    }
}

/// Lon/lat datums accepted as geographic DEM references.
pub fn is_geographic(epsg: u32) -> bool {
    matches!(epsg, 4326 | 4674 | 4269 | 4258)
}

/// Parse an EPSG code into UTM zone info.
///
/// - EPSG 326xx / 327xx → WGS84 UTM zone xx, North / South
/// - EPSG 31965–31976 → SIRGAS 2000 UTM zones 11N–22N
/// - EPSG 31977–31985 → SIRGAS 2000 UTM zones 17S–25S
pub fn parse_utm_epsg(epsg: u32) -> Option<UtmZone> {
    match epsg {
        32601..=32660 => Some(UtmZone { zone: epsg - 32600, north: true }),
        32701..=32760 => Some(UtmZone { zone: epsg - 32700, north: false }),
        31965..=31976 => Some(UtmZone { zone: epsg - 31954, north: true }),
        31977..=31985 => Some(UtmZone { zone: epsg - 31960, north: false }),
        _ => None,
    }
}

/// Convert WGS84 (longitude, latitude) in degrees to UTM (easting, northing)
/// in metres for the given zone.
pub fn wgs84_to_utm(lon_deg: f64, lat_deg: f64, zone: UtmZone) -> (f64, f64) {
    let lat = lat_deg.to_radians();
    let lon = lon_deg.to_radians();

    let lon0 = ((zone.zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians();

    let sin_lat = lat.sin();
    let cos_lat = lat.cos();
    let tan_lat = lat.tan();

    let n = A / (1.0 - E2 * sin_lat * sin_lat).sqrt();
    let t = tan_lat * tan_lat;
    let c = E_PRIME2 * cos_lat * cos_lat;
    let a_coeff = cos_lat * (lon - lon0);
    let m = meridional_arc(lat);

    let a2 = a_coeff * a_coeff;
    let a4 = a2 * a2;
    let a6 = a4 * a2;

    // Snyder eq. 8-9
    let easting = K0 * n
        * (a_coeff
            + (1.0 - t + c) * a2 * a_coeff / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * E_PRIME2) * a4 * a_coeff / 120.0)
        + FALSE_EASTING;

    // Snyder eq. 8-10
    let northing = K0
        * (m + n
            * tan_lat
            * (a2 / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * E_PRIME2) * a6 / 720.0));

    if zone.north {
        (easting, northing)
    } else {
        (easting, northing + FALSE_NORTHING_SOUTH)
    }
}

/// Meridional arc from the equator to `lat` (radians). Snyder eq. 3-21.
fn meridional_arc(lat: f64) -> f64 {
    let e2 = E2;
    let e4 = e2 * e2;
    let e6 = e4 * e2;

    A * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat
        - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat).sin()
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat).sin()
        - (35.0 * e6 / 3072.0) * (6.0 * lat).sin())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, tol: f64, msg: &str) {
        let diff = (a - b).abs();
        assert!(diff < tol, "{msg}: expected {b}, got {a}, diff {diff} exceeds {tol}");
    }

    #[test]
    fn classifies_epsg_codes() {
        assert_eq!(Crs::from_epsg(4326), Crs::Geographic { epsg: 4326 });
        assert_eq!(
            Crs::from_epsg(32722),
            Crs::Utm { epsg: 32722, zone: UtmZone { zone: 22, north: false } }
        );
        assert_eq!(Crs::from_epsg(3857), Crs::Unsupported { epsg: 3857 });
        assert_eq!(Crs::from_epsg(3857).epsg(), 3857);
    }

    #[test]
    fn sirgas_utm_zones() {
        assert_eq!(parse_utm_epsg(31982), Some(UtmZone { zone: 22, north: false }));
        assert_eq!(parse_utm_epsg(31977), Some(UtmZone { zone: 17, north: false }));
        assert_eq!(parse_utm_epsg(31976), Some(UtmZone { zone: 22, north: true }));
        assert_eq!(parse_utm_epsg(31965), Some(UtmZone { zone: 11, north: true }));
        assert_eq!(parse_utm_epsg(32600), None);
        assert_eq!(parse_utm_epsg(32761), None);
    }

    #[test]
    fn central_meridian_north() {
        // Zone 30 central meridian is 3°W. Reference from PROJ: (500000, 4427757.22).
        let (e, n) = wgs84_to_utm(-3.0, 40.0, UtmZone { zone: 30, north: true });
        assert_close(e, 500_000.0, 0.01, "easting");
        assert_close(n, 4_427_757.22, 0.05, "northing");
    }

    #[test]
    fn central_meridian_south() {
        // Zone 22 central meridian is 51°W.
        let (e, n) = wgs84_to_utm(-51.0, -15.0, UtmZone { zone: 22, north: false });
        assert_close(e, 500_000.0, 0.01, "easting");
        assert_close(n, 8_341_674.01, 0.05, "northing");
    }

    #[test]
    fn east_of_meridian_increases_easting() {
        let zone = UtmZone { zone: 22, north: false };
        let (e0, _) = wgs84_to_utm(-51.0, -15.0, zone);
        let (e1, _) = wgs84_to_utm(-50.99, -15.0, zone);
        // 0.01° of longitude at 15°S ≈ 1075 m, scaled by k0.
        assert_close(e1 - e0, 1075.0, 1.0, "easting delta");
    }
}
