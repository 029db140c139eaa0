//! Slope from the parcel vertices alone.
//!
//! Used when no elevation grid can be sampled: a least-squares plane
//! through the projected vertices gives the mean angle, the steepest
//! vertex pair gives an upper bound.

use serde::Serialize;

use crate::coords::{altitude_range, GeoVertex};
use crate::error::Result;
use crate::projection::{LocalProjection, PlaneFrame};

/// Altitude span (m) below which the vertices carry no usable relief.
pub const MIN_RELIEF_M: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VertexSlope {
    /// Angle of the best-fit plane, degrees.
    pub mean_deg: f64,
    /// Steepest angle between any two vertices, degrees.
    pub max_deg: f64,
}

/// Cramer's rule for `A·x = b`; `None` when `|det A| < 1e-9`.
fn solve_3x3(a: [[f64; 3]; 3], b: [f64; 3]) -> Option<[f64; 3]> {
    let det3 = |m: [[f64; 3]; 3]| {
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    };
    let det = det3(a);
    if det.abs() < 1e-9 {
        return None;
    }
    let mut x = [0.0; 3];
    for (k, xk) in x.iter_mut().enumerate() {
        let mut m = a;
        for row in 0..3 {
            m[row][k] = b[row];
        }
        *xk = det3(m) / det;
    }
    Some(x)
}

/// Least-squares plane `z = a·x + b·y + c`; `None` for degenerate input.
pub fn fit_plane(points: &[(f64, f64, f64)]) -> Option<(f64, f64, f64)> {
    if points.len() < 3 {
        return None;
    }
    let n = points.len() as f64;
    let (mut sx, mut sy, mut sz) = (0.0, 0.0, 0.0);
    let (mut sxx, mut syy, mut sxy, mut sxz, mut syz) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for &(x, y, z) in points {
        sx += x;
        sy += y;
        sz += z;
        sxx += x * x;
        syy += y * y;
        sxy += x * y;
        sxz += x * z;
        syz += y * z;
    }
    let [a, b, c] = solve_3x3(
        [[sxx, sxy, sx], [sxy, syy, sy], [sx, sy, n]],
        [sxz, syz, sz],
    )?;
    Some((a, b, c))
}

/// Mean (plane fit) and maximum (pairwise) slope of planar points with
/// altitude.
pub fn slope_from_points(points: &[(f64, f64, f64)]) -> VertexSlope {
    let mean_deg = fit_plane(points)
        .map(|(a, b, _)| (a * a + b * b).sqrt().atan().to_degrees())
        .unwrap_or(0.0);

    let mut max_deg = 0.0f64;
    for (i, &(x1, y1, z1)) in points.iter().enumerate() {
        for &(x2, y2, z2) in &points[i + 1..] {
            let dist = (x2 - x1).hypot(y2 - y1);
            if dist > 0.0 {
                max_deg = max_deg.max(((z2 - z1).abs() / dist).atan().to_degrees());
            }
        }
    }
    VertexSlope { mean_deg, max_deg }
}

/// Vertex slope on the local tangent plane. `Ok(None)` when the altitudes
/// span less than [`MIN_RELIEF_M`].
pub fn vertex_slope(vertices: &[GeoVertex]) -> Result<Option<VertexSlope>> {
    let frame = PlaneFrame::Local(LocalProjection::centred_on(vertices)?);
    if altitude_range(vertices) <= MIN_RELIEF_M {
        return Ok(None);
    }
    let points: Vec<(f64, f64, f64)> = frame
        .project(vertices)
        .into_iter()
        .zip(vertices)
        .map(|((x, y), v)| (x, y, v.alt_or_zero()))
        .collect();
    Ok(Some(slope_from_points(&points)))
}
