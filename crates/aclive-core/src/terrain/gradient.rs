//! Slope percent from finite differences.
//!
//! Along each axis the derivative uses a central difference when both
//! neighbours have a defined elevation, a one-sided difference when only
//! one does, and zero when neither does.

use crate::grid::{Grid, SlopeGrid, ValidityMask};

/// dz along one axis at index `i` of a line with accessor `z`.
fn axis_derivative(z: impl Fn(usize) -> Option<f64>, i: usize, len: usize, step: f64) -> f64 {
    let here = z(i);
    let prev = if i > 0 { z(i - 1) } else { None };
    let next = if i + 1 < len { z(i + 1) } else { None };
    match (prev, here, next) {
        (Some(p), _, Some(n)) => (n - p) / (2.0 * step),
        (None, Some(h), Some(n)) => (n - h) / step,
        (Some(p), Some(h), None) => (h - p) / step,
        _ => 0.0,
    }
}

/// `(dz/dx, dz/dy)` at `(r, c)`; x grows with column, y with row.
pub fn gradient_at(elev: &Grid<Option<f64>>, r: usize, c: usize, step: f64) -> (f64, f64) {
    let dz_dx = axis_derivative(|cc| elev.get(r, cc), c, elev.width, step);
    let dz_dy = axis_derivative(|rr| elev.get(rr, c), r, elev.height, step);
    (dz_dx, dz_dy)
}

/// Slope percent (`100·tan θ`) for every mask cell with a finite elevation.
/// All other cells are `None`.
pub fn slope_percent(elev: &Grid<Option<f64>>, mask: &ValidityMask, step: f64) -> SlopeGrid {
    let defined = elev.map(|v| v.filter(|z| z.is_finite()));
    let mut out = Grid::new(elev.width, elev.height, None);
    for r in 0..elev.height {
        for c in 0..elev.width {
            if !mask.get(r, c) || defined.get(r, c).is_none() {
                continue;
            }
            let (dz_dx, dz_dy) = gradient_at(&defined, r, c, step);
            let theta = (dz_dx * dz_dx + dz_dy * dz_dy).sqrt().atan();
            out.set(r, c, Some(100.0 * theta.tan()));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn plane(w: usize, h: usize, step: f64, a: f64, b: f64) -> Grid<Option<f64>> {
        let mut g = Grid::new(w, h, None);
        for r in 0..h {
            for c in 0..w {
                let (x, y) = (c as f64 * step, r as f64 * step);
                g.set(r, c, Some(a * x + b * y + 100.0));
            }
        }
        g
    }

    #[test]
    fn flat_is_zero() {
        let elev = Grid::new(6, 5, Some(10.0));
        let mask = Grid::new(6, 5, true);
        let s = slope_percent(&elev, &mask, 5.0);
        assert!(s.data.iter().all(|v| *v == Some(0.0)));
    }

    #[test]
    fn tilted_plane_matches_analytic_slope() {
        let (a, b) = (0.03, -0.04);
        let elev = plane(12, 10, 5.0, a, b);
        let mask = Grid::new(12, 10, true);
        let s = slope_percent(&elev, &mask, 5.0);
        for v in &s.data {
            assert_abs_diff_eq!(v.unwrap(), 5.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn outside_mask_and_holes_are_undefined() {
        let mut elev = plane(5, 5, 10.0, 0.1, 0.0);
        elev.set(2, 2, None);
        let mut mask = Grid::new(5, 5, true);
        mask.set(0, 0, false);
        let s = slope_percent(&elev, &mask, 10.0);
        assert_eq!(s.get(0, 0), None);
        assert_eq!(s.get(2, 2), None);
        // Neighbour of the hole falls back to a one-sided difference.
        assert_abs_diff_eq!(s.get(2, 1).unwrap(), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn isolated_cell_has_zero_gradient() {
        let mut elev = Grid::new(3, 3, None);
        elev.set(1, 1, Some(42.0));
        let mask = Grid::new(3, 3, true);
        let s = slope_percent(&elev, &mask, 10.0);
        assert_eq!(s.get(1, 1), Some(0.0));
        assert_eq!(s.data.iter().filter(|v| v.is_some()).count(), 1);
    }

    #[test]
    fn non_finite_elevation_is_a_hole() {
        let mut elev = Grid::new(3, 1, Some(1.0));
        elev.set(0, 1, Some(f64::NAN));
        let mask = Grid::new(3, 1, true);
        let s = slope_percent(&elev, &mask, 1.0);
        assert_eq!(s.get(0, 1), None);
        assert_eq!(s.get(0, 0), Some(0.0));
    }
}
