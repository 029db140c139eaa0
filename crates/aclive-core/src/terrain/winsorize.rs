//! Percentile clipping of the smoothed slope grid.

use crate::grid::{valid_values, SlopeGrid, ValidityMask};

/// Clamp every defined cell to the `p`-th / `(100 − p)`-th percentile of
/// the mask-valid values. No-op for `p ≤ 0` or when nothing is valid.
///
/// Bounds are order statistics (lower sample for the low bound, upper
/// sample for the high bound), not the linearly interpolated percentiles
/// of [`crate::stats::percentile_of`]. They can therefore differ from an
/// interpolated percentile by up to one sample gap, and a second pass at
/// the same `p` finds the same bounds and changes nothing.
pub fn winsorize(slope: &SlopeGrid, mask: &ValidityMask, p: f64) -> SlopeGrid {
    if !(p > 0.0) {
        return slope.clone();
    }
    let mut values = valid_values(slope, mask);
    if values.is_empty() {
        return slope.clone();
    }
    values.sort_by(f64::total_cmp);

    let p = p.min(50.0);
    let last = (values.len() - 1) as f64;
    let low = values[(p / 100.0 * last).floor() as usize];
    let high = values[((100.0 - p) / 100.0 * last).ceil() as usize];
    slope.map(|v| v.map(|s| s.clamp(low, high)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;

    fn ramp(n: usize) -> SlopeGrid {
        let mut g = Grid::new(n, 1, None);
        for c in 0..n {
            g.set(0, c, Some(c as f64));
        }
        g
    }

    #[test]
    fn clips_both_tails() {
        let slope = ramp(101);
        let mask = Grid::new(101, 1, true);
        let out = winsorize(&slope, &mask, 5.0);
        assert_eq!(out.get(0, 0), Some(5.0));
        assert_eq!(out.get(0, 100), Some(95.0));
        assert_eq!(out.get(0, 50), Some(50.0));
    }

    #[test]
    fn idempotent() {
        let mut slope = ramp(37);
        slope.set(0, 36, Some(400.0));
        let mask = Grid::new(37, 1, true);
        for p in [1.0, 7.5, 10.0, 33.0, 49.0] {
            let once = winsorize(&slope, &mask, p);
            let twice = winsorize(&once, &mask, p);
            assert_eq!(once, twice, "p = {p}");
        }
    }

    #[test]
    fn disabled_or_empty_is_noop() {
        let slope = ramp(10);
        let mask = Grid::new(10, 1, true);
        assert_eq!(winsorize(&slope, &mask, 0.0), slope);
        let none = Grid::new(10, 1, false);
        assert_eq!(winsorize(&slope, &none, 5.0), slope);
    }

    #[test]
    fn bounds_come_from_mask_cells_only() {
        let slope = ramp(11);
        let mut mask = Grid::new(11, 1, false);
        for c in 0..5 {
            mask.set(0, c, true);
        }
        let out = winsorize(&slope, &mask, 25.0);
        // Valid values 0..=4: P25 = 1, P75 = 3.
        assert_eq!(out.get(0, 0), Some(1.0));
        assert_eq!(out.get(0, 10), Some(3.0));
    }
}
