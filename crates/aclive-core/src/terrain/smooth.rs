//! Mask-aware moving average over the slope grid.

use crate::grid::{Grid, SlopeGrid, ValidityMask};

/// Smoothing window in pixels: `ceil(window_m / step)`, at least 3, odd.
pub fn window_pixels(window_m: f64, step: f64) -> usize {
    let raw = (window_m / step).ceil();
    let mut px = if raw.is_finite() && raw > 3.0 { raw as usize } else { 3 };
    if px % 2 == 0 {
        px += 1;
    }
    px
}

/// Box sum along rows then columns, edges extended with the nearest cell.
fn box_sum(src: &Grid<f64>, size: usize) -> Grid<f64> {
    let (w, h) = (src.width, src.height);
    let half = (size / 2) as i64;
    let clamp = |i: i64, n: usize| i.clamp(0, n as i64 - 1) as usize;

    let mut rows = Grid::new(w, h, 0.0);
    for r in 0..h {
        for c in 0..w {
            let s: f64 = (-half..=half).map(|d| src.get(r, clamp(c as i64 + d, w))).sum();
            rows.set(r, c, s);
        }
    }
    let mut out = Grid::new(w, h, 0.0);
    for r in 0..h {
        for c in 0..w {
            let s: f64 = (-half..=half).map(|d| rows.get(clamp(r as i64 + d, h), c)).sum();
            out.set(r, c, s);
        }
    }
    out
}

/// Mean of the mask-valid defined slope values in a `window_px` square
/// around each cell. Cells with no contributing neighbour are `None`.
pub fn smooth_slope(slope: &SlopeGrid, mask: &ValidityMask, window_px: usize) -> SlopeGrid {
    let (w, h) = (slope.width, slope.height);
    if w == 0 || h == 0 {
        return Grid::new(w, h, None);
    }

    let mut weighted = Grid::new(w, h, 0.0);
    let mut count = Grid::new(w, h, 0.0);
    for i in 0..slope.data.len() {
        if let (true, Some(v)) = (mask.data[i], slope.data[i]) {
            weighted.data[i] = v;
            count.data[i] = 1.0;
        }
    }

    let num = box_sum(&weighted, window_px);
    let den = box_sum(&count, window_px);
    let mut out = Grid::new(w, h, None);
    for i in 0..out.data.len() {
        if den.data[i] > 0.0 {
            out.data[i] = Some(num.data[i] / den.data[i]);
        }
    }
    out
}
