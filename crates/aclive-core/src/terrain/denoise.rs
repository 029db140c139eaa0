//! 3×3 median filter over elevation.

use crate::grid::Grid;

/// Median of the 3×3 neighbourhood of every cell.
///
/// Undefined cells take part as 0 m and stay undefined in the output.
/// Border cells repeat the nearest edge row/column.
pub fn median3x3(elev: &Grid<Option<f64>>) -> Grid<Option<f64>> {
    let (w, h) = (elev.width, elev.height);
    let mut out = Grid::new(w, h, None);
    if w == 0 || h == 0 {
        return out;
    }

    let filled = elev.map(|v| v.unwrap_or(0.0));
    let mut window = [0.0f64; 9];
    for r in 0..h {
        for c in 0..w {
            if elev.get(r, c).is_none() {
                continue;
            }
            let mut k = 0;
            for dr in -1i64..=1 {
                let rr = (r as i64 + dr).clamp(0, h as i64 - 1) as usize;
                for dc in -1i64..=1 {
                    let cc = (c as i64 + dc).clamp(0, w as i64 - 1) as usize;
                    window[k] = filled.get(rr, cc);
                    k += 1;
                }
            }
            window.sort_by(f64::total_cmp);
            out.set(r, c, Some(window[4]));
        }
    }
    out
}
