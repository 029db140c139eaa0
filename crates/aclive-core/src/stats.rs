//! Percentiles over the valid slope cells.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{Result, SlopeError};
use crate::grid::{valid_values, SlopeGrid, ValidityMask};
use crate::params::REPORTED_RANKS;

/// Linear-interpolation percentile of an ascending, non-empty sample.
/// `p` is clamped to [0, 100].
pub fn percentile_of(sorted: &[f64], p: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let last = sorted.len() - 1;
    let pos = p.clamp(0.0, 100.0) / 100.0 * last as f64;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(last);
    let frac = pos - lo as f64;
    sorted[lo] + frac * (sorted[hi] - sorted[lo])
}

/// Sorted sample of the valid cells, queried at any rank.
#[derive(Debug, Clone)]
pub struct SlopeSample {
    sorted: Vec<f64>,
}

impl SlopeSample {
    /// Collect mask-valid defined cells. Empty → `NoValidPixels`.
    pub fn from_grid(slope: &SlopeGrid, mask: &ValidityMask) -> Result<Self> {
        let mut sorted = valid_values(slope, mask);
        if sorted.is_empty() {
            return Err(SlopeError::NoValidPixels(
                "no valid slope cells for percentile computation".into(),
            ));
        }
        sorted.sort_by(f64::total_cmp);
        Ok(Self { sorted })
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    pub fn percentile(&self, p: f64) -> f64 {
        percentile_of(&self.sorted, p)
    }

    pub fn table(&self) -> PercentileTable {
        PercentileTable {
            values: REPORTED_RANKS
                .iter()
                .map(|&rank| (rank, self.percentile(rank as f64)))
                .collect(),
        }
    }
}

/// Slope percent at ranks 50, 70, 80, 85, 90 and 95.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PercentileTable {
    values: BTreeMap<u8, f64>,
}

impl PercentileTable {
    pub fn get(&self, rank: u8) -> Option<f64> {
        self.values.get(&rank).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, f64)> + '_ {
        self.values.iter().map(|(&k, &v)| (k, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;
    use approx::assert_abs_diff_eq;

    #[test]
    fn linear_interpolation() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile_of(&v, 0.0), 1.0);
        assert_eq!(percentile_of(&v, 100.0), 4.0);
        assert_abs_diff_eq!(percentile_of(&v, 50.0), 2.5);
        assert_abs_diff_eq!(percentile_of(&v, 80.0), 3.4, epsilon = 1e-12);
        assert_eq!(percentile_of(&[7.0], 95.0), 7.0);
    }

    #[test]
    fn table_is_monotone() {
        // Scrambled values with repeats.
        let raw = [9.0, 0.5, 3.3, 3.3, 17.0, 2.2, 0.0, 11.1, 6.4, 6.4, 40.0, 1.0, 5.5];
        let mut g = Grid::new(raw.len(), 1, None);
        for (c, v) in raw.iter().enumerate() {
            g.set(0, c, Some(*v));
        }
        let mask = Grid::new(raw.len(), 1, true);
        let table = SlopeSample::from_grid(&g, &mask).unwrap().table();
        let ranked: Vec<f64> = table.iter().map(|(_, v)| v).collect();
        assert_eq!(ranked.len(), REPORTED_RANKS.len());
        assert!(ranked.windows(2).all(|w| w[0] <= w[1]), "{ranked:?}");
    }

    #[test]
    fn only_mask_cells_count() {
        let mut g = Grid::new(4, 1, Some(100.0));
        g.set(0, 0, Some(1.0));
        g.set(0, 1, None);
        let mut mask = Grid::new(4, 1, false);
        mask.set(0, 0, true);
        mask.set(0, 1, true);
        let sample = SlopeSample::from_grid(&g, &mask).unwrap();
        assert_eq!(sample.len(), 1);
        assert_eq!(sample.table().get(95), Some(1.0));
    }

    #[test]
    fn empty_is_no_valid_pixels() {
        let g = Grid::new(3, 3, None);
        let mask = Grid::new(3, 3, true);
        assert!(matches!(
            SlopeSample::from_grid(&g, &mask),
            Err(SlopeError::NoValidPixels(_))
        ));
    }

    #[test]
    fn table_serializes_by_rank() {
        let g = Grid::new(2, 1, Some(4.0));
        let mask = Grid::new(2, 1, true);
        let json = serde_json::to_value(SlopeSample::from_grid(&g, &mask).unwrap().table()).unwrap();
        assert_eq!(json["80"], 4.0);
    }
}
