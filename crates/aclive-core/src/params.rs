//! Run parameters shared by both tools.
//!
//! Ranks are whole percentiles; the operating rank must be one of
//! [`OPERATING_RANKS`].

use serde::{Deserialize, Serialize};

use crate::error::{Result, SlopeError};

/// Percentile ranks reported in every [`crate::stats::PercentileTable`].
pub const REPORTED_RANKS: [u8; 6] = [50, 70, 80, 85, 90, 95];

/// Ranks accepted as the primary operating percentile.
pub const OPERATING_RANKS: [u8; 5] = [70, 80, 85, 90, 95];

/// Tunable parameters of one slope estimation run.
/// Defaults match the batch CLI defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlopeParams {
    /// Primary percentile rank of the smoothed slope (70, 80, 85, 90 or 95).
    pub percentile: u8,
    /// Smoothing window in metres, default 50.
    pub smoothing_window_m: f64,
    /// Machinery heading relative to the contour, degrees, default 30.
    pub alpha_deg: f64,
    /// Requested inward boundary buffer in metres, default 15.
    /// Only the raster strategy applies it.
    pub edge_buffer_m: f64,
    /// Winsorization tail percent; 0 disables it.
    pub winsorize_pct: f64,
}

impl Default for SlopeParams {
    fn default() -> Self {
        Self {
            percentile: 80,
            smoothing_window_m: 50.0,
            alpha_deg: 30.0,
            edge_buffer_m: 15.0,
            winsorize_pct: 0.0,
        }
    }
}

impl SlopeParams {
    /// Reject values the pipeline cannot honour.
    pub fn validate(&self) -> Result<()> {
        if !OPERATING_RANKS.contains(&self.percentile) {
            return Err(SlopeError::InvalidParams(format!(
                "percentile must be one of {:?}, got {}",
                OPERATING_RANKS, self.percentile
            )));
        }
        if !(self.smoothing_window_m.is_finite() && self.smoothing_window_m > 0.0) {
            return Err(SlopeError::InvalidParams(format!(
                "smoothing window must be positive, got {} m",
                self.smoothing_window_m
            )));
        }
        if !(self.alpha_deg.is_finite() && (0.0..=90.0).contains(&self.alpha_deg)) {
            return Err(SlopeError::InvalidParams(format!(
                "alpha must lie in [0, 90] degrees, got {}",
                self.alpha_deg
            )));
        }
        if !(self.edge_buffer_m.is_finite() && self.edge_buffer_m >= 0.0) {
            return Err(SlopeError::InvalidParams(format!(
                "edge buffer must be non-negative, got {} m",
                self.edge_buffer_m
            )));
        }
        if !(self.winsorize_pct.is_finite() && self.winsorize_pct < 50.0) {
            return Err(SlopeError::InvalidParams(format!(
                "winsorize percent must be below 50, got {}",
                self.winsorize_pct
            )));
        }
        Ok(())
    }
}
