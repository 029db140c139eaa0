//! One slope estimation run, end to end.
//!
//! ```text
//! vertices ─ project ─ layout ─ edge erosion ─ elevations ─ [median]
//!   ─ slope % ─ smooth ─ [winsorize] ─ percentiles ─ rank selection
//!   ─ operational angle
//! ```
//!
//! The grid strategy decides where elevations come from; everything after
//! the elevation grid is shared.

use log::Level;
use serde::Serialize;

use crate::buffer::{apply_edge_erosion, EdgeErosion};
use crate::coords::GeoVertex;
use crate::dem::Georeference;
use crate::diagnostics::DiagnosticSink;
use crate::error::{Result, SlopeError};
use crate::grid::{ElevationGrid, SlopeGrid, ValidityMask};
use crate::operational::{pct_to_deg, select_operational, RankSelection};
use crate::params::SlopeParams;
use crate::sampling::GridStrategy;
use crate::stats::{PercentileTable, SlopeSample};
use crate::terrain::{median3x3, slope_percent, smooth_slope, window_pixels, winsorize};

/// Final figures of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlopeReport {
    pub operational_angle_deg: f64,
    pub operational_grade_pct: f64,
    /// Smoothed slope percent at the rank actually used.
    pub percentile_slope_pct: f64,
    pub percentile_used: u8,
    pub rank_selection: RankSelection,
    pub correction_applied: bool,
    pub percentiles: PercentileTable,
    /// P50 as an angle.
    pub median_angle_deg: f64,
    /// P95 as an angle.
    pub severe_angle_deg: f64,
    pub smoothing_window_m: f64,
    pub smoothing_window_px: usize,
    pub alpha_deg: f64,
    pub effective_buffer_m: f64,
    pub edge_erosion: EdgeErosion,
    pub resolution_m: f64,
    pub cell_count: usize,
    pub used_area_ha: f64,
    pub parcel_area_ha: f64,
}

impl SlopeReport {
    pub fn fallback_applied(&self) -> bool {
        self.rank_selection.fell_back()
    }
}

/// A report together with the grids it was computed from.
#[derive(Debug, Clone)]
pub struct SlopeRun {
    pub report: SlopeReport,
    pub elevation: ElevationGrid,
    pub slope: SlopeGrid,
    pub slope_smoothed: SlopeGrid,
    pub mask: ValidityMask,
    pub georef: Georeference,
}

/// Estimate the operational slope of the parcel bounded by `vertices`.
pub fn run<S: GridStrategy + ?Sized>(
    vertices: &[GeoVertex],
    strategy: &S,
    params: &SlopeParams,
    sink: &mut dyn DiagnosticSink,
) -> Result<SlopeRun> {
    params.validate()?;

    let parcel = strategy.project(vertices)?;
    let parcel_area_ha = parcel.polygon.area_ha();
    let layout = strategy.layout(&parcel, params, sink)?;
    let step = layout.step;

    let (mask, edge_erosion) = apply_edge_erosion(layout.mask.clone(), parcel_area_ha, sink);

    let mut elevation = ElevationGrid {
        elev: strategy.elevations(&parcel, &layout, &mask)?,
        x_coords: layout.x_coords,
        y_coords: layout.y_coords,
        step,
    };
    if !elevation.is_consistent() || !elevation.elev.same_shape(&mask) {
        return Err(SlopeError::RasterBounds(format!(
            "elevation grid {}×{} does not match the {}×{} layout",
            elevation.elev.width, elevation.elev.height, mask.width, mask.height
        )));
    }
    if strategy.denoise() {
        elevation.elev = median3x3(&elevation.elev);
    }

    // A cell is valid only if it is inside and has a finite elevation.
    let mut mask = mask;
    for (m, z) in mask.data.iter_mut().zip(&elevation.elev.data) {
        *m = *m && z.map_or(false, f64::is_finite);
    }
    let cell_count = mask.count_valid();
    if cell_count == 0 {
        return Err(SlopeError::NoValidPixels(
            "no interior cell has a defined elevation".into(),
        ));
    }

    let slope = slope_percent(&elevation.elev, &mask, step);
    let smoothing_window_px = window_pixels(params.smoothing_window_m, step);
    let mut slope_smoothed = smooth_slope(&slope, &mask, smoothing_window_px);
    if params.winsorize_pct > 0.0 {
        slope_smoothed = winsorize(&slope_smoothed, &mask, params.winsorize_pct);
    }

    let sample = SlopeSample::from_grid(&slope_smoothed, &mask)?;
    let percentiles = sample.table();
    let selection = select_operational(&percentiles, params.percentile, params.alpha_deg, sink)
        .ok_or_else(|| {
            SlopeError::InvalidParams(format!("percentile {} is not reported", params.percentile))
        })?;

    let report = SlopeReport {
        operational_angle_deg: selection.angle.angle_deg,
        operational_grade_pct: selection.angle.grade_pct,
        percentile_slope_pct: selection.slope_pct,
        percentile_used: selection.rank.rank(),
        rank_selection: selection.rank,
        correction_applied: selection.angle.correction_applied,
        median_angle_deg: pct_to_deg(sample.percentile(50.0)),
        severe_angle_deg: pct_to_deg(sample.percentile(95.0)),
        percentiles,
        smoothing_window_m: params.smoothing_window_m,
        smoothing_window_px,
        alpha_deg: params.alpha_deg,
        effective_buffer_m: layout.effective_buffer_m,
        edge_erosion,
        resolution_m: step,
        cell_count,
        used_area_ha: cell_count as f64 * step * step / 10_000.0,
        parcel_area_ha,
    };
    sink.record(
        Level::Info,
        &format!(
            "operational slope {:.2}° (P{} = {:.2}%, {} cells at {:.1} m)",
            report.operational_angle_deg,
            report.percentile_used,
            report.percentile_slope_pct,
            cell_count,
            step
        ),
    );

    let georef = Georeference::from_axes(
        &elevation.x_coords,
        &elevation.y_coords,
        step,
        parcel.frame.epsg(),
    );
    Ok(SlopeRun {
        report,
        elevation,
        slope,
        slope_smoothed,
        mask,
        georef,
    })
}
