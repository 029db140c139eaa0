//! Grid construction and the pluggable grid strategy.
//!
//! A [`GridStrategy`] turns parcel vertices into a planar elevation grid.
//! The pipeline drives it in three steps (project, lay out, fetch
//! elevations) so the edge policies can shrink the mask before any
//! elevation is requested.
//!
//! [`PointSampledGrid`] is the sparse strategy: an adaptive sampling grid
//! over the parcel, one elevation query per interior cell.

use log::Level;

use crate::coords::{GeoVertex, LatLon};
use crate::diagnostics::DiagnosticSink;
use crate::error::{Result, SlopeError};
use crate::grid::{Grid, ValidityMask};
use crate::params::SlopeParams;
use crate::polygon::PlanarPolygon;
use crate::projection::{LocalProjection, PlaneFrame};
use crate::resolver::ElevationResolver;

// ── Sampling constants ───────────────────────────────────────────────────────

/// Upper bound on the number of grid cells requested from a resolver.
pub const MAX_SAMPLES: f64 = 4_000.0;
/// Finest step the retry loop may reach, metres.
pub const MIN_STEP_M: f64 = 5.0;
/// Grid construction attempts before giving up.
pub const MAX_ATTEMPTS: usize = 3;
/// Minimum interior cells for a usable grid.
pub const MIN_INTERIOR_CELLS: usize = 3;

// ── Strategy interface ───────────────────────────────────────────────────────

/// Parcel polygon in the planar frame a strategy works in.
#[derive(Debug, Clone)]
pub struct ProjectedParcel {
    pub frame: PlaneFrame,
    pub polygon: PlanarPolygon,
}

/// Cell-centre axes, spacing and the initial interior mask.
#[derive(Debug, Clone, PartialEq)]
pub struct GridLayout {
    pub x_coords: Vec<f64>,
    pub y_coords: Vec<f64>,
    pub step: f64,
    pub mask: ValidityMask,
    /// Inward boundary buffer actually applied, metres.
    pub effective_buffer_m: f64,
}

/// Source of the planar elevation grid for one parcel.
pub trait GridStrategy {
    /// Project the parcel vertices into the strategy's working plane.
    fn project(&self, vertices: &[GeoVertex]) -> Result<ProjectedParcel>;

    /// Lay out the sampling grid and its initial interior mask.
    fn layout(
        &self,
        parcel: &ProjectedParcel,
        params: &SlopeParams,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<GridLayout>;

    /// Elevation for the cells of `layout`. Every cell set in `mask` must be
    /// attempted; other cells may be left undefined.
    fn elevations(
        &self,
        parcel: &ProjectedParcel,
        layout: &GridLayout,
        mask: &ValidityMask,
    ) -> Result<Grid<Option<f64>>>;

    /// Whether the elevation grid is median-filtered before slope.
    fn denoise(&self) -> bool {
        false
    }
}

// ── Grid builder ─────────────────────────────────────────────────────────────

/// Sampling step for a parcel of `area_m2`: finer for small parcels.
pub fn choose_sampling_step(area_m2: f64) -> f64 {
    if area_m2 <= 30_000.0 {
        10.0
    } else if area_m2 <= 200_000.0 {
        20.0
    } else if area_m2 <= 1_000_000.0 {
        35.0
    } else if area_m2 <= 5_000_000.0 {
        60.0
    } else {
        90.0
    }
}

/// `min, min + step, …` covering `[min, max]`, with one sample at or past
/// `max` when the span is not a multiple of the step.
pub fn axis(min: f64, max: f64, step: f64) -> Vec<f64> {
    let n = (((max - min) + step) / step - 1e-9).ceil().max(1.0) as usize;
    (0..n).map(|i| min + i as f64 * step).collect()
}

/// Cells whose centre lies inside the polygon.
pub fn interior_mask(polygon: &PlanarPolygon, x_coords: &[f64], y_coords: &[f64]) -> ValidityMask {
    let mut mask = Grid::new(x_coords.len(), y_coords.len(), false);
    for (r, &y) in y_coords.iter().enumerate() {
        for (c, &x) in x_coords.iter().enumerate() {
            if polygon.contains(x, y) {
                mask.set(r, c, true);
            }
        }
    }
    mask
}

/// Build the adaptive sampling grid over `polygon`.
///
/// The step comes from [`choose_sampling_step`], scaled up by
/// `sqrt(count / MAX_SAMPLES)` when the bounding box would hold more than
/// [`MAX_SAMPLES`] cells. While fewer than [`MIN_INTERIOR_CELLS`] cells fall
/// inside, the step is halved (floor [`MIN_STEP_M`]), for at most
/// [`MAX_ATTEMPTS`] attempts.
pub fn build_sampling_grid(
    polygon: &PlanarPolygon,
    sink: &mut dyn DiagnosticSink,
) -> Result<GridLayout> {
    let area_m2 = polygon.area_m2();
    if !(area_m2 > 0.0) {
        return Err(SlopeError::InputGeometry("polygon has zero area".into()));
    }

    let b = polygon.bounds();
    let mut step = choose_sampling_step(area_m2);
    let approx_count = (b.span_x() / step + 1.0) * (b.span_y() / step + 1.0);
    if approx_count > MAX_SAMPLES {
        step *= (approx_count / MAX_SAMPLES).sqrt();
    }

    for attempt in 1..=MAX_ATTEMPTS {
        let x_coords = axis(b.min_x, b.max_x, step);
        let y_coords = axis(b.min_y, b.max_y, step);
        let mask = interior_mask(polygon, &x_coords, &y_coords);
        let inside = mask.count_valid();
        sink.record(
            Level::Debug,
            &format!(
                "sampling grid attempt {attempt}: step {step:.2} m, {}×{} cells, {inside} inside",
                x_coords.len(),
                y_coords.len()
            ),
        );
        if inside >= MIN_INTERIOR_CELLS {
            return Ok(GridLayout {
                x_coords,
                y_coords,
                step,
                mask,
                effective_buffer_m: 0.0,
            });
        }
        step = (step / 2.0).max(MIN_STEP_M);
    }

    Err(SlopeError::NoValidPixels(format!(
        "fewer than {MIN_INTERIOR_CELLS} grid cells inside the parcel after {MAX_ATTEMPTS} attempts"
    )))
}

// ── Point-sampled strategy ───────────────────────────────────────────────────

/// Sparse strategy: local tangent plane, adaptive grid, one resolver query
/// per interior cell.
pub struct PointSampledGrid<R> {
    resolver: R,
}

impl<R: ElevationResolver> PointSampledGrid<R> {
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }
}

impl<R: ElevationResolver> GridStrategy for PointSampledGrid<R> {
    fn project(&self, vertices: &[GeoVertex]) -> Result<ProjectedParcel> {
        let frame = PlaneFrame::Local(LocalProjection::centred_on(vertices)?);
        let polygon = PlanarPolygon::new(frame.project(vertices))?;
        Ok(ProjectedParcel { frame, polygon })
    }

    fn layout(
        &self,
        parcel: &ProjectedParcel,
        _params: &SlopeParams,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<GridLayout> {
        build_sampling_grid(&parcel.polygon, sink)
    }

    fn elevations(
        &self,
        parcel: &ProjectedParcel,
        layout: &GridLayout,
        mask: &ValidityMask,
    ) -> Result<Grid<Option<f64>>> {
        let PlaneFrame::Local(projection) = &parcel.frame else {
            return Err(SlopeError::Crs(
                "point sampling needs a local tangent plane".into(),
            ));
        };

        let mut cells = Vec::new();
        let mut points: Vec<LatLon> = Vec::new();
        for (r, &y) in layout.y_coords.iter().enumerate() {
            for (c, &x) in layout.x_coords.iter().enumerate() {
                if mask.get(r, c) {
                    cells.push((r, c));
                    points.push(projection.inverse(x, y));
                }
            }
        }

        let values = self.resolver.resolve(&points)?;
        if values.len() != points.len() {
            return Err(SlopeError::ElevationUnavailable(format!(
                "{} returned {} elevations for {} points",
                self.resolver.name(),
                values.len(),
                points.len()
            )));
        }

        let mut elev = Grid::new(mask.width, mask.height, None);
        for ((r, c), z) in cells.into_iter().zip(values) {
            elev.set(r, c, Some(z).filter(|v| v.is_finite()));
        }
        Ok(elev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticLog;

    fn square(side: f64) -> PlanarPolygon {
        PlanarPolygon::new(vec![(0.0, 0.0), (side, 0.0), (side, side), (0.0, side)]).unwrap()
    }

    #[test]
    fn step_is_monotone_in_area() {
        let areas = [1.0, 30_000.0, 30_001.0, 200_001.0, 1_000_001.0, 5_000_001.0, 1e9];
        let steps: Vec<f64> = areas.iter().map(|&a| choose_sampling_step(a)).collect();
        assert_eq!(steps, vec![10.0, 10.0, 20.0, 35.0, 60.0, 90.0, 90.0]);
    }

    #[test]
    fn axis_includes_both_ends_for_exact_multiple() {
        assert_eq!(axis(0.0, 100.0, 10.0).len(), 11);
        let a = axis(0.0, 95.0, 10.0);
        assert_eq!(a.len(), 11);
        assert_eq!(a[10], 100.0);
    }

    #[test]
    fn hectare_square_grid() {
        let mut sink = DiagnosticLog::new();
        let layout = build_sampling_grid(&square(100.0), &mut sink).unwrap();
        assert_eq!(layout.step, 10.0);
        assert_eq!(layout.x_coords.len(), 11);
        assert_eq!(layout.y_coords.len(), 11);
        // Even-odd: left/bottom edges count as inside, right/top as outside.
        assert_eq!(layout.mask.count_valid(), 100);
        assert_eq!(layout.effective_buffer_m, 0.0);
    }

    #[test]
    fn large_parcel_step_scaled_to_sample_ceiling() {
        let mut sink = DiagnosticLog::new();
        // 10 km × 10 km: base step 90 m gives ~12 500 cells.
        let layout = build_sampling_grid(&square(10_000.0), &mut sink).unwrap();
        assert!(layout.step > 90.0);
        let cells = layout.x_coords.len() * layout.y_coords.len();
        assert!(cells as f64 <= MAX_SAMPLES * 1.05, "got {cells} cells");
    }

    #[test]
    fn diagonal_band_triggers_refinement() {
        let mut sink = DiagnosticLog::new();
        // Band 51 ≤ x + y ≤ 57: no 10 m lattice point, several 5 m ones.
        let band = PlanarPolygon::new(vec![(0.0, 51.0), (51.0, 0.0), (54.0, 3.0), (3.0, 54.0)])
            .unwrap();
        let layout = build_sampling_grid(&band, &mut sink).unwrap();
        assert_eq!(layout.step, 5.0);
        assert_eq!(layout.mask.count_valid(), 10);
    }

    #[test]
    fn unreachable_parcel_exhausts_attempts() {
        let mut sink = DiagnosticLog::new();
        // Band 51 ≤ x + y ≤ 52 never contains a 5 m lattice point.
        let band = PlanarPolygon::new(vec![(0.0, 51.0), (51.0, 0.0), (51.5, 0.5), (0.5, 51.5)])
            .unwrap();
        let err = build_sampling_grid(&band, &mut sink).unwrap_err();
        assert!(matches!(err, SlopeError::NoValidPixels(_)));
    }

    #[test]
    fn point_strategy_fills_only_mask_cells() {
        let vertices = vec![
            GeoVertex::new(-47.900, -15.800),
            GeoVertex::new(-47.899, -15.800),
            GeoVertex::new(-47.899, -15.799),
            GeoVertex::new(-47.900, -15.799),
        ];
        let strategy = PointSampledGrid::new(|pts: &[LatLon]| -> Result<Vec<f64>> {
            Ok(pts.iter().map(|_| 812.0).collect())
        });
        let mut sink = DiagnosticLog::new();
        let parcel = strategy.project(&vertices).unwrap();
        let layout = strategy.layout(&parcel, &SlopeParams::default(), &mut sink).unwrap();
        let elev = strategy.elevations(&parcel, &layout, &layout.mask).unwrap();
        for (v, m) in elev.data.iter().zip(&layout.mask.data) {
            assert_eq!(v.is_some(), *m);
        }
    }

    #[test]
    fn short_resolver_answer_is_rejected() {
        let vertices = vec![
            GeoVertex::new(-47.900, -15.800),
            GeoVertex::new(-47.899, -15.800),
            GeoVertex::new(-47.899, -15.799),
        ];
        let strategy =
            PointSampledGrid::new(|_: &[LatLon]| -> Result<Vec<f64>> { Ok(vec![1.0]) });
        let mut sink = DiagnosticLog::new();
        let parcel = strategy.project(&vertices).unwrap();
        let layout = strategy.layout(&parcel, &SlopeParams::default(), &mut sink).unwrap();
        let err = strategy.elevations(&parcel, &layout, &layout.mask).unwrap_err();
        assert!(matches!(err, SlopeError::ElevationUnavailable(_)));
    }
}
