//! Boundary handling for the validity mask.
//!
//! Two policies keep edge artefacts out of the statistics:
//! - the inward buffer (raster strategy) drops cells closer than a given
//!   distance to the parcel boundary, shrinking the distance when it would
//!   eat too much of a small or thin parcel;
//! - the edge erosion (both strategies, parcels above 30 ha) removes one
//!   ring of boundary-adjacent cells unless that discards more than 30 % of
//!   the valid cells.
//!
//! Neither is an error path: both always leave a usable mask and report
//! what they did through the diagnostic sink.

use log::Level;
use serde::Serialize;

use crate::diagnostics::DiagnosticSink;
use crate::grid::{Grid, ValidityMask};
use crate::polygon::PlanarPolygon;

/// Erosion only runs on parcels larger than this, hectares.
pub const EROSION_MIN_AREA_HA: f64 = 30.0;
/// Minimum share of valid cells the eroded mask must keep.
pub const EROSION_MIN_RETAINED: f64 = 0.7;

/// Inward buffer must keep at least this share of the interior cells...
pub const BUFFER_MIN_FRACTION: f64 = 0.7;
/// ...and at least this much area, m².
pub const BUFFER_MIN_AREA_M2: f64 = 10_000.0;
/// The buffer stops shrinking once it is at or below this distance, m.
pub const BUFFER_MIN_DISTANCE_M: f64 = 3.0;
/// Multiplier applied to the buffer on each shrink.
pub const BUFFER_SHRINK: f64 = 0.75;

/// What the edge erosion did to the mask.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EdgeErosion {
    /// Parcel at or below the area threshold.
    NotApplicable,
    /// Eroded mask replaced the original.
    Applied { retained_fraction: f64 },
    /// Erosion would keep too little; the original mask was kept.
    Reverted { retained_fraction: f64 },
}

/// Binary erosion with a full 3×3 structuring element. Cells beyond the
/// grid border count as invalid, so border cells never survive.
pub fn erode(mask: &ValidityMask) -> ValidityMask {
    let (w, h) = (mask.width, mask.height);
    let mut out = Grid::new(w, h, false);
    if w < 3 || h < 3 {
        return out;
    }
    for r in 1..h - 1 {
        for c in 1..w - 1 {
            let keep = (r - 1..=r + 1).all(|rr| (c - 1..=c + 1).all(|cc| mask.get(rr, cc)));
            out.set(r, c, keep);
        }
    }
    out
}

/// Apply the edge erosion policy to `mask` for a parcel of `area_ha`.
///
/// Returns the mask to use for statistics: the eroded one when it keeps at
/// least [`EROSION_MIN_RETAINED`] of the valid cells, otherwise `mask`
/// itself, unchanged.
pub fn apply_edge_erosion(
    mask: ValidityMask,
    area_ha: f64,
    sink: &mut dyn DiagnosticSink,
) -> (ValidityMask, EdgeErosion) {
    if area_ha <= EROSION_MIN_AREA_HA {
        return (mask, EdgeErosion::NotApplicable);
    }

    let before = mask.count_valid();
    let eroded = erode(&mask);
    let after = eroded.count_valid();

    if after == 0 {
        sink.record(
            Level::Info,
            "edge erosion removed every pixel; keeping the original mask",
        );
        return (mask, EdgeErosion::Reverted { retained_fraction: 0.0 });
    }

    let retained_fraction = after as f64 / before as f64;
    if retained_fraction >= EROSION_MIN_RETAINED {
        sink.record(
            Level::Debug,
            &format!(
                "edge erosion kept {:.1}% of {} pixels",
                retained_fraction * 100.0,
                before
            ),
        );
        (eroded, EdgeErosion::Applied { retained_fraction })
    } else {
        sink.record(
            Level::Info,
            &format!(
                "edge erosion would keep only {:.1}% of the pixels; reverting",
                retained_fraction * 100.0
            ),
        );
        (mask, EdgeErosion::Reverted { retained_fraction })
    }
}

/// Mask of cell centres inside the polygon and at least `effective_m` from
/// its boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct InwardBuffer {
    pub mask: ValidityMask,
    pub effective_m: f64,
}

/// Rasterise `polygon` on the grid given by the cell-centre axes, keeping
/// only cells at least `requested_m` inside the boundary.
///
/// The distance shrinks by [`BUFFER_SHRINK`] while the kept area is below
/// [`BUFFER_MIN_FRACTION`] of the interior or below [`BUFFER_MIN_AREA_M2`],
/// and the distance is still above [`BUFFER_MIN_DISTANCE_M`]. An empty
/// result falls back to the unbuffered interior with an effective buffer
/// of 0 m.
pub fn inward_buffer(
    polygon: &PlanarPolygon,
    x_coords: &[f64],
    y_coords: &[f64],
    cell_area_m2: f64,
    requested_m: f64,
    sink: &mut dyn DiagnosticSink,
) -> InwardBuffer {
    let (w, h) = (x_coords.len(), y_coords.len());

    // Distance to the boundary for interior cells, None outside.
    let mut depth: Vec<Option<f64>> = Vec::with_capacity(w * h);
    for &y in y_coords {
        for &x in x_coords {
            depth.push(if polygon.contains(x, y) {
                Some(polygon.distance_to_boundary(x, y))
            } else {
                None
            });
        }
    }
    let interior = depth.iter().filter(|d| d.is_some()).count();
    let kept_at = |dist: f64| {
        depth
            .iter()
            .filter(|d| matches!(d, Some(v) if *v >= dist))
            .count()
    };

    let mut current = requested_m;
    let mut kept = kept_at(current);
    loop {
        let fraction = if interior > 0 { kept as f64 / interior as f64 } else { 0.0 };
        let too_small = kept == 0
            || (kept as f64) * cell_area_m2 < BUFFER_MIN_AREA_M2
            || fraction < BUFFER_MIN_FRACTION;
        if !too_small || current <= BUFFER_MIN_DISTANCE_M {
            break;
        }
        sink.record(
            Level::Warn,
            &format!(
                "inward buffer keeps {:.1}% of the area; reducing buffer to {:.1} m",
                fraction * 100.0,
                current * BUFFER_SHRINK
            ),
        );
        current *= BUFFER_SHRINK;
        kept = kept_at(current);
    }

    if kept == 0 {
        sink.record(
            Level::Warn,
            "inward buffer left no pixels; using the original polygon",
        );
        current = 0.0;
    }

    let data = depth
        .iter()
        .map(|d| matches!(d, Some(v) if *v >= current))
        .collect();
    InwardBuffer {
        mask: Grid { data, width: w, height: h },
        effective_m: current,
    }
}
