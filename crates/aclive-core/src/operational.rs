//! From a representative slope percent to the operational angle.
//!
//! The slope percentile is projected onto the machinery heading
//! (`sin alpha`), and a steep result is damped once by a fixed factor.
//! A primary rank whose operational angle exceeds [`FALLBACK_TRIGGER_DEG`]
//! is replaced by P70, at most once.

use log::Level;
use serde::Serialize;

use crate::diagnostics::DiagnosticSink;
use crate::stats::PercentileTable;

/// Operational angle above which the selector falls back.
pub const FALLBACK_TRIGGER_DEG: f64 = 15.0;
/// Rank used after fallback.
pub const FALLBACK_RANK: u8 = 70;
/// Operational angle above which the secondary correction applies.
pub const CORRECTION_TRIGGER_DEG: f64 = 20.0;
/// Grade multiplier of the secondary correction.
pub const CORRECTION_FACTOR: f64 = 0.7;

/// Slope percent → angle in degrees.
pub fn pct_to_deg(pct: f64) -> f64 {
    (pct / 100.0).atan().to_degrees()
}

/// Grade along the machinery heading and its angle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OperationalAngle {
    pub grade_pct: f64,
    pub angle_deg: f64,
    pub correction_applied: bool,
}

/// `grade = S · sin(alpha)`; above 20° the grade is scaled by 0.7 once.
pub fn operational_angle(slope_pct: f64, alpha_deg: f64) -> OperationalAngle {
    let mut grade_pct = slope_pct * alpha_deg.to_radians().sin();
    let mut angle_deg = pct_to_deg(grade_pct);
    let mut correction_applied = false;
    if angle_deg > CORRECTION_TRIGGER_DEG {
        grade_pct *= CORRECTION_FACTOR;
        angle_deg = pct_to_deg(grade_pct);
        correction_applied = true;
    }
    OperationalAngle {
        grade_pct,
        angle_deg,
        correction_applied,
    }
}

/// Which rank the operational angle was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RankSelection {
    Primary(u8),
    Fallback { from: u8, to: u8 },
}

impl RankSelection {
    pub fn rank(&self) -> u8 {
        match *self {
            RankSelection::Primary(r) => r,
            RankSelection::Fallback { to, .. } => to,
        }
    }

    pub fn fell_back(&self) -> bool {
        matches!(self, RankSelection::Fallback { .. })
    }
}

/// Outcome of rank selection and angle conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection {
    pub rank: RankSelection,
    /// Slope percent at the selected rank.
    pub slope_pct: f64,
    pub angle: OperationalAngle,
}

/// Pick the operating rank and convert it.
///
/// Starts at `primary`; if its operational angle exceeds 15° and the
/// primary rank is not already 70, switches to P70 and accepts that
/// result whatever it is.
///
/// The trigger compares the operational angle (after the `sin alpha`
/// projection and the possible 0.7 correction), not the raw slope angle
/// `atan(S / 100)`: P80 = 30 % at alpha 30° gives 8.53° and stays on P80
/// even though its raw angle is 16.7°.
pub fn select_operational(
    table: &PercentileTable,
    primary: u8,
    alpha_deg: f64,
    sink: &mut dyn DiagnosticSink,
) -> Option<Selection> {
    let primary_pct = table.get(primary)?;
    let primary_angle = operational_angle(primary_pct, alpha_deg);

    if primary_angle.angle_deg > FALLBACK_TRIGGER_DEG && primary != FALLBACK_RANK {
        let fallback_pct = table.get(FALLBACK_RANK)?;
        sink.record(
            Level::Info,
            &format!(
                "P{primary} operational angle {:.2}° above {FALLBACK_TRIGGER_DEG}°, \
                 falling back to P{FALLBACK_RANK} ({fallback_pct:.2}%)",
                primary_angle.angle_deg
            ),
        );
        return Some(Selection {
            rank: RankSelection::Fallback {
                from: primary,
                to: FALLBACK_RANK,
            },
            slope_pct: fallback_pct,
            angle: operational_angle(fallback_pct, alpha_deg),
        });
    }

    Some(Selection {
        rank: RankSelection::Primary(primary),
        slope_pct: primary_pct,
        angle: primary_angle,
    })
}
