//! Grid stages between elevation and statistics: median denoise, slope,
//! box smoothing and winsorization.

pub mod denoise;
pub mod gradient;
pub mod smooth;
pub mod winsorize;

pub use denoise::median3x3;
pub use gradient::slope_percent;
pub use smooth::{smooth_slope, window_pixels};
pub use winsorize::winsorize;
