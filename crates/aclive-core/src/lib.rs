//! Operational slope estimation for agricultural field parcels.
//!
//! A parcel boundary and an elevation source go in; a single representative
//! slope angle for machinery sizing comes out. The same pipeline serves a
//! raster DEM ([`dem::RasterGrid`]) and a remote point-elevation service
//! ([`sampling::PointSampledGrid`]).

pub mod buffer;
#[cfg(feature = "cli")]
pub mod cli;
pub mod coords;
pub mod crs;
pub mod dem;
pub mod diagnostics;
pub mod error;
pub mod grid;
pub mod kml;
pub mod operational;
pub mod params;
pub mod pipeline;
pub mod polygon;
pub mod projection;
#[cfg(feature = "remote")]
pub mod remote;
pub mod resolver;
pub mod sampling;
pub mod stats;
pub mod terrain;
pub mod vertex;

pub use diagnostics::{DiagnosticLog, DiagnosticSink, LogSink};
pub use error::{Result, SlopeError};
pub use params::SlopeParams;
pub use pipeline::{run, SlopeReport, SlopeRun};
