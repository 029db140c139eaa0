use std::io;

/// Errors that end a slope estimation run.
///
/// The percentile fallback and the erosion revert are not errors; they are
/// reported through the diagnostic sink and annotated on the report.
#[derive(Debug, thiserror::Error)]
pub enum SlopeError {
    /// Degenerate or non-polygonal parcel boundary.
    #[error("invalid parcel geometry: {0}")]
    InputGeometry(String),

    /// Missing or unusable spatial reference on the DEM.
    #[error("unusable DEM spatial reference: {0}")]
    Crs(String),

    /// The parcel does not intersect the DEM.
    #[error("parcel outside DEM bounds: {0}")]
    RasterBounds(String),

    /// Mask or percentile stage has nothing to operate on.
    #[error("no valid pixels: {0}")]
    NoValidPixels(String),

    /// Every elevation source failed.
    #[error("elevation unavailable: {0}")]
    ElevationUnavailable(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// Unreadable parcel boundary file.
    #[error("cannot read parcel boundary: {0}")]
    Boundary(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),
}

pub type Result<T> = std::result::Result<T, SlopeError>;
