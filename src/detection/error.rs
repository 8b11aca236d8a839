use thiserror::Error;

use super::geo::GeoBoundingBox;

/// Input errors raised by the detection pipeline.
///
/// An empty result is not an error, and degenerate shapes are dropped
/// silently, so every variant here means the caller passed something unusable.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("invalid raster dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("raster is {actual:?} but {expected:?} was requested")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("invalid bounding box {0}")]
    InvalidBoundingBox(GeoBoundingBox),
}
