//! Error types for the raster crate.

use thiserror::Error;

/// Errors that can occur when reading or writing rasters.
#[derive(Debug, Error)]
pub enum RasterError {
    /// I/O error reading or writing a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TIFF encoding or decoding error.
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// The file is a TIFF but lacks the GeoTIFF tags needed to place it.
    #[error("Invalid GeoTIFF: {0}")]
    InvalidGeoTiff(String),

    /// Pixel buffer length does not match the declared dimensions.
    #[error("Pixel buffer holds {actual} values but {width}x{height} needs {expected}")]
    DimensionMismatch {
        /// Raster width in pixels.
        width: usize,
        /// Raster height in pixels.
        height: usize,
        /// Expected number of values (`width * height`).
        expected: usize,
        /// Actual buffer length.
        actual: usize,
    },

    /// Raster has no pixels.
    #[error("Raster has zero width or height")]
    Empty,

    /// Requested band does not exist (files written here always have one band).
    #[error("Band {0} does not exist (bands are numbered from 1)")]
    NoSuchBand(usize),
}
