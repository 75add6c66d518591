//! # wacollect-raster
//!
//! Raster persistence for the water-accounting collectors.
//!
//! Every collector ends the same way: an in-memory grid of `f32` values plus a
//! geotransform gets written to disk as a single-band GeoTIFF in WGS84, and
//! intermediate files are read back later. This crate does exactly that and
//! nothing more. It is pure Rust (built on the `tiff` crate), so it does not
//! need GDAL.
//!
//! ## Overview
//!
//! - [`GeoTransform`] maps pixel (column, row) indices to geographic
//!   coordinates, following the GDAL convention where `pixel_height` is
//!   negative for north-up rasters.
//! - [`Raster`] owns the row-major pixel buffer, its dimensions and its
//!   geotransform. Missing data is stored as `NaN`.
//! - [`save_raster`], [`read_raster`], [`read_raster_metadata`] and
//!   [`read_raster_band`] are the persistence operations.
//!
//! ## Example
//!
//! ```no_run
//! use wacollect_raster::{save_raster, read_raster, GeoTransform, Raster};
//!
//! let gt = GeoTransform::new(4.0, 0.001, 3.0, -0.001);
//! let raster = Raster::filled(1000, 1000, f32::NAN, gt);
//! save_raster("out.tif", &raster)?;
//!
//! let back = read_raster("out.tif")?;
//! assert_eq!(back.dimensions(), (1000, 1000));
//! # Ok::<(), wacollect_raster::RasterError>(())
//! ```

mod error;
mod geotiff;
mod raster;

pub use error::RasterError;
pub use geotiff::{read_raster, read_raster_band, read_raster_metadata, save_raster};
pub use raster::{GeoTransform, Raster, RasterMetadata, SpatialReference};

/// Result type for raster operations.
pub type Result<T> = std::result::Result<T, RasterError>;
