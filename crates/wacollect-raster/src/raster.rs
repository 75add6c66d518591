//! In-memory raster representation.

use crate::{RasterError, Result};

/// Affine pixel-to-world mapping without rotation terms.
///
/// Pixel `(col, row)` has its upper-left corner at
/// `(origin_x + col * pixel_width, origin_y + row * pixel_height)`.
/// For north-up rasters `pixel_height` is negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    /// X coordinate (longitude) of the upper-left corner.
    pub origin_x: f64,
    /// Pixel width in degrees.
    pub pixel_width: f64,
    /// Y coordinate (latitude) of the upper-left corner.
    pub origin_y: f64,
    /// Pixel height in degrees (negative when rows run north to south).
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Create a geotransform from origin and pixel sizes.
    pub fn new(origin_x: f64, pixel_width: f64, origin_y: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            pixel_width,
            origin_y,
            pixel_height,
        }
    }

    /// Build from a GDAL-style 6-tuple `[x0, dx, rx, y0, ry, dy]`.
    ///
    /// Rotation terms are ignored.
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self::new(gt[0], gt[1], gt[3], gt[5])
    }

    /// Convert to a GDAL-style 6-tuple with zero rotation.
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            0.0,
            self.origin_y,
            0.0,
            self.pixel_height,
        ]
    }

    /// X coordinate of column `col`.
    pub fn x_at(&self, col: usize) -> f64 {
        self.origin_x + col as f64 * self.pixel_width
    }

    /// Y coordinate of row `row`.
    pub fn y_at(&self, row: usize) -> f64 {
        self.origin_y + row as f64 * self.pixel_height
    }

    /// Same pixel size, different origin.
    pub fn with_origin(&self, origin_x: f64, origin_y: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            ..*self
        }
    }
}

/// Coordinate reference system of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpatialReference {
    /// Geographic WGS84 (EPSG:4326).
    #[default]
    Wgs84,
    /// Any other geographic CRS identified by EPSG code.
    Epsg(u16),
    /// The file carried no CRS information.
    Undefined,
}

impl SpatialReference {
    /// EPSG code, if known.
    pub fn epsg(&self) -> Option<u16> {
        match self {
            SpatialReference::Wgs84 => Some(4326),
            SpatialReference::Epsg(code) => Some(*code),
            SpatialReference::Undefined => None,
        }
    }

    /// Map an EPSG code back to a spatial reference.
    pub fn from_epsg(code: u16) -> Self {
        if code == 4326 {
            SpatialReference::Wgs84
        } else {
            SpatialReference::Epsg(code)
        }
    }
}

/// Georeferencing information of a raster file, without its pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterMetadata {
    /// Pixel-to-world mapping.
    pub geotransform: GeoTransform,
    /// Coordinate reference system.
    pub spatial_reference: SpatialReference,
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
}

/// A single-band `f32` raster.
#[derive(Debug, Clone)]
pub struct Raster {
    /// Pixel values in row-major order (north to south, west to east).
    data: Vec<f32>,
    /// Width in pixels.
    width: usize,
    /// Height in pixels.
    height: usize,
    /// Pixel-to-world mapping.
    geotransform: GeoTransform,
    /// Coordinate reference system.
    spatial_reference: SpatialReference,
}

impl Raster {
    /// Create a WGS84 raster from a row-major pixel buffer.
    pub fn new(
        width: usize,
        height: usize,
        data: Vec<f32>,
        geotransform: GeoTransform,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(RasterError::Empty);
        }
        let expected = width * height;
        if data.len() != expected {
            return Err(RasterError::DimensionMismatch {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            geotransform,
            spatial_reference: SpatialReference::Wgs84,
        })
    }

    /// Create a WGS84 raster where every pixel holds `value`.
    pub fn filled(width: usize, height: usize, value: f32, geotransform: GeoTransform) -> Self {
        Self {
            data: vec![value; width * height],
            width,
            height,
            geotransform,
            spatial_reference: SpatialReference::Wgs84,
        }
    }

    /// Replace the spatial reference.
    pub fn with_spatial_reference(mut self, spatial_reference: SpatialReference) -> Self {
        self.spatial_reference = spatial_reference;
        self
    }

    /// Dimensions as `(width, height)`.
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Pixel-to-world mapping.
    pub fn geotransform(&self) -> GeoTransform {
        self.geotransform
    }

    /// Coordinate reference system.
    pub fn spatial_reference(&self) -> SpatialReference {
        self.spatial_reference
    }

    /// Georeferencing information.
    pub fn metadata(&self) -> RasterMetadata {
        RasterMetadata {
            geotransform: self.geotransform,
            spatial_reference: self.spatial_reference,
            width: self.width,
            height: self.height,
        }
    }

    /// Row-major pixel buffer.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Consume the raster and return its pixel buffer.
    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Value at `(row, col)`, or `None` outside the raster.
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row < self.height && col < self.width {
            Some(self.data[row * self.width + col])
        } else {
            None
        }
    }

    /// One row of pixels.
    pub fn row(&self, row: usize) -> &[f32] {
        let start = row * self.width;
        &self.data[start..start + self.width]
    }

    /// Number of pixels that hold `NaN`.
    pub fn nan_count(&self) -> usize {
        self.data.iter().filter(|v| v.is_nan()).count()
    }
}
