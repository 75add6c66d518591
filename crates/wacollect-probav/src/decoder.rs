//! Turning fetched tiles into georeferenced pixel arrays.
//!
//! Healthy assets are either read back from the decoded-tile cache or decoded
//! from the raw payload. Anything else becomes a placeholder: an all-NaN tile
//! of nominal size placed purely from its [`TileIndex`].

use crate::fetcher::{AssetSource, FetchOutcome, TileAsset};
use crate::grid::{BoundingBox, TileGrid, TileIndex};
use crate::payload::{MetadataField, PayloadOpener, TilePayloadReader};
use crate::product::{Band, Product};
use crate::{DecodeError, TileUnavailable};
use chrono::NaiveDate;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use wacollect_metrics::{metric_defs, CollectLabels};
use wacollect_raster::{read_raster, save_raster, GeoTransform, Raster};

/// Missing-data marker of decoded tiles and mosaics.
pub const NODATA: f32 = f32::NAN;

/// Field of the mapping string holding the pixel size, counted from the end.
const PIXEL_SIZE_FIELD_FROM_END: usize = 3;

/// Extract the pixel size from a band's mapping description.
///
/// The mapping is a whitespace separated record whose third field from the
/// end is the pixel size in degrees. Anything else (too few fields, not a
/// number, not positive) is an error rather than a guess.
pub fn parse_pixel_size(mapping: &str) -> Result<f64, DecodeError> {
    let invalid = |reason: &str| DecodeError::InvalidMetadata {
        field: "MAPPING".to_string(),
        value: mapping.to_string(),
        reason: reason.to_string(),
    };
    let fields: Vec<&str> = mapping.split_whitespace().collect();
    let token = fields
        .len()
        .checked_sub(PIXEL_SIZE_FIELD_FROM_END)
        .and_then(|i| fields.get(i))
        .ok_or_else(|| invalid("too few fields"))?;
    let size: f64 = token.parse().map_err(|_| invalid("pixel size is not a number"))?;
    if !size.is_finite() || size <= 0.0 {
        return Err(invalid("pixel size must be positive"));
    }
    Ok(size)
}

fn parse_coordinate(field: &MetadataField, value: &str) -> Result<f64, DecodeError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| DecodeError::InvalidMetadata {
            field: field.key(),
            value: value.to_string(),
            reason: "not a finite number".to_string(),
        })
}

/// A tile's pixels with their placement.
#[derive(Debug, Clone)]
pub struct DecodedTile {
    /// Grid position.
    pub index: TileIndex,
    pixels: Vec<f32>,
    width: usize,
    height: usize,
    geotransform: GeoTransform,
    placeholder: bool,
}

impl DecodedTile {
    /// Wrap decoded pixels.
    pub fn new(
        index: TileIndex,
        width: usize,
        height: usize,
        pixels: Vec<f32>,
        geotransform: GeoTransform,
    ) -> Result<Self, DecodeError> {
        if pixels.len() != width * height || width == 0 || height == 0 {
            return Err(DecodeError::BadShape {
                dataset: index.to_string(),
                width,
                height,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            index,
            pixels,
            width,
            height,
            geotransform,
            placeholder: false,
        })
    }

    /// All-NaN tile of the grid's nominal size at the tile's nominal position.
    pub fn placeholder(grid: &TileGrid, index: TileIndex) -> Self {
        Self {
            index,
            pixels: vec![NODATA; grid.tile_pixels * grid.tile_pixels],
            width: grid.tile_pixels,
            height: grid.tile_pixels,
            geotransform: grid.nominal_geotransform(index),
            placeholder: true,
        }
    }

    fn from_raster(index: TileIndex, raster: Raster) -> Result<Self, DecodeError> {
        let (width, height) = raster.dimensions();
        let geotransform = raster.geotransform();
        Self::new(index, width, height, raster.into_data(), geotransform)
    }

    /// As a WGS84 raster.
    pub fn to_raster(&self) -> Result<Raster, wacollect_raster::RasterError> {
        Raster::new(self.width, self.height, self.pixels.clone(), self.geotransform)
    }

    /// Whether this tile stands in for one that could not be obtained.
    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    /// `(width, height)` in pixels.
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Pixel-to-world mapping.
    pub fn geotransform(&self) -> GeoTransform {
        self.geotransform
    }

    /// Row-major pixels.
    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    /// Value at `(row, col)`.
    pub fn value(&self, row: usize, col: usize) -> f32 {
        self.pixels[row * self.width + col]
    }

    /// Column numbers whose x coordinate lies strictly inside `bbox`, with
    /// that coordinate.
    pub fn columns_within(&self, bbox: &BoundingBox) -> Vec<(usize, f64)> {
        (0..self.width)
            .map(|col| (col, self.geotransform.x_at(col)))
            .filter(|(_, x)| bbox.contains_lon(*x))
            .collect()
    }

    /// Row numbers whose y coordinate lies strictly inside `bbox`, with that
    /// coordinate.
    pub fn rows_within(&self, bbox: &BoundingBox) -> Vec<(usize, f64)> {
        (0..self.height)
            .map(|row| (row, self.geotransform.y_at(row)))
            .filter(|(_, y)| bbox.contains_lat(*y))
            .collect()
    }

    /// Crop to the pixels strictly inside `bbox`.
    ///
    /// Returns `None` when no pixel is inside. The cropped tile produces the
    /// same mosaic as the full one.
    pub fn window(&self, bbox: &BoundingBox) -> Option<DecodedTile> {
        let cols = self.columns_within(bbox);
        let rows = self.rows_within(bbox);
        let (&(col0, _), &(col1, _)) = (cols.first()?, cols.last()?);
        let (&(row0, _), &(row1, _)) = (rows.first()?, rows.last()?);

        let width = col1 - col0 + 1;
        let height = row1 - row0 + 1;
        let mut pixels = Vec::with_capacity(width * height);
        for row in row0..=row1 {
            let start = row * self.width;
            pixels.extend_from_slice(&self.pixels[start + col0..=start + col1]);
        }

        Some(DecodedTile {
            index: self.index,
            pixels,
            width,
            height,
            geotransform: self
                .geotransform
                .with_origin(self.geotransform.x_at(col0), self.geotransform.y_at(row0)),
            placeholder: self.placeholder,
        })
    }
}

/// Decodes fetched tiles, substituting placeholders for failures.
pub struct TileDecoder {
    opener: Arc<dyn PayloadOpener>,
    grid: TileGrid,
    product: Product,
}

impl std::fmt::Debug for TileDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileDecoder")
            .field("grid", &self.grid)
            .field("product", &self.product)
            .finish_non_exhaustive()
    }
}

impl TileDecoder {
    /// Decoder for payloads of `product` on `grid`.
    pub fn new(opener: Arc<dyn PayloadOpener>, grid: TileGrid, product: Product) -> Self {
        Self {
            opener,
            grid,
            product,
        }
    }

    /// Decode a fetch outcome. Never fails: unavailable or undecodable tiles
    /// come back as placeholders, each announced by one warning.
    pub fn decode(&self, outcome: FetchOutcome) -> DecodedTile {
        match outcome {
            FetchOutcome::Ready(asset) => match self.decode_asset(&asset) {
                Ok(tile) => tile,
                Err(err) => {
                    // A corrupt file would otherwise be reused on every later run
                    let (AssetSource::Payload(path) | AssetSource::Cached(path)) = &asset.source;
                    if std::fs::remove_file(path).is_ok() {
                        debug!(path = %path.display(), "Removed undecodable scratch file");
                    }
                    self.substitute(asset.index, asset.band, asset.date, err.into())
                }
            },
            FetchOutcome::Unavailable {
                index,
                band,
                date,
                reason,
            } => self.substitute(index, band, date, reason),
        }
    }

    fn substitute(
        &self,
        index: TileIndex,
        band: Band,
        date: NaiveDate,
        reason: TileUnavailable,
    ) -> DecodedTile {
        warn!(
            tile = %index,
            band = %band,
            date = %date,
            reason = %reason,
            "Tile unavailable, substituting NaN placeholder"
        );
        let labels = CollectLabels::new(self.product.to_string(), band.as_str());
        metrics::counter!(
            metric_defs::TILES_PLACEHOLDERS.name,
            &labels.with(&[("reason", reason.label().to_string())])
        )
        .increment(1);
        DecodedTile::placeholder(&self.grid, index)
    }

    /// Decode a healthy asset.
    pub fn decode_asset(&self, asset: &TileAsset) -> Result<DecodedTile, DecodeError> {
        match &asset.source {
            AssetSource::Cached(path) => {
                debug!(
                    tile = %asset.index,
                    band = %asset.band,
                    path = %path.display(),
                    "Reading decoded tile"
                );
                DecodedTile::from_raster(asset.index, read_raster(path)?)
            }
            AssetSource::Payload(path) => {
                let tile = self.decode_payload(asset.index, asset.band, path)?;
                if let Err(err) = self.persist(&tile, &asset.decoded_path) {
                    warn!(
                        tile = %asset.index,
                        path = %asset.decoded_path.display(),
                        error = %err,
                        "Could not cache decoded tile"
                    );
                }
                Ok(tile)
            }
        }
    }

    fn decode_payload(
        &self,
        index: TileIndex,
        band: Band,
        path: &Path,
    ) -> Result<DecodedTile, DecodeError> {
        let reader = self.opener.open(path)?;
        let geotransform = self.read_geotransform(reader.as_ref())?;

        let selector = band.selector(self.product.level);
        let data = reader.read_band(&selector)?;
        if data.values.len() != data.width * data.height {
            return Err(DecodeError::BadShape {
                dataset: selector.dataset,
                width: data.width,
                height: data.height,
                actual: data.values.len(),
            });
        }

        let scale = band.scale();
        let pixels = if scale == 1.0 {
            data.values
        } else {
            data.values.into_iter().map(|v| v * scale).collect()
        };
        DecodedTile::new(index, data.width, data.height, pixels, geotransform)
    }

    fn read_geotransform(
        &self,
        reader: &dyn TilePayloadReader,
    ) -> Result<GeoTransform, DecodeError> {
        let lat_field = MetadataField::top_right_latitude();
        let lon_field = MetadataField::bottom_left_longitude();
        let mapping_field = MetadataField::blue_mapping();

        let lat_top = parse_coordinate(&lat_field, &reader.metadata(&lat_field)?)?;
        let lon_left = parse_coordinate(&lon_field, &reader.metadata(&lon_field)?)?;
        let pixel = parse_pixel_size(&reader.metadata(&mapping_field)?)?;

        // Metadata gives pixel centres; the geotransform wants the outer corner
        Ok(GeoTransform::new(
            lon_left - 0.5 * pixel,
            pixel,
            lat_top + 0.5 * pixel,
            -pixel,
        ))
    }

    fn persist(
        &self,
        tile: &DecodedTile,
        path: &Path,
    ) -> Result<(), wacollect_raster::RasterError> {
        let partial = crate::layout::partial_path(path);
        save_raster(&partial, &tile.to_raster()?)?;
        std::fs::rename(&partial, path)?;
        Ok(())
    }
}
