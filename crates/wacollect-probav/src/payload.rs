//! Reading tile payloads.
//!
//! Payloads are opened through [`PayloadOpener`], which hands back a
//! [`TilePayloadReader`] for embedded metadata and band pixels. The HDF5
//! implementation lives behind the `hdf5` feature and needs the system HDF5
//! library.

use crate::product::BandSelector;
use crate::DecodeError;
use std::path::Path;
use std::sync::Arc;

/// A metadata attribute inside a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataField {
    /// Group path holding the attribute.
    pub group: String,
    /// Attribute name.
    pub attribute: String,
}

impl MetadataField {
    /// Field `attribute` of `group`.
    pub fn new(group: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            attribute: attribute.into(),
        }
    }

    /// Flattened key, e.g. `LEVEL3_GEOMETRY_TOP_RIGHT_LATITUDE`.
    pub fn key(&self) -> String {
        format!("{}_{}", self.group.replace('/', "_"), self.attribute)
    }

    /// Latitude of the tile's top-right pixel centre.
    pub fn top_right_latitude() -> Self {
        Self::new("LEVEL3/GEOMETRY", "TOP_RIGHT_LATITUDE")
    }

    /// Longitude of the tile's bottom-left pixel centre.
    pub fn bottom_left_longitude() -> Self {
        Self::new("LEVEL3/GEOMETRY", "BOTTOM_LEFT_LONGITUDE")
    }

    /// Mapping description of the blue band, carrying the pixel size.
    ///
    /// Always taken from the TOC group; TOA payloads carry the same grid.
    pub fn blue_mapping() -> Self {
        Self::new("LEVEL3/RADIOMETRY/BLUE/TOC", "MAPPING")
    }
}

/// Pixels of one band in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct BandData {
    /// Columns.
    pub width: usize,
    /// Rows.
    pub height: usize,
    /// Raw stored values.
    pub values: Vec<f32>,
}

/// An opened payload.
pub trait TilePayloadReader {
    /// Text value of an embedded metadata field.
    fn metadata(&self, field: &MetadataField) -> Result<String, DecodeError>;

    /// Raw (unscaled) pixels of one band.
    fn read_band(&self, selector: &BandSelector) -> Result<BandData, DecodeError>;
}

/// Opens payload files.
pub trait PayloadOpener: Send + Sync {
    /// Open the payload at `path`.
    fn open(&self, path: &Path) -> Result<Box<dyn TilePayloadReader>, DecodeError>;
}

/// The payload decoder compiled into this build, if any.
pub fn default_opener() -> Option<Arc<dyn PayloadOpener>> {
    #[cfg(feature = "hdf5")]
    {
        Some(Arc::new(hdf5_payload::Hdf5Opener))
    }
    #[cfg(not(feature = "hdf5"))]
    {
        None
    }
}

#[cfg(feature = "hdf5")]
pub use hdf5_payload::Hdf5Opener;

#[cfg(feature = "hdf5")]
mod hdf5_payload {
    use super::{BandData, MetadataField, PayloadOpener, TilePayloadReader};
    use crate::product::BandSelector;
    use crate::DecodeError;
    use hdf5::types::{FixedAscii, FixedUnicode, VarLenAscii, VarLenUnicode};
    use std::path::Path;

    /// Longest fixed-length string attribute read back.
    const FIXED_TEXT_LEN: usize = 1024;

    fn payload_error(context: &str, err: hdf5::Error) -> DecodeError {
        DecodeError::Payload(format!("{context}: {err}"))
    }

    /// Opens PROBA-V HDF5 payloads.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct Hdf5Opener;

    impl PayloadOpener for Hdf5Opener {
        fn open(&self, path: &Path) -> Result<Box<dyn TilePayloadReader>, DecodeError> {
            let file = hdf5::File::open(path)
                .map_err(|e| payload_error(&path.display().to_string(), e))?;
            Ok(Box::new(Hdf5Payload { file }))
        }
    }

    /// String attributes come variable- or fixed-length, in either encoding.
    fn read_text(attr: &hdf5::Attribute) -> Option<String> {
        if let Ok(text) = attr.read_scalar::<VarLenUnicode>() {
            return Some(text.as_str().to_string());
        }
        if let Ok(text) = attr.read_scalar::<VarLenAscii>() {
            return Some(text.as_str().to_string());
        }
        if let Ok(text) = attr.read_scalar::<FixedAscii<FIXED_TEXT_LEN>>() {
            return Some(text.as_str().to_string());
        }
        if let Ok(text) = attr.read_scalar::<FixedUnicode<FIXED_TEXT_LEN>>() {
            return Some(text.as_str().to_string());
        }
        None
    }

    struct Hdf5Payload {
        file: hdf5::File,
    }

    impl TilePayloadReader for Hdf5Payload {
        fn metadata(&self, field: &MetadataField) -> Result<String, DecodeError> {
            let group = self
                .file
                .group(&field.group)
                .map_err(|_| DecodeError::MissingMetadata(field.key()))?;
            let attr = group
                .attr(&field.attribute)
                .map_err(|_| DecodeError::MissingMetadata(field.key()))?;

            if let Some(text) = read_text(&attr) {
                return Ok(text);
            }
            // Numeric attributes are rendered space separated
            let values = attr
                .read_raw::<f64>()
                .map_err(|e| payload_error(&field.key(), e))?;
            Ok(values
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" "))
        }

        fn read_band(&self, selector: &BandSelector) -> Result<BandData, DecodeError> {
            let dataset = self
                .file
                .dataset(&selector.dataset)
                .map_err(|e| payload_error(&selector.dataset, e))?;
            let shape = dataset.shape();
            let [height, width] = shape[..] else {
                return Err(DecodeError::Payload(format!(
                    "{} is {}-dimensional, expected 2",
                    selector.dataset,
                    shape.len()
                )));
            };
            let values = dataset
                .read_raw::<f32>()
                .map_err(|e| payload_error(&selector.dataset, e))?;
            Ok(BandData {
                width,
                height,
                values,
            })
        }
    }
}
