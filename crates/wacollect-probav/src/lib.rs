//! # wacollect-probav
//!
//! Retrieval and mosaicking of PROBA-V 100 m composites.
//!
//! The archive serves the globe as a grid of 10°×10° tiles, one HDF5 payload
//! per tile, date and product version. Given a bounding box and a date range
//! this crate works out which tiles cover the box, downloads and decodes
//! them band by band, stitches them into one raster per date and band, and
//! writes that raster as a GeoTIFF.
//!
//! ## Pipeline
//!
//! - [`TileGrid::tiles_for`] lists the tiles intersecting a [`BoundingBox`].
//! - [`TileFetcher`] resolves the archive version for a date and downloads
//!   each payload into scratch, reusing whatever is already there.
//! - [`TileDecoder`] turns a payload into a georeferenced [`DecodedTile`],
//!   or a NaN placeholder when the tile is unavailable.
//! - [`MosaicBuilder`] merges tiles onto the union of their pixel grids,
//!   cropped to the box, first tile wins on overlap.
//! - [`RetrievalDriver`] runs all of this per date, optionally on a pool of
//!   workers, and reports what happened.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use chrono::NaiveDate;
//! use wacollect_probav::{
//!     default_opener, http_transport, Band, BoundingBox, CredentialProvider, DriverConfig,
//!     EnvCredentials, Product, RetrievalDriver, RetrievalRequest, VITO,
//! };
//!
//! let credentials = EnvCredentials::default().credentials(VITO)?;
//! let transport = Arc::new(http_transport(Duration::from_secs(300))?);
//! let opener = default_opener().expect("built with the hdf5 feature");
//!
//! let driver = RetrievalDriver::new(
//!     DriverConfig::new(Product::default(), credentials),
//!     transport,
//!     opener,
//! );
//! let report = driver.run(&RetrievalRequest {
//!     start: NaiveDate::from_ymd_opt(2015, 3, 1).unwrap(),
//!     end: NaiveDate::from_ymd_opt(2015, 3, 31).unwrap(),
//!     bbox: BoundingBox::new(2.0, 13.0, 4.0, 15.0)?,
//!     bands: vec![Band::B1],
//!     output_root: "/data/probav".into(),
//! });
//! println!("{} dates failed", report.failed());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod config;
mod credentials;
mod decoder;
mod driver;
mod error;
mod fetcher;
mod grid;
mod layout;
mod listing;
mod mosaic;
mod payload;
mod product;
mod transport;

pub use config::{BboxConfig, CollectConfig};
pub use credentials::{CredentialProvider, Credentials, EnvCredentials, StaticCredentials, VITO};
pub use decoder::{parse_pixel_size, DecodedTile, TileDecoder, NODATA};
pub use driver::{
    BandFailure, BatchReport, DateOutcome, DateReport, DriverConfig, ProgressCallback,
    RetrievalDriver, RetrievalRequest,
};
pub use error::{
    ConfigError, DecodeError, MosaicError, ProbavError, TileUnavailable, TransportError,
};
pub use fetcher::{AssetSource, FetchOutcome, TileAsset, TileFetcher};
pub use grid::{BoundingBox, TileGrid, TileIndex};
pub use layout::{partial_path, payload_filename, LocalLayout, RemoteLayout, DEFAULT_ENDPOINT};
pub use listing::{parse_version_token, VersionToken};
pub use mosaic::{Mosaic, MosaicBuilder, DEFAULT_COORDINATE_TOLERANCE};
#[cfg(feature = "hdf5")]
pub use payload::Hdf5Opener;
pub use payload::{default_opener, BandData, MetadataField, PayloadOpener, TilePayloadReader};
pub use product::{Band, BandSelector, Cadence, Level, Product};
pub use transport::{http_transport, HttpTransport, RelaxedFallback, ReqwestTransport, Transport};

/// Result type for retrieval operations.
pub type Result<T> = std::result::Result<T, ProbavError>;
