//! Error types for the PROBA-V collector.

use crate::grid::BoundingBox;
use thiserror::Error;

/// Errors surfaced by the collector outside the per-tile boundary.
#[derive(Debug, Error)]
pub enum ProbavError {
    /// Bounding box is inverted, out of range or not finite.
    #[error("Invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    /// Product name does not parse (expected e.g. `TOC_S5`).
    #[error("Unknown product '{0}' (expected <TOC|TOA>_<S1|S5|S10>)")]
    UnknownProduct(String),

    /// Band name does not parse.
    #[error("Unknown band '{0}' (expected one of SM, B1, B2, B3, B4)")]
    UnknownBand(String),

    /// No credentials available for a provider.
    #[error("No credentials for provider {provider}: {reason}")]
    MissingCredentials {
        /// Provider name, e.g. `VITO`.
        provider: String,
        /// Why the lookup failed.
        reason: String,
    },

    /// Mosaic could not be assembled.
    #[error("Mosaic error: {0}")]
    Mosaic(#[from] MosaicError),

    /// Writing the output raster failed.
    #[error("Raster error: {0}")]
    Raster(#[from] wacollect_raster::RasterError),

    /// Filesystem error around output or scratch directories.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the HTTP layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection, TLS or timeout failure before a response arrived.
    #[error("Request to {url} failed: {message}")]
    Connection {
        /// Requested URL.
        url: String,
        /// Underlying error text.
        message: String,
    },

    /// Server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Redirect without a usable `Location` header.
    #[error("Bad redirect from {url}: {reason}")]
    Redirect {
        /// Requested URL.
        url: String,
        /// What was wrong with the redirect.
        reason: String,
    },

    /// Response body could not be read.
    #[error("Failed to read body from {url}: {message}")]
    Body {
        /// Requested URL.
        url: String,
        /// Underlying error text.
        message: String,
    },

    /// HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

impl TransportError {
    /// Whether the failure happened below HTTP (connect, TLS, timeout).
    ///
    /// Only these failures are retried with the relaxed transport.
    pub fn is_transport_level(&self) -> bool {
        matches!(self, TransportError::Connection { .. })
    }
}

/// Errors turning a tile payload into pixels.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Embedded metadata field is absent.
    #[error("Missing metadata field {0}")]
    MissingMetadata(String),

    /// Embedded metadata field did not parse.
    #[error("Metadata field {field} = {value:?} is unusable: {reason}")]
    InvalidMetadata {
        /// Field key.
        field: String,
        /// Raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Payload container could not be opened or read.
    #[error("Payload error: {0}")]
    Payload(String),

    /// Band buffer shape does not match its data.
    #[error("Band {dataset} has shape {width}x{height} but {actual} values")]
    BadShape {
        /// Dataset path.
        dataset: String,
        /// Reported width.
        width: usize,
        /// Reported height.
        height: usize,
        /// Values read.
        actual: usize,
    },

    /// Reading a cached decoded tile failed.
    #[error("Cached tile error: {0}")]
    Raster(#[from] wacollect_raster::RasterError),
}

/// Why a tile could not be obtained. Always recovered with a placeholder.
#[derive(Debug, Error)]
pub enum TileUnavailable {
    /// Directory listing had no entry carrying a version token.
    #[error("No version token in listing {url}")]
    NoVersion {
        /// Listing URL.
        url: String,
    },

    /// Directory listing request failed.
    #[error("Listing failed: {0}")]
    Listing(TransportError),

    /// Tile download failed after the relaxed fallback.
    #[error("Download failed: {0}")]
    Download(TransportError),

    /// Payload could not be written to scratch storage.
    #[error("Scratch I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Payload was obtained but did not decode.
    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),
}

impl TileUnavailable {
    /// Short label used for the placeholder metric.
    pub fn label(&self) -> &'static str {
        match self {
            TileUnavailable::NoVersion { .. } => "no_version",
            TileUnavailable::Listing(_) | TileUnavailable::Download(_) => "transport",
            TileUnavailable::Io(_) => "io",
            TileUnavailable::Decode(_) => "decode",
        }
    }
}

/// Errors assembling a mosaic.
#[derive(Debug, Error)]
pub enum MosaicError {
    /// No tiles were supplied.
    #[error("No tiles to mosaic")]
    NoTiles,

    /// Tiles were supplied but none has a pixel strictly inside the box.
    #[error("No tile pixel falls inside {0}")]
    EmptyIntersection(BoundingBox),
}

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid YAML for this schema.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Values parse but are inconsistent.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
