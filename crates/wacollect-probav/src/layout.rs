//! Remote URLs and local paths of the PROBA-V archive.
//!
//! Remote (listing month and day are not zero-padded):
//!
//! ```text
//! <endpoint>/S5_TOC_100_m_C1/2015/3/11/
//! <endpoint>/S5_TOC_100_m_C1/2015/3/11/PV_S5_TOC-20150311_100M_V101/
//!     PROBAV_S5_TOC_X18Y07_20150311_100M_V101.HDF5
//! ```
//!
//! Local:
//!
//! ```text
//! <root>/TOC/PROBAV/5-daily/TOC_S5_PROBAV_-_5-daily_2015.03.11_B1.tif
//! <root>/TOC/PROBAV/5-daily/Temp/PROBAV_S5_TOC_X18Y07_20150311_100M_V101.HDF5
//! <root>/TOC/PROBAV/5-daily/Temp/PROBAV_S5_TOC_X18Y07_20150311_100M_V101_B1.tif
//! ```

use crate::grid::TileIndex;
use crate::listing::VersionToken;
use crate::product::{Band, Product};
use chrono::{Datelike, NaiveDate};
use std::path::{Path, PathBuf};

/// Base URL of the free 100 m data pool.
pub const DEFAULT_ENDPOINT: &str = "https://www.vito-eodata.be/PDF/datapool/Free_Data/PROBA-V_100m";

fn compact_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// `PROBAV_S5_TOC_X18Y07_20150311_100M_V101`, shared by payload and cache names.
fn tile_stem(
    product: Product,
    index: TileIndex,
    date: NaiveDate,
    version: &VersionToken,
) -> String {
    format!(
        "PROBAV_{}_{}_{}_{}_100M_{}",
        product.cadence.code(),
        product.level,
        index,
        compact_date(date),
        version
    )
}

/// Raw payload file name, identical on the server and in scratch.
pub fn payload_filename(
    product: Product,
    index: TileIndex,
    date: NaiveDate,
    version: &VersionToken,
) -> String {
    format!("{}.HDF5", tile_stem(product, index, date, version))
}

/// URLs on the provider's server.
#[derive(Debug, Clone)]
pub struct RemoteLayout {
    endpoint: String,
    product: Product,
}

impl RemoteLayout {
    /// Layout rooted at `endpoint` (trailing slashes are ignored).
    pub fn new(endpoint: impl Into<String>, product: Product) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Self { endpoint, product }
    }

    /// Product collection folder, e.g. `S5_TOC_100_m_C1`.
    pub fn collection(&self) -> String {
        format!("{}_{}_100_m_C1", self.product.cadence.code(), self.product.level)
    }

    /// Directory listing for one date, with trailing slash.
    pub fn listing_url(&self, date: NaiveDate) -> String {
        format!(
            "{}/{}/{}/{}/{}/",
            self.endpoint,
            self.collection(),
            date.year(),
            date.month(),
            date.day()
        )
    }

    /// Folder holding every tile of one date, e.g. `PV_S5_TOC-20150311_100M_V101`.
    pub fn tile_folder(&self, date: NaiveDate, version: &VersionToken) -> String {
        format!(
            "PV_{}_{}-{}_100M_{}",
            self.product.cadence.code(),
            self.product.level,
            compact_date(date),
            version
        )
    }

    /// Download URL of one tile payload.
    pub fn tile_url(&self, index: TileIndex, date: NaiveDate, version: &VersionToken) -> String {
        format!(
            "{}{}/{}",
            self.listing_url(date),
            self.tile_folder(date, version),
            payload_filename(self.product, index, date, version)
        )
    }
}

/// Output and scratch paths on local storage.
#[derive(Debug, Clone)]
pub struct LocalLayout {
    output_dir: PathBuf,
    scratch_dir: PathBuf,
    product: Product,
}

impl LocalLayout {
    /// Layout for `product` under `output_root`.
    pub fn new<P: AsRef<Path>>(output_root: P, product: Product) -> Self {
        let output_dir = output_root
            .as_ref()
            .join(product.level.as_str())
            .join("PROBAV")
            .join(product.cadence.name());
        let scratch_dir = output_dir.join("Temp");
        Self {
            output_dir,
            scratch_dir,
            product,
        }
    }

    /// Folder holding finished mosaics.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Folder holding payloads and decoded tiles.
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Create the output and scratch folders.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.scratch_dir)
    }

    /// Finished mosaic for one date and band.
    pub fn output_path(&self, date: NaiveDate, band: Band) -> PathBuf {
        self.output_dir.join(format!(
            "{}_PROBAV_-_{}_{}_{}.tif",
            self.product,
            self.product.cadence.name(),
            date.format("%Y.%m.%d"),
            band
        ))
    }

    /// Whether the finished mosaic for one date and band exists.
    pub fn output_exists(&self, date: NaiveDate, band: Band) -> bool {
        self.output_path(date, band).is_file()
    }

    /// Raw payload in scratch.
    pub fn payload_path(
        &self,
        index: TileIndex,
        date: NaiveDate,
        version: &VersionToken,
    ) -> PathBuf {
        self.scratch_dir
            .join(payload_filename(self.product, index, date, version))
    }

    /// Decoded single-band tile in scratch.
    pub fn decoded_tile_path(
        &self,
        index: TileIndex,
        date: NaiveDate,
        version: &VersionToken,
        band: Band,
    ) -> PathBuf {
        self.scratch_dir.join(format!(
            "{}_{}.tif",
            tile_stem(self.product, index, date, version),
            band
        ))
    }
}

/// In-progress sibling of `path`, renamed into place once complete.
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}
