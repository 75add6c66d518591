//! Locating and downloading tile payloads.
//!
//! For each `(tile, date, band)` the fetcher:
//! 1. resolves the date's version token from the server's directory listing,
//! 2. derives the tile's file names from product, tile, date and version,
//! 3. short-circuits when the decoded tile is already in scratch,
//! 4. otherwise reuses a raw payload already in scratch, or downloads it.
//!
//! Failures never escape as errors: they come back as
//! [`FetchOutcome::Unavailable`] and the decoder turns them into placeholders.
//!
//! A fetcher serves a single date task and is not shared between workers, so
//! its listing cache needs no locking.

use crate::credentials::Credentials;
use crate::grid::TileIndex;
use crate::layout::{partial_path, LocalLayout, RemoteLayout};
use crate::listing::{parse_version_token, VersionToken};
use crate::product::{Band, Product};
use crate::transport::Transport;
use crate::{TileUnavailable, TransportError};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use wacollect_metrics::{metric_defs, CollectLabels};

/// Where a ready tile's pixels come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSource {
    /// Decoded single-band GeoTIFF from an earlier run.
    Cached(PathBuf),
    /// Raw provider payload still to be decoded.
    Payload(PathBuf),
}

/// A tile that is ready for decoding.
#[derive(Debug, Clone)]
pub struct TileAsset {
    /// Grid position.
    pub index: TileIndex,
    /// Requested band.
    pub band: Band,
    /// Composite date.
    pub date: NaiveDate,
    /// Server-side processing version.
    pub version: VersionToken,
    /// Pixel source.
    pub source: AssetSource,
    /// Where the decoded tile is cached.
    pub decoded_path: PathBuf,
}

/// Result of fetching one tile.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Tile can be decoded.
    Ready(TileAsset),
    /// Tile could not be obtained.
    Unavailable {
        /// Grid position.
        index: TileIndex,
        /// Requested band.
        band: Band,
        /// Composite date.
        date: NaiveDate,
        /// What went wrong.
        reason: TileUnavailable,
    },
}

impl FetchOutcome {
    /// Grid position of the tile.
    pub fn index(&self) -> TileIndex {
        match self {
            FetchOutcome::Ready(asset) => asset.index,
            FetchOutcome::Unavailable { index, .. } => *index,
        }
    }
}

/// Fetches tiles of one product for one date task.
pub struct TileFetcher {
    transport: Arc<dyn Transport>,
    credentials: Credentials,
    product: Product,
    remote: RemoteLayout,
    local: LocalLayout,
    versions: HashMap<NaiveDate, VersionToken>,
}

impl std::fmt::Debug for TileFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileFetcher")
            .field("product", &self.product)
            .field("remote", &self.remote)
            .field("local", &self.local)
            .finish_non_exhaustive()
    }
}

impl TileFetcher {
    /// Create a fetcher.
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Credentials,
        product: Product,
        remote: RemoteLayout,
        local: LocalLayout,
    ) -> Self {
        Self {
            transport,
            credentials,
            product,
            remote,
            local,
            versions: HashMap::new(),
        }
    }

    /// Fetch one tile. Never fails; problems come back as
    /// [`FetchOutcome::Unavailable`].
    pub fn fetch(&mut self, index: TileIndex, date: NaiveDate, band: Band) -> FetchOutcome {
        match self.try_fetch(index, date, band) {
            Ok(asset) => FetchOutcome::Ready(asset),
            Err(reason) => FetchOutcome::Unavailable {
                index,
                band,
                date,
                reason,
            },
        }
    }

    fn try_fetch(
        &mut self,
        index: TileIndex,
        date: NaiveDate,
        band: Band,
    ) -> Result<TileAsset, TileUnavailable> {
        let version = self.resolve_version(date)?;
        let labels = CollectLabels::new(self.product.to_string(), band.as_str());

        let decoded_path = self.local.decoded_tile_path(index, date, &version, band);
        if decoded_path.is_file() {
            debug!(tile = %index, band = %band, %date, "Decoded tile already in scratch");
            metrics::counter!(metric_defs::TILES_CACHE_HITS.name, &labels.to_labels()).increment(1);
            return Ok(TileAsset {
                index,
                band,
                date,
                version,
                source: AssetSource::Cached(decoded_path.clone()),
                decoded_path,
            });
        }

        let payload_path = self.local.payload_path(index, date, &version);
        if payload_path.is_file() {
            debug!(tile = %index, band = %band, %date, "Reusing payload in scratch");
            metrics::counter!(metric_defs::TILES_CACHE_HITS.name, &labels.to_labels()).increment(1);
        } else {
            let url = self.remote.tile_url(index, date, &version);
            let bytes = self.download(&url, &payload_path)?;
            info!(tile = %index, %date, bytes, "Downloaded tile payload");
            metrics::counter!(metric_defs::TILES_DOWNLOADED.name, &labels.to_labels()).increment(1);
            metrics::counter!(metric_defs::TILES_BYTES_DOWNLOADED.name, &labels.to_labels())
                .increment(bytes);
        }

        Ok(TileAsset {
            index,
            band,
            date,
            version,
            source: AssetSource::Payload(payload_path),
            decoded_path,
        })
    }

    /// Version token for `date`, listing the server directory on first use.
    pub fn resolve_version(&mut self, date: NaiveDate) -> Result<VersionToken, TileUnavailable> {
        if let Some(version) = self.versions.get(&date) {
            return Ok(version.clone());
        }

        let url = self.remote.listing_url(date);
        let body = self
            .transport
            .get(&url, &self.credentials)
            .map_err(TileUnavailable::Listing)?;
        let version = parse_version_token(&String::from_utf8_lossy(&body))
            .ok_or(TileUnavailable::NoVersion { url })?;

        debug!(%date, %version, "Resolved version token");
        self.versions.insert(date, version.clone());
        Ok(version)
    }

    /// Download `url` to `dest` via a `.part` sibling. Returns the byte count.
    fn download(&self, url: &str, dest: &Path) -> Result<u64, TileUnavailable> {
        let bytes = self
            .transport
            .get(url, &self.credentials)
            .map_err(TileUnavailable::Download)?;
        if bytes.is_empty() {
            return Err(TileUnavailable::Download(TransportError::Body {
                url: url.to_string(),
                message: "empty body".to_string(),
            }));
        }

        let partial = partial_path(dest);
        fs::write(&partial, &bytes)?;
        fs::rename(&partial, dest)?;
        Ok(bytes.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::{Cadence, Level};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const LISTING: &str = r#"<a href="../">up</a><a href="PV_S5_TOC-20150311_100M_V101/">d</a>"#;

    /// Serves a listing and payloads, counting calls per kind.
    #[derive(Default)]
    struct FakeArchive {
        listings: AtomicUsize,
        downloads: AtomicUsize,
        fail_downloads: bool,
        listing_body: Option<&'static str>,
        urls: Mutex<Vec<String>>,
    }

    impl Transport for FakeArchive {
        fn get(&self, url: &str, _credentials: &Credentials) -> Result<Vec<u8>, TransportError> {
            self.urls.lock().unwrap().push(url.to_string());
            if url.ends_with('/') {
                self.listings.fetch_add(1, Ordering::SeqCst);
                return Ok(self.listing_body.unwrap_or(LISTING).as_bytes().to_vec());
            }
            self.downloads.fetch_add(1, Ordering::SeqCst);
            if self.fail_downloads {
                return Err(TransportError::Status {
                    url: url.to_string(),
                    status: 404,
                });
            }
            Ok(format!("payload for {url}").into_bytes())
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2015, 3, 11).unwrap()
    }

    fn fetcher(archive: Arc<FakeArchive>, root: &Path) -> TileFetcher {
        let product = Product::new(Level::Toc, Cadence::FiveDaily);
        let local = LocalLayout::new(root, product);
        local.ensure_dirs().unwrap();
        TileFetcher::new(
            archive,
            Credentials::new("u", "p"),
            product,
            RemoteLayout::new("http://archive.test", product),
            local,
        )
    }

    #[test]
    fn test_download_then_reuse_payload() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Arc::new(FakeArchive::default());
        let mut fetcher = fetcher(archive.clone(), dir.path());

        let outcome = fetcher.fetch(TileIndex::new(18, 7), date(), Band::Sm);
        let FetchOutcome::Ready(first) = outcome else {
            panic!("tile should be ready");
        };
        assert_eq!(first.version.as_str(), "V101");
        let AssetSource::Payload(path) = &first.source else {
            panic!("expected payload source");
        };
        assert!(path.ends_with("PROBAV_S5_TOC_X18Y07_20150311_100M_V101.HDF5"));
        assert!(path.is_file());
        assert!(!partial_path(path).exists());

        // Second band of the same tile: no download, no second listing
        let outcome = fetcher.fetch(TileIndex::new(18, 7), date(), Band::B1);
        assert!(matches!(outcome, FetchOutcome::Ready(_)));
        assert_eq!(archive.listings.load(Ordering::SeqCst), 1);
        assert_eq!(archive.downloads.load(Ordering::SeqCst), 1);

        let urls = archive.urls.lock().unwrap();
        assert_eq!(
            urls[1],
            concat!(
                "http://archive.test/S5_TOC_100_m_C1/2015/3/11/PV_S5_TOC-20150311_100M_V101/",
                "PROBAV_S5_TOC_X18Y07_20150311_100M_V101.HDF5"
            )
        );
    }

    #[test]
    fn test_decoded_tile_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Arc::new(FakeArchive::default());
        let mut fetcher = fetcher(archive.clone(), dir.path());

        let version = VersionToken::new("V101");
        let cached = fetcher
            .local
            .decoded_tile_path(TileIndex::new(18, 7), date(), &version, Band::B2);
        fs::write(&cached, b"tif").unwrap();

        let outcome = fetcher.fetch(TileIndex::new(18, 7), date(), Band::B2);
        let FetchOutcome::Ready(asset) = outcome else {
            panic!("tile should be ready");
        };
        assert_eq!(asset.source, AssetSource::Cached(cached));
        assert_eq!(archive.downloads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_missing_version_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Arc::new(FakeArchive {
            listing_body: Some(r#"<a href="../">up</a>"#),
            ..Default::default()
        });
        let mut fetcher = fetcher(archive.clone(), dir.path());

        let outcome = fetcher.fetch(TileIndex::new(18, 7), date(), Band::B3);
        assert!(matches!(
            outcome,
            FetchOutcome::Unavailable {
                reason: TileUnavailable::NoVersion { .. },
                ..
            }
        ));
        assert_eq!(outcome.index(), TileIndex::new(18, 7));
        assert_eq!(archive.downloads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failed_download_leaves_no_payload() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Arc::new(FakeArchive {
            fail_downloads: true,
            ..Default::default()
        });
        let mut fetcher = fetcher(archive.clone(), dir.path());

        let outcome = fetcher.fetch(TileIndex::new(19, 7), date(), Band::B4);
        assert!(matches!(
            outcome,
            FetchOutcome::Unavailable {
                reason: TileUnavailable::Download(TransportError::Status { status: 404, .. }),
                ..
            }
        ));
        let scratch: Vec<_> = fs::read_dir(fetcher.local.scratch_dir()).unwrap().collect();
        assert!(scratch.is_empty());
    }
}
