//! End-to-end retrieval against an in-memory archive.
//!
//! The fake grid has 10-pixel tiles of 1° so whole mosaics stay small. Each
//! fake payload is filled with `100 * x + y` of its tile, which makes the
//! origin of every output pixel visible.

use chrono::NaiveDate;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use wacollect_probav::{
    Band, BandData, BandSelector, BatchReport, BoundingBox, Credentials, DateOutcome,
    DecodeError, DriverConfig, LocalLayout, MetadataField, PayloadOpener, Product,
    RetrievalDriver, RetrievalRequest, TileGrid, TilePayloadReader, Transport, TransportError,
};
use wacollect_raster::{read_raster, GeoTransform, Raster};

const GRID: TileGrid = TileGrid {
    cell_size: 10.0,
    x_origin: -180.0,
    y_origin: 75.0,
    columns: 36,
    rows: 14,
    tile_pixels: 10,
    pixel_size: 1.0,
};

const LISTING: &str = r#"<html><a href="../">Parent</a>
<a href="PV_S5_TOC-20150301_100M_V101/">PV_S5_TOC-20150301_100M_V101/</a></html>"#;

/// Archive serving a listing for every directory and a payload naming its
/// own URL for every file.
#[derive(Default)]
struct FakeArchive {
    listings: AtomicUsize,
    downloads: AtomicUsize,
    missing: HashSet<&'static str>,
}

impl FakeArchive {
    fn missing(tiles: &[&'static str]) -> Self {
        Self {
            missing: tiles.iter().copied().collect(),
            ..Self::default()
        }
    }

    fn calls(&self) -> (usize, usize) {
        (
            self.listings.load(Ordering::SeqCst),
            self.downloads.load(Ordering::SeqCst),
        )
    }

    fn reset(&self) {
        self.listings.store(0, Ordering::SeqCst);
        self.downloads.store(0, Ordering::SeqCst);
    }
}

impl Transport for FakeArchive {
    fn get(&self, url: &str, credentials: &Credentials) -> Result<Vec<u8>, TransportError> {
        assert_eq!(credentials, &Credentials::new("user", "pass"));
        if url.ends_with('/') {
            self.listings.fetch_add(1, Ordering::SeqCst);
            return Ok(LISTING.as_bytes().to_vec());
        }
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if self.missing.iter().any(|tile| url.contains(tile)) {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: 404,
            });
        }
        Ok(url.as_bytes().to_vec())
    }
}

/// Reads the tile index back out of the payload written by [`FakeArchive`].
struct FakeOpener {
    opened: AtomicUsize,
}

impl PayloadOpener for FakeOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn TilePayloadReader>, DecodeError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let text = std::fs::read_to_string(path).map_err(|e| DecodeError::Payload(e.to_string()))?;
        let at = text
            .rfind("_X")
            .ok_or_else(|| DecodeError::Payload(format!("no tile in {text}")))?;
        let x: u32 = text[at + 2..at + 4].parse().map_err(|_| DecodeError::Payload(text.clone()))?;
        let y: u32 = text[at + 5..at + 7].parse().map_err(|_| DecodeError::Payload(text.clone()))?;
        Ok(Box::new(FakePayload { x, y }))
    }
}

struct FakePayload {
    x: u32,
    y: u32,
}

impl TilePayloadReader for FakePayload {
    fn metadata(&self, field: &MetadataField) -> Result<String, DecodeError> {
        // Pixel centres sit on the tile edges, as in the archive
        let value = match field.attribute.as_str() {
            "TOP_RIGHT_LATITUDE" => (75.0 - 10.0 * f64::from(self.y)).to_string(),
            "BOTTOM_LEFT_LONGITUDE" => (10.0 * f64::from(self.x) - 180.0).to_string(),
            "MAPPING" => "Geographic Lat/Lon 0.5 0.5 1.0 1.0 WGS84".to_string(),
            _ => return Err(DecodeError::MissingMetadata(field.key())),
        };
        Ok(value)
    }

    fn read_band(&self, _selector: &BandSelector) -> Result<BandData, DecodeError> {
        Ok(BandData {
            width: 10,
            height: 10,
            values: vec![(100 * self.x + self.y) as f32; 100],
        })
    }
}

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2015, 3, d).unwrap()
}

struct Harness {
    archive: Arc<FakeArchive>,
    opener: Arc<FakeOpener>,
    root: tempfile::TempDir,
}

impl Harness {
    fn new(archive: FakeArchive) -> Self {
        Self {
            archive: Arc::new(archive),
            opener: Arc::new(FakeOpener {
                opened: AtomicUsize::new(0),
            }),
            root: tempfile::tempdir().unwrap(),
        }
    }

    fn driver(&self, workers: usize, window_tiles: bool) -> RetrievalDriver {
        let mut config = DriverConfig::new(Product::default(), Credentials::new("user", "pass"));
        config.grid = GRID;
        config.endpoint = "http://archive.test/pool".to_string();
        config.workers = workers;
        config.window_tiles = window_tiles;
        RetrievalDriver::new(config, self.archive.clone(), self.opener.clone())
    }

    fn request(&self, bands: &[Band]) -> RetrievalRequest {
        RetrievalRequest {
            start: date(1),
            end: date(11),
            bbox: BoundingBox::new(2.0, 13.0, 4.0, 15.0).unwrap(),
            bands: bands.to_vec(),
            output_root: self.root.path().to_path_buf(),
        }
    }

    fn run(&self, bands: &[Band]) -> BatchReport {
        self.driver(1, true).run(&self.request(bands))
    }

    fn output(&self, day: u32, band: Band) -> PathBuf {
        LocalLayout::new(self.root.path(), Product::default()).output_path(date(day), band)
    }

    fn read(&self, day: u32, band: Band) -> Raster {
        read_raster(self.output(day, band)).unwrap()
    }
}

fn same_pixels(a: &Raster, b: &Raster) -> bool {
    a.dimensions() == b.dimensions()
        && a.data()
            .iter()
            .zip(b.data())
            .all(|(p, q)| p.to_bits() == q.to_bits())
}

#[test]
fn test_writes_one_mosaic_per_date_and_band() {
    let h = Harness::new(FakeArchive::default());
    let report = h.run(&[Band::Sm, Band::B1]);

    assert_eq!(report.dates.len(), 3);
    assert_eq!(report.written(), 3);
    assert!(!report.has_failures());
    // One listing per date, each payload downloaded once and reused for B1
    assert_eq!(h.archive.calls(), (3, 12));

    for day in [1, 6, 11] {
        for band in [Band::Sm, Band::B1] {
            assert!(h.output(day, band).is_file(), "{day} {band}");
        }
    }

    let sm = h.read(6, Band::Sm);
    assert_eq!(sm.dimensions(), (11, 11));
    assert_eq!(sm.geotransform(), GeoTransform::new(4.5, 1.0, 12.5, -1.0));
    assert_eq!(sm.nan_count(), 0);
    assert_eq!(sm.get(0, 0), Some(1806.0));
    assert_eq!(sm.get(0, 4), Some(1806.0));
    assert_eq!(sm.get(0, 5), Some(1906.0));
    assert_eq!(sm.get(6, 0), Some(1806.0));
    assert_eq!(sm.get(7, 0), Some(1807.0));
    assert_eq!(sm.get(10, 10), Some(1907.0));

    let b1 = h.read(6, Band::B1);
    approx::assert_relative_eq!(b1.get(10, 10).unwrap(), 1907.0 * 0.005, epsilon = 1e-4);
}

#[test]
fn test_second_run_makes_no_network_calls() {
    let h = Harness::new(FakeArchive::default());
    h.run(&[Band::Sm]);
    let before = h.read(11, Band::Sm);
    h.archive.reset();

    let report = h.run(&[Band::Sm]);

    assert_eq!(h.archive.calls(), (0, 0));
    assert_eq!(report.skipped(), 3);
    assert!(same_pixels(&before, &h.read(11, Band::Sm)));
}

#[test]
fn test_rerun_rebuilds_deleted_output_from_scratch() {
    let h = Harness::new(FakeArchive::default());
    h.run(&[Band::Sm]);
    let before = h.read(6, Band::Sm);
    std::fs::remove_file(h.output(6, Band::Sm)).unwrap();
    h.archive.reset();
    let opened = h.opener.opened.load(Ordering::SeqCst);

    let report = h.run(&[Band::Sm]);

    // Only the version listing; decoded tiles come from scratch
    assert_eq!(h.archive.calls(), (1, 0));
    assert_eq!(h.opener.opened.load(Ordering::SeqCst), opened);
    assert_eq!((report.written(), report.skipped()), (1, 2));
    assert!(same_pixels(&before, &h.read(6, Band::Sm)));
}

#[test]
fn test_new_band_reuses_downloaded_payloads() {
    let h = Harness::new(FakeArchive::default());
    h.run(&[Band::Sm]);
    h.archive.reset();

    let report = h.run(&[Band::Sm, Band::B4]);

    assert_eq!(h.archive.calls(), (3, 0));
    assert_eq!(report.written(), 3);
    for r in &report.dates {
        assert!(matches!(&r.outcome, DateOutcome::Written { bands } if bands == &[Band::B4]));
    }
}

#[test]
fn test_missing_tile_becomes_nan_placeholder() {
    let h = Harness::new(FakeArchive::missing(&["X19Y07"]));
    let report = h.run(&[Band::Sm]);

    assert!(!report.has_failures());
    assert_eq!(report.written(), 3);
    assert_eq!(report.placeholders(), 3);

    let sm = h.read(1, Band::Sm);
    assert_eq!(sm.dimensions(), (11, 11));
    assert!(sm.get(10, 10).unwrap().is_nan());
    assert!(sm.get(7, 5).unwrap().is_nan());
    assert_eq!(sm.get(6, 5), Some(1906.0));
    assert_eq!(sm.get(10, 4), Some(1807.0));
    assert_eq!(sm.nan_count(), 4 * 6);
}

#[test]
fn test_missing_tile_is_retried_on_next_run() {
    let h = Harness::new(FakeArchive::missing(&["X19Y07"]));
    h.run(&[Band::Sm]);
    std::fs::remove_file(h.output(1, Band::Sm)).unwrap();
    h.archive.reset();

    h.run(&[Band::Sm]);

    assert_eq!(h.archive.calls(), (1, 1));
}

#[test]
fn test_failed_output_is_isolated_to_its_date() {
    let h = Harness::new(FakeArchive::default());
    std::fs::create_dir_all(h.output(6, Band::Sm)).unwrap();

    let report = h.run(&[Band::Sm]);

    assert!(report.has_failures());
    assert_eq!(report.failed_dates(), vec![date(6)]);
    assert_eq!(report.written(), 2);
    match &report.dates[1].outcome {
        DateOutcome::Failed { written, failures } => {
            assert!(written.is_empty());
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].band, Band::Sm);
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(h.output(1, Band::Sm).is_file());
    assert!(h.output(11, Band::Sm).is_file());
}

#[test]
fn test_parallel_run_matches_sequential() {
    let sequential = Harness::new(FakeArchive::missing(&["X18Y06"]));
    let parallel = Harness::new(FakeArchive::missing(&["X18Y06"]));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let a = sequential.run(&[Band::Sm, Band::B2]);
    let b = parallel
        .driver(3, true)
        .with_progress(move |r| sink.lock().unwrap().push(r.date))
        .run(&parallel.request(&[Band::Sm, Band::B2]));

    let dates: Vec<_> = b.dates.iter().map(|r| r.date).collect();
    assert_eq!(dates, vec![date(1), date(6), date(11)]);
    assert_eq!(seen.lock().unwrap().len(), 3);
    assert_eq!(a.written(), b.written());
    for day in [1, 6, 11] {
        for band in [Band::Sm, Band::B2] {
            assert!(same_pixels(&sequential.read(day, band), &parallel.read(day, band)));
        }
    }
}

#[test]
fn test_windowing_does_not_change_mosaic() {
    let windowed = Harness::new(FakeArchive::missing(&["X19Y06"]));
    let full = Harness::new(FakeArchive::missing(&["X19Y06"]));

    windowed.run(&[Band::Sm]);
    full.driver(1, false).run(&full.request(&[Band::Sm]));

    let (a, b) = (windowed.read(6, Band::Sm), full.read(6, Band::Sm));
    assert_eq!(a.geotransform(), b.geotransform());
    assert!(same_pixels(&a, &b));
}
