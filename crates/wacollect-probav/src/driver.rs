//! Orchestrating retrieval over a date range.
//!
//! Each date is an independent task: it indexes the box, fetches and decodes
//! every tile per missing band, stitches the mosaic and writes it. A date
//! whose outputs all exist is skipped without touching the network. Failures
//! stay inside their date and are reported, never raised.
//!
//! With `workers > 1` dates are spread over a dedicated rayon pool. Tasks
//! share nothing mutable: every task builds its own fetcher and decoder, and
//! scratch file names embed tile, date, version and band.

use crate::credentials::Credentials;
use crate::decoder::{DecodedTile, TileDecoder};
use crate::fetcher::TileFetcher;
use crate::grid::{BoundingBox, TileGrid, TileIndex};
use crate::layout::{partial_path, LocalLayout, RemoteLayout, DEFAULT_ENDPOINT};
use crate::mosaic::MosaicBuilder;
use crate::payload::PayloadOpener;
use crate::product::{Band, Product};
use crate::transport::Transport;
use crate::{MosaicError, ProbavError, Result};
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, instrument, warn};
use wacollect_metrics::{metric_defs, CollectLabels};
use wacollect_raster::save_raster;

/// Called once per finished date, from whichever worker finished it.
pub type ProgressCallback = Box<dyn Fn(&DateReport) + Send + Sync>;

/// Everything the driver needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Product to collect.
    pub product: Product,
    /// Tile grid of the product.
    pub grid: TileGrid,
    /// Base URL of the archive.
    pub endpoint: String,
    /// Archive account, looked up once by the caller.
    pub credentials: Credentials,
    /// Dates processed concurrently; 0 or 1 runs sequentially.
    pub workers: usize,
    /// Crop tiles to the box before mosaicking.
    pub window_tiles: bool,
}

impl DriverConfig {
    /// Sequential configuration for `product` against the public archive.
    pub fn new(product: Product, credentials: Credentials) -> Self {
        Self {
            product,
            grid: TileGrid::PROBAV_100M,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            credentials,
            workers: 1,
            window_tiles: true,
        }
    }
}

/// What to retrieve and where to put it.
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    /// First date (snapped back to a composite start).
    pub start: NaiveDate,
    /// Last date, inclusive.
    pub end: NaiveDate,
    /// Area of interest.
    pub bbox: BoundingBox,
    /// Bands to write.
    pub bands: Vec<Band>,
    /// Root of the output tree.
    pub output_root: PathBuf,
}

/// One band that could not be written.
#[derive(Debug, Clone, Serialize)]
pub struct BandFailure {
    /// The band.
    pub band: Band,
    /// Error text.
    pub error: String,
}

/// Final state of one date.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DateOutcome {
    /// Every requested output already existed.
    Skipped,
    /// Every missing output was written.
    Written {
        /// Bands written by this run.
        bands: Vec<Band>,
    },
    /// At least one missing output could not be written.
    Failed {
        /// Bands written by this run.
        written: Vec<Band>,
        /// Bands that failed.
        failures: Vec<BandFailure>,
    },
}

/// Report for one date.
#[derive(Debug, Clone, Serialize)]
pub struct DateReport {
    /// Composite date.
    pub date: NaiveDate,
    /// What happened.
    #[serde(flatten)]
    pub outcome: DateOutcome,
    /// Tiles replaced by placeholders, over all bands.
    pub placeholders: usize,
}

impl DateReport {
    /// Whether any band failed.
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, DateOutcome::Failed { .. })
    }
}

/// Report for a whole run, in date order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// Per-date reports.
    pub dates: Vec<DateReport>,
}

impl BatchReport {
    /// Dates with at least one failed band.
    pub fn failed_dates(&self) -> Vec<NaiveDate> {
        self.dates.iter().filter(|r| r.is_failed()).map(|r| r.date).collect()
    }

    /// Whether any date failed.
    pub fn has_failures(&self) -> bool {
        self.dates.iter().any(DateReport::is_failed)
    }

    /// Number of dates that were written.
    pub fn written(&self) -> usize {
        self.count(|o| matches!(o, DateOutcome::Written { .. }))
    }

    /// Number of dates that were skipped.
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, DateOutcome::Skipped))
    }

    /// Number of dates that failed.
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, DateOutcome::Failed { .. }))
    }

    /// Placeholder tiles over the whole run.
    pub fn placeholders(&self) -> usize {
        self.dates.iter().map(|r| r.placeholders).sum()
    }

    fn count(&self, pred: impl Fn(&DateOutcome) -> bool) -> usize {
        self.dates.iter().filter(|r| pred(&r.outcome)).count()
    }
}

/// Runs the retrieval pipeline over a date range.
pub struct RetrievalDriver {
    config: DriverConfig,
    transport: Arc<dyn Transport>,
    opener: Arc<dyn PayloadOpener>,
    mosaic: MosaicBuilder,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for RetrievalDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalDriver")
            .field("config", &self.config)
            .field("mosaic", &self.mosaic)
            .finish_non_exhaustive()
    }
}

impl RetrievalDriver {
    /// Create a driver.
    pub fn new(
        config: DriverConfig,
        transport: Arc<dyn Transport>,
        opener: Arc<dyn PayloadOpener>,
    ) -> Self {
        Self {
            config,
            transport,
            opener,
            mosaic: MosaicBuilder::default(),
            progress: None,
        }
    }

    /// Report each finished date to `callback`.
    pub fn with_progress(mut self, callback: impl Fn(&DateReport) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Use a custom mosaic builder.
    pub fn with_mosaic_builder(mut self, mosaic: MosaicBuilder) -> Self {
        self.mosaic = mosaic;
        self
    }

    /// Configuration in use.
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Dates and tiles a request would touch, without doing anything.
    pub fn plan(&self, request: &RetrievalRequest) -> (Vec<NaiveDate>, Vec<TileIndex>) {
        (
            self.config.product.cadence.dates(request.start, request.end),
            self.config.grid.tiles_for(&request.bbox),
        )
    }

    /// Process every date of `request`. Never fails; see the report.
    #[instrument(skip_all, fields(product = %self.config.product, bbox = %request.bbox))]
    pub fn run(&self, request: &RetrievalRequest) -> BatchReport {
        let (dates, tiles) = self.plan(request);
        let local = LocalLayout::new(&request.output_root, self.config.product);
        info!(
            dates = dates.len(),
            tiles = tiles.len(),
            bands = request.bands.len(),
            workers = self.config.workers,
            "Starting retrieval"
        );

        let process = |date: &NaiveDate| self.process_date(*date, request, &local, &tiles);
        let reports: Vec<DateReport> = if self.config.workers <= 1 || dates.len() <= 1 {
            dates.iter().map(process).collect()
        } else {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.workers)
                .thread_name(|i| format!("wacollect-worker-{i}"))
                .build()
            {
                Ok(pool) => pool.install(|| dates.par_iter().map(process).collect()),
                Err(err) => {
                    warn!(error = %err, "Could not start worker pool, running sequentially");
                    dates.iter().map(process).collect()
                }
            }
        };

        let report = BatchReport { dates: reports };
        info!(
            written = report.written(),
            skipped = report.skipped(),
            failed = report.failed(),
            placeholders = report.placeholders(),
            "Retrieval finished"
        );
        report
    }

    fn process_date(
        &self,
        date: NaiveDate,
        request: &RetrievalRequest,
        local: &LocalLayout,
        tiles: &[TileIndex],
    ) -> DateReport {
        let span = info_span!("date", date = %date);
        let _enter = span.enter();

        let in_flight = metrics::gauge!(metric_defs::DATES_IN_FLIGHT.name);
        in_flight.increment(1.0);
        let report = self.run_date(date, request, local, tiles);
        in_flight.decrement(1.0);

        let product = vec![("product", self.config.product.to_string())];
        match &report.outcome {
            DateOutcome::Skipped => {
                metrics::counter!(metric_defs::DATES_SKIPPED.name, &product).increment(1)
            }
            DateOutcome::Written { .. } => {
                metrics::counter!(metric_defs::DATES_WRITTEN.name, &product).increment(1)
            }
            DateOutcome::Failed { .. } => {
                metrics::counter!(metric_defs::DATES_FAILED.name, &product).increment(1)
            }
        }

        if let Some(progress) = &self.progress {
            progress(&report);
        }
        report
    }

    fn run_date(
        &self,
        date: NaiveDate,
        request: &RetrievalRequest,
        local: &LocalLayout,
        tiles: &[TileIndex],
    ) -> DateReport {
        let missing: Vec<Band> = request
            .bands
            .iter()
            .copied()
            .filter(|band| !local.output_exists(date, *band))
            .collect();
        if missing.is_empty() {
            debug!("All outputs exist, skipping");
            return DateReport {
                date,
                outcome: DateOutcome::Skipped,
                placeholders: 0,
            };
        }

        let mut task = DateTask {
            driver: self,
            date,
            request,
            local,
            tiles,
            fetcher: TileFetcher::new(
                Arc::clone(&self.transport),
                self.config.credentials.clone(),
                self.config.product,
                RemoteLayout::new(self.config.endpoint.clone(), self.config.product),
                local.clone(),
            ),
            decoder: TileDecoder::new(
                Arc::clone(&self.opener),
                self.config.grid,
                self.config.product,
            ),
            placeholders: 0,
        };

        let mut written = Vec::new();
        let mut failures = Vec::new();
        for band in missing {
            match task.build_band(band) {
                Ok(path) => {
                    info!(band = %band, path = %path.display(), "Wrote mosaic");
                    written.push(band);
                }
                Err(err) => {
                    error!(band = %band, error = %err, "Could not build mosaic");
                    failures.push(BandFailure {
                        band,
                        error: err.to_string(),
                    });
                }
            }
        }

        let outcome = if failures.is_empty() {
            DateOutcome::Written { bands: written }
        } else {
            DateOutcome::Failed { written, failures }
        };
        DateReport {
            date,
            outcome,
            placeholders: task.placeholders,
        }
    }
}

/// State of one date's work.
struct DateTask<'a> {
    driver: &'a RetrievalDriver,
    date: NaiveDate,
    request: &'a RetrievalRequest,
    local: &'a LocalLayout,
    tiles: &'a [TileIndex],
    fetcher: TileFetcher,
    decoder: TileDecoder,
    placeholders: usize,
}

impl DateTask<'_> {
    fn build_band(&mut self, band: Band) -> Result<PathBuf> {
        self.local.ensure_dirs()?;
        let bbox = &self.request.bbox;

        let mut decoded: Vec<DecodedTile> = Vec::with_capacity(self.tiles.len());
        for &index in self.tiles {
            let tile = self.decoder.decode(self.fetcher.fetch(index, self.date, band));
            if tile.is_placeholder() {
                self.placeholders += 1;
            }
            if self.driver.config.window_tiles {
                decoded.extend(tile.window(bbox));
            } else {
                decoded.push(tile);
            }
        }
        if decoded.is_empty() {
            return Err(MosaicError::EmptyIntersection(*bbox).into());
        }

        let started = Instant::now();
        let mosaic = self.driver.mosaic.build(&decoded, bbox)?;
        drop(decoded);
        let labels = CollectLabels::new(self.driver.config.product.to_string(), band.as_str())
            .to_labels();
        metrics::histogram!(metric_defs::MOSAIC_BUILD_SECONDS.name, &labels)
            .record(started.elapsed().as_secs_f64());

        let path = self.local.output_path(self.date, band);
        let partial = partial_path(&path);
        save_raster(&partial, &mosaic.into_raster()?).map_err(ProbavError::from)?;
        fs::rename(&partial, &path)?;
        Ok(path)
    }
}
