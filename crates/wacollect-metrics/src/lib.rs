//! Metric declarations for the raster collectors.
//!
//! Every metric the collectors record is declared once here as a const
//! [`Metric`], so names and units cannot drift between the call sites and
//! whatever exporter the binary installs. The `metrics` facade is re-exported;
//! recording without an installed recorder is a no-op.
//!
//! ```rust
//! use wacollect_metrics::{metric_defs, CollectLabels};
//!
//! let labels = CollectLabels::new("TOC_S5", "B1");
//! metrics::counter!(metric_defs::TILES_DOWNLOADED.name, &labels.to_labels()).increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Monotonically increasing count.
    Counter,
    /// Value that can go up and down.
    Gauge,
    /// Distribution of observed values.
    Histogram,
}

impl MetricKind {
    /// Lowercase name of the kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric declaration: name, kind, description, unit and label keys.
///
/// ```rust
/// use wacollect_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const RETRIES: Metric = Metric::counter("wacollect.example.retries")
///     .with_description("Retries issued")
///     .with_unit(Unit::Count)
///     .with_labels(&["product"]);
///
/// assert_eq!(RETRIES.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// Metric name, dot separated.
    pub name: &'static str,
    /// Counter, gauge or histogram.
    pub kind: MetricKind,
    /// Human-readable description.
    pub description: &'static str,
    /// Unit of measurement, if any.
    pub unit: Option<Unit>,
    /// Label keys recorded with this metric.
    pub labels: &'static [&'static str],
}

impl Metric {
    const fn with_kind(name: &'static str, kind: MetricKind) -> Self {
        Self {
            name,
            kind,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Declare a counter.
    pub const fn counter(name: &'static str) -> Self {
        Self::with_kind(name, MetricKind::Counter)
    }

    /// Declare a gauge.
    pub const fn gauge(name: &'static str) -> Self {
        Self::with_kind(name, MetricKind::Gauge)
    }

    /// Declare a histogram.
    pub const fn histogram(name: &'static str) -> Self {
        Self::with_kind(name, MetricKind::Histogram)
    }

    /// Set the description.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Set the unit.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Set the label keys.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Register the description with the installed recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description)
            }
            (MetricKind::Counter, None) => describe_counter!(self.name, self.description),
            (MetricKind::Gauge, Some(unit)) => describe_gauge!(self.name, unit, self.description),
            (MetricKind::Gauge, None) => describe_gauge!(self.name, self.description),
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description)
            }
            (MetricKind::Histogram, None) => describe_histogram!(self.name, self.description),
        }
    }
}

/// All metrics recorded by the collectors.
pub mod metric_defs {
    use super::{Metric, Unit};

    /// Labels carried by tile- and band-scoped metrics.
    pub const PRODUCT_BAND_LABELS: &[&str] = &["product", "band"];

    // ------------------------------------------------------------------
    // Tiles
    // ------------------------------------------------------------------

    /// Tile payloads fetched over the network.
    pub const TILES_DOWNLOADED: Metric = Metric::counter("wacollect.tiles.downloaded")
        .with_description("Tile payloads fetched over the network")
        .with_unit(Unit::Count)
        .with_labels(PRODUCT_BAND_LABELS);

    /// Bytes of tile payload fetched over the network.
    pub const TILES_BYTES_DOWNLOADED: Metric = Metric::counter("wacollect.tiles.bytes_downloaded")
        .with_description("Bytes of tile payload fetched over the network")
        .with_unit(Unit::Bytes)
        .with_labels(PRODUCT_BAND_LABELS);

    /// Tiles served from the scratch directory without a download.
    pub const TILES_CACHE_HITS: Metric = Metric::counter("wacollect.tiles.cache_hits")
        .with_description("Tiles served from scratch storage without a download")
        .with_unit(Unit::Count)
        .with_labels(PRODUCT_BAND_LABELS);

    /// Tiles replaced by an all-NaN placeholder.
    ///
    /// Labels: product, band, reason (`no_version`, `transport`, `io`, `decode`)
    pub const TILES_PLACEHOLDERS: Metric = Metric::counter("wacollect.tiles.placeholders")
        .with_description("Tiles replaced by an all-NaN placeholder")
        .with_unit(Unit::Count)
        .with_labels(&["product", "band", "reason"]);

    /// Requests retried once with certificate verification disabled.
    pub const TRANSPORT_RELAXED_FALLBACKS: Metric =
        Metric::counter("wacollect.transport.relaxed_fallbacks")
            .with_description("Requests retried with certificate verification disabled")
            .with_unit(Unit::Count);

    // ------------------------------------------------------------------
    // Dates
    // ------------------------------------------------------------------

    /// Dates for which every missing band output was written.
    pub const DATES_WRITTEN: Metric = Metric::counter("wacollect.dates.written")
        .with_description("Dates whose missing outputs were all written")
        .with_unit(Unit::Count)
        .with_labels(&["product"]);

    /// Dates skipped because every band output already existed.
    pub const DATES_SKIPPED: Metric = Metric::counter("wacollect.dates.skipped")
        .with_description("Dates skipped because all outputs already existed")
        .with_unit(Unit::Count)
        .with_labels(&["product"]);

    /// Dates with at least one failed band.
    pub const DATES_FAILED: Metric = Metric::counter("wacollect.dates.failed")
        .with_description("Dates with at least one failed band")
        .with_unit(Unit::Count)
        .with_labels(&["product"]);

    /// Dates currently being processed.
    pub const DATES_IN_FLIGHT: Metric = Metric::gauge("wacollect.dates.in_flight")
        .with_description("Dates currently being processed by workers")
        .with_unit(Unit::Count);

    // ------------------------------------------------------------------
    // Mosaics
    // ------------------------------------------------------------------

    /// Wall time spent stitching one mosaic.
    pub const MOSAIC_BUILD_SECONDS: Metric = Metric::histogram("wacollect.mosaic.build_seconds")
        .with_description("Wall time spent stitching one mosaic")
        .with_unit(Unit::Seconds)
        .with_labels(PRODUCT_BAND_LABELS);

    /// Every declared metric.
    pub const ALL: &[&Metric] = &[
        &TILES_DOWNLOADED,
        &TILES_BYTES_DOWNLOADED,
        &TILES_CACHE_HITS,
        &TILES_PLACEHOLDERS,
        &TRANSPORT_RELAXED_FALLBACKS,
        &DATES_WRITTEN,
        &DATES_SKIPPED,
        &DATES_FAILED,
        &DATES_IN_FLIGHT,
        &MOSAIC_BUILD_SECONDS,
    ];
}

/// Product/band labels for tile- and mosaic-scoped metrics.
#[derive(Debug, Clone)]
pub struct CollectLabels {
    /// Product name, e.g. `TOC_S5`.
    pub product: String,
    /// Band name, e.g. `B1`.
    pub band: String,
}

impl CollectLabels {
    /// Labels for one product/band pair.
    pub fn new(product: impl Into<String>, band: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            band: band.into(),
        }
    }

    /// Labels in the `metrics` crate's `(key, value)` form.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![("product", self.product.clone()), ("band", self.band.clone())]
    }

    /// Labels plus extra pairs.
    pub fn with(&self, extra: &[(&'static str, String)]) -> Vec<(&'static str, String)> {
        let mut labels = self.to_labels();
        labels.extend_from_slice(extra);
        labels
    }
}

/// Register descriptions for every metric. Call once after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

/// Install a Prometheus exporter listening on `addr` and describe all metrics.
#[cfg(feature = "prometheus")]
pub fn install_prometheus(
    addr: std::net::SocketAddr,
) -> Result<(), metrics_exporter_prometheus::BuildError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    describe_metrics();
    Ok(())
}
