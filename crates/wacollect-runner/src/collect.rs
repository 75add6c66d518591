//! One collection run from parsed arguments.

use crate::args::Args;
use crate::progress::{date_progress_bar, record};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};
use wacollect_probav::{
    default_opener, http_transport, BatchReport, CollectConfig, CredentialProvider, Credentials,
    DriverConfig, EnvCredentials, LocalLayout, RetrievalDriver, RetrievalRequest,
    StaticCredentials, TileGrid, VITO,
};

/// Resolve the config and turn it into a request.
///
/// The box is clamped to the archive's coverage here, with a warning when
/// that changes it.
pub fn prepare(args: &Args, today: NaiveDate) -> Result<(CollectConfig, RetrievalRequest)> {
    let config = args.load_config()?;

    let (limits, changed) = config
        .bbox
        .clamped(TileGrid::PROBAV_LAT_FLOOR, TileGrid::PROBAV_LAT_CEILING);
    if changed {
        warn!(
            requested = ?config.bbox,
            clamped = ?limits,
            "Bounding box clamped to archive coverage"
        );
    }
    let bbox = limits
        .to_bbox()
        .context("bounding box lies outside the archive coverage")?;

    let (start, end) = config.date_range(today);
    let request = RetrievalRequest {
        start,
        end,
        bbox,
        bands: config.bands.clone(),
        output_root: config.output_root.clone(),
    };
    Ok((config, request))
}

/// Inline credentials if the config has them, the environment otherwise.
pub fn resolve_credentials(config: &CollectConfig) -> Result<Credentials> {
    let credentials = match &config.credentials {
        Some(inline) => StaticCredentials::new()
            .with(VITO, inline.clone())
            .credentials(VITO)?,
        None => EnvCredentials::default().credentials(VITO)?,
    };
    Ok(credentials)
}

/// Run a collection. Exit status is failure when any date failed.
pub fn run(args: &Args) -> Result<ExitCode> {
    let (config, request) = prepare(args, chrono::Local::now().date_naive())?;
    let dates = config.product.cadence.dates(request.start, request.end);
    info!(
        product = %config.product,
        start = %request.start,
        end = %request.end,
        bbox = %request.bbox,
        dates = dates.len(),
        "Collection planned"
    );

    if args.dry_run {
        print_plan(&config, &request, &dates);
        return Ok(ExitCode::SUCCESS);
    }

    let opener = default_opener()
        .context("this build has no payload decoder; rebuild with `--features hdf5`")?;
    let credentials = resolve_credentials(&config)?;
    let transport = Arc::new(http_transport(config.timeout())?);

    let mut driver_config = DriverConfig::new(config.product, credentials);
    driver_config.endpoint = config.endpoint.clone();
    driver_config.workers = config.workers;

    let bar = date_progress_bar(dates.len() as u64, args.no_progress);
    let driver = RetrievalDriver::new(driver_config, transport, opener).with_progress({
        let bar = bar.clone();
        move |report| record(&bar, report)
    });
    let report = driver.run(&request);
    bar.finish_and_clear();

    print_summary(&report);
    if let Some(path) = &args.report {
        write_report(path, &report)?;
        info!(path = %path.display(), "Wrote run report");
    }

    Ok(if report.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn print_plan(config: &CollectConfig, request: &RetrievalRequest, dates: &[NaiveDate]) {
    let tiles = TileGrid::PROBAV_100M.tiles_for(&request.bbox);
    let names: Vec<String> = tiles.iter().map(ToString::to_string).collect();
    let local = LocalLayout::new(&request.output_root, config.product);

    println!("Product: {}", config.product);
    println!("Bounding box: {}", request.bbox);
    println!("Tiles ({}): {}", tiles.len(), names.join(" "));
    println!("Output directory: {}", local.output_dir().display());
    for date in dates {
        let missing = request
            .bands
            .iter()
            .filter(|band| !local.output_exists(*date, **band))
            .count();
        println!("  {date}: {missing}/{} bands to build", request.bands.len());
    }
}

fn print_summary(report: &BatchReport) {
    println!(
        "Dates: {} written, {} skipped, {} failed ({} placeholder tiles)",
        report.written(),
        report.skipped(),
        report.failed(),
        report.placeholders()
    );
    let failed = report.failed_dates();
    if !failed.is_empty() {
        println!("Failed dates:");
        for date in failed {
            println!("  {date}");
        }
    }
}

/// Write `report` as pretty JSON.
pub fn write_report(path: &Path, report: &BatchReport) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), report)?;
    Ok(())
}
