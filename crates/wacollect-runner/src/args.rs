//! Command-line arguments and how they combine with the config file.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;
use wacollect_probav::{Band, BboxConfig, CollectConfig, Product};

/// Collect PROBA-V 100 m composites over an area and date range.
#[derive(Parser, Debug, Clone)]
#[command(name = "wacollect", version, about, long_about = None)]
pub struct Args {
    /// YAML configuration file. Flags below override its values.
    #[arg(short, long, env = "WACOLLECT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output root directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Product, e.g. TOC_S5 or TOA_S10
    #[arg(long)]
    pub product: Option<Product>,

    /// First date (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Last date, inclusive (YYYY-MM-DD)
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Latitude limits
    #[arg(long, num_args = 2, value_names = ["MIN", "MAX"], allow_negative_numbers = true)]
    pub lat: Option<Vec<f64>>,

    /// Longitude limits
    #[arg(long, num_args = 2, value_names = ["MIN", "MAX"], allow_negative_numbers = true)]
    pub lon: Option<Vec<f64>>,

    /// Comma-separated bands (SM,B1,B2,B3,B4)
    #[arg(long, value_delimiter = ',')]
    pub bands: Option<Vec<Band>>,

    /// Dates processed concurrently
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Archive base URL
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Log filter, e.g. `debug` or `wacollect_probav=trace` (default: RUST_LOG, then info)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log as JSON lines
    #[arg(long)]
    pub log_json: bool,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Write the run report as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Print the dates and tiles that would be processed, then exit
    #[arg(long)]
    pub dry_run: bool,

    /// Serve Prometheus metrics on this address
    #[cfg(feature = "prometheus")]
    #[arg(long)]
    pub metrics_addr: Option<std::net::SocketAddr>,
}

fn pair(name: &str, values: &[f64]) -> Result<[f64; 2]> {
    match values {
        [min, max] => Ok([*min, *max]),
        _ => bail!("--{name} takes exactly two values"),
    }
}

impl Args {
    /// Load the config file if given, then apply the flags on top.
    pub fn load_config(&self) -> Result<CollectConfig> {
        let mut config = match &self.config {
            Some(path) => CollectConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => {
                let (Some(output), Some(lat), Some(lon)) = (&self.output, &self.lat, &self.lon)
                else {
                    bail!("without --config, --output, --lat and --lon are required");
                };
                CollectConfig::new(
                    output.clone(),
                    BboxConfig {
                        lat: pair("lat", lat)?,
                        lon: pair("lon", lon)?,
                    },
                )
            }
        };
        self.apply(&mut config)?;
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    fn apply(&self, config: &mut CollectConfig) -> Result<()> {
        if let Some(output) = &self.output {
            config.output_root = output.clone();
        }
        if let Some(product) = self.product {
            config.product = product;
        }
        if let Some(start) = self.start {
            config.start = Some(start);
        }
        if let Some(end) = self.end {
            config.end = Some(end);
        }
        if let Some(lat) = &self.lat {
            config.bbox.lat = pair("lat", lat)?;
        }
        if let Some(lon) = &self.lon {
            config.bbox.lon = pair("lon", lon)?;
        }
        if let Some(bands) = &self.bands {
            config.bands = bands.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("wacollect").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_flags_only() {
        let args = parse(&[
            "--output", "/tmp/out", "--lat", "-5", "3.5", "--lon", "4", "15", "--bands", "sm,B1",
            "--product", "toc_s10", "--workers", "4",
        ]);
        let config = args.load_config().unwrap();
        assert_eq!(config.output_root, PathBuf::from("/tmp/out"));
        assert_eq!(config.bbox.lat, [-5.0, 3.5]);
        assert_eq!(config.bbox.lon, [4.0, 15.0]);
        assert_eq!(config.bands, vec![Band::Sm, Band::B1]);
        assert_eq!(config.product.to_string(), "TOC_S10");
        assert_eq!(config.workers, 4);
    }

    #[test]
    fn test_missing_required_without_config() {
        let err = parse(&["--output", "/tmp/out"]).load_config().unwrap_err();
        assert!(err.to_string().contains("--lat"));
    }

    #[test]
    fn test_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collect.yaml");
        std::fs::write(
            &path,
            concat!(
                "output_root: /data\nworkers: 2\nstart: 2015-01-01\n",
                "bbox: { lat: [0, 1], lon: [0, 1] }\n",
            ),
        )
        .unwrap();

        let config = parse(&[
            "--config",
            path.to_str().unwrap(),
            "--workers",
            "6",
            "--end",
            "2015-02-01",
        ])
        .load_config()
        .unwrap();
        assert_eq!(config.output_root, PathBuf::from("/data"));
        assert_eq!(config.workers, 6);
        assert_eq!(config.start, NaiveDate::from_ymd_opt(2015, 1, 1));
        assert_eq!(config.end, NaiveDate::from_ymd_opt(2015, 2, 1));
    }

    #[test]
    fn test_rejects_bad_band() {
        assert!(Args::try_parse_from(["wacollect", "--bands", "B7"]).is_err());
    }
}
