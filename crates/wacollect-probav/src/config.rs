//! YAML collection configuration.
//!
//! ```yaml
//! output_root: /data/probav
//! product: TOC_S5
//! bands: [SM, B1]
//! workers: 4
//! start: 2015-03-01
//! end: 2015-03-31
//! bbox:
//!   lat: [2.0, 13.0]
//!   lon: [4.0, 15.0]
//! ```

use crate::credentials::Credentials;
use crate::grid::BoundingBox;
use crate::layout::DEFAULT_ENDPOINT;
use crate::product::{Band, Product};
use crate::ConfigError;
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Area of interest as `[min, max]` pairs.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BboxConfig {
    /// Latitude limits.
    pub lat: [f64; 2],
    /// Longitude limits.
    pub lon: [f64; 2],
}

impl BboxConfig {
    /// Validated bounding box.
    pub fn to_bbox(&self) -> Result<BoundingBox, ConfigError> {
        BoundingBox::from_limits(self.lat, self.lon)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Limits clamped to latitudes `[lat_floor, lat_ceiling]` and
    /// longitudes `[-180, 180]`, and whether anything changed.
    pub fn clamped(&self, lat_floor: f64, lat_ceiling: f64) -> (Self, bool) {
        let clamp = |[lo, hi]: [f64; 2], floor: f64, ceiling: f64| {
            [lo.clamp(floor, ceiling), hi.clamp(floor, ceiling)]
        };
        let out = Self {
            lat: clamp(self.lat, lat_floor, lat_ceiling),
            lon: clamp(self.lon, -180.0, 180.0),
        };
        (out, out != *self)
    }

    fn check_order(&self) -> Result<(), ConfigError> {
        for (name, [lo, hi]) in [("lat", self.lat), ("lon", self.lon)] {
            if !(lo.is_finite() && hi.is_finite() && lo < hi) {
                return Err(ConfigError::Invalid(format!(
                    "bbox {name} [{lo}, {hi}] is empty or inverted"
                )));
            }
        }
        Ok(())
    }
}

fn default_bands() -> Vec<Band> {
    Band::ALL.to_vec()
}

fn default_workers() -> usize {
    1
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

/// A collection run.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectConfig {
    /// Root of the output tree.
    pub output_root: PathBuf,
    /// Product, e.g. `TOC_S5`.
    #[serde(default)]
    pub product: Product,
    /// Bands to write.
    #[serde(default = "default_bands")]
    pub bands: Vec<Band>,
    /// Dates processed concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// First date; defaults to the product's first date.
    #[serde(default)]
    pub start: Option<NaiveDate>,
    /// Last date; defaults to today.
    #[serde(default)]
    pub end: Option<NaiveDate>,
    /// Area of interest.
    pub bbox: BboxConfig,
    /// Archive base URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Inline archive account.
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

impl CollectConfig {
    /// Defaults for everything but the output root and the box.
    pub fn new(output_root: impl Into<PathBuf>, bbox: BboxConfig) -> Self {
        Self {
            output_root: output_root.into(),
            product: Product::default(),
            bands: default_bands(),
            workers: default_workers(),
            start: None,
            end: None,
            bbox,
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
            credentials: None,
        }
    }

    /// Load and validate a config file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Parse and validate YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check field values that serde cannot. Box limits only need to be
    /// ordered here; range clamping is up to the caller.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bands.is_empty() {
            return Err(ConfigError::Invalid("no bands requested".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be positive".to_string()));
        }
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("endpoint is empty".to_string()));
        }
        self.bbox.check_order()?;
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err(ConfigError::Invalid(format!(
                    "start {start} is after end {end}"
                )));
            }
        }
        Ok(())
    }

    /// Effective `(start, end)`, filling defaults relative to `today`.
    pub fn date_range(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        (
            self.start.unwrap_or_else(Product::first_date),
            self.end.unwrap_or(today),
        )
    }

    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::{Cadence, Level};

    const MINIMAL: &str = "
output_root: /tmp/out
bbox:
  lat: [2.0, 13.0]
  lon: [4.0, 15.0]
";

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = CollectConfig::from_yaml_str(MINIMAL).unwrap();
        assert_eq!(config.product, Product::new(Level::Toc, Cadence::FiveDaily));
        assert_eq!(config.bands, Band::ALL.to_vec());
        assert_eq!(config.workers, 1);
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.timeout(), Duration::from_secs(300));
        assert!(config.credentials.is_none());

        let today = date(2016, 1, 1);
        assert_eq!(config.date_range(today), (date(2014, 3, 11), today));
    }

    #[test]
    fn test_full_config() {
        let config = CollectConfig::from_yaml_str(
            "
output_root: /data
product: toa_s10
bands: [sm, B4]
workers: 8
start: 2015-03-01
end: 2015-03-31
bbox: { lat: [-10, 10], lon: [20, 30] }
endpoint: http://localhost:8080/pool
timeout_secs: 5
credentials: { username: alice, password: secret }
",
        )
        .unwrap();
        assert_eq!(config.product, Product::new(Level::Toa, Cadence::TenDaily));
        assert_eq!(config.bands, vec![Band::Sm, Band::B4]);
        assert_eq!(config.workers, 8);
        assert_eq!(
            config.date_range(date(2020, 1, 1)),
            (date(2015, 3, 1), date(2015, 3, 31))
        );
        assert_eq!(config.credentials, Some(Credentials::new("alice", "secret")));
        assert_eq!(
            config.bbox.to_bbox().unwrap(),
            BoundingBox::new(-10.0, 10.0, 20.0, 30.0).unwrap()
        );
    }

    #[test]
    fn test_rejects_bad_values() {
        let reversed = MINIMAL.replace("[2.0, 13.0]", "[13.0, 2.0]");
        assert!(matches!(
            CollectConfig::from_yaml_str(&reversed),
            Err(ConfigError::Invalid(_))
        ));

        let no_bands = format!("{MINIMAL}bands: []\n");
        assert!(matches!(
            CollectConfig::from_yaml_str(&no_bands),
            Err(ConfigError::Invalid(_))
        ));

        let dates = format!("{MINIMAL}start: 2015-04-01\nend: 2015-03-01\n");
        assert!(matches!(
            CollectConfig::from_yaml_str(&dates),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_fields_and_bands() {
        let typo = format!("{MINIMAL}wokers: 2\n");
        assert!(matches!(CollectConfig::from_yaml_str(&typo), Err(ConfigError::Yaml(_))));

        let band = format!("{MINIMAL}bands: [B9]\n");
        assert!(matches!(CollectConfig::from_yaml_str(&band), Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_out_of_range_box_is_clamped_by_caller() {
        let wide = MINIMAL
            .replace("[2.0, 13.0]", "[-80.0, 80.0]")
            .replace("[4.0, 15.0]", "[-190.0, 15.0]");
        let config = CollectConfig::from_yaml_str(&wide).unwrap();
        assert!(config.bbox.to_bbox().is_err());

        let (clamped, changed) = config.bbox.clamped(-65.0, 75.0);
        assert!(changed);
        assert_eq!(
            clamped.to_bbox().unwrap(),
            BoundingBox::new(-65.0, 75.0, -180.0, 15.0).unwrap()
        );

        let inside = BboxConfig {
            lat: [2.0, 13.0],
            lon: [4.0, 15.0],
        };
        assert_eq!(inside.clamped(-65.0, 75.0), (inside, false));
    }

    #[test]
    fn test_new_matches_yaml_defaults() {
        let parsed = CollectConfig::from_yaml_str(MINIMAL).unwrap();
        let built = CollectConfig::new("/tmp/out", parsed.bbox);
        assert_eq!(built.bands, parsed.bands);
        assert_eq!(built.product, parsed.product);
        assert_eq!(built.endpoint, parsed.endpoint);
        assert_eq!(built.timeout_secs, parsed.timeout_secs);
        assert!(built.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collect.yaml");
        std::fs::write(&path, MINIMAL).unwrap();
        assert_eq!(
            CollectConfig::from_file(&path).unwrap().output_root,
            PathBuf::from("/tmp/out")
        );
        assert!(matches!(
            CollectConfig::from_file(dir.path().join("missing.yaml")),
            Err(ConfigError::Io(_))
        ));
    }
}
