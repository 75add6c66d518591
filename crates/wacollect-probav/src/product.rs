//! Product levels, cadences and bands of the PROBA-V 100 m archive.

use crate::{ProbavError, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Processing level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    /// Top-of-canopy reflectance.
    #[serde(rename = "TOC")]
    Toc,
    /// Top-of-atmosphere reflectance.
    #[serde(rename = "TOA")]
    Toa,
}

impl Level {
    /// Archive code, `TOC` or `TOA`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Level::Toc => "TOC",
            Level::Toa => "TOA",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Temporal compositing period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cadence {
    /// One synthesis per day.
    #[serde(rename = "S1")]
    Daily,
    /// Five-day syntheses starting on days 1, 6, 11, 16, 21 and 26.
    #[serde(rename = "S5")]
    FiveDaily,
    /// Ten-day syntheses starting on days 1, 11 and 21.
    #[serde(rename = "S10")]
    TenDaily,
}

impl Cadence {
    /// Archive code, e.g. `S5`.
    pub const fn code(&self) -> &'static str {
        match self {
            Cadence::Daily => "S1",
            Cadence::FiveDaily => "S5",
            Cadence::TenDaily => "S10",
        }
    }

    /// Name used in output folders and file names, e.g. `5-daily`.
    pub const fn name(&self) -> &'static str {
        match self {
            Cadence::Daily => "daily",
            Cadence::FiveDaily => "5-daily",
            Cadence::TenDaily => "10-daily",
        }
    }

    /// Days of the month on which a composite starts, or `None` for daily.
    pub const fn composite_days(&self) -> Option<&'static [u32]> {
        match self {
            Cadence::Daily => None,
            Cadence::FiveDaily => Some(&[1, 6, 11, 16, 21, 26]),
            Cadence::TenDaily => Some(&[1, 11, 21]),
        }
    }

    /// Whether a composite starts on `date`.
    pub fn is_composite_day(&self, date: NaiveDate) -> bool {
        self.composite_days()
            .map_or(true, |days| days.contains(&date.day()))
    }

    /// Move `date` back to the start of the composite containing it.
    pub fn snap_back(&self, date: NaiveDate) -> NaiveDate {
        let Some(days) = self.composite_days() else {
            return date;
        };
        let day = date.day();
        let start = days.iter().rev().find(|d| **d <= day).copied().unwrap_or(1);
        date.with_day(start).unwrap_or(date)
    }

    /// Composite start dates from `start` (snapped back) to `end`, inclusive.
    pub fn dates(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        let mut dates = Vec::new();
        let mut current = self.snap_back(start);
        while current <= end {
            if self.is_composite_day(current) {
                dates.push(current);
            }
            match current.succ_opt() {
                Some(next) => current = next,
                None => break,
            }
        }
        dates
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A product: level plus cadence, written `TOC_S5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Product {
    /// Processing level.
    pub level: Level,
    /// Compositing period.
    pub cadence: Cadence,
}

impl Product {
    /// Create a product.
    pub const fn new(level: Level, cadence: Cadence) -> Self {
        Self { level, cadence }
    }

    /// First day of the 100 m archive.
    pub fn first_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2014, 3, 11).unwrap_or(NaiveDate::MIN)
    }
}

impl Default for Product {
    fn default() -> Self {
        Self::new(Level::Toc, Cadence::FiveDaily)
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.level, self.cadence)
    }
}

impl FromStr for Product {
    type Err = ProbavError;

    fn from_str(s: &str) -> Result<Self> {
        let unknown = || ProbavError::UnknownProduct(s.to_string());
        let (level, cadence) = s.trim().split_once('_').ok_or_else(unknown)?;
        let level = match level.to_ascii_uppercase().as_str() {
            "TOC" => Level::Toc,
            "TOA" => Level::Toa,
            _ => return Err(unknown()),
        };
        let cadence = match cadence.to_ascii_uppercase().as_str() {
            "S1" => Cadence::Daily,
            "S5" => Cadence::FiveDaily,
            "S10" => Cadence::TenDaily,
            _ => return Err(unknown()),
        };
        Ok(Self::new(level, cadence))
    }
}

impl TryFrom<String> for Product {
    type Error = ProbavError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Product> for String {
    fn from(product: Product) -> Self {
        product.to_string()
    }
}

/// Spectral band or status map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Band {
    /// Status map (quality flags).
    Sm,
    /// Blue.
    B1,
    /// Red.
    B2,
    /// Near infrared.
    B3,
    /// Short-wave infrared.
    B4,
}

impl Band {
    /// Every band, in output order.
    pub const ALL: [Band; 5] = [Band::Sm, Band::B1, Band::B2, Band::B3, Band::B4];

    /// Output name, e.g. `SM`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Band::Sm => "SM",
            Band::B1 => "B1",
            Band::B2 => "B2",
            Band::B3 => "B3",
            Band::B4 => "B4",
        }
    }

    /// Subdataset number of the band inside the provider payload.
    pub const fn subdataset_index(&self) -> u8 {
        match self {
            Band::Sm => 7,
            Band::B1 => 8,
            Band::B2 => 10,
            Band::B3 => 9,
            Band::B4 => 11,
        }
    }

    /// Factor turning stored digital numbers into physical values.
    pub const fn scale(&self) -> f32 {
        match self {
            Band::Sm => 1.0,
            _ => 0.005,
        }
    }

    /// Dataset path of the band inside the payload for `level`.
    pub fn dataset_path(&self, level: Level) -> String {
        match self {
            Band::Sm => "LEVEL3/QUALITY/SM".to_string(),
            Band::B1 => format!("LEVEL3/RADIOMETRY/BLUE/{level}"),
            Band::B2 => format!("LEVEL3/RADIOMETRY/RED/{level}"),
            Band::B3 => format!("LEVEL3/RADIOMETRY/NIR/{level}"),
            Band::B4 => format!("LEVEL3/RADIOMETRY/SWIR/{level}"),
        }
    }

    /// Where to find this band in a payload of `level`.
    pub fn selector(&self, level: Level) -> BandSelector {
        BandSelector {
            band: *self,
            index: self.subdataset_index(),
            dataset: self.dataset_path(level),
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Band {
    type Err = ProbavError;

    fn from_str(s: &str) -> Result<Self> {
        Band::ALL
            .into_iter()
            .find(|band| band.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ProbavError::UnknownBand(s.to_string()))
    }
}

impl TryFrom<String> for Band {
    type Error = ProbavError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Band> for String {
    fn from(band: Band) -> Self {
        band.as_str().to_string()
    }
}

/// Location of one band inside a payload, by subdataset number and path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandSelector {
    /// The band.
    pub band: Band,
    /// Subdataset number.
    pub index: u8,
    /// Dataset path.
    pub dataset: String,
}
