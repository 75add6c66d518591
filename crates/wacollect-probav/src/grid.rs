//! The PROBA-V 100 m tile grid.
//!
//! The archive splits the globe into 10° x 10° tiles named `XxxYyy`:
//! - `x` is the column (0 at 180°W, increases eastward, 0..=35)
//! - `y` is the row (0 at 75°N, increases southward, 0..=13)
//!
//! Each tile holds 10080 x 10080 pixels of 1/1008° (about 100 m at the
//! equator).

use crate::{ProbavError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use wacollect_raster::GeoTransform;

/// Geographic rectangle in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Southern edge.
    pub lat_min: f64,
    /// Northern edge.
    pub lat_max: f64,
    /// Western edge.
    pub lon_min: f64,
    /// Eastern edge.
    pub lon_max: f64,
}

impl BoundingBox {
    /// Create a bounding box, rejecting inverted or out-of-range edges.
    pub fn new(lat_min: f64, lat_max: f64, lon_min: f64, lon_max: f64) -> Result<Self> {
        let edges = [lat_min, lat_max, lon_min, lon_max];
        if edges.iter().any(|v| !v.is_finite()) {
            return Err(ProbavError::InvalidBoundingBox(format!(
                "non-finite edge in {edges:?}"
            )));
        }
        if lat_min >= lat_max || lon_min >= lon_max {
            return Err(ProbavError::InvalidBoundingBox(format!(
                "lat [{lat_min}, {lat_max}] lon [{lon_min}, {lon_max}] is empty or inverted"
            )));
        }
        if lat_min < -90.0 || lat_max > 90.0 || lon_min < -180.0 || lon_max > 180.0 {
            return Err(ProbavError::InvalidBoundingBox(format!(
                "lat [{lat_min}, {lat_max}] lon [{lon_min}, {lon_max}] outside WGS84 range"
            )));
        }
        Ok(Self {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
        })
    }

    /// Create from `[min, max]` latitude and longitude limits.
    pub fn from_limits(lat: [f64; 2], lon: [f64; 2]) -> Result<Self> {
        Self::new(lat[0], lat[1], lon[0], lon[1])
    }

    /// Whether `lon` lies strictly between the western and eastern edges.
    pub fn contains_lon(&self, lon: f64) -> bool {
        lon > self.lon_min && lon < self.lon_max
    }

    /// Whether `lat` lies strictly between the southern and northern edges.
    pub fn contains_lat(&self, lat: f64) -> bool {
        lat > self.lat_min && lat < self.lat_max
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lat [{}, {}] lon [{}, {}]",
            self.lat_min, self.lat_max, self.lon_min, self.lon_max
        )
    }
}

/// Tile position in the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileIndex {
    /// Column, increasing eastward.
    pub x: u32,
    /// Row, increasing southward.
    pub y: u32,
}

impl TileIndex {
    /// Create a tile index.
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for TileIndex {
    /// Archive naming, e.g. `X18Y07`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X{:02}Y{:02}", self.x, self.y)
    }
}

/// A regular lat/lon tile grid anchored at its north-west corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileGrid {
    /// Tile edge length in degrees.
    pub cell_size: f64,
    /// Longitude of the western edge of column 0.
    pub x_origin: f64,
    /// Latitude of the northern edge of row 0.
    pub y_origin: f64,
    /// Number of columns.
    pub columns: u32,
    /// Number of rows.
    pub rows: u32,
    /// Pixels per tile edge.
    pub tile_pixels: usize,
    /// Pixel edge length in degrees.
    pub pixel_size: f64,
}

impl TileGrid {
    /// The PROBA-V 100 m product grid.
    pub const PROBAV_100M: TileGrid = TileGrid {
        cell_size: 10.0,
        x_origin: -180.0,
        y_origin: 75.0,
        columns: 36,
        rows: 14,
        tile_pixels: 10080,
        pixel_size: 0.000992063492063,
    };

    /// Southern limit of the 100 m archive.
    pub const PROBAV_LAT_FLOOR: f64 = -65.0;

    /// Northern limit of the 100 m archive.
    pub const PROBAV_LAT_CEILING: f64 = 75.0;

    fn column(&self, lon: f64) -> u32 {
        let raw = ((lon - self.x_origin) / self.cell_size).floor() as i64;
        raw.clamp(0, i64::from(self.columns) - 1) as u32
    }

    fn row(&self, lat: f64) -> u32 {
        let raw = ((self.y_origin - lat) / self.cell_size).floor() as i64;
        raw.clamp(0, i64::from(self.rows) - 1) as u32
    }

    /// Every tile that may contain pixels of `bbox`, column-major
    /// (x outer, y inner).
    ///
    /// Edges outside the grid are clamped to the outermost tiles.
    pub fn tiles_for(&self, bbox: &BoundingBox) -> Vec<TileIndex> {
        let (x_start, x_end) = (self.column(bbox.lon_min), self.column(bbox.lon_max));
        let (y_start, y_end) = (self.row(bbox.lat_max), self.row(bbox.lat_min));

        let columns = x_end.saturating_sub(x_start) + 1;
        let rows = y_end.saturating_sub(y_start) + 1;
        let mut tiles = Vec::with_capacity((columns * rows) as usize);
        for x in x_start..=x_end {
            for y in y_start..=y_end {
                tiles.push(TileIndex { x, y });
            }
        }
        tiles
    }

    /// Geographic extent of a tile.
    pub fn tile_bounds(&self, index: TileIndex) -> BoundingBox {
        let lon_min = self.x_origin + f64::from(index.x) * self.cell_size;
        let lat_max = self.y_origin - f64::from(index.y) * self.cell_size;
        BoundingBox {
            lat_min: lat_max - self.cell_size,
            lat_max,
            lon_min,
            lon_max: lon_min + self.cell_size,
        }
    }

    /// Nominal geotransform of a tile, offset half a pixel outward the way
    /// the archive places its first pixel centre on the tile corner.
    pub fn nominal_geotransform(&self, index: TileIndex) -> GeoTransform {
        let bounds = self.tile_bounds(index);
        let half = 0.5 * self.pixel_size;
        GeoTransform::new(
            bounds.lon_min - half,
            self.pixel_size,
            bounds.lat_max + half,
            -self.pixel_size,
        )
    }
}

impl Default for TileGrid {
    fn default() -> Self {
        Self::PROBAV_100M
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn bbox(lat: [f64; 2], lon: [f64; 2]) -> BoundingBox {
        BoundingBox::from_limits(lat, lon).unwrap()
    }

    #[test]
    fn test_single_tile_lookup() {
        let tiles = TileGrid::PROBAV_100M.tiles_for(&bbox([2.0, 3.0], [4.0, 5.0]));
        assert_eq!(tiles, vec![TileIndex::new(18, 7)]);
        assert_eq!(tiles[0].to_string(), "X18Y07");
    }

    #[test]
    fn test_inverted_box_has_no_tiles() {
        let inverted = BoundingBox {
            lat_min: 13.0,
            lat_max: 2.0,
            lon_min: 15.0,
            lon_max: 4.0,
        };
        assert!(TileGrid::PROBAV_100M.tiles_for(&inverted).is_empty());
    }

    #[test]
    fn test_tiles_cover_bbox() {
        let grid = TileGrid::PROBAV_100M;
        let boxes = [
            bbox([2.0, 3.0], [4.0, 5.0]),
            bbox([-12.5, 17.0], [28.0, 41.5]),
            bbox([-64.0, -55.0], [-179.0, -170.0]),
            bbox([60.0, 74.9], [170.0, 179.9]),
        ];
        for b in boxes {
            let tiles = grid.tiles_for(&b);
            for (lat, lon) in [
                (b.lat_min, b.lon_min),
                (b.lat_min, b.lon_max),
                (b.lat_max, b.lon_min),
                (b.lat_max, b.lon_max),
            ] {
                let covered = tiles.iter().any(|t| {
                    let tb = grid.tile_bounds(*t);
                    lat >= tb.lat_min && lat <= tb.lat_max && lon >= tb.lon_min && lon <= tb.lon_max
                });
                assert!(covered, "corner ({lat}, {lon}) of {b} not covered by {tiles:?}");
            }
        }
    }

    #[test]
    fn test_tile_order_is_column_major() {
        let tiles = TileGrid::PROBAV_100M.tiles_for(&bbox([-6.0, 12.0], [8.0, 12.0]));
        assert_eq!(
            tiles,
            vec![
                TileIndex::new(18, 6),
                TileIndex::new(18, 7),
                TileIndex::new(18, 8),
                TileIndex::new(19, 6),
                TileIndex::new(19, 7),
                TileIndex::new(19, 8),
            ]
        );
    }

    #[test]
    fn test_edges_clamped_to_grid() {
        let grid = TileGrid::PROBAV_100M;
        let tiles = grid.tiles_for(&bbox([-90.0, 90.0], [170.0, 180.0]));
        assert_eq!(tiles.first(), Some(&TileIndex::new(35, 0)));
        assert_eq!(tiles.last(), Some(&TileIndex::new(35, 13)));
        assert_eq!(tiles.len(), 14);
    }

    #[test]
    fn test_nominal_geotransform() {
        let gt = TileGrid::PROBAV_100M.nominal_geotransform(TileIndex::new(18, 7));
        let half = 0.5 * 0.000992063492063;
        assert_relative_eq!(gt.origin_x, 0.0 - half, epsilon = 1e-12);
        assert_relative_eq!(gt.origin_y, 5.0 + half, epsilon = 1e-12);
        assert_eq!(gt.pixel_height, -gt.pixel_width);
    }

    #[test]
    fn test_invalid_bbox() {
        assert!(BoundingBox::new(3.0, 2.0, 4.0, 5.0).is_err());
        assert!(BoundingBox::new(2.0, 3.0, 5.0, 5.0).is_err());
        assert!(BoundingBox::new(2.0, 3.0, f64::NAN, 5.0).is_err());
        assert!(BoundingBox::new(-91.0, 3.0, 4.0, 5.0).is_err());
    }

    #[test]
    fn test_strict_containment() {
        let b = bbox([2.0, 3.0], [4.0, 5.0]);
        assert!(b.contains_lon(4.5));
        assert!(!b.contains_lon(4.0));
        assert!(!b.contains_lat(3.0));
        assert!(b.contains_lat(2.0001));
    }
}
