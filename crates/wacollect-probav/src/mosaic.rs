//! Stitching decoded tiles into one raster over the requested box.
//!
//! The output grid is the union of every tile's pixel coordinates that fall
//! strictly inside the box. Coordinates closer together than a small fraction
//! of a pixel are treated as the same grid line, so tiles with slightly
//! different alignment still share columns and rows.
//!
//! Overlaps are resolved first-writer-wins in tile order: a cell written by
//! an earlier tile is never overwritten by a later one. Placeholder tiles
//! contribute grid lines but never claim cells, so a real tile later in the
//! order still fills the area a placeholder covers.

use crate::decoder::{DecodedTile, NODATA};
use crate::grid::BoundingBox;
use crate::MosaicError;
use tracing::debug;
use wacollect_raster::{GeoTransform, Raster, RasterError};

/// Default grid-line tolerance as a fraction of the smallest pixel size.
pub const DEFAULT_COORDINATE_TOLERANCE: f64 = 1e-6;

/// A stitched raster and the extent it actually covers.
#[derive(Debug, Clone)]
pub struct Mosaic {
    pixels: Vec<f32>,
    width: usize,
    height: usize,
    geotransform: GeoTransform,
    covered: BoundingBox,
}

impl Mosaic {
    /// `(width, height)` in pixels.
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Row-major pixels, north to south.
    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    /// Value at `(row, col)`.
    pub fn value(&self, row: usize, col: usize) -> Option<f32> {
        (row < self.height && col < self.width).then(|| self.pixels[row * self.width + col])
    }

    /// Origin from the westmost and northmost grid lines, pixel size from the
    /// last contributing tile.
    pub fn geotransform(&self) -> GeoTransform {
        self.geotransform
    }

    /// Extent spanned by the output grid.
    pub fn covered(&self) -> BoundingBox {
        self.covered
    }

    /// Convert into a WGS84 raster for writing.
    pub fn into_raster(self) -> Result<Raster, RasterError> {
        Raster::new(self.width, self.height, self.pixels, self.geotransform)
    }
}

/// Sorted, de-duplicated grid lines of one axis.
struct Axis {
    lines: Vec<f64>,
    tolerance: f64,
    descending: bool,
}

impl Axis {
    fn new(mut coords: Vec<f64>, tolerance: f64, descending: bool) -> Self {
        coords.sort_by(|a, b| a.total_cmp(b));
        coords.dedup_by(|next, kept| (*next - *kept).abs() <= tolerance);
        if descending {
            coords.reverse();
        }
        Self {
            lines: coords,
            tolerance,
            descending,
        }
    }

    fn len(&self) -> usize {
        self.lines.len()
    }

    /// Position of the grid line matching `coord`.
    fn position(&self, coord: f64) -> Option<usize> {
        let tol = self.tolerance;
        let pos = if self.descending {
            self.lines.partition_point(|line| *line > coord + tol)
        } else {
            self.lines.partition_point(|line| *line < coord - tol)
        };
        self.lines
            .get(pos)
            .filter(|line| (**line - coord).abs() <= tol)
            .map(|_| pos)
    }
}

/// Per-tile in-box coordinates, computed once and reused by both passes.
struct TileSelection<'a> {
    tile: &'a DecodedTile,
    cols: Vec<(usize, f64)>,
    rows: Vec<(usize, f64)>,
}

/// Builds mosaics.
#[derive(Debug, Clone, Copy)]
pub struct MosaicBuilder {
    coordinate_tolerance: f64,
}

impl Default for MosaicBuilder {
    fn default() -> Self {
        Self {
            coordinate_tolerance: DEFAULT_COORDINATE_TOLERANCE,
        }
    }
}

impl MosaicBuilder {
    /// Builder with a grid-line tolerance given as a fraction of pixel size.
    pub fn with_tolerance(coordinate_tolerance: f64) -> Self {
        Self {
            coordinate_tolerance,
        }
    }

    /// Stitch `tiles` (in priority order) over `bbox`.
    ///
    /// Fails when no tiles are given or none has a pixel strictly inside the
    /// box. Cells covered by no real tile are NaN.
    pub fn build(&self, tiles: &[DecodedTile], bbox: &BoundingBox) -> Result<Mosaic, MosaicError> {
        if tiles.is_empty() {
            return Err(MosaicError::NoTiles);
        }

        let selections: Vec<TileSelection> = tiles
            .iter()
            .map(|tile| TileSelection {
                tile,
                cols: tile.columns_within(bbox),
                rows: tile.rows_within(bbox),
            })
            .filter(|s| !s.cols.is_empty() && !s.rows.is_empty())
            .collect();
        let Some(last) = selections.last() else {
            return Err(MosaicError::EmptyIntersection(*bbox));
        };
        let last_gt = last.tile.geotransform();

        let min_pixel = selections
            .iter()
            .map(|s| {
                let gt = s.tile.geotransform();
                gt.pixel_width.abs().min(gt.pixel_height.abs())
            })
            .fold(f64::INFINITY, f64::min);
        let tolerance = min_pixel * self.coordinate_tolerance;

        let xs = Axis::new(
            selections.iter().flat_map(|s| s.cols.iter().map(|(_, x)| *x)).collect(),
            tolerance,
            false,
        );
        let ys = Axis::new(
            selections.iter().flat_map(|s| s.rows.iter().map(|(_, y)| *y)).collect(),
            tolerance,
            true,
        );
        let (width, height) = (xs.len(), ys.len());

        let mut pixels = vec![NODATA; width * height];
        let mut claimed = vec![false; width * height];
        for selection in selections.iter().filter(|s| !s.tile.is_placeholder()) {
            let col_map: Vec<(usize, Option<usize>)> = selection
                .cols
                .iter()
                .map(|(col, x)| (*col, xs.position(*x)))
                .collect();
            for (row, y) in &selection.rows {
                let Some(out_row) = ys.position(*y) else {
                    continue;
                };
                for (col, out_col) in &col_map {
                    let Some(out_col) = out_col else {
                        continue;
                    };
                    let cell = out_row * width + out_col;
                    if !claimed[cell] {
                        pixels[cell] = selection.tile.value(*row, *col);
                        claimed[cell] = true;
                    }
                }
            }
        }

        // Grid lines are pixel corners; the last line spans one more pixel
        let (x_min, x_last) = (xs.lines[0], xs.lines[width - 1]);
        let (y_max, y_last) = (ys.lines[0], ys.lines[height - 1]);
        let covered = BoundingBox {
            lat_min: y_last + last_gt.pixel_height,
            lat_max: y_max,
            lon_min: x_min,
            lon_max: x_last + last_gt.pixel_width,
        };

        debug!(
            width,
            height,
            tiles = selections.len(),
            filled = claimed.iter().filter(|c| **c).count(),
            "Built mosaic"
        );

        Ok(Mosaic {
            pixels,
            width,
            height,
            geotransform: last_gt.with_origin(x_min, y_max),
            covered,
        })
    }
}
