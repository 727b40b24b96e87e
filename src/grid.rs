//! Shared regular grid that every layer of a run is rasterized onto.
//!
//! Cells are addressed as `(row, col)` with row 0 along the northern edge,
//! following the usual north-up raster convention.

use serde::{Deserialize, Serialize};

use crate::affine::Affine;
use crate::error::ClimatologyError;

/// Tolerance used when deciding how many cells cover an extent, so that an
/// extent which is an exact multiple of the resolution does not gain a
/// spurious extra row or column from rounding noise.
const CELL_COUNT_EPS: f64 = 1e-9;

/// Projected bounding box in CRS linear units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl Extent {
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Result<Self, ClimatologyError> {
        let extent = Self {
            xmin,
            ymin,
            xmax,
            ymax,
        };
        extent.validate()?;
        Ok(extent)
    }

    /// Bounding box of a set of vertices, e.g. the survey boundary geometry.
    pub fn from_points(points: &[(f64, f64)]) -> Result<Self, ClimatologyError> {
        let mut xmin = f64::INFINITY;
        let mut ymin = f64::INFINITY;
        let mut xmax = f64::NEG_INFINITY;
        let mut ymax = f64::NEG_INFINITY;
        for &(x, y) in points.iter().filter(|(x, y)| x.is_finite() && y.is_finite()) {
            xmin = xmin.min(x);
            ymin = ymin.min(y);
            xmax = xmax.max(x);
            ymax = ymax.max(y);
        }
        if !xmin.is_finite() {
            return Err(ClimatologyError::InvalidGrid(
                "boundary has no finite vertices".into(),
            ));
        }
        Self::new(xmin, ymin, xmax, ymax)
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    fn validate(&self) -> Result<(), ClimatologyError> {
        let finite = [self.xmin, self.ymin, self.xmax, self.ymax]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(ClimatologyError::InvalidGrid(format!(
                "extent has non-finite bounds: {self:?}"
            )));
        }
        if self.xmax <= self.xmin || self.ymax <= self.ymin {
            return Err(ClimatologyError::InvalidGrid(format!(
                "extent is empty or inverted: {self:?}"
            )));
        }
        Ok(())
    }
}

/// Grid description handed to downstream consumers and stamped onto every
/// layer so that alignment can be checked without holding the template.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridMetadata {
    pub crs: String,
    /// Effective extent, snapped outward to whole cells from the upper-left corner.
    pub extent: Extent,
    pub resolution: f64,
    pub rows: usize,
    pub cols: usize,
}

impl GridMetadata {
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn cell_count(&self) -> usize {
        self.rows * self.cols
    }
}

/// Immutable grid template. Build it once per report and pass it by
/// reference to every rasterization call.
#[derive(Clone, Debug)]
pub struct GridTemplate {
    meta: GridMetadata,
    transform: Affine,
    inverse: Affine,
}

impl GridTemplate {
    /// Build a template covering `extent` with square cells of `resolution`
    /// CRS units.
    ///
    /// The upper-left corner is anchored at `(xmin, ymax)`; when the extent is
    /// not an exact multiple of the resolution the last column/row extends
    /// past `xmax`/`ymin`.
    pub fn new(extent: Extent, resolution: f64, crs: &str) -> Result<Self, ClimatologyError> {
        extent.validate()?;
        if !resolution.is_finite() || resolution <= 0.0 {
            return Err(ClimatologyError::InvalidGrid(format!(
                "resolution must be positive, got {resolution}"
            )));
        }
        if crs.trim().is_empty() {
            return Err(ClimatologyError::InvalidGrid("CRS must not be empty".into()));
        }

        let cols = cell_count(extent.width(), resolution)?;
        let rows = cell_count(extent.height(), resolution)?;
        rows.checked_mul(cols)
            .filter(|&n| n <= isize::MAX as usize)
            .ok_or_else(|| {
                ClimatologyError::InvalidGrid(format!(
                    "{rows}x{cols} cells at resolution {resolution} is too large"
                ))
            })?;

        let transform = Affine::north_up(extent.xmin, extent.ymax, resolution);
        let inverse = transform.inverse()?;
        let snapped = Extent {
            xmin: extent.xmin,
            ymin: extent.ymax - rows as f64 * resolution,
            xmax: extent.xmin + cols as f64 * resolution,
            ymax: extent.ymax,
        };

        Ok(Self {
            meta: GridMetadata {
                crs: crs.to_string(),
                extent: snapped,
                resolution,
                rows,
                cols,
            },
            transform,
            inverse,
        })
    }

    /// Build a template around the vertices of a boundary geometry, with the
    /// extent snapped outward to multiples of `resolution`.
    pub fn covering(
        boundary: &[(f64, f64)],
        resolution: f64,
        crs: &str,
    ) -> Result<Self, ClimatologyError> {
        if !resolution.is_finite() || resolution <= 0.0 {
            return Err(ClimatologyError::InvalidGrid(format!(
                "resolution must be positive, got {resolution}"
            )));
        }
        let bbox = Extent::from_points(boundary)?;
        let snap_down = |v: f64| (v / resolution).floor() * resolution;
        let snap_up = |v: f64| (v / resolution).ceil() * resolution;
        let mut extent = Extent {
            xmin: snap_down(bbox.xmin),
            ymin: snap_down(bbox.ymin),
            xmax: snap_up(bbox.xmax),
            ymax: snap_up(bbox.ymax),
        };
        // A boundary lying exactly on a cell edge still needs one cell.
        if extent.xmax <= extent.xmin {
            extent.xmax = extent.xmin + resolution;
        }
        if extent.ymax <= extent.ymin {
            extent.ymax = extent.ymin + resolution;
        }
        Self::new(extent, resolution, crs)
    }

    pub fn metadata(&self) -> &GridMetadata {
        &self.meta
    }

    pub fn crs(&self) -> &str {
        &self.meta.crs
    }

    pub fn extent(&self) -> &Extent {
        &self.meta.extent
    }

    pub fn resolution(&self) -> f64 {
        self.meta.resolution
    }

    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.meta.shape()
    }

    pub fn transform(&self) -> &Affine {
        &self.transform
    }

    /// Projected coordinate of the centre of cell `(row, col)`.
    pub fn cell_center(&self, row: usize, col: usize) -> Option<(f64, f64)> {
        if row >= self.meta.rows || col >= self.meta.cols {
            return None;
        }
        Some(self.transform.forward(col as f64 + 0.5, row as f64 + 0.5))
    }

    /// Cell containing the projected point `(x, y)`.
    ///
    /// Cells are closed on their west/north edges. Points exactly on the
    /// grid's outer east or south edge fall into the last column or row;
    /// anything else outside the grid returns `None`.
    pub fn cell_of(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        let (col_f, row_f) = self.inverse.forward(x, y);
        let col = edge_index(col_f, self.meta.cols)?;
        let row = edge_index(row_f, self.meta.rows)?;
        Some((row, col))
    }

    /// Row-major linear index of a cell.
    pub fn cell_index(&self, row: usize, col: usize) -> Option<usize> {
        if row >= self.meta.rows || col >= self.meta.cols {
            return None;
        }
        Some(row * self.meta.cols + col)
    }

    /// Fail with `MisalignedGrid` unless `other` describes this same grid.
    pub fn check_aligned(&self, other: &GridMetadata, what: &str) -> Result<(), ClimatologyError> {
        check_same_grid(&self.meta, other, what)
    }
}

pub(crate) fn check_same_grid(
    expected: &GridMetadata,
    found: &GridMetadata,
    what: &str,
) -> Result<(), ClimatologyError> {
    if expected == found {
        return Ok(());
    }
    Err(ClimatologyError::MisalignedGrid(format!(
        "{what}: expected {}x{} @ {} in {} over {:?}, found {}x{} @ {} in {} over {:?}",
        expected.rows,
        expected.cols,
        expected.resolution,
        expected.crs,
        expected.extent,
        found.rows,
        found.cols,
        found.resolution,
        found.crs,
        found.extent,
    )))
}

fn cell_count(span: f64, resolution: f64) -> Result<usize, ClimatologyError> {
    let n = ((span / resolution) - CELL_COUNT_EPS).ceil().max(1.0);
    if !n.is_finite() || n > isize::MAX as f64 {
        return Err(ClimatologyError::InvalidGrid(format!(
            "span {span} at resolution {resolution} gives too many cells"
        )));
    }
    Ok(n as usize)
}

fn edge_index(pos: f64, len: usize) -> Option<usize> {
    if pos < -CELL_COUNT_EPS {
        return None;
    }
    let idx = pos.max(0.0).floor() as usize;
    if idx < len {
        Some(idx)
    } else if pos <= len as f64 + CELL_COUNT_EPS {
        Some(len - 1)
    } else {
        None
    }
}
