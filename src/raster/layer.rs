//! Grid-aligned layers and keyed collections of them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::ClimatologyError;
use crate::grid::{check_same_grid, GridMetadata, GridTemplate};

/// No-data cells are stored as NaN so that they can never be mistaken for a
/// finite density, and are surfaced as `None` by every accessor.
pub(crate) fn is_nodata(v: f64) -> bool {
    v.is_nan()
}

/// Dense grid of values, each either finite or no-data.
#[derive(Clone, Debug)]
pub struct RasterLayer {
    grid: GridMetadata,
    values: Array2<f64>,
}

impl RasterLayer {
    /// All cells zero.
    pub fn zeros(grid: &GridTemplate) -> Self {
        Self {
            grid: grid.metadata().clone(),
            values: Array2::zeros(grid.shape()),
        }
    }

    /// All cells no-data.
    pub fn nodata(grid: &GridTemplate) -> Self {
        Self {
            grid: grid.metadata().clone(),
            values: Array2::from_elem(grid.shape(), f64::NAN),
        }
    }

    /// Wrap a value array, using NaN for no-data cells.
    pub fn from_array(grid: &GridTemplate, values: Array2<f64>) -> Result<Self, ClimatologyError> {
        Self::from_parts(grid.metadata().clone(), values)
    }

    pub(crate) fn from_parts(grid: GridMetadata, values: Array2<f64>) -> Result<Self, ClimatologyError> {
        if values.dim() != grid.shape() {
            return Err(ClimatologyError::MisalignedGrid(format!(
                "array shape {:?} does not match grid shape {:?}",
                values.dim(),
                grid.shape()
            )));
        }
        Ok(Self { grid, values })
    }

    /// Caller guarantees `values` already has the grid's shape.
    pub(crate) fn from_sized(grid: GridMetadata, values: Array2<f64>) -> Self {
        debug_assert_eq!(values.dim(), grid.shape());
        Self { grid, values }
    }

    pub fn grid(&self) -> &GridMetadata {
        &self.grid
    }

    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    /// Value at `(row, col)`; `None` for no-data or out-of-range cells.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.values
            .get((row, col))
            .copied()
            .filter(|v| !is_nodata(*v))
    }

    pub fn is_nodata(&self, row: usize, col: usize) -> bool {
        self.get(row, col).is_none()
    }

    /// Raw cell array with NaN marking no-data.
    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    /// Row-major iteration over `((row, col), value)`.
    pub fn cells(&self) -> impl Iterator<Item = ((usize, usize), Option<f64>)> + '_ {
        self.values
            .indexed_iter()
            .map(|(idx, &v)| (idx, if is_nodata(v) { None } else { Some(v) }))
    }

    /// Sum over valid cells.
    pub fn sum(&self) -> f64 {
        self.values.iter().filter(|v| !is_nodata(**v)).sum()
    }

    /// Number of cells holding a value.
    pub fn valid_count(&self) -> usize {
        self.values.iter().filter(|v| !is_nodata(**v)).count()
    }

    /// Smallest and largest valid values, or `None` if every cell is no-data.
    pub fn min_max(&self) -> Option<(f64, f64)> {
        self.values
            .iter()
            .copied()
            .filter(|v| !is_nodata(*v))
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    pub(crate) fn check_grid(&self, expected: &GridMetadata, what: &str) -> Result<(), ClimatologyError> {
        check_same_grid(expected, &self.grid, what)
    }
}

/// Key of a per-year, per-group layer.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LayerKey {
    pub year: i32,
    pub group: String,
}

impl LayerKey {
    pub fn new(year: i32, group: impl Into<String>) -> Self {
        Self {
            year,
            group: group.into(),
        }
    }
}

impl fmt::Display for LayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.year, self.group)
    }
}

/// Layers keyed by a structured key. Keys are unique; iteration is in key order.
#[derive(Clone, Debug)]
pub struct LayerSet<K: Ord> {
    layers: BTreeMap<K, RasterLayer>,
}

impl<K: Ord> Default for LayerSet<K> {
    fn default() -> Self {
        Self {
            layers: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone> LayerSet<K> {
    pub fn get_layer(&self, key: &K) -> Option<&RasterLayer> {
        self.layers.get(key)
    }

    pub fn list_keys(&self) -> BTreeSet<K> {
        self.layers.keys().cloned().collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.layers.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &RasterLayer)> {
        self.layers.iter()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Consume the set, keeping only entries matching `keep`.
    pub fn retain_keys(self, mut keep: impl FnMut(&K) -> bool) -> Self {
        self.layers.into_iter().filter(|(k, _)| keep(k)).collect()
    }
}

impl LayerSet<LayerKey> {
    /// Distinct groups across all years.
    pub fn groups(&self) -> BTreeSet<&str> {
        self.layers.keys().map(|k| k.group.as_str()).collect()
    }

    /// Distinct years across all groups.
    pub fn years(&self) -> BTreeSet<i32> {
        self.layers.keys().map(|k| k.year).collect()
    }

    /// Every year's layer for one group, in year order.
    pub fn for_group<'a>(&'a self, group: &'a str) -> impl Iterator<Item = (i32, &'a RasterLayer)> + 'a {
        self.layers
            .iter()
            .filter(move |(k, _)| k.group == group)
            .map(|(k, layer)| (k.year, layer))
    }
}

impl<K: Ord> FromIterator<(K, RasterLayer)> for LayerSet<K> {
    fn from_iter<I: IntoIterator<Item = (K, RasterLayer)>>(iter: I) -> Self {
        Self {
            layers: iter.into_iter().collect(),
        }
    }
}

impl<K: Ord> IntoIterator for LayerSet<K> {
    type Item = (K, RasterLayer);
    type IntoIter = std::collections::btree_map::IntoIter<K, RasterLayer>;

    fn into_iter(self) -> Self::IntoIter {
        self.layers.into_iter()
    }
}
