//! Breakpoint classification of continuous layers into ordered classes.
//!
//! With `n` breakpoints `b[0] < ... < b[n-1]` there are `n + 1` classes:
//!
//! | class     | values                 |
//! |-----------|------------------------|
//! | `0`       | `v < b[0]`             |
//! | `i`       | `b[i-1] <= v < b[i]`   |
//! | `n`       | `v >= b[n-1]`          |
//!
//! Intervals are right-open, so a value exactly on a breakpoint belongs to
//! the class above it. No-data stays no-data.

use std::collections::{BTreeMap, BTreeSet};

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::ClimatologyError;
use crate::grid::GridMetadata;
use crate::raster::layer::is_nodata;
use crate::raster::{LayerSet, RasterLayer};

/// Strictly ascending, non-empty breakpoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct ClassBreaks {
    breaks: Vec<f64>,
}

impl ClassBreaks {
    pub fn new(breaks: Vec<f64>) -> Result<Self, ClimatologyError> {
        if breaks.is_empty() {
            return Err(ClimatologyError::InvalidBreakpoints(
                "at least one breakpoint is required".into(),
            ));
        }
        if let Some(bad) = breaks.iter().find(|b| !b.is_finite()) {
            return Err(ClimatologyError::InvalidBreakpoints(format!(
                "breakpoint {bad} is not finite"
            )));
        }
        if let Some(w) = breaks.windows(2).find(|w| w[0] >= w[1]) {
            return Err(ClimatologyError::InvalidBreakpoints(format!(
                "breakpoints must be strictly ascending, found {} then {}",
                w[0], w[1]
            )));
        }
        Ok(Self { breaks })
    }

    /// Breakpoints at the `k / n_classes` quantiles (k = 1..n_classes) of
    /// the valid cells, with linear interpolation between order statistics.
    ///
    /// Tied quantiles are merged, so fewer than `n_classes` classes may result.
    pub fn from_quantiles(layer: &RasterLayer, n_classes: usize) -> Result<Self, ClimatologyError> {
        if n_classes < 2 {
            return Err(ClimatologyError::InvalidBreakpoints(format!(
                "need at least 2 classes, got {n_classes}"
            )));
        }
        let mut values: Vec<f64> = layer
            .values()
            .iter()
            .copied()
            .filter(|v| !is_nodata(*v))
            .collect();
        if values.is_empty() {
            return Err(ClimatologyError::InvalidBreakpoints(
                "layer has no valid cells to derive quantiles from".into(),
            ));
        }
        values.sort_by(f64::total_cmp);

        let mut breaks: Vec<f64> = Vec::with_capacity(n_classes - 1);
        for k in 1..n_classes {
            let q = quantile_sorted(&values, k as f64 / n_classes as f64);
            if breaks.last().map_or(true, |&last| q > last) {
                breaks.push(q);
            }
        }
        Self::new(breaks)
    }

    pub fn breaks(&self) -> &[f64] {
        &self.breaks
    }

    /// Number of classes, one more than the number of breakpoints.
    pub fn class_count(&self) -> usize {
        self.breaks.len() + 1
    }

    /// Class of a finite value; `None` for no-data.
    pub fn class_of(&self, value: f64) -> Option<usize> {
        if is_nodata(value) {
            return None;
        }
        Some(self.breaks.partition_point(|&b| b <= value))
    }

    /// Legend text for a class, e.g. `[0.5, 1)`.
    pub fn label(&self, class: usize) -> Option<String> {
        let n = self.breaks.len();
        match class {
            0 => Some(format!("< {}", self.breaks[0])),
            c if c < n => Some(format!("[{}, {})", self.breaks[c - 1], self.breaks[c])),
            c if c == n => Some(format!(">= {}", self.breaks[n - 1])),
            _ => None,
        }
    }
}

impl TryFrom<Vec<f64>> for ClassBreaks {
    type Error = ClimatologyError;

    fn try_from(breaks: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(breaks)
    }
}

impl From<ClassBreaks> for Vec<f64> {
    fn from(breaks: ClassBreaks) -> Self {
        breaks.breaks
    }
}

fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    let h = (sorted.len() - 1) as f64 * p;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Grid of class indices with `None` for no-data cells.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassifiedLayer {
    grid: GridMetadata,
    classes: Array2<Option<usize>>,
}

impl ClassifiedLayer {
    pub fn grid(&self) -> &GridMetadata {
        &self.grid
    }

    pub fn shape(&self) -> (usize, usize) {
        self.classes.dim()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<usize> {
        self.classes.get((row, col)).copied().flatten()
    }

    pub fn classes(&self) -> ArrayView2<'_, Option<usize>> {
        self.classes.view()
    }

    /// Cell count per class, indexed by class.
    pub fn histogram(&self, breaks: &ClassBreaks) -> Vec<usize> {
        let mut counts = vec![0; breaks.class_count()];
        for class in self.classes.iter().flatten() {
            if let Some(c) = counts.get_mut(*class) {
                *c += 1;
            }
        }
        counts
    }
}

pub fn classify(layer: &RasterLayer, breaks: &ClassBreaks) -> ClassifiedLayer {
    ClassifiedLayer {
        grid: layer.grid().clone(),
        classes: layer.values().map(|&v| breaks.class_of(v)),
    }
}

/// Classified layers under the same keys as their source set.
#[derive(Clone, Debug)]
pub struct ClassifiedSet<K: Ord> {
    layers: BTreeMap<K, ClassifiedLayer>,
}

impl<K: Ord + Clone> ClassifiedSet<K> {
    pub fn get_layer(&self, key: &K) -> Option<&ClassifiedLayer> {
        self.layers.get(key)
    }

    pub fn list_keys(&self) -> BTreeSet<K> {
        self.layers.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &ClassifiedLayer)> {
        self.layers.iter()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

pub fn classify_set<K: Ord + Clone>(set: &LayerSet<K>, breaks: &ClassBreaks) -> ClassifiedSet<K> {
    ClassifiedSet {
        layers: set
            .iter()
            .map(|(k, layer)| (k.clone(), classify(layer, breaks)))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Extent, GridTemplate};
    use approx::assert_relative_eq;
    use ndarray::array;

    fn breaks() -> ClassBreaks {
        ClassBreaks::new(vec![0.1, 0.5, 1.0]).unwrap()
    }

    fn grid() -> GridTemplate {
        let extent = Extent::new(0.0, 0.0, 100.0, 100.0).unwrap();
        GridTemplate::new(extent, 50.0, "EPSG:3857").unwrap()
    }

    #[test]
    fn test_boundary_values_go_up() {
        let b = breaks();
        assert_eq!(b.class_count(), 4);
        assert_eq!(b.class_of(0.0999), Some(0));
        assert_eq!(b.class_of(0.1), Some(1));
        assert_eq!(b.class_of(0.4999), Some(1));
        assert_eq!(b.class_of(0.5), Some(2));
        assert_eq!(b.class_of(1.0), Some(3));
        assert_eq!(b.class_of(250.0), Some(3));
    }

    #[test]
    fn test_below_first_break_is_bottom_class() {
        let b = breaks();
        assert_eq!(b.class_of(0.0), Some(0));
        assert_eq!(b.class_of(-3.0), Some(0));
    }

    #[test]
    fn test_nodata_stays_nodata() {
        assert_eq!(breaks().class_of(f64::NAN), None);
    }

    #[test]
    fn test_monotone() {
        let b = breaks();
        let values = [-1.0, 0.0, 0.05, 0.1, 0.3, 0.5, 0.75, 1.0, 2.0, 10.0];
        for pair in values.windows(2) {
            assert!(b.class_of(pair[0]) <= b.class_of(pair[1]), "{pair:?}");
        }
    }

    #[test]
    fn test_invalid_breaks() {
        for bad in [vec![], vec![0.5, 0.5], vec![1.0, 0.5], vec![0.1, f64::NAN]] {
            let err = ClassBreaks::new(bad).unwrap_err();
            assert!(matches!(err, ClimatologyError::InvalidBreakpoints(_)));
        }
    }

    #[test]
    fn test_breaks_from_json() {
        let ok: ClassBreaks = serde_json::from_str("[0.0, 0.5, 2.0]").unwrap();
        assert_eq!(ok.breaks(), &[0.0, 0.5, 2.0]);
        assert!(serde_json::from_str::<ClassBreaks>("[2.0, 0.5]").is_err());
    }

    #[test]
    fn test_labels() {
        let b = breaks();
        assert_eq!(b.label(0).unwrap(), "< 0.1");
        assert_eq!(b.label(2).unwrap(), "[0.5, 1)");
        assert_eq!(b.label(3).unwrap(), ">= 1");
        assert!(b.label(4).is_none());
    }

    #[test]
    fn test_classify_layer() {
        let g = grid();
        let layer = RasterLayer::from_array(&g, array![[0.0, 0.5], [f64::NAN, 7.0]]).unwrap();
        let b = breaks();
        let classes = classify(&layer, &b);
        assert_eq!(classes.shape(), (2, 2));
        assert_eq!(classes.get(0, 0), Some(0));
        assert_eq!(classes.get(0, 1), Some(2));
        assert_eq!(classes.get(1, 0), None);
        assert_eq!(classes.get(1, 1), Some(3));
        assert_eq!(classes.histogram(&b), vec![1, 0, 1, 1]);
    }

    #[test]
    fn test_classify_set_keeps_keys() {
        let g = grid();
        let set: LayerSet<String> = [
            ("COEI".to_string(), RasterLayer::zeros(&g)),
            ("NOGA".to_string(), RasterLayer::nodata(&g)),
        ]
        .into_iter()
        .collect();
        let classified = classify_set(&set, &breaks());
        assert_eq!(classified.list_keys(), set.list_keys());
        let noga = classified.get_layer(&"NOGA".to_string()).unwrap();
        assert!(noga.classes().iter().all(Option::is_none));
    }

    #[test]
    fn test_quantile_breaks() {
        let g = grid();
        let layer = RasterLayer::from_array(&g, array![[1.0, 2.0], [3.0, f64::NAN]]).unwrap();
        let b = ClassBreaks::from_quantiles(&layer, 2).unwrap();
        assert_eq!(b.breaks().len(), 1);
        assert_relative_eq!(b.breaks()[0], 2.0);

        let flat = RasterLayer::zeros(&g);
        let b = ClassBreaks::from_quantiles(&flat, 4).unwrap();
        assert_eq!(b.breaks(), &[0.0]);

        assert!(ClassBreaks::from_quantiles(&RasterLayer::nodata(&g), 3).is_err());
        assert!(ClassBreaks::from_quantiles(&layer, 1).is_err());
    }
}
