//! Point-to-grid aggregation of effort and observation tables.
//!
//! Both rasterizers sum values per cell. Empty cells are zero, not no-data:
//! no-data only appears once observations are divided by effort.

use std::collections::BTreeMap;

use ndarray::Array2;
use num_traits::ToPrimitive;
use tracing::{debug, info};

use crate::grid::GridTemplate;
use crate::raster::layer::{LayerKey, LayerSet, RasterLayer};
use crate::records::{EffortInterval, Grouping, Observation};

/// Effort segments longer than this are gaps in the track record, not effort.
pub const DEFAULT_MAX_EFFORT_NMI: f64 = 1000.0;

/// Accumulates point values into one zero-initialised array per key.
struct CellSums<'g, K> {
    grid: &'g GridTemplate,
    sums: BTreeMap<K, Array2<f64>>,
    outside: usize,
}

impl<'g, K: Ord + Clone> CellSums<'g, K> {
    fn new(grid: &'g GridTemplate) -> Self {
        Self {
            grid,
            sums: BTreeMap::new(),
            outside: 0,
        }
    }

    fn add<V: ToPrimitive>(&mut self, key: &K, x: f64, y: f64, value: V) {
        let shape = self.grid.shape();
        // The key is registered even if the point misses the grid.
        let arr = self
            .sums
            .entry(key.clone())
            .or_insert_with(|| Array2::zeros(shape));
        match (self.grid.cell_of(x, y), value.to_f64()) {
            (Some(cell), Some(v)) => arr[cell] += v,
            _ => self.outside += 1,
        }
    }

    fn finish(self) -> LayerSet<K> {
        let meta = self.grid.metadata();
        self.sums
            .into_iter()
            .map(|(k, values)| (k, RasterLayer::from_sized(meta.clone(), values)))
            .collect()
    }
}

/// Sums survey distance per cell and year.
#[derive(Clone, Copy, Debug)]
pub struct EffortRasterizer {
    max_distance_nmi: f64,
}

impl Default for EffortRasterizer {
    fn default() -> Self {
        Self {
            max_distance_nmi: DEFAULT_MAX_EFFORT_NMI,
        }
    }
}

impl EffortRasterizer {
    pub fn new(max_distance_nmi: f64) -> Self {
        Self { max_distance_nmi }
    }

    pub fn max_distance_nmi(&self) -> f64 {
        self.max_distance_nmi
    }

    /// Whether an interval counts as real effort. Distances above the
    /// threshold are rejected, as are negative and non-finite ones.
    pub fn accepts(&self, interval: &EffortInterval) -> bool {
        let d = interval.distance_nmi;
        d.is_finite() && d >= 0.0 && d <= self.max_distance_nmi
    }

    /// One layer per year present among the accepted intervals.
    pub fn rasterize(&self, intervals: &[EffortInterval], grid: &GridTemplate) -> LayerSet<i32> {
        let mut sums = CellSums::new(grid);
        let mut anomalous = 0usize;

        for interval in intervals {
            if !self.accepts(interval) {
                anomalous += 1;
                continue;
            }
            sums.add(&interval.year, interval.lon, interval.lat, interval.distance_nmi);
        }

        if anomalous > 0 {
            debug!(
                anomalous,
                threshold_nmi = self.max_distance_nmi,
                "Dropped anomalous effort intervals"
            );
        }
        if sums.outside > 0 {
            debug!(outside = sums.outside, "Effort intervals outside grid");
        }

        let layers = sums.finish();
        info!(
            intervals = intervals.len(),
            years = layers.len(),
            "Rasterized survey effort"
        );
        layers
    }
}

/// Sums observed counts per cell under an arbitrary key.
///
/// Observations for which `key_fn` returns `None` are skipped.
pub fn rasterize_observations_by<K, F>(
    observations: &[Observation],
    grid: &GridTemplate,
    mut key_fn: F,
) -> LayerSet<K>
where
    K: Ord + Clone,
    F: FnMut(&Observation) -> Option<K>,
{
    let mut sums = CellSums::new(grid);
    let mut ungrouped = 0usize;

    for obs in observations {
        match key_fn(obs) {
            Some(key) => sums.add(&key, obs.lon, obs.lat, obs.count),
            None => ungrouped += 1,
        }
    }

    if ungrouped > 0 {
        debug!(ungrouped, "Observations without a reporting group");
    }
    if sums.outside > 0 {
        debug!(outside = sums.outside, "Observations outside grid");
    }
    sums.finish()
}

/// Sums observed counts per cell, keyed by year and group.
pub fn rasterize_observations(
    observations: &[Observation],
    grid: &GridTemplate,
    grouping: Grouping<'_>,
) -> LayerSet<LayerKey> {
    let layers = rasterize_observations_by(observations, grid, |obs| {
        grouping
            .key_for(obs)
            .map(|group| LayerKey::new(obs.year, group))
    });
    info!(
        observations = observations.len(),
        layers = layers.len(),
        "Rasterized observations"
    );
    layers
}

/// Like [`rasterize_observations`] but only for a single group, so callers
/// can process one group at a time.
pub fn rasterize_group(
    observations: &[Observation],
    grid: &GridTemplate,
    grouping: Grouping<'_>,
    group: &str,
) -> LayerSet<LayerKey> {
    rasterize_observations_by(observations, grid, |obs| {
        grouping
            .key_for(obs)
            .filter(|g| g == group)
            .map(|g| LayerKey::new(obs.year, g))
    })
}
