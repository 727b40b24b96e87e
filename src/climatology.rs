//! Multi-year averaging of normalized layers into per-group climatologies.
//!
//! Each cell is averaged over only the years in which it holds a value, so a
//! group surveyed in fewer years is not diluted by unsurveyed ones.

use std::collections::BTreeSet;
use std::fmt;

use ndarray::{Array2, Zip};
use tracing::{info, warn};

use crate::error::ClimatologyError;
use crate::grid::GridTemplate;
use crate::raster::layer::is_nodata;
use crate::raster::{LayerKey, LayerSet, RasterLayer};

/// Recoverable conditions attached to pipeline output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineWarning {
    /// No layer in any year matched the group; its climatology is all no-data.
    EmptyGroup { group: String },
}

impl fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineWarning::EmptyGroup { group } => {
                write!(f, "no observations for group '{group}'")
            }
        }
    }
}

/// Averaged layer for one group, with the years that fed it.
#[derive(Clone, Debug)]
pub struct GroupAverage {
    pub layer: RasterLayer,
    pub years: BTreeSet<i32>,
    pub warning: Option<PipelineWarning>,
}

/// Average every year's normalized layer for `group`, cell by cell.
///
/// No-data cells are skipped; a cell with no valid year is no-data. Every
/// contributing layer must sit on `grid`.
pub fn average_group(
    normalized: &LayerSet<LayerKey>,
    group: &str,
    grid: &GridTemplate,
) -> Result<GroupAverage, ClimatologyError> {
    let shape = grid.shape();
    let mut sum = Array2::<f64>::zeros(shape);
    let mut valid = Array2::<u32>::zeros(shape);
    let mut years = BTreeSet::new();

    for (year, layer) in normalized.for_group(group) {
        grid.check_aligned(layer.grid(), &format!("normalized layer {year} / {group}"))?;
        Zip::from(&mut sum)
            .and(&mut valid)
            .and(layer.values())
            .for_each(|s, n, &v| {
                if !is_nodata(v) {
                    *s += v;
                    *n += 1;
                }
            });
        years.insert(year);
    }

    let warning = if years.is_empty() {
        warn!(group, "No observations for group, emitting empty layer");
        Some(PipelineWarning::EmptyGroup {
            group: group.to_string(),
        })
    } else {
        None
    };

    let mean = Zip::from(&sum)
        .and(&valid)
        .map_collect(|&s, &n| if n == 0 { f64::NAN } else { s / f64::from(n) });

    Ok(GroupAverage {
        layer: RasterLayer::from_sized(grid.metadata().clone(), mean),
        years,
        warning,
    })
}

/// Per-group multi-year averages plus any warnings raised building them.
#[derive(Clone, Debug, Default)]
pub struct Climatology {
    layers: LayerSet<String>,
    warnings: Vec<PipelineWarning>,
}

impl Climatology {
    /// Average each requested group. Groups with no layers yield an all
    /// no-data layer and an `EmptyGroup` warning instead of an error.
    pub fn build<'a, I>(
        normalized: &LayerSet<LayerKey>,
        groups: I,
        grid: &GridTemplate,
    ) -> Result<Self, ClimatologyError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut layers = Vec::new();
        let mut warnings = Vec::new();
        for group in groups {
            let avg = average_group(normalized, group, grid)?;
            warnings.extend(avg.warning);
            layers.push((group.to_string(), avg.layer));
        }

        let climatology = Self {
            layers: layers.into_iter().collect(),
            warnings,
        };
        info!(
            groups = climatology.layers.len(),
            empty = climatology.warnings.len(),
            "Built climatology"
        );
        Ok(climatology)
    }

    /// Average every group present in `normalized`.
    pub fn build_all(normalized: &LayerSet<LayerKey>, grid: &GridTemplate) -> Result<Self, ClimatologyError> {
        Self::build(normalized, normalized.groups(), grid)
    }

    pub fn get_layer(&self, group: &str) -> Option<&RasterLayer> {
        self.layers.get_layer(&group.to_string())
    }

    pub fn list_keys(&self) -> BTreeSet<String> {
        self.layers.list_keys()
    }

    pub fn layers(&self) -> &LayerSet<String> {
        &self.layers
    }

    pub fn warnings(&self) -> &[PipelineWarning] {
        &self.warnings
    }
}
