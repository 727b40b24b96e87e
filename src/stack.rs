//! Optional JSON cache for layer sets.
//!
//! A stack is the grid metadata followed by `(key, cells)` entries, cells in
//! row-major order with `null` marking no-data.

use std::io::{Read, Write};

use ndarray::Array2;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ClimatologyError;
use crate::grid::{GridMetadata, GridTemplate};
use crate::raster::layer::is_nodata;
use crate::raster::{LayerSet, RasterLayer};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StackEntry<K> {
    pub key: K,
    pub cells: Vec<Option<f64>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LayerStack<K> {
    pub grid: GridMetadata,
    pub layers: Vec<StackEntry<K>>,
}

impl<K> LayerStack<K>
where
    K: Ord + Clone + Serialize + DeserializeOwned,
{
    pub fn from_set(set: &LayerSet<K>, grid: &GridTemplate) -> Result<Self, ClimatologyError> {
        let layers = set
            .iter()
            .map(|(key, layer)| {
                grid.check_aligned(layer.grid(), "cached layer")?;
                let cells = layer
                    .values()
                    .iter()
                    .map(|&v| if is_nodata(v) { None } else { Some(v) })
                    .collect();
                Ok::<_, ClimatologyError>(StackEntry {
                    key: key.clone(),
                    cells,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            grid: grid.metadata().clone(),
            layers,
        })
    }

    /// Rebuild the layer set, refusing stacks cached against another grid.
    pub fn into_set(self, grid: &GridTemplate) -> Result<LayerSet<K>, ClimatologyError> {
        grid.check_aligned(&self.grid, "cached stack")?;
        let shape = grid.shape();

        self.layers
            .into_iter()
            .map(|entry| {
                if entry.cells.len() != grid.metadata().cell_count() {
                    return Err(ClimatologyError::MisalignedGrid(format!(
                        "cached layer has {} cells, grid has {}",
                        entry.cells.len(),
                        grid.metadata().cell_count()
                    )));
                }
                let values = entry
                    .cells
                    .into_iter()
                    .map(|c| c.unwrap_or(f64::NAN))
                    .collect::<Vec<_>>();
                let values = Array2::from_shape_vec(shape, values)
                    .map_err(|e| ClimatologyError::MisalignedGrid(e.to_string()))?;
                Ok((entry.key, RasterLayer::from_array(grid, values)?))
            })
            .collect()
    }

    pub fn write_json<W: Write>(&self, writer: W) -> Result<(), ClimatologyError> {
        serde_json::to_writer(writer, self)?;
        debug!(layers = self.layers.len(), "Wrote layer stack");
        Ok(())
    }

    pub fn read_json<R: Read>(reader: R) -> Result<Self, ClimatologyError> {
        let stack: Self = serde_json::from_reader(reader)?;
        debug!(layers = stack.layers.len(), "Read layer stack");
        Ok(stack)
    }
}
