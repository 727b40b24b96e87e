//! Grid layers and the rasterizers that produce them.

pub mod layer;
pub mod rasterize;

pub use layer::{LayerKey, LayerSet, RasterLayer};
pub use rasterize::{
    rasterize_group, rasterize_observations, rasterize_observations_by, EffortRasterizer,
    DEFAULT_MAX_EFFORT_NMI,
};
