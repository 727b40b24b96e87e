//! Effort-normalized density climatologies from survey sightings.
//!
//! Point tables of observations and survey effort are summed onto a shared
//! grid, divided by effort per year, averaged across years per species or
//! reporting group, and bucketed into ordered classes for map rendering.

pub mod error;
pub mod affine;
pub mod grid;
pub mod records;
pub mod proj;
pub mod raster;
pub mod normalize;
pub mod climatology;
pub mod classify;
pub mod stack;
pub mod config;
pub mod pipeline;
