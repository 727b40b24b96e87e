pub mod crs;
pub mod reproject;

pub use crs::CrsTransform;
pub use reproject::Reprojector;
