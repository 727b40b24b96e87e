//! Reprojection of survey tables into the grid CRS.
//!
//! Produces new tables; inputs are never modified.

use crate::error::ProjError;
use crate::grid::GridTemplate;
use crate::proj::crs::CrsTransform;
use crate::records::{EffortInterval, Observation};

/// Moves record coordinates from a source CRS into a grid's CRS.
pub struct Reprojector {
    /// `None` when source and grid CRS are the same string.
    transform: Option<CrsTransform>,
}

impl Reprojector {
    pub fn new(src_crs: &str, grid: &GridTemplate) -> Result<Self, ProjError> {
        let transform = if src_crs.eq_ignore_ascii_case(grid.crs()) {
            None
        } else {
            Some(CrsTransform::new(src_crs, grid.crs())?)
        };
        Ok(Self { transform })
    }

    pub fn points(&self, points: &[(f64, f64)]) -> Result<Vec<(f64, f64)>, ProjError> {
        let mut coords = points.to_vec();
        if let Some(ct) = &self.transform {
            ct.transform_batch(&mut coords)?;
        }
        Ok(coords)
    }

    pub fn observations(&self, observations: &[Observation]) -> Result<Vec<Observation>, ProjError> {
        let coords: Vec<_> = observations.iter().map(|o| (o.lon, o.lat)).collect();
        let projected = self.points(&coords)?;
        Ok(observations
            .iter()
            .zip(projected)
            .map(|(o, (x, y))| Observation {
                lon: x,
                lat: y,
                ..o.clone()
            })
            .collect())
    }

    pub fn effort(&self, intervals: &[EffortInterval]) -> Result<Vec<EffortInterval>, ProjError> {
        let coords: Vec<_> = intervals.iter().map(|e| (e.lon, e.lat)).collect();
        let projected = self.points(&coords)?;
        Ok(intervals
            .iter()
            .zip(projected)
            .map(|(e, (x, y))| EffortInterval {
                lon: x,
                lat: y,
                ..e.clone()
            })
            .collect())
    }
}
