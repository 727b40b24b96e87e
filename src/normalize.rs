//! Effort normalization: observed count per unit survey distance.

use ndarray::Zip;
use tracing::info;

use crate::error::ClimatologyError;
use crate::raster::layer::is_nodata;
use crate::raster::{LayerKey, LayerSet, RasterLayer};

/// Divide a count layer by an effort layer cell-by-cell.
///
/// Cells with no effort become no-data rather than a ratio; so do cells
/// where either input is already no-data.
pub fn normalize_layer(counts: &RasterLayer, effort: &RasterLayer) -> Result<RasterLayer, ClimatologyError> {
    effort.check_grid(counts.grid(), "effort layer")?;
    Ok(density(counts, effort))
}

/// Grids must already be known to match.
fn density(counts: &RasterLayer, effort: &RasterLayer) -> RasterLayer {
    let values = Zip::from(counts.values())
        .and(effort.values())
        .map_collect(|&c, &e| {
            if is_nodata(c) || is_nodata(e) || e <= 0.0 {
                f64::NAN
            } else {
                c / e
            }
        });

    RasterLayer::from_sized(counts.grid().clone(), values)
}

/// Normalize every (year, group) layer by the effort layer of the same year.
///
/// Fails with `MissingEffortYear` on the first year that has observations
/// but no effort. The output has exactly the keys of `observed`.
pub fn normalize(
    observed: &LayerSet<LayerKey>,
    effort: &LayerSet<i32>,
) -> Result<LayerSet<LayerKey>, ClimatologyError> {
    let normalized = observed
        .iter()
        .map(|(key, counts)| {
            let effort_layer = effort
                .get_layer(&key.year)
                .ok_or(ClimatologyError::MissingEffortYear { year: key.year })?;
            effort_layer
                .check_grid(counts.grid(), &format!("effort {} for {key}", key.year))?;
            Ok::<_, ClimatologyError>((key.clone(), density(counts, effort_layer)))
        })
        .collect::<Result<LayerSet<_>, _>>()?;

    info!(layers = normalized.len(), "Normalized observation layers by effort");
    Ok(normalized)
}
