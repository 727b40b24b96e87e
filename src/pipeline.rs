//! End-to-end batch run: rasterize, normalize, average, classify.

use std::collections::BTreeSet;

use tracing::info;

use crate::classify::{classify, classify_set, ClassBreaks, ClassifiedLayer, ClassifiedSet};
use crate::climatology::{average_group, Climatology, GroupAverage, PipelineWarning};
use crate::config::PipelineConfig;
use crate::error::ClimatologyError;
use crate::grid::GridTemplate;
use crate::normalize::normalize;
use crate::proj::Reprojector;
use crate::raster::{rasterize_group, rasterize_observations, EffortRasterizer, LayerKey, LayerSet};
use crate::records::{EffortInterval, Grouping, Observation};

/// Everything a report needs from one full run.
#[derive(Debug)]
pub struct RunOutput {
    pub effort: LayerSet<i32>,
    pub normalized: LayerSet<LayerKey>,
    pub climatology: Climatology,
    pub classified: ClassifiedSet<String>,
}

/// One group's products from [`ClimatologyPipeline::for_each_group`].
#[derive(Debug)]
pub struct GroupProduct {
    pub group: String,
    pub normalized: LayerSet<LayerKey>,
    pub average: GroupAverage,
    pub classes: ClassifiedLayer,
}

/// Holds the grid and the per-year effort layers, which every group shares.
pub struct ClimatologyPipeline<'g> {
    grid: &'g GridTemplate,
    effort: LayerSet<i32>,
}

impl<'g> ClimatologyPipeline<'g> {
    /// Rasterize survey effort once for the whole run.
    pub fn new(grid: &'g GridTemplate, intervals: &[EffortInterval], rasterizer: &EffortRasterizer) -> Self {
        Self {
            grid,
            effort: rasterizer.rasterize(intervals, grid),
        }
    }

    pub fn grid(&self) -> &GridTemplate {
        self.grid
    }

    pub fn effort(&self) -> &LayerSet<i32> {
        &self.effort
    }

    /// Build every layer for every group, holding all of them in memory.
    pub fn run(
        &self,
        observations: &[Observation],
        grouping: Grouping<'_>,
        breaks: &ClassBreaks,
    ) -> Result<RunOutput, ClimatologyError> {
        let counts = rasterize_observations(observations, self.grid, grouping);
        let normalized = normalize(&counts, &self.effort)?;
        drop(counts);

        let groups = report_groups(observations, grouping);
        let climatology = Climatology::build(&normalized, groups.iter().map(String::as_str), self.grid)?;
        let classified = classify_set(climatology.layers(), breaks);

        Ok(RunOutput {
            effort: self.effort.clone(),
            normalized,
            climatology,
            classified,
        })
    }

    /// Process one group at a time, handing each group's products to `sink`
    /// and dropping them before moving on. Returns the warnings raised.
    pub fn for_each_group<F>(
        &self,
        observations: &[Observation],
        grouping: Grouping<'_>,
        breaks: &ClassBreaks,
        mut sink: F,
    ) -> Result<Vec<PipelineWarning>, ClimatologyError>
    where
        F: FnMut(GroupProduct) -> Result<(), ClimatologyError>,
    {
        let groups = report_groups(observations, grouping);
        let mut warnings = Vec::new();

        for group in &groups {
            let counts = rasterize_group(observations, self.grid, grouping, group);
            let normalized = normalize(&counts, &self.effort)?;
            let average = average_group(&normalized, group, self.grid)?;
            let classes = classify(&average.layer, breaks);
            warnings.extend(average.warning.clone());
            sink(GroupProduct {
                group: group.clone(),
                normalized,
                average,
                classes,
            })?;
        }

        info!(groups = groups.len(), warnings = warnings.len(), "Processed groups");
        Ok(warnings)
    }
}

/// Groups a report covers: every observed species code, or every common
/// name in the table (observed or not, so empty groups are reported).
pub fn report_groups(observations: &[Observation], grouping: Grouping<'_>) -> BTreeSet<String> {
    match grouping {
        Grouping::BySpecies => observations.iter().map(|o| o.species.clone()).collect(),
        Grouping::ByCommonName(groups) => groups.groups().into_iter().map(str::to_string).collect(),
    }
}

/// Run a whole report from its configuration, reprojecting the input
/// tables into the grid CRS first when `source_crs` is set.
pub fn run_report(
    config: &PipelineConfig,
    observations: &[Observation],
    intervals: &[EffortInterval],
) -> Result<RunOutput, ClimatologyError> {
    config.validate()?;
    let grid = config.grid()?;

    let (observations, intervals) = match &config.source_crs {
        Some(src) => {
            let reprojector = Reprojector::new(src, &grid)?;
            (reprojector.observations(observations)?, reprojector.effort(intervals)?)
        }
        None => (observations.to_vec(), intervals.to_vec()),
    };

    let pipeline = ClimatologyPipeline::new(&grid, &intervals, &config.effort_rasterizer());
    let output = pipeline.run(&observations, config.grouping(), &config.breaks)?;
    info!(
        crs = grid.crs(),
        rows = grid.shape().0,
        cols = grid.shape().1,
        groups = output.climatology.list_keys().len(),
        "Report run complete"
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Extent;
    use crate::records::SpeciesGroups;
    use approx::assert_relative_eq;

    fn grid() -> GridTemplate {
        let extent = Extent::new(0.0, 0.0, 100.0, 100.0).unwrap();
        GridTemplate::new(extent, 50.0, "EPSG:3857").unwrap()
    }

    fn effort(year: i32, x: f64, y: f64, d: f64) -> EffortInterval {
        EffortInterval {
            year,
            lon: x,
            lat: y,
            distance_nmi: d,
        }
    }

    fn obs(species: &str, year: i32, x: f64, y: f64, count: u32) -> Observation {
        Observation {
            species: species.into(),
            year,
            lon: x,
            lat: y,
            count,
        }
    }

    fn breaks() -> ClassBreaks {
        ClassBreaks::new(vec![0.1, 0.5, 1.0]).unwrap()
    }

    #[test]
    fn test_single_cell_single_year() {
        let g = grid();
        // 10 nmi of effort, all in cell (0, 0) during 2012
        let intervals = vec![effort(2012, 10.0, 90.0, 4.0), effort(2012, 40.0, 60.0, 6.0)];
        let observations = vec![obs("X", 2012, 25.0, 75.0, 5)];

        let pipeline = ClimatologyPipeline::new(&g, &intervals, &EffortRasterizer::default());
        let out = pipeline.run(&observations, Grouping::BySpecies, &breaks()).unwrap();

        let density = out.normalized.get_layer(&LayerKey::new(2012, "X")).unwrap();
        assert_relative_eq!(density.get(0, 0).unwrap(), 0.5);
        assert!(density.is_nodata(0, 1));
        assert!(density.is_nodata(1, 0));
        assert!(density.is_nodata(1, 1));

        let clim = out.climatology.get_layer("X").unwrap();
        assert_relative_eq!(clim.get(0, 0).unwrap(), 0.5);
        assert_eq!(clim.valid_count(), 1);

        let classes = out.classified.get_layer(&"X".to_string()).unwrap();
        assert_eq!(classes.get(0, 0), Some(2));
        assert_eq!(classes.get(1, 1), None);
    }

    #[test]
    fn test_missing_effort_year_aborts() {
        let g = grid();
        let intervals = vec![effort(2012, 10.0, 90.0, 10.0)];
        let observations = vec![obs("X", 2012, 25.0, 75.0, 5), obs("X", 2013, 25.0, 75.0, 1)];

        let pipeline = ClimatologyPipeline::new(&g, &intervals, &EffortRasterizer::default());
        let err = pipeline
            .run(&observations, Grouping::BySpecies, &breaks())
            .unwrap_err();
        assert!(matches!(err, ClimatologyError::MissingEffortYear { year: 2013 }));
    }

    #[test]
    fn test_incremental_matches_full_run() {
        let g = grid();
        let intervals = vec![
            effort(2012, 10.0, 90.0, 10.0),
            effort(2012, 60.0, 10.0, 4.0),
            effort(2013, 10.0, 90.0, 5.0),
            effort(2013, 10.0, 90.0, 2500.0),
        ];
        let observations = vec![
            obs("COEI", 2012, 25.0, 75.0, 5),
            obs("UNEI", 2013, 25.0, 75.0, 2),
            obs("COEI", 2012, 75.0, 25.0, 8),
            obs("HERG", 2013, 25.0, 75.0, 1),
        ];
        let groups = SpeciesGroups::new([
            ("COEI", "Common Eider"),
            ("UNEI", "Common Eider"),
            ("RAZO", "Razorbill"),
        ]);
        let grouping = Grouping::ByCommonName(&groups);

        let pipeline = ClimatologyPipeline::new(&g, &intervals, &EffortRasterizer::default());
        let full = pipeline.run(&observations, grouping, &breaks()).unwrap();

        let mut seen = Vec::new();
        let warnings = pipeline
            .for_each_group(&observations, grouping, &breaks(), |product| {
                let expected = full.climatology.get_layer(&product.group).unwrap();
                for ((cell, got), (_, want)) in product.average.layer.cells().zip(expected.cells()) {
                    assert_eq!(got, want, "{} at {cell:?}", product.group);
                }
                seen.push(product.group);
                Ok(())
            })
            .unwrap();

        assert_eq!(seen, vec!["Common Eider", "Razorbill"]);
        assert_eq!(warnings, full.climatology.warnings());
        assert_eq!(
            warnings,
            vec![PipelineWarning::EmptyGroup {
                group: "Razorbill".into()
            }]
        );

        // (5/10 + 2/5) / 2 at the shared cell, 8/4 where only 2012 was flown
        let eider = full.climatology.get_layer("Common Eider").unwrap();
        assert_relative_eq!(eider.get(0, 0).unwrap(), 0.45);
        assert_relative_eq!(eider.get(1, 1).unwrap(), 2.0);
        assert!(eider.is_nodata(0, 1));
    }

    #[test]
    fn test_sink_error_stops_run() {
        let g = grid();
        let intervals = vec![effort(2012, 10.0, 90.0, 10.0)];
        let observations = vec![obs("A", 2012, 25.0, 75.0, 1), obs("B", 2012, 25.0, 75.0, 1)];
        let pipeline = ClimatologyPipeline::new(&g, &intervals, &EffortRasterizer::default());

        let mut calls = 0;
        let result = pipeline.for_each_group(&observations, Grouping::BySpecies, &breaks(), |_| {
            calls += 1;
            Err(ClimatologyError::Config("render failed".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_run_report_from_config() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{
                "crs": "EPSG:3857",
                "extent": {"xmin": 0, "ymin": 0, "xmax": 100, "ymax": 100},
                "resolution": 50,
                "breaks": [0.1, 0.5, 1.0]
            }"#,
        )
        .unwrap();
        let intervals = vec![effort(2012, 10.0, 90.0, 10.0)];
        let observations = vec![obs("X", 2012, 25.0, 75.0, 5)];

        let out = run_report(&config, &observations, &intervals).unwrap();
        assert_eq!(out.effort.list_keys(), BTreeSet::from([2012]));
        assert_relative_eq!(out.climatology.get_layer("X").unwrap().get(0, 0).unwrap(), 0.5);
    }
}
