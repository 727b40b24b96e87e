//! Per-report run configuration, read from JSON.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::classify::ClassBreaks;
use crate::error::ClimatologyError;
use crate::grid::{Extent, GridTemplate};
use crate::raster::{EffortRasterizer, DEFAULT_MAX_EFFORT_NMI};
use crate::records::{Grouping, SpeciesGroups};

fn default_max_effort_nmi() -> f64 {
    DEFAULT_MAX_EFFORT_NMI
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Grid CRS, e.g. `"EPSG:32619"` or a PROJ string.
    pub crs: String,
    pub extent: Extent,
    /// Cell size in grid CRS units.
    pub resolution: f64,
    /// CRS of the input tables. When absent they must already be in `crs`.
    #[serde(default)]
    pub source_crs: Option<String>,
    #[serde(default = "default_max_effort_nmi")]
    pub max_effort_nmi: f64,
    pub breaks: ClassBreaks,
    /// Species code → common name. Empty means report per species code.
    #[serde(default)]
    pub species_groups: SpeciesGroups,
}

impl PipelineConfig {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ClimatologyError> {
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ClimatologyError> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn validate(&self) -> Result<(), ClimatologyError> {
        if !self.max_effort_nmi.is_finite() || self.max_effort_nmi <= 0.0 {
            return Err(ClimatologyError::Config(format!(
                "max_effort_nmi must be positive, got {}",
                self.max_effort_nmi
            )));
        }
        if let Some(src) = &self.source_crs {
            if src.trim().is_empty() {
                return Err(ClimatologyError::Config("source_crs must not be empty".into()));
            }
        }
        self.grid().map(|_| ())
    }

    pub fn grid(&self) -> Result<GridTemplate, ClimatologyError> {
        let e = self.extent;
        let extent = Extent::new(e.xmin, e.ymin, e.xmax, e.ymax)?;
        GridTemplate::new(extent, self.resolution, &self.crs)
    }

    pub fn effort_rasterizer(&self) -> EffortRasterizer {
        EffortRasterizer::new(self.max_effort_nmi)
    }

    pub fn grouping(&self) -> Grouping<'_> {
        if self.species_groups.is_empty() {
            Grouping::BySpecies
        } else {
            Grouping::ByCommonName(&self.species_groups)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const MINIMAL: &str = r#"{
        "crs": "EPSG:32619",
        "extent": {"xmin": 300000, "ymin": 4700000, "xmax": 700000, "ymax": 4900000},
        "resolution": 10000,
        "breaks": [0.01, 0.1, 1.0]
    }"#;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::from_reader(MINIMAL.as_bytes()).unwrap();
        assert_relative_eq!(config.max_effort_nmi, 1000.0);
        assert!(config.source_crs.is_none());
        assert!(matches!(config.grouping(), Grouping::BySpecies));
        assert_eq!(config.grid().unwrap().shape(), (20, 40));
    }

    #[test]
    fn test_groups_select_common_name_grouping() {
        let json = MINIMAL.replace(
            r#""breaks""#,
            r#""species_groups": {"COEI": "Common Eider"}, "breaks""#,
        );
        let config = PipelineConfig::from_reader(json.as_bytes()).unwrap();
        assert!(matches!(config.grouping(), Grouping::ByCommonName(_)));
    }

    #[test]
    fn test_rejects_bad_values() {
        let bad_breaks = MINIMAL.replace("[0.01, 0.1, 1.0]", "[1.0, 0.1]");
        assert!(PipelineConfig::from_reader(bad_breaks.as_bytes()).is_err());

        let bad_res = MINIMAL.replace(r#""resolution": 10000"#, r#""resolution": 0"#);
        assert!(matches!(
            PipelineConfig::from_reader(bad_res.as_bytes()),
            Err(ClimatologyError::InvalidGrid(_))
        ));

        let bad_threshold = MINIMAL.replace(
            r#""resolution": 10000"#,
            r#""resolution": 10000, "max_effort_nmi": -1"#,
        );
        assert!(matches!(
            PipelineConfig::from_reader(bad_threshold.as_bytes()),
            Err(ClimatologyError::Config(_))
        ));

        let unknown = MINIMAL.replace(r#""resolution""#, r#""palette": "viridis", "resolution""#);
        assert!(PipelineConfig::from_reader(unknown.as_bytes()).is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            PipelineConfig::from_path("/nonexistent/report.json"),
            Err(ClimatologyError::Io(_))
        ));
    }
}
