//! Input tables and the species → reporting-group mapping.
//!
//! Coordinates are carried in the `lon`/`lat` columns as delivered by the
//! upstream tables. Rasterizers expect them to already be expressed in the
//! grid CRS (see [`crate::proj::reproject`]).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// A single sighting record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub species: String,
    pub year: i32,
    pub lon: f64,
    pub lat: f64,
    pub count: u32,
}

/// A surveyed trackline segment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EffortInterval {
    pub year: i32,
    pub lon: f64,
    pub lat: f64,
    pub distance_nmi: f64,
}

/// Explicit species-code → common-name table.
///
/// Several codes may map to one common name (e.g. unidentified and
/// identified codes reported together). Defined once per report and
/// referenced by value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpeciesGroups {
    by_code: BTreeMap<String, String>,
}

impl SpeciesGroups {
    pub fn new<I, C, N>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (C, N)>,
        C: Into<String>,
        N: Into<String>,
    {
        Self {
            by_code: pairs
                .into_iter()
                .map(|(code, name)| (code.into(), name.into()))
                .collect(),
        }
    }

    /// Common name for a species code, if the code is part of a group.
    pub fn group_of(&self, code: &str) -> Option<&str> {
        self.by_code.get(code).map(String::as_str)
    }

    /// All common names, sorted.
    pub fn groups(&self) -> BTreeSet<&str> {
        self.by_code.values().map(String::as_str).collect()
    }

    /// Species codes merged into `group`, sorted.
    pub fn members(&self, group: &str) -> Vec<&str> {
        self.by_code
            .iter()
            .filter(|(_, name)| name.as_str() == group)
            .map(|(code, _)| code.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

/// How observations are keyed into reporting groups.
#[derive(Clone, Copy, Debug)]
pub enum Grouping<'a> {
    /// One group per raw species code.
    BySpecies,
    /// Codes merged by common name; codes missing from the table are excluded.
    ByCommonName(&'a SpeciesGroups),
}

impl Grouping<'_> {
    /// Group key for one observation, or `None` if it belongs to no group.
    pub fn key_for(&self, obs: &Observation) -> Option<String> {
        match self {
            Grouping::BySpecies => Some(obs.species.clone()),
            Grouping::ByCommonName(groups) => groups.group_of(&obs.species).map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gulls() -> SpeciesGroups {
        SpeciesGroups::new([
            ("HERG", "Herring Gull"),
            ("UNLG", "Large Gull"),
            ("GBBG", "Large Gull"),
        ])
    }

    fn obs(species: &str) -> Observation {
        Observation {
            species: species.into(),
            year: 2012,
            lon: 0.0,
            lat: 0.0,
            count: 1,
        }
    }

    #[test]
    fn test_group_lookup() {
        let groups = gulls();
        assert_eq!(groups.group_of("GBBG"), Some("Large Gull"));
        assert_eq!(groups.group_of("NOGA"), None);
        assert_eq!(
            groups.groups().into_iter().collect::<Vec<_>>(),
            vec!["Herring Gull", "Large Gull"]
        );
        assert_eq!(groups.members("Large Gull"), vec!["GBBG", "UNLG"]);
    }

    #[test]
    fn test_grouping_keys() {
        let groups = gulls();
        assert_eq!(Grouping::BySpecies.key_for(&obs("NOGA")), Some("NOGA".into()));
        let by_name = Grouping::ByCommonName(&groups);
        assert_eq!(by_name.key_for(&obs("UNLG")), Some("Large Gull".into()));
        assert_eq!(by_name.key_for(&obs("NOGA")), None);
    }

    #[test]
    fn test_groups_from_json() {
        let groups: SpeciesGroups =
            serde_json::from_str(r#"{"COEI": "Common Eider", "UNEI": "Common Eider"}"#).unwrap();
        assert_eq!(groups.members("Common Eider"), vec!["COEI", "UNEI"]);
    }
}
