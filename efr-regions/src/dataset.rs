//! The region dataset: a GeoJSON FeatureCollection of region records.

use crate::error::{RegionError, Result};
use crate::record::RegionRecord;
use chrono::NaiveDate;
use log::info;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Default property holding the region identifier.
pub const DEFAULT_ID_PROPERTY: &str = "GID_2";

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    records: Vec<RegionRecord>,
    /// Collection members other than `type` and `features` (`name`, `crs`, ...)
    members: Map<String, Value>,
}

impl Dataset {
    pub fn load(path: impl AsRef<Path>, id_property: &str) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| RegionError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let dataset = Self::from_json(&json, id_property)?;
        info!("Loaded {} regions from {}", dataset.len(), path.display());
        Ok(dataset)
    }

    pub fn from_json(json: &str, id_property: &str) -> Result<Self> {
        let mut collection = match serde_json::from_str::<Value>(json)? {
            Value::Object(map) => map,
            other => {
                return Err(RegionError::NotFeatureCollection(format!(
                    "top level is {other}"
                )))
            }
        };
        if collection.get("type").and_then(Value::as_str) != Some("FeatureCollection") {
            return Err(RegionError::NotFeatureCollection(
                "type is not FeatureCollection".into(),
            ));
        }
        collection.remove("type");
        let features = match collection.remove("features") {
            Some(Value::Array(features)) => features,
            _ => {
                return Err(RegionError::NotFeatureCollection(
                    "missing features array".into(),
                ))
            }
        };

        let records = features
            .into_iter()
            .enumerate()
            .map(|(index, feature)| match feature {
                Value::Object(map) => RegionRecord::from_feature(map, index, id_property),
                _ => Err(RegionError::MissingProperty {
                    index,
                    property: "properties".into(),
                }),
            })
            .collect::<Result<Vec<_>>>()?;
        check_unique_ids(&records)?;

        Ok(Self {
            records,
            members: collection,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        let mut collection = Map::new();
        collection.insert("type".into(), Value::from("FeatureCollection"));
        collection.extend(self.members.clone());
        collection.insert(
            "features".into(),
            Value::Array(self.records.iter().map(RegionRecord::to_feature).collect()),
        );
        Ok(serde_json::to_string(&Value::Object(collection))?)
    }

    /// Rewrite the whole dataset file.
    ///
    /// The new content goes to a sibling temporary file first, so a crash
    /// mid-write leaves the previous dataset intact.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = self.to_json()?;
        let write_error = |source| RegionError::Write {
            path: path.to_path_buf(),
            source,
        };

        let mut tmp = PathBuf::from(path);
        tmp.as_mut_os_string().push(".tmp");
        std::fs::write(&tmp, json).map_err(write_error)?;
        std::fs::rename(&tmp, path).map_err(write_error)?;
        Ok(())
    }

    pub fn records(&self) -> &[RegionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Replace the records in `range` with `updated`, one for one.
    pub fn replace(&mut self, range: Range<usize>, updated: Vec<RegionRecord>) {
        debug_assert_eq!(range.len(), updated.len());
        for (slot, record) in self.records[range].iter_mut().zip(updated) {
            *slot = record;
        }
    }

    /// Number of regions not yet refreshed on `run_date`.
    pub fn stale_count(&self, run_date: NaiveDate) -> usize {
        self.records.iter().filter(|r| r.is_stale(run_date)).count()
    }
}

fn check_unique_ids(records: &[RegionRecord]) -> Result<()> {
    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        if !seen.insert(record.id.as_str()) {
            return Err(RegionError::DuplicateId(record.id.clone()));
        }
    }
    Ok(())
}
