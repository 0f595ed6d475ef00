//! Feature rows and per-source feature tables.

use crate::error::{DataError, Result};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A (lat, lon) pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    // -0.0 and 0.0 compare equal, so they must hash equal too.
    fn bits(value: f64) -> u64 {
        if value == 0.0 {
            0.0f64.to_bits()
        } else {
            value.to_bits()
        }
    }
}

/// Join key shared by every forecast source: one row per coordinate per day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowKey {
    pub date: NaiveDate,
    pub date_id: u32,
    lat: u64,
    lon: u64,
}

/// One forecast day for one coordinate.
///
/// `values` holds the feature columns; a `None` value means the source had
/// no usable samples for that aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub date_id: u32,
    pub coord: Coordinate,
    pub values: BTreeMap<String, Option<f64>>,
}

impl FeatureRow {
    pub fn new(date: NaiveDate, date_id: u32, coord: Coordinate) -> Self {
        Self {
            date,
            date_id,
            coord,
            values: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> RowKey {
        RowKey {
            date: self.date,
            date_id: self.date_id,
            lat: Coordinate::bits(self.coord.lat),
            lon: Coordinate::bits(self.coord.lon),
        }
    }

    /// Value of a feature column; `None` when the column does not exist.
    pub fn get(&self, column: &str) -> Option<Option<f64>> {
        self.values.get(column).copied()
    }
}

/// Rows produced by one forecast source, for one or more coordinates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub fn new(rows: Vec<FeatureRow>) -> Self {
        Self { rows }
    }

    /// Stack tables in order.
    pub fn concat(tables: impl IntoIterator<Item = FeatureTable>) -> Self {
        Self {
            rows: tables.into_iter().flat_map(|t| t.rows).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Set a constant column on every row.
    pub fn set_column(&mut self, column: &str, value: Option<f64>) {
        for row in &mut self.rows {
            row.values.insert(column.to_string(), value);
        }
    }

    /// Union of the feature columns present in any row.
    pub fn columns(&self) -> BTreeSet<String> {
        self.rows
            .iter()
            .flat_map(|r| r.values.keys().cloned())
            .collect()
    }

    /// Inner join on (date, lat, lon, date_id).
    ///
    /// Left row order is kept. Rows without a partner on the other side are
    /// dropped. A feature column present on both sides is an error.
    pub fn inner_join(&self, other: &FeatureTable) -> Result<FeatureTable> {
        let mut index: HashMap<RowKey, Vec<&FeatureRow>> = HashMap::new();
        for row in &other.rows {
            index.entry(row.key()).or_default().push(row);
        }

        let mut rows = Vec::new();
        for left in &self.rows {
            let Some(matches) = index.get(&left.key()) else {
                continue;
            };
            for right in matches {
                let mut joined = left.clone();
                for (column, value) in &right.values {
                    if joined.values.insert(column.clone(), *value).is_some() {
                        return Err(DataError::DuplicateColumn(column.clone()));
                    }
                }
                rows.push(joined);
            }
        }
        Ok(FeatureTable { rows })
    }
}

/// A feature row with both classifier outputs attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRow {
    pub row: FeatureRow,
    /// Probability of flooding, rounded to a whole percent (0-100)
    pub flood_proba: u8,
    pub flood_type: String,
}
