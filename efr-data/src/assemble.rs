//! Feature assembly: one prediction-ready matrix per batch.

use crate::error::{DataError, Result};
use crate::table::{FeatureRow, FeatureTable, ScoredRow};
use chrono::Datelike;
use log::debug;

/// Calendar month (1-12) of the forecast day.
pub const MONTH_COLUMN: &str = "month";

/// Joined feature rows for every (coordinate, forecast day) with data from
/// all four sources.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureMatrix {
    rows: Vec<FeatureRow>,
}

impl FeatureMatrix {
    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Select `columns` in the given order, one vector per row.
    ///
    /// Every column must exist on every row; a missing column means the
    /// matrix does not satisfy the classifier's feature contract.
    pub fn select(&self, columns: &[String]) -> Result<Vec<Vec<Option<f64>>>> {
        self.rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|c| row.get(c).ok_or_else(|| DataError::MissingColumn(c.clone())))
                    .collect()
            })
            .collect()
    }

    /// Attach per-row classifier outputs, consuming the matrix.
    pub fn score(self, flood_proba: Vec<u8>, flood_type: Vec<String>) -> Result<Vec<ScoredRow>> {
        for found in [flood_proba.len(), flood_type.len()] {
            if found != self.rows.len() {
                return Err(DataError::LengthMismatch {
                    expected: self.rows.len(),
                    found,
                });
            }
        }
        Ok(self
            .rows
            .into_iter()
            .zip(flood_proba)
            .zip(flood_type)
            .map(|((row, flood_proba), flood_type)| ScoredRow {
                row,
                flood_proba,
                flood_type,
            })
            .collect())
    }
}

impl From<FeatureTable> for FeatureMatrix {
    fn from(table: FeatureTable) -> Self {
        Self { rows: table.rows }
    }
}

/// Join the per-coordinate tables of the four forecast sources.
///
/// Each source's tables are stacked, then inner-joined on
/// (date, lat, lon, date_id) in the order weather, soil moisture, river
/// discharge, marine. A forecast day missing from any source is dropped.
pub fn assemble(
    weather: Vec<FeatureTable>,
    soil_moisture: Vec<FeatureTable>,
    river_discharge: Vec<FeatureTable>,
    marine: Vec<FeatureTable>,
) -> Result<FeatureMatrix> {
    let weather = FeatureTable::concat(weather);
    let soil_moisture = FeatureTable::concat(soil_moisture);
    let river_discharge = FeatureTable::concat(river_discharge);
    let marine = FeatureTable::concat(marine);
    debug!(
        "Assembling weather={} soil={} river={} marine={} rows",
        weather.len(),
        soil_moisture.len(),
        river_discharge.len(),
        marine.len()
    );

    let mut joined = weather
        .inner_join(&soil_moisture)?
        .inner_join(&river_discharge)?
        .inner_join(&marine)?;
    if joined.is_empty() {
        return Err(DataError::EmptyJoin);
    }
    for row in &mut joined.rows {
        row.values
            .insert(MONTH_COLUMN.to_string(), Some(row.date.month() as f64));
    }
    Ok(joined.into())
}
