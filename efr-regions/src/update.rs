//! Region updater: fold a batch's scored rows back into its region records.

use crate::error::{RegionError, Result};
use crate::record::{HorizonForecast, RegionForecast, RegionRecord};
use chrono::NaiveDateTime;
use efr_data::{stats, ScoredRow};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::ops::Range;

/// Compute a region's forecast from the scored rows at its representative
/// point, returning the updated record.
///
/// Rows for other coordinates are ignored. Having no matching row, or two
/// rows for the same `date_id`, is an error.
pub fn update_region(record: &RegionRecord, scored: &[ScoredRow]) -> Result<RegionRecord> {
    let rows: Vec<&ScoredRow> = scored
        .iter()
        .filter(|s| s.row.coord == record.point)
        .collect();
    if rows.is_empty() {
        return Err(RegionError::NoMatchingRows {
            id: record.id.clone(),
        });
    }

    let mut horizons = BTreeMap::new();
    for row in &rows {
        match horizons.entry(row.row.date_id) {
            Entry::Occupied(_) => {
                return Err(RegionError::DuplicateHorizon {
                    id: record.id.clone(),
                    date_id: row.row.date_id,
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(HorizonForecast {
                    flood_proba: row.flood_proba,
                    flood_type: row.flood_type.clone(),
                });
            }
        }
    }

    let proba: Vec<Option<f64>> = rows.iter().map(|r| Some(f64::from(r.flood_proba))).collect();
    let summary = || {
        Some(RegionForecast {
            max_flood_proba: rows.iter().map(|r| r.flood_proba).max()?,
            mean_flood_proba: stats::mean(&proba)?,
            median_flood_proba: stats::median(&proba)?,
            mode_flood_type: stats::mode(rows.iter().map(|r| &r.flood_type))?.clone(),
            horizons,
        })
    };
    let forecast = summary().ok_or_else(|| RegionError::NoMatchingRows {
        id: record.id.clone(),
    })?;

    let mut updated = record.clone();
    updated.forecast = Some(forecast);
    Ok(updated)
}

/// Update every record of a batch from the batch's scored rows.
pub fn update_batch(records: &[RegionRecord], scored: &[ScoredRow]) -> Result<Vec<RegionRecord>> {
    records
        .iter()
        .map(|record| update_region(record, scored))
        .collect()
}

/// Mark records as refreshed at `timestamp`.
pub fn stamp(records: &mut [RegionRecord], timestamp: NaiveDateTime) {
    for record in records {
        record.last_update = Some(timestamp);
    }
}

/// Split `len` records into consecutive ranges of at most `size`.
pub fn batches(len: usize, size: usize) -> Vec<Range<usize>> {
    let size = size.max(1);
    (0..len)
        .step_by(size)
        .map(|start| start..(start + size).min(len))
        .collect()
}
