//! Feature export: the assembled feature matrix for a few regions, as CSV.
//!
//! Useful for inspecting what the classifiers see and for gathering
//! training data with exactly the production feature pipeline.

use anyhow::Result;
use efr_data::{FeatureRow, ScoredRow};
use efr_utils::dates::format_date;
use std::collections::BTreeSet;
use std::io::Write;

const KEY_COLUMNS: [&str; 4] = ["date", "date_id", "lat", "lon"];
const SCORE_COLUMNS: [&str; 2] = ["flood_proba", "flood_type"];

fn cell(value: Option<f64>) -> String {
    value.map_or(String::new(), |v| v.to_string())
}

/// Write feature rows, with classifier outputs when `scores` is given.
///
/// Columns are the key columns followed by every feature column in
/// lexicographic order; missing values are empty cells.
pub fn write_features<W: Write>(
    writer: W,
    rows: &[FeatureRow],
    scores: Option<&[ScoredRow]>,
) -> Result<()> {
    let columns: BTreeSet<&String> = rows.iter().flat_map(|r| r.values.keys()).collect();

    let mut wtr = csv::Writer::from_writer(writer);
    let mut header: Vec<&str> = KEY_COLUMNS.to_vec();
    header.extend(columns.iter().map(|c| c.as_str()));
    if scores.is_some() {
        header.extend(SCORE_COLUMNS);
    }
    wtr.write_record(&header)?;

    for (i, row) in rows.iter().enumerate() {
        let mut record = vec![
            format_date(&row.date),
            row.date_id.to_string(),
            row.coord.lat.to_string(),
            row.coord.lon.to_string(),
        ];
        record.extend(columns.iter().map(|c| cell(row.get(c).flatten())));
        if let Some(scored) = scores.and_then(|s| s.get(i)) {
            record.push(scored.flood_proba.to_string());
            record.push(scored.flood_type.clone());
        }
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}
