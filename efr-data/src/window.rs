//! Rolling-window feature extraction.
//!
//! Each forecast day gets a 31-day trailing window over the raw samples,
//! starting `date_id` days into the series. The window feeds five
//! aggregates per variable:
//!
//! | column            | slice                | aggregate |
//! |-------------------|----------------------|-----------|
//! | `median_{var}_30` | whole window         | median    |
//! | `mean_{var}_30`   | whole window         | mean      |
//! | `mean_{var}_5`    | last 5 days          | mean      |
//! | `mean_{var}_1`    | last day             | mean      |
//! | `max_{var}_1`     | last day             | max       |
//!
//! The window spans 31 days because the forecast APIs treat the end date as
//! inclusive; the `_30` suffix is part of the trained models' feature names.

use crate::stats;
use crate::table::{Coordinate, FeatureRow, FeatureTable};
use chrono::NaiveDate;
use efr_utils::range::DateRange;

/// Trailing window length in days.
pub const WINDOW_DAYS: usize = 31;

/// Samples of one raw variable, oldest first. `None` marks a missing sample.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSeries {
    pub name: String,
    pub samples: Vec<Option<f64>>,
}

impl RawSeries {
    pub fn new(name: impl Into<String>, samples: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            samples,
        }
    }
}

// Out-of-range bounds shrink the slice instead of panicking.
fn clamp(samples: &[Option<f64>], start: usize, end: usize) -> &[Option<f64>] {
    let end = end.min(samples.len());
    let start = start.min(end);
    &samples[start..end]
}

/// Build one feature row per day in `[start, end]` for a single coordinate.
///
/// `samples_per_day` is 24 for hourly series and 1 for daily series. Series
/// too short for a window produce `None` aggregates rather than errors.
pub fn window_features(
    coord: Coordinate,
    series: &[RawSeries],
    start: NaiveDate,
    end: NaiveDate,
    samples_per_day: usize,
) -> FeatureTable {
    let rows = DateRange(start, end)
        .enumerate()
        .map(|(i, date)| {
            let window_start = i * samples_per_day;
            let window_end = window_start + WINDOW_DAYS * samples_per_day;
            let start_5 = window_end.saturating_sub(5 * samples_per_day);
            let start_1 = window_end.saturating_sub(samples_per_day);

            let mut row = FeatureRow::new(date, i as u32, coord);
            for var in series {
                let month = clamp(&var.samples, window_start, window_end);
                let last_5 = clamp(&var.samples, start_5, window_end);
                let last_1 = clamp(&var.samples, start_1, window_end);
                let name = &var.name;

                row.values.insert(format!("median_{name}_30"), stats::median(month));
                row.values.insert(format!("mean_{name}_30"), stats::mean(month));
                row.values.insert(format!("mean_{name}_5"), stats::mean(last_5));
                row.values.insert(format!("mean_{name}_1"), stats::mean(last_1));
                row.values.insert(format!("max_{name}_1"), stats::max(last_1));
            }
            row
        })
        .collect();
    FeatureTable::new(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hourly(days: usize, value: impl Fn(usize) -> Option<f64>) -> Vec<Option<f64>> {
        (0..days * 24).map(value).collect()
    }

    fn date(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, month, day).unwrap()
    }

    #[test]
    fn test_one_row_per_day_with_contiguous_ids() {
        let series = [RawSeries::new("precipitation", hourly(38, |_| Some(1.0)))];
        let table = window_features(
            Coordinate::new(45.0, 5.0),
            &series,
            date(1, 31),
            date(2, 7),
            24,
        );
        assert_eq!(table.len(), 8);
        let ids: Vec<u32> = table.rows.iter().map(|r| r.date_id).collect();
        assert_eq!(ids, (0..8).collect::<Vec<u32>>());
        assert_eq!(table.rows[0].date, date(1, 31));
        assert_eq!(table.rows[7].date, date(2, 7));
        assert!(table.rows.iter().all(|r| r.coord == Coordinate::new(45.0, 5.0)));
    }

    #[test]
    fn test_window_aggregates() {
        // Sample value = day index, so day d contributes 24 samples of d.
        let series = [RawSeries::new("t", hourly(38, |h| Some((h / 24) as f64)))];
        let table = window_features(
            Coordinate::new(45.0, 5.0),
            &series,
            date(1, 1),
            date(1, 8),
            24,
        );

        // Day 0 covers raw days 0..=30.
        let first = &table.rows[0];
        assert_eq!(first.get("median_t_30"), Some(Some(15.0)));
        assert_eq!(first.get("mean_t_30"), Some(Some(15.0)));
        assert_eq!(first.get("mean_t_5"), Some(Some(28.0)));
        assert_eq!(first.get("mean_t_1"), Some(Some(30.0)));
        assert_eq!(first.get("max_t_1"), Some(Some(30.0)));

        // Day 7 covers raw days 7..=37.
        let last = &table.rows[7];
        assert_eq!(last.get("mean_t_1"), Some(Some(37.0)));
        assert_eq!(last.get("max_t_1"), Some(Some(37.0)));
    }

    #[test]
    fn test_daily_series() {
        let series = [RawSeries::new(
            "river_discharge",
            (0..38).map(|d| Some(d as f64)).collect(),
        )];
        let table = window_features(
            Coordinate::new(45.0, 5.0),
            &series,
            date(1, 1),
            date(1, 8),
            1,
        );
        assert_eq!(table.len(), 8);
        assert_eq!(table.rows[0].get("mean_river_discharge_1"), Some(Some(30.0)));
        assert_eq!(table.rows[0].get("mean_river_discharge_5"), Some(Some(28.0)));
    }

    #[test]
    fn test_short_series_yields_none_not_zero() {
        // Only 31 days of data: day 0 is complete, later windows run past
        // the end of the series.
        let series = [RawSeries::new("t", hourly(31, |_| Some(2.0)))];
        let table = window_features(
            Coordinate::new(45.0, 5.0),
            &series,
            date(1, 1),
            date(2, 15),
            24,
        );
        assert_eq!(table.rows[0].get("mean_t_1"), Some(Some(2.0)));
        // Day 1 still sees a partial window.
        assert_eq!(table.rows[1].get("mean_t_30"), Some(Some(2.0)));
        assert_eq!(table.rows[1].get("mean_t_1"), Some(None));
        // Far past the end, every aggregate is missing.
        let far = table.rows.last().unwrap();
        assert_eq!(far.get("median_t_30"), Some(None));
        assert_eq!(far.get("max_t_1"), Some(None));
    }

    #[test]
    fn test_all_missing_samples_yield_none() {
        let series = [
            RawSeries::new("wave_height", hourly(38, |_| None)),
            RawSeries::new("sea_level_height_msl", hourly(38, |h| Some(h as f64))),
        ];
        let table = window_features(
            Coordinate::new(45.0, 5.0),
            &series,
            date(1, 1),
            date(1, 8),
            24,
        );
        for row in &table.rows {
            assert_eq!(row.get("mean_wave_height_30"), Some(None));
            assert_eq!(row.get("max_wave_height_1"), Some(None));
            assert!(row.get("mean_sea_level_height_msl_30").unwrap().is_some());
        }
    }

    #[test]
    fn test_empty_range() {
        let series = [RawSeries::new("t", hourly(38, |_| Some(1.0)))];
        let table = window_features(
            Coordinate::new(45.0, 5.0),
            &series,
            date(1, 9),
            date(1, 8),
            24,
        );
        assert!(table.is_empty());
    }
}
