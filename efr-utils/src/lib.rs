//! Shared utility functions for EFR crates.

/// Date utility functions
pub mod dates {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

    /// Format used for API query parameters and exported dates: "YYYY-MM-DD"
    pub const DATE_FORMAT: &str = "%Y-%m-%d";

    /// Format used when writing `last_update` timestamps.
    pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

    /// Format a NaiveDate as "YYYY-MM-DD"
    pub fn format_date(date: &NaiveDate) -> String {
        date.format(DATE_FORMAT).to_string()
    }

    /// Parse a date string in "YYYY-MM-DD" format
    pub fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
        Ok(NaiveDate::parse_from_str(s, DATE_FORMAT)?)
    }

    /// Format a timestamp as "YYYY-MM-DDTHH:MM:SS"
    pub fn format_timestamp(ts: &NaiveDateTime) -> String {
        ts.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Parse a timestamp written by us or by other GeoJSON writers.
    ///
    /// Accepts RFC 3339 (offset is dropped after converting to UTC),
    /// `YYYY-MM-DDTHH:MM:SS[.f]`, `YYYY-MM-DD HH:MM:SS[.f]` and a bare
    /// `YYYY-MM-DD` (midnight).
    pub fn parse_timestamp(s: &str) -> anyhow::Result<NaiveDateTime> {
        let s = s.trim();
        if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
            return Ok(ts.naive_utc());
        }
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(ts) = NaiveDateTime::parse_from_str(s, format) {
                return Ok(ts);
            }
        }
        let date = parse_date(s)
            .map_err(|_| anyhow::anyhow!("unrecognised timestamp: {s:?}"))?;
        Ok(date.and_time(NaiveTime::MIN))
    }

}

/// Forecast window arithmetic shared by the fetchers and the orchestrator.
///
/// A refresh asks the forecast APIs for `HISTORY_DAYS + 1` days of samples
/// ending `HORIZON_DAYS` after the run date. The first `CONTEXT_DAYS` days only
/// feed the trailing windows; one feature row is emitted per remaining day.
pub mod window {
    use chrono::{Duration, NaiveDate};

    /// Days fetched before the forecast end date.
    pub const HISTORY_DAYS: i64 = 37;

    /// Leading days used purely as trailing-window context.
    pub const CONTEXT_DAYS: i64 = 30;

    /// Forecast days after the run date (horizons 0..=HORIZON_DAYS).
    pub const HORIZON_DAYS: i64 = 7;

    /// Last day requested from the forecast APIs for a run on `run_date`.
    pub fn forecast_end(run_date: NaiveDate) -> NaiveDate {
        run_date + Duration::days(HORIZON_DAYS)
    }

    /// First day requested from the forecast APIs.
    pub fn history_start(end_date: NaiveDate) -> NaiveDate {
        end_date - Duration::days(HISTORY_DAYS)
    }

    /// First day that gets a feature row.
    pub fn feature_start(end_date: NaiveDate) -> NaiveDate {
        history_start(end_date) + Duration::days(CONTEXT_DAYS)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_window_bounds() {
            let run = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
            let end = forecast_end(run);
            assert_eq!(end, NaiveDate::from_ymd_opt(2025, 1, 17).unwrap());
            assert_eq!(history_start(end), NaiveDate::from_ymd_opt(2024, 12, 11).unwrap());
            // Feature rows start on the run date: horizons 0..=7.
            assert_eq!(feature_start(end), run);
        }
    }
}

/// A date range iterator that yields each date from the start date
/// through the end date (inclusive).
pub mod range {
    use chrono::{NaiveDate, TimeDelta};
    use std::mem::replace;

    #[derive(Clone, Eq, PartialEq, Copy, Debug)]
    pub struct DateRange(pub NaiveDate, pub NaiveDate);

    impl Iterator for DateRange {
        type Item = NaiveDate;
        fn next(&mut self) -> Option<Self::Item> {
            if self.0 <= self.1 {
                let next = self.0 + TimeDelta::days(1);
                Some(replace(&mut self.0, next))
            } else {
                None
            }
        }
    }

}
