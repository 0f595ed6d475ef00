//! Forecast requests: one POST per source per batch.

use crate::source::ForecastSource;
use chrono::NaiveDate;
use efr_data::Coordinate;
use efr_utils::dates::format_date;

/// All requests are made in GMT so day boundaries line up across sources.
pub const TIMEZONE: &str = "GMT";

/// A batch-parallel request for one forecast source.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRequest {
    pub source: ForecastSource,
    pub coords: Vec<Coordinate>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

fn join<T: ToString>(items: impl IntoIterator<Item = T>) -> String {
    items
        .into_iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

impl ForecastRequest {
    pub fn new(
        source: ForecastSource,
        coords: Vec<Coordinate>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Self {
        Self {
            source,
            coords,
            start_date,
            end_date,
        }
    }

    pub fn url(&self) -> &'static str {
        self.source.url()
    }

    /// Form parameters, in a fixed order.
    pub fn params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("latitude".to_string(), join(self.coords.iter().map(|c| c.lat))),
            ("longitude".to_string(), join(self.coords.iter().map(|c| c.lon))),
            (
                self.source.resolution().block().to_string(),
                join(self.source.variables()),
            ),
            ("timezone".to_string(), TIMEZONE.to_string()),
            ("start_date".to_string(), format_date(&self.start_date)),
            ("end_date".to_string(), format_date(&self.end_date)),
        ];
        if let Some(model) = self.source.model() {
            params.push(("models".to_string(), model.to_string()));
        }
        params
    }

    /// Cache key: the URL plus the encoded parameters.
    pub fn fingerprint(&self) -> String {
        let query = self
            .params()
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("POST {}?{}", self.url(), query)
    }
}
