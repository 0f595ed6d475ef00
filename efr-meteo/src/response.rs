//! Forecast response decoding.
//!
//! A multi-location request answers with a JSON array holding one object per
//! requested coordinate, in request order; a single-location request answers
//! with a bare object. Each object carries an `hourly` or `daily` block with
//! a `time` array and one array per variable, where `null` marks a missing
//! sample.

use crate::error::{MeteoError, Result};
use crate::source::{ForecastSource, Resolution};
use efr_data::RawSeries;
use serde::Deserialize;
use serde_json::{Map, Value};

/// Raw series returned for one location.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationSeries {
    /// Grid cell elevation in metres, when the API reports one
    pub elevation: Option<f64>,
    /// One series per requested variable, in request order
    pub series: Vec<RawSeries>,
}

#[derive(Deserialize)]
struct LocationPayload {
    #[serde(default)]
    elevation: Option<f64>,
    #[serde(default)]
    hourly: Option<Map<String, Value>>,
    #[serde(default)]
    daily: Option<Map<String, Value>>,
}

/// Reason given by an `{"error": true, "reason": ...}` payload.
pub fn api_error_reason(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    if value.get("error").and_then(Value::as_bool) != Some(true) {
        return None;
    }
    Some(
        value
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or("unspecified")
            .to_string(),
    )
}

fn samples(values: &[Value]) -> Vec<Option<f64>> {
    values.iter().map(Value::as_f64).collect()
}

/// Decode a response body into one [`LocationSeries`] per requested location.
pub fn parse_response(
    body: &str,
    source: ForecastSource,
    expected_locations: usize,
) -> Result<Vec<LocationSeries>> {
    if let Some(reason) = api_error_reason(body) {
        return Err(MeteoError::Api {
            status: 200,
            reason,
        });
    }

    let payloads: Vec<LocationPayload> = match serde_json::from_str::<Value>(body)? {
        Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<_, _>>()?,
        object @ Value::Object(_) => vec![serde_json::from_value(object)?],
        other => {
            return Err(MeteoError::ResponseParse(format!(
                "expected object or array, got {other}"
            )))
        }
    };
    if payloads.len() != expected_locations {
        return Err(MeteoError::LocationCount {
            expected: expected_locations,
            found: payloads.len(),
        });
    }

    let block_name = source.resolution().block();
    payloads
        .into_iter()
        .enumerate()
        .map(|(location, payload)| {
            let block = match source.resolution() {
                Resolution::Daily => payload.daily.as_ref(),
                Resolution::Hourly => payload.hourly.as_ref(),
            };
            let series = source
                .variables()
                .iter()
                .map(|variable| {
                    block
                        .and_then(|b| b.get(*variable))
                        .and_then(Value::as_array)
                        .map(|values| RawSeries::new(*variable, samples(values)))
                        .ok_or_else(|| MeteoError::MissingSeries {
                            location,
                            block: block_name,
                            variable: variable.to_string(),
                        })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(LocationSeries {
                elevation: payload.elevation,
                series,
            })
        })
        .collect()
}
