//! Region records: one GeoJSON feature per administrative area.
//!
//! The sampling inputs (representative point, nearest-sea point, sea
//! distance, `last_update`) and the forecast outputs are read into typed
//! fields. Every other property and the geometry are carried through
//! untouched.

use crate::error::{RegionError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use efr_data::Coordinate;
use efr_utils::dates::{format_timestamp, parse_timestamp};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

pub const POINT_LAT: &str = "representative_point_lat";
pub const POINT_LON: &str = "representative_point_lon";
pub const SEA_LAT: &str = "Sea latitude";
pub const SEA_LON: &str = "Sea longitude";
pub const SEA_DISTANCE: &str = "Sea distance";
pub const LAST_UPDATE: &str = "last_update";

pub const MAX_FLOOD_PROBA: &str = "max_flood_proba";
pub const MEAN_FLOOD_PROBA: &str = "mean_flood_proba";
pub const MEDIAN_FLOOD_PROBA: &str = "median_flood_proba";
pub const MODE_FLOOD_TYPE: &str = "mode_flood_type";

const FLOOD_PROBA_PREFIX: &str = "flood_proba_";
const FLOOD_TYPE_PREFIX: &str = "flood_type_";

/// Forecast for one horizon (days after the run date).
#[derive(Debug, Clone, PartialEq)]
pub struct HorizonForecast {
    pub flood_proba: u8,
    pub flood_type: String,
}

/// Forecast outputs written by the region updater.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionForecast {
    pub horizons: BTreeMap<u32, HorizonForecast>,
    pub max_flood_proba: u8,
    pub mean_flood_proba: f64,
    pub median_flood_proba: f64,
    pub mode_flood_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionRecord {
    /// Value of the dataset's id property, as text
    pub id: String,
    pub point: Coordinate,
    pub sea: Coordinate,
    pub sea_distance: Option<f64>,
    pub last_update: Option<NaiveDateTime>,
    pub forecast: Option<RegionForecast>,
    /// Remaining properties, including the id property itself
    pub properties: Map<String, Value>,
    pub geometry: Value,
    /// Feature members other than `type`, `properties` and `geometry`
    pub members: Map<String, Value>,
}

fn horizon_key(prefix: &str, key: &str) -> Option<u32> {
    key.strip_prefix(prefix)?.parse().ok()
}

fn take_f64(
    properties: &mut Map<String, Value>,
    index: usize,
    property: &str,
) -> Result<f64> {
    properties
        .remove(property)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| RegionError::MissingProperty {
            index,
            property: property.to_string(),
        })
}

fn percent(value: &Value) -> Option<u8> {
    value.as_u64().filter(|p| *p <= 100).map(|p| p as u8)
}

/// Read a complete forecast out of `properties`, removing its keys.
///
/// Anything short of a complete forecast (the all-null columns of a region
/// that was never refreshed, say) is left in place as plain properties.
fn take_forecast(properties: &mut Map<String, Value>) -> Option<RegionForecast> {
    let max_flood_proba = properties.get(MAX_FLOOD_PROBA).and_then(percent)?;
    let mean_flood_proba = properties.get(MEAN_FLOOD_PROBA).and_then(Value::as_f64)?;
    let median_flood_proba = properties.get(MEDIAN_FLOOD_PROBA).and_then(Value::as_f64)?;
    let mode_flood_type = properties
        .get(MODE_FLOOD_TYPE)
        .and_then(Value::as_str)?
        .to_string();

    let mut horizons = BTreeMap::new();
    for (key, value) in properties.iter() {
        let Some(h) = horizon_key(FLOOD_PROBA_PREFIX, key) else {
            continue;
        };
        let flood_type = properties
            .get(&format!("{FLOOD_TYPE_PREFIX}{h}"))
            .and_then(Value::as_str);
        if let (Some(flood_proba), Some(flood_type)) = (percent(value), flood_type) {
            horizons.insert(
                h,
                HorizonForecast {
                    flood_proba,
                    flood_type: flood_type.to_string(),
                },
            );
        }
    }

    for key in [MAX_FLOOD_PROBA, MEAN_FLOOD_PROBA, MEDIAN_FLOOD_PROBA, MODE_FLOOD_TYPE] {
        properties.remove(key);
    }
    for h in horizons.keys() {
        properties.remove(&format!("{FLOOD_PROBA_PREFIX}{h}"));
        properties.remove(&format!("{FLOOD_TYPE_PREFIX}{h}"));
    }
    Some(RegionForecast {
        horizons,
        max_flood_proba,
        mean_flood_proba,
        median_flood_proba,
        mode_flood_type,
    })
}

fn number(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

impl RegionRecord {
    /// Build a record from a GeoJSON feature object. `index` is the
    /// feature's position, used in error messages.
    pub fn from_feature(
        mut feature: Map<String, Value>,
        index: usize,
        id_property: &str,
    ) -> Result<Self> {
        let missing = |property: &str| RegionError::MissingProperty {
            index,
            property: property.to_string(),
        };

        let mut properties = match feature.remove("properties") {
            Some(Value::Object(map)) => map,
            _ => return Err(missing("properties")),
        };
        let geometry = feature.remove("geometry").unwrap_or(Value::Null);
        feature.remove("type");

        let id = match properties.get(id_property) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(missing(id_property)),
        };

        let point = Coordinate::new(
            take_f64(&mut properties, index, POINT_LAT)?,
            take_f64(&mut properties, index, POINT_LON)?,
        );
        let sea = Coordinate::new(
            take_f64(&mut properties, index, SEA_LAT)?,
            take_f64(&mut properties, index, SEA_LON)?,
        );
        let sea_distance = properties.remove(SEA_DISTANCE).and_then(|v| v.as_f64());

        let last_update = match properties.remove(LAST_UPDATE) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => {
                Some(
                    parse_timestamp(&s).map_err(|e| RegionError::InvalidProperty {
                        id: id.clone(),
                        property: LAST_UPDATE.to_string(),
                        message: e.to_string(),
                    })?,
                )
            }
            Some(other) => {
                return Err(RegionError::InvalidProperty {
                    id,
                    property: LAST_UPDATE.to_string(),
                    message: format!("expected a timestamp string, got {other}"),
                })
            }
        };

        let forecast = take_forecast(&mut properties);

        Ok(Self {
            id,
            point,
            sea,
            sea_distance,
            last_update,
            forecast,
            properties,
            geometry,
            members: feature,
        })
    }

    /// The GeoJSON feature for this record.
    pub fn to_feature(&self) -> Value {
        let mut properties = self.properties.clone();
        properties.insert(POINT_LAT.into(), number(self.point.lat));
        properties.insert(POINT_LON.into(), number(self.point.lon));
        properties.insert(SEA_LAT.into(), number(self.sea.lat));
        properties.insert(SEA_LON.into(), number(self.sea.lon));
        properties.insert(
            SEA_DISTANCE.into(),
            self.sea_distance.map_or(Value::Null, number),
        );
        properties.insert(
            LAST_UPDATE.into(),
            self.last_update
                .map_or(Value::Null, |ts| Value::String(format_timestamp(&ts))),
        );

        if let Some(forecast) = &self.forecast {
            for (h, horizon) in &forecast.horizons {
                properties.insert(
                    format!("{FLOOD_PROBA_PREFIX}{h}"),
                    Value::from(horizon.flood_proba),
                );
                properties.insert(
                    format!("{FLOOD_TYPE_PREFIX}{h}"),
                    Value::from(horizon.flood_type.clone()),
                );
            }
            properties.insert(MAX_FLOOD_PROBA.into(), Value::from(forecast.max_flood_proba));
            properties.insert(MEAN_FLOOD_PROBA.into(), number(forecast.mean_flood_proba));
            properties.insert(MEDIAN_FLOOD_PROBA.into(), number(forecast.median_flood_proba));
            properties.insert(
                MODE_FLOOD_TYPE.into(),
                Value::from(forecast.mode_flood_type.clone()),
            );
        }

        let mut feature = self.members.clone();
        feature.insert("type".into(), Value::from("Feature"));
        feature.insert("properties".into(), Value::Object(properties));
        feature.insert("geometry".into(), self.geometry.clone());
        Value::Object(feature)
    }

    /// Whether this region still needs a refresh on `run_date`.
    pub fn is_stale(&self, run_date: NaiveDate) -> bool {
        self.last_update.map(|ts| ts.date()) != Some(run_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feature(extra: Value) -> Map<String, Value> {
        let mut properties = json!({
            "GID_2": "FRA.1.2_1",
            "NAME_2": "Ain",
            "representative_point_lat": 45.0,
            "representative_point_lon": 5.0,
            "Sea latitude": 45.0,
            "Sea longitude": 4.5,
            "Sea distance": 10.0,
            "last_update": null,
        });
        if let (Some(props), Value::Object(extra)) = (properties.as_object_mut(), extra) {
            props.extend(extra);
        }
        json!({
            "type": "Feature",
            "id": 7,
            "properties": properties,
            "geometry": {"type": "Point", "coordinates": [5.0, 45.0]},
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn test_reads_inputs_and_keeps_other_properties() {
        let record = RegionRecord::from_feature(feature(json!({})), 0, "GID_2").unwrap();
        assert_eq!(record.id, "FRA.1.2_1");
        assert_eq!(record.point, Coordinate::new(45.0, 5.0));
        assert_eq!(record.sea, Coordinate::new(45.0, 4.5));
        assert_eq!(record.sea_distance, Some(10.0));
        assert_eq!(record.last_update, None);
        assert_eq!(record.forecast, None);
        assert_eq!(record.properties.get("NAME_2"), Some(&json!("Ain")));
        assert_eq!(record.members.get("id"), Some(&json!(7)));
    }

    #[test]
    fn test_never_refreshed_columns_pass_through() {
        let record = RegionRecord::from_feature(
            feature(json!({"max_flood_proba": null, "flood_proba_0": null})),
            0,
            "GID_2",
        )
        .unwrap();
        assert_eq!(record.forecast, None);
        assert_eq!(record.properties.get("flood_proba_0"), Some(&Value::Null));
    }

    #[test]
    fn test_reads_existing_forecast() {
        let record = RegionRecord::from_feature(
            feature(json!({
                "last_update": "2025-01-10T06:00:00",
                "flood_proba_0": 12, "flood_type_0": "river",
                "max_flood_proba": 12, "mean_flood_proba": 12.0,
                "median_flood_proba": 12.0, "mode_flood_type": "river",
            })),
            0,
            "GID_2",
        )
        .unwrap();
        let forecast = record.forecast.as_ref().unwrap();
        assert_eq!(forecast.horizons[&0].flood_type, "river");
        assert_eq!(forecast.max_flood_proba, 12);
        assert!(!record.properties.contains_key("flood_proba_0"));
        assert!(!record
            .is_stale(NaiveDate::from_ymd_opt(2025, 1, 10).unwrap()));
        assert!(record.is_stale(NaiveDate::from_ymd_opt(2025, 1, 11).unwrap()));
    }

    #[test]
    fn test_missing_point_is_rejected() {
        let mut f = feature(json!({}));
        f["properties"]
            .as_object_mut()
            .unwrap()
            .remove(POINT_LON);
        let err = RegionRecord::from_feature(f, 3, "GID_2").unwrap_err();
        assert!(matches!(
            err,
            RegionError::MissingProperty { index: 3, ref property } if property == POINT_LON
        ));
    }

    #[test]
    fn test_bad_timestamp_is_rejected() {
        let err = RegionRecord::from_feature(
            feature(json!({"last_update": "last tuesday"})),
            0,
            "GID_2",
        )
        .unwrap_err();
        assert!(matches!(err, RegionError::InvalidProperty { .. }));
    }

    #[test]
    fn test_feature_round_trip() {
        let record = RegionRecord::from_feature(
            feature(json!({"last_update": "2025-01-10T06:00:00"})),
            0,
            "GID_2",
        )
        .unwrap();
        let again = match record.to_feature() {
            Value::Object(map) => RegionRecord::from_feature(map, 0, "GID_2").unwrap(),
            other => panic!("expected an object, got {other}"),
        };
        assert_eq!(again, record);
    }
}
