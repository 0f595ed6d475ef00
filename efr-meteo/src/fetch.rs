//! Per-source fetchers: one request per source per batch, windowed into
//! one feature table per site.

use crate::client::{MeteoClient, Transport};
use crate::error::Result;
use crate::request::ForecastRequest;
use crate::response::LocationSeries;
use crate::source::ForecastSource;
use chrono::NaiveDate;
use efr_cache::ResponseStore;
use efr_data::{assemble, window_features, Coordinate, DataError, FeatureMatrix, FeatureTable};
use efr_utils::window::{feature_start, history_start};
use log::info;
use std::time::Instant;

/// Grid cell elevation reported by the weather API.
pub const ELEVATION_COLUMN: &str = "elevation";

/// Distance from the region to its nearest-sea point.
pub const SEA_DISTANCE_COLUMN: &str = "Sea distance";

/// Where to sample forecasts for one region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Site {
    /// Representative point of the region; all rows are keyed on it
    pub coord: Coordinate,
    /// Nearest point at sea, queried by the marine fetcher
    pub sea: Coordinate,
    pub sea_distance: Option<f64>,
}

async fn fetch_windowed<T: Transport, S: ResponseStore>(
    client: &MeteoClient<T, S>,
    source: ForecastSource,
    sites: &[Site],
    query_coords: Vec<Coordinate>,
    end_date: NaiveDate,
    mut annotate: impl FnMut(&Site, &LocationSeries, &mut FeatureTable),
) -> Result<Vec<FeatureTable>> {
    let start_date = history_start(end_date);
    let request = ForecastRequest::new(source, query_coords, start_date, end_date);
    let locations = client.send(&request).await?;

    let samples_per_day = source.resolution().samples_per_day();
    Ok(sites
        .iter()
        .zip(&locations)
        .map(|(site, location)| {
            let mut table = window_features(
                site.coord,
                &location.series,
                feature_start(end_date),
                end_date,
                samples_per_day,
            );
            annotate(site, location, &mut table);
            table
        })
        .collect())
}

fn coords(sites: &[Site]) -> Vec<Coordinate> {
    sites.iter().map(|s| s.coord).collect()
}

/// Hourly surface weather, plus the grid elevation.
pub async fn fetch_weather<T: Transport, S: ResponseStore>(
    client: &MeteoClient<T, S>,
    sites: &[Site],
    end_date: NaiveDate,
) -> Result<Vec<FeatureTable>> {
    fetch_windowed(
        client,
        ForecastSource::Weather,
        sites,
        coords(sites),
        end_date,
        |_, location, table| table.set_column(ELEVATION_COLUMN, location.elevation),
    )
    .await
}

/// Hourly soil moisture at four depths.
pub async fn fetch_soil_moisture<T: Transport, S: ResponseStore>(
    client: &MeteoClient<T, S>,
    sites: &[Site],
    end_date: NaiveDate,
) -> Result<Vec<FeatureTable>> {
    fetch_windowed(
        client,
        ForecastSource::SoilMoisture,
        sites,
        coords(sites),
        end_date,
        |_, _, _| {},
    )
    .await
}

/// Daily river discharge.
pub async fn fetch_river_discharge<T: Transport, S: ResponseStore>(
    client: &MeteoClient<T, S>,
    sites: &[Site],
    end_date: NaiveDate,
) -> Result<Vec<FeatureTable>> {
    fetch_windowed(
        client,
        ForecastSource::RiverDischarge,
        sites,
        coords(sites),
        end_date,
        |_, _, _| {},
    )
    .await
}

/// Hourly wave height and sea level at the nearest-sea point.
///
/// Rows are keyed on the region's own coordinates so they join with the
/// land-side sources, and carry the sea distance as a feature.
pub async fn fetch_marine<T: Transport, S: ResponseStore>(
    client: &MeteoClient<T, S>,
    sites: &[Site],
    end_date: NaiveDate,
) -> Result<Vec<FeatureTable>> {
    fetch_windowed(
        client,
        ForecastSource::Marine,
        sites,
        sites.iter().map(|s| s.sea).collect(),
        end_date,
        |site, _, table| table.set_column(SEA_DISTANCE_COLUMN, site.sea_distance),
    )
    .await
}

/// Per-site tables from every source, in source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceTables {
    pub weather: Vec<FeatureTable>,
    pub soil_moisture: Vec<FeatureTable>,
    pub river_discharge: Vec<FeatureTable>,
    pub marine: Vec<FeatureTable>,
}

impl SourceTables {
    /// Join every source into one feature matrix.
    pub fn into_matrix(self) -> std::result::Result<FeatureMatrix, DataError> {
        assemble(
            self.weather,
            self.soil_moisture,
            self.river_discharge,
            self.marine,
        )
    }
}

fn log_fetched(source: ForecastSource, sites: usize, start: Instant) {
    info!(
        "Fetched {} data for {} sites in {:.2?}",
        source.name(),
        sites,
        start.elapsed()
    );
}

/// Run the four fetchers one after another for a batch of sites.
pub async fn fetch_all<T: Transport, S: ResponseStore>(
    client: &MeteoClient<T, S>,
    sites: &[Site],
    end_date: NaiveDate,
) -> Result<SourceTables> {
    let start = Instant::now();
    let weather = fetch_weather(client, sites, end_date).await?;
    log_fetched(ForecastSource::Weather, sites.len(), start);

    let start = Instant::now();
    let soil_moisture = fetch_soil_moisture(client, sites, end_date).await?;
    log_fetched(ForecastSource::SoilMoisture, sites.len(), start);

    let start = Instant::now();
    let river_discharge = fetch_river_discharge(client, sites, end_date).await?;
    log_fetched(ForecastSource::RiverDischarge, sites.len(), start);

    let start = Instant::now();
    let marine = fetch_marine(client, sites, end_date).await?;
    log_fetched(ForecastSource::Marine, sites.len(), start);

    Ok(SourceTables {
        weather,
        soil_moisture,
        river_discharge,
        marine,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{CachePolicy, RetryPolicy};
    use async_trait::async_trait;
    use efr_cache::MemoryStore;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    const DAYS: usize = 38;

    /// Answers every request with constant series for each queried location.
    #[derive(Default)]
    struct Constant {
        seen: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Transport for Constant {
        async fn post_form(&self, url: &str, params: &[(String, String)]) -> Result<String> {
            let param = |name: &str| {
                params
                    .iter()
                    .find(|(k, _)| k == name)
                    .map(|(_, v)| v.clone())
                    .unwrap()
            };
            let lats = param("latitude");
            let lons = param("longitude");
            self.seen.lock().unwrap().push((url.to_string(), lats.clone()));

            let (block, per_day) = if params.iter().any(|(k, _)| k == "daily") {
                ("daily", 1)
            } else {
                ("hourly", 24)
            };
            let variables = param(block);
            let locations: Vec<Value> = lats
                .split(',')
                .zip(lons.split(','))
                .map(|(lat, lon)| {
                    let mut series = serde_json::Map::new();
                    for (i, variable) in variables.split(',').enumerate() {
                        series.insert(variable.to_string(), json!(vec![i as f64; DAYS * per_day]));
                    }
                    json!({
                        "latitude": lat.parse::<f64>().unwrap(),
                        "longitude": lon.parse::<f64>().unwrap(),
                        "elevation": 350.0,
                        block: series,
                    })
                })
                .collect();
            Ok(Value::Array(locations).to_string())
        }
    }

    fn sites() -> Vec<Site> {
        vec![
            Site {
                coord: Coordinate::new(45.0, 5.0),
                sea: Coordinate::new(45.0, 4.5),
                sea_distance: Some(10.0),
            },
            Site {
                coord: Coordinate::new(48.0, 2.0),
                sea: Coordinate::new(49.5, 0.5),
                sea_distance: Some(150.0),
            },
        ]
    }

    fn client(transport: &Constant) -> MeteoClient<&Constant, MemoryStore> {
        MeteoClient::new(
            transport,
            MemoryStore::new(),
            RetryPolicy::default(),
            CachePolicy::disabled(),
        )
    }

    fn end_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 17).unwrap()
    }

    #[tokio::test]
    async fn test_weather_tables_cover_every_horizon() {
        let transport = Constant::default();
        let tables = fetch_weather(&client(&transport), &sites(), end_date())
            .await
            .unwrap();

        assert_eq!(tables.len(), 2);
        let rows = &tables[0].rows;
        assert_eq!(rows.len(), 8);
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2025, 1, 10).unwrap());
        assert_eq!(rows[7].date_id, 7);
        assert_eq!(rows[0].get(ELEVATION_COLUMN), Some(Some(350.0)));
        assert_eq!(rows[3].get("mean_relative_humidity_2m_30"), Some(Some(1.0)));
        assert_eq!(tables[1].rows[0].coord, Coordinate::new(48.0, 2.0));
    }

    #[tokio::test]
    async fn test_marine_queries_sea_points_but_keys_on_region() {
        let transport = Constant::default();
        let tables = fetch_marine(&client(&transport), &sites(), end_date())
            .await
            .unwrap();

        let seen = transport.seen.lock().unwrap();
        assert!(seen[0].0.contains("marine-api"));
        assert_eq!(seen[0].1, "45,49.5");

        let row = &tables[0].rows[0];
        assert_eq!(row.coord, Coordinate::new(45.0, 5.0));
        assert_eq!(row.get(SEA_DISTANCE_COLUMN), Some(Some(10.0)));
        assert_eq!(tables[1].rows[0].get(SEA_DISTANCE_COLUMN), Some(Some(150.0)));
    }

    #[tokio::test]
    async fn test_fetch_all_assembles_one_row_per_site_and_day() {
        let transport = Constant::default();
        let tables = fetch_all(&client(&transport), &sites(), end_date())
            .await
            .unwrap();
        assert_eq!(transport.seen.lock().unwrap().len(), 4);

        let matrix = tables.into_matrix().unwrap();
        assert_eq!(matrix.len(), 16);
        let row = &matrix.rows()[0];
        assert_eq!(row.get("max_river_discharge_1"), Some(Some(0.0)));
        assert_eq!(row.get("mean_sea_level_height_msl_5"), Some(Some(1.0)));
        assert_eq!(row.get("median_soil_moisture_100_to_255cm_30"), Some(Some(3.0)));
        assert_eq!(row.get("month"), Some(Some(1.0)));
    }
}
