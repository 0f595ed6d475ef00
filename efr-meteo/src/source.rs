//! The four Open-Meteo forecast sources used for flood-risk features.

/// Sampling resolution of a requested series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Hourly,
    Daily,
}

impl Resolution {
    /// Name of the query parameter and of the response block.
    pub fn block(&self) -> &'static str {
        match self {
            Resolution::Hourly => "hourly",
            Resolution::Daily => "daily",
        }
    }

    pub fn samples_per_day(&self) -> usize {
        match self {
            Resolution::Hourly => 24,
            Resolution::Daily => 1,
        }
    }
}

/// An external forecast endpoint and the fixed variable set read from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForecastSource {
    Weather,
    SoilMoisture,
    RiverDischarge,
    Marine,
}

const WEATHER_VARIABLES: &[&str] = &[
    "temperature_2m",
    "relative_humidity_2m",
    "dew_point_2m",
    "precipitation",
    "et0_fao_evapotranspiration",
    "vapour_pressure_deficit",
    "wind_speed_10m",
    "wind_gusts_10m",
];

const SOIL_MOISTURE_VARIABLES: &[&str] = &[
    "soil_moisture_0_to_7cm",
    "soil_moisture_7_to_28cm",
    "soil_moisture_28_to_100cm",
    "soil_moisture_100_to_255cm",
];

const RIVER_DISCHARGE_VARIABLES: &[&str] = &["river_discharge"];

const MARINE_VARIABLES: &[&str] = &["wave_height", "sea_level_height_msl"];

impl ForecastSource {
    pub fn name(&self) -> &'static str {
        match self {
            ForecastSource::Weather => "weather",
            ForecastSource::SoilMoisture => "soil moisture",
            ForecastSource::RiverDischarge => "river discharge",
            ForecastSource::Marine => "marine",
        }
    }

    pub fn url(&self) -> &'static str {
        match self {
            ForecastSource::Weather | ForecastSource::SoilMoisture => {
                "https://api.open-meteo.com/v1/forecast"
            }
            ForecastSource::RiverDischarge => "https://flood-api.open-meteo.com/v1/flood",
            ForecastSource::Marine => "https://marine-api.open-meteo.com/v1/marine",
        }
    }

    pub fn resolution(&self) -> Resolution {
        match self {
            ForecastSource::RiverDischarge => Resolution::Daily,
            _ => Resolution::Hourly,
        }
    }

    /// Requested variables, in request order.
    pub fn variables(&self) -> &'static [&'static str] {
        match self {
            ForecastSource::Weather => WEATHER_VARIABLES,
            ForecastSource::SoilMoisture => SOIL_MOISTURE_VARIABLES,
            ForecastSource::RiverDischarge => RIVER_DISCHARGE_VARIABLES,
            ForecastSource::Marine => MARINE_VARIABLES,
        }
    }

    /// Forecast model pinned for this source, if any.
    pub fn model(&self) -> Option<&'static str> {
        match self {
            ForecastSource::SoilMoisture => Some("ecmwf_ifs025"),
            ForecastSource::RiverDischarge => Some("seamless_v4"),
            _ => None,
        }
    }
}
