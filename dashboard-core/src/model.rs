use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{provider::ProviderId, units::UnitSystem};

/// Coordinates the providers are queried for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// Provider-agnostic weather snapshot.
///
/// Every numeric field is already expressed in `units`; readings the upstream
/// did not supply are `None` rather than zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub provider: ProviderId,
    pub units: UnitSystem,
    /// Observation time in the provider's local offset.
    pub observed_at: DateTime<FixedOffset>,
    pub current: CurrentConditions,
    pub sunrise: Option<DateTime<FixedOffset>>,
    pub sunset: Option<DateTime<FixedOffset>>,
    pub daily: Vec<DailyForecast>,
    pub hourly: Vec<HourlyForecast>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub temperature: f64,
    pub feels_like: Option<f64>,
    pub description: String,
    /// Day variant of an OpenWeatherMap style icon id, e.g. `"10d"`.
    pub icon: String,
    pub wind_speed: f64,
    /// Relative humidity, 0-100.
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub uv_index: Option<f64>,
    pub air_quality: Option<AirQuality>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub high: f64,
    pub low: f64,
    /// Probability of precipitation, 0-100.
    pub precipitation_probability: Option<u8>,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyForecast {
    pub time: DateTime<FixedOffset>,
    pub temperature: f64,
    /// Probability of precipitation, 0-100.
    pub precipitation_probability: Option<u8>,
    /// Precipitation amount in the record's precipitation unit.
    pub precipitation: Option<f64>,
}

/// Which published index an air quality reading is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AqiScale {
    /// OpenWeatherMap's 1-5 index.
    OpenWeatherMap,
    /// The European Environment Agency's open-ended index.
    European,
}

const OPENWEATHERMAP_LABELS: [&str; 5] = ["Good", "Fair", "Moderate", "Poor", "Very Poor"];
const EUROPEAN_LABELS: [&str; 6] = ["Good", "Fair", "Moderate", "Poor", "Very Poor", "Ext Poor"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AirQuality {
    pub index: u32,
    pub scale: AqiScale,
}

impl AirQuality {
    /// Returns `None` when `index` lies outside the scale's defined range.
    pub fn new(index: u32, scale: AqiScale) -> Option<Self> {
        match scale {
            AqiScale::OpenWeatherMap if !(1..=5).contains(&index) => None,
            _ => Some(Self { index, scale }),
        }
    }

    pub fn label(&self) -> &'static str {
        match self.scale {
            AqiScale::OpenWeatherMap => {
                OPENWEATHERMAP_LABELS[(self.index.clamp(1, 5) - 1) as usize]
            }
            AqiScale::European => EUROPEAN_LABELS[(self.index / 20).min(5) as usize],
        }
    }
}
