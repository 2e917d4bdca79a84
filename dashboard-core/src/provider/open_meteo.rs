//! Open-Meteo adapter. Needs no registration, only coordinates.
//!
//! Open-Meteo reports local wall-clock times (`timezone=auto`) together with
//! `utc_offset_seconds`, and declares the units of every series in the
//! `*_units` blocks. Those declarations win over what was requested.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Timelike};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use super::{Converter, ProviderId, RawPayload, WeatherProvider, get_json, percent};
use crate::{
    error::{Error, Result},
    model::{
        AirQuality, AqiScale, CurrentConditions, DailyForecast, HourlyForecast, Location,
        WeatherRecord,
    },
    units::{PrecipitationUnit, PressureUnit, SpeedUnit, TemperatureUnit, UnitSystem},
};

const PROVIDER: &str = "open-meteo";
const DEFAULT_BASE_URL: &str = "https://api.open-meteo.com";
const DEFAULT_AIR_QUALITY_URL: &str = "https://air-quality-api.open-meteo.com";

#[derive(Debug, Clone)]
pub struct OpenMeteoProvider {
    http: Client,
    base_url: String,
    air_quality_url: String,
    forecast_days: u8,
}

impl OpenMeteoProvider {
    pub fn new(forecast_days: u8) -> Self {
        Self {
            http: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            air_quality_url: DEFAULT_AIR_QUALITY_URL.to_string(),
            forecast_days: forecast_days.clamp(1, 16),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_air_quality_url(mut self, url: impl Into<String>) -> Self {
        self.air_quality_url = url.into();
        self
    }

    async fn fetch_forecast(
        &self,
        location: Location,
        units: UnitSystem,
    ) -> Result<serde_json::Value> {
        let url = format!("{}/v1/forecast", self.base_url.trim_end_matches('/'));
        let (temperature, speed, precipitation) = request_units(units);

        let query = [
            ("latitude", location.latitude.to_string()),
            ("longitude", location.longitude.to_string()),
            (
                "current",
                "temperature_2m,apparent_temperature,relative_humidity_2m,weather_code,\
                 wind_speed_10m"
                    .to_string(),
            ),
            (
                "hourly",
                "temperature_2m,precipitation,precipitation_probability".to_string(),
            ),
            (
                "daily",
                "weather_code,temperature_2m_max,temperature_2m_min,sunrise,sunset,\
                 precipitation_probability_max"
                    .to_string(),
            ),
            ("timezone", "auto".to_string()),
            ("forecast_days", self.forecast_days.to_string()),
            ("temperature_unit", temperature.to_string()),
            ("wind_speed_unit", speed.to_string()),
            ("precipitation_unit", precipitation.to_string()),
        ];

        get_json(&self.http, PROVIDER, &url, &query).await
    }

    async fn fetch_air_quality(&self, location: Location) -> Result<serde_json::Value> {
        let url = format!("{}/v1/air-quality", self.air_quality_url.trim_end_matches('/'));
        let query = [
            ("latitude", location.latitude.to_string()),
            ("longitude", location.longitude.to_string()),
            ("hourly", "european_aqi,uv_index".to_string()),
            ("timezone", "auto".to_string()),
        ];

        get_json(&self.http, PROVIDER, &url, &query).await
    }
}

/// Query parameter values for a unit system. Open-Meteo has no Kelvin, so
/// the standard system is requested in Celsius and converted afterwards.
fn request_units(units: UnitSystem) -> (&'static str, &'static str, &'static str) {
    match units {
        UnitSystem::Imperial => ("fahrenheit", "mph", "inch"),
        UnitSystem::Metric | UnitSystem::Standard => ("celsius", "ms", "mm"),
    }
}

#[async_trait]
impl WeatherProvider for OpenMeteoProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenMeteo
    }

    #[instrument(skip(self), fields(lat = %location.latitude, lon = %location.longitude))]
    async fn fetch(&self, location: Location, units: UnitSystem) -> Result<RawPayload> {
        let weather = self.fetch_forecast(location, units).await?;

        let air_quality = match self.fetch_air_quality(location).await {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(error = %err, "Open-Meteo air quality unavailable");
                None
            }
        };

        Ok(RawPayload {
            weather,
            air_quality,
            requested_units: units,
        })
    }

    fn normalize(&self, raw: &RawPayload, target: UnitSystem) -> Result<WeatherRecord> {
        normalize(raw, target)
    }
}

#[derive(Debug, Deserialize)]
struct OmResponse {
    #[serde(default)]
    utc_offset_seconds: i32,
    current: Option<OmCurrent>,
    current_units: Option<OmUnits>,
    daily: Option<OmDaily>,
    daily_units: Option<OmUnits>,
    hourly: Option<OmHourly>,
    hourly_units: Option<OmUnits>,
}

#[derive(Debug, Default, Deserialize)]
struct OmUnits {
    temperature_2m: Option<String>,
    temperature_2m_max: Option<String>,
    wind_speed_10m: Option<String>,
    precipitation: Option<String>,
}

impl OmUnits {
    fn temperature(&self) -> Option<&str> {
        self.temperature_2m
            .as_deref()
            .or(self.temperature_2m_max.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct OmCurrent {
    time: String,
    temperature_2m: Option<f64>,
    apparent_temperature: Option<f64>,
    relative_humidity_2m: Option<f64>,
    weather_code: Option<u8>,
    wind_speed_10m: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct OmDaily {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    weather_code: Vec<Option<u8>>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    sunrise: Vec<Option<String>>,
    #[serde(default)]
    sunset: Vec<Option<String>>,
    #[serde(default)]
    precipitation_probability_max: Vec<Option<f64>>,
}

#[derive(Debug, Default, Deserialize)]
struct OmHourly {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_probability: Vec<Option<f64>>,
    #[serde(default)]
    precipitation: Vec<Option<f64>>,
}

#[derive(Debug, Default, Deserialize)]
struct OmAirQuality {
    hourly: Option<OmAirQualityHourly>,
}

#[derive(Debug, Default, Deserialize)]
struct OmAirQualityHourly {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    european_aqi: Vec<Option<f64>>,
    #[serde(default)]
    uv_index: Vec<Option<f64>>,
}

fn missing(field: &'static str) -> Error {
    Error::UpstreamFieldMissing {
        provider: PROVIDER,
        field,
    }
}

/// Source units for the whole payload: the declared ones where present,
/// otherwise what `request_units` asked for.
fn source_units(
    response: &OmResponse,
    requested: UnitSystem,
) -> Result<(TemperatureUnit, SpeedUnit, PressureUnit, PrecipitationUnit)> {
    let mut temperature = match requested {
        UnitSystem::Imperial => TemperatureUnit::Fahrenheit,
        UnitSystem::Metric | UnitSystem::Standard => TemperatureUnit::Celsius,
    };
    let mut speed = requested.speed();
    let mut precipitation = requested.precipitation();

    let declared = [&response.current_units, &response.daily_units, &response.hourly_units];
    for units in declared.into_iter().flatten() {
        if let Some(symbol) = units.temperature() {
            temperature = TemperatureUnit::try_from(symbol)?;
        }
        if let Some(symbol) = units.wind_speed_10m.as_deref() {
            speed = SpeedUnit::try_from(symbol)?;
        }
        if let Some(symbol) = units.precipitation.as_deref() {
            precipitation = PrecipitationUnit::try_from(symbol)?;
        }
    }

    Ok((temperature, speed, PressureUnit::Hectopascal, precipitation))
}

fn parse_local(value: &str, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .ok()?;
    offset.from_local_datetime(&naive).single()
}

fn truncate_to_hour(dt: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
    dt.with_minute(0)?.with_second(0)
}

pub(crate) fn normalize(raw: &RawPayload, target: UnitSystem) -> Result<WeatherRecord> {
    let response: OmResponse = serde_json::from_value(raw.weather.clone())?;
    let convert = Converter::new(source_units(&response, raw.requested_units)?, target);

    let offset = FixedOffset::east_opt(response.utc_offset_seconds)
        .ok_or_else(|| missing("utc_offset_seconds"))?;

    let current = response.current.as_ref().ok_or_else(|| missing("current"))?;
    let observed_at = parse_local(&current.time, offset).ok_or_else(|| missing("current.time"))?;
    let temperature = current
        .temperature_2m
        .ok_or_else(|| missing("current.temperature_2m"))?;
    let wind_speed = current
        .wind_speed_10m
        .ok_or_else(|| missing("current.wind_speed_10m"))?;
    let code = current
        .weather_code
        .ok_or_else(|| missing("current.weather_code"))?;

    let this_hour = truncate_to_hour(observed_at);
    let (uv_index, air_quality) = match &raw.air_quality {
        Some(value) => air_quality_at(value, offset, this_hour),
        None => (None, None),
    };

    let daily_data = response.daily.unwrap_or_default();
    let sunrise = daily_data
        .sunrise
        .first()
        .and_then(|s| s.as_deref())
        .and_then(|s| parse_local(s, offset));
    let sunset = daily_data
        .sunset
        .first()
        .and_then(|s| s.as_deref())
        .and_then(|s| parse_local(s, offset));

    let mut daily = Vec::with_capacity(daily_data.time.len());
    for (i, day) in daily_data.time.iter().enumerate() {
        let Ok(date) = NaiveDate::parse_from_str(day, "%Y-%m-%d") else {
            debug!(day, "Skipping unparseable Open-Meteo day");
            continue;
        };
        let high = daily_data.temperature_2m_max.get(i).copied().flatten();
        let low = daily_data.temperature_2m_min.get(i).copied().flatten();
        let (Some(high), Some(low)) = (high, low) else {
            debug!(%date, "Skipping Open-Meteo day without temperatures");
            continue;
        };
        let Some(code) = daily_data.weather_code.get(i).copied().flatten() else {
            debug!(%date, "Skipping Open-Meteo day without a weather code");
            continue;
        };

        daily.push(DailyForecast {
            date,
            high: convert.temperature(high),
            low: convert.temperature(low),
            precipitation_probability: daily_data
                .precipitation_probability_max
                .get(i)
                .copied()
                .flatten()
                .map(percent),
            icon: wmo_icon(code).to_string(),
        });
    }

    let hourly_data = response.hourly.unwrap_or_default();
    let mut hourly = Vec::new();
    for (i, time) in hourly_data.time.iter().enumerate() {
        let Some(time) = parse_local(time, offset) else {
            continue;
        };
        if this_hour.is_some_and(|start| time < start) {
            continue;
        }
        let Some(temperature) = hourly_data.temperature_2m.get(i).copied().flatten() else {
            continue;
        };

        hourly.push(HourlyForecast {
            time,
            temperature: convert.temperature(temperature),
            precipitation_probability: hourly_data
                .precipitation_probability
                .get(i)
                .copied()
                .flatten()
                .map(percent),
            precipitation: hourly_data
                .precipitation
                .get(i)
                .copied()
                .flatten()
                .map(|p| convert.precipitation(p)),
        });
    }

    Ok(WeatherRecord {
        provider: ProviderId::OpenMeteo,
        units: target,
        observed_at,
        current: CurrentConditions {
            temperature: convert.temperature(temperature),
            feels_like: current.apparent_temperature.map(|t| convert.temperature(t)),
            description: wmo_description(code).to_string(),
            icon: wmo_icon(code).to_string(),
            wind_speed: convert.speed(wind_speed),
            humidity: current.relative_humidity_2m,
            pressure: None,
            uv_index,
            air_quality,
        },
        sunrise,
        sunset,
        daily,
        hourly,
    })
}

/// UV index and European AQI for the hour containing the observation.
fn air_quality_at(
    value: &serde_json::Value,
    offset: FixedOffset,
    hour: Option<DateTime<FixedOffset>>,
) -> (Option<f64>, Option<AirQuality>) {
    let parsed: OmAirQuality = match serde_json::from_value(value.clone()) {
        Ok(parsed) => parsed,
        Err(err) => {
            debug!(error = %err, "Ignoring malformed Open-Meteo air quality payload");
            return (None, None);
        }
    };
    let (Some(series), Some(hour)) = (parsed.hourly, hour) else {
        return (None, None);
    };

    let Some(i) = series
        .time
        .iter()
        .position(|t| parse_local(t, offset) == Some(hour))
    else {
        debug!(%hour, "No Open-Meteo air quality sample for the current hour");
        return (None, None);
    };

    let uv = series.uv_index.get(i).copied().flatten();
    let aqi = series
        .european_aqi
        .get(i)
        .copied()
        .flatten()
        .filter(|v| *v >= 0.0)
        .and_then(|v| AirQuality::new(v.round() as u32, AqiScale::European));

    (uv, aqi)
}

/// OpenWeatherMap style day icon for a WMO weather code.
pub fn wmo_icon(code: u8) -> &'static str {
    match code {
        0 => "01d",
        1 => "02d",
        2 => "03d",
        3 => "04d",
        45 | 48 => "50d",
        51 | 53 | 55 | 56 | 57 => "09d",
        61 | 63 | 65 | 66 | 67 => "10d",
        71 | 73 | 75 | 77 => "13d",
        80..=82 => "09d",
        85 | 86 => "13d",
        95 | 96 | 99 => "11d",
        _ => "01d",
    }
}

pub fn wmo_description(code: u8) -> &'static str {
    match code {
        0 => "Clear Sky",
        1 => "Mainly Clear",
        2 => "Partly Cloudy",
        3 => "Overcast",
        45 => "Foggy",
        48 => "Fog",
        51 => "Light Drizzle",
        53 => "Drizzle",
        55 => "Heavy Drizzle",
        56 => "Freezing Drizzle",
        57 => "Heavy Freezing Drizzle",
        61 => "Light Rain",
        63 => "Rain",
        65 => "Heavy Rain",
        66 => "Freezing Rain",
        67 => "Heavy Freezing Rain",
        71 => "Light Snow",
        73 => "Snow",
        75 => "Heavy Snow",
        77 => "Snow Grains",
        80 => "Light Showers",
        81 => "Showers",
        82 => "Heavy Showers",
        85 => "Light Snow Showers",
        86 => "Snow Showers",
        95 => "Thunderstorm",
        96 => "Thunderstorm with Hail",
        99 => "Heavy Thunderstorm",
        _ => "Unknown",
    }
}
