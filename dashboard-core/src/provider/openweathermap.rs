use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::{Converter, ProviderId, RawPayload, WeatherProvider, get_json, percent};
use crate::{
    error::{Error, Result},
    model::{
        AirQuality, AqiScale, CurrentConditions, DailyForecast, HourlyForecast, Location,
        WeatherRecord,
    },
    units::{PrecipitationUnit, PressureUnit, UnitSystem},
};

const PROVIDER: &str = "openweathermap";
const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

/// OpenWeatherMap One Call 3.0 adapter. Requires an API key.
#[derive(Debug, Clone)]
pub struct OpenWeatherMapProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenWeatherMapProvider {
    /// Fails with [`Error::Authentication`] when no key is available.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        let api_key = api_key.filter(|k| !k.trim().is_empty()).ok_or_else(|| {
            Error::Authentication {
                provider: PROVIDER.to_string(),
                reason: format!(
                    "No API key configured.\n\
                     Hint: run `dashboard configure {PROVIDER}` or set {}.",
                    crate::config::OPEN_WEATHER_MAP_KEY_ENV
                ),
            }
        })?;

        Ok(Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            http: Client::new(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    async fn fetch_one_call(&self, location: Location, units: UnitSystem) -> Result<Value> {
        let query = [
            ("lat", location.latitude.to_string()),
            ("lon", location.longitude.to_string()),
            ("units", units.as_str().to_string()),
            ("exclude", "minutely".to_string()),
            ("appid", self.api_key.clone()),
        ];

        get_json(&self.http, PROVIDER, &self.url("/data/3.0/onecall"), &query).await
    }

    /// "Name, State" for the nearest place, or "Name, Country" without a state.
    #[instrument(skip(self), fields(lat = %location.latitude, lon = %location.longitude))]
    pub async fn reverse_geocode(&self, location: Location) -> Result<String> {
        let query = [
            ("lat", location.latitude.to_string()),
            ("lon", location.longitude.to_string()),
            ("limit", "1".to_string()),
            ("appid", self.api_key.clone()),
        ];

        let value = get_json(&self.http, PROVIDER, &self.url("/geo/1.0/reverse"), &query).await?;
        place_name(&value)
    }

    async fn fetch_air_pollution(&self, location: Location) -> Result<Value> {
        let query = [
            ("lat", location.latitude.to_string()),
            ("lon", location.longitude.to_string()),
            ("appid", self.api_key.clone()),
        ];

        get_json(&self.http, PROVIDER, &self.url("/data/2.5/air_pollution"), &query).await
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherMapProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenWeatherMap
    }

    #[instrument(skip(self), fields(lat = %location.latitude, lon = %location.longitude))]
    async fn fetch(&self, location: Location, units: UnitSystem) -> Result<RawPayload> {
        let weather = self.fetch_one_call(location, units).await?;
        reject_unauthorized(&weather)?;

        let air_quality = match self.fetch_air_pollution(location).await {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(error = %err, "OpenWeatherMap air quality unavailable");
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

/// OpenWeatherMap sometimes reports an invalid key in the body with `cod: 401`.
fn reject_unauthorized(payload: &Value) -> Result<()> {
    let cod = match payload.get("cod") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    };

    if matches!(cod, Some(401) | Some(403)) {
        let message = payload
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("invalid API key");
        return Err(Error::Authentication {
            provider: PROVIDER.to_string(),
            reason: message.to_string(),
        });
    }

    Ok(())
}

#[derive(Debug, Deserialize)]
struct OwOneCall {
    #[serde(default)]
    timezone_offset: i32,
    current: Option<OwCurrent>,
    #[serde(default)]
    daily: Vec<OwDaily>,
    #[serde(default)]
    hourly: Vec<OwHourly>,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    #[serde(default)]
    description: String,
    icon: String,
}

#[derive(Debug, Deserialize)]
struct OwCurrent {
    dt: i64,
    temp: Option<f64>,
    feels_like: Option<f64>,
    humidity: Option<f64>,
    pressure: Option<f64>,
    uvi: Option<f64>,
    wind_speed: Option<f64>,
    sunrise: Option<i64>,
    sunset: Option<i64>,
    #[serde(default)]
    weather: Vec<OwWeather>,
}

#[derive(Debug, Deserialize)]
struct OwDailyTemp {
    min: f64,
    max: f64,
}

#[derive(Debug, Deserialize)]
struct OwDaily {
    dt: i64,
    temp: OwDailyTemp,
    pop: Option<f64>,
    #[serde(default)]
    weather: Vec<OwWeather>,
}

#[derive(Debug, Deserialize)]
struct OwRain {
    #[serde(rename = "1h")]
    one_hour: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwHourly {
    dt: i64,
    temp: Option<f64>,
    pop: Option<f64>,
    rain: Option<OwRain>,
}

#[derive(Debug, Deserialize)]
struct OwAirPollution {
    #[serde(default)]
    list: Vec<OwAirPollutionEntry>,
}

#[derive(Debug, Deserialize)]
struct OwAirPollutionEntry {
    main: OwAirPollutionMain,
}

#[derive(Debug, Deserialize)]
struct OwAirPollutionMain {
    aqi: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OwPlace {
    name: String,
    state: Option<String>,
    country: Option<String>,
}

fn place_name(value: &Value) -> Result<String> {
    let places: Vec<OwPlace> = serde_json::from_value(value.clone())?;
    let place = places
        .into_iter()
        .next()
        .ok_or_else(|| missing("geocoding[0]"))?;

    Ok(match place.state.or(place.country) {
        Some(region) => format!("{}, {region}", place.name),
        None => place.name,
    })
}

fn missing(field: &'static str) -> Error {
    Error::UpstreamFieldMissing {
        provider: PROVIDER,
        field,
    }
}

fn local_time(ts: i64, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    DateTime::from_timestamp(ts, 0).map(|utc| utc.with_timezone(&offset))
}

/// Night icons ("10n") are shown with their day artwork ("10d").
fn day_icon(icon: &str) -> String {
    icon.replace('n', "d")
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

pub(crate) fn normalize(raw: &RawPayload, target: UnitSystem) -> Result<WeatherRecord> {
    reject_unauthorized(&raw.weather)?;

    let parsed: OwOneCall = serde_json::from_value(raw.weather.clone())?;
    let source = raw.requested_units;
    // pressure is always hPa and rain always mm, whatever `units` was requested
    let convert = Converter::new(
        (
            source.temperature(),
            source.speed(),
            PressureUnit::Hectopascal,
            PrecipitationUnit::Millimeter,
        ),
        target,
    );

    let offset = FixedOffset::east_opt(parsed.timezone_offset)
        .ok_or_else(|| missing("timezone_offset"))?;

    let current = parsed.current.as_ref().ok_or_else(|| missing("current"))?;
    let observed_at = local_time(current.dt, offset).ok_or_else(|| missing("current.dt"))?;
    let temperature = current.temp.ok_or_else(|| missing("current.temp"))?;
    let wind_speed = current.wind_speed.ok_or_else(|| missing("current.wind_speed"))?;
    let weather = current
        .weather
        .first()
        .ok_or_else(|| missing("current.weather"))?;

    let air_quality = raw.air_quality.as_ref().and_then(|value| {
        let parsed: OwAirPollution = match serde_json::from_value(value.clone()) {
            Ok(parsed) => parsed,
            Err(err) => {
                debug!(error = %err, "Ignoring malformed OpenWeatherMap air pollution payload");
                return None;
            }
        };
        parsed
            .list
            .first()
            .and_then(|entry| entry.main.aqi)
            .and_then(|index| AirQuality::new(index, AqiScale::OpenWeatherMap))
    });

    let daily = parsed
        .daily
        .iter()
        .filter_map(|day| {
            let date = local_time(day.dt, offset)?.date_naive();
            let Some(weather) = day.weather.first() else {
                debug!(%date, "Skipping OpenWeatherMap day without a condition");
                return None;
            };
            Some(DailyForecast {
                date,
                high: convert.temperature(day.temp.max),
                low: convert.temperature(day.temp.min),
                precipitation_probability: day.pop.map(|p| percent(p * 100.0)),
                icon: day_icon(&weather.icon),
            })
        })
        .collect();

    let hourly = parsed
        .hourly
        .iter()
        .filter_map(|hour| {
            Some(HourlyForecast {
                time: local_time(hour.dt, offset)?,
                temperature: convert.temperature(hour.temp?),
                precipitation_probability: hour.pop.map(|p| percent(p * 100.0)),
                // the rain block is omitted entirely for dry hours
                precipitation: Some(convert.precipitation(
                    hour.rain.as_ref().and_then(|r| r.one_hour).unwrap_or(0.0),
                )),
            })
        })
        .collect();

    Ok(WeatherRecord {
        provider: ProviderId::OpenWeatherMap,
        units: target,
        observed_at,
        current: CurrentConditions {
            temperature: convert.temperature(temperature),
            feels_like: current.feels_like.map(|t| convert.temperature(t)),
            description: title_case(&weather.description),
            icon: day_icon(&weather.icon),
            wind_speed: convert.speed(wind_speed),
            humidity: current.humidity,
            pressure: current.pressure.map(|p| convert.pressure(p)),
            uv_index: current.uvi,
            air_quality,
        },
        sunrise: current.sunrise.and_then(|ts| local_time(ts, offset)),
        sunset: current.sunset.and_then(|ts| local_time(ts, offset)),
        daily,
        hourly,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn sample_one_call() -> Value {
        json!({
            "lat": 40.71,
            "lon": -74.01,
            "timezone": "America/New_York",
            "timezone_offset": -18000,
            "current": {
                // 2024-01-15T17:00:00Z, noon in New York
                "dt": 1705338000,
                "sunrise": 1705321740,
                "sunset": 1705356180,
                "temp": 3.2,
                "feels_like": -0.6,
                "pressure": 1016,
                "humidity": 64,
                "uvi": 1.37,
                "wind_speed": 4.6,
                "weather": [{
                    "id": 500, "main": "Rain", "description": "light rain", "icon": "10n"
                }]
            },
            "hourly": [
                { "dt": 1705338000, "temp": 3.2, "pop": 0.35, "rain": { "1h": 0.5 } },
                { "dt": 1705341600, "temp": 3.9, "pop": 0.1 }
            ],
            "daily": [
                { "dt": 1705338000, "temp": { "min": -1.0, "max": 5.5 }, "pop": 0.8,
                  "weather": [{ "description": "rain", "icon": "10d" }] },
                { "dt": 1705424400, "temp": { "min": -3.0, "max": 2.0 }, "pop": 0.0,
                  "weather": [{ "description": "clear sky", "icon": "01n" }] }
            ]
        })
    }

    pub(crate) fn sample_air_pollution() -> Value {
        json!({ "list": [{ "main": { "aqi": 2 }, "dt": 1705338000 }] })
    }

    fn payload(air_quality: Option<Value>) -> RawPayload {
        RawPayload {
            weather: sample_one_call(),
            air_quality,
            requested_units: UnitSystem::Metric,
        }
    }

    #[test]
    fn normalizes_current_conditions() {
        let record = normalize(&payload(Some(sample_air_pollution())), UnitSystem::Metric).unwrap();

        assert_eq!(record.provider, ProviderId::OpenWeatherMap);
        assert_eq!(record.current.description, "Light Rain");
        assert_eq!(record.current.icon, "10d");
        assert_eq!(record.current.humidity, Some(64.0));
        assert_eq!(record.current.uv_index, Some(1.37));
        assert_eq!(record.current.pressure, Some(1016.0));
        assert_eq!(record.observed_at.format("%H:%M").to_string(), "12:00");
        assert_eq!(record.sunrise.unwrap().format("%H:%M").to_string(), "07:29");

        let aqi = record.current.air_quality.unwrap();
        assert_eq!((aqi.index, aqi.label()), (2, "Fair"));
    }

    #[test]
    fn missing_aqi_is_unavailable() {
        let record = normalize(&payload(None), UnitSystem::Metric).unwrap();
        assert_eq!(record.current.air_quality, None);

        let empty = normalize(&payload(Some(json!({ "list": [] }))), UnitSystem::Metric).unwrap();
        assert_eq!(empty.current.air_quality, None);
    }

    #[test]
    fn forecast_entries_are_converted() {
        let record = normalize(&payload(None), UnitSystem::Imperial).unwrap();

        assert_eq!(record.daily.len(), 2);
        assert!((record.daily[0].high - 41.9).abs() < 1e-9);
        assert_eq!(record.daily[0].precipitation_probability, Some(80));
        assert_eq!(record.daily[1].icon, "01d");

        assert_eq!(record.hourly[0].precipitation_probability, Some(35));
        let rain = record.hourly[0].precipitation.unwrap();
        assert!((rain - 0.5 / 25.4).abs() < 1e-9);
        assert_eq!(record.hourly[1].precipitation, Some(0.0));

        let inhg = record.current.pressure.unwrap();
        assert!((inhg - 30.0).abs() < 0.01);
    }

    #[test]
    fn place_name_prefers_state_over_country() {
        let with_state = json!([{ "name": "Brooklyn", "state": "New York", "country": "US" }]);
        assert_eq!(place_name(&with_state).unwrap(), "Brooklyn, New York");

        let without_state = json!([{ "name": "Berlin", "country": "DE" }]);
        assert_eq!(place_name(&without_state).unwrap(), "Berlin, DE");

        let err = place_name(&json!([])).unwrap_err();
        assert!(matches!(err, Error::UpstreamFieldMissing { .. }));
    }

    #[test]
    fn days_without_a_condition_are_skipped() {
        let mut weather = sample_one_call();
        weather["daily"][1]["weather"] = json!([]);
        let raw = RawPayload {
            weather,
            air_quality: None,
            requested_units: UnitSystem::Metric,
        };

        let record = normalize(&raw, UnitSystem::Metric).unwrap();

        assert_eq!(record.daily.len(), 1);
        assert_eq!(record.daily[0].icon, "10d");
    }

    #[test]
    fn imperial_payload_converts_to_metric() {
        let raw = RawPayload {
            weather: json!({
                "timezone_offset": 0,
                "current": {
                    "dt": 1705338000,
                    "temp": 50.0,
                    "wind_speed": 10.0,
                    "weather": [{ "description": "clear sky", "icon": "01d" }]
                }
            }),
            air_quality: None,
            requested_units: UnitSystem::Imperial,
        };

        let record = normalize(&raw, UnitSystem::Metric).unwrap();
        assert!((record.current.temperature - 10.0).abs() < 1e-9);
        assert!((record.current.wind_speed - 4.4704).abs() < 1e-9);
        assert_eq!(record.current.feels_like, None);
        assert_eq!(record.current.humidity, None);
        assert!(record.daily.is_empty());
    }

    #[test]
    fn body_level_401_is_authentication_error() {
        let raw = RawPayload {
            weather: json!({ "cod": 401, "message": "Invalid API key." }),
            air_quality: None,
            requested_units: UnitSystem::Metric,
        };

        let err = normalize(&raw, UnitSystem::Metric).unwrap_err();
        assert!(err.is_authentication());
        assert!(err.to_string().contains("Invalid API key."));
    }

    #[test]
    fn missing_key_is_authentication_error() {
        let err = OpenWeatherMapProvider::new(None).unwrap_err();
        assert!(err.is_authentication());
        assert!(OpenWeatherMapProvider::new(Some(" ".into())).is_err());
        assert!(OpenWeatherMapProvider::new(Some("KEY".into())).is_ok());
    }

    #[test]
    fn missing_wind_is_reported() {
        let mut weather = sample_one_call();
        weather["current"].as_object_mut().unwrap().remove("wind_speed");
        let raw = RawPayload {
            weather,
            air_quality: None,
            requested_units: UnitSystem::Metric,
        };

        assert!(matches!(
            normalize(&raw, UnitSystem::Metric),
            Err(Error::UpstreamFieldMissing { field: "current.wind_speed", .. })
        ));
    }

    #[test]
    fn normalize_is_idempotent() {
        let raw = payload(Some(sample_air_pollution()));
        assert_eq!(
            normalize(&raw, UnitSystem::Standard).unwrap(),
            normalize(&raw, UnitSystem::Standard).unwrap()
        );
    }

    #[test]
    fn title_case_words() {
        assert_eq!(title_case("broken  clouds"), "Broken Clouds");
        assert_eq!(title_case(""), "");
    }
}
