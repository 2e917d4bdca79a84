use crate::{
    Config,
    error::{Error, Result},
    model::{Location, WeatherRecord},
    provider::{open_meteo::OpenMeteoProvider, openweathermap::OpenWeatherMapProvider},
    units::{
        PrecipitationUnit, PressureUnit, SpeedUnit, TemperatureUnit, UnitSystem,
        convert_precipitation, convert_pressure, convert_speed, convert_temperature,
    },
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{convert::TryFrom, fmt::Debug};
use tracing::{debug, warn};

pub mod open_meteo;
pub mod openweathermap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ProviderId {
    #[default]
    #[serde(rename = "open-meteo")]
    OpenMeteo,
    #[serde(rename = "openweathermap")]
    OpenWeatherMap,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenMeteo => "open-meteo",
            ProviderId::OpenWeatherMap => "openweathermap",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::OpenMeteo, ProviderId::OpenWeatherMap]
    }

    pub fn requires_api_key(&self) -> bool {
        matches!(self, ProviderId::OpenWeatherMap)
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "open-meteo" | "openmeteo" => Ok(ProviderId::OpenMeteo),
            "openweathermap" | "openweather" => Ok(ProviderId::OpenWeatherMap),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: open-meteo, openweathermap."
            )),
        }
    }
}

/// Upstream documents exactly as fetched, before any normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPayload {
    pub weather: Value,
    /// Air quality document; `None` when it could not be fetched.
    pub air_quality: Option<Value>,
    /// Unit system the weather document was requested in.
    pub requested_units: UnitSystem,
}

#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    fn id(&self) -> ProviderId;

    /// Fetch the raw upstream documents for `location`.
    async fn fetch(&self, location: Location, units: UnitSystem) -> Result<RawPayload>;

    /// Translate a raw payload into a record expressed in `target` units.
    ///
    /// Pure: the same payload and target always produce the same record.
    fn normalize(&self, raw: &RawPayload, target: UnitSystem) -> Result<WeatherRecord>;
}

/// Construct a provider from config and explicit ProviderId.
pub fn provider_from_config(id: ProviderId, config: &Config) -> Result<Box<dyn WeatherProvider>> {
    let overrides = config.provider_config(id).cloned().unwrap_or_default();
    // today plus the configured number of days ahead
    let days = config.forecast_days.saturating_add(1);

    let boxed: Box<dyn WeatherProvider> = match id {
        ProviderId::OpenMeteo => {
            let mut provider = OpenMeteoProvider::new(days);
            if let Some(url) = overrides.base_url {
                provider = provider.with_base_url(url);
            }
            if let Some(url) = overrides.air_quality_url {
                provider = provider.with_air_quality_url(url);
            }
            Box::new(provider)
        }
        ProviderId::OpenWeatherMap => Box::new(openweathermap_from_config(config)?),
    };

    Ok(boxed)
}

fn openweathermap_from_config(config: &Config) -> Result<OpenWeatherMapProvider> {
    let id = ProviderId::OpenWeatherMap;
    let provider = OpenWeatherMapProvider::new(config.resolve_api_key(id))?;

    Ok(match config.provider_config(id).and_then(|c| c.base_url.clone()) {
        Some(url) => provider.with_base_url(url),
        None => provider,
    })
}

/// Place name for `location` from OpenWeatherMap's reverse geocoding.
pub async fn location_name(config: &Config, location: Location) -> Result<String> {
    openweathermap_from_config(config)?
        .reverse_geocode(location)
        .await
}

/// Construct the provider selected by the `provider` field.
pub fn default_provider_from_config(config: &Config) -> Result<Box<dyn WeatherProvider>> {
    provider_from_config(config.provider, config)
}

async fn fetch_and_normalize(
    provider: &dyn WeatherProvider,
    location: Location,
    units: UnitSystem,
) -> Result<WeatherRecord> {
    let raw = provider.fetch(location, units).await?;
    provider.normalize(&raw, units)
}

/// Fetch and normalize weather with the configured provider.
///
/// An authentication failure with the keyed provider is retried once with
/// Open-Meteo; every other error is returned as is.
pub async fn fetch_weather(config: &Config, location: Location) -> Result<WeatherRecord> {
    let units = config.units;
    let attempt = match default_provider_from_config(config) {
        Ok(provider) => fetch_and_normalize(provider.as_ref(), location, units).await,
        Err(err) => Err(err),
    };

    match attempt {
        Err(err) if err.is_authentication() && config.provider != ProviderId::OpenMeteo => {
            warn!(
                provider = %config.provider,
                error = %err,
                "Falling back to {}",
                ProviderId::OpenMeteo
            );
            let fallback = provider_from_config(ProviderId::OpenMeteo, config)?;
            fetch_and_normalize(fallback.as_ref(), location, units).await
        }
        other => other,
    }
}

/// GET `url` and decode the body as JSON.
///
/// 401 and 403 responses map to [`Error::Authentication`].
pub(crate) async fn get_json(
    http: &Client,
    provider: &'static str,
    url: &str,
    query: &[(&str, String)],
) -> Result<Value> {
    debug!(provider, url, "Fetching");

    let res = http.get(url).query(query).send().await?;

    let status = res.status();
    let body = res.text().await?;

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(Error::Authentication {
            provider: provider.to_string(),
            reason: format!("status {status}: {}", truncate_body(&body)),
        });
    }

    if !status.is_success() {
        return Err(Error::UpstreamStatus {
            provider,
            status: status.as_u16(),
            body: truncate_body(&body),
        });
    }

    Ok(serde_json::from_str(&body)?)
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

/// Converts readings from a payload's source units into a target system.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Converter {
    pub temperature: (TemperatureUnit, TemperatureUnit),
    pub speed: (SpeedUnit, SpeedUnit),
    pub pressure: (PressureUnit, PressureUnit),
    pub precipitation: (PrecipitationUnit, PrecipitationUnit),
}

impl Converter {
    pub fn new(
        source: (TemperatureUnit, SpeedUnit, PressureUnit, PrecipitationUnit),
        target: UnitSystem,
    ) -> Self {
        Self {
            temperature: (source.0, target.temperature()),
            speed: (source.1, target.speed()),
            pressure: (source.2, target.pressure()),
            precipitation: (source.3, target.precipitation()),
        }
    }

    pub fn temperature(&self, value: f64) -> f64 {
        convert_temperature(value, self.temperature.0, self.temperature.1)
    }

    pub fn speed(&self, value: f64) -> f64 {
        convert_speed(value, self.speed.0, self.speed.1)
    }

    pub fn pressure(&self, value: f64) -> f64 {
        convert_pressure(value, self.pressure.0, self.pressure.1)
    }

    pub fn precipitation(&self, value: f64) -> f64 {
        convert_precipitation(value, self.precipitation.0, self.precipitation.1)
    }
}

/// Clamp a 0-100 reading into a percentage.
pub(crate) fn percent(value: f64) -> u8 {
    value.round().clamp(0.0, 100.0) as u8
}
