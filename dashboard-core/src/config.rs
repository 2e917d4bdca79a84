use anyhow::{Context, Result, anyhow};
use chrono_tz::Tz;
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use crate::{
    birthday::{DEFAULT_MAX_RESULTS, DEFAULT_WINDOW_DAYS},
    metrics::TimeFormat,
    model::Location,
    provider::ProviderId,
    units::UnitSystem,
};

/// Environment variable consulted when no OpenWeatherMap key is stored on disk.
pub const OPEN_WEATHER_MAP_KEY_ENV: &str = "OPEN_WEATHER_MAP_SECRET";

/// Configuration for a single provider.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Overrides the provider's public endpoint, e.g. for a self-hosted mirror.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub air_quality_url: Option<String>,
}

/// The countdown section: a single target date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CountdownConfig {
    #[serde(default = "default_countdown_title")]
    pub title: String,
    /// Target date as `YYYY-MM-DD`.
    pub date: String,
    /// Opaque reference handed through to the view.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Where the dashboard title comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TitleSource {
    /// Reverse-geocoded place name; OpenWeatherMap only, `title` otherwise.
    #[default]
    Location,
    /// Always the configured `title`.
    Custom,
}

fn default_countdown_title() -> String {
    "Event".to_string()
}

const fn default_forecast_days() -> u8 {
    3
}

const fn default_birthday_window_days() -> u32 {
    DEFAULT_WINDOW_DAYS
}

const fn default_birthday_max_results() -> usize {
    DEFAULT_MAX_RESULTS
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderId,

    #[serde(default)]
    pub units: UnitSystem,

    #[serde(default)]
    pub time_format: TimeFormat,

    /// Forecast days shown after today.
    #[serde(default = "default_forecast_days")]
    pub forecast_days: u8,

    #[serde(default = "default_birthday_window_days")]
    pub birthday_window_days: u32,

    #[serde(default = "default_birthday_max_results")]
    pub birthday_max_results: usize,

    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    /// IANA zone name, e.g. "America/New_York". Local time when absent.
    pub timezone: Option<String>,

    pub title: Option<String>,

    #[serde(default)]
    pub title_source: TitleSource,

    /// Path to the birthday CSV; `~` and `$VAR` are expanded.
    pub birthday_csv: Option<String>,

    pub countdown: Option<CountdownConfig>,

    /// Example TOML:
    /// [providers.openweathermap]
    /// api_key = "..."
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderId::default(),
            units: UnitSystem::default(),
            time_format: TimeFormat::default(),
            forecast_days: default_forecast_days(),
            birthday_window_days: default_birthday_window_days(),
            birthday_max_results: default_birthday_max_results(),
            latitude: None,
            longitude: None,
            timezone: None,
            title: None,
            title_source: TitleSource::default(),
            birthday_csv: None,
            countdown: None,
            providers: HashMap::new(),
        }
    }
}

impl Config {
    pub fn provider_config(&self, id: ProviderId) -> Option<&ProviderConfig> {
        self.providers.get(id.as_str())
    }

    pub fn set_provider(&mut self, id: ProviderId) {
        self.provider = id;
    }

    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-dashboard", "dashboard-cli")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Set or replace the API key stored for a provider.
    pub fn upsert_provider_api_key(&mut self, provider_id: ProviderId, api_key: String) {
        self.providers
            .entry(provider_id.as_str().to_string())
            .or_default()
            .api_key = Some(api_key);
    }

    /// Returns the API key stored on disk for a provider, if present.
    pub fn provider_api_key(&self, provider_id: ProviderId) -> Option<&str> {
        self.provider_config(provider_id)
            .and_then(|cfg| cfg.api_key.as_deref())
            .filter(|key| !key.trim().is_empty())
    }

    /// Stored key, falling back to the environment for OpenWeatherMap.
    pub fn resolve_api_key(&self, provider_id: ProviderId) -> Option<String> {
        if let Some(key) = self.provider_api_key(provider_id) {
            return Some(key.to_string());
        }

        match provider_id {
            ProviderId::OpenWeatherMap => std::env::var(OPEN_WEATHER_MAP_KEY_ENV)
                .ok()
                .filter(|key| !key.trim().is_empty()),
            ProviderId::OpenMeteo => None,
        }
    }

    pub fn location(&self) -> Result<Location> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Ok(Location { latitude, longitude }),
            _ => Err(anyhow!(
                "Latitude and longitude are required.\n\
                 Hint: set `latitude` and `longitude` in {}",
                Self::config_file_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|_| "the config file".to_string())
            )),
        }
    }

    /// The configured IANA zone, or `None` for the machine's local zone.
    pub fn tz(&self) -> Result<Option<Tz>> {
        self.timezone
            .as_deref()
            .map(|name| {
                name.parse::<Tz>()
                    .map_err(|e| anyhow!("Invalid timezone '{name}': {e}"))
            })
            .transpose()
    }
}

/// Expand a leading `~` and `$VAR` / `${VAR}` references. Unset variables
/// are left as written.
pub fn expand_path(raw: &str) -> PathBuf {
    let mut expanded = String::with_capacity(raw.len());
    let mut rest = raw;

    if let Some(stripped) = rest.strip_prefix('~') {
        if stripped.is_empty() || stripped.starts_with('/') {
            if let Some(dirs) = BaseDirs::new() {
                expanded.push_str(&dirs.home_dir().to_string_lossy());
                rest = stripped;
            }
        }
    }

    while let Some(pos) = rest.find('$') {
        expanded.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let (name, consumed) = match after.strip_prefix('{') {
            Some(braced) => match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            },
            None => {
                let end = after
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .unwrap_or(after.len());
                (&after[..end], end)
            }
        };

        match std::env::var(name) {
            Ok(value) if !name.is_empty() => expanded.push_str(&value),
            _ => expanded.push_str(&rest[pos..pos + 1 + consumed]),
        }
        rest = &after[consumed..];
    }
    expanded.push_str(rest);

    PathBuf::from(expanded)
}
