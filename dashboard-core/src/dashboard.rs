//! Assembles the full dashboard view from the weather record, the birthday
//! file and the countdown target.
//!
//! Each section is built independently. A section that fails is left empty
//! and its error is recorded in [`DashboardView::warnings`]; it never takes
//! the other sections down with it.

use anyhow::Context;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::{
    birthday::{self, BirthdayOccurrence},
    config::{Config, TitleSource, expand_path},
    countdown::{self, CountdownView},
    metrics::{MetricsBuilder, TimeFormat, WeatherView},
    model::WeatherRecord,
    provider::{self, ProviderId},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BirthdayView {
    pub name: String,
    /// e.g. "Mar 01"
    pub date: String,
    pub days_until: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
}

impl From<&BirthdayOccurrence> for BirthdayView {
    fn from(occurrence: &BirthdayOccurrence) -> Self {
        Self {
            name: occurrence.entry.name.clone(),
            date: occurrence.date_label(),
            days_until: occurrence.days_until,
            age: occurrence.age,
        }
    }
}

/// Everything the template needs for one render.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub title: String,
    /// e.g. "Monday, January 15"
    pub current_date: String,
    /// ISO 8601 week number.
    pub current_week: u32,
    pub last_refresh: String,
    pub weather: Option<WeatherView>,
    pub birthdays: Vec<BirthdayView>,
    pub countdown: Option<CountdownView>,
    /// One message per section that could not be built.
    pub warnings: Vec<String>,
}

fn refresh_label(now: NaiveDateTime, time_format: TimeFormat) -> String {
    match time_format {
        TimeFormat::TwelveHour => now.format("%Y-%m-%d %-I:%M %p").to_string(),
        TimeFormat::TwentyFourHour => now.format("%Y-%m-%d %H:%M").to_string(),
    }
}

fn title_section(
    config: &Config,
    location_name: Option<anyhow::Result<String>>,
    warnings: &mut Vec<String>,
) -> String {
    let configured = config.title.clone().unwrap_or_default();

    match location_name {
        Some(Ok(name)) if config.title_source == TitleSource::Location => name,
        Some(Err(err)) => {
            warn!(error = %err, "Location title unavailable");
            warnings.push(format!("Location title unavailable: {err:#}"));
            configured
        }
        _ => configured,
    }
}

fn weather_section(
    config: &Config,
    weather: anyhow::Result<WeatherRecord>,
    warnings: &mut Vec<String>,
) -> Option<WeatherView> {
    match weather {
        Ok(record) => {
            Some(MetricsBuilder::new(config.time_format, config.forecast_days).build(&record))
        }
        Err(err) => {
            warn!(error = %err, "Weather section unavailable");
            warnings.push(format!("Weather unavailable: {err:#}"));
            None
        }
    }
}

fn birthday_section(
    config: &Config,
    today: NaiveDate,
    warnings: &mut Vec<String>,
) -> Vec<BirthdayView> {
    let Some(raw_path) = config.birthday_csv.as_deref() else {
        debug!("No birthday CSV configured");
        return Vec::new();
    };

    let parsed = match birthday::load_birthdays(&expand_path(raw_path), today) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(error = %err, "Birthday section unavailable");
            warnings.push(err.to_string());
            return Vec::new();
        }
    };
    warnings.extend(parsed.warnings.iter().map(ToString::to_string));

    birthday::upcoming(
        &parsed.entries,
        today,
        config.birthday_window_days,
        config.birthday_max_results,
    )
    .iter()
    .map(BirthdayView::from)
    .collect()
}

fn countdown_section(
    config: &Config,
    today: NaiveDate,
    warnings: &mut Vec<String>,
) -> Option<CountdownView> {
    let target = config.countdown.as_ref()?;

    match countdown::parse_target_date(&target.date) {
        Ok(date) => Some(
            countdown::compute(target.title.clone(), date, today).with_image(target.image.clone()),
        ),
        Err(err) => {
            warn!(error = %err, "Countdown section unavailable");
            warnings.push(format!("Countdown '{}': {err}", target.title));
            None
        }
    }
}

/// Build the view for the local wall-clock time `now`. `weather` is the
/// outcome of the fetch; an error only empties the weather section.
pub fn assemble(
    config: &Config,
    now: NaiveDateTime,
    weather: anyhow::Result<WeatherRecord>,
) -> DashboardView {
    assemble_with_location(config, now, weather, None)
}

/// Like [`assemble`], with the outcome of a place-name lookup for the title.
/// A failed lookup falls back to the configured title.
pub fn assemble_with_location(
    config: &Config,
    now: NaiveDateTime,
    weather: anyhow::Result<WeatherRecord>,
    location_name: Option<anyhow::Result<String>>,
) -> DashboardView {
    let today = now.date();
    let mut warnings = Vec::new();

    let title = title_section(config, location_name, &mut warnings);
    let weather = weather_section(config, weather, &mut warnings);
    let birthdays = birthday_section(config, today, &mut warnings);
    let countdown = countdown_section(config, today, &mut warnings);

    DashboardView {
        title,
        current_date: today.format("%A, %B %d").to_string(),
        current_week: today.iso_week().week(),
        last_refresh: refresh_label(now, config.time_format),
        weather,
        birthdays,
        countdown,
        warnings,
    }
}

/// Fetch the weather (and, for a location title, the place name) for the
/// configured location, then assemble.
#[instrument(
    skip(config),
    fields(provider = %config.provider, time_format = %config.time_format)
)]
pub async fn render(config: &Config, now: NaiveDateTime) -> DashboardView {
    let location = match config.location() {
        Ok(location) => location,
        Err(err) => return assemble(config, now, Err(err)),
    };

    let weather = provider::fetch_weather(config, location)
        .await
        .context("Weather fetch failed");

    let location_name = if config.title_source == TitleSource::Location
        && config.provider == ProviderId::OpenWeatherMap
    {
        Some(
            provider::location_name(config, location)
                .await
                .context("Reverse geocoding failed"),
        )
    } else {
        None
    };

    assemble_with_location(config, now, weather, location_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::CountdownConfig,
        provider::{
            RawPayload,
            open_meteo::{self, tests::sample_forecast},
        },
        units::UnitSystem,
    };
    use anyhow::anyhow;
    use std::io::Write;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(14, 5, 0)
            .unwrap()
    }

    fn record() -> WeatherRecord {
        let raw = RawPayload {
            weather: sample_forecast(),
            air_quality: None,
            requested_units: UnitSystem::Metric,
        };
        open_meteo::normalize(&raw, UnitSystem::Metric).unwrap()
    }

    fn birthday_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn header_fields_follow_the_clock() {
        let mut config = Config {
            title: Some("Kitchen".into()),
            ..Config::default()
        };
        let view = assemble(&config, now(), Ok(record()));

        assert_eq!(view.title, "Kitchen");
        assert_eq!(view.current_date, "Monday, January 15");
        assert_eq!(view.current_week, 3);
        assert_eq!(view.last_refresh, "2024-01-15 2:05 PM");
        assert!(view.weather.is_some());
        assert!(view.warnings.is_empty());

        config.time_format = TimeFormat::TwentyFourHour;
        let view = assemble(&config, now(), Ok(record()));
        assert_eq!(view.last_refresh, "2024-01-15 14:05");
    }

    #[test]
    fn weather_failure_leaves_other_sections_intact() {
        let file = birthday_file("name,date\nAda,01-20\nBob,12-01\n");
        let config = Config {
            birthday_csv: Some(file.path().display().to_string()),
            countdown: Some(CountdownConfig {
                title: "Trip".into(),
                date: "2024-02-01".into(),
                image: None,
            }),
            ..Config::default()
        };

        let view = assemble(&config, now(), Err(anyhow!("connection refused")));

        assert!(view.weather.is_none());
        assert_eq!(view.warnings.len(), 1);
        assert!(view.warnings[0].contains("connection refused"));

        assert_eq!(view.birthdays.len(), 1);
        assert_eq!(view.birthdays[0].name, "Ada");
        assert_eq!(view.birthdays[0].days_until, 5);
        assert_eq!(view.birthdays[0].date, "Jan 20");

        let countdown = view.countdown.unwrap();
        assert_eq!(countdown.days_delta, 17);
    }

    #[test]
    fn missing_birthday_file_is_a_warning() {
        let config = Config {
            birthday_csv: Some("/definitely/not/here/birthdays.csv".into()),
            ..Config::default()
        };

        let view = assemble(&config, now(), Ok(record()));

        assert!(view.birthdays.is_empty());
        assert!(view.weather.is_some());
        assert_eq!(view.warnings.len(), 1);
    }

    #[test]
    fn skipped_rows_surface_as_warnings() {
        let file = birthday_file("name,date\nAda,01-20\nBroken,13-45\n");
        let config = Config {
            birthday_csv: Some(file.path().display().to_string()),
            ..Config::default()
        };

        let view = assemble(&config, now(), Ok(record()));

        assert_eq!(view.birthdays.len(), 1);
        assert_eq!(view.warnings.len(), 1);
    }

    #[test]
    fn bad_countdown_date_only_drops_the_countdown() {
        let config = Config {
            countdown: Some(CountdownConfig {
                title: "Launch".into(),
                date: "next tuesday".into(),
                image: None,
            }),
            ..Config::default()
        };

        let view = assemble(&config, now(), Ok(record()));

        assert!(view.countdown.is_none());
        assert!(view.weather.is_some());
        assert_eq!(view.warnings.len(), 1);
        assert!(view.warnings[0].contains("Launch"));
    }

    #[test]
    fn location_title_replaces_the_configured_one() {
        let config = Config {
            title: Some("Home".into()),
            ..Config::default()
        };

        let view =
            assemble_with_location(&config, now(), Ok(record()), Some(Ok("Berlin, DE".into())));
        assert_eq!(view.title, "Berlin, DE");
        assert!(view.warnings.is_empty());

        let custom = Config {
            title_source: TitleSource::Custom,
            ..config.clone()
        };
        let view =
            assemble_with_location(&custom, now(), Ok(record()), Some(Ok("Berlin, DE".into())));
        assert_eq!(view.title, "Home");
    }

    #[test]
    fn failed_lookup_keeps_the_configured_title() {
        let config = Config {
            title: Some("Home".into()),
            ..Config::default()
        };

        let view = assemble_with_location(
            &config,
            now(),
            Ok(record()),
            Some(Err(anyhow!("status 401"))),
        );

        assert_eq!(view.title, "Home");
        assert!(view.weather.is_some());
        assert_eq!(view.warnings.len(), 1);
        assert!(view.warnings[0].contains("Location title unavailable"));
    }

    #[tokio::test]
    async fn render_without_location_still_renders() {
        let config = Config::default();
        let view = render(&config, now()).await;

        assert!(view.weather.is_none());
        assert_eq!(view.warnings.len(), 1);
        assert!(view.warnings[0].contains("Latitude and longitude"));
    }
}
