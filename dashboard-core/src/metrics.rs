//! Reduces a [`WeatherRecord`] to the compact, display-ready weather view.
//!
//! The six metrics and their order are part of the contract with the
//! template: Sunrise, Sunset, Wind, Humidity, UV Index, Air Quality.
//! Unavailable readings render as [`PLACEHOLDER`], never as a number.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{model::WeatherRecord, units::UnitSystem};

/// Shown instead of a value the provider did not report.
pub const PLACEHOLDER: &str = "N/A";

pub const METRIC_LABELS: [&str; 6] = [
    "Sunrise",
    "Sunset",
    "Wind",
    "Humidity",
    "UV Index",
    "Air Quality",
];

const HOURLY_ENTRIES: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TimeFormat {
    #[default]
    #[serde(rename = "12h")]
    TwelveHour,
    #[serde(rename = "24h")]
    TwentyFourHour,
}

impl TimeFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFormat::TwelveHour => "12h",
            TimeFormat::TwentyFourHour => "24h",
        }
    }

    /// Clock time split into the measurement and its unit, e.g. `("6:42", "AM")`.
    pub fn clock(&self, dt: &DateTime<FixedOffset>) -> (String, String) {
        match self {
            TimeFormat::TwelveHour => (
                dt.format("%-I:%M").to_string(),
                dt.format("%p").to_string(),
            ),
            TimeFormat::TwentyFourHour => (dt.format("%H:%M").to_string(), String::new()),
        }
    }

    /// Whole-hour label for the hourly strip, e.g. `"3 PM"` or `"15:00"`.
    pub fn hour(&self, dt: &DateTime<FixedOffset>) -> String {
        match self {
            TimeFormat::TwelveHour => dt.format("%-I %p").to_string(),
            TimeFormat::TwentyFourHour => dt.format("%H:00").to_string(),
        }
    }
}

impl fmt::Display for TimeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompactMetric {
    pub label: String,
    pub measurement: String,
    pub unit: String,
    pub icon: String,
}

impl CompactMetric {
    fn new(label: &str, measurement: Option<String>, unit: impl Into<String>, icon: &str) -> Self {
        Self {
            label: label.to_string(),
            measurement: measurement.unwrap_or_else(|| PLACEHOLDER.to_string()),
            unit: unit.into(),
            icon: format!("icons/{icon}.png"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentView {
    /// e.g. "Monday, January 15"
    pub date: String,
    pub temperature: String,
    pub feels_like: String,
    pub description: String,
    pub icon: String,
    pub temperature_unit: String,
    pub units: UnitSystem,
    pub time_format: TimeFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastView {
    /// Abbreviated weekday, e.g. "Tue".
    pub day: String,
    pub high: i64,
    pub low: i64,
    pub icon: String,
    /// Probability of precipitation, 0-100.
    pub pop: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyView {
    pub time: String,
    pub temperature: i64,
    pub precipitation: Option<u8>,
    pub rain: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherView {
    pub current: CurrentView,
    pub metrics: [CompactMetric; 6],
    pub forecast: Vec<ForecastView>,
    pub hourly: Vec<HourlyView>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsBuilder {
    pub time_format: TimeFormat,
    /// Days shown after today.
    pub forecast_days: u8,
}

impl Default for MetricsBuilder {
    fn default() -> Self {
        Self {
            time_format: TimeFormat::default(),
            forecast_days: 3,
        }
    }
}

fn round(value: f64) -> i64 {
    value.round() as i64
}

impl MetricsBuilder {
    pub fn new(time_format: TimeFormat, forecast_days: u8) -> Self {
        Self {
            time_format,
            forecast_days,
        }
    }

    pub fn build(&self, record: &WeatherRecord) -> WeatherView {
        WeatherView {
            current: self.current(record),
            metrics: self.metrics(record),
            forecast: self.forecast(record),
            hourly: self.hourly(record),
        }
    }

    fn current(&self, record: &WeatherRecord) -> CurrentView {
        let current = &record.current;
        CurrentView {
            date: record.observed_at.format("%A, %B %d").to_string(),
            temperature: round(current.temperature).to_string(),
            feels_like: current
                .feels_like
                .map(|t| round(t).to_string())
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
            description: current.description.clone(),
            icon: format!("icons/{}.png", current.icon),
            temperature_unit: record.units.temperature().symbol().to_string(),
            units: record.units,
            time_format: self.time_format,
        }
    }

    fn sun_metric(
        &self,
        label: &str,
        at: Option<&DateTime<FixedOffset>>,
        icon: &str,
    ) -> CompactMetric {
        match at {
            Some(dt) => {
                let (time, unit) = self.time_format.clock(dt);
                CompactMetric::new(label, Some(time), unit, icon)
            }
            None => CompactMetric::new(label, None, "", icon),
        }
    }

    pub fn metrics(&self, record: &WeatherRecord) -> [CompactMetric; 6] {
        let current = &record.current;
        let [sunrise, sunset, wind, humidity, uv, aqi] = METRIC_LABELS;

        [
            self.sun_metric(sunrise, record.sunrise.as_ref(), "sunrise"),
            self.sun_metric(sunset, record.sunset.as_ref(), "sunset"),
            CompactMetric::new(
                wind,
                Some(round(current.wind_speed).to_string()),
                record.units.speed().symbol(),
                "wind",
            ),
            CompactMetric::new(humidity, current.humidity.map(|h| h.to_string()), "%", "humidity"),
            CompactMetric::new(uv, current.uv_index.map(|u| u.to_string()), "", "uvi"),
            match current.air_quality {
                Some(aq) => CompactMetric::new(aqi, Some(aq.index.to_string()), aq.label(), "aqi"),
                None => CompactMetric::new(aqi, None, "", "aqi"),
            },
        ]
    }

    /// Today plus `forecast_days`, or fewer when the record has fewer.
    pub fn forecast(&self, record: &WeatherRecord) -> Vec<ForecastView> {
        record
            .daily
            .iter()
            .take(usize::from(self.forecast_days) + 1)
            .map(|day| ForecastView {
                day: day.date.format("%a").to_string(),
                high: round(day.high),
                low: round(day.low),
                icon: format!("icons/{}.png", day.icon),
                pop: day.precipitation_probability,
            })
            .collect()
    }

    fn hourly(&self, record: &WeatherRecord) -> Vec<HourlyView> {
        record
            .hourly
            .iter()
            .take(HOURLY_ENTRIES)
            .map(|hour| HourlyView {
                time: self.time_format.hour(&hour.time),
                temperature: round(hour.temperature),
                precipitation: hour.precipitation_probability,
                rain: hour.precipitation.map(|p| (p * 100.0).round() / 100.0),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{AirQuality, AqiScale, CurrentConditions, DailyForecast},
        provider::{
            ProviderId, RawPayload,
            open_meteo::{self, tests::sample_air_quality, tests::sample_forecast},
        },
    };
    use chrono::{NaiveDate, TimeZone};

    fn record() -> WeatherRecord {
        let tz = FixedOffset::east_opt(-5 * 3600).unwrap();
        let day = |d: u32, high: f64| DailyForecast {
            date: NaiveDate::from_ymd_opt(2024, 1, d).unwrap(),
            high,
            low: high - 8.0,
            precipitation_probability: Some(10),
            icon: "03d".to_string(),
        };

        WeatherRecord {
            provider: ProviderId::OpenWeatherMap,
            units: UnitSystem::Imperial,
            observed_at: tz.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
            current: CurrentConditions {
                temperature: 37.6,
                feels_like: Some(30.9),
                description: "Light Rain".to_string(),
                icon: "10d".to_string(),
                wind_speed: 10.4,
                humidity: Some(64.0),
                pressure: Some(30.0),
                uv_index: Some(1.37),
                air_quality: AirQuality::new(2, AqiScale::OpenWeatherMap),
            },
            sunrise: Some(tz.with_ymd_and_hms(2024, 1, 15, 7, 5, 0).unwrap()),
            sunset: Some(tz.with_ymd_and_hms(2024, 1, 15, 16, 49, 0).unwrap()),
            daily: (15..=21).map(|d| day(d, 40.0 + f64::from(d))).collect(),
            hourly: Vec::new(),
        }
    }

    #[test]
    fn exactly_six_metrics_in_fixed_order() {
        let view = MetricsBuilder::default().build(&record());
        let labels: Vec<_> = view.metrics.iter().map(|m| m.label.as_str()).collect();
        assert_eq!(labels, METRIC_LABELS);
    }

    #[test]
    fn twelve_hour_sun_times() {
        let metrics = MetricsBuilder::new(TimeFormat::TwelveHour, 3).metrics(&record());

        assert_eq!(metrics[0].measurement, "7:05");
        assert_eq!(metrics[0].unit, "AM");
        assert_eq!(metrics[1].measurement, "4:49");
        assert_eq!(metrics[1].unit, "PM");
        assert_eq!(metrics[0].icon, "icons/sunrise.png");
    }

    #[test]
    fn twenty_four_hour_sun_times_use_record_offset() {
        let metrics = MetricsBuilder::new(TimeFormat::TwentyFourHour, 3).metrics(&record());

        assert_eq!(metrics[0].measurement, "07:05");
        assert_eq!(metrics[0].unit, "");
        assert_eq!(metrics[1].measurement, "16:49");
    }

    #[test]
    fn readings_formatting() {
        let metrics = MetricsBuilder::default().metrics(&record());

        assert_eq!((metrics[2].measurement.as_str(), metrics[2].unit.as_str()), ("10", "mph"));
        assert_eq!((metrics[3].measurement.as_str(), metrics[3].unit.as_str()), ("64", "%"));
        assert_eq!(metrics[4].measurement, "1.37");
        assert_eq!((metrics[5].measurement.as_str(), metrics[5].unit.as_str()), ("2", "Fair"));
    }

    #[test]
    fn unavailable_readings_render_placeholder_not_zero() {
        let mut record = record();
        record.current.air_quality = None;
        record.current.uv_index = None;
        record.current.humidity = None;
        record.sunrise = None;

        let view = MetricsBuilder::default().build(&record);
        assert_eq!(view.metrics.len(), 6);
        assert_eq!(view.metrics[0].measurement, PLACEHOLDER);
        assert_eq!(view.metrics[3].measurement, PLACEHOLDER);
        assert_eq!(view.metrics[4].measurement, PLACEHOLDER);
        assert_eq!(view.metrics[5].measurement, PLACEHOLDER);
        assert_eq!(view.metrics[5].unit, "");
    }

    #[test]
    fn forecast_takes_today_plus_configured_days() {
        let view = MetricsBuilder::default().build(&record());

        assert_eq!(view.forecast.len(), 4);
        assert_eq!(view.forecast[0].day, "Mon");
        assert_eq!(view.forecast[0].high, 55);
        assert_eq!(view.forecast[0].low, 47);
        assert_eq!(view.forecast[0].icon, "icons/03d.png");
    }

    #[test]
    fn forecast_is_never_padded() {
        let mut record = record();
        record.daily.truncate(2);

        let view = MetricsBuilder::new(TimeFormat::TwelveHour, 3).build(&record);
        assert_eq!(view.forecast.len(), 2);
    }

    #[test]
    fn current_block_rounds_temperatures() {
        let view = MetricsBuilder::default().build(&record());

        assert_eq!(view.current.temperature, "38");
        assert_eq!(view.current.feels_like, "31");
        assert_eq!(view.current.temperature_unit, "°F");
        assert_eq!(view.current.date, "Monday, January 15");
        assert_eq!(view.current.icon, "icons/10d.png");
    }

    #[test]
    fn open_meteo_record_without_air_quality_renders_placeholder() {
        let raw = RawPayload {
            weather: sample_forecast(),
            air_quality: None,
            requested_units: UnitSystem::Metric,
        };
        let record = open_meteo::normalize(&raw, UnitSystem::Metric).unwrap();

        let metrics = MetricsBuilder::default().metrics(&record);
        assert_eq!(metrics[5].measurement, PLACEHOLDER);
        assert_ne!(metrics[5].measurement, "0");
    }

    #[test]
    fn open_meteo_hourly_strip() {
        let raw = RawPayload {
            weather: sample_forecast(),
            air_quality: Some(sample_air_quality()),
            requested_units: UnitSystem::Metric,
        };
        let record = open_meteo::normalize(&raw, UnitSystem::Metric).unwrap();

        let twelve = MetricsBuilder::new(TimeFormat::TwelveHour, 3).build(&record);
        assert_eq!(twelve.hourly[0].time, "12 PM");
        assert_eq!(twelve.hourly[0].rain, Some(1.2));
        assert_eq!(twelve.metrics[5].unit, "Moderate");

        let twenty_four = MetricsBuilder::new(TimeFormat::TwentyFourHour, 3).build(&record);
        assert_eq!(twenty_four.hourly[0].time, "12:00");
    }
}
