use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upcoming,
    Today,
    Elapsed,
}

impl Direction {
    fn from_delta(days: i64) -> Self {
        match days {
            0 => Direction::Today,
            d if d > 0 => Direction::Upcoming,
            _ => Direction::Elapsed,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Direction::Upcoming => "Days Left",
            Direction::Today => "Today",
            Direction::Elapsed => "Days Passed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountdownView {
    pub title: String,
    pub target_date: NaiveDate,
    /// `target_date - today` in whole days.
    pub days_delta: i64,
    pub direction: Direction,
    /// e.g. "December 25, 2025"
    pub date: String,
    /// Magnitude of `days_delta`; what the display shows.
    pub day_count: u64,
    pub label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl CountdownView {
    pub fn with_image(mut self, image: Option<String>) -> Self {
        self.image = image;
        self
    }
}

/// Parse a `YYYY-MM-DD` target date.
pub fn parse_target_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| Error::InvalidDate {
        value: value.to_string(),
        expected: "YYYY-MM-DD",
    })
}

pub fn compute(
    title: impl Into<String>,
    target_date: NaiveDate,
    today: NaiveDate,
) -> CountdownView {
    let days_delta = (target_date - today).num_days();
    let direction = Direction::from_delta(days_delta);

    CountdownView {
        title: title.into(),
        target_date,
        days_delta,
        direction,
        date: target_date.format("%B %d, %Y").to_string(),
        day_count: days_delta.unsigned_abs(),
        label: direction.label(),
        image: None,
    }
}
