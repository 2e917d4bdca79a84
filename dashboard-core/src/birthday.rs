//! Recurring birthdays: CSV parsing and next-occurrence arithmetic.
//!
//! The CSV has a `name,date` header where `date` is `YYYY-MM-DD` or `MM-DD`.
//! Rows that cannot be used are skipped and reported as warnings; one bad row
//! never discards the rest of the file.
//!
//! A Feb 29 birthday falls on Mar 1 in years without a leap day.

use chrono::{Datelike, NaiveDate};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Serialize;
use std::{fs::File, io::Read, path::Path};
use tracing::{debug, warn};

use crate::error::{Error, Result};

pub const DEFAULT_WINDOW_DAYS: u32 = 30;
pub const DEFAULT_MAX_RESULTS: usize = 5;

/// Any leap year; used to validate month/day pairs given without a year.
const LEAP_YEAR: i32 = 2000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BirthdayEntry {
    pub name: String,
    pub month: u32,
    pub day: u32,
    pub year: Option<i32>,
}

impl BirthdayEntry {
    /// Validates the date against the calendar; Feb 30 is rejected, Feb 29 is
    /// accepted without a year or with a leap year.
    pub fn new(name: impl Into<String>, month: u32, day: u32, year: Option<i32>) -> Result<Self> {
        let check_year = year.unwrap_or(LEAP_YEAR);
        if year.is_some_and(|y| y <= 0) || NaiveDate::from_ymd_opt(check_year, month, day).is_none()
        {
            let value = match year {
                Some(y) => format!("{y:04}-{month:02}-{day:02}"),
                None => format!("{month:02}-{day:02}"),
            };
            return Err(Error::InvalidDate {
                value,
                expected: "a real calendar date",
            });
        }

        Ok(Self {
            name: name.into(),
            month,
            day,
            year,
        })
    }

    /// The date this birthday is observed on in `year`.
    pub fn occurrence_in(&self, year: i32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(year, self.month, self.day)
            .or_else(|| NaiveDate::from_ymd_opt(year, 3, 1))
    }

    /// First occurrence on or after `today`.
    pub fn next_occurrence(&self, today: NaiveDate) -> Option<NaiveDate> {
        let this_year = self.occurrence_in(today.year())?;
        if this_year >= today {
            Some(this_year)
        } else {
            self.occurrence_in(today.year() + 1)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BirthdayOccurrence {
    pub entry: BirthdayEntry,
    pub date: NaiveDate,
    pub days_until: u32,
    /// Age reached on `date`, when the birth year is known.
    pub age: Option<u32>,
}

impl BirthdayOccurrence {
    pub fn from_entry(entry: &BirthdayEntry, today: NaiveDate) -> Option<Self> {
        let date = entry.next_occurrence(today)?;
        let days_until = u32::try_from((date - today).num_days()).ok()?;
        let age = entry
            .year
            .and_then(|born| u32::try_from(date.year() - born).ok());

        Some(Self {
            entry: entry.clone(),
            date,
            days_until,
            age,
        })
    }

    /// e.g. "Mar 01"
    pub fn date_label(&self) -> String {
        self.date.format("%b %d").to_string()
    }
}

/// Occurrences within `window_days` of `today`, soonest first, ties broken by
/// name, at most `max_results` long.
pub fn upcoming(
    entries: &[BirthdayEntry],
    today: NaiveDate,
    window_days: u32,
    max_results: usize,
) -> Vec<BirthdayOccurrence> {
    let mut occurrences: Vec<_> = entries
        .iter()
        .filter_map(|entry| BirthdayOccurrence::from_entry(entry, today))
        .filter(|o| o.days_until <= window_days)
        .collect();

    occurrences.sort_by(|a, b| {
        a.days_until
            .cmp(&b.days_until)
            .then_with(|| a.entry.name.cmp(&b.entry.name))
    });
    occurrences.truncate(max_results);
    occurrences
}

/// Entries read from a CSV, plus one warning per skipped row.
#[derive(Debug, Default)]
pub struct ParsedBirthdays {
    pub entries: Vec<BirthdayEntry>,
    pub warnings: Vec<Error>,
}

/// Parse the `date` column: `YYYY-MM-DD` or `MM-DD`.
pub fn parse_birthday_date(value: &str) -> Result<(u32, u32, Option<i32>)> {
    let invalid = || Error::InvalidDate {
        value: value.to_string(),
        expected: "YYYY-MM-DD or MM-DD",
    };

    let parts: Vec<&str> = value.split('-').collect();
    match parts.as_slice() {
        [_, _, _] => {
            let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| invalid())?;
            Ok((date.month(), date.day(), Some(date.year())))
        }
        [month, day] => {
            let month = month.trim().parse().map_err(|_| invalid())?;
            let day = day.trim().parse().map_err(|_| invalid())?;
            Ok((month, day, None))
        }
        _ => Err(invalid()),
    }
}

fn column(headers: &StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}').eq_ignore_ascii_case(name))
}

fn parse_row(
    record: &StringRecord,
    name_col: usize,
    date_col: usize,
    today: NaiveDate,
) -> std::result::Result<BirthdayEntry, String> {
    let name = record.get(name_col).unwrap_or_default();
    let date = record.get(date_col).unwrap_or_default();

    if name.is_empty() {
        return Err("missing name".to_string());
    }
    if date.is_empty() {
        return Err(format!("missing date for '{name}'"));
    }

    let (month, day, year) = parse_birthday_date(date).map_err(|e| e.to_string())?;
    let entry = BirthdayEntry::new(name, month, day, year).map_err(|e| e.to_string())?;

    if let Some(year) = entry.year {
        let born = NaiveDate::from_ymd_opt(year, month, day);
        if born.is_some_and(|born| born > today) {
            return Err(format!("birth date {date} for '{name}' is in the future"));
        }
    }

    Ok(entry)
}

/// Parse birthday rows from CSV text. Only a missing header fails the whole
/// parse; individual rows are skipped with a warning.
pub fn parse_birthdays<R: Read>(reader: R, today: NaiveDate) -> Result<ParsedBirthdays> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let (Some(name_col), Some(date_col)) = (column(&headers, "name"), column(&headers, "date"))
    else {
        return Err(Error::MalformedBirthdayRow {
            line: 1,
            reason: "expected a `name,date` header".to_string(),
        });
    };

    let mut parsed = ParsedBirthdays::default();
    for result in rdr.records() {
        let record = match result {
            Ok(record) => record,
            Err(err) => {
                let line = err.position().map(|p| p.line()).unwrap_or_default();
                warn!(line, error = %err, "Unreadable birthday row");
                parsed.warnings.push(Error::MalformedBirthdayRow {
                    line,
                    reason: err.to_string(),
                });
                continue;
            }
        };

        let line = record.position().map(|p| p.line()).unwrap_or_default();
        if record.iter().all(str::is_empty) {
            continue;
        }

        match parse_row(&record, name_col, date_col, today) {
            Ok(entry) => parsed.entries.push(entry),
            Err(reason) => {
                warn!(line, %reason, "Skipping birthday row");
                parsed
                    .warnings
                    .push(Error::MalformedBirthdayRow { line, reason });
            }
        }
    }

    debug!(
        entries = parsed.entries.len(),
        skipped = parsed.warnings.len(),
        "Parsed birthday CSV"
    );
    Ok(parsed)
}

/// Read and parse a birthday CSV from disk.
pub fn load_birthdays(path: &Path, today: NaiveDate) -> Result<ParsedBirthdays> {
    let file = File::open(path).map_err(|source| Error::BirthdayFile {
        path: path.display().to_string(),
        source,
    })?;
    parse_birthdays(file, today)
}
