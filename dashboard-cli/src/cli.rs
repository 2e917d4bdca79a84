use anyhow::{Context, Result, anyhow};
use chrono::{Local, NaiveDate, NaiveDateTime, Utc};
use clap::{Parser, Subcommand};
use dashboard_core::{
    Config, ProviderId, birthday,
    config::{CountdownConfig, expand_path},
    countdown,
    dashboard::BirthdayView,
    metrics::MetricsBuilder,
    render,
};
use inquire::{Confirm, Password, Text};
use serde::Serialize;
use tracing::info;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "dashboard", version, about = "Weather dashboard CLI")]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure credentials for a specific provider.
    Configure {
        /// Provider short name, e.g. "open-meteo" or "openweathermap".
        provider: String,
    },

    /// Build the full dashboard and print it as JSON.
    Render {
        /// Render as if today were this date (YYYY-MM-DD).
        #[arg(long)]
        today: Option<String>,
    },

    /// Fetch the weather section only.
    Weather,

    /// List upcoming birthdays from a CSV file.
    Birthdays {
        /// CSV with `name,date` columns; defaults to `birthday_csv` from the config.
        #[arg(long)]
        csv: Option<String>,

        /// Look-ahead window in days.
        #[arg(long)]
        days: Option<u32>,

        #[arg(long)]
        max: Option<usize>,

        #[arg(long)]
        today: Option<String>,
    },

    /// Days left until (or passed since) a date.
    Countdown {
        /// Target date (YYYY-MM-DD); defaults to the configured countdown.
        #[arg(long)]
        date: Option<String>,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        today: Option<String>,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}

/// Current wall-clock time in the configured zone.
fn local_now(config: &Config) -> Result<NaiveDateTime> {
    let now = Utc::now();
    Ok(match config.tz()? {
        Some(tz) => now.with_timezone(&tz).naive_local(),
        None => now.with_timezone(&Local).naive_local(),
    })
}

/// `now`, moved to `today` when one was given on the command line.
fn effective_now(config: &Config, today: Option<&str>) -> Result<NaiveDateTime> {
    let now = local_now(config)?;
    match today {
        Some(value) => Ok(parse_day(value)?.and_time(now.time())),
        None => Ok(now),
    }
}

fn parse_day(value: &str) -> Result<NaiveDate> {
    Ok(countdown::parse_target_date(value)?)
}

fn configure(provider: &str) -> Result<()> {
    let id = ProviderId::try_from(provider)?;
    let mut config = Config::load()?;

    if id.requires_api_key() {
        let api_key = Password::new(&format!("API key for {id}:"))
            .without_confirmation()
            .prompt()
            .context("Failed to read API key")?;
        if api_key.trim().is_empty() {
            return Err(anyhow!("API key must not be empty"));
        }
        config.upsert_provider_api_key(id, api_key.trim().to_string());
    }

    let make_default = Confirm::new(&format!("Use {id} as the default provider?"))
        .with_default(true)
        .prompt()
        .context("Failed to read answer")?;
    if make_default {
        config.set_provider(id);
    }

    if config.location().is_err() {
        let latitude = Text::new("Latitude:").prompt()?;
        let longitude = Text::new("Longitude:").prompt()?;
        config.latitude = Some(latitude.trim().parse().context("Invalid latitude")?);
        config.longitude = Some(longitude.trim().parse().context("Invalid longitude")?);
    }

    config.save()?;
    info!(provider = %id, "Configuration saved");
    println!("Saved configuration to {}", Config::config_file_path()?.display());

    Ok(())
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Configure { provider } => configure(&provider)?,

            Command::Render { today } => {
                let config = Config::load()?;
                let now = effective_now(&config, today.as_deref())?;
                print_json(&render(&config, now).await)?;
            }

            Command::Weather => {
                let config = Config::load()?;
                let record = dashboard_core::fetch_weather(&config, config.location()?).await?;
                let view =
                    MetricsBuilder::new(config.time_format, config.forecast_days).build(&record);
                print_json(&view)?;
            }

            Command::Birthdays {
                csv,
                days,
                max,
                today,
            } => {
                let config = Config::load()?;
                let today = effective_now(&config, today.as_deref())?.date();
                let raw_path = csv
                    .or_else(|| config.birthday_csv.clone())
                    .ok_or_else(|| {
                        anyhow!(
                            "No birthday CSV given.\n\
                             Hint: pass --csv or set `birthday_csv` in the config"
                        )
                    })?;

                let parsed = birthday::load_birthdays(&expand_path(&raw_path), today)?;
                for warning in &parsed.warnings {
                    eprintln!("warning: {warning}");
                }

                let upcoming: Vec<BirthdayView> = birthday::upcoming(
                    &parsed.entries,
                    today,
                    days.unwrap_or(config.birthday_window_days),
                    max.unwrap_or(config.birthday_max_results),
                )
                .iter()
                .map(BirthdayView::from)
                .collect();
                print_json(&upcoming)?;
            }

            Command::Countdown { date, title, today } => {
                let config = Config::load()?;
                let today = effective_now(&config, today.as_deref())?.date();

                let target = match (date, config.countdown) {
                    (Some(date), configured) => CountdownConfig {
                        title: title
                            .or_else(|| configured.map(|c| c.title))
                            .unwrap_or_else(|| "Event".to_string()),
                        date,
                        image: None,
                    },
                    (None, Some(configured)) => CountdownConfig {
                        title: title.unwrap_or(configured.title),
                        ..configured
                    },
                    (None, None) => {
                        return Err(anyhow!(
                            "No countdown date given.\n\
                             Hint: pass --date or add a [countdown] table to the config"
                        ));
                    }
                };

                let view = countdown::compute(target.title, parse_day(&target.date)?, today)
                    .with_image(target.image);
                print_json(&view)?;
            }
        }

        Ok(())
    }
}
