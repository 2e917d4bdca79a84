//! Core library for the `dashboard` CLI.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Weather provider adapters normalizing into one [`WeatherRecord`]
//! - The metrics, birthday and countdown engines behind each dashboard section
//! - Assembly of the full [`DashboardView`]
//!
//! It is used by `dashboard-cli`, but can also be reused by other binaries or services.

pub mod birthday;
pub mod config;
pub mod countdown;
pub mod dashboard;
pub mod error;
pub mod metrics;
pub mod model;
pub mod provider;
pub mod units;

pub use config::{Config, CountdownConfig, ProviderConfig, TitleSource};
pub use dashboard::{DashboardView, assemble, assemble_with_location, render};
pub use error::{Error, Result};
pub use model::{Location, WeatherRecord};
pub use provider::{ProviderId, WeatherProvider, fetch_weather, location_name};
pub use units::UnitSystem;
