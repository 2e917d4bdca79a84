//! Unit systems and the conversions between them.
//!
//! Every function here is pure. Values are converted through a canonical unit
//! (Celsius, metres per second, hectopascal, millimetre) so each pair of units
//! only needs one formula in each direction.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

const KELVIN_OFFSET: f64 = 273.15;
const MPS_PER_MPH: f64 = 0.44704;
const MPS_PER_KNOT: f64 = 0.514_444;
const HPA_PER_INHG: f64 = 33.863_886;
const MM_PER_INCH: f64 = 25.4;

/// The three unit systems a dashboard can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    Imperial,
    #[default]
    Metric,
    Standard,
}

impl UnitSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitSystem::Imperial => "imperial",
            UnitSystem::Metric => "metric",
            UnitSystem::Standard => "standard",
        }
    }

    pub const fn all() -> &'static [UnitSystem] {
        &[UnitSystem::Imperial, UnitSystem::Metric, UnitSystem::Standard]
    }

    pub fn temperature(&self) -> TemperatureUnit {
        match self {
            UnitSystem::Imperial => TemperatureUnit::Fahrenheit,
            UnitSystem::Metric => TemperatureUnit::Celsius,
            UnitSystem::Standard => TemperatureUnit::Kelvin,
        }
    }

    pub fn speed(&self) -> SpeedUnit {
        match self {
            UnitSystem::Imperial => SpeedUnit::MilesPerHour,
            UnitSystem::Metric | UnitSystem::Standard => SpeedUnit::MetersPerSecond,
        }
    }

    pub fn pressure(&self) -> PressureUnit {
        match self {
            UnitSystem::Imperial => PressureUnit::InchOfMercury,
            UnitSystem::Metric | UnitSystem::Standard => PressureUnit::Hectopascal,
        }
    }

    pub fn precipitation(&self) -> PrecipitationUnit {
        match self {
            UnitSystem::Imperial => PrecipitationUnit::Inch,
            UnitSystem::Metric | UnitSystem::Standard => PrecipitationUnit::Millimeter,
        }
    }
}

impl fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for UnitSystem {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "imperial" => Ok(UnitSystem::Imperial),
            "metric" => Ok(UnitSystem::Metric),
            "standard" => Ok(UnitSystem::Standard),
            _ => Err(Error::UnsupportedUnit(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureUnit {
    Kelvin,
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn symbol(&self) -> &'static str {
        match self {
            TemperatureUnit::Kelvin => "K",
            TemperatureUnit::Celsius => "°C",
            TemperatureUnit::Fahrenheit => "°F",
        }
    }
}

impl TryFrom<&str> for TemperatureUnit {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        match value.trim() {
            "K" | "kelvin" => Ok(TemperatureUnit::Kelvin),
            "°C" | "C" | "celsius" => Ok(TemperatureUnit::Celsius),
            "°F" | "F" | "fahrenheit" => Ok(TemperatureUnit::Fahrenheit),
            _ => Err(Error::UnsupportedUnit(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedUnit {
    MetersPerSecond,
    KilometersPerHour,
    MilesPerHour,
    Knots,
}

impl SpeedUnit {
    pub fn symbol(&self) -> &'static str {
        match self {
            SpeedUnit::MetersPerSecond => "m/s",
            SpeedUnit::KilometersPerHour => "km/h",
            SpeedUnit::MilesPerHour => "mph",
            SpeedUnit::Knots => "kn",
        }
    }
}

impl TryFrom<&str> for SpeedUnit {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        match value.trim() {
            "m/s" | "ms" => Ok(SpeedUnit::MetersPerSecond),
            "km/h" | "kmh" => Ok(SpeedUnit::KilometersPerHour),
            "mph" | "mp/h" => Ok(SpeedUnit::MilesPerHour),
            "kn" | "kt" | "knots" => Ok(SpeedUnit::Knots),
            _ => Err(Error::UnsupportedUnit(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureUnit {
    Hectopascal,
    InchOfMercury,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecipitationUnit {
    Millimeter,
    Inch,
}

impl TryFrom<&str> for PrecipitationUnit {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        match value.trim() {
            "mm" => Ok(PrecipitationUnit::Millimeter),
            "inch" | "in" => Ok(PrecipitationUnit::Inch),
            _ => Err(Error::UnsupportedUnit(value.to_string())),
        }
    }
}

pub fn to_celsius(value: f64, from: TemperatureUnit) -> f64 {
    match from {
        TemperatureUnit::Kelvin => value - KELVIN_OFFSET,
        TemperatureUnit::Celsius => value,
        TemperatureUnit::Fahrenheit => (value - 32.0) * 5.0 / 9.0,
    }
}

pub fn to_fahrenheit(value: f64, from: TemperatureUnit) -> f64 {
    match from {
        TemperatureUnit::Fahrenheit => value,
        other => to_celsius(value, other) * 9.0 / 5.0 + 32.0,
    }
}

pub fn to_kelvin(value: f64, from: TemperatureUnit) -> f64 {
    match from {
        TemperatureUnit::Kelvin => value,
        other => to_celsius(value, other) + KELVIN_OFFSET,
    }
}

pub fn convert_temperature(value: f64, from: TemperatureUnit, to: TemperatureUnit) -> f64 {
    match to {
        TemperatureUnit::Kelvin => to_kelvin(value, from),
        TemperatureUnit::Celsius => to_celsius(value, from),
        TemperatureUnit::Fahrenheit => to_fahrenheit(value, from),
    }
}

pub fn mps_from(value: f64, from: SpeedUnit) -> f64 {
    match from {
        SpeedUnit::MetersPerSecond => value,
        SpeedUnit::KilometersPerHour => value / 3.6,
        SpeedUnit::MilesPerHour => value * MPS_PER_MPH,
        SpeedUnit::Knots => value * MPS_PER_KNOT,
    }
}

pub fn mph_from(value: f64, from: SpeedUnit) -> f64 {
    match from {
        SpeedUnit::MilesPerHour => value,
        other => mps_from(value, other) / MPS_PER_MPH,
    }
}

pub fn kmh_from(value: f64, from: SpeedUnit) -> f64 {
    match from {
        SpeedUnit::KilometersPerHour => value,
        other => mps_from(value, other) * 3.6,
    }
}

pub fn convert_speed(value: f64, from: SpeedUnit, to: SpeedUnit) -> f64 {
    match to {
        SpeedUnit::MetersPerSecond => mps_from(value, from),
        SpeedUnit::KilometersPerHour => kmh_from(value, from),
        SpeedUnit::MilesPerHour => mph_from(value, from),
        SpeedUnit::Knots => mps_from(value, from) / MPS_PER_KNOT,
    }
}

pub fn convert_pressure(value: f64, from: PressureUnit, to: PressureUnit) -> f64 {
    match (from, to) {
        (PressureUnit::Hectopascal, PressureUnit::InchOfMercury) => value / HPA_PER_INHG,
        (PressureUnit::InchOfMercury, PressureUnit::Hectopascal) => value * HPA_PER_INHG,
        _ => value,
    }
}

pub fn convert_precipitation(value: f64, from: PrecipitationUnit, to: PrecipitationUnit) -> f64 {
    match (from, to) {
        (PrecipitationUnit::Millimeter, PrecipitationUnit::Inch) => value / MM_PER_INCH,
        (PrecipitationUnit::Inch, PrecipitationUnit::Millimeter) => value * MM_PER_INCH,
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn temperatures() -> [TemperatureUnit; 3] {
        [
            TemperatureUnit::Kelvin,
            TemperatureUnit::Celsius,
            TemperatureUnit::Fahrenheit,
        ]
    }

    #[test]
    fn known_temperature_points() {
        assert!((to_fahrenheit(100.0, TemperatureUnit::Celsius) - 212.0).abs() < EPS);
        assert!((to_celsius(32.0, TemperatureUnit::Fahrenheit)).abs() < EPS);
        assert!((to_kelvin(0.0, TemperatureUnit::Celsius) - 273.15).abs() < EPS);
        assert!((to_fahrenheit(233.15, TemperatureUnit::Kelvin) + 40.0).abs() < 1e-6);
    }

    #[test]
    fn temperature_roundtrip_pairwise() {
        for from in temperatures() {
            for to in temperatures() {
                for x in [-40.0, 0.0, 21.5, 300.0] {
                    let there = convert_temperature(x, from, to);
                    let back = convert_temperature(there, to, from);
                    assert!((back - x).abs() < 1e-6, "{from:?} -> {to:?} for {x}");
                }
            }
        }
    }

    #[test]
    fn celsius_fahrenheit_roundtrip() {
        for x in [-12.3, 0.0, 37.0] {
            let f = to_fahrenheit(x, TemperatureUnit::Celsius);
            assert!((to_celsius(f, TemperatureUnit::Fahrenheit) - x).abs() < 1e-9);
        }
    }

    #[test]
    fn speed_conversions() {
        assert!((mps_from(36.0, SpeedUnit::KilometersPerHour) - 10.0).abs() < EPS);
        assert!((mph_from(1.0, SpeedUnit::MetersPerSecond) - 2.236_936).abs() < 1e-5);
        assert!((kmh_from(10.0, SpeedUnit::MilesPerHour) - 16.09344).abs() < 1e-6);

        let speeds = [
            SpeedUnit::MetersPerSecond,
            SpeedUnit::KilometersPerHour,
            SpeedUnit::MilesPerHour,
            SpeedUnit::Knots,
        ];
        for from in speeds {
            for to in speeds {
                let back = convert_speed(convert_speed(12.0, from, to), to, from);
                assert!((back - 12.0).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn pressure_and_precipitation() {
        let inhg = convert_pressure(
            1013.25,
            PressureUnit::Hectopascal,
            PressureUnit::InchOfMercury,
        );
        assert!((inhg - 29.92).abs() < 0.01);

        let inch =
            convert_precipitation(25.4, PrecipitationUnit::Millimeter, PrecipitationUnit::Inch);
        assert!((inch - 1.0).abs() < EPS);
    }

    #[test]
    fn unit_system_parse_and_unsupported() {
        for units in UnitSystem::all() {
            assert_eq!(UnitSystem::try_from(units.as_str()).unwrap(), *units);
        }

        let err = UnitSystem::try_from("nautical").unwrap_err();
        assert!(matches!(err, Error::UnsupportedUnit(ref s) if s == "nautical"));
    }

    #[test]
    fn provider_symbols_parse() {
        assert_eq!(TemperatureUnit::try_from("°F").unwrap(), TemperatureUnit::Fahrenheit);
        assert_eq!(SpeedUnit::try_from("km/h").unwrap(), SpeedUnit::KilometersPerHour);
        assert_eq!(PrecipitationUnit::try_from("inch").unwrap(), PrecipitationUnit::Inch);
        assert!(SpeedUnit::try_from("furlongs/fortnight").is_err());
    }

    #[test]
    fn system_unit_mapping() {
        assert_eq!(UnitSystem::Imperial.speed().symbol(), "mph");
        assert_eq!(UnitSystem::Standard.temperature().symbol(), "K");
        assert_eq!(UnitSystem::Metric.pressure(), PressureUnit::Hectopascal);
    }
}
