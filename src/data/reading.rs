//! Sensor reading model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::timestamp::{self, RawTimestamp};

/// Device status as reported by the source.
///
/// Advisory only: liveness is always recomputed from the timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
}

/// One environmental reading from the monitored enclosure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    /// Temperature in °C.
    pub temperature: f64,
    /// Relative humidity in percent.
    pub humidity: f64,
    /// Air purity in percent.
    pub air_purity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<RawTimestamp>,
    #[serde(default, rename = "status", skip_serializing_if = "Option::is_none")]
    pub raw_status: Option<DeviceStatus>,
}

impl Reading {
    /// Create an online reading without a timestamp.
    pub fn new(temperature: f64, humidity: f64, air_purity: f64) -> Self {
        Self {
            temperature,
            humidity,
            air_purity,
            timestamp: None,
            raw_status: None,
        }
    }

    /// Attach a raw timestamp.
    pub fn at(mut self, timestamp: impl Into<RawTimestamp>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// Attach the source-reported status.
    pub fn with_status(mut self, status: DeviceStatus) -> Self {
        self.raw_status = Some(status);
        self
    }

    /// The normalized instant of this reading, if its timestamp is valid.
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        timestamp::normalize(self.timestamp.as_ref())
    }
}

/// A measured quantity on a [`Reading`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Temperature,
    Humidity,
    AirPurity,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Temperature, Metric::Humidity, Metric::AirPurity];

    /// Extract this metric from a reading.
    pub fn value(&self, reading: &Reading) -> f64 {
        match self {
            Metric::Temperature => reading.temperature,
            Metric::Humidity => reading.humidity,
            Metric::AirPurity => reading.air_purity,
        }
    }

    /// Chart label including the unit.
    pub fn label(&self) -> &'static str {
        match self {
            Metric::Temperature => "Temperature (°C)",
            Metric::Humidity => "Humidity (%)",
            Metric::AirPurity => "Air Purity (%)",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Metric::Temperature => "°C",
            Metric::Humidity | Metric::AirPurity => "%",
        }
    }

    fn key(&self) -> &'static str {
        match self {
            Metric::Temperature => "temperature",
            Metric::Humidity => "humidity",
            Metric::AirPurity => "air_purity",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "temperature" | "temp" => Ok(Metric::Temperature),
            "humidity" => Ok(Metric::Humidity),
            "airpurity" | "air" => Ok(Metric::AirPurity),
            other => Err(format!("unknown metric: {}", other)),
        }
    }
}
