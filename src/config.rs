//! Runtime configuration.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `HIVEWATCH__*` environment variables (e.g. `HIVEWATCH__ALERTS__COOLDOWN=2m`).
//! Durations are written as strings such as `"5m"` or `"300s"`, or as a
//! plain number of seconds.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Deserializer};

use crate::data::alert::DEFAULT_ALERT_COOLDOWN;
use crate::data::duration::parse_duration;
use crate::data::liveness::DEFAULT_LIVENESS_WINDOW;
use crate::data::Thresholds;
use crate::error::EngineError;
use crate::source::Backend;

/// Default configuration file name, looked up without extension.
const DEFAULT_CONFIG_NAME: &str = "hivewatch";

/// Environment variable prefix.
const ENV_PREFIX: &str = "HIVEWATCH";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Logger {
    pub level: String,
}

impl Default for Logger {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Liveness {
    #[serde(deserialize_with = "deserialize_duration")]
    pub window: Duration,
}

impl Default for Liveness {
    fn default() -> Self {
        Self {
            window: DEFAULT_LIVENESS_WINDOW,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Alerts {
    /// Whether `watch` subscribes with alerting by default.
    pub enabled: bool,
    #[serde(deserialize_with = "deserialize_duration")]
    pub cooldown: Duration,
}

impl Default for Alerts {
    fn default() -> Self {
        Self {
            enabled: false,
            cooldown: DEFAULT_ALERT_COOLDOWN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub kind: Backend,
    /// `host:port` of the live reading stream.
    pub connect: Option<String>,
    /// JSON file holding the historical set.
    pub history_file: Option<PathBuf>,
    /// How often the reading source is drained into the feed.
    #[serde(deserialize_with = "deserialize_duration")]
    pub poll_interval: Duration,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            kind: Backend::Live,
            connect: None,
            history_file: None,
            poll_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub logger: Logger,
    pub thresholds: Thresholds,
    pub liveness: Liveness,
    pub alerts: Alerts,
    pub backend: BackendSettings,
}

impl Settings {
    /// Load settings from `path` (required when given) or from an optional
    /// `hivewatch.toml` in the working directory, overlaid with environment
    /// variables.
    pub fn load(path: Option<&Path>) -> Result<Self, EngineError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let settings: Settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// The evaluation parameters handed to the engine.
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            thresholds: self.thresholds,
            liveness_window: self.liveness.window,
            alert_cooldown: self.alerts.cooldown,
        }
    }

    fn validate(&self) -> Result<(), EngineError> {
        let t = &self.thresholds;
        if !(0.0..1.0).contains(&t.warning_margin) {
            return Err(EngineError::Config(format!(
                "thresholds.warning_margin must be in [0, 1), got {}",
                t.warning_margin
            )));
        }
        for (name, bounds) in [
            ("temperature", t.temperature),
            ("humidity", t.humidity),
            ("air_purity", t.air_purity),
        ] {
            if let Some(max) = bounds.max {
                if max < bounds.min {
                    return Err(EngineError::Config(format!(
                        "thresholds.{name}: max {max} is below min {}",
                        bounds.min
                    )));
                }
            }
        }
        if self.backend.poll_interval.is_zero() {
            return Err(EngineError::Config(
                "backend.poll_interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Evaluation parameters: thresholds, liveness window and alert cooldown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    pub thresholds: Thresholds,
    pub liveness_window: Duration,
    pub alert_cooldown: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            liveness_window: DEFAULT_LIVENESS_WINDOW,
            alert_cooldown: DEFAULT_ALERT_COOLDOWN,
        }
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Seconds(u64),
        Text(String),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Repr::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}
