//! Threshold-based status classification.
//!
//! A reading is classified per metric against configurable [`Thresholds`]
//! and the enclosure tier is the worst of the metric tiers. Liveness is
//! checked first: an offline device is `Offline` whatever its numbers say.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::reading::{Metric, Reading};

/// Classification output for one evaluated reading.
///
/// Ordered by severity: `Normal < Warning < Danger`. `Offline` sorts last
/// but is reported independently of the numeric tiers; numeric
/// classification never yields it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusTier {
    Normal,
    Warning,
    Danger,
    Offline,
}

impl StatusTier {
    /// Returns a short symbol for display.
    pub fn symbol(&self) -> &'static str {
        match self {
            StatusTier::Normal => "OK",
            StatusTier::Warning => "WARN",
            StatusTier::Danger => "DANGER",
            StatusTier::Offline => "OFFLINE",
        }
    }

    /// Danger and offline both need the user's attention.
    pub fn needs_attention(&self) -> bool {
        matches!(self, StatusTier::Danger | StatusTier::Offline)
    }
}

impl fmt::Display for StatusTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StatusTier::Normal => "normal",
            StatusTier::Warning => "warning",
            StatusTier::Danger => "danger",
            StatusTier::Offline => "offline",
        })
    }
}

/// Hard bounds for one metric. `max` is absent for metrics with no upper bound.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl Bounds {
    pub fn at_least(min: f64) -> Self {
        Self { min, max: None }
    }

    pub fn between(min: f64, max: f64) -> Self {
        Self { min, max: Some(max) }
    }
}

/// Thresholds for status computation.
///
/// A value outside its bounds is `Danger`. A value inside but within
/// `warning_margin` of a bound is `Warning`: below `min * (1 + margin)` or,
/// when there is an upper bound, above `max * (1 - margin)`. Metrics
/// without an upper bound only warn on the low side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub temperature: Bounds,
    pub humidity: Bounds,
    pub air_purity: Bounds,
    pub warning_margin: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            temperature: Bounds::between(18.0, 30.0),
            humidity: Bounds::at_least(60.0),
            air_purity: Bounds::at_least(60.0),
            warning_margin: 0.1,
        }
    }
}

impl Thresholds {
    pub fn bounds(&self, metric: Metric) -> Bounds {
        match metric {
            Metric::Temperature => self.temperature,
            Metric::Humidity => self.humidity,
            Metric::AirPurity => self.air_purity,
        }
    }
}

/// Maps readings to status tiers under a fixed set of thresholds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ThresholdClassifier {
    thresholds: Thresholds,
}

impl ThresholdClassifier {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Classify a whole reading.
    ///
    /// `Offline` when not online, otherwise `Danger` if any metric breaks a
    /// hard bound, `Warning` if any metric is within the margin, else
    /// `Normal`. Several violations never escalate past `Danger`.
    pub fn classify(&self, reading: &Reading, online: bool) -> StatusTier {
        if !online {
            return StatusTier::Offline;
        }
        Metric::ALL
            .iter()
            .map(|&metric| self.value_tier(metric, metric.value(reading)))
            .max()
            .unwrap_or(StatusTier::Normal)
    }

    /// Classify a single metric of a reading, as shown on a sensor card.
    pub fn classify_metric(&self, metric: Metric, reading: &Reading, online: bool) -> StatusTier {
        if !online {
            return StatusTier::Offline;
        }
        self.value_tier(metric, metric.value(reading))
    }

    fn value_tier(&self, metric: Metric, value: f64) -> StatusTier {
        let bounds = self.thresholds.bounds(metric);
        let margin = self.thresholds.warning_margin;

        let below = value < bounds.min;
        let above = bounds.max.is_some_and(|max| value > max);
        if below || above {
            return StatusTier::Danger;
        }

        let near_min = value < bounds.min * (1.0 + margin);
        let near_max = bounds.max.is_some_and(|max| value > max * (1.0 - margin));
        if near_min || near_max {
            return StatusTier::Warning;
        }

        StatusTier::Normal
    }
}
