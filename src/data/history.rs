//! Historical range filtering for charts.
//!
//! A [`HistoricalSet`] comes from an untrusted bulk store: keys are
//! arbitrary timestamp strings and may not parse. [`HistoryWindow`] keeps
//! the entries within a named lookback range and orders them for charting.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::reading::{Metric, Reading};
use super::timestamp;
use crate::error::EngineError;

/// Historical readings keyed by their raw timestamp string.
pub type HistoricalSet = BTreeMap<String, Reading>;

/// Named lookback window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RangeSelector {
    /// The last hour.
    Live,
    /// The last 24 hours.
    #[default]
    Day,
    /// The last 7 days.
    Week,
    /// The last 15 days.
    HalfMonth,
    /// The last 30 days.
    Month,
    /// No limit. Unrecognised selector strings land here.
    All,
}

impl RangeSelector {
    /// The selectors offered to users, in display order.
    pub const NAMED: [RangeSelector; 5] = [
        RangeSelector::Live,
        RangeSelector::Day,
        RangeSelector::Week,
        RangeSelector::HalfMonth,
        RangeSelector::Month,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            RangeSelector::Live => "Live",
            RangeSelector::Day => "24H",
            RangeSelector::Week => "7D",
            RangeSelector::HalfMonth => "15D",
            RangeSelector::Month => "30D",
            RangeSelector::All => "All",
        }
    }

    /// Maximum entry age in hours, `None` for no limit.
    pub fn max_age_hours(&self) -> Option<i64> {
        match self {
            RangeSelector::Live => Some(1),
            RangeSelector::Day => Some(24),
            RangeSelector::Week => Some(168),
            RangeSelector::HalfMonth => Some(360),
            RangeSelector::Month => Some(720),
            RangeSelector::All => None,
        }
    }

    pub fn max_age(&self) -> Option<chrono::Duration> {
        self.max_age_hours().map(chrono::Duration::hours)
    }

    /// Whether chart labels show time of day rather than a date.
    fn is_intraday(&self) -> bool {
        matches!(self, RangeSelector::Live | RangeSelector::Day)
    }
}

impl fmt::Display for RangeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RangeSelector {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "Live" => RangeSelector::Live,
            "24H" => RangeSelector::Day,
            "7D" => RangeSelector::Week,
            "15D" => RangeSelector::HalfMonth,
            "30D" => RangeSelector::Month,
            _ => RangeSelector::All,
        })
    }
}

impl Serialize for RangeSelector {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for RangeSelector {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let Ok(selector) = s.parse::<RangeSelector>();
        Ok(selector)
    }
}

/// One historical entry inside a window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub at: DateTime<Utc>,
    pub key: String,
    pub reading: Reading,
}

/// One charted value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub at: DateTime<Utc>,
    pub label: String,
    pub value: f64,
}

/// Filters a historical set down to a lookback range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryWindow {
    selector: RangeSelector,
}

impl HistoryWindow {
    pub fn new(selector: RangeSelector) -> Self {
        Self { selector }
    }

    pub fn selector(&self) -> RangeSelector {
        self.selector
    }

    /// Entries no older than the range, ascending by instant.
    ///
    /// Keys that do not normalize are dropped. The age bound is inclusive
    /// and ties on instant are broken by key so the output is deterministic.
    /// The input set is not modified.
    pub fn filter(&self, set: &HistoricalSet, now: DateTime<Utc>) -> Vec<HistoryPoint> {
        let max_age = self.selector.max_age();

        let mut points: Vec<HistoryPoint> = set
            .iter()
            .filter_map(|(key, reading)| {
                let Some(at) = timestamp::normalize_str(key) else {
                    let err = EngineError::MalformedHistoricalEntry {
                        key: key.clone(),
                        reason: "unparseable timestamp".to_string(),
                    };
                    debug!("Skipping {}", err);
                    return None;
                };
                let in_range = max_age.map_or(true, |max| now.signed_duration_since(at) <= max);
                in_range.then(|| HistoryPoint {
                    at,
                    key: key.clone(),
                    reading: reading.clone(),
                })
            })
            .collect();

        points.sort_by(|a, b| a.at.cmp(&b.at).then_with(|| a.key.cmp(&b.key)));
        points
    }

    /// Extract one metric from windowed points, labelled for charting.
    ///
    /// Short ranges are labelled with the time of day, longer ones with the
    /// date and hour. Labels are rendered in UTC.
    pub fn series(&self, points: &[HistoryPoint], metric: Metric) -> Vec<SeriesPoint> {
        let format = if self.selector.is_intraday() {
            "%I:%M %p"
        } else {
            "%b %-d, %I %p"
        };
        points
            .iter()
            .map(|p| SeriesPoint {
                at: p.at,
                label: p.at.format(format).to_string(),
                value: metric.value(&p.reading),
            })
            .collect()
    }
}

/// Latest instant among the set's keys.
///
/// Used to estimate when the device was last seen when the live reading
/// has no usable timestamp.
pub fn last_seen_estimate(set: &HistoricalSet) -> Option<DateTime<Utc>> {
    set.keys().filter_map(|k| timestamp::normalize_str(k)).max()
}
