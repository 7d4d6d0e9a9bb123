//! Timestamp normalization.
//!
//! Sensor backends report timestamps as epoch numbers (seconds or
//! milliseconds) or as strings in a handful of ISO-like shapes, often
//! without a timezone. Everything is resolved to a UTC instant here so that
//! liveness math and chart ordering see one representation.
//!
//! Numeric inputs use a magnitude heuristic: values below `1e12` are epoch
//! seconds and are scaled by 1000, values at or above `1e12` are epoch
//! milliseconds. `1e12` ms is roughly September 2001, so second-resolution
//! timestamps from before 2001 or millisecond timestamps after the year
//! 33658 are misread. Both cases are out of scope.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Numeric timestamps below this are epoch seconds, at or above epoch millis.
pub const EPOCH_MILLIS_THRESHOLD: f64 = 1e12;

/// Largest absolute epoch-millisecond value a timestamp may carry.
const MAX_EPOCH_MILLIS: f64 = 8.64e15;

/// `YYYY-MM-DD HH:MM:SS[.fraction]` with no timezone.
static SPACE_SEPARATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}(\.\d+)?$").expect("valid regex")
});

/// Anything starting with an ISO date followed by `T`.
static ISO_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}T").expect("valid regex"));

/// A `Z` anywhere, or a trailing `±HH:MM` or `±HHMM` offset.
static TZ_DESIGNATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[Zz]|[+-]\d{2}:?\d{2}$").expect("valid regex"));

/// A timestamp as delivered by a data source, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Number(f64),
    Text(String),
}

impl fmt::Display for RawTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawTimestamp::Number(n) => write!(f, "{}", n),
            RawTimestamp::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for RawTimestamp {
    fn from(value: f64) -> Self {
        RawTimestamp::Number(value)
    }
}

impl From<i64> for RawTimestamp {
    fn from(value: i64) -> Self {
        RawTimestamp::Number(value as f64)
    }
}

impl From<&str> for RawTimestamp {
    fn from(value: &str) -> Self {
        RawTimestamp::Text(value.to_string())
    }
}

impl From<String> for RawTimestamp {
    fn from(value: String) -> Self {
        RawTimestamp::Text(value)
    }
}

impl From<DateTime<Utc>> for RawTimestamp {
    fn from(value: DateTime<Utc>) -> Self {
        RawTimestamp::Text(value.to_rfc3339())
    }
}

/// Resolve a raw timestamp to a UTC instant.
///
/// Returns `None` for a missing timestamp or one that cannot be parsed.
/// The function is pure: the same input always yields the same output.
pub fn normalize(raw: Option<&RawTimestamp>) -> Option<DateTime<Utc>> {
    match raw? {
        RawTimestamp::Number(n) => normalize_number(*n),
        RawTimestamp::Text(s) => normalize_str(s),
    }
}

/// Resolve an epoch number, seconds or milliseconds by magnitude.
pub fn normalize_number(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() {
        return None;
    }
    let millis = if value < EPOCH_MILLIS_THRESHOLD {
        value * 1000.0
    } else {
        value
    };
    if millis.abs() > MAX_EPOCH_MILLIS {
        return None;
    }
    DateTime::from_timestamp_millis(millis.trunc() as i64)
}

/// Resolve a timestamp string.
///
/// Zone-less `YYYY-MM-DD HH:MM:SS` and `YYYY-MM-DDT...` strings are taken
/// as UTC. If the rewritten form does not parse, the trimmed original is
/// tried as-is before giving up.
pub fn normalize_str(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();

    let mut rewritten = s.to_string();
    if SPACE_SEPARATED.is_match(s) {
        rewritten = format!("{}Z", s.replacen(' ', "T", 1));
    }
    if ISO_PREFIX.is_match(s) && !TZ_DESIGNATOR.is_match(s) {
        rewritten = format!("{}Z", s);
    }

    parse_absolute(&rewritten).or_else(|| parse_absolute(s))
}

/// Parse a string that carries (or is assumed to carry) its own zone.
fn parse_absolute(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    // ISO strings with a `Z` but without seconds, e.g. "2024-03-01T12:30Z".
    if let Some(naive) = s.strip_suffix('Z').or_else(|| s.strip_suffix('z')) {
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(naive, format) {
                return Some(dt.and_utc());
            }
        }
    }

    for format in [
        "%Y-%m-%d %H:%M:%S%.f%:z",
        "%Y-%m-%dT%H:%M%:z",
        "%Y-%m-%dT%H:%M:%S%.f%z",
        "%Y-%m-%d %H:%M:%S%.f%z",
    ] {
        if let Ok(dt) = DateTime::parse_from_str(s, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }

    // Date-only ISO strings are midnight UTC.
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
