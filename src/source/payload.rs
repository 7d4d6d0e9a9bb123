//! Boundary adapter for reading payloads.
//!
//! Upstream producers disagree on field naming (`airPurity` vs
//! `airpurity`) and offline devices may omit their metrics entirely. This
//! module absorbs that drift so the rest of the crate only sees [`Reading`].

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use crate::data::{DeviceStatus, HistoricalSet, RawTimestamp, Reading};
use crate::error::EngineError;

/// A reading as it appears on the wire.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadingPayload {
    temperature: Option<f64>,
    humidity: Option<f64>,
    #[serde(alias = "airpurity")]
    air_purity: Option<f64>,
    #[serde(default)]
    timestamp: Option<RawTimestamp>,
    #[serde(default, deserialize_with = "lenient_status")]
    status: Option<DeviceStatus>,
}

/// The reported status is advisory, so values other than `online` or
/// `offline` (in any case) are ignored instead of rejecting the payload.
fn lenient_status<'de, D>(deserializer: D) -> Result<Option<DeviceStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    let status = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "online" => Some(DeviceStatus::Online),
            "offline" => Some(DeviceStatus::Offline),
            _ => {
                debug!("Ignoring unknown device status {:?}", s);
                None
            }
        },
        Some(Value::Null) | None => None,
        Some(other) => {
            debug!("Ignoring non-string device status {}", other);
            None
        }
    };
    Ok(status)
}

impl TryFrom<ReadingPayload> for Reading {
    type Error = EngineError;

    fn try_from(payload: ReadingPayload) -> Result<Self, Self::Error> {
        let offline = payload.status == Some(DeviceStatus::Offline);
        let filled = offline
            && (payload.temperature.is_none()
                || payload.humidity.is_none()
                || payload.air_purity.is_none());
        let metric = |value: Option<f64>, name: &str| match value {
            Some(v) => Ok(v),
            None if offline => Ok(0.0),
            None => Err(EngineError::MalformedReading(format!("missing {name}"))),
        };

        Ok(Reading {
            temperature: metric(payload.temperature, "temperature")?,
            humidity: metric(payload.humidity, "humidity")?,
            air_purity: metric(payload.air_purity, "airPurity")?,
            // Placeholder zeros must never evaluate as a live reading
            timestamp: if filled { None } else { payload.timestamp },
            raw_status: payload.status,
        })
    }
}

/// Decode one reading from JSON bytes.
pub fn decode_reading(bytes: &[u8]) -> Result<Reading, EngineError> {
    let payload: ReadingPayload = serde_json::from_slice(bytes)
        .map_err(|e| EngineError::MalformedReading(e.to_string()))?;
    payload.try_into()
}

/// Decode one reading from an already-parsed JSON value.
pub fn decode_reading_value(value: Value) -> Result<Reading, EngineError> {
    let payload: ReadingPayload =
        serde_json::from_value(value).map_err(|e| EngineError::MalformedReading(e.to_string()))?;
    payload.try_into()
}

/// Build a historical set from a JSON object keyed by timestamp strings.
///
/// Entries that do not decode are dropped. Anything other than an object
/// yields an empty set.
pub fn decode_history(value: Value) -> HistoricalSet {
    let Value::Object(entries) = value else {
        debug!("Historical payload is not an object, ignoring");
        return HistoricalSet::new();
    };

    entries
        .into_iter()
        .filter_map(|(key, entry)| match decode_reading_value(entry) {
            Ok(reading) => Some((key, reading)),
            Err(e) => {
                let err = EngineError::MalformedHistoricalEntry {
                    key,
                    reason: e.to_string(),
                };
                debug!("Skipping {}", err);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::StatusTier;
    use crate::feed::Evaluator;
    use serde_json::json;

    #[test]
    fn accepts_both_air_purity_spellings() {
        let camel = decode_reading(br#"{"temperature":24.5,"humidity":68,"airPurity":85}"#).unwrap();
        let lower = decode_reading(br#"{"temperature":24.5,"humidity":68,"airpurity":85}"#).unwrap();
        assert_eq!(camel, lower);
        assert_eq!(camel.air_purity, 85.0);
    }

    #[test]
    fn keeps_timestamp_and_status() {
        let reading = decode_reading(
            br#"{"temperature":24.5,"humidity":68,"airPurity":85,"timestamp":1700000000,"status":"online"}"#,
        )
        .unwrap();
        assert_eq!(reading.timestamp, Some(RawTimestamp::Number(1_700_000_000.0)));
        assert_eq!(reading.raw_status, Some(DeviceStatus::Online));
        assert!(reading.instant().is_some());
    }

    #[test]
    fn null_timestamp_is_absent() {
        let reading =
            decode_reading(br#"{"temperature":1,"humidity":2,"airPurity":3,"timestamp":null}"#)
                .unwrap();
        assert_eq!(reading.timestamp, None);
    }

    #[test]
    fn offline_payload_may_omit_metrics() {
        let reading = decode_reading(br#"{"status":"offline","timestamp":"2024-03-01T10:00:00Z"}"#)
            .unwrap();
        assert_eq!(reading.temperature, 0.0);
        assert_eq!(reading.humidity, 0.0);
        assert_eq!(reading.air_purity, 0.0);
        assert_eq!(reading.timestamp, None);

        let now = "2024-03-01T10:00:30Z".parse().unwrap();
        assert_eq!(
            Evaluator::default().evaluate(Some(&reading), now).tier,
            StatusTier::Offline
        );
    }

    #[test]
    fn complete_offline_payload_keeps_its_timestamp() {
        let reading = decode_reading(
            br#"{"temperature":24,"humidity":68,"airPurity":85,"status":"offline","timestamp":"2024-03-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert!(reading.instant().is_some());
    }

    #[test]
    fn unknown_status_is_ignored() {
        let degraded = decode_reading(
            br#"{"temperature":24,"humidity":68,"airPurity":85,"timestamp":"2024-03-01T12:00:00Z","status":"degraded"}"#,
        )
        .unwrap();
        assert_eq!(degraded.raw_status, None);
        assert_eq!(degraded.temperature, 24.0);

        let capitalised = decode_reading(
            br#"{"temperature":24,"humidity":68,"airPurity":85,"status":"Online"}"#,
        )
        .unwrap();
        assert_eq!(capitalised.raw_status, Some(DeviceStatus::Online));

        let numeric =
            decode_reading(br#"{"temperature":24,"humidity":68,"airPurity":85,"status":1}"#).unwrap();
        assert_eq!(numeric.raw_status, None);
    }

    #[test]
    fn unknown_status_cannot_excuse_missing_metrics() {
        assert!(decode_reading(br#"{"status":"degraded"}"#).is_err());
    }

    #[test]
    fn online_payload_missing_metric_is_rejected() {
        let err = decode_reading(br#"{"temperature":24.5,"humidity":68}"#).unwrap_err();
        assert_eq!(err, EngineError::MalformedReading("missing airPurity".into()));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            decode_reading(b"not json"),
            Err(EngineError::MalformedReading(_))
        ));
        assert!(decode_reading(br#"{"temperature":"warm","humidity":1,"airPurity":1}"#).is_err());
    }

    #[test]
    fn history_drops_malformed_entries() {
        let set = decode_history(json!({
            "2024-03-01T10:00:00Z": {"temperature": 24.0, "humidity": 65.0, "airPurity": 80.0},
            "2024-03-01T11:00:00Z": {"temperature": 25.0, "humidity": 66.0, "airpurity": 81.0},
            "2024-03-01T12:00:00Z": "not an entry",
            "2024-03-01T13:00:00Z": {"temperature": 25.0},
        }));
        assert_eq!(set.len(), 2);
        assert_eq!(set["2024-03-01T11:00:00Z"].air_purity, 81.0);
    }

    #[test]
    fn history_must_be_an_object() {
        assert!(decode_history(json!([1, 2, 3])).is_empty());
        assert!(decode_history(Value::Null).is_empty());
    }
}
