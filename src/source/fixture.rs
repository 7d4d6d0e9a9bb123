//! Deterministic demo sources.
//!
//! These stand in for the realtime backend and the bulk store when no live
//! transport is configured. Values follow fixed waveforms so that runs are
//! reproducible under a [`ManualClock`](crate::feed::ManualClock).

use std::sync::Arc;
use std::time::Duration;

use chrono::SecondsFormat;

use super::{HistorySource, ReadingSource};
use crate::data::{DeviceStatus, HistoricalSet, Reading};
use crate::feed::Clock;

/// Demo readings cycled by [`FixtureSource`]: comfortable, warm, out of
/// range, slightly dry, and a dead sensor.
const DEMO_POINTS: [(f64, f64, f64); 5] = [
    (24.5, 68.0, 85.0),
    (26.2, 72.0, 78.0),
    (31.8, 58.0, 55.0),
    (23.1, 65.0, 82.0),
    (0.0, 0.0, 0.0),
];

/// Every this many updates the device reports itself offline.
const OFFLINE_EVERY: u64 = 10;

/// Default gap between two fixture readings.
pub const DEFAULT_FIXTURE_INTERVAL: Duration = Duration::from_secs(3);

/// Hours of generated history.
const HISTORY_HOURS: i64 = 30 * 24;

/// Every this many hours a historical entry is marked offline.
const HISTORY_OFFLINE_EVERY: i64 = 20;

/// Replays the demo readings, one per interval of the injected clock.
#[derive(Debug)]
pub struct FixtureSource {
    clock: Arc<dyn Clock>,
    interval: chrono::Duration,
    index: u64,
    last_emitted: Option<chrono::DateTime<chrono::Utc>>,
}

impl FixtureSource {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_interval(clock, DEFAULT_FIXTURE_INTERVAL)
    }

    pub fn with_interval(clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            clock,
            interval: chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::MAX),
            index: 0,
            last_emitted: None,
        }
    }

    /// The `index`-th demo reading, without a timestamp.
    ///
    /// Every tenth one is an offline report with zeroed metrics.
    pub fn demo_reading(index: u64) -> Reading {
        if index % OFFLINE_EVERY == OFFLINE_EVERY - 1 {
            return Reading::new(0.0, 0.0, 0.0).with_status(DeviceStatus::Offline);
        }

        let (t, h, a) = DEMO_POINTS[(index % DEMO_POINTS.len() as u64) as usize];
        let phase = index as f64;
        Reading::new(
            (t + (phase * 0.7).sin()).clamp(15.0, 40.0),
            (h + (phase * 1.3).sin() * 2.5).clamp(40.0, 90.0),
            (a + (phase * 0.4).sin() * 1.5).clamp(40.0, 100.0),
        )
        .with_status(DeviceStatus::Online)
    }
}

impl ReadingSource for FixtureSource {
    fn poll(&mut self) -> Option<Reading> {
        let now = self.clock.now();
        if let Some(last) = self.last_emitted {
            if now.signed_duration_since(last) < self.interval {
                return None;
            }
        }

        let reading = Self::demo_reading(self.index);
        // The dead-device reading carries no timestamp so it evaluates offline
        let reading = match reading.raw_status {
            Some(DeviceStatus::Offline) => reading,
            _ => reading.at(now),
        };
        self.index += 1;
        self.last_emitted = Some(now);
        Some(reading)
    }

    fn description(&self) -> &str {
        "fixture: demo readings"
    }

    fn error(&self) -> Option<String> {
        None
    }
}

/// Generates thirty days of hourly history ending at the clock's now.
#[derive(Debug)]
pub struct FixtureHistory {
    clock: Arc<dyn Clock>,
}

impl FixtureHistory {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl HistorySource for FixtureHistory {
    fn fetch(&mut self) -> Option<HistoricalSet> {
        let now = self.clock.now();
        let set = (0..HISTORY_HOURS)
            .map(|i| {
                let at = now - chrono::Duration::hours(i);
                let key = at.to_rfc3339_opts(SecondsFormat::Millis, true);
                let x = i as f64;
                let status = if i % HISTORY_OFFLINE_EVERY == HISTORY_OFFLINE_EVERY - 1 {
                    DeviceStatus::Offline
                } else {
                    DeviceStatus::Online
                };
                let reading = Reading::new(
                    (25.0 + (x * 0.2).sin() * 5.0).clamp(15.0, 35.0),
                    (65.0 + (x * 0.15 + 1.0).sin() * 15.0).clamp(40.0, 90.0),
                    (80.0 + (x * 0.1 + 2.0).sin() * 10.0).clamp(50.0, 100.0),
                )
                .at(key.as_str())
                .with_status(status);
                (key, reading)
            })
            .collect();
        Some(set)
    }

    fn description(&self) -> &str {
        "fixture: generated history"
    }
}
