//! Application orchestration.
//!
//! [`App`] connects a backend's sources to a [`LiveFeed`]: it drains the
//! reading source into the feed, re-publishes when a quiet device crosses
//! the liveness window, and answers history and last-seen queries.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::data::{
    describe_last_seen, last_seen_estimate, HistoryPoint, HistoryWindow, Metric, RangeSelector,
    Reading, SeriesPoint, StatusTier,
};
use crate::error::EngineError;
use crate::feed::{EvaluatedSnapshot, LiveFeed, SnapshotCause};
use crate::source::{HistorySource, ReadingSource, SourcePair};

/// Main application state.
pub struct App {
    readings: Box<dyn ReadingSource>,
    history: Box<dyn HistorySource>,
    feed: Arc<LiveFeed>,
    last_reading: Option<Reading>,
    /// Tier of the last event published to the feed.
    last_tier: Option<StatusTier>,
    pub load_error: Option<String>,
}

impl App {
    pub fn new(sources: SourcePair, feed: Arc<LiveFeed>) -> Self {
        let (readings, history) = sources;
        Self {
            readings,
            history,
            feed,
            last_reading: None,
            last_tier: None,
            load_error: None,
        }
    }

    pub fn feed(&self) -> &Arc<LiveFeed> {
        &self.feed
    }

    pub fn source_description(&self) -> &str {
        self.readings.description()
    }

    /// Drain the reading source into the feed.
    ///
    /// Returns the number of readings published.
    pub fn pump(&mut self) -> usize {
        let mut published = 0;
        while let Some(reading) = self.readings.poll() {
            self.last_tier = Some(self.feed.evaluate(Some(&reading)).tier);
            self.feed.publish(Some(reading.clone()));
            self.last_reading = Some(reading);
            published += 1;
        }

        let error = self.readings.error();
        if error != self.load_error {
            if let Some(err) = &error {
                warn!("{}: {}", self.readings.description(), err);
            }
            self.load_error = error;
        }
        published
    }

    /// Re-publish the last reading if its tier has changed with time alone.
    ///
    /// This is how subscribers learn that a silent device went offline. The
    /// snapshots are tick events marked [`SnapshotCause::Refresh`], not new
    /// reading events. Before any reading arrives the first call publishes a
    /// missing reading, which is a reading event.
    pub fn refresh(&mut self) -> bool {
        let tier = self.feed.evaluate(self.last_reading.as_ref()).tier;
        if self.last_tier == Some(tier) {
            return false;
        }
        if self.last_reading.is_none() {
            debug!("{}, publishing {}", EngineError::MissingReading, tier);
        } else {
            debug!("Tier changed to {} without a new reading", tier);
        }
        self.last_tier = Some(tier);
        match &self.last_reading {
            Some(reading) => self.feed.republish(Some(reading.clone())),
            None => self.feed.publish(None),
        };
        true
    }

    /// Pump every `poll_interval` until `shutdown` flips to true or its
    /// sender is dropped. Returns the number of readings published.
    pub async fn run(&mut self, poll_interval: Duration, mut shutdown: watch::Receiver<bool>) -> usize {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut total = 0;

        info!("Polling {} every {:?}", self.readings.description(), poll_interval);
        while !*shutdown.borrow() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let published = self.pump();
                    if published == 0 {
                        self.refresh();
                    }
                    total += published;
                }
            }
        }
        info!("Stopped after {} readings", total);
        total
    }

    /// The last received reading evaluated against the current clock.
    pub fn latest(&self) -> EvaluatedSnapshot {
        self.feed.evaluate(self.last_reading.as_ref())
    }

    /// Historical entries within `selector`, oldest first.
    ///
    /// `None` when the history source cannot provide a set.
    pub fn history(&mut self, selector: RangeSelector) -> Option<Vec<HistoryPoint>> {
        let Some(set) = self.history.fetch() else {
            warn!("No history available from {}", self.history.description());
            return None;
        };
        let now = self.feed.clock().now();
        Some(HistoryWindow::new(selector).filter(&set, now))
    }

    /// One metric of the windowed history, labelled for charting.
    pub fn series(&mut self, selector: RangeSelector, metric: Metric) -> Option<Vec<SeriesPoint>> {
        let points = self.history(selector)?;
        Some(HistoryWindow::new(selector).series(&points, metric))
    }

    /// When the device was last seen.
    ///
    /// Prefers the live reading's timestamp and falls back to the newest
    /// historical entry.
    pub fn last_seen(&mut self) -> Option<DateTime<Utc>> {
        if let Some(at) = self.last_reading.as_ref().and_then(Reading::instant) {
            return Some(at);
        }
        self.history.fetch().and_then(|set| last_seen_estimate(&set))
    }

    /// [`last_seen`](Self::last_seen) rendered as "Just now", "5m ago", etc.
    pub fn last_seen_text(&mut self) -> String {
        let now = self.feed.clock().now();
        describe_last_seen(self.last_seen(), now)
    }
}
