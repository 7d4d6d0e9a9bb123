//! # hivewatch
//!
//! Evaluation and windowing engine for a monitored hive enclosure.
//!
//! Raw readings (temperature, humidity, air purity) arrive from a realtime
//! backend with loosely formatted timestamps. The engine normalizes them,
//! decides whether the device is live, classifies each reading into a
//! status tier, debounces danger alerts per subscriber, and windows the
//! historical set for charting.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Application                          │
//! │  ┌─────────┐    ┌──────────┐    ┌──────────┐                 │
//! │  │ source  │───▶│   app    │───▶│   feed   │──▶ subscribers  │
//! │  │ (input) │    │ (pump)   │    │(dispatch)│                 │
//! │  └─────────┘    └────┬─────┘    └────┬─────┘                 │
//! │       ▲              │               │                       │
//! │       │              ▼               ▼                       │
//! │  Stream | Channel   history     ┌──────────┐                 │
//! │  File   | Fixture   windows ───▶│   data   │ (pure rules)    │
//! │                                 └──────────┘                 │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`data`]**: Pure models and rules: timestamps, liveness, thresholds,
//!   alert debouncing and history windows
//! - **[`feed`]**: [`LiveFeed`] and its independent, cancellable subscriptions
//! - **[`source`]**: [`ReadingSource`] and [`HistorySource`] with stream,
//!   channel, file and fixture implementations
//! - **[`app`]**: Drives a backend's sources into the feed
//! - **[`config`]**: Layered settings and the injected [`EngineConfig`]
//!
//! ## Usage
//!
//! ### Evaluating readings
//!
//! ```
//! use std::sync::Arc;
//! use hivewatch::{EngineConfig, LiveFeed, Reading, StatusTier, SystemClock};
//!
//! # tokio_test::block_on(async {
//! let feed = LiveFeed::new(EngineConfig::default(), Arc::new(SystemClock));
//! let mut sub = feed.subscribe(true);
//!
//! feed.publish(Some(Reading::new(31.8, 58.0, 55.0).at(chrono::Utc::now())));
//! let snapshot = sub.snapshots.recv().await.unwrap();
//! assert_eq!(snapshot.tier, StatusTier::Danger);
//!
//! sub.handle.cancel().await;
//! # });
//! ```
//!
//! ### Windowing history
//!
//! ```
//! use hivewatch::{HistoricalSet, HistoryWindow, RangeSelector, Reading};
//!
//! let mut set = HistoricalSet::new();
//! set.insert("2024-03-01 10:00:00".to_string(), Reading::new(24.0, 65.0, 80.0));
//!
//! let now = "2024-03-01T12:00:00Z".parse().unwrap();
//! let points = HistoryWindow::new(RangeSelector::Day).filter(&set, now);
//! assert_eq!(points.len(), 1);
//! ```

pub mod app;
pub mod config;
pub mod data;
pub mod error;
pub mod feed;
pub mod source;

pub use app::App;
pub use config::{EngineConfig, Settings};
pub use data::{
    AlertEvent, HistoricalSet, HistoryPoint, HistoryWindow, Metric, RangeSelector, Reading,
    StatusTier, ThresholdClassifier, Thresholds,
};
pub use error::EngineError;
pub use feed::{
    Clock, EvaluatedSnapshot, LiveFeed, ManualClock, SnapshotCause, Subscription,
    SubscriptionHandle, SystemClock,
};
pub use source::{
    Backend, ChannelSource, FileSource, FixtureHistory, FixtureSource, HistorySource,
    ReadingSource, StreamSource,
};
