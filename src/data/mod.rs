//! Data models and evaluation rules for sensor readings.
//!
//! Everything here is pure: no IO, no clocks, no shared state. The live
//! feed and the application layer supply `now` and the configuration.
//!
//! ## Submodules
//!
//! - [`timestamp`]: Normalization of heterogeneous timestamps to UTC instants
//! - [`reading`]: The [`Reading`] model and the [`Metric`] accessors
//! - [`liveness`]: Online/offline detection from reading age
//! - [`status`]: Threshold classification into a [`StatusTier`]
//! - [`alert`]: Cooldown-based debouncing of danger alerts
//! - [`history`]: Range filtering and series extraction for charts
//! - [`duration`]: Parsing and formatting of duration strings (e.g., "5m", "300s")
//!
//! ## Data Flow
//!
//! ```text
//! Reading (raw timestamp)
//!        │
//!        ▼
//! timestamp::normalize() ──▶ LivenessTracker::is_online()
//!                                    │
//!                                    ▼
//!                     ThresholdClassifier::classify() ──▶ StatusTier
//!                                    │
//!                                    └──▶ AlertDebouncer::should_alert()
//!
//! HistoricalSet ──▶ HistoryWindow::filter() ──▶ HistoryWindow::series()
//! ```

pub mod alert;
pub mod duration;
pub mod history;
pub mod liveness;
pub mod reading;
pub mod status;
pub mod timestamp;

pub use alert::{AlertDebouncer, AlertEvent, AlertState};
pub use history::{
    last_seen_estimate, HistoricalSet, HistoryPoint, HistoryWindow, RangeSelector, SeriesPoint,
};
pub use liveness::{describe_last_seen, LivenessTracker};
pub use reading::{DeviceStatus, Metric, Reading};
pub use status::{Bounds, StatusTier, ThresholdClassifier, Thresholds};
pub use timestamp::{normalize, RawTimestamp};
