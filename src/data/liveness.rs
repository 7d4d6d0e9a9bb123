//! Online/offline detection from reading age.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Default window within which a reading counts as live.
pub const DEFAULT_LIVENESS_WINDOW: Duration = Duration::from_secs(300);

/// Derives device liveness from the age of its last reading.
///
/// This is the only authority on online/offline. A status field sent with
/// a reading is never consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessTracker {
    window: Duration,
}

impl Default for LivenessTracker {
    fn default() -> Self {
        Self::new(DEFAULT_LIVENESS_WINDOW)
    }
}

impl LivenessTracker {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Online iff `now - last_reading < window`.
    ///
    /// An invalid (missing) instant is never online. Readings stamped in the
    /// future have a negative age and count as online.
    pub fn is_online(&self, last_reading: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let Some(last) = last_reading else {
            return false;
        };
        let Ok(window) = chrono::Duration::from_std(self.window) else {
            return true;
        };
        now.signed_duration_since(last) < window
    }
}

/// Human-readable "last seen" text.
pub fn describe_last_seen(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(last) = last else {
        return "Never".to_string();
    };

    let minutes = now.signed_duration_since(last).num_milliseconds().div_euclid(60_000);
    let hours = minutes.div_euclid(60);
    let days = hours.div_euclid(24);

    if minutes < 1 {
        "Just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if hours < 24 {
        format!("{}h ago", hours)
    } else {
        format!("{}d ago", days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn invalid_timestamp_is_offline() {
        assert!(!LivenessTracker::default().is_online(None, now()));
    }

    #[test]
    fn recent_reading_is_online() {
        let tracker = LivenessTracker::default();
        let last = now() - chrono::Duration::seconds(299);
        assert!(tracker.is_online(Some(last), now()));
    }

    #[test]
    fn window_boundary_is_offline() {
        let tracker = LivenessTracker::default();
        let last = now() - chrono::Duration::seconds(300);
        assert!(!tracker.is_online(Some(last), now()));
    }

    #[test]
    fn window_is_configurable() {
        let tracker = LivenessTracker::new(Duration::from_secs(60));
        let last = now() - chrono::Duration::seconds(90);
        assert!(!tracker.is_online(Some(last), now()));
        assert!(LivenessTracker::default().is_online(Some(last), now()));
    }

    #[test]
    fn future_reading_is_online() {
        let last = now() + chrono::Duration::seconds(30);
        assert!(LivenessTracker::default().is_online(Some(last), now()));
    }

    #[test]
    fn last_seen_text() {
        let ago = |secs: i64| Some(now() - chrono::Duration::seconds(secs));
        assert_eq!(describe_last_seen(None, now()), "Never");
        assert_eq!(describe_last_seen(ago(30), now()), "Just now");
        assert_eq!(describe_last_seen(ago(5 * 60), now()), "5m ago");
        assert_eq!(describe_last_seen(ago(3 * 3600 + 59), now()), "3h ago");
        assert_eq!(describe_last_seen(ago(2 * 86_400), now()), "2d ago");
    }
}
