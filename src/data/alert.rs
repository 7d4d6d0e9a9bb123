//! Danger alert debouncing.
//!
//! The cooldown is anchored to the last emitted alert, not to tier
//! transitions: dropping back to normal does not reset it, so a sensor
//! flapping in and out of danger alerts at most once per cooldown.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::StatusTier;

/// Default minimum gap between two fired alerts.
pub const DEFAULT_ALERT_COOLDOWN: Duration = Duration::from_secs(300);

/// Per-subscription alert bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertState {
    /// When the last alert fired. Never moves backward once set.
    pub last_alert_at: Option<DateTime<Utc>>,
}

/// A fired alert, handed to the notification transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub tier: StatusTier,
    pub at: DateTime<Utc>,
}

/// Decides whether a danger evaluation should fire a new alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertDebouncer {
    cooldown: Duration,
}

impl Default for AlertDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_COOLDOWN)
    }
}

impl AlertDebouncer {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Returns whether to fire and the state to keep.
    ///
    /// Fires only for `Danger` when no alert has fired yet or strictly more
    /// than the cooldown has elapsed since the last one. Any other outcome
    /// returns the state unchanged.
    pub fn should_alert(
        &self,
        tier: StatusTier,
        state: AlertState,
        now: DateTime<Utc>,
    ) -> (bool, AlertState) {
        if tier != StatusTier::Danger {
            return (false, state);
        }

        let cooled_down = match state.last_alert_at {
            None => true,
            Some(last) => match chrono::Duration::from_std(self.cooldown) {
                Ok(cooldown) => now.signed_duration_since(last) > cooldown,
                Err(_) => false,
            },
        };

        if cooled_down {
            (
                true,
                AlertState {
                    last_alert_at: Some(now),
                },
            )
        } else {
            (false, state)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn minutes_ago(m: i64) -> AlertState {
        AlertState {
            last_alert_at: Some(now() - chrono::Duration::minutes(m)),
        }
    }

    #[test]
    fn first_danger_fires() {
        let (fire, next) = AlertDebouncer::default().should_alert(
            StatusTier::Danger,
            AlertState::default(),
            now(),
        );
        assert!(fire);
        assert_eq!(next.last_alert_at, Some(now()));
    }

    #[test]
    fn danger_within_cooldown_is_suppressed() {
        let state = minutes_ago(2);
        let (fire, next) = AlertDebouncer::default().should_alert(StatusTier::Danger, state, now());
        assert!(!fire);
        assert_eq!(next, state);
    }

    #[test]
    fn danger_after_cooldown_fires() {
        let (fire, next) =
            AlertDebouncer::default().should_alert(StatusTier::Danger, minutes_ago(6), now());
        assert!(fire);
        assert_eq!(next.last_alert_at, Some(now()));
    }

    #[test]
    fn exact_cooldown_does_not_fire() {
        let (fire, _) =
            AlertDebouncer::default().should_alert(StatusTier::Danger, minutes_ago(5), now());
        assert!(!fire);
    }

    #[test]
    fn other_tiers_never_fire_or_touch_state() {
        let debouncer = AlertDebouncer::default();
        for tier in [StatusTier::Normal, StatusTier::Warning, StatusTier::Offline] {
            let (fire, next) = debouncer.should_alert(tier, AlertState::default(), now());
            assert!(!fire);
            assert_eq!(next, AlertState::default());

            let (fire, next) = debouncer.should_alert(tier, minutes_ago(60), now());
            assert!(!fire);
            assert_eq!(next, minutes_ago(60));
        }
    }

    #[test]
    fn flapping_keeps_original_cooldown_clock() {
        let debouncer = AlertDebouncer::default();
        let t0 = now();
        let step = |m: i64| t0 + chrono::Duration::minutes(m);

        let (fired, state) = debouncer.should_alert(StatusTier::Danger, AlertState::default(), t0);
        assert!(fired);
        let (_, state) = debouncer.should_alert(StatusTier::Normal, state, step(1));
        let (fired, state) = debouncer.should_alert(StatusTier::Danger, state, step(2));
        assert!(!fired);
        let (_, state) = debouncer.should_alert(StatusTier::Normal, state, step(3));
        let (fired, state) = debouncer.should_alert(StatusTier::Danger, state, step(6));
        assert!(fired);
        assert_eq!(state.last_alert_at, Some(step(6)));
    }

    #[test]
    fn clock_going_backward_never_rewinds_state() {
        let state = AlertState {
            last_alert_at: Some(now()),
        };
        let earlier = now() - chrono::Duration::minutes(30);
        let (fire, next) = AlertDebouncer::default().should_alert(StatusTier::Danger, state, earlier);
        assert!(!fire);
        assert_eq!(next, state);
    }
}
