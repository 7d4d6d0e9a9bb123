//! Live evaluation feed.
//!
//! [`LiveFeed`] fans raw readings out to any number of subscriptions. Each
//! subscription has its own inbox drained by a single worker task, so its
//! evaluations are serialized and its [`AlertState`] is only ever touched by
//! that task. Subscriptions never share state.
//!
//! ```text
//!  publish(reading)
//!        │
//!        ├──▶ inbox ──▶ worker ──▶ normalize ─▶ liveness ─▶ classify
//!        │                 │                                    │
//!        │                 │         snapshots ◀────────────────┤
//!        │                 │                                    ▼
//!        │                 └────────── alerts ◀──────── AlertDebouncer
//!        │
//!        └──▶ inbox ──▶ worker ──▶ ...
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::data::{
    AlertDebouncer, AlertEvent, AlertState, LivenessTracker, Reading, StatusTier,
    ThresholdClassifier,
};

/// Source of "now" for evaluation.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// The wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(start)),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.write() = at;
    }

    pub fn advance(&self, by: Duration) {
        let by = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
        let mut now = self.now.write();
        *now = now.checked_add_signed(by).unwrap_or(*now);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

/// What made the feed dispatch a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotCause {
    /// A raw reading event (or a missing reading) was published.
    #[default]
    Reading,
    /// An already-seen reading was re-evaluated because its tier changed
    /// with time alone. Not a new reading event.
    Refresh,
}

/// The outcome of evaluating one reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluatedSnapshot {
    /// `None` when no reading exists yet.
    pub reading: Option<Reading>,
    pub cause: SnapshotCause,
    pub tier: StatusTier,
    pub online: bool,
    /// The reading's normalized instant, if its timestamp was valid.
    pub reading_at: Option<DateTime<Utc>>,
    pub evaluated_at: DateTime<Utc>,
}

/// Stateless part of the pipeline: normalize, check liveness, classify.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Evaluator {
    tracker: LivenessTracker,
    classifier: ThresholdClassifier,
}

impl Evaluator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            tracker: LivenessTracker::new(config.liveness_window),
            classifier: ThresholdClassifier::new(config.thresholds),
        }
    }

    pub fn classifier(&self) -> &ThresholdClassifier {
        &self.classifier
    }

    pub fn tracker(&self) -> &LivenessTracker {
        &self.tracker
    }

    /// Evaluate a reading at `now`. A missing reading is offline.
    pub fn evaluate(&self, reading: Option<&Reading>, now: DateTime<Utc>) -> EvaluatedSnapshot {
        let reading_at = reading.and_then(Reading::instant);
        if let (Some(raw), None) = (reading.and_then(|r| r.timestamp.as_ref()), reading_at) {
            debug!("{}, treating as stale", EngineError::InvalidTimestamp(raw.to_string()));
        }
        let online = reading.is_some() && self.tracker.is_online(reading_at, now);
        let tier = match reading {
            Some(r) => self.classifier.classify(r, online),
            None => StatusTier::Offline,
        };
        EvaluatedSnapshot {
            reading: reading.cloned(),
            cause: SnapshotCause::Reading,
            tier,
            online,
            reading_at,
            evaluated_at: now,
        }
    }
}

/// One queued dispatch for a subscription.
#[derive(Debug, Clone)]
struct Event {
    reading: Option<Reading>,
    cause: SnapshotCause,
}

/// A subscriber's inbox as seen by the feed.
struct Inbox {
    id: u64,
    tx: mpsc::UnboundedSender<Event>,
}

/// Fans readings out to independent evaluating subscriptions.
pub struct LiveFeed {
    evaluator: Evaluator,
    debouncer: AlertDebouncer,
    clock: Arc<dyn Clock>,
    inboxes: Mutex<Vec<Inbox>>,
    next_id: AtomicU64,
}

impl LiveFeed {
    pub fn new(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            evaluator: Evaluator::new(&config),
            debouncer: AlertDebouncer::new(config.alert_cooldown),
            clock,
            inboxes: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Evaluate a reading against the current clock without dispatching it.
    pub fn evaluate(&self, reading: Option<&Reading>) -> EvaluatedSnapshot {
        self.evaluator.evaluate(reading, self.clock.now())
    }

    /// Open a subscription. Must be called from within a tokio runtime.
    ///
    /// With `alerts` set, danger evaluations are debounced against the
    /// subscription's own alert state and fired events are delivered on
    /// [`Subscription::alerts`].
    pub fn subscribe(&self, alerts: bool) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();
        let (alert_tx, alert_rx) = if alerts {
            let (tx, rx) = mpsc::unbounded_channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };
        let (stop_tx, stop_rx) = watch::channel(false);
        let latest = Arc::new(RwLock::new(None));

        let worker = Worker {
            id,
            evaluator: self.evaluator,
            debouncer: self.debouncer,
            clock: self.clock.clone(),
            snapshots: snapshot_tx,
            alerts: alert_tx,
            latest: latest.clone(),
            alert_state: AlertState::default(),
        };
        let task = tokio::spawn(worker.run(inbox_rx, stop_rx));

        self.inboxes.lock().push(Inbox { id, tx: inbox_tx });
        info!("Subscription {} opened (alerts: {})", id, alerts);

        Subscription {
            snapshots: snapshot_rx,
            alerts: alert_rx,
            handle: SubscriptionHandle {
                id,
                stop: stop_tx,
                task: Mutex::new(Some(task)),
                latest,
            },
        }
    }

    /// Dispatch one reading event to every open subscription.
    ///
    /// `None` means the source has no reading; subscribers receive an
    /// offline snapshot. Returns the number of subscriptions the event was
    /// queued for. Cancelled subscriptions are pruned here.
    pub fn publish(&self, reading: Option<Reading>) -> usize {
        self.dispatch(Event {
            reading,
            cause: SnapshotCause::Reading,
        })
    }

    /// Re-dispatch a reading that was already published, for a tier change
    /// caused by time alone. Snapshots carry [`SnapshotCause::Refresh`].
    pub fn republish(&self, reading: Option<Reading>) -> usize {
        self.dispatch(Event {
            reading,
            cause: SnapshotCause::Refresh,
        })
    }

    fn dispatch(&self, event: Event) -> usize {
        let mut inboxes = self.inboxes.lock();
        inboxes.retain(|inbox| {
            let open = inbox.tx.send(event.clone()).is_ok();
            if !open {
                debug!("Pruning closed subscription {}", inbox.id);
            }
            open
        });
        inboxes.len()
    }

    /// Number of subscriptions that were open at the last publish.
    pub fn subscriber_count(&self) -> usize {
        self.inboxes.lock().iter().filter(|i| !i.tx.is_closed()).count()
    }
}

impl fmt::Debug for LiveFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveFeed")
            .field("evaluator", &self.evaluator)
            .field("debouncer", &self.debouncer)
            .field("subscribers", &self.inboxes.lock().len())
            .finish()
    }
}

/// The consumer side of a subscription.
#[derive(Debug)]
pub struct Subscription {
    /// One snapshot per published event, in publish order.
    pub snapshots: mpsc::UnboundedReceiver<EvaluatedSnapshot>,
    /// Fired alerts; `None` when the subscription did not opt in.
    pub alerts: Option<mpsc::UnboundedReceiver<AlertEvent>>,
    pub handle: SubscriptionHandle,
}

impl Subscription {
    /// Wait for the next snapshot.
    ///
    /// Fails with [`EngineError::SubscriptionCancelled`] once the
    /// subscription has stopped and every delivered snapshot was received.
    pub async fn recv(&mut self) -> Result<EvaluatedSnapshot, EngineError> {
        self.snapshots
            .recv()
            .await
            .ok_or(EngineError::SubscriptionCancelled)
    }
}

/// Control handle for a subscription.
///
/// Dropping the handle also stops the subscription.
#[derive(Debug)]
pub struct SubscriptionHandle {
    id: u64,
    stop: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
    latest: Arc<RwLock<Option<EvaluatedSnapshot>>>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The most recently dispatched snapshot.
    pub fn latest(&self) -> Option<EvaluatedSnapshot> {
        self.latest.read().clone()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.stop.borrow()
    }

    /// Stop the subscription.
    ///
    /// New publishes are refused from this point. Readings the subscription
    /// had already accepted are still evaluated and dispatched. Resolves once
    /// the worker has drained them and exited, after which nothing more is
    /// dispatched. Calling it again is a no-op.
    pub async fn cancel(&self) {
        let _ = self.stop.send(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
            debug!("Subscription {} cancelled", self.id);
        }
    }
}

/// Owns everything mutable about one subscription.
struct Worker {
    id: u64,
    evaluator: Evaluator,
    debouncer: AlertDebouncer,
    clock: Arc<dyn Clock>,
    snapshots: mpsc::UnboundedSender<EvaluatedSnapshot>,
    alerts: Option<mpsc::UnboundedSender<AlertEvent>>,
    latest: Arc<RwLock<Option<EvaluatedSnapshot>>>,
    alert_state: AlertState,
}

impl Worker {
    async fn run(
        mut self,
        mut inbox: mpsc::UnboundedReceiver<Event>,
        mut stop: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                biased;
                // Fires on cancel and when the handle is dropped
                _ = stop.changed() => {
                    // Refuse new events, then drain the accepted ones
                    inbox.close();
                    while let Some(event) = inbox.recv().await {
                        if !self.dispatch(event) {
                            break;
                        }
                    }
                    break;
                }
                event = inbox.recv() => match event {
                    Some(event) => {
                        if !self.dispatch(event) {
                            debug!("Subscription {} consumer dropped, stopping", self.id);
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
    }

    /// Evaluate and deliver one event. Returns false once the consumer is gone.
    fn dispatch(&mut self, event: Event) -> bool {
        let now = self.clock.now();
        let mut snapshot = self.evaluator.evaluate(event.reading.as_ref(), now);
        snapshot.cause = event.cause;
        let tier = snapshot.tier;

        *self.latest.write() = Some(snapshot.clone());
        if self.snapshots.send(snapshot).is_err() {
            return false;
        }

        if let Some(alerts) = &self.alerts {
            let (fire, next) = self.debouncer.should_alert(tier, self.alert_state, now);
            self.alert_state = next;
            if fire {
                warn!("Subscription {}: {} alert at {}", self.id, tier, now);
                let _ = alerts.send(AlertEvent { tier, at: now });
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DeviceStatus;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn feed() -> (LiveFeed, ManualClock) {
        let clock = ManualClock::new(start());
        let feed = LiveFeed::new(EngineConfig::default(), Arc::new(clock.clone()));
        (feed, clock)
    }

    fn fresh(clock: &ManualClock, t: f64, h: f64, a: f64) -> Reading {
        Reading::new(t, h, a).at(clock.now())
    }

    #[tokio::test]
    async fn every_reading_yields_one_snapshot_in_order() {
        let (feed, clock) = feed();
        let mut sub = feed.subscribe(false);

        assert_eq!(feed.publish(Some(fresh(&clock, 24.0, 68.0, 85.0))), 1);
        feed.publish(Some(fresh(&clock, 19.0, 70.0, 70.0)));
        feed.publish(Some(fresh(&clock, 17.0, 70.0, 70.0)));

        let tiers: Vec<StatusTier> = [
            sub.snapshots.recv().await.unwrap(),
            sub.snapshots.recv().await.unwrap(),
            sub.snapshots.recv().await.unwrap(),
        ]
        .iter()
        .map(|s| s.tier)
        .collect();
        assert_eq!(
            tiers,
            vec![StatusTier::Normal, StatusTier::Warning, StatusTier::Danger]
        );
        assert!(sub.snapshots.try_recv().is_err());
        assert_eq!(sub.handle.latest().unwrap().tier, StatusTier::Danger);
    }

    #[tokio::test]
    async fn stale_or_missing_timestamps_are_offline() {
        let (feed, clock) = feed();
        let mut sub = feed.subscribe(false);

        let stale = Reading::new(24.0, 68.0, 85.0).at(start() - chrono::Duration::minutes(10));
        feed.publish(Some(stale));
        let snapshot = sub.snapshots.recv().await.unwrap();
        assert_eq!(snapshot.tier, StatusTier::Offline);
        assert!(!snapshot.online);

        feed.publish(Some(Reading::new(24.0, 68.0, 85.0)));
        assert_eq!(sub.snapshots.recv().await.unwrap().tier, StatusTier::Offline);

        // Reported status is advisory: a fresh timestamp wins
        let claims_offline = fresh(&clock, 24.0, 68.0, 85.0).with_status(DeviceStatus::Offline);
        feed.publish(Some(claims_offline));
        assert_eq!(sub.snapshots.recv().await.unwrap().tier, StatusTier::Normal);
    }

    #[tokio::test]
    async fn missing_reading_is_offline_snapshot() {
        let (feed, _clock) = feed();
        let mut sub = feed.subscribe(false);

        feed.publish(None);
        let snapshot = sub.snapshots.recv().await.unwrap();
        assert_eq!(snapshot.tier, StatusTier::Offline);
        assert!(snapshot.reading.is_none());
        assert_eq!(snapshot.evaluated_at, start());
    }

    #[tokio::test]
    async fn alerts_respect_cooldown() {
        let (feed, clock) = feed();
        let mut sub = feed.subscribe(true);
        let mut alerts = sub.alerts.take().unwrap();

        feed.publish(Some(fresh(&clock, 35.0, 70.0, 70.0)));
        sub.snapshots.recv().await.unwrap();
        assert_eq!(
            alerts.recv().await.unwrap(),
            AlertEvent {
                tier: StatusTier::Danger,
                at: start()
            }
        );

        clock.advance(Duration::from_secs(120));
        feed.publish(Some(fresh(&clock, 35.0, 70.0, 70.0)));
        sub.snapshots.recv().await.unwrap();
        assert!(alerts.try_recv().is_err());

        clock.advance(Duration::from_secs(240));
        feed.publish(Some(fresh(&clock, 35.0, 70.0, 70.0)));
        sub.snapshots.recv().await.unwrap();
        assert_eq!(alerts.recv().await.unwrap().at, clock.now());
    }

    #[tokio::test]
    async fn subscriptions_keep_independent_alert_state() {
        let (feed, clock) = feed();
        let mut first = feed.subscribe(true);

        feed.publish(Some(fresh(&clock, 10.0, 70.0, 70.0)));
        first.snapshots.recv().await.unwrap();
        assert!(first.alerts.as_mut().unwrap().recv().await.is_some());

        let mut second = feed.subscribe(true);
        clock.advance(Duration::from_secs(60));
        assert_eq!(feed.publish(Some(fresh(&clock, 10.0, 70.0, 70.0))), 2);

        first.snapshots.recv().await.unwrap();
        second.snapshots.recv().await.unwrap();
        assert!(first.alerts.as_mut().unwrap().try_recv().is_err());
        assert!(second.alerts.as_mut().unwrap().recv().await.is_some());
    }

    #[tokio::test]
    async fn non_alerting_subscription_has_no_alert_channel() {
        let (feed, _clock) = feed();
        let sub = feed.subscribe(false);
        assert!(sub.alerts.is_none());
    }

    #[tokio::test]
    async fn cancel_is_idempotent_and_stops_dispatch() {
        let (feed, clock) = feed();
        let mut sub = feed.subscribe(false);

        feed.publish(Some(fresh(&clock, 24.0, 68.0, 85.0)));
        let delivered = sub.snapshots.recv().await.unwrap();

        sub.handle.cancel().await;
        sub.handle.cancel().await;
        assert!(sub.handle.is_cancelled());

        assert_eq!(feed.publish(Some(fresh(&clock, 17.0, 68.0, 85.0))), 0);
        assert_eq!(sub.recv().await, Err(EngineError::SubscriptionCancelled));
        assert_eq!(sub.handle.latest(), Some(delivered));
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn cancel_drains_accepted_readings() {
        let (feed, clock) = feed();
        let mut sub = feed.subscribe(false);

        let accepted = [17.0, 24.0, 19.0]
            .iter()
            .map(|&t| feed.publish(Some(fresh(&clock, t, 68.0, 85.0))))
            .sum::<usize>();
        assert_eq!(accepted, 3);

        sub.handle.cancel().await;
        assert_eq!(feed.publish(Some(fresh(&clock, 24.0, 68.0, 85.0))), 0);

        let mut tiers = Vec::new();
        while let Ok(snapshot) = sub.recv().await {
            tiers.push(snapshot.tier);
        }
        assert_eq!(
            tiers,
            vec![StatusTier::Danger, StatusTier::Normal, StatusTier::Warning]
        );
        assert_eq!(sub.handle.latest().unwrap().tier, StatusTier::Warning);
    }

    #[tokio::test]
    async fn republished_snapshots_are_marked_refresh() {
        let (feed, clock) = feed();
        let mut sub = feed.subscribe(false);
        let reading = fresh(&clock, 24.0, 68.0, 85.0);

        feed.publish(Some(reading.clone()));
        clock.advance(Duration::from_secs(400));
        feed.republish(Some(reading));

        let first = sub.recv().await.unwrap();
        let second = sub.recv().await.unwrap();
        assert_eq!(first.cause, SnapshotCause::Reading);
        assert_eq!(second.cause, SnapshotCause::Refresh);
        assert_eq!(second.tier, StatusTier::Offline);
    }

    #[tokio::test]
    async fn dropping_a_subscription_prunes_it() {
        let (feed, clock) = feed();
        let sub = feed.subscribe(false);
        let mut kept = feed.subscribe(false);
        drop(sub);

        // Let the dropped worker observe its handle going away
        tokio::task::yield_now().await;
        feed.publish(Some(fresh(&clock, 24.0, 68.0, 85.0)));
        assert!(kept.snapshots.recv().await.is_some());
    }

    #[test]
    fn evaluator_applies_configured_window() {
        let config = EngineConfig {
            liveness_window: Duration::from_secs(30),
            ..EngineConfig::default()
        };
        let evaluator = Evaluator::new(&config);
        let reading = Reading::new(24.0, 68.0, 85.0).at(start() - chrono::Duration::seconds(45));
        assert_eq!(
            evaluator.evaluate(Some(&reading), start()).tier,
            StatusTier::Offline
        );
        assert_eq!(
            Evaluator::default().evaluate(Some(&reading), start()).tier,
            StatusTier::Normal
        );
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(start());
        let other = clock.clone();
        clock.advance(Duration::from_secs(90));
        assert_eq!(other.now(), start() + chrono::Duration::seconds(90));
    }
}
