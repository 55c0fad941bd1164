//! Per-location refresh polling.
//!
//! The scheduler owns one background task per observed
//! `(usage type, grid cell)` pair. Each task fetches immediately, then again
//! on every tick of its interval. A successful fetch is written to the cache
//! and pushed to every subscriber of the pair; a failed fetch is logged and
//! leaves the cache and the subscribers untouched until the next tick.
//!
//! Subscribing to a pair that is already being polled attaches to the running
//! task and does not trigger another fetch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use skycast_types::{CacheEntry, CacheKey, UsageType};

use crate::cache::ForecastCache;
use crate::error::{Error, Result};
use crate::events::{EventDispatcher, ForecastEvent};
use crate::freshness::{
    DEFAULT_DERIVATION_WINDOW, DEFAULT_FUTURE_TOLERANCE, DEFAULT_MOMENTUM_MAX_AGE,
    FreshnessPolicy,
};
use crate::metrics::{FetchMetrics, NetworkUsage};
use crate::traits::WeatherSource;

/// Default refresh interval (15 minutes).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(900);

/// Default capacity of the event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Tuning for the forecast model.
///
/// ```
/// use std::time::Duration;
/// use skycast_core::PollConfig;
///
/// let config = PollConfig::default().poll_interval(Duration::from_secs(600));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Time between refreshes of one pair. Applies to both usage types.
    pub poll_interval: Duration,
    /// Maximum age of a momentum snapshot served from cache.
    pub momentum_max_age: Duration,
    /// Window around "now" searched when deriving momentum from the series.
    pub derivation_window: Duration,
    /// How far in the future a derived slot may lie.
    pub future_tolerance: Duration,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            momentum_max_age: DEFAULT_MOMENTUM_MAX_AGE,
            derivation_window: DEFAULT_DERIVATION_WINDOW,
            future_tolerance: DEFAULT_FUTURE_TOLERANCE,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl PollConfig {
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn momentum_max_age(mut self, age: Duration) -> Self {
        self.momentum_max_age = age;
        self
    }

    #[must_use]
    pub fn derivation_window(mut self, window: Duration) -> Self {
        self.derivation_window = window;
        self
    }

    #[must_use]
    pub fn future_tolerance(mut self, tolerance: Duration) -> Self {
        self.future_tolerance = tolerance;
        self
    }

    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// The freshness thresholds carried by this config.
    pub fn freshness_policy(&self) -> FreshnessPolicy {
        FreshnessPolicy {
            momentum_max_age: self.momentum_max_age,
            derivation_window: self.derivation_window,
            future_tolerance: self.future_tolerance,
        }
    }

    /// Validate the config.
    ///
    /// Checks that:
    /// - `poll_interval` is > 0
    /// - `momentum_max_age` and `derivation_window` are > 0
    /// - `event_capacity` is > 0
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::invalid_config("poll_interval must be > 0"));
        }
        if self.momentum_max_age.is_zero() {
            return Err(Error::invalid_config("momentum_max_age must be > 0"));
        }
        if self.derivation_window.is_zero() {
            return Err(Error::invalid_config("derivation_window must be > 0"));
        }
        if self.event_capacity == 0 {
            return Err(Error::invalid_config("event_capacity must be > 0"));
        }
        Ok(())
    }
}

type Subscribers = Arc<Mutex<Vec<watch::Sender<Option<CacheEntry>>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A running poll task for one pair.
struct PollHandle {
    task: JoinHandle<()>,
    cancel: CancellationToken,
    subscribers: Subscribers,
}

impl PollHandle {
    fn stop(self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

/// State shared between the scheduler and its poll tasks.
struct Shared {
    source: Arc<dyn WeatherSource>,
    cache: ForecastCache,
    network: NetworkUsage,
    metrics: FetchMetrics,
    events: EventDispatcher,
}

impl Shared {
    async fn fetch(&self, key: CacheKey) -> Result<CacheEntry> {
        let _in_flight = self.network.begin();
        let coordinate = key.coordinate();
        let started = Instant::now();

        debug!("Fetching {} from {}", key, self.source.name());
        let result = match key.usage {
            UsageType::Momentum => self
                .source
                .fetch_current(coordinate)
                .await
                .map(CacheEntry::Momentum),
            UsageType::LongTerm => self
                .source
                .fetch_forecast_series(coordinate)
                .await
                .map(CacheEntry::long_term),
        };

        let counters = self.metrics.for_usage(key.usage);
        match &result {
            Ok(_) => counters.record_success(started.elapsed()),
            Err(_) => counters.record_failure(started.elapsed()),
        }
        result
    }

    fn publish(&self, key: CacheKey, entry: CacheEntry, subscribers: &Subscribers) {
        self.cache.set(&key, &entry);

        let snapshots = entry.as_long_term().map_or(1, <[_]>::len);
        let delivered = {
            let mut subs = lock(subscribers);
            subs.retain(|tx| tx.send(Some(entry.clone())).is_ok());
            subs.len()
        };

        debug!(
            "Updated {} ({} snapshots, {} subscribers)",
            key, snapshots, delivered
        );
        self.events.send(ForecastEvent::Updated { key, snapshots });
    }
}

async fn poll_loop(
    shared: Arc<Shared>,
    key: CacheKey,
    period: Duration,
    cancel: CancellationToken,
    subscribers: Subscribers,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = shared.fetch(key) => result,
        };

        match result {
            Ok(entry) => shared.publish(key, entry, &subscribers),
            Err(e) => {
                warn!("Fetch for {} failed, keeping previous value: {}", key, e);
                shared.events.send(ForecastEvent::FetchFailed {
                    key,
                    error: e.to_string(),
                });
            }
        }
    }

    debug!("Poll task for {} stopped", key);
}

/// Owns the poll tasks, one per observed pair.
///
/// Dropping the scheduler stops every task.
pub struct PollScheduler {
    shared: Arc<Shared>,
    poll_interval: Duration,
    polls: Mutex<HashMap<CacheKey, PollHandle>>,
}

impl std::fmt::Debug for PollScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollScheduler")
            .field("poll_interval", &self.poll_interval)
            .field("active_polls", &self.active_polls())
            .finish()
    }
}

impl PollScheduler {
    /// Create a scheduler. Tasks are spawned on the current Tokio runtime
    /// when the first subscriber arrives.
    pub fn new(
        source: Arc<dyn WeatherSource>,
        cache: ForecastCache,
        poll_interval: Duration,
        events: EventDispatcher,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                cache,
                network: NetworkUsage::new(),
                metrics: FetchMetrics::new(),
                events,
            }),
            poll_interval,
            polls: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to updates for `key`, starting a poll task if none runs.
    ///
    /// The returned receiver starts out holding the value `resolve` returns.
    /// When joining a running task, `resolve` runs while that task is held
    /// off from publishing, so a value it writes to the cache is either seen
    /// by `resolve` or delivered to the new receiver.
    pub fn subscribe<F>(&self, key: CacheKey, resolve: F) -> watch::Receiver<Option<CacheEntry>>
    where
        F: FnOnce() -> Option<CacheEntry>,
    {
        let mut polls = lock(&self.polls);

        if let Some(handle) = polls.get(&key)
            && !handle.task.is_finished()
        {
            let mut subs = lock(&handle.subscribers);
            let (tx, rx) = watch::channel(resolve());
            subs.push(tx);
            debug!("Joined running poll for {}", key);
            return rx;
        }

        let (tx, rx) = watch::channel(resolve());
        let subscribers: Subscribers = Arc::new(Mutex::new(vec![tx]));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(poll_loop(
            Arc::clone(&self.shared),
            key,
            self.poll_interval,
            cancel.clone(),
            Arc::clone(&subscribers),
        ));

        if let Some(dead) = polls.insert(
            key,
            PollHandle {
                task,
                cancel,
                subscribers,
            },
        ) {
            warn!("Replacing finished poll task for {}", key);
            dead.stop();
        }

        info!("Started polling {} every {:?}", key, self.poll_interval);
        self.shared
            .events
            .send(ForecastEvent::PollingStarted { key });
        rx
    }

    /// Stop polling one pair. Returns `false` if it was not being polled.
    ///
    /// Streams attached to the pair end.
    pub fn stop(&self, key: &CacheKey) -> bool {
        let handle = lock(&self.polls).remove(key);
        match handle {
            Some(handle) => {
                handle.stop();
                info!("Stopped polling {}", key);
                self.shared
                    .events
                    .send(ForecastEvent::PollingStopped { key: *key });
                true
            }
            None => false,
        }
    }

    /// Stop every poll task. Returns how many were stopped.
    pub fn stop_all(&self) -> usize {
        let drained: Vec<(CacheKey, PollHandle)> = lock(&self.polls).drain().collect();
        let count = drained.len();

        for (key, handle) in drained {
            handle.stop();
            self.shared
                .events
                .send(ForecastEvent::PollingStopped { key });
        }

        if count > 0 {
            info!("Stopped {} poll tasks", count);
        }
        count
    }

    /// Number of pairs being polled.
    pub fn active_polls(&self) -> usize {
        lock(&self.polls).len()
    }

    /// Whether `key` is being polled.
    pub fn is_polling(&self, key: &CacheKey) -> bool {
        lock(&self.polls).contains_key(key)
    }

    /// Keys of all polled pairs, sorted.
    pub fn polled_keys(&self) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = lock(&self.polls).keys().copied().collect();
        keys.sort();
        keys
    }

    /// Number of live subscribers of `key`.
    pub fn subscriber_count(&self, key: &CacheKey) -> usize {
        lock(&self.polls)
            .get(key)
            .map_or(0, |h| lock(&h.subscribers).iter().filter(|tx| !tx.is_closed()).count())
    }

    pub fn network_usage(&self) -> &NetworkUsage {
        &self.shared.network
    }

    pub fn metrics(&self) -> &FetchMetrics {
        &self.shared.metrics
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.shared.events
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        for (_, handle) in lock(&self.polls).drain() {
            handle.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skycast_store::MemoryStore;
    use skycast_types::Coordinate;

    use crate::mock::MockSource;

    fn scheduler(source: Arc<MockSource>) -> (PollScheduler, ForecastCache) {
        let cache = ForecastCache::new(Arc::new(MemoryStore::new()));
        let scheduler = PollScheduler::new(
            source,
            cache.clone(),
            DEFAULT_POLL_INTERVAL,
            EventDispatcher::default(),
        );
        (scheduler, cache)
    }

    fn key() -> CacheKey {
        CacheKey::momentum(Coordinate::new(59.9, 30.3))
    }

    #[test]
    fn test_poll_config_defaults() {
        let config = PollConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(900));
        assert_eq!(config.momentum_max_age, Duration::from_secs(9_000));
        assert_eq!(config.derivation_window, Duration::from_secs(14_400));
        assert_eq!(config.future_tolerance, Duration::from_secs(1_800));
        assert_eq!(config.event_capacity, 100);
        assert_eq!(config.freshness_policy(), FreshnessPolicy::default());
    }

    #[test]
    fn test_poll_config_validation() {
        assert!(PollConfig::default().validate().is_ok());
        assert!(
            PollConfig::default()
                .poll_interval(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(PollConfig::default().event_capacity(0).validate().is_err());
        assert!(
            PollConfig::default()
                .momentum_max_age(Duration::ZERO)
                .validate()
                .is_err()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_subscriber_triggers_immediate_fetch() {
        let source = Arc::new(MockSource::new());
        let (scheduler, cache) = scheduler(source.clone());

        let mut rx = scheduler.subscribe(key(), || None);
        assert!(rx.borrow().is_none());

        rx.changed().await.unwrap();
        assert!(rx.borrow().is_some());
        assert_eq!(source.momentum_calls(), 1);
        assert!(cache.get(&key()).is_some());
        assert_eq!(scheduler.active_polls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_subscriber_joins_without_fetch() {
        let source = Arc::new(MockSource::new());
        let (scheduler, _) = scheduler(source.clone());

        let mut first = scheduler.subscribe(key(), || None);
        first.changed().await.unwrap();

        let mut second = scheduler.subscribe(key(), || None);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.momentum_calls(), 1);
        assert_eq!(scheduler.active_polls(), 1);
        assert_eq!(scheduler.subscriber_count(&key()), 2);

        // The next tick reaches both.
        tokio::time::sleep(DEFAULT_POLL_INTERVAL).await;
        assert!(second.has_changed().unwrap());
        second.changed().await.unwrap();
        assert_eq!(source.momentum_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_joining_subscriber_resolves_after_publish() {
        let source = Arc::new(MockSource::new());
        let (scheduler, cache) = scheduler(source.clone());

        let mut first = scheduler.subscribe(key(), || None);
        first.changed().await.unwrap();

        let mut resolved = false;
        let second = scheduler.subscribe(key(), || {
            resolved = true;
            cache.get(&key())
        });
        assert!(resolved);
        assert_eq!(*second.borrow(), *first.borrow());
        assert_eq!(source.momentum_calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_late_joiner_never_misses_first_fetch() {
        for _ in 0..200 {
            let source = Arc::new(MockSource::new());
            let (scheduler, cache) = scheduler(source);

            let _first = scheduler.subscribe(key(), || None);
            tokio::task::yield_now().await;
            let mut second = scheduler.subscribe(key(), || cache.get(&key()));

            // Either the joiner read the fetched value from the cache, or the
            // task delivers it. With a 15 minute interval nothing else would.
            let seen = tokio::time::timeout(Duration::from_secs(5), async {
                while second.borrow_and_update().is_none() {
                    if second.changed().await.is_err() {
                        return false;
                    }
                }
                true
            })
            .await;
            assert_eq!(seen, Ok(true));
            scheduler.stop_all();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_usage_types_poll_separately() {
        let source = Arc::new(MockSource::new());
        let (scheduler, _) = scheduler(source.clone());
        let coord = Coordinate::new(59.9, 30.3);

        let mut m = scheduler.subscribe(CacheKey::momentum(coord), || None);
        let mut lt = scheduler.subscribe(CacheKey::long_term(coord), || None);
        m.changed().await.unwrap();
        lt.changed().await.unwrap();

        assert_eq!(scheduler.active_polls(), 2);
        assert_eq!(source.momentum_calls(), 1);
        assert_eq!(source.long_term_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_publishes_nothing() {
        let source = Arc::new(MockSource::new());
        source.set_should_fail(true, Some("offline")).await;
        let (scheduler, cache) = scheduler(source.clone());
        let mut events = scheduler.events().subscribe();

        let rx = scheduler.subscribe(key(), || None);
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(source.momentum_calls(), 1);
        assert!(!rx.has_changed().unwrap());
        assert!(cache.get(&key()).is_none());
        assert_eq!(scheduler.metrics().summary().momentum.failure_count, 1);

        assert!(matches!(
            events.recv().await.unwrap(),
            ForecastEvent::PollingStarted { .. }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            ForecastEvent::FetchFailed { ref error, .. } if error.contains("offline")
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_subscription() {
        let source = Arc::new(MockSource::new());
        let (scheduler, _) = scheduler(source.clone());

        let mut rx = scheduler.subscribe(key(), || None);
        rx.changed().await.unwrap();

        assert!(scheduler.stop(&key()));
        assert!(!scheduler.stop(&key()));
        assert!(!scheduler.is_polling(&key()));

        // All senders go away once the task is torn down.
        assert!(rx.changed().await.is_err());

        tokio::time::sleep(DEFAULT_POLL_INTERVAL * 3).await;
        assert_eq!(source.momentum_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_usage_returns_to_zero() {
        let source = Arc::new(MockSource::builder().latency(Duration::from_secs(2)).build());
        let (scheduler, _) = scheduler(source.clone());
        let usage = scheduler.network_usage().subscribe();

        let mut rx = scheduler.subscribe(key(), || None);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(*usage.borrow(), 1);

        rx.changed().await.unwrap();
        assert_eq!(*usage.borrow(), 0);
        assert_eq!(scheduler.network_usage().current(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_fetch_releases_counter() {
        let source = Arc::new(MockSource::builder().latency(Duration::from_secs(30)).build());
        let (scheduler, _) = scheduler(source.clone());

        let _rx = scheduler.subscribe(key(), || None);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(scheduler.network_usage().current(), 1);

        scheduler.stop_all();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(scheduler.network_usage().current(), 0);
    }
}
