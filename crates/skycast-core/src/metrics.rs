//! Fetch statistics and the in-flight network counter.
//!
//! [`FetchMetrics`] counts upstream fetches per usage type and how cache
//! lookups were answered. [`NetworkUsage`] tracks how many fetches are in
//! flight right now and publishes every change on a `watch` channel, which a
//! UI can use to drive an activity indicator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use skycast_types::UsageType;

use crate::freshness::Resolution;

/// Point-in-time view of one operation's counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationMetrics {
    pub count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub total_duration_ms: u64,
    pub min_duration_ms: Option<u64>,
    pub max_duration_ms: Option<u64>,
    pub avg_duration_ms: Option<f64>,
}

/// Thread-safe counters for one kind of operation.
#[derive(Debug)]
pub struct AtomicOperationMetrics {
    success_count: AtomicU64,
    failure_count: AtomicU64,
    total_duration_ms: AtomicU64,
    min_duration_ms: AtomicU64,
    max_duration_ms: AtomicU64,
}

impl Default for AtomicOperationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomicOperationMetrics {
    pub fn new() -> Self {
        Self {
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
            min_duration_ms: AtomicU64::new(u64::MAX),
            max_duration_ms: AtomicU64::new(0),
        }
    }

    pub fn record_success(&self, duration: Duration) {
        self.success_count.fetch_add(1, Ordering::Relaxed);
        self.record_duration(duration);
    }

    pub fn record_failure(&self, duration: Duration) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        self.record_duration(duration);
    }

    fn record_duration(&self, duration: Duration) {
        let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.total_duration_ms.fetch_add(ms, Ordering::Relaxed);
        self.min_duration_ms.fetch_min(ms, Ordering::Relaxed);
        self.max_duration_ms.fetch_max(ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> OperationMetrics {
        let success_count = self.success_count.load(Ordering::Relaxed);
        let failure_count = self.failure_count.load(Ordering::Relaxed);
        let count = success_count + failure_count;
        let total_duration_ms = self.total_duration_ms.load(Ordering::Relaxed);

        let (min_duration_ms, max_duration_ms, avg_duration_ms) = if count == 0 {
            (None, None, None)
        } else {
            (
                Some(self.min_duration_ms.load(Ordering::Relaxed)),
                Some(self.max_duration_ms.load(Ordering::Relaxed)),
                Some(total_duration_ms as f64 / count as f64),
            )
        };

        OperationMetrics {
            count,
            success_count,
            failure_count,
            total_duration_ms,
            min_duration_ms,
            max_duration_ms,
            avg_duration_ms,
        }
    }

    pub fn reset(&self) {
        self.success_count.store(0, Ordering::Relaxed);
        self.failure_count.store(0, Ordering::Relaxed);
        self.total_duration_ms.store(0, Ordering::Relaxed);
        self.min_duration_ms.store(u64::MAX, Ordering::Relaxed);
        self.max_duration_ms.store(0, Ordering::Relaxed);
    }
}

/// Upstream fetch and cache lookup statistics.
#[derive(Debug, Default)]
pub struct FetchMetrics {
    /// Current-conditions fetches.
    pub momentum: AtomicOperationMetrics,
    /// Forecast series fetches.
    pub long_term: AtomicOperationMetrics,
    cache_fresh: AtomicU64,
    cache_derived: AtomicU64,
    cache_miss: AtomicU64,
}

impl FetchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters for fetches of the given usage type.
    pub fn for_usage(&self, usage: UsageType) -> &AtomicOperationMetrics {
        match usage {
            UsageType::Momentum => &self.momentum,
            UsageType::LongTerm => &self.long_term,
        }
    }

    /// Count how a cache lookup was answered.
    pub fn record_resolution<T>(&self, resolution: &Resolution<T>) {
        let counter = match resolution {
            Resolution::Fresh(_) => &self.cache_fresh,
            Resolution::Derived(_) => &self.cache_derived,
            Resolution::Miss => &self.cache_miss,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self) -> FetchMetricsSnapshot {
        FetchMetricsSnapshot {
            momentum: self.momentum.snapshot(),
            long_term: self.long_term.snapshot(),
            cache_fresh: self.cache_fresh.load(Ordering::Relaxed),
            cache_derived: self.cache_derived.load(Ordering::Relaxed),
            cache_miss: self.cache_miss.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.momentum.reset();
        self.long_term.reset();
        self.cache_fresh.store(0, Ordering::Relaxed);
        self.cache_derived.store(0, Ordering::Relaxed);
        self.cache_miss.store(0, Ordering::Relaxed);
    }
}

/// Serializable summary of [`FetchMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchMetricsSnapshot {
    pub momentum: OperationMetrics,
    pub long_term: OperationMetrics,
    /// Lookups served from the requested bucket.
    pub cache_fresh: u64,
    /// Momentum lookups served from a long-term slot.
    pub cache_derived: u64,
    /// Lookups that found nothing usable.
    pub cache_miss: u64,
}

impl FetchMetricsSnapshot {
    /// Total upstream fetches across both usage types.
    pub fn total_fetches(&self) -> u64 {
        self.momentum.count + self.long_term.count
    }
}

/// Count of fetches currently in flight.
///
/// The count lives in a `watch` channel, so each change and its publication
/// happen under the channel lock and receivers never observe them out of
/// order. It goes up when a fetch starts and down when it finishes, whether
/// it succeeded, failed or was cancelled.
#[derive(Debug)]
pub struct NetworkUsage {
    tx: watch::Sender<usize>,
}

impl Default for NetworkUsage {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkUsage {
    pub fn new() -> Self {
        Self {
            tx: watch::Sender::new(0),
        }
    }

    /// Number of fetches in flight.
    pub fn current(&self) -> usize {
        *self.tx.borrow()
    }

    /// Receive every change of the in-flight count.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.tx.subscribe()
    }

    /// Mark a fetch as started. The returned guard marks it finished on drop.
    pub fn begin(&self) -> InFlightGuard<'_> {
        self.tx.send_modify(|n| *n += 1);
        InFlightGuard { usage: self }
    }

    fn end(&self) {
        self.tx.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Decrements the in-flight count when dropped.
#[must_use = "the fetch is counted as finished as soon as the guard is dropped"]
#[derive(Debug)]
pub struct InFlightGuard<'a> {
    usage: &'a NetworkUsage,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.usage.end();
    }
}
