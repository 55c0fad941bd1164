//! Freshness rules for cached forecasts.
//!
//! A cached momentum snapshot is served while it is younger than
//! [`FreshnessPolicy::momentum_max_age`]. Once it goes stale it is evicted and
//! the resolver falls back to the long-term series for the same cell, picking
//! the slot closest to "now" inside the derivation window. A derived snapshot
//! is returned to the caller but never written back to the momentum bucket.

use std::time::Duration;

use tracing::debug;

use skycast_types::{CacheEntry, CacheKey, ForecastSnapshot, QuantizedCoordinate, UsageType};

use crate::cache::ForecastCache;

/// Default maximum age of a momentum snapshot (2.5 hours).
pub const DEFAULT_MOMENTUM_MAX_AGE: Duration = Duration::from_secs(9_000);
/// Default window around "now" searched for a substitute slot (4 hours).
pub const DEFAULT_DERIVATION_WINDOW: Duration = Duration::from_secs(14_400);
/// Default allowance for slots lying in the future (30 minutes).
pub const DEFAULT_FUTURE_TOLERANCE: Duration = Duration::from_secs(1_800);

fn secs(d: Duration) -> i64 {
    i64::try_from(d.as_secs()).unwrap_or(i64::MAX)
}

/// Freshness thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    /// A momentum snapshot is fresh while `now - timestamp` is below this.
    pub momentum_max_age: Duration,
    /// Slots further than this from `now`, in either direction, are ignored.
    pub derivation_window: Duration,
    /// Slots later than `now + future_tolerance` are ignored.
    pub future_tolerance: Duration,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            momentum_max_age: DEFAULT_MOMENTUM_MAX_AGE,
            derivation_window: DEFAULT_DERIVATION_WINDOW,
            future_tolerance: DEFAULT_FUTURE_TOLERANCE,
        }
    }
}

impl FreshnessPolicy {
    /// Whether a momentum snapshot can be served as-is at `now`.
    #[must_use]
    pub fn is_fresh(&self, snapshot: &ForecastSnapshot, now: i64) -> bool {
        snapshot.age_at(now) < secs(self.momentum_max_age)
    }

    /// Pick the long-term slot that best stands in for current conditions.
    ///
    /// A slot qualifies when `|now - ts| < derivation_window` and
    /// `now > ts - future_tolerance`. Among qualifying slots the one with the
    /// smallest `now - ts` wins, so a slot slightly in the future beats any
    /// slot in the past. Ties go to the earliest slot in the series.
    #[must_use]
    pub fn select_slot<'a>(
        &self,
        slots: &'a [ForecastSnapshot],
        now: i64,
    ) -> Option<&'a ForecastSnapshot> {
        let window = secs(self.derivation_window);
        let tolerance = secs(self.future_tolerance);

        slots
            .iter()
            .filter(|s| (now - s.timestamp).abs() < window && now > s.timestamp - tolerance)
            .min_by_key(|s| now - s.timestamp)
    }
}

/// How a lookup was answered.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T> {
    /// Served straight from the bucket that was asked for.
    Fresh(T),
    /// Momentum served from a long-term slot.
    Derived(T),
    /// Nothing usable in the cache.
    Miss,
}

impl<T> Resolution<T> {
    /// The resolved value, whichever path produced it.
    pub fn into_value(self) -> Option<T> {
        match self {
            Resolution::Fresh(v) | Resolution::Derived(v) => Some(v),
            Resolution::Miss => None,
        }
    }

    pub fn is_miss(&self) -> bool {
        matches!(self, Resolution::Miss)
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Resolution::Fresh(_) => "fresh",
            Resolution::Derived(_) => "derived",
            Resolution::Miss => "miss",
        }
    }
}

/// Applies a [`FreshnessPolicy`] to a [`ForecastCache`].
#[derive(Debug, Clone)]
pub struct FreshnessResolver {
    cache: ForecastCache,
    policy: FreshnessPolicy,
}

impl FreshnessResolver {
    pub fn new(cache: ForecastCache, policy: FreshnessPolicy) -> Self {
        Self { cache, policy }
    }

    pub fn policy(&self) -> &FreshnessPolicy {
        &self.policy
    }

    /// Resolve current conditions for a cell.
    ///
    /// Evicts a stale momentum entry, and evicts the long-term entry when it
    /// has no slot usable for derivation.
    pub fn resolve_momentum(&self, cell: QuantizedCoordinate, now: i64) -> Resolution<ForecastSnapshot> {
        let momentum_key = CacheKey::for_cell(UsageType::Momentum, cell);

        if let Some(snapshot) = self.cache.get(&momentum_key).and_then(CacheEntry::into_momentum) {
            if self.policy.is_fresh(&snapshot, now) {
                return Resolution::Fresh(snapshot);
            }
            debug!(
                "Momentum entry {} is {}s old, evicting",
                momentum_key,
                snapshot.age_at(now)
            );
        }
        // Absent, undecodable or stale: clear the bucket either way.
        self.cache.remove(&momentum_key);

        let long_term_key = CacheKey::for_cell(UsageType::LongTerm, cell);
        let slots = self
            .cache
            .get(&long_term_key)
            .and_then(CacheEntry::into_long_term)
            .unwrap_or_default();

        match self.policy.select_slot(&slots, now) {
            Some(slot) => {
                debug!("Derived momentum for {} from slot at {}", cell, slot.timestamp);
                Resolution::Derived(slot.clone())
            }
            None => {
                self.cache.remove(&long_term_key);
                Resolution::Miss
            }
        }
    }

    /// Resolve the forecast series for a cell.
    pub fn resolve_long_term(&self, cell: QuantizedCoordinate) -> Resolution<Vec<ForecastSnapshot>> {
        let key = CacheKey::for_cell(UsageType::LongTerm, cell);
        match self.cache.get(&key).and_then(CacheEntry::into_long_term) {
            Some(slots) => Resolution::Fresh(slots),
            None => Resolution::Miss,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use skycast_store::{KeyValueStore, MemoryStore};
    use skycast_types::Coordinate;

    const NOW: i64 = 1_710_000_000;
    const HOUR: i64 = 3_600;

    fn resolver() -> (FreshnessResolver, ForecastCache, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let cache = ForecastCache::new(store.clone());
        (
            FreshnessResolver::new(cache.clone(), FreshnessPolicy::default()),
            cache,
            store,
        )
    }

    fn cell() -> QuantizedCoordinate {
        Coordinate::new(59.9, 30.3).quantized()
    }

    fn snap(ts: i64) -> ForecastSnapshot {
        ForecastSnapshot::builder(ts).temperature(10.0).build()
    }

    #[test]
    fn test_momentum_fresh_boundary() {
        let policy = FreshnessPolicy::default();
        let max_age = 9_000;
        assert!(policy.is_fresh(&snap(NOW - max_age + 1), NOW));
        assert!(!policy.is_fresh(&snap(NOW - max_age), NOW));
        assert!(!policy.is_fresh(&snap(NOW - max_age - 1), NOW));
        assert!(policy.is_fresh(&snap(NOW + HOUR), NOW));
    }

    #[test]
    fn test_select_slot_prefers_closest_past() {
        let policy = FreshnessPolicy::default();
        let slots = vec![snap(NOW - 3 * HOUR), snap(NOW - HOUR), snap(NOW + 2 * HOUR)];
        let chosen = policy.select_slot(&slots, NOW).unwrap();
        assert_eq!(chosen.timestamp, NOW - HOUR);
    }

    #[test]
    fn test_select_slot_near_future_wins() {
        let policy = FreshnessPolicy::default();
        let slots = vec![snap(NOW - 600), snap(NOW + 1_200)];
        let chosen = policy.select_slot(&slots, NOW).unwrap();
        assert_eq!(chosen.timestamp, NOW + 1_200);
    }

    #[test]
    fn test_select_slot_window_edges() {
        let policy = FreshnessPolicy::default();
        // Exactly 4h old and exactly 30 min ahead are both excluded.
        let slots = vec![snap(NOW - 4 * HOUR), snap(NOW + 1_800)];
        assert!(policy.select_slot(&slots, NOW).is_none());

        let slots = vec![snap(NOW - 4 * HOUR + 1)];
        assert!(policy.select_slot(&slots, NOW).is_some());
        let slots = vec![snap(NOW + 1_799)];
        assert!(policy.select_slot(&slots, NOW).is_some());
    }

    #[test]
    fn test_select_slot_ties_keep_first() {
        let policy = FreshnessPolicy::default();
        let first = ForecastSnapshot::builder(NOW - HOUR).temperature(1.0).build();
        let second = ForecastSnapshot::builder(NOW - HOUR).temperature(2.0).build();
        let slots = vec![first.clone(), second];
        assert_eq!(policy.select_slot(&slots, NOW), Some(&first));
    }

    #[test]
    fn test_resolve_fresh_momentum() {
        let (resolver, cache, _) = resolver();
        let key = CacheKey::for_cell(UsageType::Momentum, cell());
        cache.set(&key, &CacheEntry::Momentum(snap(NOW - HOUR)));

        let res = resolver.resolve_momentum(cell(), NOW);
        assert_eq!(res, Resolution::Fresh(snap(NOW - HOUR)));
        assert!(cache.get(&key).is_some());
    }

    #[test]
    fn test_stale_momentum_is_evicted_and_derived() {
        let (resolver, cache, _) = resolver();
        let m_key = CacheKey::for_cell(UsageType::Momentum, cell());
        let lt_key = CacheKey::for_cell(UsageType::LongTerm, cell());
        cache.set(&m_key, &CacheEntry::Momentum(snap(NOW - 3 * HOUR)));
        cache.set(
            &lt_key,
            &CacheEntry::long_term(vec![snap(NOW - 3 * HOUR), snap(NOW - HOUR), snap(NOW + 2 * HOUR)]),
        );

        let res = resolver.resolve_momentum(cell(), NOW);
        assert_eq!(res.kind(), "derived");
        assert_eq!(res.into_value().unwrap().timestamp, NOW - HOUR);

        // Stale entry gone, derived value not written back.
        assert!(cache.get(&m_key).is_none());
        assert!(cache.get(&lt_key).is_some());
    }

    #[test]
    fn test_no_usable_slot_evicts_long_term() {
        let (resolver, cache, store) = resolver();
        let lt_key = CacheKey::for_cell(UsageType::LongTerm, cell());
        cache.set(&lt_key, &CacheEntry::long_term(vec![snap(NOW - 10 * HOUR)]));

        let res = resolver.resolve_momentum(cell(), NOW);
        assert!(res.is_miss());
        assert!(store.get(&lt_key.to_string()).unwrap().is_none());
    }

    #[test]
    fn test_cold_cache_is_miss() {
        let (resolver, _, _) = resolver();
        assert!(resolver.resolve_momentum(cell(), NOW).is_miss());
        assert!(resolver.resolve_long_term(cell()).is_miss());
    }

    #[test]
    fn test_resolve_long_term_returns_full_series() {
        let (resolver, cache, _) = resolver();
        let lt_key = CacheKey::for_cell(UsageType::LongTerm, cell());
        // Old slots are still returned; long-term has no freshness rule.
        cache.set(&lt_key, &CacheEntry::long_term(vec![snap(1), snap(2)]));

        let slots = resolver.resolve_long_term(cell()).into_value().unwrap();
        assert_eq!(slots.len(), 2);
    }
}
