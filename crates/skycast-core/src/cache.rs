//! Typed forecast cache on top of a byte store.
//!
//! Entries are JSON-encoded at the boundary. The cache never fails: a payload
//! that cannot be decoded, an entry stored under the wrong usage type or an
//! error from the underlying store all read as a miss, and failed writes are
//! dropped. Each of these is logged.

use std::sync::Arc;

use tracing::{debug, warn};

use skycast_store::KeyValueStore;
use skycast_types::{CacheEntry, CacheKey};

/// Forecast cache keyed by [`CacheKey`].
///
/// Cheap to clone; clones share the same store.
#[derive(Clone)]
pub struct ForecastCache {
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for ForecastCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForecastCache").finish_non_exhaustive()
    }
}

impl ForecastCache {
    /// Wrap a byte store.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// The underlying byte store.
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Read the entry stored under `key`.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let bytes = match self.store.get(&key.to_string()) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!("Cache miss for {}", key);
                return None;
            }
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Discarding undecodable cache entry {}: {}", key, e);
                return None;
            }
        };

        if entry.usage() != key.usage {
            warn!(
                "Cache entry {} holds {} data, treating as miss",
                key,
                entry.usage()
            );
            return None;
        }

        debug!("Cache hit for {}", key);
        Some(entry)
    }

    /// Insert or replace the entry stored under `key`.
    pub fn set(&self, key: &CacheKey, entry: &CacheEntry) {
        if entry.usage() != key.usage {
            warn!(
                "Refusing to store {} data under {}",
                entry.usage(),
                key
            );
            return;
        }

        let bytes = match serde_json::to_vec(entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to encode cache entry {}: {}", key, e);
                return;
            }
        };

        if let Err(e) = self.store.set(&key.to_string(), &bytes) {
            warn!("Cache write failed for {}: {}", key, e);
        }
    }

    /// Delete the entry stored under `key`, if any.
    pub fn remove(&self, key: &CacheKey) {
        if let Err(e) = self.store.remove(&key.to_string()) {
            warn!("Cache remove failed for {}: {}", key, e);
        } else {
            debug!("Evicted {}", key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skycast_store::{Error as StoreError, MemoryStore, Result as StoreResult, Store};
    use skycast_types::{Coordinate, ForecastSnapshot};

    fn cache() -> (ForecastCache, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (ForecastCache::new(store.clone()), store)
    }

    fn snapshot(ts: i64) -> ForecastSnapshot {
        ForecastSnapshot::builder(ts).temperature(7.5).humidity(60).build()
    }

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> StoreResult<Option<Vec<u8>>> {
            Err(StoreError::LockPoisoned)
        }
        fn set(&self, _key: &str, _value: &[u8]) -> StoreResult<()> {
            Err(StoreError::LockPoisoned)
        }
        fn remove(&self, _key: &str) -> StoreResult<()> {
            Err(StoreError::LockPoisoned)
        }
    }

    #[test]
    fn test_set_then_get() {
        let (cache, _) = cache();
        let key = CacheKey::momentum(Coordinate::new(59.9, 30.3));
        let entry = CacheEntry::Momentum(snapshot(1_000));

        cache.set(&key, &entry);
        assert_eq!(cache.get(&key), Some(entry));
    }

    #[test]
    fn test_set_overwrites() {
        let (cache, _) = cache();
        let key = CacheKey::long_term(Coordinate::new(59.9, 30.3));

        cache.set(&key, &CacheEntry::long_term(vec![snapshot(1)]));
        cache.set(&key, &CacheEntry::long_term(vec![snapshot(2), snapshot(3)]));

        let slots = cache.get(&key).and_then(CacheEntry::into_long_term).unwrap();
        assert_eq!(slots.len(), 2);
    }

    #[test]
    fn test_remove_twice_is_fine() {
        let (cache, _) = cache();
        let key = CacheKey::momentum(Coordinate::new(1.0, 2.0));
        cache.set(&key, &CacheEntry::Momentum(snapshot(5)));

        cache.remove(&key);
        cache.remove(&key);
        assert_eq!(cache.get(&key), None);
    }

    #[test]
    fn test_corrupt_payload_reads_as_miss() {
        let (cache, store) = cache();
        let key = CacheKey::momentum(Coordinate::new(59.9, 30.3));
        store.set(&key.to_string(), b"\x00\x01 not json").unwrap();

        assert_eq!(cache.get(&key), None);
    }

    #[test]
    fn test_usage_mismatch_reads_as_miss() {
        let (cache, store) = cache();
        let key = CacheKey::momentum(Coordinate::new(59.9, 30.3));
        let wrong = serde_json::to_vec(&CacheEntry::long_term(vec![snapshot(1)])).unwrap();
        store.set(&key.to_string(), &wrong).unwrap();

        assert_eq!(cache.get(&key), None);
    }

    #[test]
    fn test_set_refuses_usage_mismatch() {
        let (cache, store) = cache();
        let key = CacheKey::long_term(Coordinate::new(59.9, 30.3));
        cache.set(&key, &CacheEntry::Momentum(snapshot(1)));

        assert!(store.is_empty());
    }

    #[test]
    fn test_store_errors_are_swallowed() {
        let cache = ForecastCache::new(Arc::new(BrokenStore));
        let key = CacheKey::momentum(Coordinate::new(59.9, 30.3));

        cache.set(&key, &CacheEntry::Momentum(snapshot(1)));
        cache.remove(&key);
        assert_eq!(cache.get(&key), None);
    }

    #[test]
    fn test_sqlite_backed_cache() {
        let cache = ForecastCache::new(Arc::new(Store::open_in_memory().unwrap()));
        let key = CacheKey::long_term(Coordinate::new(-27.31, -113.62));
        let entry = CacheEntry::long_term(vec![snapshot(30), snapshot(10), snapshot(20)]);

        cache.set(&key, &entry);
        let back = cache.get(&key).unwrap();
        let stamps: Vec<i64> = back.as_long_term().unwrap().iter().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![10, 20, 30]);
    }
}
