//! The forecast facade.
//!
//! [`ForecastModel`] ties the pieces together. Observing a coordinate snaps it
//! to the 0.1° grid, answers immediately from the cache through the freshness
//! rules, and attaches the caller to the poll task for that cell, starting
//! one if needed.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use skycast_store::KeyValueStore;
use skycast_types::{CacheKey, Coordinate, ForecastSnapshot, QuantizedCoordinate, UsageType};

use crate::cache::ForecastCache;
use crate::error::Result;
use crate::events::{EventDispatcher, ForecastEvent};
use crate::freshness::{FreshnessResolver, Resolution};
use crate::metrics::FetchMetricsSnapshot;
use crate::scheduler::{PollConfig, PollScheduler};
use crate::streaming::{ForecastStream, LongTermStream, MomentumStream, Payload};
use crate::traits::{Clock, SystemClock, WeatherSource};

/// Cache-first forecast access with background refresh.
///
/// Every new observation of a pair fetches once right away, even when the
/// cache already answered, and then keeps refreshing on the poll interval.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use skycast_core::{ForecastModel, MockSource, PollConfig};
/// use skycast_store::MemoryStore;
/// use skycast_types::Coordinate;
///
/// #[tokio::main]
/// async fn main() {
///     let model = ForecastModel::with_system_clock(
///         Arc::new(MockSource::new()),
///         Arc::new(MemoryStore::new()),
///         PollConfig::default(),
///     )
///     .unwrap();
///
///     let mut stream = model.observe_momentum(Coordinate::new(59.93, 30.31));
///     assert_eq!(stream.next().await, Some(None)); // cold cache
///     let fetched = stream.next().await.unwrap().unwrap();
///     assert_eq!(fetched.humidity, 71);
///
///     model.stop_all_polling();
/// }
/// ```
pub struct ForecastModel {
    resolver: FreshnessResolver,
    scheduler: PollScheduler,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ForecastModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForecastModel")
            .field("policy", self.resolver.policy())
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl ForecastModel {
    /// Build a model from its collaborators.
    ///
    /// Fails if `config` does not validate.
    pub fn new(
        source: Arc<dyn WeatherSource>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: PollConfig,
    ) -> Result<Self> {
        config.validate()?;

        let cache = ForecastCache::new(store);
        let resolver = FreshnessResolver::new(cache.clone(), config.freshness_policy());
        let scheduler = PollScheduler::new(
            source,
            cache,
            config.poll_interval,
            EventDispatcher::new(config.event_capacity),
        );

        Ok(Self {
            resolver,
            scheduler,
            clock,
        })
    }

    /// Build a model that reads wall-clock time.
    pub fn with_system_clock(
        source: Arc<dyn WeatherSource>,
        store: Arc<dyn KeyValueStore>,
        config: PollConfig,
    ) -> Result<Self> {
        Self::new(source, store, Arc::new(SystemClock), config)
    }

    /// Observe current conditions at `coordinate`.
    ///
    /// The first value is whatever the cache can answer: a fresh snapshot, one
    /// derived from the forecast series, or `None`. Every later value comes
    /// from a successful fetch.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn observe_momentum(&self, coordinate: Coordinate) -> MomentumStream {
        self.observe(coordinate.quantized(), |cell| {
            self.resolver.resolve_momentum(cell, self.clock.now())
        })
    }

    /// Observe the forecast series at `coordinate`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn observe_long_term(&self, coordinate: Coordinate) -> LongTermStream {
        self.observe(coordinate.quantized(), |cell| {
            self.resolver.resolve_long_term(cell)
        })
    }

    fn observe<T, F>(&self, cell: QuantizedCoordinate, resolve: F) -> ForecastStream<T>
    where
        T: Payload,
        F: FnOnce(QuantizedCoordinate) -> Resolution<T>,
    {
        let key = CacheKey::for_cell(T::USAGE, cell);
        let rx = self.scheduler.subscribe(key, || {
            let resolution = resolve(cell);
            debug!("Observing {} ({})", key, resolution.kind());
            self.scheduler.metrics().record_resolution(&resolution);
            self.scheduler.events().send(ForecastEvent::Resolved {
                key,
                resolution: resolution.kind().to_string(),
            });
            resolution.into_value().map(T::into_entry)
        });
        ForecastStream::new(key, rx)
    }

    /// Stop every poll task. Open streams end; later observations start
    /// polling again.
    pub fn stop_all_polling(&self) -> usize {
        self.scheduler.stop_all()
    }

    /// Stop polling one pair. Returns `false` if it was not being polled.
    pub fn stop_polling(&self, usage: UsageType, coordinate: Coordinate) -> bool {
        self.scheduler.stop(&CacheKey::new(usage, coordinate))
    }

    /// Number of fetches in flight, updated on every change.
    pub fn network_usage(&self) -> watch::Receiver<usize> {
        self.scheduler.network_usage().subscribe()
    }

    /// Number of pairs being polled.
    pub fn active_polls(&self) -> usize {
        self.scheduler.active_polls()
    }

    /// Keys of all polled pairs, sorted.
    pub fn polled_keys(&self) -> Vec<CacheKey> {
        self.scheduler.polled_keys()
    }

    pub fn events(&self) -> &EventDispatcher {
        self.scheduler.events()
    }

    pub fn metrics(&self) -> FetchMetricsSnapshot {
        self.scheduler.metrics().summary()
    }

    /// Resolve current conditions from the cache alone, without polling.
    pub fn cached_momentum(&self, coordinate: Coordinate) -> Option<ForecastSnapshot> {
        self.resolver
            .resolve_momentum(coordinate.quantized(), self.clock.now())
            .into_value()
    }

    /// Read the cached forecast series alone, without polling.
    pub fn cached_long_term(&self, coordinate: Coordinate) -> Option<Vec<ForecastSnapshot>> {
        self.resolver
            .resolve_long_term(coordinate.quantized())
            .into_value()
    }
}
