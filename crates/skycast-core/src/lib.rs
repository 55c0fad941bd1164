//! Forecast caching and refresh scheduling.
//!
//! This crate keeps weather data for a set of observed locations fresh while
//! keeping network traffic low. Observed coordinates are snapped to a 0.1°
//! grid, so nearby requests share one cache entry and one refresh timer.
//!
//! # Features
//!
//! - **Cache-first reads**: observers get the best cached value immediately
//! - **Freshness rules**: stale current conditions are evicted and, where
//!   possible, derived from the nearest slot of the cached forecast series
//! - **Background refresh**: one poll task per observed pair, 15 minutes by
//!   default, with request de-duplication across observers
//! - **Persistence**: any [`skycast_store::KeyValueStore`], SQLite included
//! - **Observability**: in-flight fetch counter, fetch metrics and a
//!   broadcast event feed
//! - **OpenWeatherMap** source behind the `openweather` feature
//!
//! # Usage Types
//!
//! | Usage | Source call | Cached value | Freshness |
//! |-------|-------------|--------------|-----------|
//! | Momentum | `fetch_current` | one snapshot | younger than 2.5 h, else derived |
//! | LongTerm | `fetch_forecast_series` | time-ordered snapshots | any age |
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use skycast_core::{ForecastModel, MockSource, PollConfig};
//! use skycast_store::Store;
//! use skycast_types::Coordinate;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(Store::open_default()?);
//!     let model = ForecastModel::with_system_clock(
//!         Arc::new(MockSource::new()),
//!         store,
//!         PollConfig::default(),
//!     )?;
//!
//!     let mut stream = model.observe_momentum(Coordinate::new(59.93, 30.31));
//!     while let Some(value) = stream.next().await {
//!         if let Some(now) = value {
//!             println!("{:.1} °C, {}", now.temperature.current, now.condition.description);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod error;
pub mod events;
pub mod freshness;
pub mod metrics;
pub mod mock;
pub mod model;
#[cfg(feature = "openweather")]
pub mod openweather;
pub mod scheduler;
pub mod streaming;
pub mod traits;

// Core exports
pub use cache::ForecastCache;
pub use error::{Error, Result};
pub use model::ForecastModel;
pub use scheduler::{DEFAULT_EVENT_CAPACITY, DEFAULT_POLL_INTERVAL, PollConfig, PollScheduler};
pub use traits::{Clock, SystemClock, WeatherSource};

pub use events::{EventDispatcher, EventReceiver, EventSender, ForecastEvent};
pub use freshness::{FreshnessPolicy, FreshnessResolver, Resolution};
pub use metrics::{
    AtomicOperationMetrics, FetchMetrics, FetchMetricsSnapshot, InFlightGuard, NetworkUsage,
    OperationMetrics,
};
pub use mock::{MOCK_EPOCH, ManualClock, MockSource, MockSourceBuilder};
pub use streaming::{ForecastStream, LongTermStream, MomentumStream, Payload};

#[cfg(feature = "openweather")]
pub use openweather::OpenWeatherClient;

// Re-export from skycast-types
pub use skycast_types::{
    CacheEntry, CacheKey, Coordinate, ForecastSnapshot, QuantizedCoordinate, UsageType, quantize,
};
