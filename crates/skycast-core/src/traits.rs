//! Trait abstractions for the collaborators of the forecast model.
//!
//! [`WeatherSource`] abstracts over the upstream provider and [`Clock`] over
//! wall-clock time, so the scheduler and the freshness rules can be driven by
//! mocks in tests. The persistence seam is
//! [`skycast_store::KeyValueStore`].

use async_trait::async_trait;
use time::OffsetDateTime;

use skycast_types::{Coordinate, ForecastSnapshot};

use crate::error::Result;

/// An upstream weather data provider.
///
/// Implementations are called with the center of a 0.1° grid cell. They own
/// their timeouts; the scheduler waits for each call to finish before the
/// next tick of the same pair.
///
/// # Example
///
/// ```ignore
/// use skycast_core::{Result, WeatherSource};
/// use skycast_types::Coordinate;
///
/// async fn print_temperature<S: WeatherSource>(source: &S) -> Result<()> {
///     let now = source.fetch_current(Coordinate::new(59.9, 30.3)).await?;
///     println!("{:.1} °C", now.temperature.current);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// Fetch current conditions.
    async fn fetch_current(&self, coordinate: Coordinate) -> Result<ForecastSnapshot>;

    /// Fetch the forecast series for the next several days.
    async fn fetch_forecast_series(&self, coordinate: Coordinate) -> Result<Vec<ForecastSnapshot>>;

    /// Short provider name for logs.
    fn name(&self) -> &str {
        "weather source"
    }
}

/// Source of the current time, in Unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        OffsetDateTime::now_utc().unix_timestamp()
    }
}
