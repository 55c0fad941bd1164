//! In-memory collaborators for testing.
//!
//! [`MockSource`] implements [`WeatherSource`] without any network access and
//! [`ManualClock`] implements [`Clock`] with a time that only moves when told
//! to. Together they let the scheduler and the freshness rules be exercised
//! deterministically.
//!
//! # Features
//!
//! - **Failure injection**: fail every fetch, or only the next `n` fetches
//! - **Latency simulation**: delay each fetch to observe in-flight counters
//! - **Call accounting**: count fetches per usage type and record the last
//!   coordinate asked for

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use skycast_types::{Condition, Coordinate, ForecastSnapshot};

use crate::error::{Error, Result};
use crate::traits::{Clock, WeatherSource};

/// Timestamp used for the default canned data (2024-03-09T16:00:00Z).
pub const MOCK_EPOCH: i64 = 1_710_000_000;

/// A scripted weather source.
///
/// Returned snapshots are stamped with the coordinate that was requested.
///
/// # Example
///
/// ```
/// use skycast_core::{MockSource, WeatherSource};
/// use skycast_types::Coordinate;
///
/// #[tokio::main]
/// async fn main() {
///     let source = MockSource::new();
///     let snapshot = source.fetch_current(Coordinate::new(59.9, 30.3)).await.unwrap();
///     assert_eq!(snapshot.coordinate, Some(Coordinate::new(59.9, 30.3)));
///     assert_eq!(source.momentum_calls(), 1);
/// }
/// ```
pub struct MockSource {
    current: RwLock<ForecastSnapshot>,
    series: RwLock<Vec<ForecastSnapshot>>,
    last_coordinate: RwLock<Option<Coordinate>>,
    momentum_calls: AtomicU32,
    long_term_calls: AtomicU32,
    should_fail: AtomicBool,
    fail_message: RwLock<String>,
    /// Simulated fetch latency in milliseconds (0 = no delay).
    latency_ms: AtomicU64,
    /// Fetches still to fail before succeeding again.
    remaining_failures: AtomicU32,
}

impl std::fmt::Debug for MockSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSource")
            .field("momentum_calls", &self.momentum_calls())
            .field("long_term_calls", &self.long_term_calls())
            .field("should_fail", &self.should_fail.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSource {
    /// Create a source returning [`MockSource::default_current`] and
    /// [`MockSource::default_series`].
    pub fn new() -> Self {
        MockSourceBuilder::new().build()
    }

    #[must_use]
    pub fn builder() -> MockSourceBuilder {
        MockSourceBuilder::new()
    }

    /// Mild, overcast conditions at [`MOCK_EPOCH`].
    pub fn default_current() -> ForecastSnapshot {
        ForecastSnapshot::builder(MOCK_EPOCH)
            .temperature(12.5)
            .humidity(71)
            .pressure(1_012)
            .cloud_cover(90)
            .condition(Condition::new("Clouds", "overcast clouds"))
            .build()
    }

    /// Five days of 3-hourly slots starting at [`MOCK_EPOCH`].
    pub fn default_series() -> Vec<ForecastSnapshot> {
        (0..40)
            .map(|i| {
                ForecastSnapshot::builder(MOCK_EPOCH + i * 3 * 3_600)
                    .temperature(8.0 + (i % 8) as f64)
                    .humidity(65)
                    .pressure(1_010)
                    .condition(Condition::new("Clear", "clear sky"))
                    .build()
            })
            .collect()
    }

    async fn before_fetch(&self, coordinate: Coordinate) -> Result<()> {
        *self.last_coordinate.write().await = Some(coordinate);

        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.should_fail.load(Ordering::Relaxed) {
            return Err(Error::source_failure(self.fail_message.read().await.clone()));
        }

        // Consume one transient failure, if any are left.
        if self
            .remaining_failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::source_failure("Transient mock failure"));
        }

        Ok(())
    }

    /// Replace the current-conditions answer.
    pub async fn set_current(&self, snapshot: ForecastSnapshot) {
        *self.current.write().await = snapshot;
    }

    /// Replace the forecast-series answer.
    pub async fn set_series(&self, series: Vec<ForecastSnapshot>) {
        *self.series.write().await = series;
    }

    /// Make every fetch fail until switched off again.
    pub async fn set_should_fail(&self, fail: bool, message: Option<&str>) {
        self.should_fail.store(fail, Ordering::Relaxed);
        if let Some(msg) = message {
            *self.fail_message.write().await = msg.to_string();
        }
    }

    /// Fail the next `count` fetches, then succeed.
    pub fn set_transient_failures(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::Relaxed);
    }

    pub fn remaining_failures(&self) -> u32 {
        self.remaining_failures.load(Ordering::Relaxed)
    }

    /// Delay every fetch by `latency`. `Duration::ZERO` disables the delay.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms.store(
            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
    }

    /// Number of current-conditions fetches, including failed ones.
    pub fn momentum_calls(&self) -> u32 {
        self.momentum_calls.load(Ordering::Relaxed)
    }

    /// Number of forecast-series fetches, including failed ones.
    pub fn long_term_calls(&self) -> u32 {
        self.long_term_calls.load(Ordering::Relaxed)
    }

    pub fn total_calls(&self) -> u32 {
        self.momentum_calls() + self.long_term_calls()
    }

    pub fn reset_calls(&self) {
        self.momentum_calls.store(0, Ordering::Relaxed);
        self.long_term_calls.store(0, Ordering::Relaxed);
    }

    /// Coordinate of the most recent fetch.
    pub async fn last_coordinate(&self) -> Option<Coordinate> {
        *self.last_coordinate.read().await
    }
}

#[async_trait]
impl WeatherSource for MockSource {
    async fn fetch_current(&self, coordinate: Coordinate) -> Result<ForecastSnapshot> {
        self.momentum_calls.fetch_add(1, Ordering::Relaxed);
        self.before_fetch(coordinate).await?;

        let mut snapshot = self.current.read().await.clone();
        snapshot.coordinate = Some(coordinate);
        Ok(snapshot)
    }

    async fn fetch_forecast_series(&self, coordinate: Coordinate) -> Result<Vec<ForecastSnapshot>> {
        self.long_term_calls.fetch_add(1, Ordering::Relaxed);
        self.before_fetch(coordinate).await?;

        let mut series = self.series.read().await.clone();
        for slot in &mut series {
            slot.coordinate = Some(coordinate);
        }
        Ok(series)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Builder for [`MockSource`].
#[derive(Debug, Clone)]
pub struct MockSourceBuilder {
    current: ForecastSnapshot,
    series: Vec<ForecastSnapshot>,
    latency: Duration,
    transient_failures: u32,
}

impl Default for MockSourceBuilder {
    fn default() -> Self {
        Self {
            current: MockSource::default_current(),
            series: MockSource::default_series(),
            latency: Duration::ZERO,
            transient_failures: 0,
        }
    }
}

impl MockSourceBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn current(mut self, snapshot: ForecastSnapshot) -> Self {
        self.current = snapshot;
        self
    }

    #[must_use]
    pub fn series(mut self, series: Vec<ForecastSnapshot>) -> Self {
        self.series = series;
        self
    }

    #[must_use]
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    #[must_use]
    pub fn transient_failures(mut self, count: u32) -> Self {
        self.transient_failures = count;
        self
    }

    #[must_use]
    pub fn build(self) -> MockSource {
        MockSource {
            current: RwLock::new(self.current),
            series: RwLock::new(self.series),
            last_coordinate: RwLock::new(None),
            momentum_calls: AtomicU32::new(0),
            long_term_calls: AtomicU32::new(0),
            should_fail: AtomicBool::new(false),
            fail_message: RwLock::new("Mock failure".to_string()),
            latency_ms: AtomicU64::new(u64::try_from(self.latency.as_millis()).unwrap_or(u64::MAX)),
            remaining_failures: AtomicU32::new(self.transient_failures),
        }
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Move the clock forward by `seconds`.
    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord() -> Coordinate {
        Coordinate::new(40.7, -74.0)
    }

    #[tokio::test]
    async fn test_default_answers() {
        let source = MockSource::new();

        let current = source.fetch_current(coord()).await.unwrap();
        assert_eq!(current.timestamp, MOCK_EPOCH);
        assert_eq!(current.coordinate, Some(coord()));

        let series = source.fetch_forecast_series(coord()).await.unwrap();
        assert_eq!(series.len(), 40);
        assert!(series.iter().all(|s| s.coordinate == Some(coord())));

        assert_eq!(source.momentum_calls(), 1);
        assert_eq!(source.long_term_calls(), 1);
        assert_eq!(source.last_coordinate().await, Some(coord()));
    }

    #[tokio::test]
    async fn test_should_fail() {
        let source = MockSource::new();
        source.set_should_fail(true, Some("provider down")).await;

        let err = source.fetch_current(coord()).await.unwrap_err();
        assert!(err.to_string().contains("provider down"));
        // Failed calls still count.
        assert_eq!(source.momentum_calls(), 1);

        source.set_should_fail(false, None).await;
        assert!(source.fetch_current(coord()).await.is_ok());
    }

    #[tokio::test]
    async fn test_transient_failures() {
        let source = MockSource::builder().transient_failures(2).build();

        assert!(source.fetch_forecast_series(coord()).await.is_err());
        assert!(source.fetch_forecast_series(coord()).await.is_err());
        assert!(source.fetch_forecast_series(coord()).await.is_ok());
        assert_eq!(source.remaining_failures(), 0);
        assert_eq!(source.long_term_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency() {
        let source = MockSource::builder().latency(Duration::from_millis(500)).build();
        let start = tokio::time::Instant::now();
        source.fetch_current(coord()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_set_current() {
        let source = MockSource::new();
        source
            .set_current(ForecastSnapshot::builder(42).temperature(-3.0).build())
            .await;

        let snapshot = source.fetch_current(coord()).await.unwrap();
        assert_eq!(snapshot.timestamp, 42);
        assert_eq!(snapshot.temperature.current, -3.0);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(100);
        assert_eq!(clock.now(), 100);
        clock.advance(50);
        assert_eq!(clock.now(), 150);
        clock.set(7);
        assert_eq!(clock.now(), 7);
    }
}
