//! Observable forecast values.
//!
//! A [`ForecastStream`] yields the latest known value for one observed pair:
//! first whatever the cache held when observation started (possibly nothing),
//! then every value a successful poll produces. Values are "latest wins"; a
//! slow consumer skips intermediate updates instead of queueing them.
//!
//! The stream ends when polling for its pair is stopped.

use std::marker::PhantomData;

use futures::stream::{self, Stream};
use tokio::sync::watch;

use skycast_types::{CacheEntry, CacheKey, ForecastSnapshot, UsageType};

/// A value that can be carried by a [`ForecastStream`].
pub trait Payload: Sized + Send + Sync + 'static {
    /// The usage type this payload is cached under.
    const USAGE: UsageType;

    fn into_entry(self) -> CacheEntry;

    fn from_entry(entry: CacheEntry) -> Option<Self>;
}

impl Payload for ForecastSnapshot {
    const USAGE: UsageType = UsageType::Momentum;

    fn into_entry(self) -> CacheEntry {
        CacheEntry::Momentum(self)
    }

    fn from_entry(entry: CacheEntry) -> Option<Self> {
        entry.into_momentum()
    }
}

impl Payload for Vec<ForecastSnapshot> {
    const USAGE: UsageType = UsageType::LongTerm;

    fn into_entry(self) -> CacheEntry {
        CacheEntry::long_term(self)
    }

    fn from_entry(entry: CacheEntry) -> Option<Self> {
        entry.into_long_term()
    }
}

/// Current conditions for one cell.
pub type MomentumStream = ForecastStream<ForecastSnapshot>;

/// Forecast series for one cell.
pub type LongTermStream = ForecastStream<Vec<ForecastSnapshot>>;

/// Latest-value stream for one observed pair.
///
/// # Example
///
/// ```ignore
/// let mut stream = model.observe_momentum(Coordinate::new(59.9, 30.3));
/// while let Some(value) = stream.next().await {
///     match value {
///         Some(snapshot) => println!("{:.1} °C", snapshot.temperature.current),
///         None => println!("no data yet"),
///     }
/// }
/// ```
pub struct ForecastStream<T> {
    key: CacheKey,
    rx: watch::Receiver<Option<CacheEntry>>,
    primed: bool,
    _payload: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for ForecastStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForecastStream")
            .field("key", &self.key)
            .field("primed", &self.primed)
            .finish()
    }
}

impl<T: Payload> ForecastStream<T> {
    pub(crate) fn new(key: CacheKey, rx: watch::Receiver<Option<CacheEntry>>) -> Self {
        Self {
            key,
            rx,
            primed: false,
            _payload: PhantomData,
        }
    }

    /// The pair this stream observes.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// The latest value, without waiting and without consuming the update.
    pub fn current(&self) -> Option<T> {
        self.rx.borrow().clone().and_then(T::from_entry)
    }

    /// Whether polling for this pair has stopped.
    pub fn is_closed(&self) -> bool {
        self.rx.has_changed().is_err()
    }

    /// Wait until a new value is published. Returns `false` once polling has
    /// stopped. Read the value with [`current`](Self::current).
    pub async fn changed(&mut self) -> bool {
        self.primed = true;
        self.rx.changed().await.is_ok()
    }

    /// Wait for the next value.
    ///
    /// The first call returns the initial value immediately. Later calls wait
    /// for a fresh fetch. Returns `None` once polling has stopped.
    pub async fn next(&mut self) -> Option<Option<T>> {
        if !self.primed {
            self.primed = true;
            let initial = self.rx.borrow_and_update().clone();
            return Some(initial.and_then(T::from_entry));
        }

        self.rx.changed().await.ok()?;
        let value = self.rx.borrow_and_update().clone();
        Some(value.and_then(T::from_entry))
    }

    /// Convert into a [`futures::Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Option<T>> + Send + Unpin {
        Box::pin(stream::unfold(self, |mut s| async move {
            let item = s.next().await?;
            Some((item, s))
        }))
    }
}
