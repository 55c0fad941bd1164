//! Forecast event broadcasting.
//!
//! The scheduler and the model report polling lifecycle changes, fresh data
//! and fetch failures as [`ForecastEvent`]s. Events are informational: the
//! forecast streams themselves never carry errors.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use skycast_types::CacheKey;

/// Events emitted while observing forecasts.
///
/// All events are serializable for logging and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ForecastEvent {
    /// A poll task was started for a pair.
    PollingStarted { key: CacheKey },
    /// A poll task was stopped.
    PollingStopped { key: CacheKey },
    /// A cache lookup was answered (`fresh`, `derived` or `miss`).
    Resolved { key: CacheKey, resolution: String },
    /// A fetch succeeded and was cached and published.
    Updated {
        key: CacheKey,
        /// Number of snapshots in the new entry.
        snapshots: usize,
    },
    /// A fetch failed; the previous value stays in place.
    FetchFailed { key: CacheKey, error: String },
}

impl ForecastEvent {
    /// The pair this event concerns.
    pub fn key(&self) -> &CacheKey {
        match self {
            ForecastEvent::PollingStarted { key }
            | ForecastEvent::PollingStopped { key }
            | ForecastEvent::Resolved { key, .. }
            | ForecastEvent::Updated { key, .. }
            | ForecastEvent::FetchFailed { key, .. } => key,
        }
    }
}

/// Sender for forecast events.
pub type EventSender = broadcast::Sender<ForecastEvent>;

/// Receiver for forecast events.
pub type EventReceiver = broadcast::Receiver<ForecastEvent>;

/// Fans events out to any number of receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event. Dropped silently when nobody listens.
    pub fn send(&self, event: ForecastEvent) {
        let _ = self.sender.send(event);
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skycast_types::Coordinate;

    fn key() -> CacheKey {
        CacheKey::momentum(Coordinate::new(59.9, 30.3))
    }

    #[test]
    fn test_event_serialization() {
        let event = ForecastEvent::Updated {
            key: key(),
            snapshots: 1,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"type":"updated","key":"momentum:59.9:30.3","snapshots":1}"#
        );

        let back: ForecastEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_event_key() {
        let event = ForecastEvent::FetchFailed {
            key: key(),
            error: "timeout".to_string(),
        };
        assert_eq!(event.key(), &key());
    }

    #[tokio::test]
    async fn test_dispatcher_fan_out() {
        let dispatcher = EventDispatcher::default();
        let mut a = dispatcher.subscribe();
        let mut b = dispatcher.subscribe();
        assert_eq!(dispatcher.receiver_count(), 2);

        dispatcher.send(ForecastEvent::PollingStarted { key: key() });

        assert_eq!(a.recv().await.unwrap().key(), &key());
        assert_eq!(b.recv().await.unwrap().key(), &key());
    }

    #[test]
    fn test_send_without_receivers() {
        let dispatcher = EventDispatcher::new(4);
        dispatcher.send(ForecastEvent::PollingStopped { key: key() });
        assert_eq!(dispatcher.receiver_count(), 0);
    }
}
