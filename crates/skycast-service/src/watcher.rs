//! Background location watcher.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use skycast_core::{ForecastModel, ForecastSnapshot, LongTermStream, MomentumStream};

use crate::config::LocationConfig;

/// Observes every configured location and logs each update.
///
/// The tasks end when polling stops, i.e. after
/// [`ForecastModel::stop_all_polling`].
pub struct Watcher {
    model: Arc<ForecastModel>,
    locations: Vec<LocationConfig>,
}

impl Watcher {
    pub fn new(model: Arc<ForecastModel>, locations: Vec<LocationConfig>) -> Self {
        Self { model, locations }
    }

    /// Start observing all configured locations.
    ///
    /// Spawns one task per observed stream and returns immediately.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        if self.locations.is_empty() {
            info!("No locations configured");
            return Vec::new();
        }

        info!("Watching {} location(s)", self.locations.len());

        let mut tasks = Vec::new();
        for location in &self.locations {
            let label = location.label();
            let coordinate = location.coordinate();

            if location.momentum {
                let stream = self.model.observe_momentum(coordinate);
                tasks.push(tokio::spawn(watch_momentum(label.clone(), stream)));
            }
            if location.long_term {
                let stream = self.model.observe_long_term(coordinate);
                tasks.push(tokio::spawn(watch_long_term(label, stream)));
            }
        }
        tasks
    }
}

fn describe(snapshot: &ForecastSnapshot) -> String {
    format!(
        "{:.1} °C (feels {:.1}), {}, {}% humidity",
        snapshot.temperature.current,
        snapshot.temperature.feels_like,
        snapshot.condition.description,
        snapshot.humidity
    )
}

async fn watch_momentum(label: String, mut stream: MomentumStream) {
    while let Some(value) = stream.next().await {
        match value {
            Some(snapshot) => info!("{}: now {}", label, describe(&snapshot)),
            None => debug!("{}: no current conditions yet", label),
        }
    }
    debug!("{}: stopped watching current conditions", label);
}

async fn watch_long_term(label: String, mut stream: LongTermStream) {
    while let Some(value) = stream.next().await {
        match value.as_deref() {
            Some(slots @ [first, .., last]) => info!(
                "{}: {} forecast slots, next {}, last {}",
                label,
                slots.len(),
                describe(first),
                describe(last)
            ),
            Some([only]) => info!("{}: 1 forecast slot, {}", label, describe(only)),
            Some([]) | None => debug!("{}: no forecast yet", label),
        }
    }
    debug!("{}: stopped watching forecast", label);
}
