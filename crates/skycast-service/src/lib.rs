//! Background daemon that keeps forecasts for configured locations fresh.
//!
//! The service:
//! - Loads a list of locations from its configuration file
//! - Opens the persistent forecast cache
//! - Observes current conditions and the forecast series of every location,
//!   refreshing them from OpenWeatherMap on a fixed interval
//! - Logs every update until interrupted
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/skycast/service.toml`:
//!
//! ```toml
//! [storage]
//! path = "~/.local/share/skycast/cache.db"
//!
//! [polling]
//! interval_secs = 900
//!
//! [provider]
//! api_key = "your-openweathermap-key"
//! base_url = "https://api.openweathermap.org"
//!
//! [[locations]]
//! latitude = 59.93
//! longitude = 30.31
//! alias = "home"
//!
//! [[locations]]
//! latitude = 40.71
//! longitude = -74.0
//! long_term = false   # current conditions only
//! ```
//!
//! The API key can also be supplied through the `SKYCAST_API_KEY`
//! environment variable.

pub mod config;
pub mod watcher;

pub use config::{
    Config, ConfigError, LocationConfig, PollingConfig, ProviderConfig, StorageConfig,
    ValidationError,
};
pub use watcher::Watcher;
