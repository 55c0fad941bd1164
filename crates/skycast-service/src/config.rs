//! Daemon configuration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use skycast_core::PollConfig;
use skycast_core::openweather::DEFAULT_BASE_URL;
use skycast_types::{Coordinate, QuantizedCoordinate};

/// Daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage settings.
    pub storage: StorageConfig,
    /// Refresh settings.
    pub polling: PollingConfig,
    /// Weather provider settings.
    pub provider: ProviderConfig,
    /// Locations to keep fresh.
    #[serde(default)]
    pub locations: Vec<LocationConfig>,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return every problem found.
    ///
    /// This checks:
    /// - Storage path is not empty
    /// - Poll interval is within bounds (1 minute - 1 hour)
    /// - Provider base URL is http(s), and an API key is set when any
    ///   location is configured
    /// - Location coordinates are in range and each location observes
    ///   something
    /// - No two locations fall into the same grid cell
    ///
    /// # Example
    ///
    /// ```
    /// use skycast_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.storage.validate());
        errors.extend(self.polling.validate());
        errors.extend(self.provider.validate(!self.locations.is_empty()));

        let mut seen: HashMap<QuantizedCoordinate, usize> = HashMap::new();
        for (i, location) in self.locations.iter().enumerate() {
            let prefix = format!("locations[{}]", i);
            errors.extend(location.validate(&prefix));

            if let Some(first) = seen.insert(location.coordinate().quantized(), i) {
                errors.push(ValidationError {
                    field: prefix,
                    message: format!(
                        "same grid cell as locations[{}] ({})",
                        first,
                        location.coordinate().quantized()
                    ),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Model tuning derived from this configuration.
    pub fn poll_config(&self) -> PollConfig {
        PollConfig::default().poll_interval(Duration::from_secs(self.polling.interval_secs))
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: skycast_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.path".to_string(),
                message: "database path cannot be empty".to_string(),
            });
        }

        errors
    }
}

/// Minimum poll interval in seconds (1 minute).
pub const MIN_POLL_INTERVAL: u64 = 60;
/// Maximum poll interval in seconds (1 hour).
pub const MAX_POLL_INTERVAL: u64 = 3600;

/// Refresh configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Seconds between refreshes of one location.
    pub interval_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: skycast_core::DEFAULT_POLL_INTERVAL.as_secs(),
        }
    }
}

impl PollingConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.interval_secs < MIN_POLL_INTERVAL {
            errors.push(ValidationError {
                field: "polling.interval_secs".to_string(),
                message: format!(
                    "poll interval {} is too short (minimum {} seconds)",
                    self.interval_secs, MIN_POLL_INTERVAL
                ),
            });
        } else if self.interval_secs > MAX_POLL_INTERVAL {
            errors.push(ValidationError {
                field: "polling.interval_secs".to_string(),
                message: format!(
                    "poll interval {} is too long (maximum {} seconds / 1 hour)",
                    self.interval_secs, MAX_POLL_INTERVAL
                ),
            });
        }

        errors
    }
}

/// Weather provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// OpenWeatherMap application id.
    pub api_key: String,
    /// API root URL.
    pub base_url: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl ProviderConfig {
    /// Validate provider configuration. The API key is only required when
    /// there is something to fetch.
    pub fn validate(&self, key_required: bool) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            errors.push(ValidationError {
                field: "provider.base_url".to_string(),
                message: format!(
                    "URL must start with http:// or https://, got: {}",
                    self.base_url
                ),
            });
        }

        if key_required && self.api_key.trim().is_empty() {
            errors.push(ValidationError {
                field: "provider.api_key".to_string(),
                message: "API key is required when locations are configured".to_string(),
            });
        }

        errors
    }
}

/// A location to keep fresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    pub latitude: f64,
    pub longitude: f64,
    /// Friendly name for logs.
    #[serde(default)]
    pub alias: Option<String>,
    /// Keep current conditions fresh.
    #[serde(default = "default_true")]
    pub momentum: bool,
    /// Keep the forecast series fresh.
    #[serde(default = "default_true")]
    pub long_term: bool,
}

fn default_true() -> bool {
    true
}

impl LocationConfig {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            alias: None,
            momentum: true,
            long_term: true,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    /// Alias, or the coordinate when none is set.
    pub fn label(&self) -> String {
        self.alias
            .clone()
            .unwrap_or_else(|| self.coordinate().to_string())
    }

    pub fn validate(&self, prefix: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !(-90.0..=90.0).contains(&self.latitude) {
            errors.push(ValidationError {
                field: format!("{}.latitude", prefix),
                message: format!("latitude {} is outside -90..90", self.latitude),
            });
        }

        if !(-180.0..=180.0).contains(&self.longitude) {
            errors.push(ValidationError {
                field: format!("{}.longitude", prefix),
                message: format!("longitude {} is outside -180..180", self.longitude),
            });
        }

        if let Some(alias) = &self.alias
            && alias.is_empty()
        {
            errors.push(ValidationError {
                field: format!("{}.alias", prefix),
                message: "alias cannot be empty string (use null/omit instead)".to_string(),
            });
        }

        if !self.momentum && !self.long_term {
            errors.push(ValidationError {
                field: prefix.to_string(),
                message: "at least one of momentum or long_term must be enabled".to_string(),
            });
        }

        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `polling.interval_secs` or `locations[0].latitude`).
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("skycast")
        .join("service.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn with_key(mut config: Config) -> Config {
        config.provider.api_key = "secret".to_string();
        config
    }

    fn fields(config: &Config) -> Vec<String> {
        match config.validate() {
            Err(ConfigError::Validation(errors)) => errors.into_iter().map(|e| e.field).collect(),
            Err(e) => panic!("unexpected error {e}"),
            Ok(()) => Vec::new(),
        }
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.polling.interval_secs, 900);
        assert_eq!(config.provider.base_url, DEFAULT_BASE_URL);
        assert!(config.locations.is_empty());
        assert!(config.storage.path.ends_with("skycast/cache.db"));
    }

    #[test]
    fn test_default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_location_serde_defaults() {
        let location: LocationConfig = toml::from_str("latitude = 59.9\nlongitude = 30.3").unwrap();
        assert!(location.momentum);
        assert!(location.long_term);
        assert!(location.alias.is_none());
        assert_eq!(location.label(), "(59.9000, 30.3000)");
    }

    #[test]
    fn test_config_full_toml() {
        let toml_str = r#"
            [storage]
            path = "/tmp/skycast.db"

            [polling]
            interval_secs = 600

            [provider]
            api_key = "abc123"
            base_url = "http://localhost:9000"

            [[locations]]
            latitude = 59.93
            longitude = 30.31
            alias = "home"

            [[locations]]
            latitude = 40.71
            longitude = -74.0
            long_term = false
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.storage.path, PathBuf::from("/tmp/skycast.db"));
        assert_eq!(config.locations.len(), 2);
        assert_eq!(config.locations[0].label(), "home");
        assert!(!config.locations[1].long_term);
        assert_eq!(config.poll_config().poll_interval, Duration::from_secs(600));
        config.validate().unwrap();
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("service.toml");

        let mut config = with_key(Config::default());
        config.locations.push(LocationConfig::new(51.5, -0.1));
        config.save(&path).unwrap();

        let loaded = Config::load_validated(&path).unwrap();
        assert_eq!(loaded.provider.api_key, "secret");
        assert_eq!(loaded.locations.len(), 1);
        assert_eq!(loaded.locations[0].latitude, 51.5);
    }

    #[test]
    fn test_config_load_errors() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(Config::load(&missing), Err(ConfigError::Read { .. })));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "polling = [").unwrap();
        assert!(matches!(Config::load(&bad), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_interval_bounds() {
        let mut config = Config::default();
        config.polling.interval_secs = 59;
        assert_eq!(fields(&config), vec!["polling.interval_secs"]);

        config.polling.interval_secs = 3601;
        assert_eq!(fields(&config), vec!["polling.interval_secs"]);

        config.polling.interval_secs = 60;
        assert!(fields(&config).is_empty());
    }

    #[test]
    fn test_api_key_required_with_locations() {
        let mut config = Config::default();
        config.locations.push(LocationConfig::new(10.0, 10.0));
        assert_eq!(fields(&config), vec!["provider.api_key"]);

        assert!(fields(&with_key(config)).is_empty());
    }

    #[test]
    fn test_location_validation() {
        let mut config = with_key(Config::default());
        let mut bad = LocationConfig::new(91.0, -181.0);
        bad.alias = Some(String::new());
        bad.momentum = false;
        bad.long_term = false;
        config.locations.push(bad);

        assert_eq!(
            fields(&config),
            vec![
                "locations[0].latitude",
                "locations[0].longitude",
                "locations[0].alias",
                "locations[0]",
            ]
        );
    }

    #[test]
    fn test_duplicate_grid_cells() {
        let mut config = with_key(Config::default());
        config.locations.push(LocationConfig::new(59.93, 30.31));
        config.locations.push(LocationConfig::new(59.88, 30.27));
        config.locations.push(LocationConfig::new(59.7, 30.3));

        let errors = match config.validate() {
            Err(ConfigError::Validation(errors)) => errors,
            other => panic!("expected validation error, got {other:?}"),
        };
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "locations[1]");
        assert!(errors[0].message.contains("locations[0]"));
    }

    #[test]
    fn test_base_url_validation() {
        let mut config = Config::default();
        config.provider.base_url = "api.openweathermap.org".to_string();
        assert_eq!(fields(&config), vec!["provider.base_url"]);
    }

    #[test]
    fn test_config_error_display() {
        let error = ConfigError::Validation(vec![ValidationError {
            field: "locations[0].latitude".to_string(),
            message: "latitude 91 is outside -90..90".to_string(),
        }]);
        assert_eq!(
            error.to_string(),
            "Configuration validation failed:\n  - locations[0].latitude: latitude 91 is outside -90..90"
        );
    }

    #[test]
    fn test_default_config_path() {
        assert!(default_config_path().ends_with("skycast/service.toml"));
    }
}
