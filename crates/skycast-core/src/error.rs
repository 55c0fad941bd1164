//! Error types for skycast-core.
//!
//! Errors in this crate never reach a forecast stream. A failed fetch is
//! logged, counted in the fetch metrics and retried on the next poll tick;
//! the stream keeps showing the last good value.
//!
//! # Error Classification
//!
//! | Error Type | Origin | Effect on polling |
//! |------------|--------|-------------------|
//! | [`Error::Source`] | Data source failed for any other reason | Retried next tick |
//! | [`Error::Upstream`] | Provider answered with a non-success code | Retried next tick |
//! | [`Error::MalformedPayload`] | Provider payload missing required fields | Retried next tick |
//! | [`Error::Http`] | Transport error or timeout (feature `openweather`) | Retried next tick |
//! | [`Error::Store`] | Persistence layer failure | Swallowed by the cache |
//! | [`Error::InvalidConfig`] | Bad [`crate::PollConfig`] | Fix configuration and restart |

use thiserror::Error;

/// Errors that can occur while fetching or caching forecasts.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The weather data source failed.
    #[error("Data source error: {0}")]
    Source(String),

    /// The provider answered with a non-success status or `cod`.
    #[error("Upstream returned status {status}")]
    Upstream {
        /// HTTP status or provider result code.
        status: u16,
    },

    /// The provider payload could not be interpreted.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// HTTP transport error.
    #[cfg(feature = "openweather")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Persistence layer error.
    #[error("Store error: {0}")]
    Store(#[from] skycast_store::Error),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a data source error.
    pub fn source_failure(message: impl Into<String>) -> Self {
        Self::Source(message.into())
    }

    /// Create a malformed payload error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedPayload(message.into())
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

impl From<skycast_types::ParseError> for Error {
    fn from(err: skycast_types::ParseError) -> Self {
        Error::MalformedPayload(err.to_string())
    }
}

/// Result type alias using skycast-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
