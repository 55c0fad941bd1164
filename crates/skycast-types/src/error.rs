//! Error types for data parsing in skycast-types.

use thiserror::Error;

/// Errors that can occur when parsing skycast keys and values.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A serialized cache key did not have the `usage:lat:lon` shape.
    #[error("Invalid cache key '{0}': expected 'usage:latitude:longitude'")]
    InvalidCacheKey(String),

    /// Unknown usage type name.
    #[error("Unknown usage type: {0}")]
    UnknownUsageType(String),

    /// A field value is outside its valid range.
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Result type alias using skycast-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
