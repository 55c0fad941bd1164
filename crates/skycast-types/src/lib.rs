//! Platform-agnostic types for the skycast forecast cache.
//!
//! This crate provides the shared vocabulary used by the store, the core
//! scheduler and the service binary.
//!
//! # Features
//!
//! - Coordinates and 0.1° grid quantization
//! - Forecast snapshots with a validating builder
//! - Cache keys with a stable string form, and typed cache entries
//! - Error types for key and value parsing
//!
//! # Example
//!
//! ```
//! use skycast_types::{CacheKey, Coordinate, UsageType};
//!
//! let key = CacheKey::new(UsageType::LongTerm, Coordinate::new(12.9212, -152.6951));
//! assert_eq!(key.to_string(), "long_term:12.9:-152.7");
//! ```

pub mod coordinate;
pub mod error;
pub mod types;

pub use coordinate::{Coordinate, QuantizedCoordinate, quantize};
pub use error::{ParseError, ParseResult};
pub use types::{
    CacheEntry, CacheKey, Condition, ConditionCode, ForecastSnapshot, ForecastSnapshotBuilder,
    Precipitation, Temperatures, UsageType, Wind,
};
