//! Geographic coordinates and grid quantization.
//!
//! Raw GPS fixes jitter by a few meters between requests. To keep the number
//! of cache entries and poll timers bounded, every coordinate is snapped to a
//! 0.1° grid before it is used as a key. One grid cell is roughly 11 km at the
//! equator.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of grid cells per degree.
pub const GRID_CELLS_PER_DEGREE: f64 = 10.0;

/// A latitude/longitude pair in degrees.
///
/// `Coordinate` deliberately does not implement `Eq` or `Hash`: raw floating
/// point input is never used as a lookup key. Convert to a
/// [`QuantizedCoordinate`] for that.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Coordinate {
    /// Latitude in degrees (-90 to 90).
    pub latitude: f64,
    /// Longitude in degrees (-180 to 180).
    pub longitude: f64,
}

impl Coordinate {
    /// Create a coordinate from latitude and longitude in degrees.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Snap this coordinate to the 0.1° grid.
    #[must_use]
    pub fn quantized(&self) -> QuantizedCoordinate {
        QuantizedCoordinate::from(*self)
    }

    /// Check whether latitude and longitude are finite and within range.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4})", self.latitude, self.longitude)
    }
}

/// Snap a coordinate to the 0.1° grid.
///
/// Each component becomes `round(value * 10) / 10`, rounding half away from
/// zero.
///
/// ```
/// use skycast_types::{quantize, Coordinate};
///
/// let snapped = quantize(Coordinate::new(59.9104, 30.2842));
/// assert_eq!(snapped, Coordinate::new(59.9, 30.3));
///
/// let negative = quantize(Coordinate::new(-27.35, -113.6213));
/// assert_eq!(negative.longitude, -113.6);
/// ```
#[must_use]
pub fn quantize(coord: Coordinate) -> Coordinate {
    coord.quantized().to_coordinate()
}

/// A coordinate snapped to the 0.1° grid.
///
/// Stored as integer tenths of a degree so that equality and hashing are
/// exact. This is the only coordinate form used for cache and poll keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QuantizedCoordinate {
    lat_tenths: i32,
    lon_tenths: i32,
}

impl QuantizedCoordinate {
    /// Build directly from tenths of a degree.
    #[must_use]
    pub const fn from_tenths(lat_tenths: i32, lon_tenths: i32) -> Self {
        Self {
            lat_tenths,
            lon_tenths,
        }
    }

    /// Latitude in tenths of a degree.
    #[must_use]
    pub const fn lat_tenths(&self) -> i32 {
        self.lat_tenths
    }

    /// Longitude in tenths of a degree.
    #[must_use]
    pub const fn lon_tenths(&self) -> i32 {
        self.lon_tenths
    }

    /// Snapped latitude in degrees.
    #[must_use]
    pub fn latitude(&self) -> f64 {
        f64::from(self.lat_tenths) / GRID_CELLS_PER_DEGREE
    }

    /// Snapped longitude in degrees.
    #[must_use]
    pub fn longitude(&self) -> f64 {
        f64::from(self.lon_tenths) / GRID_CELLS_PER_DEGREE
    }

    /// Convert back to a plain [`Coordinate`] at the cell center.
    #[must_use]
    pub fn to_coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude(), self.longitude())
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_tenths(degrees: f64) -> i32 {
    // `f64::round` rounds half away from zero; the cast saturates on
    // out-of-range input and maps NaN to 0.
    (degrees * GRID_CELLS_PER_DEGREE).round() as i32
}

impl From<Coordinate> for QuantizedCoordinate {
    fn from(coord: Coordinate) -> Self {
        Self {
            lat_tenths: to_tenths(coord.latitude),
            lon_tenths: to_tenths(coord.longitude),
        }
    }
}

impl From<QuantizedCoordinate> for Coordinate {
    fn from(q: QuantizedCoordinate) -> Self {
        q.to_coordinate()
    }
}

impl fmt::Display for QuantizedCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}:{:.1}", self.latitude(), self.longitude())
    }
}

#[cfg(feature = "serde")]
impl Serialize for QuantizedCoordinate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_coordinate().serialize(serializer)
    }
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for QuantizedCoordinate {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Coordinate::deserialize(deserializer).map(Self::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_rounds_to_tenths() {
        assert_eq!(quantize(Coordinate::new(59.9104, 30.2842)), Coordinate::new(59.9, 30.3));
        assert_eq!(quantize(Coordinate::new(29.978479, -91.973998)), Coordinate::new(30.0, -92.0));
        assert_eq!(quantize(Coordinate::new(12.9212, -152.6951)), Coordinate::new(12.9, -152.7));
    }

    #[test]
    fn test_quantize_half_away_from_zero() {
        assert_eq!(QuantizedCoordinate::from(Coordinate::new(0.25, -0.25)).lat_tenths(), 3);
        assert_eq!(QuantizedCoordinate::from(Coordinate::new(0.25, -0.25)).lon_tenths(), -3);
    }

    #[test]
    fn test_quantize_is_idempotent() {
        let once = quantize(Coordinate::new(43.6249, 108.9219));
        assert_eq!(quantize(once), once);
    }

    #[test]
    fn test_quantized_display() {
        let q = Coordinate::new(-27.3106, -113.6213).quantized();
        assert_eq!(q.to_string(), "-27.3:-113.6");

        let zero = Coordinate::new(0.01, -0.01).quantized();
        assert_eq!(zero.to_string(), "0.0:0.0");
    }

    #[test]
    fn test_coordinate_validity() {
        assert!(Coordinate::new(59.9, 30.3).is_valid());
        assert!(!Coordinate::new(91.0, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, -181.0).is_valid());
        assert!(!Coordinate::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_quantized_equality_ignores_jitter() {
        let a = Coordinate::new(59.9104, 30.2842).quantized();
        let b = Coordinate::new(59.9301, 30.2611).quantized();
        assert_eq!(a, b);
    }
}
