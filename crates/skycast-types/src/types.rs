//! Core types for forecast data and cache addressing.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::coordinate::{Coordinate, QuantizedCoordinate};
use crate::error::ParseError;

/// Which forecast bucket a request targets.
///
/// The usage type selects both the cache bucket and the upstream endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum UsageType {
    /// A single current-conditions snapshot.
    Momentum,
    /// An ordered series of forecast slots covering the next several days.
    LongTerm,
}

impl UsageType {
    /// Both usage types, in a stable order.
    pub const ALL: [UsageType; 2] = [UsageType::Momentum, UsageType::LongTerm];

    /// Stable lowercase name used in cache keys and configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// use skycast_types::UsageType;
    ///
    /// assert_eq!(UsageType::Momentum.as_str(), "momentum");
    /// assert_eq!(UsageType::LongTerm.as_str(), "long_term");
    /// ```
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            UsageType::Momentum => "momentum",
            UsageType::LongTerm => "long_term",
        }
    }
}

impl fmt::Display for UsageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UsageType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "momentum" => Ok(UsageType::Momentum),
            "long_term" => Ok(UsageType::LongTerm),
            other => Err(ParseError::UnknownUsageType(other.to_string())),
        }
    }
}

/// Broad weather condition class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[non_exhaustive]
pub enum ConditionCode {
    Thunderstorm,
    Drizzle,
    Rain,
    Snow,
    /// The provider's "Atmosphere" group title. Individual titles such as
    /// "Mist" or "Fog" are not mapped here and classify as `Clouds`.
    Atmosphere,
    Clear,
    #[default]
    Clouds,
}

impl ConditionCode {
    /// Classify a provider condition title.
    ///
    /// Matching is exact. Any title that is not one of the known groups
    /// classifies as [`ConditionCode::Clouds`].
    ///
    /// # Examples
    ///
    /// ```
    /// use skycast_types::ConditionCode;
    ///
    /// assert_eq!(ConditionCode::from_title("Rain"), ConditionCode::Rain);
    /// assert_eq!(ConditionCode::from_title("Clouds"), ConditionCode::Clouds);
    /// assert_eq!(ConditionCode::from_title("Atmosphere"), ConditionCode::Atmosphere);
    /// assert_eq!(ConditionCode::from_title("Mist"), ConditionCode::Clouds);
    /// ```
    #[must_use]
    pub fn from_title(title: &str) -> Self {
        match title {
            "Thunderstorm" => ConditionCode::Thunderstorm,
            "Drizzle" => ConditionCode::Drizzle,
            "Rain" => ConditionCode::Rain,
            "Snow" => ConditionCode::Snow,
            "Atmosphere" => ConditionCode::Atmosphere,
            "Clear" => ConditionCode::Clear,
            _ => ConditionCode::Clouds,
        }
    }

    /// Whether this condition involves falling precipitation.
    #[must_use]
    pub fn is_precipitation(&self) -> bool {
        matches!(
            self,
            ConditionCode::Thunderstorm
                | ConditionCode::Drizzle
                | ConditionCode::Rain
                | ConditionCode::Snow
        )
    }
}

impl fmt::Display for ConditionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConditionCode::Thunderstorm => "thunderstorm",
            ConditionCode::Drizzle => "drizzle",
            ConditionCode::Rain => "rain",
            ConditionCode::Snow => "snow",
            ConditionCode::Atmosphere => "atmosphere",
            ConditionCode::Clear => "clear",
            ConditionCode::Clouds => "clouds",
        };
        f.write_str(name)
    }
}

/// Classified condition plus the provider's free text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Condition {
    pub code: ConditionCode,
    /// Short group title, e.g. "Rain".
    pub title: String,
    /// Longer description, e.g. "light rain".
    pub description: String,
}

impl Condition {
    /// Build a condition, classifying the title.
    #[must_use]
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            code: ConditionCode::from_title(&title),
            title,
            description: description.into(),
        }
    }
}

/// Temperatures in degrees Celsius.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Temperatures {
    pub current: f64,
    pub feels_like: f64,
    pub min: f64,
    pub max: f64,
}

/// Wind measurement.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Wind {
    /// Speed in meters per second.
    pub speed: f64,
    /// Meteorological direction in degrees (0-360).
    pub degrees: u16,
    /// Gust speed in meters per second.
    pub gust: Option<f64>,
}

/// Precipitation volumes and probability.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Precipitation {
    /// Rain volume over the last 3 hours, in mm.
    pub rain: Option<f64>,
    /// Snow volume over the last 3 hours, in mm.
    pub snow: Option<f64>,
    /// Probability of precipitation (0.0-1.0).
    pub probability: Option<f64>,
}

/// One observation or forecast slot.
///
/// Snapshots are immutable values. Use [`ForecastSnapshot::builder`] to
/// construct one.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ForecastSnapshot {
    /// Observation or slot time, in Unix seconds.
    pub timestamp: i64,
    /// Offset of the location's local time from UTC, in seconds.
    pub utc_offset: i32,
    /// Coordinate reported by the provider for this snapshot.
    pub coordinate: Option<Coordinate>,
    pub temperature: Temperatures,
    /// Relative humidity in percent (0-100).
    pub humidity: u8,
    /// Atmospheric pressure in hPa.
    pub pressure: u32,
    /// Pressure at sea level in hPa.
    pub sea_level_pressure: Option<u32>,
    /// Pressure at ground level in hPa.
    pub ground_level_pressure: Option<u32>,
    pub wind: Option<Wind>,
    pub condition: Condition,
    /// Cloud cover in percent (0-100).
    pub cloud_cover: Option<u8>,
    /// Visibility in meters.
    pub visibility: Option<u32>,
    pub precipitation: Precipitation,
    /// Sunrise, in Unix seconds.
    pub sunrise: Option<i64>,
    /// Sunset, in Unix seconds.
    pub sunset: Option<i64>,
}

impl ForecastSnapshot {
    /// Create a builder for a snapshot at `timestamp` (Unix seconds).
    pub fn builder(timestamp: i64) -> ForecastSnapshotBuilder {
        ForecastSnapshotBuilder {
            snapshot: ForecastSnapshot {
                timestamp,
                ..Default::default()
            },
        }
    }

    /// Seconds elapsed between this snapshot and `now`. Negative for future slots.
    #[must_use]
    pub fn age_at(&self, now: i64) -> i64 {
        now - self.timestamp
    }
}

/// Builder for [`ForecastSnapshot`].
///
/// Use [`build`](Self::build) for unchecked construction, or [`try_build`](Self::try_build)
/// for validation of field values.
#[derive(Debug, Default)]
#[must_use]
pub struct ForecastSnapshotBuilder {
    snapshot: ForecastSnapshot,
}

impl ForecastSnapshotBuilder {
    /// Set the UTC offset in seconds.
    pub fn utc_offset(mut self, seconds: i32) -> Self {
        self.snapshot.utc_offset = seconds;
        self
    }

    /// Set the reported coordinate.
    pub fn coordinate(mut self, coordinate: Coordinate) -> Self {
        self.snapshot.coordinate = Some(coordinate);
        self
    }

    /// Set the current temperature. Also used for feels-like, min and max
    /// until they are set explicitly.
    pub fn temperature(mut self, celsius: f64) -> Self {
        self.snapshot.temperature = Temperatures {
            current: celsius,
            feels_like: celsius,
            min: celsius,
            max: celsius,
        };
        self
    }

    /// Set the full temperature set.
    pub fn temperatures(mut self, temperatures: Temperatures) -> Self {
        self.snapshot.temperature = temperatures;
        self
    }

    /// Set humidity (0-100).
    pub fn humidity(mut self, humidity: u8) -> Self {
        self.snapshot.humidity = humidity;
        self
    }

    /// Set pressure in hPa.
    pub fn pressure(mut self, pressure: u32) -> Self {
        self.snapshot.pressure = pressure;
        self
    }

    /// Set sea-level and ground-level pressure.
    pub fn level_pressures(mut self, sea_level: Option<u32>, ground_level: Option<u32>) -> Self {
        self.snapshot.sea_level_pressure = sea_level;
        self.snapshot.ground_level_pressure = ground_level;
        self
    }

    /// Set wind.
    pub fn wind(mut self, wind: Wind) -> Self {
        self.snapshot.wind = Some(wind);
        self
    }

    /// Set the condition.
    pub fn condition(mut self, condition: Condition) -> Self {
        self.snapshot.condition = condition;
        self
    }

    /// Set cloud cover percentage.
    pub fn cloud_cover(mut self, percent: u8) -> Self {
        self.snapshot.cloud_cover = Some(percent);
        self
    }

    /// Set visibility in meters.
    pub fn visibility(mut self, meters: u32) -> Self {
        self.snapshot.visibility = Some(meters);
        self
    }

    /// Set precipitation.
    pub fn precipitation(mut self, precipitation: Precipitation) -> Self {
        self.snapshot.precipitation = precipitation;
        self
    }

    /// Set sunrise and sunset (Unix seconds).
    pub fn sun(mut self, sunrise: Option<i64>, sunset: Option<i64>) -> Self {
        self.snapshot.sunrise = sunrise;
        self.snapshot.sunset = sunset;
        self
    }

    /// Build the snapshot without validation.
    #[must_use]
    pub fn build(self) -> ForecastSnapshot {
        self.snapshot
    }

    /// Build the snapshot with validation.
    ///
    /// Validates:
    /// - `humidity` and `cloud_cover` are 0-100
    /// - temperatures are finite
    /// - precipitation probability is 0.0-1.0
    /// - wind direction is 0-360
    /// - the reported coordinate, if any, is in range
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidValue`] if any field has an invalid value.
    pub fn try_build(self) -> Result<ForecastSnapshot, ParseError> {
        let s = &self.snapshot;

        if s.humidity > 100 {
            return Err(ParseError::InvalidValue(format!(
                "humidity {} exceeds maximum of 100",
                s.humidity
            )));
        }

        if let Some(clouds) = s.cloud_cover
            && clouds > 100
        {
            return Err(ParseError::InvalidValue(format!(
                "cloud cover {clouds} exceeds maximum of 100"
            )));
        }

        let t = &s.temperature;
        if ![t.current, t.feels_like, t.min, t.max]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(ParseError::InvalidValue(
                "temperature must be finite".to_string(),
            ));
        }

        if let Some(p) = s.precipitation.probability
            && !(0.0..=1.0).contains(&p)
        {
            return Err(ParseError::InvalidValue(format!(
                "precipitation probability {p} is outside 0.0-1.0"
            )));
        }

        if let Some(wind) = &s.wind
            && wind.degrees > 360
        {
            return Err(ParseError::InvalidValue(format!(
                "wind direction {} exceeds 360 degrees",
                wind.degrees
            )));
        }

        if let Some(coord) = &s.coordinate
            && !coord.is_valid()
        {
            return Err(ParseError::InvalidValue(format!(
                "coordinate {coord} is out of range"
            )));
        }

        Ok(self.snapshot)
    }
}

/// Address of one cache bucket: a usage type at a grid cell.
///
/// The serialized form is `"<usage>:<lat>:<lon>"` with one decimal per
/// component.
///
/// # Examples
///
/// ```
/// use skycast_types::{CacheKey, Coordinate, UsageType};
///
/// let key = CacheKey::new(UsageType::Momentum, Coordinate::new(59.9104, 30.2842));
/// assert_eq!(key.to_string(), "momentum:59.9:30.3");
/// assert_eq!("momentum:59.9:30.3".parse::<CacheKey>().unwrap(), key);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(into = "String", try_from = "String"))]
pub struct CacheKey {
    pub usage: UsageType,
    pub cell: QuantizedCoordinate,
}

impl CacheKey {
    /// Build a key, quantizing the coordinate.
    #[must_use]
    pub fn new(usage: UsageType, coordinate: Coordinate) -> Self {
        Self {
            usage,
            cell: coordinate.quantized(),
        }
    }

    /// Build a key for an already quantized cell.
    #[must_use]
    pub const fn for_cell(usage: UsageType, cell: QuantizedCoordinate) -> Self {
        Self { usage, cell }
    }

    /// Key for the momentum bucket at a coordinate.
    #[must_use]
    pub fn momentum(coordinate: Coordinate) -> Self {
        Self::new(UsageType::Momentum, coordinate)
    }

    /// Key for the long-term bucket at a coordinate.
    #[must_use]
    pub fn long_term(coordinate: Coordinate) -> Self {
        Self::new(UsageType::LongTerm, coordinate)
    }

    /// Center of the key's grid cell.
    #[must_use]
    pub fn coordinate(&self) -> Coordinate {
        self.cell.to_coordinate()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.usage, self.cell)
    }
}

impl FromStr for CacheKey {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidCacheKey(s.to_string());

        let mut parts = s.split(':');
        let (Some(usage), Some(lat), Some(lon), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        let usage = usage.parse::<UsageType>()?;
        let latitude: f64 = lat.trim().parse().map_err(|_| invalid())?;
        let longitude: f64 = lon.trim().parse().map_err(|_| invalid())?;

        let coordinate = Coordinate::new(latitude, longitude);
        if !coordinate.is_valid() {
            return Err(invalid());
        }

        Ok(Self::new(usage, coordinate))
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for CacheKey {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A cached payload. The variant always matches the usage type of the key
/// it is stored under.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "usage", content = "data", rename_all = "snake_case")
)]
pub enum CacheEntry {
    Momentum(ForecastSnapshot),
    /// Slots ordered by timestamp, ascending.
    LongTerm(Vec<ForecastSnapshot>),
}

impl CacheEntry {
    /// Build a long-term entry, ordering the slots by timestamp.
    #[must_use]
    pub fn long_term(mut slots: Vec<ForecastSnapshot>) -> Self {
        slots.sort_by_key(|s| s.timestamp);
        CacheEntry::LongTerm(slots)
    }

    /// The usage type this entry belongs to.
    #[must_use]
    pub fn usage(&self) -> UsageType {
        match self {
            CacheEntry::Momentum(_) => UsageType::Momentum,
            CacheEntry::LongTerm(_) => UsageType::LongTerm,
        }
    }

    /// Borrow the momentum snapshot, if this is a momentum entry.
    #[must_use]
    pub fn as_momentum(&self) -> Option<&ForecastSnapshot> {
        match self {
            CacheEntry::Momentum(s) => Some(s),
            CacheEntry::LongTerm(_) => None,
        }
    }

    /// Borrow the long-term slots, if this is a long-term entry.
    #[must_use]
    pub fn as_long_term(&self) -> Option<&[ForecastSnapshot]> {
        match self {
            CacheEntry::LongTerm(slots) => Some(slots),
            CacheEntry::Momentum(_) => None,
        }
    }

    /// Take the momentum snapshot.
    #[must_use]
    pub fn into_momentum(self) -> Option<ForecastSnapshot> {
        match self {
            CacheEntry::Momentum(s) => Some(s),
            CacheEntry::LongTerm(_) => None,
        }
    }

    /// Take the long-term slots.
    #[must_use]
    pub fn into_long_term(self) -> Option<Vec<ForecastSnapshot>> {
        match self {
            CacheEntry::LongTerm(slots) => Some(slots),
            CacheEntry::Momentum(_) => None,
        }
    }
}

impl From<ForecastSnapshot> for CacheEntry {
    fn from(snapshot: ForecastSnapshot) -> Self {
        CacheEntry::Momentum(snapshot)
    }
}

impl From<Vec<ForecastSnapshot>> for CacheEntry {
    fn from(slots: Vec<ForecastSnapshot>) -> Self {
        CacheEntry::long_term(slots)
    }
}
