//! OpenWeatherMap data source.
//!
//! Fetches current conditions from `/data/2.5/weather` and the 5-day, 3-hour
//! forecast from `/data/2.5/forecast`. Temperatures arrive in Kelvin and are
//! converted to Celsius.
//!
//! Only the timestamp, the `main` block and the first `weather` entry are
//! required; every other field is optional. A payload missing a required field
//! or carrying a non-success `cod` fails the fetch.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use skycast_types::{
    Condition, Coordinate, ForecastSnapshot, Precipitation, Temperatures, Wind,
};

use crate::error::{Error, Result};
use crate::traits::WeatherSource;

/// Public OpenWeatherMap API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

/// HTTP timeout for one request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const KELVIN_OFFSET: f64 = 273.15;

fn kelvin_to_celsius(kelvin: f64) -> f64 {
    kelvin - KELVIN_OFFSET
}

/// Client for the OpenWeatherMap 2.5 API.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenWeatherClient {
    /// Create a client.
    ///
    /// # Arguments
    ///
    /// * `api_key` - OpenWeatherMap application id
    /// * `base_url` - API root, e.g. [`DEFAULT_BASE_URL`]
    pub fn new(api_key: impl Into<String>, base_url: &str) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Self::with_client(api_key, base_url, client)
    }

    /// Create a client with a custom reqwest Client.
    pub fn with_client(api_key: impl Into<String>, base_url: &str, client: Client) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::invalid_config(format!(
                "URL must start with http:// or https://, got: {}",
                base_url
            )));
        }

        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::invalid_config("API key must not be empty"));
        }

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str, coordinate: Coordinate) -> Result<T> {
        let url = format!("{}/data/2.5/{}", self.base_url, endpoint);
        debug!("GET {} at {}", url, coordinate);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("lat", coordinate.latitude.to_string()),
                ("lon", coordinate.longitude.to_string()),
                ("appid", self.api_key.clone()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Upstream {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| Error::malformed(e.to_string()))
    }
}

#[async_trait]
impl WeatherSource for OpenWeatherClient {
    async fn fetch_current(&self, coordinate: Coordinate) -> Result<ForecastSnapshot> {
        let payload: CurrentPayload = self.get("weather", coordinate).await?;
        payload.into_snapshot()
    }

    async fn fetch_forecast_series(&self, coordinate: Coordinate) -> Result<Vec<ForecastSnapshot>> {
        let payload: ForecastPayload = self.get("forecast", coordinate).await?;
        payload.into_snapshots()
    }

    fn name(&self) -> &str {
        "openweathermap"
    }
}

// ==========================================================================
// Wire models
// ==========================================================================

/// `cod` is a number on `/weather` and a string on `/forecast`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Cod {
    Number(u16),
    Text(String),
}

impl Cod {
    fn check(&self) -> Result<()> {
        let code = match self {
            Cod::Number(n) => *n,
            Cod::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| Error::malformed(format!("unexpected cod {s:?}")))?,
        };
        if code == 200 {
            Ok(())
        } else {
            Err(Error::Upstream { status: code })
        }
    }
}

fn check_cod(cod: Option<&Cod>) -> Result<()> {
    cod.map_or(Ok(()), Cod::check)
}

#[derive(Debug, Deserialize)]
struct MainBlock {
    temp: Option<f64>,
    feels_like: Option<f64>,
    temp_min: Option<f64>,
    temp_max: Option<f64>,
    pressure: Option<f64>,
    humidity: Option<f64>,
    sea_level: Option<f64>,
    grnd_level: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WeatherBlock {
    main: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct CloudsBlock {
    all: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct WindBlock {
    speed: Option<f64>,
    deg: Option<f64>,
    gust: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct VolumeBlock {
    #[serde(rename = "3h")]
    three_hours: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CoordBlock {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct SysBlock {
    sunrise: Option<i64>,
    sunset: Option<i64>,
}

/// Fields shared by a `/weather` payload and one `/forecast` list item.
#[derive(Debug, Deserialize)]
struct Observation {
    dt: Option<i64>,
    main: Option<MainBlock>,
    #[serde(default)]
    weather: Vec<WeatherBlock>,
    clouds: Option<CloudsBlock>,
    wind: Option<WindBlock>,
    visibility: Option<u32>,
    rain: Option<VolumeBlock>,
    snow: Option<VolumeBlock>,
    pop: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CurrentPayload {
    cod: Option<Cod>,
    #[serde(flatten)]
    observation: Observation,
    coord: Option<CoordBlock>,
    sys: Option<SysBlock>,
    timezone: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct CityBlock {
    timezone: Option<i32>,
    coord: Option<CoordBlock>,
    sunrise: Option<i64>,
    sunset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ForecastPayload {
    cod: Option<Cod>,
    #[serde(default)]
    list: Vec<Observation>,
    city: Option<CityBlock>,
}

/// Location data attached to every snapshot of a payload.
#[derive(Debug, Default, Clone, Copy)]
struct Place {
    utc_offset: i32,
    coordinate: Option<Coordinate>,
    sunrise: Option<i64>,
    sunset: Option<i64>,
}

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| Error::malformed(format!("missing {field}")))
}

fn percent(value: f64, field: &str) -> Result<u8> {
    if (0.0..=100.0).contains(&value) {
        Ok(value.round() as u8)
    } else {
        Err(Error::malformed(format!("{field} {value} is outside 0-100")))
    }
}

fn hpa(value: f64) -> u32 {
    value.round().max(0.0) as u32
}

impl Observation {
    fn into_snapshot(self, place: Place) -> Result<ForecastSnapshot> {
        let timestamp = required(self.dt, "dt")?;
        let main = required(self.main, "main")?;
        let weather = required(self.weather.into_iter().next(), "weather[0]")?;

        let temperatures = Temperatures {
            current: kelvin_to_celsius(required(main.temp, "main.temp")?),
            feels_like: kelvin_to_celsius(required(main.feels_like, "main.feels_like")?),
            min: kelvin_to_celsius(required(main.temp_min, "main.temp_min")?),
            max: kelvin_to_celsius(required(main.temp_max, "main.temp_max")?),
        };
        let humidity = percent(required(main.humidity, "main.humidity")?, "main.humidity")?;
        let pressure = hpa(required(main.pressure, "main.pressure")?);

        let wind = self.wind.and_then(|w| {
            Some(Wind {
                speed: w.speed?,
                degrees: w.deg.map_or(0, |d| d.round().rem_euclid(360.0) as u16),
                gust: w.gust,
            })
        });

        let mut builder = ForecastSnapshot::builder(timestamp)
            .utc_offset(place.utc_offset)
            .temperatures(temperatures)
            .humidity(humidity)
            .pressure(pressure)
            .level_pressures(main.sea_level.map(hpa), main.grnd_level.map(hpa))
            .condition(Condition::new(weather.main, weather.description))
            .precipitation(Precipitation {
                rain: self.rain.and_then(|r| r.three_hours),
                snow: self.snow.and_then(|s| s.three_hours),
                probability: self.pop,
            })
            .sun(place.sunrise, place.sunset);

        if let Some(coordinate) = place.coordinate {
            builder = builder.coordinate(coordinate);
        }
        if let Some(wind) = wind {
            builder = builder.wind(wind);
        }
        if let Some(clouds) = self.clouds.and_then(|c| c.all) {
            builder = builder.cloud_cover(clouds);
        }
        if let Some(visibility) = self.visibility {
            builder = builder.visibility(visibility);
        }

        Ok(builder.try_build()?)
    }
}

impl CurrentPayload {
    fn into_snapshot(self) -> Result<ForecastSnapshot> {
        check_cod(self.cod.as_ref())?;

        let place = Place {
            utc_offset: self.timezone.unwrap_or(0),
            coordinate: self.coord.map(|c| Coordinate::new(c.lat, c.lon)),
            sunrise: self.sys.as_ref().and_then(|s| s.sunrise),
            sunset: self.sys.as_ref().and_then(|s| s.sunset),
        };
        self.observation.into_snapshot(place)
    }
}

impl ForecastPayload {
    fn into_snapshots(self) -> Result<Vec<ForecastSnapshot>> {
        check_cod(self.cod.as_ref())?;

        let place = self.city.map_or_else(Place::default, |city| Place {
            utc_offset: city.timezone.unwrap_or(0),
            coordinate: city.coord.map(|c| Coordinate::new(c.lat, c.lon)),
            sunrise: city.sunrise,
            sunset: city.sunset,
        });

        let mut snapshots = self
            .list
            .into_iter()
            .map(|item| item.into_snapshot(place))
            .collect::<Result<Vec<_>>>()?;
        snapshots.sort_by_key(|s| s.timestamp);
        Ok(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skycast_types::ConditionCode;

    const CURRENT: &str = r#"{
        "coord": {"lon": 30.3, "lat": 59.9},
        "weather": [{"id": 804, "main": "Clouds", "description": "overcast clouds", "icon": "04d"}],
        "main": {"temp": 283.15, "feels_like": 281.5, "temp_min": 282.0, "temp_max": 284.0,
                 "pressure": 1012, "humidity": 81, "sea_level": 1012, "grnd_level": 1010},
        "visibility": 10000,
        "wind": {"speed": 4.1, "deg": 250, "gust": 7.2},
        "clouds": {"all": 100},
        "dt": 1710000000,
        "sys": {"sunrise": 1709958000, "sunset": 1709998000},
        "timezone": 10800,
        "cod": 200
    }"#;

    const FORECAST: &str = r#"{
        "cod": "200",
        "cnt": 2,
        "list": [
            {"dt": 1710010800, "main": {"temp": 280.15, "feels_like": 278.0, "temp_min": 279.0,
             "temp_max": 281.0, "pressure": 1011, "humidity": 70},
             "weather": [{"main": "Rain", "description": "light rain"}],
             "pop": 0.45, "rain": {"3h": 0.6}},
            {"dt": 1710000000, "main": {"temp": 281.15, "feels_like": 279.0, "temp_min": 280.0,
             "temp_max": 282.0, "pressure": 1012, "humidity": 65},
             "weather": [{"main": "Clear", "description": "clear sky"}], "pop": 0}
        ],
        "city": {"coord": {"lat": 59.9, "lon": 30.3}, "timezone": 10800,
                 "sunrise": 1709958000, "sunset": 1709998000}
    }"#;

    #[test]
    fn test_parse_current() {
        let payload: CurrentPayload = serde_json::from_str(CURRENT).unwrap();
        let snapshot = payload.into_snapshot().unwrap();

        assert_eq!(snapshot.timestamp, 1_710_000_000);
        assert_eq!(snapshot.utc_offset, 10_800);
        assert!((snapshot.temperature.current - 10.0).abs() < 1e-9);
        assert_eq!(snapshot.humidity, 81);
        assert_eq!(snapshot.pressure, 1_012);
        assert_eq!(snapshot.ground_level_pressure, Some(1_010));
        assert_eq!(snapshot.condition.code, ConditionCode::Clouds);
        assert_eq!(snapshot.cloud_cover, Some(100));
        assert_eq!(snapshot.visibility, Some(10_000));
        assert_eq!(snapshot.wind.unwrap().degrees, 250);
        assert_eq!(snapshot.sunrise, Some(1_709_958_000));
        assert_eq!(snapshot.coordinate, Some(Coordinate::new(59.9, 30.3)));
        assert_eq!(snapshot.precipitation.probability, None);
    }

    #[test]
    fn test_parse_forecast_sorted_with_city_data() {
        let payload: ForecastPayload = serde_json::from_str(FORECAST).unwrap();
        let slots = payload.into_snapshots().unwrap();

        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].timestamp, 1_710_000_000);
        assert_eq!(slots[1].precipitation.rain, Some(0.6));
        assert_eq!(slots[1].precipitation.probability, Some(0.45));
        assert!(slots.iter().all(|s| s.utc_offset == 10_800));
        assert!(slots.iter().all(|s| s.sunset == Some(1_709_998_000)));
        assert!(slots[1].wind.is_none());
    }

    #[test]
    fn test_error_cod() {
        let payload: CurrentPayload =
            serde_json::from_str(r#"{"cod": 404, "message": "city not found"}"#).unwrap();
        assert!(matches!(
            payload.into_snapshot(),
            Err(Error::Upstream { status: 404 })
        ));

        let payload: ForecastPayload =
            serde_json::from_str(r#"{"cod": "401", "message": "Invalid API key"}"#).unwrap();
        assert!(matches!(
            payload.into_snapshots(),
            Err(Error::Upstream { status: 401 })
        ));
    }

    #[test]
    fn test_missing_required_fields() {
        let payload: CurrentPayload = serde_json::from_str(
            r#"{"cod": 200, "dt": 1, "weather": [{"main": "Clear", "description": ""}]}"#,
        )
        .unwrap();
        let err = payload.into_snapshot().unwrap_err();
        assert!(matches!(err, Error::MalformedPayload(ref m) if m.contains("main")));

        let payload: CurrentPayload = serde_json::from_str(
            r#"{"dt": 1, "weather": [], "main": {"temp": 280, "feels_like": 280,
                "temp_min": 280, "temp_max": 280, "pressure": 1000, "humidity": 50}}"#,
        )
        .unwrap();
        let err = payload.into_snapshot().unwrap_err();
        assert!(matches!(err, Error::MalformedPayload(ref m) if m.contains("weather[0]")));
    }

    #[test]
    fn test_humidity_out_of_range() {
        let json = CURRENT.replace("\"humidity\": 81", "\"humidity\": 181");
        let payload: CurrentPayload = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            payload.into_snapshot(),
            Err(Error::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_client_url_validation() {
        let client = OpenWeatherClient::new("key", "http://localhost:8080/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");

        assert!(OpenWeatherClient::new("key", "localhost:8080").is_err());
        assert!(OpenWeatherClient::new("  ", DEFAULT_BASE_URL).is_err());
    }

    #[test]
    fn test_kelvin_conversion() {
        assert!((kelvin_to_celsius(273.15)).abs() < 1e-9);
        assert!((kelvin_to_celsius(300.0) - 26.85).abs() < 1e-9);
    }
}
