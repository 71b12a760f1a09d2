//! Weather forecast proxy with a small in-memory cache.
//!
//! Fetches the Open-Meteo daily forecast and reshapes it into the payload
//! the dashboard renders. Responses are cached per coordinate pair so panel
//! refreshes do not hammer the upstream provider.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{OurError, OurResult};

const OPEN_METEO_URL: &str = "https://api.open-meteo.com/v1/forecast";

const DAILY_FIELDS: &str = "weathercode,temperature_2m_max,temperature_2m_min,\
precipitation_probability_mean,precipitation_hours,precipitation_sum,sunrise,sunset,\
windspeed_10m_max,winddirection_10m_dominant,uv_index_max";

/// One forecast day in the dashboard payload
#[derive(Debug, Clone, Serialize)]
pub struct ForecastDay {
    pub date: String,
    #[serde(rename = "weatherCode")]
    pub weather_code: Option<i64>,
    #[serde(rename = "tempMax")]
    pub temp_max: Option<f64>,
    #[serde(rename = "tempMin")]
    pub temp_min: Option<f64>,
    #[serde(rename = "precipProb")]
    pub precip_prob: Option<f64>,
    #[serde(rename = "precipHours")]
    pub precip_hours: Option<f64>,
    #[serde(rename = "precipSum")]
    pub precip_sum: Option<f64>,
    pub sunrise: Option<String>,
    pub sunset: Option<String>,
    #[serde(rename = "windSpeedMax")]
    pub wind_speed_max: Option<f64>,
    #[serde(rename = "windDir")]
    pub wind_dir: Option<f64>,
    #[serde(rename = "uvIndex")]
    pub uv_index: Option<f64>,
}

/// Full forecast payload
#[derive(Debug, Clone, Serialize)]
pub struct Forecast {
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
    pub days: Vec<ForecastDay>,
}

/// Raw provider response shapes
#[derive(Debug, Deserialize)]
struct ProviderResponse {
    latitude: f64,
    longitude: f64,
    timezone: String,
    daily: ProviderDaily,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProviderDaily {
    time: Vec<String>,
    weathercode: Vec<Option<i64>>,
    temperature_2m_max: Vec<Option<f64>>,
    temperature_2m_min: Vec<Option<f64>>,
    precipitation_probability_mean: Vec<Option<f64>>,
    precipitation_hours: Vec<Option<f64>>,
    precipitation_sum: Vec<Option<f64>>,
    sunrise: Vec<Option<String>>,
    sunset: Vec<Option<String>>,
    windspeed_10m_max: Vec<Option<f64>>,
    winddirection_10m_dominant: Vec<Option<f64>>,
    uv_index_max: Vec<Option<f64>>,
}

struct CacheEntry {
    fetched: Instant,
    latitude: f64,
    longitude: f64,
    forecast: Forecast,
}

/// Forecast proxy service
pub struct WeatherService {
    client: reqwest::Client,
    default_latitude: f64,
    default_longitude: f64,
    cache_ttl: Duration,
    cache: Mutex<Option<CacheEntry>>,
}

impl WeatherService {
    pub fn new(
        default_latitude: f64,
        default_longitude: f64,
        cache_minutes: u64,
    ) -> OurResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            default_latitude,
            default_longitude,
            cache_ttl: Duration::from_secs(cache_minutes * 60),
            cache: Mutex::new(None),
        })
    }

    /// Seven-day forecast for the given coordinates, served from cache when
    /// the same coordinates were fetched recently
    pub async fn forecast(&self, latitude: Option<f64>, longitude: Option<f64>) -> OurResult<Forecast> {
        let latitude = latitude.filter(|v| v.is_finite()).unwrap_or(self.default_latitude);
        let longitude = longitude.filter(|v| v.is_finite()).unwrap_or(self.default_longitude);

        let mut cache = self.cache.lock().await;
        if let Some(entry) = cache.as_ref() {
            if entry.latitude == latitude
                && entry.longitude == longitude
                && entry.fetched.elapsed() < self.cache_ttl
            {
                debug!("Serving cached forecast");
                return Ok(entry.forecast.clone());
            }
        }

        let response: ProviderResponse = self
            .client
            .get(OPEN_METEO_URL)
            .query(&[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                ("daily", DAILY_FIELDS.to_string()),
                ("timezone", "auto".to_string()),
                ("forecast_days", "7".to_string()),
                ("temperature_unit", "fahrenheit".to_string()),
                ("windspeed_unit", "mph".to_string()),
                ("precipitation_unit", "inch".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let forecast = map_forecast(response)?;
        info!(latitude, longitude, days = forecast.days.len(), "Fetched forecast");

        *cache = Some(CacheEntry {
            fetched: Instant::now(),
            latitude,
            longitude,
            forecast: forecast.clone(),
        });
        Ok(forecast)
    }
}

/// Reshape the provider's parallel arrays into per-day records
fn map_forecast(response: ProviderResponse) -> OurResult<Forecast> {
    if response.daily.time.is_empty() {
        return Err(OurError::App(
            "malformed response from weather provider".to_string(),
        ));
    }

    let daily = &response.daily;
    let days = daily
        .time
        .iter()
        .enumerate()
        .map(|(i, date)| ForecastDay {
            date: date.clone(),
            weather_code: pick(&daily.weathercode, i),
            temp_max: pick(&daily.temperature_2m_max, i),
            temp_min: pick(&daily.temperature_2m_min, i),
            precip_prob: pick(&daily.precipitation_probability_mean, i),
            precip_hours: pick(&daily.precipitation_hours, i),
            precip_sum: pick(&daily.precipitation_sum, i),
            sunrise: daily.sunrise.get(i).cloned().flatten(),
            sunset: daily.sunset.get(i).cloned().flatten(),
            wind_speed_max: pick(&daily.windspeed_10m_max, i),
            wind_dir: pick(&daily.winddirection_10m_dominant, i),
            uv_index: pick(&daily.uv_index_max, i),
        })
        .collect();

    Ok(Forecast {
        latitude: response.latitude,
        longitude: response.longitude,
        timezone: response.timezone,
        days,
    })
}

fn pick<T: Copy>(values: &[Option<T>], index: usize) -> Option<T> {
    values.get(index).copied().flatten()
}
