//! OpenWeatherMap current-weather client.
//!
//! Fetches current conditions for a city and flattens the API response into
//! a `WeatherRecord`, the message published to the `weather` queue.

use serde::{Deserialize, Serialize};
use std::future::Future;

// ── Constants ───────────────────────────────────────────────────────

/// OpenWeatherMap current weather endpoint.
pub const API_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

/// Unit system requested from the API (Celsius).
const UNITS: &str = "metric";

// ── Errors ──────────────────────────────────────────────────────────

/// Errors from weather fetches.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("OPENWEATHER_API_KEY not set")]
    MissingApiKey,

    #[error("format error: {0}")]
    Format(String),
}

pub type Result<T> = std::result::Result<T, FetchError>;

// ── Record ──────────────────────────────────────────────────────────

/// Current weather for one city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub city: String,
    /// Degrees Celsius.
    pub temperature: f64,
    pub description: String,
    /// Relative humidity in percent.
    pub humidity: i64,
    /// OpenWeatherMap icon code, e.g. `01d`.
    pub icon: String,
}

impl WeatherRecord {
    /// URL of the icon image for this record.
    pub fn icon_url(&self) -> String {
        format!("https://openweathermap.org/img/wn/{}@2x.png", self.icon)
    }
}

// ── Wire format ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiResponse {
    name: String,
    main: ApiMain,
    weather: Vec<ApiCondition>,
}

#[derive(Debug, Deserialize)]
struct ApiMain {
    temp: f64,
    humidity: i64,
}

#[derive(Debug, Deserialize)]
struct ApiCondition {
    description: String,
    icon: String,
}

impl TryFrom<ApiResponse> for WeatherRecord {
    type Error = FetchError;

    fn try_from(response: ApiResponse) -> Result<Self> {
        let condition = response
            .weather
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::Format("response has no weather conditions".to_string()))?;
        Ok(WeatherRecord {
            city: response.name,
            temperature: response.main.temp,
            description: condition.description,
            humidity: response.main.humidity,
            icon: condition.icon,
        })
    }
}

/// Parse a raw OpenWeatherMap response body.
pub fn parse_response(body: &str) -> Result<WeatherRecord> {
    let response: ApiResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Format(e.to_string()))?;
    WeatherRecord::try_from(response)
}

// ── Source trait ────────────────────────────────────────────────────

/// Anything that can produce current weather for a city.
pub trait WeatherSource: Send + Sync + 'static {
    fn fetch_weather(&self, city: &str) -> impl Future<Output = Result<WeatherRecord>> + Send;
}

// ── Client ──────────────────────────────────────────────────────────

/// OpenWeatherMap API client.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl OpenWeatherClient {
    /// Create a client. A missing key only fails when a fetch is attempted,
    /// so the rest of the service keeps working without one.
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(api_key, API_URL)
    }

    pub fn with_base_url(api_key: Option<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.into(),
        }
    }
}

impl WeatherSource for OpenWeatherClient {
    async fn fetch_weather(&self, city: &str) -> Result<WeatherRecord> {
        let api_key = self.api_key.as_deref().ok_or(FetchError::MissingApiKey)?;

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("q", city), ("appid", api_key), ("units", UNITS)])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(FetchError::Api {
                status: status.as_u16(),
                message: format!("Failed to get weather for '{}'. {}", city, body),
            });
        }

        parse_response(&body)
    }
}

// ── MockWeather for testing ─────────────────────────────────────────
