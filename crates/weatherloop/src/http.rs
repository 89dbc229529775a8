//! Web front end.
//!
//! - `GET /` city form; with `?city=` also the current weather (or the error)
//! - `GET /weather?city=` JSON `WeatherRecord`
//! - `GET /city-list` HTML listing of the bulk city dataset
//! - `GET /health` liveness
//! - `/static/*` files from the static directory, when it exists

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tower_http::services::ServeDir;

use crate::cities::CitySource;
use crate::pages;
use crate::weather::{FetchError, WeatherRecord, WeatherSource};

/// Number of cities shown on `/city-list`.
pub const CITY_LIST_LIMIT: usize = 50_000;

/// Shared state for HTTP handlers
pub struct AppState<W, C> {
    pub weather: Arc<W>,
    pub cities: Arc<C>,
}

impl<W, C> Clone for AppState<W, C> {
    fn clone(&self) -> Self {
        Self {
            weather: self.weather.clone(),
            cities: self.cities.clone(),
        }
    }
}

/// Query string carrying an optional city.
#[derive(Debug, Deserialize)]
pub struct CityQuery {
    #[serde(default)]
    pub city: Option<String>,
}

impl CityQuery {
    fn city(&self) -> Option<&str> {
        self.city.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }
}

/// JSON error body: `{"detail": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "detail": self.detail })),
        )
            .into_response()
    }
}

impl From<FetchError> for ApiError {
    fn from(err: FetchError) -> Self {
        ApiError {
            status: fetch_error_status(&err),
            detail: err.to_string(),
        }
    }
}

/// HTTP status reported for a failed weather fetch.
pub fn fetch_error_status(err: &FetchError) -> StatusCode {
    match err {
        FetchError::Api { status: 404, .. } => StatusCode::NOT_FOUND,
        FetchError::MissingApiKey => StatusCode::INTERNAL_SERVER_ERROR,
        FetchError::Api { .. } | FetchError::Http(_) | FetchError::Format(_) => {
            StatusCode::BAD_GATEWAY
        }
    }
}

async fn home<W: WeatherSource, C: CitySource>(
    State(state): State<AppState<W, C>>,
    Query(query): Query<CityQuery>,
) -> Html<String> {
    let Some(city) = query.city() else {
        return Html(pages::index("", None, None));
    };

    match state.weather.fetch_weather(city).await {
        Ok(record) => Html(pages::index(city, Some(&record), None)),
        Err(e) => {
            log::warn!("[HTTP] weather lookup for '{}' failed: {}", city, e);
            Html(pages::index(city, None, Some(&e.to_string())))
        }
    }
}

async fn weather_api<W: WeatherSource, C: CitySource>(
    State(state): State<AppState<W, C>>,
    Query(query): Query<CityQuery>,
) -> Result<Json<WeatherRecord>, ApiError> {
    let city = query.city().ok_or_else(|| ApiError {
        status: StatusCode::BAD_REQUEST,
        detail: "missing required query parameter 'city'".to_string(),
    })?;

    log::info!("[HTTP] city received: {}", city);
    let record = state.weather.fetch_weather(city).await?;
    log::debug!("[HTTP] data fetched: {:?}", record);
    Ok(Json(record))
}

async fn city_list<W: WeatherSource, C: CitySource>(
    State(state): State<AppState<W, C>>,
) -> Response {
    match state.cities.load(Some(CITY_LIST_LIMIT)).await {
        Ok(cities) => Html(pages::city_list(&cities)).into_response(),
        Err(e) => {
            log::error!("[HTTP] city list unavailable: {}", e);
            (
                StatusCode::BAD_GATEWAY,
                Html(pages::error("City list unavailable", &e.to_string())),
            )
                .into_response()
        }
    }
}

async fn health() -> &'static str {
    "ok"
}

/// Build the application router.
///
/// `static_dir` is mounted at `/static` only if it is an existing directory.
pub fn router<W: WeatherSource, C: CitySource>(
    weather: Arc<W>,
    cities: Arc<C>,
    static_dir: &Path,
) -> Router {
    let state = AppState { weather, cities };

    let router = Router::new()
        .route("/", get(home::<W, C>))
        .route("/weather", get(weather_api::<W, C>))
        .route("/city-list", get(city_list::<W, C>))
        .route("/health", get(health))
        .with_state(state);

    if static_dir.is_dir() {
        router.nest_service("/static", ServeDir::new(static_dir))
    } else {
        log::warn!(
            "[HTTP] static directory '{}' not found, skipping mount",
            static_dir.display()
        );
        router
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_errors_map_to_statuses() {
        let not_found = FetchError::Api {
            status: 404,
            message: "city not found".to_string(),
        };
        let upstream = FetchError::Api {
            status: 401,
            message: "Invalid API key".to_string(),
        };
        assert_eq!(fetch_error_status(&not_found), StatusCode::NOT_FOUND);
        assert_eq!(fetch_error_status(&upstream), StatusCode::BAD_GATEWAY);
        assert_eq!(
            fetch_error_status(&FetchError::MissingApiKey),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            fetch_error_status(&FetchError::Format("bad".to_string())),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn city_query_trims_and_rejects_blank() {
        let q = CityQuery {
            city: Some("  London ".to_string()),
        };
        assert_eq!(q.city(), Some("London"));
        let blank = CityQuery {
            city: Some("   ".to_string()),
        };
        assert_eq!(blank.city(), None);
        assert_eq!(CityQuery { city: None }.city(), None);
    }
}
