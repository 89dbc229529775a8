//! Router tests driven through `tower::ServiceExt::oneshot`.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;

use weatherloop::cities::{City, CityListError, CitySource};
use weatherloop::http::router;
use weatherloop::weather::{FetchError, WeatherRecord, WeatherSource};

struct StubWeather;

impl WeatherSource for StubWeather {
    async fn fetch_weather(&self, city: &str) -> weatherloop::weather::Result<WeatherRecord> {
        match city {
            "London" => Ok(WeatherRecord {
                city: "London".to_string(),
                temperature: 15.2,
                description: "clear sky".to_string(),
                humidity: 60,
                icon: "01d".to_string(),
            }),
            "Nowhere" => Err(FetchError::Api {
                status: 404,
                message: "Failed to get weather for 'Nowhere'. city not found".to_string(),
            }),
            _ => Err(FetchError::Api {
                status: 401,
                message: "Invalid API key".to_string(),
            }),
        }
    }
}

struct StubCities {
    available: bool,
}

impl CitySource for StubCities {
    async fn load(&self, limit: Option<usize>) -> weatherloop::cities::Result<Vec<City>> {
        if !self.available {
            return Err(CityListError::Download(503));
        }
        let mut cities = vec![
            City {
                name: "London".to_string(),
                country: "GB".to_string(),
            },
            City {
                name: "Paris".to_string(),
                country: "FR".to_string(),
            },
        ];
        if let Some(limit) = limit {
            cities.truncate(limit);
        }
        Ok(cities)
    }
}

fn app(cities_available: bool) -> axum::Router {
    router(
        Arc::new(StubWeather),
        Arc::new(StubCities {
            available: cities_available,
        }),
        Path::new("does-not-exist"),
    )
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn weather_returns_record_as_json() {
    let (status, body) = get(app(true), "/weather?city=London").await;
    assert_eq!(status, StatusCode::OK);
    let record: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(record["city"], "London");
    assert_eq!(record["temperature"], 15.2);
    assert_eq!(record["description"], "clear sky");
    assert_eq!(record["humidity"], 60);
    assert_eq!(record["icon"], "01d");
}

#[tokio::test]
async fn weather_without_city_is_bad_request() {
    let (status, body) = get(app(true), "/weather").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("detail"));

    let (status, _) = get(app(true), "/weather?city=%20%20").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_city_is_not_found_with_detail() {
    let (status, body) = get(app(true), "/weather?city=Nowhere").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let error: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(
        error["detail"],
        "Failed to get weather for 'Nowhere'. city not found"
    );
}

#[tokio::test]
async fn upstream_rejection_is_bad_gateway() {
    let (status, _) = get(app(true), "/weather?city=Paris").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn home_renders_form_and_weather() {
    let (status, body) = get(app(true), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<form"));
    assert!(!body.contains("class=\"weather\""));

    let (status, body) = get(app(true), "/?city=London").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<h2>London</h2>"));
}

#[tokio::test]
async fn home_shows_lookup_error_inline() {
    let (status, body) = get(app(true), "/?city=Nowhere").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("class=\"error\""));
    assert!(body.contains("city not found"));
}

#[tokio::test]
async fn city_list_renders_table() {
    let (status, body) = get(app(true), "/city-list").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Cities (2)"));
    assert!(body.contains("<tr><td>Paris</td><td>FR</td></tr>"));
}

#[tokio::test]
async fn city_list_failure_is_bad_gateway() {
    let (status, body) = get(app(false), "/city-list").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.contains("City list unavailable"));
}

#[tokio::test]
async fn health_is_ok() {
    let (status, body) = get(app(true), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn static_files_are_served_when_directory_exists() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("style.css"), "body { margin: 0; }").unwrap();
    let app = router(
        Arc::new(StubWeather),
        Arc::new(StubCities { available: true }),
        dir.path(),
    );

    let (status, body) = get(app, "/static/style.css").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "body { margin: 0; }");
}
