//! OpenWeatherMap bulk city list.
//!
//! The dataset is a gzipped JSON array of ~200k cities. It is downloaded,
//! cached on disk, then reduced to name and country.

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Bulk city dataset published by OpenWeatherMap.
pub const CITY_LIST_URL: &str = "http://bulk.openweathermap.org/sample/city.list.json.gz";

/// File name of the cached dataset inside the data directory.
pub const CITY_LIST_FILE: &str = "city.list.json.gz";

/// Errors from loading the city list.
#[derive(Debug, thiserror::Error)]
pub enum CityListError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("download failed with status {0}")]
    Download(u16),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, CityListError>;

/// A city as shown in the listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct City {
    pub name: String,
    pub country: String,
}

/// Anything that can provide the city listing.
pub trait CitySource: Send + Sync + 'static {
    fn load(&self, limit: Option<usize>) -> impl Future<Output = Result<Vec<City>>> + Send;
}

/// Parse a gzipped city list, keeping at most `limit` entries.
pub fn parse_city_list(gzipped: impl Read, limit: Option<usize>) -> Result<Vec<City>> {
    let mut cities: Vec<City> = serde_json::from_reader(GzDecoder::new(gzipped))
        .map_err(|e| CityListError::Parse(e.to_string()))?;
    if let Some(limit) = limit {
        cities.truncate(limit);
    }
    Ok(cities)
}

/// Downloads and caches the city dataset.
#[derive(Debug, Clone)]
pub struct CityCatalog {
    client: reqwest::Client,
    url: String,
    data_dir: PathBuf,
}

impl CityCatalog {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self::with_url(CITY_LIST_URL, data_dir)
    }

    pub fn with_url(url: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            data_dir: data_dir.into(),
        }
    }

    /// Path of the cached dataset.
    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join(CITY_LIST_FILE)
    }
}

impl CitySource for CityCatalog {
    /// Download the dataset, refresh the on-disk copy and parse it.
    async fn load(&self, limit: Option<usize>) -> Result<Vec<City>> {
        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(CityListError::Download(response.status().as_u16()));
        }
        let bytes = response.bytes().await?;

        tokio::fs::create_dir_all(&self.data_dir).await?;
        let path = self.cache_path();
        tokio::fs::write(&path, &bytes).await?;
        log::info!("[Cities] downloaded {} ({} bytes)", path.display(), bytes.len());

        let cities = read_cached(path, limit).await?;
        match limit {
            Some(_) => log::info!("[Cities] total cities loaded (limited): {}", cities.len()),
            None => log::info!("[Cities] total cities loaded: {}", cities.len()),
        }
        Ok(cities)
    }
}

/// Decompress and parse a cached dataset off the async runtime.
async fn read_cached(path: PathBuf, limit: Option<usize>) -> Result<Vec<City>> {
    tokio::task::spawn_blocking(move || parse_city_file(&path, limit))
        .await
        .map_err(|e| CityListError::Parse(format!("parser task failed: {}", e)))?
}

fn parse_city_file(path: &Path, limit: Option<usize>) -> Result<Vec<City>> {
    let file = std::fs::File::open(path)?;
    parse_city_list(std::io::BufReader::new(file), limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const SAMPLE: &str = r#"[
        {"id": 833, "name": "Ḩeşār-e Sefīd", "state": "", "country": "IR", "coord": {"lon": 47.159401, "lat": 34.330502}},
        {"id": 2960, "name": "‘Ayn Ḩalāqīm", "state": "", "country": "SY", "coord": {"lon": 36.321911, "lat": 34.940079}},
        {"id": 3245, "name": "Taglag", "state": "", "country": "IR", "coord": {"lon": 44.98333, "lat": 38.450001}},
        {"id": 2643743, "name": "London", "state": "", "country": "GB", "coord": {"lon": -0.12574, "lat": 51.50853}}
    ]"#;

    fn gzip(data: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn parse_keeps_name_and_country() {
        let cities = parse_city_list(gzip(SAMPLE).as_slice(), None).unwrap();
        assert_eq!(cities.len(), 4);
        assert_eq!(
            cities[3],
            City {
                name: "London".to_string(),
                country: "GB".to_string(),
            }
        );
        assert_eq!(cities[0].name, "Ḩeşār-e Sefīd");
    }

    #[test]
    fn parse_applies_limit_in_dataset_order() {
        let cities = parse_city_list(gzip(SAMPLE).as_slice(), Some(2)).unwrap();
        assert_eq!(cities.len(), 2);
        assert_eq!(cities[1].country, "SY");
    }

    #[test]
    fn limit_larger_than_dataset_returns_everything() {
        let cities = parse_city_list(gzip(SAMPLE).as_slice(), Some(50_000)).unwrap();
        assert_eq!(cities.len(), 4);
    }

    #[test]
    fn parse_rejects_plain_json() {
        let result = parse_city_list(SAMPLE.as_bytes(), None);
        assert!(matches!(result, Err(CityListError::Parse(_))));
    }

    #[test]
    fn parse_cached_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CITY_LIST_FILE);
        std::fs::write(&path, gzip(SAMPLE)).unwrap();
        let cities = parse_city_file(&path, Some(1)).unwrap();
        assert_eq!(cities.len(), 1);
    }

    #[test]
    fn cache_path_is_inside_data_dir() {
        let catalog = CityCatalog::new("/var/lib/weatherloop");
        assert_eq!(
            catalog.cache_path(),
            PathBuf::from("/var/lib/weatherloop/city.list.json.gz")
        );
    }

    #[tokio::test]
    async fn read_cached_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_cached(dir.path().join("missing.gz"), None).await;
        assert!(matches!(result, Err(CityListError::Io(_))));
    }
}
