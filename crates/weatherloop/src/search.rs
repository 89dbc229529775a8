//! Search store seam (Elasticsearch).
//!
//! A search store can accept TCP connections before it is able to serve, so
//! the connector always follows `connect` with an explicit `ping`.

use std::future::Future;
use std::time::Duration;

/// Per-request timeout for the HTTP client talking to the store.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from search store operations.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// A document/search store reachable over the network.
pub trait SearchStore: Send + Sync + 'static {
    type Client: Send + 'static;

    fn endpoint(&self) -> String;

    /// Build a client for the store. Does not prove the store is ready.
    fn connect(&self) -> impl Future<Output = SearchResult<Self::Client>> + Send;

    /// Liveness probe. `Ok(false)` means reachable but not ready.
    fn ping(&self, client: &Self::Client) -> impl Future<Output = SearchResult<bool>> + Send;
}

// ── Elasticsearch implementation ─────────────────────────────────────────

/// Elasticsearch cluster addressed by its base URL.
#[derive(Debug, Clone)]
pub struct Elasticsearch {
    url: String,
}

impl Elasticsearch {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Connected Elasticsearch client.
#[derive(Debug, Clone)]
pub struct ElasticsearchClient {
    http: reqwest::Client,
    url: String,
}

impl ElasticsearchClient {
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl SearchStore for Elasticsearch {
    type Client = ElasticsearchClient;

    fn endpoint(&self) -> String {
        self.url.clone()
    }

    async fn connect(&self) -> SearchResult<ElasticsearchClient> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(ElasticsearchClient {
            http,
            url: self.url.clone(),
        })
    }

    async fn ping(&self, client: &ElasticsearchClient) -> SearchResult<bool> {
        let response = client.http.head(&client.url).send().await?;
        log::debug!(
            "[Search] ping {} -> {}",
            client.url,
            response.status().as_u16()
        );
        Ok(response.status().is_success())
    }
}

// ── MockSearchStore for testing ──────────────────────────────────────────
