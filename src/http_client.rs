use crate::error::WorkerError;
use reqwest::{Client, Response};
use std::time::Duration;
use tokio::time::timeout;

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            user_agent: format!("xml-worker/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Async HTTP client for fetching remote documents and stylesheets.
///
/// A failed fetch is reported once; retrying is left to the caller.
pub struct AsyncHttpClient {
    client: Client,
    config: HttpClientConfig,
}

impl AsyncHttpClient {
    /// Create a new async HTTP client with the given configuration
    pub fn new(config: HttpClientConfig) -> Result<Self, WorkerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(WorkerError::from)?;

        Ok(Self { client, config })
    }

    /// Fetch the body behind `url`
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, WorkerError> {
        let response = self.make_request(url).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WorkerError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
                message: format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown")
                ),
            });
        }

        let bytes = response.bytes().await.map_err(WorkerError::from)?;
        Ok(bytes.to_vec())
    }

    /// Make a single HTTP request with timeout
    async fn make_request(&self, url: &str) -> Result<Response, WorkerError> {
        let request_future = self.client.get(url).send();

        timeout(
            Duration::from_secs(self.config.timeout_seconds),
            request_future,
        )
        .await
        .map_err(|_| WorkerError::Timeout {
            url: url.to_string(),
            timeout_seconds: self.config.timeout_seconds,
        })?
        .map_err(WorkerError::from)
    }
}
