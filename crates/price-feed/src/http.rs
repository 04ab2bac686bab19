//! Shared HTTP transport for rate sources

use bytes::Bytes;
use reqwest::Client;
use tracing::trace;

use ticker_core::{CoreError, CoreResult, FetchError, FetchResult, HttpConfig};

/// One GET per call, no retries. Cheap to clone; clones share the
/// connection pool.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> CoreResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| CoreError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Fetch the raw body of `url`, rejecting non-2xx responses
    pub async fn get_bytes(&self, url: &str) -> FetchResult<Bytes> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))?;

        trace!(url, bytes = body.len(), "Fetched response body");
        Ok(body)
    }
}
