//! Rate sources

use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use ticker_core::{FetchResult, SourceConfig};

use crate::extract::{build_extractor, RateExtractor};
use crate::http::HttpFetcher;

/// Base trait for rate sources. One call is one outbound request.
#[async_trait::async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch_rate(&self) -> FetchResult<f64>;
}

/// Source answering over HTTP with a JSON payload
pub struct HttpRateSource {
    url: String,
    extractor: Arc<dyn RateExtractor>,
    http: HttpFetcher,
}

impl HttpRateSource {
    pub fn new(url: impl Into<String>, extractor: Arc<dyn RateExtractor>, http: HttpFetcher) -> Self {
        Self {
            url: url.into(),
            extractor,
            http,
        }
    }
}

#[async_trait::async_trait]
impl RateSource for HttpRateSource {
    async fn fetch_rate(&self) -> FetchResult<f64> {
        let body = self.http.get_bytes(&self.url).await?;
        self.extractor.extract(&body)
    }
}

/// A source bound to the series it feeds. Immutable after startup.
#[derive(Clone)]
pub struct SourceDescriptor {
    pub name: String,
    pub series: String,
    pub source: Arc<dyn RateSource>,
}

impl SourceDescriptor {
    pub fn new(
        name: impl Into<String>,
        series: impl Into<String>,
        source: Arc<dyn RateSource>,
    ) -> Self {
        Self {
            name: name.into(),
            series: series.into(),
            source,
        }
    }

    pub fn from_config(config: &SourceConfig, http: HttpFetcher) -> Self {
        let extractor = build_extractor(&config.extractor);
        let source = HttpRateSource::new(config.url.clone(), extractor, http);
        Self::new(config.name.clone(), config.series.clone(), Arc::new(source))
    }
}

impl fmt::Debug for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceDescriptor")
            .field("name", &self.name)
            .field("series", &self.series)
            .finish()
    }
}

/// Run one fetch and deliver its rate, if any, to the series conduit.
///
/// Failures are logged and swallowed. A closed conduit means the round
/// already closed its window; the late rate is dropped.
pub async fn run_fetch(descriptor: SourceDescriptor, tx: mpsc::Sender<f64>) {
    match descriptor.source.fetch_rate().await {
        Ok(rate) => {
            debug!(source = %descriptor.name, series = %descriptor.series, rate, "Source answered");
            if tx.send(rate).await.is_err() {
                debug!(source = %descriptor.name, "Round closed before rate arrived");
            }
        }
        Err(e) => {
            warn!(source = %descriptor.name, series = %descriptor.series, error = %e, "Source failed");
        }
    }
}
