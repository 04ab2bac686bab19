//! Scripted sources for tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ticker_core::{FetchError, FetchResult, RatioDef, SeriesDef};

use crate::feeds::{RateSource, SourceDescriptor};
use crate::round::SamplingPlan;

/// Answers with a fixed result after a delay, counting completed calls
pub struct ScriptedSource {
    delay: Duration,
    result: Result<f64, String>,
    completed: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn rate(rate: f64, delay: Duration) -> Self {
        Self {
            delay,
            result: Ok(rate),
            completed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(reason: &str, delay: Duration) -> Self {
        Self {
            delay,
            result: Err(reason.to_string()),
            completed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn completed(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.completed)
    }
}

#[async_trait::async_trait]
impl RateSource for ScriptedSource {
    async fn fetch_rate(&self) -> FetchResult<f64> {
        tokio::time::sleep(self.delay).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.result
            .clone()
            .map_err(FetchError::Decode)
    }
}

pub fn fast(name: &str, series: &str, rate: f64) -> SourceDescriptor {
    delayed(name, series, rate, Duration::from_millis(10))
}

pub fn delayed(name: &str, series: &str, rate: f64, delay: Duration) -> SourceDescriptor {
    SourceDescriptor::new(name, series, Arc::new(ScriptedSource::rate(rate, delay)))
}

pub fn failing(name: &str, series: &str) -> SourceDescriptor {
    SourceDescriptor::new(
        name,
        series,
        Arc::new(ScriptedSource::failing("unexpected payload", Duration::from_millis(5))),
    )
}

/// BTC/USD and EUR/USD with a BTC/EUR cross rate
pub fn btc_eur_plan(sources: Vec<SourceDescriptor>) -> Arc<SamplingPlan> {
    let plan = SamplingPlan::new(
        vec![
            SeriesDef::new("btc_usd", "BTC/USD"),
            SeriesDef::new("eur_usd", "EUR/USD"),
        ],
        vec![RatioDef::new("BTC/EUR", "btc_usd", "eur_usd")],
        sources,
    )
    .expect("valid plan");
    Arc::new(plan)
}
