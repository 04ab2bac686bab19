//! Configuration types

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::{CoreError, CoreResult, RatioDef, ScheduleEntry, SeriesDef};

/// Environment variable prefix for overrides, e.g. `TICKER__HTTP__REQUEST_TIMEOUT_MS`
pub const ENV_PREFIX: &str = "TICKER";

/// HTTP transport configuration shared by every source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Transport-level bound on a single fetch
    pub request_timeout_ms: u64,
    pub user_agent: String,
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
            user_agent: concat!("ticker/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Payload shape of a source and the keys needed to pull its rate out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractorConfig {
    /// `{"rate": 8000.5}`
    RootNumber { field: String },
    /// `{"last": "8000.50"}`
    RootText { field: String },
    /// `{"USD": {"last": 8000.5}}`
    CurrencyLast { currency: String, field: String },
    /// `{"rates": {"USD": 1.1}}`
    RatesTable { table: String, symbol: String },
    /// `{"EUR_USD": {"val": 1.1}}`
    PairValue { pair: String, field: String },
}

/// One configured source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    /// Id of the series this source feeds
    pub series: String,
    pub url: String,
    pub extractor: ExtractorConfig,
}

/// One repeating schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub period_ms: u64,
    pub deadline_ms: u64,
}

impl ScheduleConfig {
    pub fn to_entry(&self) -> CoreResult<ScheduleEntry> {
        ScheduleEntry::new(
            Duration::from_millis(self.period_ms),
            Duration::from_millis(self.deadline_ms),
        )
    }
}

/// What to do when a tick fires while the previous round of the same
/// schedule is still collecting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Start the new round anyway; rounds never share state
    #[default]
    Concurrent,
    /// Skip the tick
    SkipWhileBusy,
}

/// Complete ticker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickerConfig {
    pub http: HttpConfig,
    pub series: Vec<SeriesDef>,
    pub ratios: Vec<RatioDef>,
    pub sources: Vec<SourceConfig>,
    pub schedules: Vec<ScheduleConfig>,
    pub overlap: OverlapPolicy,
}

fn source(name: &str, series: &str, url: &str, extractor: ExtractorConfig) -> SourceConfig {
    SourceConfig {
        name: name.to_string(),
        series: series.to_string(),
        url: url.to_string(),
        extractor,
    }
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            series: vec![
                SeriesDef::new("btc_usd", "BTC/USD"),
                SeriesDef::new("eur_usd", "EUR/USD"),
            ],
            ratios: vec![RatioDef::new("BTC/EUR", "btc_usd", "eur_usd")],
            sources: vec![
                source(
                    "bitpay",
                    "btc_usd",
                    "https://bitpay.com/api/rates/USD",
                    ExtractorConfig::RootNumber { field: "rate".into() },
                ),
                source(
                    "bitstamp-btcusd",
                    "btc_usd",
                    "https://www.bitstamp.net/api/v2/ticker/btcusd",
                    ExtractorConfig::RootText { field: "last".into() },
                ),
                source(
                    "blockchain",
                    "btc_usd",
                    "https://blockchain.info/ticker",
                    ExtractorConfig::CurrencyLast {
                        currency: "USD".into(),
                        field: "last".into(),
                    },
                ),
                source(
                    "bitstamp-eurusd",
                    "eur_usd",
                    "https://www.bitstamp.net/api/v2/ticker/eurusd",
                    ExtractorConfig::RootText { field: "last".into() },
                ),
                source(
                    "fixer",
                    "eur_usd",
                    "http://api.fixer.io/latest?symbols=USD",
                    ExtractorConfig::RatesTable {
                        table: "rates".into(),
                        symbol: "USD".into(),
                    },
                ),
                source(
                    "free-currency-converter",
                    "eur_usd",
                    "http://free.currencyconverterapi.com/api/v3/convert?q=EUR_USD&compact=y",
                    ExtractorConfig::PairValue {
                        pair: "EUR_USD".into(),
                        field: "val".into(),
                    },
                ),
            ],
            schedules: vec![
                ScheduleConfig { period_ms: 1_000, deadline_ms: 500 },
                ScheduleConfig { period_ms: 5_000, deadline_ms: 200 },
            ],
            overlap: OverlapPolicy::default(),
        }
    }
}

impl TickerConfig {
    /// Load from an optional TOML file plus `TICKER__*` environment
    /// overrides. Fields missing from both fall back to the built-in setup.
    pub fn load(path: Option<&Path>) -> CoreResult<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: TickerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a TOML string (no environment overrides)
    pub fn from_toml(raw: &str) -> CoreResult<Self> {
        let config: TickerConfig = config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CoreResult<()> {
        let mut ids = HashSet::new();
        for series in &self.series {
            if !ids.insert(series.id.as_str()) {
                return Err(CoreError::InvalidConfig(format!(
                    "duplicate series id {}",
                    series.id
                )));
            }
        }

        for source in &self.sources {
            if !ids.contains(source.series.as_str()) {
                return Err(CoreError::UnknownSeries(format!(
                    "{} (source {})",
                    source.series, source.name
                )));
            }
        }

        for ratio in &self.ratios {
            for side in [&ratio.numerator, &ratio.denominator] {
                if !ids.contains(side.as_str()) {
                    return Err(CoreError::UnknownSeries(format!(
                        "{} (ratio {})",
                        side, ratio.label
                    )));
                }
            }
        }

        if self.schedules.is_empty() {
            return Err(CoreError::InvalidConfig(
                "at least one schedule is required".to_string(),
            ));
        }

        self.schedule_entries().map(|_| ())
    }

    pub fn schedule_entries(&self) -> CoreResult<Vec<ScheduleEntry>> {
        self.schedules.iter().map(ScheduleConfig::to_entry).collect()
    }

    pub fn get_series(&self, id: &str) -> Option<&SeriesDef> {
        self.series.iter().find(|s| s.id == id)
    }
}
