//! Rate extraction from source-specific payload shapes
//!
//! Every source answers with its own JSON layout. An extractor knows one
//! layout and pulls a single rate out of it. New layouts plug in by
//! implementing [`RateExtractor`]; nothing in the round or scheduler
//! depends on the concrete shapes.

use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

use ticker_core::{ExtractorConfig, FetchError, FetchResult};

/// Pulls one rate out of a raw response body
pub trait RateExtractor: Send + Sync + Debug {
    /// Short name of the payload shape, for logs
    fn kind(&self) -> &'static str;

    fn extract(&self, body: &[u8]) -> FetchResult<f64>;
}

/// Build the extractor described by a source's configuration
pub fn build_extractor(config: &ExtractorConfig) -> Arc<dyn RateExtractor> {
    match config {
        ExtractorConfig::RootNumber { field } => Arc::new(RootNumber::new(field)),
        ExtractorConfig::RootText { field } => Arc::new(RootText::new(field)),
        ExtractorConfig::CurrencyLast { currency, field } => {
            Arc::new(CurrencyLast::new(currency, field))
        }
        ExtractorConfig::RatesTable { table, symbol } => Arc::new(RatesTable::new(table, symbol)),
        ExtractorConfig::PairValue { pair, field } => Arc::new(PairValue::new(pair, field)),
    }
}

/// Plain numeric field at the payload root: `{"rate": 8000.5}`
#[derive(Debug, Clone)]
pub struct RootNumber {
    field: String,
}

impl RootNumber {
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }
}

impl RateExtractor for RootNumber {
    fn kind(&self) -> &'static str {
        "root_number"
    }

    fn extract(&self, body: &[u8]) -> FetchResult<f64> {
        let payload = parse(body)?;
        let value = child(&payload, &self.field)?;
        number(value, &self.field)
    }
}

/// Numeric-as-text field at the payload root: `{"last": "8000.50"}`
#[derive(Debug, Clone)]
pub struct RootText {
    field: String,
}

impl RootText {
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }
}

impl RateExtractor for RootText {
    fn kind(&self) -> &'static str {
        "root_text"
    }

    fn extract(&self, body: &[u8]) -> FetchResult<f64> {
        let payload = parse(body)?;
        let value = child(&payload, &self.field)?;
        text_number(value, &self.field)
    }
}

/// Per-currency ticker object: `{"USD": {"last": 8000.5}, "EUR": {...}}`
#[derive(Debug, Clone)]
pub struct CurrencyLast {
    currency: String,
    field: String,
}

impl CurrencyLast {
    pub fn new(currency: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
            field: field.into(),
        }
    }
}

impl RateExtractor for CurrencyLast {
    fn kind(&self) -> &'static str {
        "currency_last"
    }

    fn extract(&self, body: &[u8]) -> FetchResult<f64> {
        let payload = parse(body)?;
        let ticker = child(&payload, &self.currency)?;
        let path = format!("{}.{}", self.currency, self.field);
        number(child_at(ticker, &self.field, &path)?, &path)
    }
}

/// Rates table keyed by symbol: `{"base": "EUR", "rates": {"USD": 1.1}}`
#[derive(Debug, Clone)]
pub struct RatesTable {
    table: String,
    symbol: String,
}

impl RatesTable {
    pub fn new(table: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            symbol: symbol.into(),
        }
    }
}

impl RateExtractor for RatesTable {
    fn kind(&self) -> &'static str {
        "rates_table"
    }

    fn extract(&self, body: &[u8]) -> FetchResult<f64> {
        let payload = parse(body)?;
        let rates = child(&payload, &self.table)?;
        let path = format!("{}.{}", self.table, self.symbol);
        number(child_at(rates, &self.symbol, &path)?, &path)
    }
}

/// Object keyed by a composite currency pair: `{"EUR_USD": {"val": 1.1}}`
#[derive(Debug, Clone)]
pub struct PairValue {
    pair: String,
    field: String,
}

impl PairValue {
    pub fn new(pair: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            pair: pair.into(),
            field: field.into(),
        }
    }
}

impl RateExtractor for PairValue {
    fn kind(&self) -> &'static str {
        "pair_value"
    }

    fn extract(&self, body: &[u8]) -> FetchResult<f64> {
        let payload = parse(body)?;
        let quote = child(&payload, &self.pair)?;
        let path = format!("{}.{}", self.pair, self.field);
        number(child_at(quote, &self.field, &path)?, &path)
    }
}

fn parse(body: &[u8]) -> FetchResult<Value> {
    Ok(serde_json::from_slice(body)?)
}

fn child<'a>(value: &'a Value, key: &str) -> FetchResult<&'a Value> {
    child_at(value, key, key)
}

fn child_at<'a>(value: &'a Value, key: &str, path: &str) -> FetchResult<&'a Value> {
    let object = value
        .as_object()
        .ok_or_else(|| FetchError::Decode(format!("expected object containing {path}")))?;
    object
        .get(key)
        .ok_or_else(|| FetchError::MissingField(path.to_string()))
}

fn number(value: &Value, path: &str) -> FetchResult<f64> {
    let rate = value
        .as_f64()
        .ok_or_else(|| FetchError::Decode(format!("expected number at {path}, got {value}")))?;
    finite(rate)
}

fn text_number(value: &Value, path: &str) -> FetchResult<f64> {
    let text = value
        .as_str()
        .ok_or_else(|| FetchError::Decode(format!("expected string at {path}, got {value}")))?;
    let rate = text
        .trim()
        .parse::<f64>()
        .map_err(|e| FetchError::InvalidNumber {
            value: text.to_string(),
            reason: e.to_string(),
        })?;
    finite(rate)
}

// f64 parsing accepts "NaN" and "inf"; neither may reach a mean.
fn finite(rate: f64) -> FetchResult<f64> {
    if rate.is_finite() {
        Ok(rate)
    } else {
        Err(FetchError::NonFinite(rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BITPAY: &str = r#"{"code":"USD","name":"US Dollar","rate":8012.34}"#;
    const BITSTAMP: &str = r#"{"high":"8100.00","last":"8005.12","bid":"8004.00","volume":"1234.5"}"#;
    const BLOCKCHAIN: &str = r#"{
        "USD": {"15m": 8001.0, "last": 8001.5, "buy": 8001.0, "sell": 8002.0, "symbol": "$"},
        "EUR": {"15m": 7270.0, "last": 7271.5, "buy": 7270.0, "sell": 7272.0, "symbol": "€"}
    }"#;
    const FIXER: &str = r#"{"base":"EUR","date":"2018-01-05","rates":{"USD":1.2065}}"#;
    const FREE_CC: &str = r#"{"EUR_USD":{"val":1.2071}}"#;

    #[test]
    fn test_root_number() {
        let rate = RootNumber::new("rate").extract(BITPAY.as_bytes()).unwrap();
        assert_eq!(rate, 8012.34);
    }

    #[test]
    fn test_root_text() {
        let rate = RootText::new("last").extract(BITSTAMP.as_bytes()).unwrap();
        assert_eq!(rate, 8005.12);
    }

    #[test]
    fn test_root_text_rejects_non_numeric() {
        let err = RootText::new("last")
            .extract(br#"{"last":"not-a-price"}"#)
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidNumber { .. }));
    }

    #[test]
    fn test_root_text_rejects_nan() {
        let err = RootText::new("last").extract(br#"{"last":"NaN"}"#).unwrap_err();
        assert!(matches!(err, FetchError::NonFinite(_)));
    }

    #[test]
    fn test_root_text_rejects_number_type() {
        let err = RootText::new("last").extract(br#"{"last":8005.12}"#).unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[test]
    fn test_currency_last() {
        let usd = CurrencyLast::new("USD", "last").extract(BLOCKCHAIN.as_bytes()).unwrap();
        assert_eq!(usd, 8001.5);

        let eur = CurrencyLast::new("EUR", "last").extract(BLOCKCHAIN.as_bytes()).unwrap();
        assert_eq!(eur, 7271.5);
    }

    #[test]
    fn test_currency_last_missing_currency() {
        let err = CurrencyLast::new("GBP", "last")
            .extract(BLOCKCHAIN.as_bytes())
            .unwrap_err();
        assert!(matches!(err, FetchError::MissingField(ref f) if f == "GBP"));
    }

    #[test]
    fn test_rates_table() {
        let rate = RatesTable::new("rates", "USD").extract(FIXER.as_bytes()).unwrap();
        assert_eq!(rate, 1.2065);
    }

    #[test]
    fn test_rates_table_missing_symbol() {
        let err = RatesTable::new("rates", "JPY").extract(FIXER.as_bytes()).unwrap_err();
        assert!(matches!(err, FetchError::MissingField(ref f) if f == "rates.JPY"));
    }

    #[test]
    fn test_pair_value() {
        let rate = PairValue::new("EUR_USD", "val").extract(FREE_CC.as_bytes()).unwrap();
        assert_eq!(rate, 1.2071);
    }

    #[test]
    fn test_pair_value_wrong_nesting() {
        let err = PairValue::new("EUR_USD", "val")
            .extract(br#"{"EUR_USD":1.2071}"#)
            .unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[test]
    fn test_malformed_json() {
        let err = RootNumber::new("rate").extract(b"<html>502 Bad Gateway</html>").unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[test]
    fn test_array_payload_rejected() {
        let err = RootNumber::new("rate").extract(b"[1, 2, 3]").unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[test]
    fn test_build_extractor_from_config() {
        let extractor = build_extractor(&ExtractorConfig::PairValue {
            pair: "EUR_USD".into(),
            field: "val".into(),
        });
        assert_eq!(extractor.kind(), "pair_value");
        assert_eq!(extractor.extract(FREE_CC.as_bytes()).unwrap(), 1.2071);

        let extractor = build_extractor(&ExtractorConfig::RootText { field: "last".into() });
        assert_eq!(extractor.kind(), "root_text");
    }
}
