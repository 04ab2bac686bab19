//! Error types

use thiserror::Error;

/// Core error types
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown series: {0}")]
    UnknownSeries(String),

    #[error("Configuration load failed: {0}")]
    Config(#[from] config::ConfigError),

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

/// Per-source fetch errors.
///
/// None of these are fatal: a failing source simply contributes no sample
/// to the round it was launched for.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Transport failed: {0}")]
    Transport(String),

    #[error("Unexpected HTTP status {status}")]
    Status { status: u16 },

    #[error("Failed to read response body: {0}")]
    Body(String),

    #[error("Payload does not match expected shape: {0}")]
    Decode(String),

    #[error("Missing field: {0}")]
    MissingField(String),

    #[error("Invalid number {value:?}: {reason}")]
    InvalidNumber { value: String, reason: String },

    #[error("Non-finite rate: {0}")]
    NonFinite(f64),
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Decode(err.to_string())
    }
}

/// Result type alias
pub type CoreResult<T> = Result<T, CoreError>;
pub type FetchResult<T> = Result<T, FetchError>;
