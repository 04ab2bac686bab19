//! Core type definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::{CoreError, CoreResult};

/// One logical quantity sampled from several sources (e.g. BTC/USD)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesDef {
    /// Stable identifier sources refer to (e.g. "btc_usd")
    pub id: String,
    /// Human-readable label used when reporting (e.g. "BTC/USD")
    pub label: String,
}

impl SeriesDef {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

impl fmt::Display for SeriesDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

/// Cross rate derived from two series means: `numerator / denominator`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatioDef {
    pub label: String,
    pub numerator: String,
    pub denominator: String,
}

impl RatioDef {
    pub fn new(
        label: impl Into<String>,
        numerator: impl Into<String>,
        denominator: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            numerator: numerator.into(),
            denominator: denominator.into(),
        }
    }
}

/// A (period, deadline) pair driving one repeating sequence of rounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub period: Duration,
    pub deadline: Duration,
}

impl ScheduleEntry {
    pub fn new(period: Duration, deadline: Duration) -> CoreResult<Self> {
        if period.is_zero() {
            return Err(CoreError::InvalidConfig(
                "schedule period must be non-zero".to_string(),
            ));
        }
        if deadline.is_zero() {
            return Err(CoreError::InvalidConfig(
                "round deadline must be non-zero".to_string(),
            ));
        }
        Ok(Self { period, deadline })
    }

    /// Rounds of this entry can still be collecting when the next tick fires
    pub fn may_overlap(&self) -> bool {
        self.deadline > self.period
    }
}

impl fmt::Display for ScheduleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "every {:?} (deadline {:?})", self.period, self.deadline)
    }
}

/// Round to cent precision
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
