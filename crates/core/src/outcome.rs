//! Round outcome types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Per-series result of one round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesStats {
    pub id: String,
    pub label: String,
    /// Sources configured for this series
    pub configured: usize,
    /// Sources that answered before the deadline
    pub answered: usize,
    pub sum: f64,
}

impl SeriesStats {
    pub fn new(id: impl Into<String>, label: impl Into<String>, configured: usize) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            configured,
            answered: 0,
            sum: 0.0,
        }
    }

    pub fn record(&mut self, value: f64) {
        self.answered += 1;
        self.sum += value;
    }

    /// Unweighted mean of the samples received; undefined without samples
    pub fn mean(&self) -> Option<f64> {
        if self.answered == 0 {
            return None;
        }
        Some(self.sum / self.answered as f64)
    }

    pub fn is_starved(&self) -> bool {
        self.answered == 0
    }
}

/// Derived cross rate, present only when both sides are defined
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioValue {
    pub label: String,
    pub value: Option<f64>,
}

impl RatioValue {
    pub fn derive(label: impl Into<String>, numerator: &SeriesStats, denominator: &SeriesStats) -> Self {
        let value = match (numerator.mean(), denominator.mean()) {
            (Some(n), Some(d)) if d != 0.0 => Some(n / d),
            _ => None,
        };
        Self {
            label: label.into(),
            value,
        }
    }
}

/// How a round's collection window closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionEnd {
    /// Every launched source answered or finished
    Drained,
    /// The deadline elapsed first
    TimedOut,
}

impl fmt::Display for CollectionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionEnd::Drained => write!(f, "drained"),
            CollectionEnd::TimedOut => write!(f, "timed-out"),
        }
    }
}

/// Everything one sampling round produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub round_id: u64,
    pub started_at: DateTime<Utc>,
    /// Collection deadline the round ran under
    pub deadline: Duration,
    pub elapsed: Duration,
    pub closed_by: CollectionEnd,
    pub series: Vec<SeriesStats>,
    pub ratios: Vec<RatioValue>,
}

impl RoundOutcome {
    pub fn series(&self, id: &str) -> Option<&SeriesStats> {
        self.series.iter().find(|s| s.id == id)
    }

    pub fn ratio(&self, label: &str) -> Option<f64> {
        self.ratios
            .iter()
            .find(|r| r.label == label)
            .and_then(|r| r.value)
    }

    pub fn total_answered(&self) -> usize {
        self.series.iter().map(|s| s.answered).sum()
    }

    pub fn total_configured(&self) -> usize {
        self.series.iter().map(|s| s.configured).sum()
    }
}

struct Cents(Option<f64>);

impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{:.2}", v),
            None => write!(f, "n/a"),
        }
    }
}

impl fmt::Display for RoundOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for s in &self.series {
            write!(f, " {}: {}", s.label, Cents(s.mean()))?;
        }
        for r in &self.ratios {
            write!(f, " {}: {}", r.label, Cents(r.value))?;
        }
        write!(f, " Active sources:")?;
        for s in &self.series {
            write!(f, " {} ({} of {})", s.label, s.answered, s.configured)?;
        }
        Ok(())
    }
}
