//! Presentation of round outcomes

use tracing::info;

use ticker_core::RoundOutcome;
use ticker_price_feed::RoundReporter;

/// Writes one line per round to stdout and a structured log event
#[derive(Debug, Clone)]
pub struct LogReporter {
    print: bool,
}

impl LogReporter {
    pub fn new() -> Self {
        Self { print: true }
    }

    /// Structured log event only, no stdout line
    pub fn quiet() -> Self {
        Self { print: false }
    }

    pub fn render(outcome: &RoundOutcome) -> String {
        format!("[{}]{}", outcome.started_at.format("%H:%M:%S%.3f"), outcome)
    }
}

impl Default for LogReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundReporter for LogReporter {
    fn report(&self, outcome: &RoundOutcome) {
        info!(
            round = outcome.round_id,
            answered = outcome.total_answered(),
            configured = outcome.total_configured(),
            closed_by = %outcome.closed_by,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            deadline_ms = outcome.deadline.as_millis() as u64,
            "Round complete"
        );

        if self.print {
            println!("{}", Self::render(outcome));
        }
    }
}
