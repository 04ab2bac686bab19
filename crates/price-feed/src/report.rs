//! Reporting boundary for round outcomes

use tokio::sync::mpsc;
use tracing::debug;

use ticker_core::RoundOutcome;

/// Receives every completed round
pub trait RoundReporter: Send + Sync {
    fn report(&self, outcome: &RoundOutcome);
}

/// Forwards outcomes to a channel for external consumers
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<RoundOutcome>,
}

impl ChannelReporter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RoundOutcome>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RoundReporter for ChannelReporter {
    fn report(&self, outcome: &RoundOutcome) {
        if self.tx.send(outcome.clone()).is_err() {
            debug!(round = outcome.round_id, "Outcome channel closed");
        }
    }
}
