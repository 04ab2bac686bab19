//! Concurrent multi-source rate sampling
//!
//! Features:
//! - Pluggable per-source payload extraction
//! - Fan-out fetches with fan-in under a single round deadline
//! - Per-series means and derived cross rates
//! - Independent fixed-period schedules

pub mod extract;
pub mod feeds;
pub mod http;
pub mod report;
pub mod round;
pub mod scheduler;

#[cfg(test)]
mod fixtures;

pub use extract::{build_extractor, RateExtractor};
pub use feeds::{HttpRateSource, RateSource, SourceDescriptor};
pub use http::HttpFetcher;
pub use report::{ChannelReporter, RoundReporter};
pub use round::{SamplingPlan, SamplingRound};
pub use scheduler::{Scheduler, SchedulerStats};
