//! Wiring of configuration, sampling plan and scheduler

use std::sync::Arc;
use tracing::{info, warn};

use ticker_core::{CoreResult, ScheduleEntry, TickerConfig};
use ticker_price_feed::round::series_without_sources;
use ticker_price_feed::{HttpFetcher, RoundReporter, SamplingPlan, Scheduler, SchedulerStats};

/// The running ticker
pub struct App {
    scheduler: Scheduler,
    entries: Vec<ScheduleEntry>,
}

impl App {
    /// Build the plan from configuration. Nothing runs until [`App::start`].
    pub fn from_config(config: &TickerConfig, reporter: Arc<dyn RoundReporter>) -> CoreResult<Self> {
        let http = HttpFetcher::new(&config.http)?;
        let plan = SamplingPlan::from_config(config, http)?;
        Self::with_plan(Arc::new(plan), config, reporter)
    }

    pub fn with_plan(
        plan: Arc<SamplingPlan>,
        config: &TickerConfig,
        reporter: Arc<dyn RoundReporter>,
    ) -> CoreResult<Self> {
        for series in series_without_sources(&plan) {
            warn!("Series {} has no sources; its mean will stay undefined", series);
        }

        for series in plan.series() {
            info!(
                "Series {} sampled from {} sources",
                series.label,
                plan.configured(&series.id)
            );
        }

        let entries = config.schedule_entries()?;
        let scheduler = Scheduler::new(plan, reporter, config.overlap);

        Ok(Self { scheduler, entries })
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub async fn start(&mut self) {
        self.scheduler.start(&self.entries).await;
    }

    pub async fn shutdown(&mut self) {
        self.scheduler.stop().await;
        let stats = self.scheduler.stats();
        info!(
            "Ticker stopped after {} rounds ({} reported, {} ticks skipped)",
            stats.rounds_started, stats.rounds_reported, stats.ticks_skipped
        );
    }

    pub async fn is_running(&self) -> bool {
        self.scheduler.is_running().await
    }

    pub fn stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }
}
