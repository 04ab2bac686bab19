//! Scheduler - runs sampling rounds on independent fixed-period timers

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use ticker_core::{OverlapPolicy, ScheduleEntry};

use crate::report::RoundReporter;
use crate::round::{SamplingPlan, SamplingRound};

#[derive(Debug, Default)]
struct Counters {
    rounds_started: AtomicU64,
    rounds_reported: AtomicU64,
    ticks_skipped: AtomicU64,
}

/// Clears the busy flag of a schedule entry when its round ends or is aborted
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives one repeating sequence of rounds per schedule entry
pub struct Scheduler {
    plan: Arc<SamplingPlan>,
    reporter: Arc<dyn RoundReporter>,
    overlap: OverlapPolicy,
    handles: Vec<JoinHandle<()>>,
    entry_count: usize,
    running: Arc<RwLock<bool>>,
    counters: Arc<Counters>,
}

impl Scheduler {
    pub fn new(
        plan: Arc<SamplingPlan>,
        reporter: Arc<dyn RoundReporter>,
        overlap: OverlapPolicy,
    ) -> Self {
        Self {
            plan,
            reporter,
            overlap,
            handles: vec![],
            entry_count: 0,
            running: Arc::new(RwLock::new(false)),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Start one timer task per entry. Entries never share round state.
    pub async fn start(&mut self, entries: &[ScheduleEntry]) {
        info!("Starting scheduler with {} entries", entries.len());
        *self.running.write().await = true;

        for entry in entries {
            if entry.may_overlap() {
                warn!(
                    "Deadline {:?} exceeds period {:?}; rounds will overlap ({:?})",
                    entry.deadline, entry.period, self.overlap
                );
            }

            let handle = tokio::spawn(run_entry(
                *entry,
                Arc::clone(&self.plan),
                Arc::clone(&self.reporter),
                self.overlap,
                Arc::clone(&self.counters),
            ));

            self.handles.push(handle);
            self.entry_count += 1;
            info!("Scheduled rounds {}", entry);
        }
    }

    /// Stop all timers. Rounds still collecting are abandoned unreported.
    pub async fn stop(&mut self) {
        info!("Stopping scheduler");
        *self.running.write().await = false;

        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            entry_count: self.entry_count,
            rounds_started: self.counters.rounds_started.load(Ordering::Relaxed),
            rounds_reported: self.counters.rounds_reported.load(Ordering::Relaxed),
            ticks_skipped: self.counters.ticks_skipped.load(Ordering::Relaxed),
        }
    }
}

/// Scheduler statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerStats {
    pub entry_count: usize,
    pub rounds_started: u64,
    pub rounds_reported: u64,
    pub ticks_skipped: u64,
}

async fn run_entry(
    entry: ScheduleEntry,
    plan: Arc<SamplingPlan>,
    reporter: Arc<dyn RoundReporter>,
    overlap: OverlapPolicy,
    counters: Arc<Counters>,
) {
    // First round fires one period after start
    let mut ticker = interval_at(Instant::now() + entry.period, entry.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let busy = Arc::new(AtomicBool::new(false));
    // Aborting this task drops the set, which aborts in-flight rounds
    let mut rounds = JoinSet::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            Some(_) = rounds.join_next(), if !rounds.is_empty() => continue,
        }

        if overlap == OverlapPolicy::SkipWhileBusy && busy.swap(true, Ordering::AcqRel) {
            counters.ticks_skipped.fetch_add(1, Ordering::Relaxed);
            debug!(period = ?entry.period, "Previous round still collecting, skipping tick");
            continue;
        }
        let guard = (overlap == OverlapPolicy::SkipWhileBusy).then(|| BusyGuard(Arc::clone(&busy)));

        counters.rounds_started.fetch_add(1, Ordering::Relaxed);
        let round = SamplingRound::new(Arc::clone(&plan), entry.deadline);
        let reporter = Arc::clone(&reporter);
        let counters = Arc::clone(&counters);

        rounds.spawn(async move {
            let _guard = guard;
            let outcome = round.run().await;
            reporter.report(&outcome);
            counters.rounds_reported.fetch_add(1, Ordering::Relaxed);
        });
    }
}
