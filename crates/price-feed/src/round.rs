//! Sampling round - fan out to every source, fan in under one deadline
//!
//! A round moves through `Launching -> Collecting -> Drained | TimedOut ->
//! Reducing -> Reported`. Only `Collecting` has concurrent activity: every
//! source runs as its own task and writes into the conduit of its series,
//! while the round performs one multi-way receive over all conduits raced
//! against the deadline.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{StreamExt, StreamMap};
use tracing::debug;

use ticker_core::{
    CollectionEnd, CoreError, CoreResult, RatioDef, RatioValue, RoundOutcome, SeriesDef,
    SeriesStats, TickerConfig,
};

use crate::feeds::{run_fetch, SourceDescriptor};
use crate::http::HttpFetcher;

static NEXT_ROUND_ID: AtomicU64 = AtomicU64::new(1);

/// Round lifecycle phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    Launching,
    Collecting,
    Drained,
    TimedOut,
    Reducing,
    Reported,
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoundPhase::Launching => "launching",
            RoundPhase::Collecting => "collecting",
            RoundPhase::Drained => "drained",
            RoundPhase::TimedOut => "timed-out",
            RoundPhase::Reducing => "reducing",
            RoundPhase::Reported => "reported",
        };
        write!(f, "{name}")
    }
}

/// Series, ratios and sources sampled by every round.
///
/// Built once at startup and shared read-only across rounds and schedules.
#[derive(Debug)]
pub struct SamplingPlan {
    series: Vec<SeriesDef>,
    ratios: Vec<RatioDef>,
    sources: Vec<SourceDescriptor>,
    index: HashMap<String, usize>,
}

impl SamplingPlan {
    pub fn new(
        series: Vec<SeriesDef>,
        ratios: Vec<RatioDef>,
        sources: Vec<SourceDescriptor>,
    ) -> CoreResult<Self> {
        let mut index = HashMap::with_capacity(series.len());
        for (i, s) in series.iter().enumerate() {
            if index.insert(s.id.clone(), i).is_some() {
                return Err(CoreError::InvalidConfig(format!(
                    "duplicate series id {}",
                    s.id
                )));
            }
        }

        if let Some(orphan) = sources.iter().find(|d| !index.contains_key(&d.series)) {
            return Err(CoreError::UnknownSeries(format!(
                "{} (source {})",
                orphan.series, orphan.name
            )));
        }

        for ratio in &ratios {
            for side in [&ratio.numerator, &ratio.denominator] {
                if !index.contains_key(side) {
                    return Err(CoreError::UnknownSeries(format!(
                        "{} (ratio {})",
                        side, ratio.label
                    )));
                }
            }
        }

        Ok(Self {
            series,
            ratios,
            sources,
            index,
        })
    }

    /// Plan with HTTP sources for every configured source
    pub fn from_config(config: &TickerConfig, http: HttpFetcher) -> CoreResult<Self> {
        config.validate()?;
        let sources = config
            .sources
            .iter()
            .map(|s| SourceDescriptor::from_config(s, http.clone()))
            .collect();
        Self::new(config.series.clone(), config.ratios.clone(), sources)
    }

    pub fn series(&self) -> &[SeriesDef] {
        &self.series
    }

    pub fn ratios(&self) -> &[RatioDef] {
        &self.ratios
    }

    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    /// Number of sources feeding `series_id`
    pub fn configured(&self, series_id: &str) -> usize {
        self.sources.iter().filter(|d| d.series == series_id).count()
    }

    fn series_index(&self, series_id: &str) -> Option<usize> {
        self.index.get(series_id).copied()
    }
}

/// One synchronized sampling pass over every source of every series
pub struct SamplingRound {
    id: u64,
    plan: Arc<SamplingPlan>,
    deadline: Duration,
}

impl SamplingRound {
    pub fn new(plan: Arc<SamplingPlan>, deadline: Duration) -> Self {
        Self {
            id: NEXT_ROUND_ID.fetch_add(1, Ordering::Relaxed),
            plan,
            deadline,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Run the round to completion. Never waits past the deadline.
    pub async fn run(self) -> RoundOutcome {
        let started_at = Utc::now();
        let start = Instant::now();
        let deadline_at = start + self.deadline;
        let plan = &self.plan;

        debug!(round = self.id, phase = %RoundPhase::Launching, sources = plan.sources.len());

        let mut conduits = StreamMap::new();
        let mut senders = Vec::with_capacity(plan.series.len());
        for (i, series) in plan.series.iter().enumerate() {
            // Room for every source of the series so no fetcher blocks on send
            let (tx, rx) = mpsc::channel(plan.configured(&series.id).max(1));
            conduits.insert(i, ReceiverStream::new(rx));
            senders.push(tx);
        }

        let mut fetchers = JoinSet::new();
        for descriptor in &plan.sources {
            if let Some(i) = plan.series_index(&descriptor.series) {
                fetchers.spawn(run_fetch(descriptor.clone(), senders[i].clone()));
            }
        }
        // Conduits end once every fetcher has finished
        drop(senders);

        let expected = fetchers.len();
        let mut stats: Vec<SeriesStats> = plan
            .series
            .iter()
            .map(|s| SeriesStats::new(s.id.clone(), s.label.clone(), plan.configured(&s.id)))
            .collect();

        debug!(round = self.id, phase = %RoundPhase::Collecting, expected, deadline = ?self.deadline);

        let timeout = tokio::time::sleep_until(deadline_at);
        tokio::pin!(timeout);

        let mut received = 0;
        let closed_by = loop {
            if received == expected {
                break CollectionEnd::Drained;
            }

            tokio::select! {
                biased;

                next = conduits.next() => match next {
                    Some((i, rate)) => {
                        stats[i].record(rate);
                        received += 1;
                    }
                    None => break CollectionEnd::Drained,
                },
                _ = &mut timeout => break CollectionEnd::TimedOut,
            }
        };

        // Nothing reads the conduits past this point
        drop(conduits);
        fetchers.abort_all();

        let phase = match closed_by {
            CollectionEnd::Drained => RoundPhase::Drained,
            CollectionEnd::TimedOut => RoundPhase::TimedOut,
        };
        debug!(round = self.id, phase = %phase, received, expected);
        debug!(round = self.id, phase = %RoundPhase::Reducing);

        let ratios = plan
            .ratios
            .iter()
            .filter_map(|r| {
                let n = &stats[plan.series_index(&r.numerator)?];
                let d = &stats[plan.series_index(&r.denominator)?];
                Some(RatioValue::derive(r.label.clone(), n, d))
            })
            .collect();

        let outcome = RoundOutcome {
            round_id: self.id,
            started_at,
            deadline: self.deadline,
            elapsed: start.elapsed(),
            closed_by,
            series: stats,
            ratios,
        };

        debug!(round = self.id, phase = %RoundPhase::Reported, elapsed = ?outcome.elapsed);
        outcome
    }
}

/// Series no source feeds. Their means, and every ratio built on them,
/// stay undefined in every round.
pub fn series_without_sources(plan: &SamplingPlan) -> Vec<String> {
    let fed: HashSet<&str> = plan.sources.iter().map(|d| d.series.as_str()).collect();
    plan.series
        .iter()
        .filter(|s| !fed.contains(s.id.as_str()))
        .map(|s| s.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{btc_eur_plan, delayed, failing, fast, ScriptedSource};
    use proptest::prelude::*;
    use std::sync::atomic::Ordering;
    use ticker_core::round_cents;

    const DEADLINE: Duration = Duration::from_millis(500);

    #[tokio::test(start_paused = true)]
    async fn test_mean_of_answered_sources() {
        let plan = btc_eur_plan(vec![
            fast("a", "btc_usd", 100.0),
            fast("b", "btc_usd", 102.0),
            fast("c", "eur_usd", 1.0),
        ]);

        let outcome = SamplingRound::new(plan, DEADLINE).run().await;
        let btc = outcome.series("btc_usd").unwrap();

        assert_eq!(btc.answered, 2);
        assert_eq!(btc.configured, 2);
        assert_eq!(format!("{:.2}", btc.mean().unwrap()), "101.00");
        assert_eq!(outcome.closed_by, CollectionEnd::Drained);
        assert!(outcome.elapsed < DEADLINE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_round() {
        let plan = btc_eur_plan(vec![
            fast("btc-1", "btc_usd", 8000.0),
            fast("btc-2", "btc_usd", 8002.0),
            delayed("btc-3", "btc_usd", 9999.0, Duration::from_secs(2)),
            fast("eur-1", "eur_usd", 1.10),
            fast("eur-2", "eur_usd", 1.10),
            delayed("eur-3", "eur_usd", 1.10, Duration::from_millis(300)),
        ]);

        let outcome = SamplingRound::new(plan, DEADLINE).run().await;
        let btc = outcome.series("btc_usd").unwrap();
        let eur = outcome.series("eur_usd").unwrap();

        assert_eq!((btc.answered, btc.configured), (2, 3));
        assert_eq!((eur.answered, eur.configured), (3, 3));
        assert_eq!(btc.mean(), Some(8001.0));
        assert_eq!(outcome.closed_by, CollectionEnd::TimedOut);
        assert!(outcome.elapsed >= DEADLINE);
        assert!(outcome.elapsed < DEADLINE + Duration::from_millis(50));
        assert!(outcome.to_string().contains("BTC/USD (2 of 3) EUR/USD (3 of 3)"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_before_any_answer() {
        let slow = Duration::from_secs(3);
        let plan = btc_eur_plan(vec![
            delayed("btc-1", "btc_usd", 8000.0, slow),
            delayed("btc-2", "btc_usd", 8000.0, slow),
            delayed("eur-1", "eur_usd", 1.1, slow),
        ]);

        let outcome = SamplingRound::new(plan, Duration::from_millis(200)).run().await;

        assert!(outcome.series.iter().all(|s| s.answered == 0 && s.mean().is_none()));
        assert_eq!(outcome.ratio("BTC/EUR"), None);
        assert_eq!(outcome.closed_by, CollectionEnd::TimedOut);
        assert!(outcome.elapsed < Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cross_rate() {
        let plan = btc_eur_plan(vec![
            fast("btc", "btc_usd", 8000.0),
            fast("eur", "eur_usd", 1.10),
        ]);

        let outcome = SamplingRound::new(plan, DEADLINE).run().await;

        assert_eq!(outcome.ratio("BTC/EUR").map(round_cents), Some(7272.73));
        assert!(outcome.to_string().contains("BTC/EUR: 7272.73"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_source_is_isolated() {
        let plan = btc_eur_plan(vec![
            fast("btc-1", "btc_usd", 8000.0),
            failing("btc-broken", "btc_usd"),
            fast("btc-2", "btc_usd", 8010.0),
            failing("eur-broken", "eur_usd"),
            fast("eur-1", "eur_usd", 1.25),
        ]);

        let outcome = SamplingRound::new(plan, DEADLINE).run().await;
        let btc = outcome.series("btc_usd").unwrap();
        let eur = outcome.series("eur_usd").unwrap();

        assert_eq!((btc.answered, btc.configured), (2, 3));
        assert_eq!(btc.mean(), Some(8005.0));
        assert_eq!((eur.answered, eur.configured), (1, 2));
        assert_eq!(eur.mean(), Some(1.25));
        assert_eq!(outcome.ratio("BTC/EUR"), Some(8005.0 / 1.25));
        // Every fetcher finished, so the round does not wait for the deadline
        assert_eq!(outcome.closed_by, CollectionEnd::Drained);
        assert!(outcome.elapsed < DEADLINE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_series_without_sources() {
        let plan = Arc::new(
            SamplingPlan::new(
                vec![
                    SeriesDef::new("btc_usd", "BTC/USD"),
                    SeriesDef::new("eur_usd", "EUR/USD"),
                ],
                vec![RatioDef::new("BTC/EUR", "btc_usd", "eur_usd")],
                vec![fast("btc", "btc_usd", 8000.0)],
            )
            .unwrap(),
        );
        assert_eq!(series_without_sources(&plan), vec!["eur_usd".to_string()]);

        let outcome = SamplingRound::new(plan, DEADLINE).run().await;
        let eur = outcome.series("eur_usd").unwrap();

        assert_eq!((eur.answered, eur.configured), (0, 0));
        assert_eq!(eur.mean(), None);
        assert_eq!(outcome.ratio("BTC/EUR"), None);
        assert_eq!(outcome.closed_by, CollectionEnd::Drained);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_plan() {
        let plan = btc_eur_plan(vec![]);
        let outcome = SamplingRound::new(plan, DEADLINE).run().await;

        assert_eq!(outcome.total_answered(), 0);
        assert_eq!(outcome.closed_by, CollectionEnd::Drained);
        assert_eq!(outcome.elapsed, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_fetch_is_cancelled() {
        let slow = ScriptedSource::rate(9000.0, Duration::from_secs(2));
        let completed = slow.completed();
        let plan = btc_eur_plan(vec![
            fast("btc-1", "btc_usd", 8000.0),
            SourceDescriptor::new("btc-slow", "btc_usd", Arc::new(slow)),
            fast("eur-1", "eur_usd", 1.0),
        ]);

        let outcome = SamplingRound::new(plan, DEADLINE).run().await;
        let before = outcome.clone();

        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(completed.load(Ordering::SeqCst), 0);
        assert_eq!(outcome, before);
        assert_eq!(outcome.series("btc_usd").unwrap().mean(), Some(8000.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_ids_are_unique() {
        let plan = btc_eur_plan(vec![fast("btc", "btc_usd", 1.0)]);
        let a = SamplingRound::new(Arc::clone(&plan), DEADLINE);
        let b = SamplingRound::new(plan, DEADLINE);
        assert_ne!(a.id(), b.id());

        let outcome = b.run().await;
        assert_ne!(outcome.round_id, a.id());
    }

    #[test]
    fn test_plan_rejects_unknown_series() {
        let err = SamplingPlan::new(
            vec![SeriesDef::new("btc_usd", "BTC/USD")],
            vec![],
            vec![fast("eur", "eur_usd", 1.0)],
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::UnknownSeries(_)));

        let err = SamplingPlan::new(
            vec![SeriesDef::new("btc_usd", "BTC/USD")],
            vec![RatioDef::new("BTC/EUR", "btc_usd", "eur_usd")],
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::UnknownSeries(_)));
    }

    #[test]
    fn test_plan_from_default_config() {
        let config = TickerConfig::default();
        let http = HttpFetcher::new(&config.http).unwrap();
        let plan = SamplingPlan::from_config(&config, http).unwrap();

        assert_eq!(plan.sources().len(), 6);
        assert_eq!(plan.configured("btc_usd"), 3);
        assert_eq!(plan.configured("eur_usd"), 3);
        assert_eq!(plan.ratios().len(), 1);
        assert!(series_without_sources(&plan).is_empty());
    }

    proptest! {
        #[test]
        fn prop_counts_only_sources_before_deadline(
            btc in prop::collection::vec(prop_oneof![0u64..490, 510u64..2_000], 0..6),
            eur in prop::collection::vec(prop_oneof![0u64..490, 510u64..2_000], 0..6),
        ) {
            let mut sources = Vec::new();
            for (i, ms) in btc.iter().enumerate() {
                sources.push(delayed(&format!("btc-{i}"), "btc_usd", 100.0 + i as f64, Duration::from_millis(*ms)));
            }
            for (i, ms) in eur.iter().enumerate() {
                sources.push(delayed(&format!("eur-{i}"), "eur_usd", 1.0, Duration::from_millis(*ms)));
            }
            let plan = btc_eur_plan(sources);

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();
            let outcome = runtime.block_on(SamplingRound::new(plan, DEADLINE).run());

            let on_time = |delays: &[u64]| delays.iter().filter(|ms| **ms < 500).count();
            let btc_stats = outcome.series("btc_usd").unwrap();
            let eur_stats = outcome.series("eur_usd").unwrap();

            prop_assert_eq!(btc_stats.answered, on_time(&btc));
            prop_assert_eq!(eur_stats.answered, on_time(&eur));
            prop_assert!(btc_stats.answered <= btc_stats.configured);
            prop_assert!(eur_stats.answered <= eur_stats.configured);
            prop_assert!(outcome.elapsed <= DEADLINE + Duration::from_millis(5));
            prop_assert_eq!(
                outcome.ratio("BTC/EUR").is_some(),
                btc_stats.answered > 0 && eur_stats.answered > 0
            );
        }
    }
}
