//! The ingestion run loop.
//!
//! A cycle walks (source × category) pairs: fetch the listing page, extract
//! candidates, hand each to the [`Deduplicator`]. Every failure is contained
//! to its pair; nothing in a cycle can stop the loop.
//!
//! # Pacing
//!
//! Each source walks its categories one at a time with a random pause
//! before every fetch except the cycle's very first, so a host never sees
//! more than one request at a time. With `concurrency > 1` several sources
//! run side by side inside the same task.
//!
//! # Shutdown
//!
//! A [`watch`] flag is checked before every pair and interrupts every sleep.
//! The pair in flight is allowed to finish.

use crate::extractor::extract;
use crate::fetcher::FetchPage;
use crate::normalize::{Deduplicator, Outcome};
use crate::sources::{Registry, Source};
use crate::utils::truncate_for_log;
use futures::stream::{self, StreamExt};
use rand::{Rng, rng};
use std::ops::AddAssign;
use std::time::{Duration as StdDuration, Instant};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Which categories a cycle visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CategoryRotation {
    /// Every configured category, every cycle.
    #[default]
    All,
    /// One category per cycle, round-robin over the configured list.
    PerCycle,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Canonical categories, in visiting order.
    pub categories: Vec<String>,
    pub rotation: CategoryRotation,
    /// Sleep between the end of one cycle and the start of the next.
    pub interval: StdDuration,
    pub jitter_min: StdDuration,
    pub jitter_max: StdDuration,
    /// Sources processed at once. `1` is strictly sequential.
    pub concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            categories: crate::categories::DEFAULT_ROTATION
                .iter()
                .map(|c| c.to_string())
                .collect(),
            rotation: CategoryRotation::All,
            interval: StdDuration::from_secs(300),
            jitter_min: StdDuration::from_millis(500),
            jitter_max: StdDuration::from_millis(2000),
            concurrency: 1,
        }
    }
}

/// Counters for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub pairs: usize,
    /// Pairs whose page could not be fetched.
    pub failed_pairs: usize,
    pub candidates: usize,
    pub inserted: usize,
    pub duplicates: usize,
    /// Candidates dropped because the store rejected the write.
    pub store_errors: usize,
}

impl AddAssign for CycleStats {
    fn add_assign(&mut self, rhs: Self) {
        self.pairs += rhs.pairs;
        self.failed_pairs += rhs.failed_pairs;
        self.candidates += rhs.candidates;
        self.inserted += rhs.inserted;
        self.duplicates += rhs.duplicates;
        self.store_errors += rhs.store_errors;
    }
}

/// Resolves once shutdown is signalled. Never resolves if the sender is
/// gone without signalling, so sleeps still run to completion.
async fn shutdown_signal(mut rx: watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

pub struct Scheduler<F> {
    registry: Registry,
    fetcher: F,
    dedup: Deduplicator,
    config: SchedulerConfig,
    shutdown: watch::Receiver<bool>,
    cycle: usize,
}

impl<F> Scheduler<F>
where
    F: FetchPage,
{
    pub fn new(
        registry: Registry,
        fetcher: F,
        dedup: Deduplicator,
        config: SchedulerConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            registry,
            fetcher,
            dedup,
            config,
            shutdown,
            cycle: 0,
        }
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sleep for `duration` unless shutdown is signalled first.
    /// Returns `true` when interrupted.
    async fn sleep_or_shutdown(&self, duration: StdDuration) -> bool {
        if duration.is_zero() {
            return self.shutdown_requested();
        }
        tokio::select! {
            _ = sleep(duration) => false,
            _ = shutdown_signal(self.shutdown.clone()) => true,
        }
    }

    fn pacing_delay(&self) -> StdDuration {
        let min = self.config.jitter_min.as_millis() as u64;
        let max = self.config.jitter_max.as_millis() as u64;
        if max <= min {
            return StdDuration::from_millis(min);
        }
        StdDuration::from_millis(rng().random_range(min..=max))
    }

    /// Categories visited in cycle number `cycle`.
    pub fn categories_for_cycle(&self, cycle: usize) -> Vec<String> {
        let categories = &self.config.categories;
        match self.config.rotation {
            CategoryRotation::All => categories.clone(),
            CategoryRotation::PerCycle if categories.is_empty() => Vec::new(),
            CategoryRotation::PerCycle => vec![categories[cycle % categories.len()].clone()],
        }
    }

    /// Run one full cycle and return its counters.
    #[instrument(level = "info", skip(self), fields(cycle = self.cycle))]
    pub async fn run_cycle(&mut self) -> CycleStats {
        let t0 = Instant::now();
        let categories = self.categories_for_cycle(self.cycle);
        self.dedup.begin_cycle();
        info!(
            sources = self.registry.len(),
            categories = ?categories,
            concurrency = self.config.concurrency,
            "Cycle starting"
        );

        let this = &*self;
        let categories = &categories;
        let per_source: Vec<CycleStats> = stream::iter(this.registry.iter().enumerate())
            .map(|(index, source)| this.run_source(source, categories, index > 0))
            .buffer_unordered(this.config.concurrency.max(1))
            .collect()
            .await;

        let mut stats = CycleStats::default();
        for s in per_source {
            stats += s;
        }
        info!(
            pairs = stats.pairs,
            failed_pairs = stats.failed_pairs,
            candidates = stats.candidates,
            inserted = stats.inserted,
            duplicates = stats.duplicates,
            store_errors = stats.store_errors,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Cycle complete"
        );
        self.cycle += 1;
        stats
    }

    /// Walk `categories` for one source, pausing before each fetch.
    async fn run_source(&self, source: &Source, categories: &[String], pace_first: bool) -> CycleStats {
        let mut stats = CycleStats::default();
        for (i, category) in categories.iter().enumerate() {
            if self.shutdown_requested() {
                debug!(source = source.name(), "Shutdown requested; leaving source");
                break;
            }
            if (i > 0 || pace_first) && self.sleep_or_shutdown(self.pacing_delay()).await {
                break;
            }
            stats += self.run_pair(source, category).await;
        }
        stats
    }

    #[instrument(level = "info", skip(self, source), fields(source = source.name()))]
    async fn run_pair(&self, source: &Source, category: &str) -> CycleStats {
        let mut stats = CycleStats {
            pairs: 1,
            ..Default::default()
        };
        let url = source.resolve_url(category);
        let page_url = match Url::parse(&url) {
            Ok(u) => u,
            Err(e) => {
                warn!(%url, error = %e, "Resolved URL does not parse; skipping pair");
                stats.failed_pairs = 1;
                return stats;
            }
        };

        let html = match self.fetcher.fetch(page_url.as_str()).await {
            Ok(html) => html,
            Err(e) => {
                warn!(%url, error = %e, "Fetch failed; no results for this pair");
                stats.failed_pairs = 1;
                return stats;
            }
        };

        let candidates = extract(&html, &page_url, &source.rule);
        if candidates.is_empty() {
            warn!(
                %url,
                page_preview = %truncate_for_log(&html, 200),
                "No articles matched the extraction rule"
            );
            return stats;
        }
        stats.candidates = candidates.len();

        for candidate in &candidates {
            match self
                .dedup
                .ingest(candidate, source.name(), category, page_url.as_str())
                .await
            {
                Ok(Outcome::Inserted(record)) => {
                    debug!(fingerprint = %record.fingerprint, headline = %record.headline, "Stored");
                    stats.inserted += 1;
                }
                Ok(Outcome::Duplicate { .. }) => stats.duplicates += 1,
                Err(e) => {
                    warn!(headline = %candidate.headline, error = %e, "Store write failed; dropping candidate");
                    stats.store_errors += 1;
                }
            }
        }
        info!(
            candidates = stats.candidates,
            inserted = stats.inserted,
            duplicates = stats.duplicates,
            "Pair done"
        );
        stats
    }

    /// Run cycles until shutdown, or a single cycle when `once` is set.
    ///
    /// Consumes the scheduler so the store handle is released on return.
    pub async fn run(mut self, once: bool) -> usize {
        let mut cycles = 0;
        while !self.shutdown_requested() {
            self.run_cycle().await;
            cycles += 1;
            if once {
                break;
            }
            debug!(interval = ?self.config.interval, "Sleeping until next cycle");
            if self.sleep_or_shutdown(self.config.interval).await {
                break;
            }
        }
        info!(cycles, "Run loop stopped");
        drop(self);
        cycles
    }
}
