//! # newsroll
//!
//! Collects headlines from a configured set of news sites, normalizes them
//! into [`models::NewsRecord`]s and stores each story exactly once.
//!
//! ## Usage
//!
//! ```sh
//! newsroll run --once
//! newsroll export --output ./api
//! ```
//!
//! ## Architecture
//!
//! One cycle of the pipeline, per (source, category) pair:
//! 1. **Resolve**: the registry turns the canonical category into the site's URL
//! 2. **Fetch**: GET the listing page with retry and backoff
//! 3. **Extract**: apply the source's selectors to get candidates
//! 4. **Normalize**: summary, fingerprint, sentiment
//! 5. **Persist**: insert unless the fingerprint is already stored
//!
//! Cycles repeat on a fixed interval until Ctrl-C.

use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod categories;
mod cli;
mod error;
mod extractor;
mod fetcher;
mod models;
mod normalize;
mod outputs;
mod scheduler;
mod sentiment;
mod sources;
mod store;
mod utils;

use cli::{Cli, Command, ExportArgs, RunArgs, ScorerKind, SourcesArgs};
use fetcher::{FetchSettings, build_fetcher};
use normalize::{Deduplicator, Normalizer};
use scheduler::{Scheduler, SchedulerConfig};
use sentiment::{LexiconScorer, NoopScorer, SentimentScorer};
use sources::Registry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let args = Cli::parse();
    let registry = match load_registry(args.sources.as_deref()) {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "Source registry is invalid");
            return Err(e.into());
        }
    };

    match args.command {
        Command::Run(run_args) => run(registry, run_args).await,
        Command::Sources(sources_args) => {
            list_sources(&registry, &sources_args);
            Ok(())
        }
        Command::Export(export_args) => export(export_args).await,
    }
}

fn load_registry(path: Option<&std::path::Path>) -> Result<Registry, error::RegistryError> {
    match path {
        Some(path) => Registry::from_yaml_file(path),
        None => {
            let registry = Registry::builtin()?;
            info!(count = registry.len(), "Using built-in sources");
            Ok(registry)
        }
    }
}

async fn run(mut registry: Registry, args: RunArgs) -> Result<(), Box<dyn Error>> {
    let start_time = std::time::Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "newsroll starting up");

    if !args.only.is_empty() {
        let unknown = registry.retain_named(&args.only);
        if !unknown.is_empty() {
            warn!(?unknown, "Ignoring unknown source names");
        }
        if registry.len() == 0 {
            error!(requested = ?args.only, "No sources left to run");
            return Err("no matching sources".into());
        }
    }

    let mut config = SchedulerConfig {
        rotation: args.rotation,
        interval: StdDuration::from_secs(args.interval_secs),
        concurrency: usize::from(args.concurrency),
        ..Default::default()
    };
    if let Some(list) = args.category_list() {
        config.categories = list;
    }
    for category in config.categories.iter().filter(|c| !categories::is_canonical(c)) {
        warn!(%category, "Category is not canonical; sources without a mapping use their default");
    }

    // Unreachable store at startup is fatal; later failures are per record.
    let store = match store::open(&args.store).await {
        Ok(s) => s,
        Err(e) => {
            error!(location = %args.store, error = %e, "Store is unavailable");
            return Err(e.into());
        }
    };
    if args.is_memory_store() {
        warn!("Using in-memory store; records are lost on exit");
    }

    let scorer: Arc<dyn SentimentScorer> = match args.sentiment {
        ScorerKind::None => Arc::new(NoopScorer),
        ScorerKind::Lexicon => Arc::new(LexiconScorer),
    };
    info!(scorer = scorer.name(), "Sentiment scorer selected");

    let fetcher = build_fetcher(&FetchSettings {
        timeout: StdDuration::from_secs(args.timeout_secs),
        max_retries: args.retries,
        ..Default::default()
    })?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received; stopping after the current page");
            let _ = shutdown_tx.send(true);
        }
    });

    let dedup = Deduplicator::new(Normalizer::new(scorer), store);
    let scheduler = Scheduler::new(registry, fetcher, dedup, config, shutdown_rx);
    let cycles = scheduler.run(args.once).await;

    let elapsed = start_time.elapsed();
    info!(
        cycles,
        ?elapsed,
        secs = elapsed.as_secs(),
        "Execution complete"
    );
    Ok(())
}

fn list_sources(registry: &Registry, args: &SourcesArgs) {
    let categories: Vec<String> = match &args.category {
        Some(c) => vec![categories::canonicalize(c)],
        None => categories::CANONICAL.iter().map(|c| c.to_string()).collect(),
    };
    for source in registry.iter() {
        println!("{}", source.name());
        for category in &categories {
            println!("  {:<14} {}", category, source.resolve_url(category));
        }
    }
}

async fn export(args: ExportArgs) -> Result<(), Box<dyn Error>> {
    if args.store != store::MEMORY_LOCATION && !std::path::Path::new(&args.store).is_file() {
        error!(location = %args.store, "Records file does not exist");
        return Err(format!("no records file at {}", args.store).into());
    }
    let store = store::open(&args.store).await?;
    let records = store.all().await?;
    let summary = outputs::json::write_views(&records, &args.output).await?;
    info!(
        records = summary.records,
        files = summary.files.len(),
        "Export complete"
    );
    Ok(())
}
