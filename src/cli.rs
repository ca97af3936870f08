//! Command-line interface.
//!
//! Every option can also be set through a `NEWSROLL_*` environment variable.

use crate::categories;
use crate::scheduler::CategoryRotation;
use crate::store::MEMORY_LOCATION;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Default records file.
pub const DEFAULT_STORE: &str = "news.jsonl";

/// Collect news headlines from a fixed set of sites into a local store.
///
/// # Examples
///
/// ```sh
/// # One pass over the default categories, then exit
/// newsroll run --once
///
/// # Technology and world only, one category per cycle, every 10 minutes
/// newsroll run --categories tech,world --rotation per-cycle --interval-secs 600
///
/// # Show where each source is fetched from for "arts"
/// newsroll sources --category arts
///
/// # Dump the store for the read API
/// newsroll export --output ./api
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// YAML source registry to use instead of the built-in sources
    #[arg(long, env = "NEWSROLL_SOURCES", global = true)]
    pub sources: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the ingestion loop
    Run(RunArgs),
    /// Print the listing page each source uses per category
    Sources(SourcesArgs),
    /// Write stored records as JSON for the read API
    Export(ExportArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScorerKind {
    None,
    Lexicon,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Run a single cycle and exit
    #[arg(long)]
    pub once: bool,

    /// Comma separated categories to visit; aliases such as `tech` are accepted
    #[arg(long, env = "NEWSROLL_CATEGORIES")]
    pub categories: Option<String>,

    /// Visit every category each cycle, or one category per cycle
    #[arg(long, value_enum, env = "NEWSROLL_ROTATION", default_value = "all")]
    pub rotation: CategoryRotation,

    /// Seconds to sleep between cycles
    #[arg(long, env = "NEWSROLL_INTERVAL_SECS", default_value_t = 300)]
    pub interval_secs: u64,

    /// Sources fetched at the same time
    #[arg(long, env = "NEWSROLL_CONCURRENCY", default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    pub concurrency: u16,

    /// Records file, or `:memory:`
    #[arg(long, env = "NEWSROLL_STORE", default_value = DEFAULT_STORE)]
    pub store: String,

    /// Only run the named source (repeatable)
    #[arg(long = "source", value_name = "NAME")]
    pub only: Vec<String>,

    /// Sentiment scorer applied to headlines and descriptions
    #[arg(long, value_enum, env = "NEWSROLL_SENTIMENT", default_value = "lexicon")]
    pub sentiment: ScorerKind,

    /// Per-attempt HTTP timeout in seconds
    #[arg(long, env = "NEWSROLL_TIMEOUT_SECS", default_value_t = 20)]
    pub timeout_secs: u64,

    /// Retries after a transient fetch failure
    #[arg(long, env = "NEWSROLL_RETRIES", default_value_t = 3)]
    pub retries: usize,
}

impl RunArgs {
    /// Canonical categories to visit, or `None` for the default rotation.
    pub fn category_list(&self) -> Option<Vec<String>> {
        self.categories
            .as_deref()
            .map(categories::parse_list)
            .filter(|list| !list.is_empty())
    }

    pub fn is_memory_store(&self) -> bool {
        self.store == MEMORY_LOCATION
    }
}

#[derive(Args, Debug)]
pub struct SourcesArgs {
    /// Only resolve this category
    #[arg(long)]
    pub category: Option<String>,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Directory receiving `news.json` and per-category files
    #[arg(short, long)]
    pub output: PathBuf,

    /// Records file to read
    #[arg(long, env = "NEWSROLL_STORE", default_value = DEFAULT_STORE)]
    pub store: String,
}
