//! Turning candidates into stored records.
//!
//! - [`summarize`]: bounded summary with a truncation marker
//! - [`fingerprint`]: SHA-256 over headline and link, the record identity
//! - [`Normalizer`]: pure candidate → [`NewsRecord`] conversion
//! - [`Deduplicator`]: fingerprint check against this run and the store,
//!   then insert
//!
//! Re-ingesting an unchanged page is a no-op: every candidate maps to the
//! same fingerprint as before and the store already holds it.

use crate::error::StoreError;
use crate::models::{NewsRecord, RawCandidate, SentimentScores};
use crate::sentiment::SentimentScorer;
use crate::store::NewsStore;
use crate::utils::truncate_with_marker;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Longest summary stored, marker included.
pub const SUMMARY_MAX_CHARS: usize = 150;
pub const TRUNCATION_MARKER: &str = "...";

/// Summary of `description`, or of `headline` when there is no usable
/// description. At most `max` characters; ends with [`TRUNCATION_MARKER`]
/// exactly when the source text was longer than `max`.
pub fn summarize(description: Option<&str>, headline: &str, max: usize) -> String {
    let text = description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| headline.trim());
    truncate_with_marker(text, max, TRUNCATION_MARKER)
}

/// Lowercase hex SHA-256 of `headline` followed by `link`.
pub fn fingerprint(headline: &str, link: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(headline.as_bytes());
    hasher.update(link.as_bytes());
    hex::encode(hasher.finalize())
}

/// Result of pushing one candidate through the [`Deduplicator`].
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Inserted(NewsRecord),
    Duplicate { fingerprint: String },
}

/// Builds records from candidates. Holds no state besides the scorer.
pub struct Normalizer {
    scorer: Arc<dyn SentimentScorer>,
    summary_max: usize,
}

impl Normalizer {
    pub fn new(scorer: Arc<dyn SentimentScorer>) -> Self {
        Self {
            scorer,
            summary_max: SUMMARY_MAX_CHARS,
        }
    }

    /// Link the record will carry: the candidate's own, else the page it was
    /// found on.
    pub fn record_link<'a>(candidate: &'a RawCandidate, page_url: &'a str) -> &'a str {
        candidate.link.as_deref().unwrap_or(page_url)
    }

    pub fn fingerprint_of(candidate: &RawCandidate, page_url: &str) -> String {
        fingerprint(&candidate.headline, Self::record_link(candidate, page_url))
    }

    /// Build the record for `candidate`. Never fails; scoring errors leave
    /// the sentiment out.
    pub fn build(
        &self,
        candidate: &RawCandidate,
        source: &str,
        category: &str,
        page_url: &str,
        collected_at: DateTime<Utc>,
    ) -> NewsRecord {
        let link = Self::record_link(candidate, page_url).to_string();
        let summary = summarize(
            candidate.description.as_deref(),
            &candidate.headline,
            self.summary_max,
        );
        let description = match candidate.description.as_deref().map(str::trim) {
            Some(d) if !d.is_empty() => d.to_string(),
            _ => summarize(None, &candidate.headline, self.summary_max),
        };
        let sentiment = self.score(&candidate.headline, candidate.description.as_deref());

        NewsRecord {
            category: category.to_string(),
            source: source.to_string(),
            fingerprint: fingerprint(&candidate.headline, &link),
            headline: candidate.headline.clone(),
            description,
            summary,
            link,
            image: candidate.image.clone(),
            collected_at,
            sentiment,
            tags: Vec::new(),
        }
    }

    fn score(&self, headline: &str, description: Option<&str>) -> Option<SentimentScores> {
        let run = |field: &str, text: &str| match self.scorer.score(text) {
            Ok(s) => s,
            Err(e) => {
                warn!(field, scorer = self.scorer.name(), error = %e, "Sentiment scoring failed");
                None
            }
        };
        let scores = SentimentScores {
            headline: run("headline", headline),
            description: description.and_then(|d| run("description", d)),
        };
        (!scores.is_empty()).then_some(scores)
    }
}

/// Decides whether a candidate is new and persists it if so.
///
/// Keeps the fingerprints settled since the last
/// [`Deduplicator::begin_cycle`] so a story listed under several categories
/// of one site is looked up in the store only once. A fingerprint is only
/// remembered once the store has answered for it; until then concurrent
/// callers each go to the store, whose insert-if-absent is the final word.
pub struct Deduplicator {
    normalizer: Normalizer,
    store: Arc<dyn NewsStore>,
    seen: Mutex<HashSet<String>>,
}

impl Deduplicator {
    pub fn new(normalizer: Normalizer, store: Arc<dyn NewsStore>) -> Self {
        Self {
            normalizer,
            store,
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Forget fingerprints seen in the previous cycle.
    pub fn begin_cycle(&self) {
        self.seen_set().clear();
    }

    fn seen_set(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Normalize `candidate` and store it unless its fingerprint is known.
    ///
    /// # Arguments
    ///
    /// * `candidate` - One extracted article element
    /// * `source` - Registry name of the site it came from
    /// * `category` - Canonical category the page was fetched for
    /// * `page_url` - Listing page URL, used as the link when the candidate has none
    ///
    /// # Returns
    ///
    /// [`Outcome::Inserted`] with the stored record, or
    /// [`Outcome::Duplicate`] when this cycle or the store already has it.
    ///
    /// # Errors
    ///
    /// Returns the [`StoreError`] from a failed lookup or write. The
    /// fingerprint is not remembered, so a later attempt goes to the store
    /// again.
    pub async fn ingest(
        &self,
        candidate: &RawCandidate,
        source: &str,
        category: &str,
        page_url: &str,
    ) -> Result<Outcome, StoreError> {
        let fp = Normalizer::fingerprint_of(candidate, page_url);
        if self.seen_set().contains(&fp) {
            debug!(fingerprint = %fp, "Already seen this cycle");
            return Ok(Outcome::Duplicate { fingerprint: fp });
        }

        let outcome = self.persist(candidate, source, category, page_url, &fp).await?;
        self.seen_set().insert(fp);
        Ok(outcome)
    }

    async fn persist(
        &self,
        candidate: &RawCandidate,
        source: &str,
        category: &str,
        page_url: &str,
        fp: &str,
    ) -> Result<Outcome, StoreError> {
        if self.store.contains(fp).await? {
            return Ok(Outcome::Duplicate {
                fingerprint: fp.to_string(),
            });
        }
        let record = self
            .normalizer
            .build(candidate, source, category, page_url, Utc::now());
        if self.store.insert_if_absent(&record).await? {
            Ok(Outcome::Inserted(record))
        } else {
            Ok(Outcome::Duplicate {
                fingerprint: fp.to_string(),
            })
        }
    }
}
