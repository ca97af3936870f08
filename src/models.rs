//! Data models for scraped headlines and their stored representation.
//!
//! - [`RawCandidate`]: one article element pulled out of a page, unvalidated
//! - [`NewsRecord`]: the persisted unit, identified by its fingerprint
//! - [`Sentiment`] / [`SentimentScores`]: optional polarity attached to a record
//! - [`NewsView`]: the read-only shape handed to the query API
//!
//! Records are created once by the ingestion pipeline and never mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An article element found on a listing page during one extraction pass.
///
/// Only the headline is guaranteed. The link and image may still be relative
/// if they could not be resolved against the page URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCandidate {
    /// Whitespace-collapsed headline text.
    pub headline: String,
    /// Absolute article link, when one was found.
    pub link: Option<String>,
    /// Teaser text, `None` when missing or empty on the page.
    pub description: Option<String>,
    /// Absolute image URL, when one was found.
    pub image: Option<String>,
}

/// Polarity of a piece of text.
///
/// `compound` is normalised to `[-1, 1]`; the three components are
/// proportions that sum to 1 (or are all zero for empty input).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Sentiment {
    pub compound: f64,
    pub positive: f64,
    pub neutral: f64,
    pub negative: f64,
}

/// Sentiment for the two scored fields of a record. Either side may be
/// missing when scoring failed or was disabled.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SentimentScores {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<Sentiment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Sentiment>,
}

impl SentimentScores {
    pub fn is_empty(&self) -> bool {
        self.headline.is_none() && self.description.is_none()
    }
}

/// A stored headline.
///
/// `fingerprint` is derived from `headline` and `link` only and is unique
/// across the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsRecord {
    /// Canonical category this record was collected under.
    pub category: String,
    /// Source name as declared in the registry.
    pub source: String,
    pub headline: String,
    pub description: String,
    /// Description (or headline) cut down to a bounded length.
    pub summary: String,
    /// Absolute article link; the listing page URL when the element had none.
    pub link: String,
    #[serde(default)]
    pub image: Option<String>,
    pub collected_at: DateTime<Utc>,
    pub fingerprint: String,
    #[serde(default)]
    pub sentiment: Option<SentimentScores>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// The record shape served by the read API.
///
/// Optional fields are already defaulted so consumers never deal with
/// missing keys: `image` is an empty string, `sentiment` an empty object and
/// `tags` an empty list.
#[allow(non_snake_case)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsView {
    pub id: String,
    pub category: String,
    pub source: String,
    pub headline: String,
    pub summary: String,
    pub description: String,
    pub image: String,
    pub sourceLink: String,
    pub date: String,
    pub sentiment: SentimentScores,
    pub tags: Vec<String>,
}

impl From<&NewsRecord> for NewsView {
    fn from(record: &NewsRecord) -> Self {
        Self {
            id: record.fingerprint.clone(),
            category: record.category.clone(),
            source: record.source.clone(),
            headline: record.headline.clone(),
            summary: record.summary.clone(),
            description: record.description.clone(),
            image: record.image.clone().unwrap_or_default(),
            sourceLink: record.link.clone(),
            date: record.collected_at.to_rfc3339(),
            sentiment: record.sentiment.clone().unwrap_or_default(),
            tags: record.tags.clone(),
        }
    }
}
