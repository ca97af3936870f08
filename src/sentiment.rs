//! Pluggable sentiment scoring.
//!
//! Scores are attached to records verbatim. A scorer may fail or decline to
//! score; either way the record is still stored, just without sentiment.

use crate::error::ScoreError;
use crate::models::Sentiment;
use once_cell::sync::Lazy;
use std::collections::HashMap;

pub trait SentimentScorer: Send + Sync {
    /// Score `text`. `Ok(None)` means the scorer has nothing to say.
    fn score(&self, text: &str) -> Result<Option<Sentiment>, ScoreError>;

    fn name(&self) -> &'static str;
}

/// Scorer that never produces a result.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopScorer;

impl SentimentScorer for NoopScorer {
    fn score(&self, _text: &str) -> Result<Option<Sentiment>, ScoreError> {
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

static LEXICON: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    [
        // positive
        ("good", 1.9),
        ("great", 3.1),
        ("win", 2.8),
        ("wins", 2.7),
        ("won", 2.7),
        ("success", 2.7),
        ("breakthrough", 2.5),
        ("hope", 1.9),
        ("growth", 1.6),
        ("gain", 2.0),
        ("gains", 2.0),
        ("rally", 1.8),
        ("record", 1.0),
        ("celebrate", 2.7),
        ("peace", 2.5),
        ("rescue", 1.9),
        ("recovery", 1.8),
        ("improve", 1.9),
        ("improves", 1.9),
        ("boost", 1.7),
        ("love", 3.2),
        ("safe", 1.9),
        ("agreement", 1.3),
        ("award", 2.5),
        ("cure", 2.4),
        // negative
        ("bad", -2.5),
        ("war", -2.9),
        ("crisis", -3.1),
        ("killed", -3.5),
        ("dead", -3.3),
        ("death", -2.9),
        ("attack", -2.1),
        ("crash", -2.2),
        ("fall", -1.1),
        ("falls", -1.1),
        ("loss", -1.3),
        ("losses", -1.5),
        ("fear", -2.2),
        ("fears", -2.0),
        ("threat", -2.4),
        ("fire", -1.4),
        ("flood", -1.9),
        ("scandal", -2.2),
        ("fraud", -2.8),
        ("injured", -2.0),
        ("violence", -3.1),
        ("protest", -1.0),
        ("warning", -1.4),
        ("decline", -1.1),
        ("fails", -2.0),
        ("disaster", -3.1),
    ]
    .into_iter()
    .collect()
});

const NEGATIONS: [&str; 8] = ["not", "no", "never", "without", "isn't", "wasn't", "don't", "won't"];

/// How many tokens after a negation are flipped.
const NEGATION_SCOPE: usize = 3;

/// Normalisation constant for the compound score.
const ALPHA: f64 = 15.0;

/// Small word-list scorer with negation handling.
///
/// `compound = s / sqrt(s^2 + 15)` where `s` is the sum of token valences;
/// the three components are the share of positive, neutral and negative
/// tokens.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexiconScorer;

impl SentimentScorer for LexiconScorer {
    fn score(&self, text: &str) -> Result<Option<Sentiment>, ScoreError> {
        let tokens: Vec<String> = text
            .split_whitespace()
            .map(|t| {
                t.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                    .to_lowercase()
            })
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.is_empty() {
            return Ok(Some(Sentiment::default()));
        }

        let mut sum = 0.0;
        let (mut pos, mut neg) = (0usize, 0usize);
        let mut negate_left = 0usize;
        for token in &tokens {
            if NEGATIONS.contains(&token.as_str()) {
                negate_left = NEGATION_SCOPE;
                continue;
            }
            if let Some(&valence) = LEXICON.get(token.as_str()) {
                let valence = if negate_left > 0 { -valence * 0.74 } else { valence };
                sum += valence;
                if valence > 0.0 {
                    pos += 1;
                } else {
                    neg += 1;
                }
            }
            negate_left = negate_left.saturating_sub(1);
        }

        let total = tokens.len() as f64;
        let neutral = tokens.len() - pos - neg;
        Ok(Some(Sentiment {
            compound: sum / (sum * sum + ALPHA).sqrt(),
            positive: pos as f64 / total,
            neutral: neutral as f64 / total,
            negative: neg as f64 / total,
        }))
    }

    fn name(&self) -> &'static str {
        "lexicon"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(text: &str) -> Sentiment {
        LexiconScorer.score(text).unwrap().unwrap()
    }

    #[test]
    fn test_noop_scores_nothing() {
        assert_eq!(NoopScorer.score("great win").unwrap(), None);
    }

    #[test]
    fn test_positive_headline() {
        let s = score("Team celebrate great win after record season");
        assert!(s.compound > 0.5, "{s:?}");
        assert!(s.positive > s.negative);
    }

    #[test]
    fn test_negative_headline() {
        let s = score("Flood disaster: dozens dead, hundreds injured");
        assert!(s.compound < -0.5, "{s:?}");
        assert!(s.negative > s.positive);
    }

    #[test]
    fn test_negation_flips() {
        assert!(score("talks were good").compound > 0.0);
        assert!(score("talks were not good").compound < 0.0);
    }

    #[test]
    fn test_components_sum_to_one() {
        let s = score("Markets rally as fears of crisis ease");
        let sum = s.positive + s.neutral + s.negative;
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(s.compound >= -1.0 && s.compound <= 1.0);
    }

    #[test]
    fn test_empty_text_is_neutral_zero() {
        assert_eq!(score("   "), Sentiment::default());
    }
}
