//! Fuzzy matching of recognized text against the vocabulary
//!
//! Similarity is normalized Levenshtein distance computed over the
//! normalized forms of both strings.

use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::vocabulary::{normalize, Vocabulary};

/// Default acceptance threshold for a fuzzy match
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.78;

/// Shortest token considered during per-token matching
const MIN_TOKEN_LEN: usize = 2;

/// Outcome of matching a query against the vocabulary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    /// Canonical name, or `None` when nothing cleared the threshold
    pub canonical_name: Option<String>,
    /// Best similarity found (0.0 - 1.0), reported even without a match
    pub confidence: f64,
}

impl MatchResult {
    fn none(confidence: f64) -> Self {
        Self {
            canonical_name: None,
            confidence,
        }
    }

    /// Whether a canonical name was accepted
    pub fn is_match(&self) -> bool {
        self.canonical_name.is_some()
    }
}

/// Levenshtein distance (unit-cost insert, delete, substitute) over chars
pub fn edit_distance(a: &str, b: &str) -> usize {
    strsim::levenshtein(a, b)
}

/// Similarity of two strings after normalization
///
/// `1 - distance / max_len`; empty strings never match.
pub fn similarity(a: &str, b: &str) -> f64 {
    normalized_similarity(&normalize(a), &normalize(b))
}

/// Similarity of two strings that are already in normalized form
fn normalized_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let max_len = a.chars().count().max(b.chars().count());
    1.0 - edit_distance(a, b) as f64 / max_len as f64
}

/// Matches text against a shared, read-only vocabulary
#[derive(Debug, Clone)]
pub struct FuzzyMatcher {
    vocabulary: Arc<Vocabulary>,
    threshold: f64,
}

impl FuzzyMatcher {
    /// Create a matcher with the default threshold
    pub fn new(vocabulary: Arc<Vocabulary>) -> Self {
        Self::with_threshold(vocabulary, DEFAULT_MATCH_THRESHOLD)
    }

    /// Create a matcher with a custom threshold (clamped to 0.0 - 1.0)
    pub fn with_threshold(vocabulary: Arc<Vocabulary>, threshold: f64) -> Self {
        Self {
            vocabulary,
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Best vocabulary match for the whole query
    ///
    /// Ties go to the entry inserted first.
    pub fn best_match(&self, query: &str) -> MatchResult {
        self.best_match_normalized(&normalize(query))
    }

    fn best_match_normalized(&self, query: &str) -> MatchResult {
        if query.is_empty() {
            return MatchResult::none(0.0);
        }

        if let Some(canonical) = self.vocabulary.lookup(query) {
            return MatchResult {
                canonical_name: Some(canonical.to_string()),
                confidence: 1.0,
            };
        }

        let mut best: Option<(&str, f64)> = None;
        for entry in self.vocabulary.entries() {
            let score = normalized_similarity(query, &entry.normalized);
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((&entry.canonical, score));
            }
        }

        match best {
            Some((canonical, confidence)) if confidence >= self.threshold => MatchResult {
                canonical_name: Some(canonical.to_string()),
                confidence,
            },
            Some((_, confidence)) => MatchResult::none(confidence),
            None => MatchResult::none(0.0),
        }
    }

    /// Match the full query, then fall back to its individual tokens
    ///
    /// Returns the single best-scoring token match when the full query is
    /// rejected.
    pub fn best_match_loose(&self, query: &str) -> MatchResult {
        let normalized = normalize(query);
        let full = self.best_match_normalized(&normalized);
        if full.is_match() {
            return full;
        }

        let mut best_token: Option<MatchResult> = None;
        for token in tokens(&normalized) {
            let result = self.best_match_normalized(token);
            if best_token
                .as_ref()
                .map_or(true, |best| result.confidence > best.confidence)
            {
                best_token = Some(result);
            }
        }

        match best_token {
            Some(token_match) if token_match.is_match() => {
                debug!(
                    "Loose match {:?} -> {:?} ({:.3})",
                    query, token_match.canonical_name, token_match.confidence
                );
                token_match
            }
            Some(token_match) => MatchResult::none(full.confidence.max(token_match.confidence)),
            None => full,
        }
    }

    /// Raw best similarity for `text` as a 0-100 score
    ///
    /// Considers the full text and each of its tokens, ignoring the
    /// acceptance threshold.
    pub fn score(&self, text: &str) -> u8 {
        let normalized = normalize(text);
        let best = std::iter::once(normalized.as_str())
            .chain(tokens(&normalized))
            .map(|query| self.raw_best(query))
            .fold(0.0f64, f64::max);

        (best * 100.0).round().clamp(0.0, 100.0) as u8
    }

    fn raw_best(&self, query: &str) -> f64 {
        self.vocabulary
            .entries()
            .iter()
            .map(|entry| normalized_similarity(query, &entry.normalized))
            .fold(0.0f64, f64::max)
    }
}

/// Whitespace tokens long enough for per-token matching
fn tokens(normalized: &str) -> impl Iterator<Item = &str> {
    normalized
        .split_whitespace()
        .filter(|token| token.chars().count() >= MIN_TOKEN_LEN)
}
