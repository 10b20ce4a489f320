//! Identification pipeline
//!
//! Turns a card photo into a canonical name: resolve a raw candidate via
//! the fallback chain, then normalize it against the vocabulary.

pub mod resolver;

pub use resolver::{Candidate, CandidateResolver, OriginKind, ResolverContext, Stage};

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::error::IdentifyError;
use crate::matching::FuzzyMatcher;
use crate::recognition::RecognitionEngine;
use crate::vision::{RawImage, RegionExtractor};
use crate::vocabulary::Vocabulary;

/// Name reported when nothing in the vocabulary matched
pub const UNKNOWN_NAME: &str = "Unknown";

/// Which stage the final name came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    OcrTitle,
    OcrFallback,
    Filename,
    None,
}

impl From<OriginKind> for Source {
    fn from(kind: OriginKind) -> Self {
        match kind {
            OriginKind::OcrTitle => Source::OcrTitle,
            OriginKind::OcrFallbackHeuristic => Source::OcrFallback,
            OriginKind::FilenameToken => Source::Filename,
        }
    }
}

/// Final output of one identification request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentificationResult {
    /// Raw text of the winning candidate
    pub raw_candidate: Option<String>,
    /// Canonical vocabulary name, or "Unknown"
    pub normalized_name: String,
    /// Similarity of the candidate to its best vocabulary entry (0 - 100)
    pub confidence: u8,
    /// Stage that produced the candidate
    pub source: Source,
}

impl IdentificationResult {
    fn unknown() -> Self {
        Self {
            raw_candidate: None,
            normalized_name: UNKNOWN_NAME.to_string(),
            confidence: 0,
            source: Source::None,
        }
    }

    /// Whether a vocabulary name was found
    pub fn is_identified(&self) -> bool {
        self.normalized_name != UNKNOWN_NAME
    }
}

/// End-to-end card identifier
///
/// Holds no per-request state; one instance serves concurrent requests.
pub struct Identifier {
    matcher: FuzzyMatcher,
    extractor: RegionExtractor,
    engine: Arc<dyn RecognitionEngine>,
    resolver: CandidateResolver,
    languages: Vec<String>,
}

impl Identifier {
    /// Build an identifier from the application configuration
    pub fn new(vocabulary: Arc<Vocabulary>, engine: Arc<dyn RecognitionEngine>, config: &AppConfig) -> Self {
        Self {
            matcher: FuzzyMatcher::with_threshold(vocabulary, config.matching.threshold),
            extractor: RegionExtractor::new(config.extraction.clone()),
            engine,
            resolver: CandidateResolver::default(),
            languages: config.recognition.languages.clone(),
        }
    }

    /// Replace the fallback chain
    pub fn with_resolver(mut self, resolver: CandidateResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn matcher(&self) -> &FuzzyMatcher {
        &self.matcher
    }

    /// Identify a card from encoded image bytes
    ///
    /// Fails only when the bytes are not a usable image.
    pub fn identify(&self, bytes: &[u8], filename_hint: Option<&str>) -> Result<IdentificationResult, IdentifyError> {
        let image = RawImage::decode(bytes)?;
        Ok(self.identify_image(&image, filename_hint))
    }

    /// Identify a card from an already decoded image
    pub fn identify_image(&self, image: &RawImage, filename_hint: Option<&str>) -> IdentificationResult {
        let start = Instant::now();
        let context = ResolverContext {
            extractor: &self.extractor,
            engine: self.engine.as_ref(),
            matcher: &self.matcher,
            languages: &self.languages,
        };

        let result = match self.resolver.resolve(&context, image, filename_hint) {
            Some(candidate) => self.normalize_candidate(candidate),
            None => IdentificationResult::unknown(),
        };

        info!(
            "Identified {}x{} card as {:?} (source {:?}, confidence {}, raw {:?}) in {:?}",
            image.width(),
            image.height(),
            result.normalized_name,
            result.source,
            result.confidence,
            result.raw_candidate,
            start.elapsed()
        );
        result
    }

    fn normalize_candidate(&self, candidate: Candidate) -> IdentificationResult {
        let full = self.matcher.best_match(&candidate.text);
        let matched = if full.is_match() {
            full
        } else {
            debug!("No full match for {:?}, trying tokens", candidate.text);
            self.matcher.best_match_loose(&candidate.text)
        };

        // An accepted name reports its own similarity; otherwise the best
        // raw similarity of the text or any of its tokens
        let confidence = if matched.is_match() {
            (matched.confidence * 100.0).round().clamp(0.0, 100.0) as u8
        } else {
            self.matcher.score(&candidate.text)
        };

        IdentificationResult {
            normalized_name: matched
                .canonical_name
                .unwrap_or_else(|| UNKNOWN_NAME.to_string()),
            confidence,
            source: candidate.origin_kind.into(),
            raw_candidate: Some(candidate.text),
        }
    }
}
