//! Candidate resolution
//!
//! An ordered chain of stages, each turning whatever signal it has (title
//! band text, full-page text, the upload's filename) into a raw name
//! candidate. The first stage that yields a candidate wins.

use serde::Serialize;
use std::path::Path;
use tracing::{debug, warn};

use crate::matching::FuzzyMatcher;
use crate::recognition::{EngineMode, RecognitionEngine};
use crate::vision::{RawImage, RegionExtractor};
use crate::vocabulary::strip_diacritics;

/// Title-focused engine modes, in the order they are tried
const TITLE_MODES: [EngineMode; 2] = [EngineMode::FocusedLine, EngineMode::FocusedBlock];

/// Image extensions stripped from filename hints
const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "webp", "bmp"];

/// Shortest text accepted as a candidate or scanned as a line/token
const MIN_CANDIDATE_LEN: usize = 2;

/// Which signal produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginKind {
    /// Recognized from the title band
    OcrTitle,
    /// Picked out of full-page text by vocabulary heuristics
    OcrFallbackHeuristic,
    /// Derived from the upload's filename
    FilenameToken,
}

/// A raw name proposed by one resolver stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub text: String,
    pub origin_kind: OriginKind,
}

impl Candidate {
    fn new(text: impl Into<String>, origin_kind: OriginKind) -> Self {
        Self {
            text: text.into(),
            origin_kind,
        }
    }
}

/// Collaborators available to every stage
pub struct ResolverContext<'a> {
    pub extractor: &'a RegionExtractor,
    pub engine: &'a dyn RecognitionEngine,
    pub matcher: &'a FuzzyMatcher,
    /// Engine languages in order of preference
    pub languages: &'a [String],
}

/// One step of the fallback chain
pub type Stage = fn(&ResolverContext<'_>, &RawImage, Option<&str>) -> Option<Candidate>;

/// Ordered fallback chain of stages
#[derive(Clone)]
pub struct CandidateResolver {
    stages: Vec<Stage>,
}

impl Default for CandidateResolver {
    fn default() -> Self {
        Self {
            stages: vec![title_stage, full_page_stage, filename_stage],
        }
    }
}

impl CandidateResolver {
    /// A resolver with an explicit stage list
    pub fn with_stages(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    /// Append a stage to the end of the chain
    pub fn push_stage(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Run stages in order until one produces a candidate
    pub fn resolve(
        &self,
        context: &ResolverContext<'_>,
        image: &RawImage,
        filename_hint: Option<&str>,
    ) -> Option<Candidate> {
        for (index, stage) in self.stages.iter().enumerate() {
            if let Some(candidate) = stage(context, image, filename_hint) {
                debug!(
                    "Stage {} produced {:?} ({:?})",
                    index, candidate.text, candidate.origin_kind
                );
                return Some(candidate);
            }
        }
        debug!("No stage produced a candidate");
        None
    }
}

/// Recognize the title band in line and block modes; keep the result with
/// the most letters
pub fn title_stage(
    context: &ResolverContext<'_>,
    image: &RawImage,
    _filename_hint: Option<&str>,
) -> Option<Candidate> {
    let band = match context.extractor.extract(image) {
        Ok(band) => band,
        Err(e) => {
            warn!("Title band extraction failed: {}", e);
            return None;
        }
    };

    let mut best: Option<(String, usize)> = None;
    for mode in TITLE_MODES {
        let attempt = context
            .engine
            .recognize(band.as_image(), mode, context.languages);
        let Some(raw) = attempt.text() else {
            continue;
        };

        let cleaned = clean_title_text(raw);
        if cleaned.is_empty() {
            continue;
        }

        let score = letter_count(&cleaned);
        debug!("Title attempt {:?}: {:?} ({} letters)", mode, cleaned, score);
        if best.as_ref().map_or(true, |(_, best_score)| score > *best_score) {
            best = Some((cleaned, score));
        }
    }

    let (text, _) = best?;
    if text.chars().count() < MIN_CANDIDATE_LEN {
        return None;
    }
    Some(Candidate::new(title_case(&text), OriginKind::OcrTitle))
}

/// Recognize the whole card and look for a vocabulary name line by line,
/// then token by token
pub fn full_page_stage(
    context: &ResolverContext<'_>,
    image: &RawImage,
    _filename_hint: Option<&str>,
) -> Option<Candidate> {
    let attempt = context
        .engine
        .recognize(image.as_image(), EngineMode::FullPage, context.languages);
    let raw = attempt.text()?;
    let cleaned = clean_page_text(raw);

    let lines = cleaned
        .lines()
        .map(str::trim)
        .filter(|line| line.chars().count() >= MIN_CANDIDATE_LEN);
    for line in lines {
        if let Some(name) = context.matcher.best_match_loose(line).canonical_name {
            return Some(Candidate::new(name, OriginKind::OcrFallbackHeuristic));
        }
    }

    // Suffixes are often hyphenated onto the name (`pikachu-ex`)
    let tokens = cleaned
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|token| token.chars().count() >= MIN_CANDIDATE_LEN);
    for token in tokens {
        if let Some(name) = context.matcher.best_match_loose(token).canonical_name {
            return Some(Candidate::new(name, OriginKind::OcrFallbackHeuristic));
        }
    }

    None
}

/// Derive a candidate from the upload's filename
///
/// Without a vocabulary hit the longest token is proposed as-is.
pub fn filename_stage(
    context: &ResolverContext<'_>,
    _image: &RawImage,
    filename_hint: Option<&str>,
) -> Option<Candidate> {
    let cleaned = clean_filename(filename_hint?);
    if cleaned.is_empty() {
        return None;
    }

    if let Some(name) = context.matcher.best_match(&cleaned).canonical_name {
        return Some(Candidate::new(name, OriginKind::FilenameToken));
    }

    let mut tokens: Vec<&str> = cleaned
        .split(' ')
        .filter(|token| token.chars().count() >= MIN_CANDIDATE_LEN)
        .collect();
    // Longer tokens are less likely to be noise; stable sort keeps order on ties
    tokens.sort_by_key(|token| std::cmp::Reverse(token.chars().count()));

    for token in &tokens {
        if let Some(name) = context.matcher.best_match(token).canonical_name {
            return Some(Candidate::new(name, OriginKind::FilenameToken));
        }
    }

    tokens
        .first()
        .map(|token| Candidate::new(*token, OriginKind::FilenameToken))
}

/// Flatten title text and trim non-letter noise at both ends
pub fn clean_title_text(raw: &str) -> String {
    let flattened = raw
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    strip_diacritics(&flattened)
        .trim_matches(|c: char| !c.is_ascii_alphabetic())
        .to_string()
}

/// Lower-case page text, keeping letters, digits, spaces, hyphens and
/// line breaks
fn clean_page_text(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == ' ' || c == '-' || c == '\n' {
                c
            } else {
                ' '
            }
        })
        .collect::<String>()
        .to_lowercase()
}

/// Turn an upload name like `gx_blastoise-full.PNG` into `gx blastoise full`
pub fn clean_filename(hint: &str) -> String {
    let name = Path::new(hint)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(hint);

    let stem = match name.rsplit_once('.') {
        Some((stem, ext))
            if IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext)) =>
        {
            stem
        }
        _ => name,
    };

    stem.replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn letter_count(text: &str) -> usize {
    text.chars().filter(|c| c.is_ascii_alphabetic()).count()
}

/// `SQUIRTLE ex` -> `Squirtle Ex`
fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
