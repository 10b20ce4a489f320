//! Recognition Engine Adapter
//!
//! The text-recognition engine runs out of process. Everything above this
//! layer talks to it through [`RecognitionEngine`], so the concrete engine
//! (or a test double) can be swapped without touching the fallback chain.

pub mod tesseract;

pub use tesseract::TesseractEngine;

use image::DynamicImage;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Characters allowed in title-focused modes
pub const TITLE_CHAR_WHITELIST: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz' -";

/// Layout hint passed to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineMode {
    /// A single line of text (title band)
    FocusedLine,
    /// A small block of a few lines (title band)
    FocusedBlock,
    /// Automatic layout analysis of a whole page
    FullPage,
}

impl EngineMode {
    /// Tesseract page segmentation mode for this hint
    pub fn page_segmentation(&self) -> u8 {
        match self {
            EngineMode::FocusedLine => 7,
            EngineMode::FocusedBlock => 6,
            EngineMode::FullPage => 3,
        }
    }

    /// Whether recognition is restricted to title characters
    pub fn is_title_focused(&self) -> bool {
        matches!(self, EngineMode::FocusedLine | EngineMode::FocusedBlock)
    }
}

/// Why a recognition attempt produced no text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecognitionFailure {
    /// The image could not be handed to the engine
    #[error("failed to prepare image for engine: {0}")]
    TempFile(String),
    /// The engine process could not be started
    #[error("failed to start engine: {0}")]
    Spawn(String),
    /// The engine exited unsuccessfully
    #[error("engine exited with {code:?}: {output}")]
    ExitStatus { code: Option<i32>, output: String },
    /// The engine did not finish in time and was killed
    #[error("engine timed out after {0:?}")]
    Timeout(Duration),
}

/// Result of one engine invocation
///
/// Failures are soft: `succeeded` is false and `raw_text` empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionAttempt {
    /// Layout hint used for this attempt
    pub engine_mode: EngineMode,
    /// Recognized text, possibly empty
    pub raw_text: String,
    /// Whether the engine ran to a successful exit
    pub succeeded: bool,
    /// Failure reason when `succeeded` is false
    pub failure: Option<RecognitionFailure>,
}

impl RecognitionAttempt {
    pub fn success(engine_mode: EngineMode, raw_text: impl Into<String>) -> Self {
        Self {
            engine_mode,
            raw_text: raw_text.into(),
            succeeded: true,
            failure: None,
        }
    }

    pub fn failed(engine_mode: EngineMode, failure: RecognitionFailure) -> Self {
        Self {
            engine_mode,
            raw_text: String::new(),
            succeeded: false,
            failure: Some(failure),
        }
    }

    /// Recognized text when the attempt succeeded and produced any
    pub fn text(&self) -> Option<&str> {
        if self.succeeded && !self.raw_text.trim().is_empty() {
            Some(&self.raw_text)
        } else {
            None
        }
    }
}

/// An out-of-process text recognizer
///
/// Implementations never fail outright; problems are reported through
/// [`RecognitionAttempt::failure`]. No retries happen at this layer.
pub trait RecognitionEngine: Send + Sync {
    /// Recognize text in `image` using the layout hint `mode`
    ///
    /// `languages` is in order of preference; an empty slice means the
    /// engine's configured default.
    fn recognize(
        &self,
        image: &DynamicImage,
        mode: EngineMode,
        languages: &[String],
    ) -> RecognitionAttempt;
}
