//! CardLens - identify collectible cards from photos
//!
//! Reads the printed title of a card with an external OCR engine, falls
//! back to full-page text and the upload's filename, and normalizes the
//! result against a controlled vocabulary of canonical names.

pub mod config;
pub mod error;
pub mod matching;
pub mod pipeline;
pub mod recognition;
pub mod storage;
pub mod vision;
pub mod vocabulary;

pub use error::{IdentifyError, VocabularyLoadError};
pub use matching::{FuzzyMatcher, MatchResult};
pub use pipeline::{IdentificationResult, Identifier, Source};
pub use recognition::{EngineMode, RecognitionAttempt, RecognitionEngine, TesseractEngine};
pub use vocabulary::Vocabulary;
