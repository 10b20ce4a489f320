//! Error types surfaced by the identification pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Errors returned to callers of the identification pipeline
///
/// Recognition problems never show up here: they are recovered by the
/// fallback chain. Only unusable input images abort a request.
#[derive(Debug, Error)]
pub enum IdentifyError {
    /// The input could not be decoded or has a zero dimension
    #[error("invalid image: {0}")]
    InvalidImage(String),
}

/// Failure to build a vocabulary from its source file
#[derive(Debug, Error)]
pub enum VocabularyLoadError {
    /// The source file could not be read
    #[error("failed to read vocabulary {path:?}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The source was readable but held no usable names
    #[error("vocabulary {path:?} contains no entries")]
    Empty { path: PathBuf },
}
