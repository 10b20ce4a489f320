//! Application Configuration
//!
//! Pipeline settings stored in TOML format. Every section has defaults, so
//! a config file only needs the values it overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::matching::DEFAULT_MATCH_THRESHOLD;

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Vocabulary source
    pub vocabulary: VocabularySettings,
    /// Recognition engine invocation
    pub recognition: RecognitionSettings,
    /// Title band extraction and enhancement
    pub extraction: ExtractionSettings,
    /// Fuzzy matching
    pub matching: MatchingSettings,
    /// Card image storage
    pub storage: StorageSettings,
}

/// Where the canonical names come from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VocabularySettings {
    /// Newline-delimited name list; the built-in seed list is used when unset
    pub path: Option<PathBuf>,
}

/// Settings for the external recognition engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionSettings {
    /// Engine executable (looked up on PATH when relative)
    pub binary: PathBuf,
    /// Directory holding the engine's language data
    pub tessdata_dir: Option<PathBuf>,
    /// Languages in order of preference
    pub languages: Vec<String>,
    /// Per-attempt timeout in milliseconds
    pub timeout_ms: u64,
    /// Resolution hint passed to the engine
    pub dpi: u32,
    /// Directory for images handed to the engine (system temp dir when unset)
    pub temp_dir: Option<PathBuf>,
}

impl RecognitionSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("tesseract"),
            tessdata_dir: None,
            languages: vec!["eng".to_string(), "por".to_string()],
            timeout_ms: 15_000,
            dpi: 300,
            temp_dir: None,
        }
    }
}

/// Title band geometry and enhancement parameters
///
/// The band offset and height ratios were picked empirically and have not
/// been calibrated against a labeled image set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    /// Images narrower than this are upscaled to it (never downscaled)
    pub min_width: u32,
    /// Band start as a fraction of image height
    pub band_offset_ratio: f32,
    /// Band height as a fraction of image height
    pub band_height_ratio: f32,
    /// Minimum band height in pixels
    pub min_band_height: u32,
    /// Tiles per axis for local histogram equalization
    pub clahe_tiles: u32,
    /// Histogram clip limit, relative to a uniform distribution
    pub clahe_clip_limit: f32,
    /// Median smoothing radius (0 disables smoothing)
    pub median_radius: u32,
    /// Adaptive threshold neighborhood radius (block size = 2r + 1)
    pub threshold_block_radius: u32,
    /// Amount subtracted from the local mean before thresholding
    pub threshold_offset: i32,
    /// Closing radius applied to dark strokes (0 disables closing)
    pub closing_radius: u8,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            min_width: 900,
            band_offset_ratio: 0.03,
            band_height_ratio: 0.13,
            min_band_height: 40,
            clahe_tiles: 8,
            clahe_clip_limit: 3.0,
            median_radius: 1,
            threshold_block_radius: 15,
            threshold_offset: 5,
            closing_radius: 1,
        }
    }
}

/// Fuzzy matching settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingSettings {
    /// Minimum similarity (0.0 - 1.0) to accept a canonical name
    pub threshold: f64,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

/// Card image storage settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Where identified card photos are kept (data dir when unset)
    pub images_dir: Option<PathBuf>,
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    let config: AppConfig =
        toml::from_str(&content).with_context(|| format!("Failed to parse config {:?}", path))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
