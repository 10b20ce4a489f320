//! CardLens - identify collectible cards from photos
//!
//! Prints identification results as JSON on stdout; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use card_lens::config::{self, AppConfig};
use card_lens::matching::FuzzyMatcher;
use card_lens::storage;
use card_lens::{IdentificationResult, Identifier, MatchResult, TesseractEngine, Vocabulary};

/// CardLens - collectible card identification
#[derive(Parser, Debug)]
#[command(name = "card-lens")]
#[command(about = "Identify collectible cards from photos by their printed title")]
struct Args {
    /// Configuration file (defaults to config.toml in the platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Vocabulary file, overriding the configured one
    #[arg(long, global = true)]
    vocabulary: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Identify the card in an image file
    Identify {
        /// Card photo
        image: PathBuf,

        /// Upload name used as a hint (defaults to the image's file name)
        #[arg(long)]
        filename: Option<String>,

        /// Keep a copy of the image in the storage directory
        #[arg(long)]
        store: bool,
    },
    /// Match free text against the vocabulary
    Match {
        /// Text to match
        text: String,
    },
}

#[derive(Serialize)]
struct IdentifyOutput {
    #[serde(flatten)]
    result: IdentificationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    stored_path: Option<PathBuf>,
}

#[derive(Serialize)]
struct MatchOutput {
    #[serde(flatten)]
    result: MatchResult,
    score: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG overrides the default level
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_or_create_config(args.config.as_deref())?;
    let vocabulary_path = args.vocabulary.clone().or_else(|| config.vocabulary.path.clone());
    let vocabulary = Arc::new(Vocabulary::load_or_seed(vocabulary_path.as_deref()));

    match args.command {
        Command::Identify {
            image,
            filename,
            store,
        } => run_identify(&config, vocabulary, &image, filename, store),
        Command::Match { text } => run_match(&config, vocabulary, &text),
    }
}

/// Load configuration from file or create default
///
/// An explicitly given path must exist and parse.
fn load_or_create_config(path: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = path {
        let config = config::load_config(path)?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }

    if let Ok(config_dir) = storage::get_config_dir() {
        let config_path = config_dir.join("config.toml");
        if config_path.exists() {
            if let Ok(config) = config::load_config(&config_path) {
                info!("Loaded configuration from {:?}", config_path);
                return Ok(config);
            }
        }
    }
    info!("Using default configuration");
    Ok(AppConfig::default())
}

fn run_identify(
    config: &AppConfig,
    vocabulary: Arc<Vocabulary>,
    image: &Path,
    filename: Option<String>,
    store: bool,
) -> Result<()> {
    let bytes = std::fs::read(image).with_context(|| format!("Failed to read image: {:?}", image))?;
    let hint = filename.or_else(|| {
        image
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
    });

    let engine = Arc::new(TesseractEngine::new(config.recognition.clone()));
    let identifier = Identifier::new(vocabulary, engine, config);
    let result = identifier.identify(&bytes, hint.as_deref())?;

    let stored_path = if store {
        let dir = match &config.storage.images_dir {
            Some(dir) => dir.clone(),
            None => storage::get_images_dir()?,
        };
        Some(storage::store_card_image(&dir, &bytes, hint.as_deref())?)
    } else {
        None
    };

    let output = IdentifyOutput {
        result,
        stored_path,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn run_match(config: &AppConfig, vocabulary: Arc<Vocabulary>, text: &str) -> Result<()> {
    let matcher = FuzzyMatcher::with_threshold(vocabulary, config.matching.threshold);
    let result = matcher.best_match(text);
    let result = if result.is_match() {
        result
    } else {
        matcher.best_match_loose(text)
    };

    let output = MatchOutput {
        result,
        score: matcher.score(text),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
