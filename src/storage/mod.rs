//! Storage Layer
//!
//! Platform directories and on-disk copies of uploaded card images.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

/// Extension used when the upload name has none
const DEFAULT_IMAGE_EXTENSION: &str = ".png";

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "cardlens", "CardLens")
        .ok_or_else(|| anyhow::anyhow!("Could not determine project directories"))
}

/// Get the application data directory
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = project_dirs()?.data_dir().to_path_buf();
    std::fs::create_dir_all(&data_dir)?;

    Ok(data_dir)
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = project_dirs()?.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}

/// Default directory for stored card images
pub fn get_images_dir() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("images"))
}

/// Keep a copy of an uploaded card image
///
/// The file is named `card_<millis>_<id><ext>`, where the extension comes
/// from `original_name` (default `.png`). `dir` is created if missing.
pub fn store_card_image(dir: &Path, bytes: &[u8], original_name: Option<&str>) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create image directory: {:?}", dir))?;

    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let id = uuid::Uuid::new_v4().simple().to_string();
    let file_name = format!(
        "card_{}_{}{}",
        millis,
        &id[..8],
        image_extension(original_name)
    );

    let path = dir.join(file_name);
    std::fs::write(&path, bytes)
        .with_context(|| format!("Failed to write card image: {:?}", path))?;

    info!("Stored card image ({} bytes) at {:?}", bytes.len(), path);
    Ok(path)
}

/// Lower-cased extension (with dot) of an upload name, or the default
fn image_extension(original_name: Option<&str>) -> String {
    original_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_else(|| DEFAULT_IMAGE_EXTENSION.to_string())
}
