//! Vision Layer
//!
//! Decodes card photos and prepares the title band for text recognition.

pub mod enhance;
pub mod region;

pub use region::{title_band_bounds, RegionExtractor};

use image::{DynamicImage, GrayImage};

use crate::error::IdentifyError;

/// A decoded card photo
///
/// Owned exclusively by the request that decoded it.
#[derive(Debug, Clone)]
pub struct RawImage {
    image: DynamicImage,
}

impl RawImage {
    /// Decode an encoded raster image (PNG, JPEG, ...)
    pub fn decode(bytes: &[u8]) -> Result<Self, IdentifyError> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| IdentifyError::InvalidImage(format!("failed to decode image: {}", e)))?;
        Self::from_image(image)
    }

    /// Wrap an already decoded image, rejecting zero dimensions
    pub fn from_image(image: DynamicImage) -> Result<Self, IdentifyError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(IdentifyError::InvalidImage(format!(
                "image has zero dimension ({}x{})",
                image.width(),
                image.height()
            )));
        }
        Ok(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Get image dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    pub fn as_image(&self) -> &DynamicImage {
        &self.image
    }
}

/// Binarized strip of a card expected to hold the printed title
///
/// Black text on white, ready to hand to the recognition engine.
#[derive(Debug, Clone)]
pub struct TitleBand {
    image: DynamicImage,
    /// Band position (y, height) in the possibly upscaled source
    pub rows: (u32, u32),
}

impl TitleBand {
    pub(crate) fn new(band: GrayImage, rows: (u32, u32)) -> Self {
        Self {
            image: DynamicImage::ImageLuma8(band),
            rows,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_image(&self) -> &DynamicImage {
        &self.image
    }
}
