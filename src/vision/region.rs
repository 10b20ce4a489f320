//! Title band extraction
//!
//! Locates the horizontal strip near the top of a card where the name is
//! printed, then enhances and binarizes it for recognition.

use image::imageops::{self, FilterType};
use image::GrayImage;
use tracing::{debug, warn};

use super::enhance::enhance_for_recognition;
use super::{RawImage, TitleBand};
use crate::config::ExtractionSettings;
use crate::error::IdentifyError;

/// Tallest band produced by upscaling a narrow image
const MAX_UPSCALED_BAND_HEIGHT: u32 = 4096;

/// Crops and enhances the title band of a card photo
#[derive(Debug, Clone, Default)]
pub struct RegionExtractor {
    settings: ExtractionSettings,
}

impl RegionExtractor {
    pub fn new(settings: ExtractionSettings) -> Self {
        Self { settings }
    }

    /// Extract the binarized title band
    ///
    /// Band geometry is computed in the upscaled frame (at least
    /// `min_width` wide), but only the band strip is ever resized.
    pub fn extract(&self, image: &RawImage) -> Result<TitleBand, IdentifyError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(IdentifyError::InvalidImage(format!(
                "cannot extract title band from {}x{} image",
                width, height
            )));
        }

        let scale = upscale_factor(width, self.settings.min_width);
        let (work_w, work_h) = scaled_dimensions(width, height, scale)?;

        let (y, band_h) = title_band_bounds(work_h, &self.settings);
        if scale > 1.0 && band_h > MAX_UPSCALED_BAND_HEIGHT {
            warn!(
                "Refusing to upscale {}x{} image: band would be {}x{}",
                width, height, work_w, band_h
            );
            return Err(IdentifyError::InvalidImage(format!(
                "{}x{} image is too narrow for its height",
                width, height
            )));
        }

        let (src_y, src_h) = source_rows(y, band_h, scale, height);
        debug!(
            "Title band rows {}..{} of {}x{} (source rows {}..{} of {}x{})",
            y,
            y + band_h,
            work_w,
            work_h,
            src_y,
            src_y + src_h,
            width,
            height
        );

        let gray = image.as_image().crop_imm(0, src_y, width, src_h).to_luma8();
        let gray = resize_strip(gray, work_w, band_h);
        let band = enhance_for_recognition(&gray, &self.settings);

        Ok(TitleBand::new(band, (y, band_h)))
    }
}

/// Factor that brings `width` up to `min_width`; never below 1
fn upscale_factor(width: u32, min_width: u32) -> f64 {
    if width >= min_width {
        1.0
    } else {
        min_width as f64 / width as f64
    }
}

/// Dimensions of the image after scaling by `scale`
fn scaled_dimensions(width: u32, height: u32, scale: f64) -> Result<(u32, u32), IdentifyError> {
    if scale <= 1.0 {
        return Ok((width, height));
    }

    let scaled_w = (width as f64 * scale).round();
    let scaled_h = (height as f64 * scale).round();
    if scaled_w > u32::MAX as f64 || scaled_h > u32::MAX as f64 {
        return Err(IdentifyError::InvalidImage(format!(
            "{}x{} image is too large to scale",
            width, height
        )));
    }
    Ok(((scaled_w as u32).max(1), (scaled_h as u32).max(1)))
}

/// Map band rows in the scaled frame back to source rows (y, height)
fn source_rows(y: u32, band_h: u32, scale: f64, height: u32) -> (u32, u32) {
    if scale <= 1.0 {
        return (y, band_h);
    }

    let start = ((y as f64 / scale).floor() as u32).min(height - 1);
    let end = (((y + band_h) as f64 / scale).ceil() as u32).clamp(start + 1, height);
    (start, end - start)
}

/// Resize a cropped strip to the band size when they differ
fn resize_strip(strip: GrayImage, width: u32, height: u32) -> GrayImage {
    if strip.dimensions() == (width, height) {
        return strip;
    }
    imageops::resize(&strip, width, height, FilterType::Triangle)
}

/// Title band rows as (y, height) for an image `height` pixels tall
///
/// The band starts at `band_offset_ratio` of the height and spans
/// `band_height_ratio` of it, at least `min_band_height` rows, shrunk to
/// fit the image. A degenerate band falls back to the top third.
pub fn title_band_bounds(height: u32, settings: &ExtractionSettings) -> (u32, u32) {
    let y = (height as f32 * settings.band_offset_ratio).round() as u32;
    let mut band_h = ((height as f32 * settings.band_height_ratio).round() as u32)
        .max(settings.min_band_height);

    if y.saturating_add(band_h) > height {
        band_h = height.saturating_sub(y);
    }

    if band_h == 0 {
        return (0, (height / 3).max(1).min(height));
    }

    (y, band_h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Luma, Rgb, RgbImage};

    #[test]
    fn test_band_bounds_typical_card() {
        let settings = ExtractionSettings::default();
        // 900 x 1257 after scaling a standard card photo
        let (y, h) = title_band_bounds(1257, &settings);
        assert_eq!(y, 38);
        assert_eq!(h, 163);
    }

    #[test]
    fn test_band_bounds_min_height() {
        let settings = ExtractionSettings::default();
        let (y, h) = title_band_bounds(200, &settings);
        assert_eq!(y, 6);
        assert_eq!(h, 40);
    }

    #[test]
    fn test_band_bounds_shrinks_to_fit() {
        let settings = ExtractionSettings::default();
        let (y, h) = title_band_bounds(30, &settings);
        assert_eq!(y, 1);
        assert_eq!(h, 29);
    }

    #[test]
    fn test_band_bounds_degenerate_uses_top_third() {
        let settings = ExtractionSettings {
            band_offset_ratio: 1.0,
            ..Default::default()
        };
        assert_eq!(title_band_bounds(90, &settings), (0, 30));
        assert_eq!(title_band_bounds(1, &settings), (0, 1));
    }

    #[test]
    fn test_upscale_factor_and_dimensions() {
        assert_eq!(upscale_factor(300, 900), 3.0);
        assert_eq!(upscale_factor(1800, 900), 1.0);
        assert_eq!(scaled_dimensions(300, 420, 3.0).unwrap(), (900, 1260));
        assert_eq!(scaled_dimensions(1800, 2520, 1.0).unwrap(), (1800, 2520));
        assert!(scaled_dimensions(1, u32::MAX, 900.0).is_err());
    }

    #[test]
    fn test_source_rows_cover_band() {
        // 450x630 source, band (38, 164) in the 900x1260 frame
        assert_eq!(source_rows(38, 164, 2.0, 630), (19, 82));
        assert_eq!(source_rows(38, 163, 1.0, 1257), (38, 163));
        // Rounding never runs past the source
        let (y, h) = source_rows(1, 29, 3.0, 10);
        assert!(y + h <= 10 && h >= 1);
    }

    #[test]
    fn test_extract_rejects_extreme_aspect() {
        let sliver = DynamicImage::ImageLuma8(GrayImage::new(1, 10_000));
        let raw = RawImage::from_image(sliver).unwrap();

        let result = RegionExtractor::default().extract(&raw);
        assert!(matches!(result, Err(IdentifyError::InvalidImage(_))));
    }

    #[test]
    fn test_extract_tall_wide_image_not_resized() {
        let card = GrayImage::from_pixel(1000, 3000, Luma([200]));
        let raw = RawImage::from_image(DynamicImage::ImageLuma8(card)).unwrap();

        let band = RegionExtractor::default().extract(&raw).unwrap();
        assert_eq!(band.rows, (90, 390));
        assert_eq!((band.width(), band.height()), (1000, 390));
    }

    #[test]
    fn test_extract_band_dimensions() {
        let card = RgbImage::from_fn(450, 630, |x, y| {
            if y < 80 && (100..300).contains(&x) && x % 12 < 3 {
                Rgb([20, 20, 20])
            } else {
                Rgb([235, 220, 160])
            }
        });
        let raw = RawImage::from_image(DynamicImage::ImageRgb8(card)).unwrap();

        let band = RegionExtractor::default().extract(&raw).unwrap();
        // Upscaled to 900x1260 before cropping
        assert_eq!(band.width(), 900);
        assert_eq!(band.rows, (38, 164));
        assert_eq!(band.height(), 164);
        assert!(band.as_image().as_luma8().is_some());
    }

    #[test]
    fn test_extract_is_binarized() {
        let card = GrayImage::from_fn(1000, 300, |x, y| Luma([((x / 5 + y) % 200) as u8 + 30]));
        let raw = RawImage::from_image(DynamicImage::ImageLuma8(card)).unwrap();

        let band = RegionExtractor::default().extract(&raw).unwrap();
        let gray = band.as_image().as_luma8().unwrap();
        assert_eq!(band.width(), 1000);
        assert!(gray.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }
}
