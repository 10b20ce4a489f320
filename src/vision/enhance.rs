//! Grayscale enhancement filters for title recognition
//!
//! Printed card titles sit on foil, gradients and artwork, so a global
//! threshold loses strokes. These filters work on local neighborhoods.

use image::{GrayImage, Luma};
use imageproc::definitions::Image;
use imageproc::distance_transform::Norm;
use imageproc::integral_image::{integral_image, sum_image_pixels};
use tracing::debug;

use crate::config::ExtractionSettings;

/// Run the full enhancement chain on a grayscale band
///
/// Local equalization, median smoothing, adaptive threshold, then a small
/// closing on the dark strokes.
pub fn enhance_for_recognition(gray: &GrayImage, settings: &ExtractionSettings) -> GrayImage {
    debug!(
        "Enhancing {}x{} band: tiles={}, clip={}, median={}, block_radius={}, offset={}, closing={}",
        gray.width(),
        gray.height(),
        settings.clahe_tiles,
        settings.clahe_clip_limit,
        settings.median_radius,
        settings.threshold_block_radius,
        settings.threshold_offset,
        settings.closing_radius
    );

    let equalized = equalize_tiles(gray, settings.clahe_tiles, settings.clahe_clip_limit);

    let smoothed = if settings.median_radius > 0 {
        imageproc::filter::median_filter(&equalized, settings.median_radius, settings.median_radius)
    } else {
        equalized
    };

    let binary = adaptive_threshold(
        &smoothed,
        settings.threshold_block_radius,
        settings.threshold_offset,
    );

    close_dark_strokes(&binary, settings.closing_radius)
}

/// Contrast-limited histogram equalization over a grid of tiles
///
/// Each tile gets its own clipped histogram mapping; pixels blend the
/// mappings of the four nearest tile centers.
pub fn equalize_tiles(image: &GrayImage, tiles: u32, clip_limit: f32) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    let tile_w = width.div_ceil(tiles.clamp(1, width));
    let tile_h = height.div_ceil(tiles.clamp(1, height));
    let tiles_x = width.div_ceil(tile_w);
    let tiles_y = height.div_ceil(tile_h);

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);
            luts.push(tile_mapping(image, (x0, y0, x1, y1), clip_limit));
        }
    }

    let lut = |tx: u32, ty: u32| &luts[(ty * tiles_x + tx) as usize];

    GrayImage::from_fn(width, height, |x, y| {
        let value = image.get_pixel(x, y).0[0] as usize;

        let fx = ((x as f32 + 0.5) / tile_w as f32 - 0.5).max(0.0);
        let fy = ((y as f32 + 0.5) / tile_h as f32 - 0.5).max(0.0);
        let gx0 = (fx.floor() as u32).min(tiles_x - 1);
        let gy0 = (fy.floor() as u32).min(tiles_y - 1);
        let gx1 = (gx0 + 1).min(tiles_x - 1);
        let gy1 = (gy0 + 1).min(tiles_y - 1);
        let ax = (fx - gx0 as f32).clamp(0.0, 1.0);
        let ay = (fy - gy0 as f32).clamp(0.0, 1.0);

        let top = lut(gx0, gy0)[value] as f32 * (1.0 - ax) + lut(gx1, gy0)[value] as f32 * ax;
        let bottom = lut(gx0, gy1)[value] as f32 * (1.0 - ax) + lut(gx1, gy1)[value] as f32 * ax;
        let mapped = top * (1.0 - ay) + bottom * ay;

        Luma([mapped.round().clamp(0.0, 255.0) as u8])
    })
}

/// Clipped-histogram intensity mapping for one tile (x0, y0, x1, y1)
fn tile_mapping(image: &GrayImage, bounds: (u32, u32, u32, u32), clip_limit: f32) -> [u8; 256] {
    let (x0, y0, x1, y1) = bounds;
    let mut histogram = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            histogram[image.get_pixel(x, y).0[0] as usize] += 1;
        }
    }

    let pixels = (x1 - x0) * (y1 - y0);
    let clip = ((clip_limit.max(1.0) * pixels as f32 / 256.0) as u32).max(1);

    let mut excess = 0u32;
    for count in histogram.iter_mut() {
        if *count > clip {
            excess += *count - clip;
            *count = clip;
        }
    }

    // Spread the clipped mass evenly, remainder to the lowest bins
    let share = excess / 256;
    let remainder = (excess % 256) as usize;
    for (i, count) in histogram.iter_mut().enumerate() {
        *count += share + u32::from(i < remainder);
    }

    let mut mapping = [0u8; 256];
    let mut cumulative = 0u64;
    for (i, count) in histogram.iter().enumerate() {
        cumulative += *count as u64;
        mapping[i] = ((cumulative * 255) / pixels as u64).min(255) as u8;
    }
    mapping
}

/// Binarize against the mean of a (2r + 1)² neighborhood minus `offset`
///
/// Pixels brighter than the local threshold become white (255), the rest
/// black (0). Neighborhoods are clipped at the image border.
pub fn adaptive_threshold(image: &GrayImage, block_radius: u32, offset: i32) -> GrayImage {
    let (width, height) = image.dimensions();
    let integral: Image<Luma<u64>> = integral_image::<_, u64>(image);

    GrayImage::from_fn(width, height, |x, y| {
        let left = x.saturating_sub(block_radius);
        let top = y.saturating_sub(block_radius);
        let right = x.saturating_add(block_radius).min(width - 1);
        let bottom = y.saturating_add(block_radius).min(height - 1);

        let sum = sum_image_pixels(&integral, left, top, right, bottom)[0];
        let count = ((right - left + 1) * (bottom - top + 1)) as f32;
        let threshold = sum as f32 / count - offset as f32;

        if image.get_pixel(x, y).0[0] as f32 > threshold {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Morphological closing of the dark (text) pixels
///
/// Bridges gaps up to `radius` pixels inside broken strokes.
pub fn close_dark_strokes(binary: &GrayImage, radius: u8) -> GrayImage {
    if radius == 0 {
        return binary.clone();
    }

    let mut strokes = binary.clone();
    image::imageops::invert(&mut strokes);
    let mut closed = imageproc::morphology::close(&strokes, Norm::LInf, radius);
    image::imageops::invert(&mut closed);
    closed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equalize_preserves_dimensions() {
        let image = GrayImage::from_fn(37, 11, |x, y| Luma([((x * 7 + y * 3) % 256) as u8]));
        let equalized = equalize_tiles(&image, 8, 3.0);
        assert_eq!(equalized.dimensions(), (37, 11));
    }

    #[test]
    fn test_equalize_stretches_low_contrast() {
        // Values squeezed into 100..=110
        let image = GrayImage::from_fn(64, 64, |x, _| Luma([100 + (x % 11) as u8]));
        let equalized = equalize_tiles(&image, 4, 40.0);

        let min = equalized.pixels().map(|p| p.0[0]).min().unwrap();
        let max = equalized.pixels().map(|p| p.0[0]).max().unwrap();
        assert!(max - min > 100, "range {}..{} not stretched", min, max);
    }

    #[test]
    fn test_equalize_tiny_image() {
        let image = GrayImage::from_pixel(1, 1, Luma([42]));
        let equalized = equalize_tiles(&image, 8, 3.0);
        assert_eq!(equalized.dimensions(), (1, 1));
    }

    #[test]
    fn test_adaptive_threshold_uniform_is_white() {
        let image = GrayImage::from_pixel(20, 20, Luma([90]));
        let binary = adaptive_threshold(&image, 5, 5);
        assert!(binary.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn test_adaptive_threshold_dark_stroke() {
        // Dark vertical stroke on a light background
        let image = GrayImage::from_fn(30, 10, |x, _| {
            if (14..16).contains(&x) { Luma([30]) } else { Luma([220]) }
        });
        let binary = adaptive_threshold(&image, 4, 5);

        assert_eq!(binary.get_pixel(14, 5).0[0], 0);
        assert_eq!(binary.get_pixel(15, 5).0[0], 0);
        assert_eq!(binary.get_pixel(2, 5).0[0], 255);
        assert_eq!(binary.get_pixel(27, 5).0[0], 255);
    }

    #[test]
    fn test_adaptive_threshold_window_clipped_at_border() {
        // Corner pixel sees only its 2x2 neighborhood: mean 105, threshold 100
        let image = GrayImage::from_fn(8, 8, |x, y| {
            Luma([if (x, y) == (0, 0) { 102 } else if x < 2 && y < 2 { 106 } else { 250 }])
        });
        let binary = adaptive_threshold(&image, 1, 5);
        assert_eq!(binary.get_pixel(0, 0).0[0], 255);

        let strict = adaptive_threshold(&image, 1, 0);
        assert_eq!(strict.get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn test_adaptive_threshold_is_binary() {
        let image = GrayImage::from_fn(25, 25, |x, y| Luma([((x * 13 + y * 29) % 256) as u8]));
        let binary = adaptive_threshold(&image, 3, 2);
        assert!(binary.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }

    #[test]
    fn test_close_bridges_gap() {
        // Horizontal dark stroke with a one pixel hole at x = 10
        let image = GrayImage::from_fn(21, 9, |x, y| {
            if y == 4 && x != 10 && (3..18).contains(&x) { Luma([0]) } else { Luma([255]) }
        });
        let closed = close_dark_strokes(&image, 1);

        assert_eq!(closed.get_pixel(10, 4).0[0], 0);
        assert_eq!(closed.get_pixel(10, 0).0[0], 255);
    }

    #[test]
    fn test_close_disabled() {
        let image = GrayImage::from_fn(5, 5, |x, _| Luma([if x == 2 { 0 } else { 255 }]));
        assert_eq!(close_dark_strokes(&image, 0), image);
    }

    #[test]
    fn test_enhance_output_is_binary() {
        let image = GrayImage::from_fn(120, 40, |x, y| {
            Luma([(60 + (x % 40) * 3 + (y % 7) * 5) as u8])
        });
        let settings = ExtractionSettings::default();
        let enhanced = enhance_for_recognition(&image, &settings);

        assert_eq!(enhanced.dimensions(), (120, 40));
        assert!(enhanced.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }
}
