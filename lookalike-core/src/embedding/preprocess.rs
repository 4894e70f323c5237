//! Fixed image preprocessing shared by index building and querying.
//!
//! The steps mirror the evaluation transform the backbone was trained with: shortest side resized
//! to [`RESIZE_SHORTEST_SIDE`], a centered [`CROP_SIZE`] square crop, intensities scaled to [0, 1]
//! and normalized per channel with [`CHANNEL_MEAN`] and [`CHANNEL_STD`]. Changing any constant here
//! changes the embedding space and invalidates every existing catalog index.

use image::{imageops::FilterType, DynamicImage, RgbImage};
use ndarray::Array4;

pub const RESIZE_SHORTEST_SIDE: u32 = 256;
pub const CROP_SIZE: u32 = 224;
pub const CHANNEL_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const CHANNEL_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Largest side the intermediate resized image may have. Beyond it the crop window is cut from
/// the source first, so extreme aspect ratios never allocate a huge intermediate image.
pub const MAX_RESIZED_SIDE: u64 = 4096;

#[derive(thiserror::Error, Debug)]
pub enum PreprocessError {
    #[error("Image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
}

/// Converts `image` into the (1, 3, CROP_SIZE, CROP_SIZE) NCHW input tensor.
pub fn preprocess(image: &DynamicImage) -> Result<Array4<f32>, PreprocessError> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(PreprocessError::EmptyImage { width, height });
    }

    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let cropped = match fitted_dimensions(width, height) {
        Some((resized_width, resized_height)) => resize_then_crop(rgb, resized_width, resized_height),
        None => crop_then_resize(&rgb),
    };

    let side = CROP_SIZE as usize;
    let mut input = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, pixel) in cropped.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for channel in 0..3 {
            let scaled = pixel.0[channel] as f32 / 255.;
            input[[0, channel, y, x]] = (scaled - CHANNEL_MEAN[channel]) / CHANNEL_STD[channel];
        }
    }

    Ok(input)
}

/// Dimensions after scaling the shortest side to [`RESIZE_SHORTEST_SIDE`] while keeping the
/// aspect ratio. The long side is truncated, not rounded.
pub fn resized_dimensions(width: u32, height: u32) -> (u64, u64) {
    let target = RESIZE_SHORTEST_SIDE as u64;
    let (width, height) = (width.max(1) as u64, height.max(1) as u64);
    if width <= height {
        (target, target * height / width)
    } else {
        (target * width / height, target)
    }
}

/// Top-left corner of the centered crop. Half-pixel offsets round to even.
pub fn center_crop_offsets(width: u64, height: u64) -> (u64, u64) {
    (crop_offset(width), crop_offset(height))
}

// Private functions

fn crop_offset(length: u64) -> u64 {
    let excess = length.saturating_sub(CROP_SIZE as u64);
    let half = excess / 2;
    if excess % 2 == 1 && half % 2 == 1 {
        half + 1
    } else {
        half
    }
}

/// Resized dimensions when both sides fit [`MAX_RESIZED_SIDE`].
fn fitted_dimensions(width: u32, height: u32) -> Option<(u32, u32)> {
    let (resized_width, resized_height) = resized_dimensions(width, height);
    if resized_width.max(resized_height) > MAX_RESIZED_SIDE {
        return None;
    }
    Some((u32::try_from(resized_width).ok()?, u32::try_from(resized_height).ok()?))
}

fn resize_then_crop(rgb: DynamicImage, resized_width: u32, resized_height: u32) -> RgbImage {
    let resized = if (resized_width, resized_height) == (rgb.width(), rgb.height()) {
        rgb
    } else {
        rgb.resize_exact(resized_width, resized_height, FilterType::Triangle)
    };

    let (left, top) = center_crop_offsets(resized_width as u64, resized_height as u64);
    // Offsets are bounded by the fitted dimensions
    let (left, top) = (left as u32, top as u32);
    resized.crop_imm(left, top, CROP_SIZE, CROP_SIZE).to_rgb8()
}

/// Maps the centered crop window back onto the source image and resizes only that window.
fn crop_then_resize(rgb: &DynamicImage) -> RgbImage {
    let (width, height) = (rgb.width(), rgb.height());
    let (resized_width, resized_height) = resized_dimensions(width, height);
    let (left, top) = center_crop_offsets(resized_width, resized_height);

    let source_window = |offset: u64, resized: u64, source: u32| -> (u32, u32) {
        let scale = source as f64 / resized as f64;
        let start = ((offset as f64 * scale).floor() as u32).min(source - 1);
        let length = ((CROP_SIZE as f64 * scale).round() as u32).clamp(1, source - start);
        (start, length)
    };
    let (x, crop_width) = source_window(left, resized_width, width);
    let (y, crop_height) = source_window(top, resized_height, height);

    rgb.crop_imm(x, y, crop_width, crop_height)
        .resize_exact(CROP_SIZE, CROP_SIZE, FilterType::Triangle)
        .to_rgb8()
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    #[test]
    fn test_resized_dimensions_keep_aspect() {
        assert_eq!(resized_dimensions(500, 300), (426, 256));
        assert_eq!(resized_dimensions(300, 500), (256, 426));
        assert_eq!(resized_dimensions(100, 100), (256, 256));
        assert_eq!(resized_dimensions(256, 1000), (256, 1000));
        // no truncation for extreme aspect ratios
        assert_eq!(resized_dimensions(1, 20_000_000), (256, 5_120_000_000));
    }

    #[test]
    fn test_extreme_aspect_ratio_crops_before_resizing() {
        assert_eq!(fitted_dimensions(640, 480), Some((341, 256)));
        assert_eq!(fitted_dimensions(1, 60_000), None);

        let sliver = DynamicImage::ImageRgb8(RgbImage::from_pixel(1, 60_000, Rgb([255, 0, 0])));
        let input = preprocess(&sliver).unwrap();
        assert_eq!(input.shape(), &[1, 3, 224, 224]);

        let red = (1.0 - CHANNEL_MEAN[0]) / CHANNEL_STD[0];
        let blue = (0.0 - CHANNEL_MEAN[2]) / CHANNEL_STD[2];
        assert!(input.slice(ndarray::s![0, 0, .., ..]).iter().all(|v| (v - red).abs() < 1e-4));
        assert!(input.slice(ndarray::s![0, 2, .., ..]).iter().all(|v| (v - blue).abs() < 1e-4));
    }

    #[test]
    fn test_crop_offsets_round_half_to_even() {
        assert_eq!(crop_offset(224), 0);
        assert_eq!(crop_offset(256), 16);
        // 33 / 2 = 16.5 -> 16
        assert_eq!(crop_offset(257), 16);
        // 35 / 2 = 17.5 -> 18
        assert_eq!(crop_offset(259), 18);
        assert_eq!(center_crop_offsets(426, 256), (101, 16));
    }

    #[test]
    fn test_output_shape_and_normalization() {
        let white = DynamicImage::ImageRgb8(RgbImage::from_pixel(300, 200, Rgb([255, 255, 255])));
        let input = preprocess(&white).unwrap();
        assert_eq!(input.shape(), &[1, 3, 224, 224]);

        for channel in 0..3 {
            let expected = (1.0 - CHANNEL_MEAN[channel]) / CHANNEL_STD[channel];
            let plane = input.slice(ndarray::s![0, channel, .., ..]);
            assert!(plane.iter().all(|v| (v - expected).abs() < 1e-4));
        }
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 10));
        assert!(matches!(preprocess(&empty), Err(PreprocessError::EmptyImage { width: 0, height: 10 })));
    }
}
