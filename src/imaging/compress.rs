//! JPEG export with a quality back-off loop.
//!
//! Quality is tracked as an integer percentage so the 0.1 steps never drift.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;

use super::{crop, CropRect, ImageError};

/// Longest edge allowed after compression.
pub const MAX_DIMENSION: u32 = 800;
/// Exports above this size go through the compression loop.
pub const LARGE_IMAGE_BYTES: usize = 1024 * 1024;
/// Quality of the first export straight out of the crop UI.
pub const EXPORT_QUALITY: u8 = 95;
pub const START_QUALITY: u8 = 90;
pub const QUALITY_STEP: u8 = 10;
pub const QUALITY_FLOOR: u8 = 10;

/// Result of an export.
#[derive(Debug, Clone)]
pub struct Compressed {
    pub bytes: Vec<u8>,
    /// JPEG quality in percent.
    pub quality: u8,
    pub width: u32,
    pub height: u32,
    /// False when even the quality floor did not fit the budget.
    pub within_budget: bool,
}

impl Compressed {
    /// Quality on the 0.0..=1.0 scale.
    pub fn quality_fraction(&self) -> f32 {
        f32::from(self.quality) / 100.0
    }
}

pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(|e| ImageError::Encode(e.to_string()))?;
    Ok(out)
}

/// Scale the image down to fit a `max` x `max` box. Smaller images are left alone.
pub fn fit_within(img: &DynamicImage, max: u32) -> DynamicImage {
    if img.width() <= max && img.height() <= max {
        return img.clone();
    }
    img.resize(max, max, FilterType::Triangle)
}

/// Re-encode at decreasing quality until the output fits `budget` bytes.
///
/// At the quality floor the floor encoding is returned even if it is over budget.
pub fn compress(img: &DynamicImage, budget: usize) -> Result<Compressed, ImageError> {
    let resized = fit_within(img, MAX_DIMENSION);
    let mut quality = START_QUALITY;

    loop {
        let bytes = encode_jpeg(&resized, quality)?;
        let fits = bytes.len() <= budget;

        if fits || quality <= QUALITY_FLOOR {
            if !fits {
                tracing::warn!(
                    "Image still {} bytes at quality floor (budget {})",
                    bytes.len(),
                    budget
                );
            }
            return Ok(Compressed {
                bytes,
                quality,
                width: resized.width(),
                height: resized.height(),
                within_budget: fits,
            });
        }

        tracing::debug!("{} bytes at quality {}, stepping down", bytes.len(), quality);
        quality = quality.saturating_sub(QUALITY_STEP).max(QUALITY_FLOOR);
    }
}

/// Export the cropped area as JPEG, compressing when the export is too large.
pub fn export_crop(
    source: &DynamicImage,
    rect: Option<CropRect>,
    budget: usize,
) -> Result<Compressed, ImageError> {
    let cropped = match rect {
        Some(rect) => crop(source, rect)?,
        None => source.clone(),
    };

    let bytes = encode_jpeg(&cropped, EXPORT_QUALITY)?;
    if bytes.len() <= LARGE_IMAGE_BYTES && bytes.len() <= budget {
        return Ok(Compressed {
            bytes,
            quality: EXPORT_QUALITY,
            width: cropped.width(),
            height: cropped.height(),
            within_budget: true,
        });
    }

    tracing::info!(
        "Cropped export is {} bytes, compressing to fit {} bytes",
        bytes.len(),
        budget
    );
    compress(&cropped, budget)
}
