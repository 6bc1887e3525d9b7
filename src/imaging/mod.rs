//! Image upload pipeline: type validation, data URLs, cropping and JPEG compression.

mod compress;
mod crop;

pub use compress::*;
pub use crop::*;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::DynamicImage;

/// Errors raised while preparing an uploaded image.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("unsupported file type {0:?}, please select an image")]
    UnsupportedType(String),
    #[error("invalid data URL: {0}")]
    InvalidDataUrl(String),
    #[error("could not decode image: {0}")]
    Decode(String),
    #[error("crop area is empty")]
    EmptyCrop,
    #[error("invalid aspect ratio {0:?}")]
    InvalidAspect(String),
    #[error("could not encode image: {0}")]
    Encode(String),
}

/// Reject anything whose MIME type is not `image/*`.
pub fn validate_mime(mime: &str) -> Result<(), ImageError> {
    let essence = mime.split(';').next().unwrap_or_default().trim();
    match essence.split_once('/') {
        Some((kind, subtype)) if kind.eq_ignore_ascii_case("image") && !subtype.is_empty() => {
            Ok(())
        }
        _ => Err(ImageError::UnsupportedType(mime.to_string())),
    }
}

/// Split a `data:<mime>;base64,<payload>` URL into its MIME type and bytes.
pub fn decode_data_url(url: &str) -> Result<(String, Vec<u8>), ImageError> {
    let rest = url
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| ImageError::InvalidDataUrl("missing data: prefix".to_string()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| ImageError::InvalidDataUrl("missing payload separator".to_string()))?;
    let mime = meta
        .strip_suffix(";base64")
        .ok_or_else(|| ImageError::InvalidDataUrl("only base64 payloads are supported".to_string()))?;

    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| ImageError::InvalidDataUrl(e.to_string()))?;

    Ok((mime.to_string(), bytes))
}

pub fn encode_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// How an upload should be cropped before compression.
#[derive(Debug, Clone, Copy, Default)]
pub enum CropMode {
    /// Keep the whole image.
    #[default]
    None,
    /// Largest centred rectangle of the given aspect ratio.
    Aspect(AspectRatio),
    /// Explicit pixel rectangle.
    Rect(CropRect),
}

pub fn decode(bytes: &[u8]) -> Result<DynamicImage, ImageError> {
    image::load_from_memory(bytes).map_err(|e| ImageError::Decode(e.to_string()))
}

/// Validate, decode, crop and compress an uploaded image.
pub fn prepare_upload(
    mime: &str,
    bytes: &[u8],
    mode: CropMode,
    budget: usize,
) -> Result<Compressed, ImageError> {
    validate_mime(mime)?;
    let source = decode(bytes)?;

    let rect = match mode {
        CropMode::None => None,
        CropMode::Aspect(aspect) => Some(centered_crop(source.width(), source.height(), aspect)),
        CropMode::Rect(rect) => Some(rect),
    };

    export_crop(&source, rect, budget)
}
