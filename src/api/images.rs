//! Image upload endpoint.

use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, QueryRejection},
        Query,
    },
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use super::ApiResponse;
use crate::errors::AppError;
use crate::imaging::{
    decode_data_url, encode_data_url, prepare_upload, Compressed, CropMode, CropRect,
    LARGE_IMAGE_BYTES,
};

const QUALITY_HEADER: HeaderName = HeaderName::from_static("x-image-quality");
const WIDTH_HEADER: HeaderName = HeaderName::from_static("x-image-width");
const HEIGHT_HEADER: HeaderName = HeaderName::from_static("x-image-height");
const BUDGET_HEADER: HeaderName = HeaderName::from_static("x-image-within-budget");

/// How the compressed image is returned.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputFormat {
    /// Raw `image/jpeg` body.
    #[default]
    Binary,
    /// JSON envelope carrying a data URL.
    DataUrl,
}

/// Query parameters for `POST /api/images/compress`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressParams {
    /// Byte budget for the output (default: 1 MiB).
    pub max_bytes: Option<usize>,
    pub x: Option<u32>,
    pub y: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Aspect ratio for a centred crop, e.g. `1` or `16:9`.
    pub aspect: Option<String>,
    #[serde(default)]
    pub format: OutputFormat,
}

impl CompressParams {
    pub fn crop_mode(&self) -> Result<CropMode, AppError> {
        match (self.x, self.y, self.width, self.height) {
            (None, None, None, None) => match &self.aspect {
                Some(aspect) => Ok(CropMode::Aspect(aspect.parse()?)),
                None => Ok(CropMode::None),
            },
            (Some(x), Some(y), Some(width), Some(height)) => Ok(CropMode::Rect(CropRect {
                x,
                y,
                width,
                height,
            })),
            _ => Err(AppError::BadRequest(
                "Crop requires x, y, width and height".to_string(),
            )),
        }
    }
}

/// JSON payload for `format=dataUrl`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressedImage {
    pub data_url: String,
    pub quality: f32,
    pub width: u32,
    pub height: u32,
    pub size: usize,
    pub within_budget: bool,
}

impl From<Compressed> for CompressedImage {
    fn from(c: Compressed) -> Self {
        Self {
            data_url: encode_data_url("image/jpeg", &c.bytes),
            quality: c.quality_fraction(),
            width: c.width,
            height: c.height,
            size: c.bytes.len(),
            within_budget: c.within_budget,
        }
    }
}

/// POST /api/images/compress - Crop and compress an uploaded image to JPEG.
///
/// The body is either raw image bytes with an `image/*` content type, or a
/// `text/plain` data URL.
pub async fn compress_image(
    params: Result<Query<CompressParams>, QueryRejection>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, AppError> {
    let Query(params) = params.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge("Image too large".to_string())
        } else {
            AppError::BadRequest(rejection.body_text())
        }
    })?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let (mime, bytes) = if content_type.starts_with("text/plain") {
        let text = std::str::from_utf8(&body)
            .map_err(|_| AppError::BadRequest("Data URL must be UTF-8".to_string()))?;
        decode_data_url(text)?
    } else {
        (content_type.to_string(), body.to_vec())
    };

    if bytes.is_empty() {
        return Err(AppError::BadRequest("Empty image body".to_string()));
    }

    let mode = params.crop_mode()?;
    let budget = params.max_bytes.unwrap_or(LARGE_IMAGE_BYTES);
    if budget == 0 {
        return Err(AppError::BadRequest("maxBytes must be positive".to_string()));
    }

    let input_size = bytes.len();
    let compressed =
        tokio::task::spawn_blocking(move || prepare_upload(&mime, &bytes, mode, budget))
            .await
            .map_err(|e| AppError::Internal(format!("Image task failed: {}", e)))??;

    tracing::info!(
        "Compressed {} byte upload to {} bytes ({}x{}, quality {})",
        input_size,
        compressed.bytes.len(),
        compressed.width,
        compressed.height,
        compressed.quality_fraction()
    );

    match params.format {
        OutputFormat::DataUrl => Ok(ApiResponse::new(CompressedImage::from(compressed)).into_response()),
        OutputFormat::Binary => Ok((
            [
                (header::CONTENT_TYPE, "image/jpeg".to_string()),
                (QUALITY_HEADER, format!("{:.2}", compressed.quality_fraction())),
                (WIDTH_HEADER, compressed.width.to_string()),
                (HEIGHT_HEADER, compressed.height.to_string()),
                (BUDGET_HEADER, compressed.within_budget.to_string()),
            ],
            compressed.bytes,
        )
            .into_response()),
    }
}
