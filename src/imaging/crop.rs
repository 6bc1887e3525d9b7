//! Fixed-aspect crop geometry.

use std::str::FromStr;

use image::DynamicImage;
use serde::Deserialize;

use super::ImageError;

/// A pixel rectangle selected in the crop UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    /// Intersect the rectangle with an image of the given size.
    ///
    /// Returns `None` when nothing of the rectangle lies inside the image.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<CropRect> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let clamped = CropRect {
            x: self.x,
            y: self.y,
            width: self.width.min(width - self.x),
            height: self.height.min(height - self.y),
        };
        (clamped.width > 0 && clamped.height > 0).then_some(clamped)
    }
}

/// Width-to-height ratio of the crop frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AspectRatio {
    width: u32,
    height: u32,
}

impl AspectRatio {
    pub fn new(width: u32, height: u32) -> Option<Self> {
        (width > 0 && height > 0).then_some(Self { width, height })
    }
}

impl FromStr for AspectRatio {
    type Err = ImageError;

    /// Accepts `w:h` (e.g. `16:9`) or a bare integer `n` meaning `n:1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ImageError::InvalidAspect(s.to_string());
        let (w, h) = match s.split_once(':') {
            Some((w, h)) => (w.trim(), h.trim()),
            None => (s.trim(), "1"),
        };
        let width = w.parse().map_err(|_| invalid())?;
        let height = h.parse().map_err(|_| invalid())?;
        AspectRatio::new(width, height).ok_or_else(invalid)
    }
}

/// Largest centred rectangle with the given aspect ratio that fits the image.
pub fn centered_crop(width: u32, height: u32, aspect: AspectRatio) -> CropRect {
    let (w, h) = (u64::from(width), u64::from(height));
    let (aw, ah) = (u64::from(aspect.width), u64::from(aspect.height));

    let (crop_w, crop_h) = if w * ah >= h * aw {
        // image is wider than the frame
        ((h * aw / ah).max(1).min(w), h)
    } else {
        (w, (w * ah / aw).max(1).min(h))
    };

    CropRect {
        x: ((w - crop_w) / 2) as u32,
        y: ((h - crop_h) / 2) as u32,
        width: crop_w as u32,
        height: crop_h as u32,
    }
}

/// Cut the selected rectangle out of the image.
pub fn crop(img: &DynamicImage, rect: CropRect) -> Result<DynamicImage, ImageError> {
    let rect = rect
        .clamp_to(img.width(), img.height())
        .ok_or(ImageError::EmptyCrop)?;
    Ok(img.crop_imm(rect.x, rect.y, rect.width, rect.height))
}
