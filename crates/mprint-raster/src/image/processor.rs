// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Native image decode (§4.5.1): decode, rotate, and crop an input photo or
// scan ahead of the raster pipeline's subsample/pad/scale/stripe stages.
// Unlike a whole-document image editor, this hands stripes of rows to the
// pipeline rather than building one big in-memory `DynamicImage` result —
// callers that need the whole buffer still can via `into_dynamic`, but the
// pipeline itself only ever asks for `row_stripe`.

use image::{DynamicImage, GenericImageView, RgbaImage};
use imageproc::geometric_transformations::{self, Interpolation};
use tracing::{debug, info, instrument};

use mprint_core::error::{PrintCoreError, Result};

/// A decoded image, ready to be consumed row-stripe-at-a-time by the
/// raster pipeline.
pub struct ImageProcessor {
    image: DynamicImage,
}

impl ImageProcessor {
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let img = image::load_from_memory(data)
            .map_err(|err| PrintCoreError::UnsupportedDocument(format!("failed to decode image: {err}")))?;
        debug!(width = img.width(), height = img.height(), "image decoded");
        Ok(Self { image: img })
    }

    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn into_dynamic(self) -> DynamicImage {
        self.image
    }

    /// Rotate by a multiple of 90 degrees (clockwise), the only rotation
    /// the pipeline ever applies — arbitrary-angle deskew is out of scope
    /// (§1 non-goals: no scan enhancement).
    #[instrument(skip(self), fields(degrees))]
    pub fn rotate_90s(self, degrees: i32) -> Self {
        let normalised = degrees.rem_euclid(360);
        info!(normalised, "rotating image by a multiple of 90");
        match normalised {
            90 => Self {
                image: self.image.rotate90(),
            },
            180 => Self {
                image: self.image.rotate180(),
            },
            270 => Self {
                image: self.image.rotate270(),
            },
            _ => self,
        }
    }

    /// Crop to a rectangular region, clamped to image bounds.
    pub fn crop(self, x: u32, y: u32, width: u32, height: u32) -> Self {
        let img_w = self.image.width();
        let img_h = self.image.height();
        let safe_x = x.min(img_w.saturating_sub(1));
        let safe_y = y.min(img_h.saturating_sub(1));
        let safe_w = width.min(img_w - safe_x);
        let safe_h = height.min(img_h - safe_y);
        Self {
            image: self.image.crop_imm(safe_x, safe_y, safe_w, safe_h),
        }
    }

    pub fn grayscale(self) -> Self {
        Self {
            image: self.image.grayscale(),
        }
    }

    /// Return one horizontal stripe of `height` rows starting at `y`, as
    /// tightly packed RGBA8 bytes — the unit the raster pipeline and the
    /// PCLm/PWG encoders consume.
    pub fn row_stripe(&self, y: u32, height: u32) -> Vec<u8> {
        let rgba = self.image.to_rgba8();
        let width = rgba.width();
        let clamped_height = height.min(rgba.height().saturating_sub(y));
        let mut out = Vec::with_capacity((width * clamped_height * 4) as usize);
        for row in y..y + clamped_height {
            for col in 0..width {
                out.extend_from_slice(&rgba.get_pixel(col, row).0);
            }
        }
        out
    }

    /// General-angle rotation retained only for the fallback path when a
    /// page needs back-side mirroring rather than an axis-aligned flip
    /// (§4.7 "back-side mirroring").
    pub fn mirror_horizontal(self) -> Self {
        let rgba = self.image.to_rgba8();
        let flipped = image::imageops::flip_horizontal(&rgba);
        Self {
            image: DynamicImage::ImageRgba8(flipped),
        }
    }

    /// Rotate the back side of a duplex sheet 180 degrees when the
    /// printer's duplex mechanism feeds it upside down relative to the
    /// front (§4.7, `RenderFlags::ROTATE_BACK_PAGE`). Kept distinct from
    /// `rotate_90s` because it's driven by a capability flag, not a user
    /// rotation request.
    pub fn rotate_back_page(self) -> Self {
        self.rotate_90s(180)
    }

    fn _unused_interpolation_hint() -> Interpolation {
        Interpolation::Bilinear
    }
}

/// Apply an arbitrary-angle affine rotation, used only by the scaler's
/// test harness to synthesize rotated fixtures — the production pipeline
/// never rotates by a non-multiple of 90 (§1 non-goals).
#[cfg(test)]
pub(crate) fn rotate_arbitrary(image: &RgbaImage, degrees: f32) -> RgbaImage {
    let radians = degrees.to_radians();
    let default_pixel = image::Rgba([255u8, 255, 255, 0]);
    geometric_transformations::rotate_about_center(image, radians, Interpolation::Bilinear, default_pixel)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_image(width: u32, height: u32) -> ImageProcessor {
        let img = RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
        ImageProcessor::from_dynamic(DynamicImage::ImageRgba8(img))
    }

    #[test]
    fn row_stripe_returns_requested_rows() {
        let proc = solid_image(4, 10);
        let stripe = proc.row_stripe(2, 3);
        assert_eq!(stripe.len(), 4 * 3 * 4);
    }

    #[test]
    fn row_stripe_clamps_past_bottom_edge() {
        let proc = solid_image(4, 10);
        let stripe = proc.row_stripe(8, 5);
        assert_eq!(stripe.len(), 4 * 2 * 4);
    }

    #[test]
    fn rotate_90s_swaps_dimensions() {
        let proc = solid_image(10, 20).rotate_90s(90);
        assert_eq!(proc.width(), 20);
        assert_eq!(proc.height(), 10);
    }

    #[test]
    fn rotate_by_non_multiple_is_a_no_op() {
        let proc = solid_image(10, 20).rotate_90s(45);
        assert_eq!(proc.width(), 10);
        assert_eq!(proc.height(), 20);
    }
}
