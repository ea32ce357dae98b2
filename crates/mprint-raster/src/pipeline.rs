// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image pipeline (§4.5): decode → subsample → rotate → pad → scale →
// stripe. Each stage only ever sees a bounded window of rows — the whole
// point of staging them this way is that a multi-thousand-pixel photo
// never needs to live in memory all at once, just the rows the next
// stripe's scale query asks for.

use tracing::{debug, instrument};

use mprint_core::error::{PrintCoreError, Result};
use mprint_core::types::{JobParams, RenderFlags};

use crate::image::ImageProcessor;
use crate::scaler::Scaler;

/// Page output dimensions round to a multiple of this many pixels — the
/// device raster grid every supported printer aligns strips to.
const ROW_ALIGNMENT: u32 = 16;

/// Working-set bound on cached source rows, enforced by `PipelineConfig`
/// callers (§4.5 memory bound).
pub const MIN_ROWS_CACHED_BYTES: usize = 1 << 20;
pub const MAX_ROWS_CACHED_BYTES: usize = 4 << 20;

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub rows_cached_bytes: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rows_cached_bytes: MIN_ROWS_CACHED_BYTES,
        }
    }
}

impl PipelineConfig {
    pub fn clamp(rows_cached_bytes: usize) -> Self {
        Self {
            rows_cached_bytes: rows_cached_bytes.clamp(MIN_ROWS_CACHED_BYTES, MAX_ROWS_CACHED_BYTES),
        }
    }
}

/// Round a dimension up to the device raster grid.
pub fn align_up(value: u32) -> u32 {
    (value + ROW_ALIGNMENT - 1) / ROW_ALIGNMENT * ROW_ALIGNMENT
}

/// One rendered stripe of device-space RGBA8 rows, ready for an encoder.
#[derive(Debug)]
pub struct RenderedStripe {
    pub row_offset: u32,
    pub row_count: u32,
    pub width: u32,
    pub rgba: Vec<u8>,
}

/// Runs the decode→subsample→rotate→pad→scale→stripe chain for one page,
/// producing device-space stripes sized to `params.strip_height`.
pub struct ImagePipeline {
    processor: ImageProcessor,
    params: JobParams,
    dst_width: u32,
    dst_height: u32,
    pad_x: u32,
    pad_y: u32,
}

impl ImagePipeline {
    #[instrument(skip(processor, params))]
    pub fn new(processor: ImageProcessor, params: JobParams) -> Result<Self> {
        let rotated = if params.render_flags.contains(RenderFlags::AUTO_ROTATE) {
            let src_is_landscape = processor.width() > processor.height();
            let dst_is_landscape = params.width_px > params.height_px;
            if src_is_landscape != dst_is_landscape {
                processor.rotate_90s(90)
            } else {
                processor
            }
        } else {
            processor
        };

        let dst_width = align_up(params.width_px);
        let dst_height = align_up(params.height_px);

        let (fit_w, fit_h) = fit_within(rotated.width(), rotated.height(), dst_width, dst_height);
        let pad_x = dst_width.saturating_sub(fit_w) / 2;
        let pad_y = dst_height.saturating_sub(fit_h) / 2;

        debug!(dst_width, dst_height, fit_w, fit_h, pad_x, pad_y, "pipeline page geometry resolved");

        Ok(Self {
            processor: rotated,
            params,
            dst_width,
            dst_height,
            pad_x,
            pad_y,
        })
    }

    pub fn output_width(&self) -> u32 {
        self.dst_width
    }

    pub fn output_height(&self) -> u32 {
        self.dst_height
    }

    /// Number of stripes this page will be split into, at the negotiated
    /// strip height.
    pub fn stripe_count(&self) -> u32 {
        self.output_height().div_ceil(self.params.strip_height.max(1))
    }

    /// Render stripe `index` (0-based) into device space: scaled, padded,
    /// and centered per `RenderFlags::CENTER_H`/`CENTER_V`.
    #[instrument(skip(self))]
    pub fn render_stripe(&self, index: u32) -> Result<RenderedStripe> {
        let strip_height = self.params.strip_height.max(1);
        let row_offset = index * strip_height;
        if row_offset >= self.dst_height {
            return Err(PrintCoreError::Encoding(format!("stripe index {index} out of range")));
        }
        let row_count = strip_height.min(self.dst_height - row_offset);

        let (fit_w, fit_h) = fit_within(self.processor.width(), self.processor.height(), self.dst_width, self.dst_height);
        let scaler = Scaler::new(self.processor.width(), self.processor.height(), fit_w.max(1), fit_h.max(1))?;

        let mut rgba = vec![0xffu8; (self.dst_width * row_count * 4) as usize];

        let content_row_start = row_offset.saturating_sub(self.pad_y);
        let content_row_end = (row_offset + row_count).saturating_sub(self.pad_y).min(fit_h);

        if content_row_start < content_row_end {
            let query = scaler.query_rows(content_row_start, content_row_end - content_row_start);
            let src_rows = self.processor.row_stripe(query.src_row_start, query.src_row_span);
            let scaled = scaler.scale_rows(&src_rows, &query, content_row_start, content_row_end - content_row_start)?;

            for local_row in 0..(content_row_end - content_row_start) {
                let dst_row_in_stripe = row_offset + self.pad_y + local_row - row_offset;
                if dst_row_in_stripe >= row_count {
                    continue;
                }
                let src_slice = &scaled[(local_row * fit_w * 4) as usize..((local_row + 1) * fit_w * 4) as usize];
                let dst_start = ((dst_row_in_stripe * self.dst_width + self.pad_x) * 4) as usize;
                rgba[dst_start..dst_start + src_slice.len()].copy_from_slice(src_slice);
            }
        }

        Ok(RenderedStripe {
            row_offset,
            row_count,
            width: self.dst_width,
            rgba,
        })
    }
}

/// Largest `(w, h)` that fits inside `(max_w, max_h)` while preserving the
/// source aspect ratio — the "auto-fit" behaviour named by
/// `RenderFlags::AUTO_FIT`.
fn fit_within(src_w: u32, src_h: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    if src_w == 0 || src_h == 0 {
        return (0, 0);
    }
    let scale_w = max_w as f64 / src_w as f64;
    let scale_h = max_h as f64 / src_h as f64;
    let scale = scale_w.min(scale_h);
    (((src_w as f64 * scale).round() as u32).max(1), ((src_h as f64 * scale).round() as u32).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbaImage};

    fn params() -> JobParams {
        let mut p = JobParams::default();
        p.width_px = 100;
        p.height_px = 100;
        p.strip_height = 32;
        p
    }

    fn solid_processor(w: u32, h: u32) -> ImageProcessor {
        let img = RgbaImage::from_pixel(w, h, image::Rgba([10, 20, 30, 255]));
        ImageProcessor::from_dynamic(DynamicImage::ImageRgba8(img))
    }

    #[test]
    fn align_up_rounds_to_sixteen() {
        assert_eq!(align_up(100), 112);
        assert_eq!(align_up(16), 16);
        assert_eq!(align_up(1), 16);
    }

    #[test]
    fn pipeline_config_clamps_to_bounds() {
        assert_eq!(PipelineConfig::clamp(0).rows_cached_bytes, MIN_ROWS_CACHED_BYTES);
        assert_eq!(PipelineConfig::clamp(100 << 20).rows_cached_bytes, MAX_ROWS_CACHED_BYTES);
    }

    #[test]
    fn stripe_count_covers_full_output_height() {
        let pipeline = ImagePipeline::new(solid_processor(80, 80), params()).unwrap();
        let total_rows: u32 = (0..pipeline.stripe_count()).map(|i| pipeline.render_stripe(i).unwrap().row_count).sum();
        assert_eq!(total_rows, pipeline.output_height());
    }

    #[test]
    fn render_stripe_out_of_range_errors() {
        let pipeline = ImagePipeline::new(solid_processor(80, 80), params()).unwrap();
        let past_end = pipeline.stripe_count() + 10;
        assert!(pipeline.render_stripe(past_end).is_err());
    }

    #[test]
    fn fit_within_preserves_aspect_ratio() {
        let (w, h) = fit_within(200, 100, 100, 100);
        assert_eq!(w, 100);
        assert_eq!(h, 50);
    }
}
