// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Fixed-point bilinear scaler (§4.6). The pipeline never scales with
// floating point: every ratio and accumulator here is a 24-bit fixed-point
// integer, so the same source stripe scaled on two different targets
// produces byte-identical output. Source and destination can each be
// larger or smaller than the other, independently per axis, which is why
// the scaler tracks four directional modes rather than a single
// "shrink"/"grow" switch.

use tracing::instrument;

use mprint_core::error::{PrintCoreError, Result};

/// Fixed-point shift used for every ratio and accumulator in this module.
pub const FIXED_SHIFT: u32 = 24;
const FIXED_ONE: i64 = 1 << FIXED_SHIFT;

/// Which direction a single axis is scaling, independently of the other
/// axis — a photo can be upscaled horizontally while being downscaled
/// vertically in the same job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisMode {
    Up,
    Down,
}

/// Combined per-job scaling mode, named the way the pipeline logs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleMode {
    pub x: AxisMode,
    pub y: AxisMode,
}

impl ScaleMode {
    pub fn from_dimensions(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Self {
        Self {
            x: if dst_w >= src_w { AxisMode::Up } else { AxisMode::Down },
            y: if dst_h >= src_h { AxisMode::Up } else { AxisMode::Down },
        }
    }
}

/// The row-span and buffer-size contract a caller must satisfy before
/// calling `scale_rows`: how many source rows are needed to produce a
/// given span of output rows, and where in the source that span starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleQuery {
    pub src_row_start: u32,
    pub src_row_span: u32,
    pub dst_row_count: u32,
    pub temp_buffer_rows: u32,
}

/// A fixed-point bilinear scaler bound to one source/destination size pair.
pub struct Scaler {
    src_width: u32,
    src_height: u32,
    dst_width: u32,
    dst_height: u32,
    x_ratio: i64,
    y_ratio: i64,
    mode: ScaleMode,
}

impl Scaler {
    #[instrument(fields(src_width, src_height, dst_width, dst_height))]
    pub fn new(src_width: u32, src_height: u32, dst_width: u32, dst_height: u32) -> Result<Self> {
        if src_width == 0 || src_height == 0 || dst_width == 0 || dst_height == 0 {
            return Err(PrintCoreError::Encoding("scaler dimensions must be non-zero".into()));
        }
        let x_ratio = (src_width as i64 * FIXED_ONE) / dst_width as i64;
        let y_ratio = (src_height as i64 * FIXED_ONE) / dst_height as i64;
        Ok(Self {
            src_width,
            src_height,
            dst_width,
            dst_height,
            x_ratio,
            y_ratio,
            mode: ScaleMode::from_dimensions(src_width, src_height, dst_width, dst_height),
        })
    }

    pub fn mode(&self) -> ScaleMode {
        self.mode
    }

    /// Answer the pre-query contract for producing `dst_row_count` output
    /// rows starting at `dst_row_start`: which source rows must already be
    /// resident, and how large a temp buffer the caller needs to stage
    /// them. Callers are expected to query before each stripe so the
    /// pipeline never has to hold the whole source image in memory.
    pub fn query_rows(&self, dst_row_start: u32, dst_row_count: u32) -> ScaleQuery {
        let first_src_row = (dst_row_start as i64 * self.y_ratio) >> FIXED_SHIFT;
        let last_dst_row = (dst_row_start + dst_row_count).saturating_sub(1);
        let last_src_row = ((last_dst_row as i64 * self.y_ratio) >> FIXED_SHIFT) + 1;
        let last_src_row = last_src_row.min(self.src_height as i64 - 1);
        let span = (last_src_row - first_src_row + 1).max(1) as u32;

        ScaleQuery {
            src_row_start: first_src_row.max(0) as u32,
            src_row_span: span,
            dst_row_count,
            temp_buffer_rows: span + 1,
        }
    }

    /// Scale one span of rows. `src_rows` must hold exactly the rows named
    /// by `query_rows` for this same `dst_row_start`, as tightly packed
    /// RGBA8 source-width rows. Returns tightly packed RGBA8 destination-
    /// width rows.
    #[instrument(skip(self, src_rows), fields(dst_row_start, dst_row_count))]
    pub fn scale_rows(&self, src_rows: &[u8], query: &ScaleQuery, dst_row_start: u32, dst_row_count: u32) -> Result<Vec<u8>> {
        let expected_len = (self.src_width * query.src_row_span * 4) as usize;
        if src_rows.len() < expected_len {
            return Err(PrintCoreError::ResourceExhausted {
                context: "scaler source rows".into(),
                bytes: expected_len,
            });
        }

        let mut out = vec![0u8; (self.dst_width * dst_row_count * 4) as usize];

        for dst_y in 0..dst_row_count {
            let abs_dst_y = dst_row_start + dst_y;
            let src_y_fixed = (abs_dst_y as i64 * self.y_ratio) - (query.src_row_start as i64 * FIXED_ONE);
            let src_y0 = (src_y_fixed >> FIXED_SHIFT).clamp(0, query.src_row_span as i64 - 1) as u32;
            let src_y1 = (src_y0 + 1).min(query.src_row_span - 1);
            let y_frac = (src_y_fixed - ((src_y0 as i64) << FIXED_SHIFT)).clamp(0, FIXED_ONE);

            for dst_x in 0..self.dst_width {
                let src_x_fixed = dst_x as i64 * self.x_ratio;
                let src_x0 = (src_x_fixed >> FIXED_SHIFT).clamp(0, self.src_width as i64 - 1) as u32;
                let src_x1 = (src_x0 + 1).min(self.src_width - 1);
                let x_frac = (src_x_fixed - ((src_x0 as i64) << FIXED_SHIFT)).clamp(0, FIXED_ONE);

                for channel in 0..4usize {
                    let p00 = sample(src_rows, self.src_width, src_x0, src_y0, channel);
                    let p10 = sample(src_rows, self.src_width, src_x1, src_y0, channel);
                    let p01 = sample(src_rows, self.src_width, src_x0, src_y1, channel);
                    let p11 = sample(src_rows, self.src_width, src_x1, src_y1, channel);

                    let top = lerp(p00, p10, x_frac);
                    let bottom = lerp(p01, p11, x_frac);
                    let value = lerp(top, bottom, y_frac);

                    let dst_idx = ((dst_y * self.dst_width + dst_x) * 4 + channel as u32) as usize;
                    out[dst_idx] = value as u8;
                }
            }
        }

        Ok(out)
    }
}

fn sample(rows: &[u8], width: u32, x: u32, y: u32, channel: usize) -> i64 {
    let idx = ((y * width + x) * 4) as usize + channel;
    rows.get(idx).copied().unwrap_or(0) as i64
}

fn lerp(a: i64, b: i64, frac: i64) -> i64 {
    (a * (FIXED_ONE - frac) + b * frac) >> FIXED_SHIFT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_detects_independent_axis_directions() {
        let mode = ScaleMode::from_dimensions(100, 200, 150, 100);
        assert_eq!(mode.x, AxisMode::Up);
        assert_eq!(mode.y, AxisMode::Down);
    }

    #[test]
    fn query_rows_covers_required_span() {
        let scaler = Scaler::new(100, 100, 50, 50).unwrap();
        let query = scaler.query_rows(0, 10);
        assert!(query.src_row_span >= 10);
    }

    #[test]
    fn downscale_round_trips_within_one_of_original() {
        let width = 8u32;
        let height = 8u32;
        let mut src = vec![0u8; (width * height * 4) as usize];
        for px in src.chunks_mut(4) {
            px.copy_from_slice(&[200, 100, 50, 255]);
        }

        let scaler = Scaler::new(width, height, 4, 4).unwrap();
        let query = scaler.query_rows(0, 4);
        let out = scaler.scale_rows(&src, &query, 0, 4).unwrap();

        for px in out.chunks(4) {
            assert!((px[0] as i32 - 200).abs() <= 1);
            assert!((px[1] as i32 - 100).abs() <= 1);
            assert!((px[2] as i32 - 50).abs() <= 1);
        }
    }

    #[test]
    fn upscale_produces_requested_dimensions() {
        let src = vec![128u8; (4 * 4 * 4) as usize];
        let scaler = Scaler::new(4, 4, 8, 8).unwrap();
        let query = scaler.query_rows(0, 8);
        let out = scaler.scale_rows(&src, &query, 0, 8).unwrap();
        assert_eq!(out.len(), (8 * 8 * 4) as usize);
    }

    #[test]
    fn zero_dimension_is_rejected() {
        assert!(Scaler::new(0, 10, 10, 10).is_err());
    }
}
