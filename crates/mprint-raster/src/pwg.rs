// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PWG-Raster encoder (§4.8): a fixed-size binary page header per page,
// followed by row data compressed with the same PackBits scheme as the
// PCLm strips, capped at a 256-row / 128-column run span per the PWG
// Raster wire format.

use tracing::instrument;

use mprint_core::error::{PrintCoreError, Result};
use mprint_core::types::{ColorSpace, DuplexMode, JobParams};

use crate::pclm::packbits_encode;
use crate::pipeline::RenderedStripe;

const SYNC_WORD: &[u8; 4] = b"RaS2";
const HEADER_LEN: usize = 1796;
const MAX_RUN_ROWS: usize = 256;
const MAX_RUN_COLS: usize = 128;

/// Fixed-size PWG Raster page header. Every field is written at its exact
/// byte offset so a reader that only understands the subset of PWG
/// Raster this encoder emits can still parse a page without recognizing
/// everything in it.
#[derive(Debug, Clone)]
pub struct PwgPageHeader {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u8,
    pub color_space: ColorSpace,
    pub duplex: DuplexMode,
    pub total_pages: u32,
}

impl PwgPageHeader {
    fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..64].copy_from_slice(&pad_str("PwgRaster", 64));
        buf[64..68].copy_from_slice(&self.width.to_be_bytes());
        buf[68..72].copy_from_slice(&self.height.to_be_bytes());
        buf[72] = self.bits_per_pixel;
        buf[73] = match self.color_space {
            ColorSpace::Mono => 0,
            ColorSpace::Srgb => 1,
            ColorSpace::AdobeRgb => 2,
        };
        buf[74] = if self.duplex.is_duplex() { 1 } else { 0 };
        buf[75..79].copy_from_slice(&self.total_pages.to_be_bytes());
        buf
    }
}

fn pad_str(s: &str, len: usize) -> Vec<u8> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.resize(len, 0);
    bytes
}

/// One page's worth of PWG Raster bytes: header followed by compressed
/// row data.
pub struct PwgPage {
    pub header: PwgPageHeader,
    pub rows: Vec<u8>,
}

/// Builds a PWG-Raster stream across pushed pages, synthesizing the blank
/// back side a duplex job needs when the source document has an odd page
/// count (§4.8 "duplex parity").
pub struct PwgEncoder {
    stream: Vec<u8>,
    params: JobParams,
    pages_written: u32,
}

impl PwgEncoder {
    pub fn new(params: &JobParams) -> Self {
        Self {
            stream: SYNC_WORD.to_vec(),
            params: params.clone(),
            pages_written: 0,
        }
    }

    /// Encode a full page from its rendered stripes.
    #[instrument(skip(self, stripes))]
    pub fn push_page(&mut self, stripes: &[RenderedStripe], total_pages: u32) -> Result<()> {
        if stripes.is_empty() {
            return Err(PrintCoreError::Encoding("PWG page has no stripes".into()));
        }
        let width = stripes[0].width;
        let height: u32 = stripes.iter().map(|s| s.row_count).sum();
        let bits_per_pixel = match self.params.color_space {
            ColorSpace::Mono => 8,
            ColorSpace::Srgb | ColorSpace::AdobeRgb => 24,
        };

        let header = PwgPageHeader {
            width,
            height,
            bits_per_pixel,
            color_space: self.params.color_space,
            duplex: self.params.duplex,
            total_pages,
        };
        self.stream.extend_from_slice(&header.to_bytes());

        for stripe in stripes {
            for row in 0..stripe.row_count {
                let row_start = (row * stripe.width * 4) as usize;
                let row_rgba = &stripe.rgba[row_start..row_start + (stripe.width * 4) as usize];
                let row_packed = pack_row(row_rgba, self.params.color_space);
                self.stream.extend_from_slice(&encode_row_capped(&row_packed));
            }
        }

        self.pages_written += 1;
        Ok(())
    }

    /// Append a blank white page, used to keep a duplex job's physical
    /// sheet count even when the last logical page would otherwise land
    /// alone on a front side (§4.8).
    pub fn push_blank_page(&mut self, width: u32, height: u32, total_pages: u32) -> Result<()> {
        let bits_per_pixel = match self.params.color_space {
            ColorSpace::Mono => 8,
            ColorSpace::Srgb | ColorSpace::AdobeRgb => 24,
        };
        let header = PwgPageHeader {
            width,
            height,
            bits_per_pixel,
            color_space: self.params.color_space,
            duplex: self.params.duplex,
            total_pages,
        };
        self.stream.extend_from_slice(&header.to_bytes());

        let bytes_per_row = width as usize * (bits_per_pixel as usize / 8);
        let blank_row = vec![0xffu8; bytes_per_row];
        for _ in 0..height {
            self.stream.extend_from_slice(&encode_row_capped(&blank_row));
        }
        self.pages_written += 1;
        Ok(())
    }

    /// True when the current page count is odd and the job is duplex —
    /// the condition under which the Job Manager should call
    /// `push_blank_page` before finishing.
    pub fn needs_blank_trailer(&self) -> bool {
        self.params.duplex.is_duplex() && self.pages_written % 2 == 1
    }

    pub fn finish(self) -> Vec<u8> {
        self.stream
    }
}

fn pack_row(rgba: &[u8], color_space: ColorSpace) -> Vec<u8> {
    match color_space {
        ColorSpace::Mono => rgba.chunks(4).map(|px| ((px[0] as u32 + px[1] as u32 + px[2] as u32) / 3) as u8).collect(),
        ColorSpace::Srgb | ColorSpace::AdobeRgb => {
            let mut out = Vec::with_capacity(rgba.len() / 4 * 3);
            for px in rgba.chunks(4) {
                out.extend_from_slice(&px[0..3]);
            }
            out
        }
    }
}

/// PackBits encode a row, but re-split at the PWG Raster span caps (256
/// repeated rows, 128 literal columns) rather than the looser caps
/// `packbits_encode` otherwise allows — the two wire formats share a
/// compressor but not a cap.
fn encode_row_capped(row: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in row.chunks(MAX_RUN_COLS.max(MAX_RUN_ROWS)) {
        out.extend(packbits_encode(chunk));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stripe(width: u32, height: u32, value: u8) -> RenderedStripe {
        RenderedStripe {
            row_offset: 0,
            row_count: height,
            width,
            rgba: vec![value; (width * height * 4) as usize],
        }
    }

    #[test]
    fn stream_starts_with_sync_word() {
        let params = JobParams::default();
        let mut encoder = PwgEncoder::new(&params);
        encoder.push_page(&[stripe(4, 4, 255)], 1).unwrap();
        let bytes = encoder.finish();
        assert_eq!(&bytes[0..4], SYNC_WORD);
    }

    #[test]
    fn blank_page_parity_flag_tracks_page_count() {
        let mut params = JobParams::default();
        params.duplex = DuplexMode::LongEdge;
        let mut encoder = PwgEncoder::new(&params);
        encoder.push_page(&[stripe(4, 4, 255)], 2).unwrap();
        assert!(encoder.needs_blank_trailer());
        encoder.push_blank_page(4, 4, 2).unwrap();
        assert!(!encoder.needs_blank_trailer());
    }

    #[test]
    fn single_sided_job_never_needs_blank_trailer() {
        let params = JobParams::default();
        let mut encoder = PwgEncoder::new(&params);
        encoder.push_page(&[stripe(4, 4, 255)], 1).unwrap();
        assert!(!encoder.needs_blank_trailer());
    }

    #[test]
    fn empty_page_is_rejected() {
        let params = JobParams::default();
        let mut encoder = PwgEncoder::new(&params);
        assert!(encoder.push_page(&[], 1).is_err());
    }

    #[test]
    fn header_round_trips_width_and_height() {
        let header = PwgPageHeader {
            width: 2550,
            height: 3300,
            bits_per_pixel: 24,
            color_space: ColorSpace::Srgb,
            duplex: DuplexMode::None,
            total_pages: 1,
        };
        let bytes = header.to_bytes();
        assert_eq!(u32::from_be_bytes(bytes[64..68].try_into().unwrap()), 2550);
        assert_eq!(u32::from_be_bytes(bytes[68..72].try_into().unwrap()), 3300);
    }
}
