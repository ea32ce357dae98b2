// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raster pipeline for the mobile print job pipeline: native image decode,
// the fixed-point scale/stripe pipeline, the PCLm and PWG-Raster wire
// encoders, and PDF passthrough validation.
//
// A PDF job never touches the image pipeline (§4.9) — it's validated by
// `pdf::reader` and streamed unmodified. Everything else (photos, scans,
// plain images) flows decode → pipeline → {pclm, pwg} depending on what
// the target printer advertises.

pub mod image;
pub mod pclm;
pub mod pdf;
pub mod pipeline;
pub mod pwg;
pub mod scaler;

pub use image::ImageProcessor;
pub use pclm::PclmEncoder;
pub use pdf::PdfReader;
pub use pipeline::ImagePipeline;
pub use pwg::PwgEncoder;
pub use scaler::Scaler;
