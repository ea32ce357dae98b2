// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image module — native decode, 90-degree rotation, crop, grayscale, and
// the row-stripe accessor the raster pipeline scales from.

pub mod processor;

pub use processor::ImageProcessor;
