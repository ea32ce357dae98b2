// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plugin registry (§2, §9 "Polymorphism via vtables"): the original design
// selects an encoder/transport/capability-probe implementation through a
// struct of function pointers looked up by (MIME type, wire format). Rust
// expresses the same seam as trait objects and a priority-ordered registry
// rather than raw pointers.

use std::sync::Arc;

use async_trait::async_trait;

use mprint_core::error::Result;
use mprint_core::types::{JobParams, PrinterCapabilities};
use mprint_raster::pclm::PclmEncoder;
use mprint_raster::pipeline::RenderedStripe;
use mprint_raster::pwg::PwgEncoder;

/// Encodes a decoded page stream into the bytes a transport will send.
/// One `Encoder` instance is selected per job based on `mime_type()` and
/// the negotiated wire format (§4.1 step 2 "encoder init").
pub trait Encoder: Send + Sync {
    fn mime_type(&self) -> &'static str;

    /// Accept one rendered stripe from the raster pipeline, in row order.
    /// The encoder owns any running state (xref tables, strip counters)
    /// between calls.
    fn push_strip(&mut self, stripe: RenderedStripe) -> Result<()>;

    /// Close out the current page once every stripe has been pushed.
    fn finish_page(&mut self, width: u32, height: u32) -> Result<()>;

    /// Finalize the encoded document (trailer, xref table, EOF marker).
    /// Takes `self` by value since closing the stream consumes any
    /// encoder-internal document builder.
    fn finish(self: Box<Self>) -> Result<Vec<u8>>;

    /// True when a duplex job's odd page count leaves an unpaired page
    /// that needs a synthesized blank back side before the document is
    /// closed out. Only the PWG encoder tracks this; PCLm pages are
    /// independent PDF objects with no sheet-parity constraint.
    fn needs_blank_trailer(&self) -> bool {
        false
    }

    /// Append a blank page sized to match the job, used to satisfy
    /// `needs_blank_trailer`.
    fn push_blank_page(&mut self, _width: u32, _height: u32) -> Result<()> {
        Ok(())
    }
}

/// Wraps `mprint_raster::pclm::PclmEncoder` behind the `Encoder` seam.
pub struct PclmEncoderPlugin {
    inner: PclmEncoder,
}

impl PclmEncoderPlugin {
    pub fn new(params: &JobParams) -> Self {
        Self {
            inner: PclmEncoder::new(params),
        }
    }
}

impl Encoder for PclmEncoderPlugin {
    fn mime_type(&self) -> &'static str {
        "application/PCLm"
    }

    fn push_strip(&mut self, stripe: RenderedStripe) -> Result<()> {
        let rgba = stripe.rgba.clone();
        self.inner.push_strip(&stripe, &rgba)
    }

    fn finish_page(&mut self, width: u32, height: u32) -> Result<()> {
        self.inner.finish_page(width, height);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>> {
        self.inner.finish()
    }
}

/// Wraps `mprint_raster::pwg::PwgEncoder` behind the `Encoder` seam. PWG
/// pages are written as one block (header + every row), so stripes are
/// buffered per page until `finish_page` hands them to the encoder.
pub struct PwgEncoderPlugin {
    inner: PwgEncoder,
    pending: Vec<RenderedStripe>,
    total_pages: u32,
}

impl PwgEncoderPlugin {
    pub fn new(params: &JobParams, total_pages: u32) -> Self {
        Self {
            inner: PwgEncoder::new(params),
            pending: Vec::new(),
            total_pages,
        }
    }
}

impl Encoder for PwgEncoderPlugin {
    fn mime_type(&self) -> &'static str {
        "image/pwg-raster"
    }

    fn push_strip(&mut self, stripe: RenderedStripe) -> Result<()> {
        self.pending.push(stripe);
        Ok(())
    }

    fn finish_page(&mut self, _width: u32, _height: u32) -> Result<()> {
        let stripes = std::mem::take(&mut self.pending);
        self.inner.push_page(&stripes, self.total_pages)
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>> {
        Ok(self.inner.finish())
    }

    fn needs_blank_trailer(&self) -> bool {
        self.inner.needs_blank_trailer()
    }

    fn push_blank_page(&mut self, width: u32, height: u32) -> Result<()> {
        self.inner.push_blank_page(width, height, self.total_pages)
    }
}

/// Delivers status changes and accepts cancel requests for one printer
/// connection. Implemented by `status_monitor` for live IPP printers and
/// by fakes in tests.
#[async_trait]
pub trait StatusMonitor: Send + Sync {
    async fn poll(&self) -> Result<mprint_core::types::PrinterState>;
    async fn request_cancel(&self, requesting_user_name: &str) -> Result<bool>;
}

/// Sends an encoded document to a printer and reports the outcome. The
/// seam between the Job Manager and the wire protocol — swapped out in
/// tests for a transport that records what it was given instead of
/// opening a socket.
#[async_trait]
pub trait PrintJobTransport: Send + Sync {
    async fn send_document(&self, document_bytes: Vec<u8>, mime_type: &str, params: &JobParams) -> Result<i32>;
}

/// Queries a printer for its capabilities. Split from `PrintJobTransport`
/// because capability queries are cached per printer-uri at a coarser
/// grain than per-job transport state (§4.3).
#[async_trait]
pub trait CapabilityProbe: Send + Sync {
    async fn probe(&self) -> Result<PrinterCapabilities>;
}

/// Binds one `(mime_type, wire_format)` pair to the `Encoder` constructor
/// that handles it. The constructor takes the job's parameters and total
/// page count since both the PCLm and PWG encoders need them up front
/// (media size/margins/colorspace, and — for PWG — duplex sheet parity).
pub struct EncoderEntry {
    pub mime_type: &'static str,
    pub priority: u8,
    pub make: Arc<dyn Fn(&JobParams, u32) -> Box<dyn Encoder> + Send + Sync>,
}

/// Registry of available encoders, consulted by the Job Manager when
/// choosing how to render a job (§4.1 step 2).
#[derive(Default)]
pub struct PluginHost {
    encoders: Vec<EncoderEntry>,
}

impl PluginHost {
    pub fn new() -> Self {
        Self { encoders: Vec::new() }
    }

    pub fn register_encoder(&mut self, entry: EncoderEntry) {
        self.encoders.push(entry);
        self.encoders.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// Highest-priority encoder registered for `mime_type`, if any.
    pub fn encoder_for(&self, mime_type: &str, params: &JobParams, total_pages: u32) -> Option<Box<dyn Encoder>> {
        self.encoders
            .iter()
            .find(|e| e.mime_type == mime_type)
            .map(|e| (e.make)(params, total_pages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullEncoder {
        bytes_seen: usize,
    }

    impl Encoder for NullEncoder {
        fn mime_type(&self) -> &'static str {
            "application/octet-stream"
        }
        fn push_strip(&mut self, stripe: RenderedStripe) -> Result<()> {
            self.bytes_seen += stripe.rgba.len();
            Ok(())
        }
        fn finish_page(&mut self, _width: u32, _height: u32) -> Result<()> {
            Ok(())
        }
        fn finish(self: Box<Self>) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn registry_returns_highest_priority_match() {
        let mut host = PluginHost::new();
        host.register_encoder(EncoderEntry {
            mime_type: "application/pdf",
            priority: 1,
            make: Arc::new(|_params, _total_pages| Box::new(NullEncoder { bytes_seen: 0 })),
        });
        host.register_encoder(EncoderEntry {
            mime_type: "application/pdf",
            priority: 10,
            make: Arc::new(|_params, _total_pages| Box::new(NullEncoder { bytes_seen: 0 })),
        });

        let params = JobParams::default();
        let encoder = host.encoder_for("application/pdf", &params, 1).expect("registered");
        assert_eq!(encoder.mime_type(), "application/octet-stream");
    }

    #[test]
    fn unregistered_mime_type_returns_none() {
        let host = PluginHost::new();
        let params = JobParams::default();
        assert!(host.encoder_for("application/pdf", &params, 1).is_none());
    }
}
