// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF passthrough validation (§4.9): a PDF job never has its page content
// rewritten, so this reader only answers the questions the Job Manager
// needs before streaming the document bytes unmodified — page count and
// whether it parses at all.

use std::path::Path;

use lopdf::{Document, dictionary};
use tracing::{debug, info, instrument};

use mprint_core::error::{PrintCoreError, Result};
use mprint_core::types::MAX_PAGES_PER_JOB;

/// Opens a PDF far enough to validate it for passthrough printing.
pub struct PdfReader {
    document: Document,
    source_path: Option<String>,
}

impl PdfReader {
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let document = Document::load(path_ref)
            .map_err(|err| PrintCoreError::UnsupportedDocument(format!("failed to open {}: {err}", path_ref.display())))?;

        info!(pages = document.get_pages().len(), "PDF opened for passthrough");
        Ok(Self {
            document,
            source_path: Some(path_ref.display().to_string()),
        })
    }

    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let document = Document::load_mem(data)
            .map_err(|err| PrintCoreError::UnsupportedDocument(format!("failed to load PDF from memory: {err}")))?;

        debug!(pages = document.get_pages().len(), "PDF loaded from bytes");
        Ok(Self {
            document,
            source_path: None,
        })
    }

    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    pub fn source_path(&self) -> Option<&str> {
        self.source_path.as_deref()
    }

    /// Reject documents this pipeline cannot safely pass through: over the
    /// per-job page cap, or with zero pages.
    pub fn validate_for_passthrough(&self) -> Result<()> {
        let pages = self.page_count();
        if pages == 0 {
            return Err(PrintCoreError::UnsupportedDocument("PDF has no pages".into()));
        }
        if pages > MAX_PAGES_PER_JOB {
            return Err(PrintCoreError::ResourceExhausted {
                context: "PDF page count".into(),
                bytes: pages,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_pdf() -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let page_id = doc.add_object(lopdf::dictionary! {
            "Type" => "Page",
        });
        let pages_id = doc.add_object(lopdf::dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        });
        let catalog_id = doc.add_object(lopdf::dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("save minimal pdf");
        bytes
    }

    #[test]
    fn from_bytes_counts_pages() {
        let reader = PdfReader::from_bytes(&minimal_pdf()).expect("load");
        assert_eq!(reader.page_count(), 1);
    }

    #[test]
    fn passthrough_validation_accepts_normal_document() {
        let reader = PdfReader::from_bytes(&minimal_pdf()).expect("load");
        assert!(reader.validate_for_passthrough().is_ok());
    }

    #[test]
    fn malformed_bytes_are_rejected() {
        let result = PdfReader::from_bytes(b"not a pdf");
        assert!(result.is_err());
    }
}
