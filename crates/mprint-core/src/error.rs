// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error type for the print core, and the error-kind taxonomy (§7)
// every variant maps onto.

use thiserror::Error;

fn cancelled_suffix(partial: bool) -> &'static str {
    if partial {
        " (partial: printer did not acknowledge)"
    } else {
        ""
    }
}

/// One of the eight error kinds surfaced by the core (§7).
///
/// Distinct from `PrintCoreError` itself: several IPP-layer variants share
/// the same externally-visible kind (e.g. a dial timeout and a TLS
/// handshake failure are both `UnableToConnect`), and the job manager
/// dispatches on the kind, not the concrete variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnableToConnect,
    BadResponse,
    VersionMismatch,
    PrinterBusy,
    PageCorrupt,
    Cancelled,
    ResourceExhausted,
    Shutdown,
}

/// Top-level error type for the print core.
#[derive(Debug, Error)]
pub enum PrintCoreError {
    #[error("unable to connect to printer at {uri}: {detail}")]
    UnableToConnect { uri: String, detail: String },

    #[error("malformed IPP response: {0}")]
    BadResponse(String),

    #[error("printer does not support IPP version {major}.{minor}")]
    VersionMismatch { major: u8, minor: u8 },

    #[error("printer busy at job start ({state})")]
    PrinterBusy { state: String },

    #[error("page {page_num} failed to decode: {detail}")]
    PageCorrupt { page_num: u32, detail: String },

    #[error("job cancelled{}", cancelled_suffix(*partial))]
    Cancelled { partial: bool },

    #[error("failed to allocate {context} buffer of {bytes} bytes")]
    ResourceExhausted { context: String, bytes: usize },

    #[error("service shutdown in progress")]
    Shutdown,

    #[error("no such job handle")]
    UnknownHandle,

    #[error("job table is full ({capacity} slots in use)")]
    JobTableFull { capacity: usize },

    #[error("unsupported document MIME type: {0}")]
    UnsupportedDocument(String),

    #[error("raster encoding failed: {0}")]
    Encoding(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PrintCoreError {
    /// Map this error onto one of the eight §7 kinds.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnableToConnect { .. } => ErrorKind::UnableToConnect,
            Self::BadResponse(_) | Self::UnknownHandle => ErrorKind::BadResponse,
            Self::VersionMismatch { .. } => ErrorKind::VersionMismatch,
            Self::PrinterBusy { .. } => ErrorKind::PrinterBusy,
            Self::PageCorrupt { .. } => ErrorKind::PageCorrupt,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::ResourceExhausted { .. } | Self::JobTableFull { .. } => {
                ErrorKind::ResourceExhausted
            }
            Self::Shutdown => ErrorKind::Shutdown,
            Self::UnsupportedDocument(_) | Self::Encoding(_) | Self::Io(_) => {
                ErrorKind::BadResponse
            }
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PrintCoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_named_kind_is_reachable() {
        let samples = vec![
            PrintCoreError::UnableToConnect {
                uri: "ipp://x".into(),
                detail: "timeout".into(),
            },
            PrintCoreError::BadResponse("missing job-id".into()),
            PrintCoreError::VersionMismatch { major: 2, minor: 0 },
            PrintCoreError::PrinterBusy {
                state: "processing".into(),
            },
            PrintCoreError::PageCorrupt {
                page_num: 3,
                detail: "bad jpeg".into(),
            },
            PrintCoreError::Cancelled { partial: true },
            PrintCoreError::ResourceExhausted {
                context: "stripe".into(),
                bytes: 4096,
            },
            PrintCoreError::Shutdown,
        ];
        let kinds: Vec<ErrorKind> = samples.iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                ErrorKind::UnableToConnect,
                ErrorKind::BadResponse,
                ErrorKind::VersionMismatch,
                ErrorKind::PrinterBusy,
                ErrorKind::PageCorrupt,
                ErrorKind::Cancelled,
                ErrorKind::ResourceExhausted,
                ErrorKind::Shutdown,
            ]
        );
    }

    #[test]
    fn cancelled_display_mentions_partial_only_when_set() {
        let partial = PrintCoreError::Cancelled { partial: true };
        let clean = PrintCoreError::Cancelled { partial: false };
        assert!(partial.to_string().contains("partial"));
        assert!(!clean.to_string().contains("partial"));
    }
}
