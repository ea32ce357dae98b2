// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core types, error taxonomy, and configuration shared across the job
// manager, IPP protocol engine, and raster pipeline crates.

pub mod config;
pub mod error;
pub mod types;

pub use config::ServiceConfig;
pub use error::{ErrorKind, PrintCoreError, Result};
pub use types::*;
