// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// IPP protocol engine, job manager, and status monitor for the mobile
// print job pipeline. This crate bridges the core domain types defined in
// `mprint-core` to a live printer connection.

pub mod capabilities;
pub mod health;
pub mod ipp_client;
pub mod job_manager;
pub mod job_table;
pub mod plugin;
pub mod retry;
pub mod status_monitor;

pub use health::HealthTracker;
pub use ipp_client::IppClient;
pub use job_manager::{JobEvent, JobManager};
pub use job_table::JobTable;
pub use retry::RetryConfig;
