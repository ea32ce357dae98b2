// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service configuration: every named threshold and timeout the job
// pipeline depends on, gathered into one overridable struct rather than
// scattered constants, so an embedding host can tune them without
// touching code.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunable limits for the job pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Fixed capacity of the job table (distinct jobs that can be tracked
    /// at once; at most one may be `Running`).
    pub job_table_capacity: usize,
    /// Fixed capacity of a single job's page queue (§3 invariant).
    pub max_pages_per_job: usize,
    /// Upper bound on how long the worker waits for a busy printer to go
    /// idle before proceeding anyway with `PrinterBusy` set (§4.1 step 3).
    pub max_idle_wait: Duration,
    /// Per-IPP-request timeout (§5).
    pub ipp_request_timeout: Duration,
    /// Per-chunk timeout on the page-send socket write loop (§5).
    pub page_send_timeout: Duration,
    /// Bound on the job-start rendezvous with the status monitor (§4.1
    /// step 7).
    pub job_start_wait: Duration,
    /// Bound on the job-end rendezvous with the status monitor (§4.1
    /// step 7).
    pub job_end_wait: Duration,
    /// Status monitor poll interval (§4.4).
    pub status_poll_interval: Duration,
    /// Clamp bounds for the printer-advertised PCLm strip height (§4.3).
    pub strip_height_min: u32,
    pub strip_height_max: u32,
    /// Consecutive-failure threshold before the per-printer circuit
    /// breaker opens (ambient resilience, not in the core state machine).
    pub circuit_breaker_threshold: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            job_table_capacity: 64,
            max_pages_per_job: crate::types::MAX_PAGES_PER_JOB,
            max_idle_wait: Duration::from_secs(300),
            ipp_request_timeout: Duration::from_secs(15),
            page_send_timeout: Duration::from_secs(20),
            job_start_wait: Duration::from_secs(45),
            job_end_wait: Duration::from_secs(300),
            status_poll_interval: Duration::from_secs(1),
            strip_height_min: 16,
            strip_height_max: 256,
            circuit_breaker_threshold: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_named_thresholds() {
        let cfg = ServiceConfig::default();
        assert_eq!(cfg.max_idle_wait, Duration::from_secs(300));
        assert_eq!(cfg.ipp_request_timeout, Duration::from_secs(15));
        assert_eq!(cfg.page_send_timeout, Duration::from_secs(20));
        assert_eq!(cfg.job_start_wait, Duration::from_secs(45));
        assert_eq!(cfg.job_end_wait, Duration::from_secs(300));
        assert_eq!((cfg.strip_height_min, cfg.strip_height_max), (16, 256));
        assert_eq!(cfg.max_pages_per_job, 1000);
    }
}
