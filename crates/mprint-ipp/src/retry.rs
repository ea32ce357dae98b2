// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Retry engine with exponential backoff + jitter for the IPP request loop
// (§4.2 "Retry discipline").
//
// Retry budgets are keyed on the IPP status code (or transport failure)
// that a request came back with, not on string-matching a message:
//   - transport failure / ServerErrorInternalError  -> +1 retry
//   - ServerErrorServiceUnavailable                 -> +3 retries
//   - ClientErrorBadRequest                         -> +2 retries
//   - ClientErrorNotFound                           -> terminal, no retry
//   - ServerErrorVersionNotSupported                -> degrade version, retry
//   - anything else client-error-shaped             -> terminal, no retry

use std::time::Duration;

use ipp::model::StatusCode;
use tracing::{debug, info, warn};

use mprint_core::error::PrintCoreError;

/// Retry configuration. Base values chosen per §4.2; per-outcome retry
/// counts are looked up via [`retry_budget`], not `max_retries` alone.
pub struct RetryConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(120),
        }
    }
}

/// Outcome of a single request attempt, as seen by the retry engine.
pub enum AttemptOutcome {
    /// Request failed before a response was received (connect/timeout/IO).
    Transport,
    /// Request completed with this IPP status code.
    Status(StatusCode),
    /// The job was cancelled or the job manager is shutting down; no
    /// retry should be attempted regardless of the outcome.
    ShuttingDown,
}

/// What the retry engine decided to do with an attempt outcome.
pub enum RetryDecision {
    /// Retry after this delay.
    RetryAfter(Duration),
    /// Retry immediately at one IPP version tier below the current one.
    DegradeVersion,
    /// Do not retry — this outcome is terminal.
    GiveUp,
    /// The per-outcome retry budget for this request has been used up.
    Exhausted,
}

/// Maximum retry attempts for a given attempt outcome (§4.2).
fn retry_budget(outcome: &AttemptOutcome) -> u32 {
    match outcome {
        AttemptOutcome::Transport => 1,
        AttemptOutcome::ShuttingDown => 0,
        AttemptOutcome::Status(code) => match code {
            StatusCode::ServerErrorInternalError => 1,
            StatusCode::ServerErrorServiceUnavailable => 3,
            StatusCode::ClientErrorBadRequest => 2,
            StatusCode::ClientErrorNotFound => 0,
            StatusCode::ServerErrorVersionNotSupported => 1,
            _ => 0,
        },
    }
}

/// Decide whether to retry `outcome`, given how many times this request
/// has already been retried.
pub fn should_retry(outcome: &AttemptOutcome, attempt: u32, config: &RetryConfig) -> RetryDecision {
    if matches!(outcome, AttemptOutcome::ShuttingDown) {
        info!("shutting down — not retrying");
        return RetryDecision::GiveUp;
    }

    if let AttemptOutcome::Status(StatusCode::ServerErrorVersionNotSupported) = outcome {
        debug!("version not supported — degrading to next tier");
        return RetryDecision::DegradeVersion;
    }

    let budget = retry_budget(outcome);
    if attempt >= budget {
        if budget == 0 {
            info!(?attempt, "terminal outcome — not retrying");
            RetryDecision::GiveUp
        } else {
            warn!(attempt, budget, "retry budget exhausted");
            RetryDecision::Exhausted
        }
    } else {
        let delay = compute_delay(attempt, config);
        debug!(attempt, delay_ms = delay.as_millis(), "scheduling retry");
        RetryDecision::RetryAfter(delay)
    }
}

/// Classify a `PrintCoreError` into the `AttemptOutcome` the retry engine
/// expects, for call sites that only have the mapped error rather than the
/// raw status code.
pub fn outcome_for_error(err: &PrintCoreError) -> AttemptOutcome {
    match err {
        PrintCoreError::UnableToConnect { .. } => AttemptOutcome::Transport,
        PrintCoreError::VersionMismatch { .. } => {
            AttemptOutcome::Status(StatusCode::ServerErrorVersionNotSupported)
        }
        PrintCoreError::Shutdown => AttemptOutcome::ShuttingDown,
        PrintCoreError::PrinterBusy { .. } => {
            AttemptOutcome::Status(StatusCode::ServerErrorServiceUnavailable)
        }
        _ => AttemptOutcome::Status(StatusCode::ServerErrorInternalError),
    }
}

/// Compute exponential backoff delay with jitter.
///
/// delay = min(base * 2^attempt + jitter, max_delay); jitter is a
/// deterministic spread across `[0, base)` keyed on the attempt number, to
/// avoid synchronized retries from concurrent jobs without pulling in a
/// `rand` dependency.
fn compute_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let base_ms = config.base_delay.as_millis() as u64;
    let exp_ms = base_ms.saturating_mul(1u64 << attempt.min(10));
    let jitter_ms = jitter(base_ms, attempt);
    let total_ms = exp_ms.saturating_add(jitter_ms);
    let capped_ms = total_ms.min(config.max_delay.as_millis() as u64);
    Duration::from_millis(capped_ms)
}

fn jitter(base_ms: u64, attempt: u32) -> u64 {
    let hash = (attempt as u64).wrapping_mul(6364136223846793005);
    hash % base_ms.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_unavailable_gets_three_retries() {
        let config = RetryConfig::default();
        let outcome = AttemptOutcome::Status(StatusCode::ServerErrorServiceUnavailable);
        assert!(matches!(should_retry(&outcome, 0, &config), RetryDecision::RetryAfter(_)));
        assert!(matches!(should_retry(&outcome, 2, &config), RetryDecision::RetryAfter(_)));
        assert!(matches!(should_retry(&outcome, 3, &config), RetryDecision::Exhausted));
    }

    #[test]
    fn not_found_is_terminal() {
        let config = RetryConfig::default();
        let outcome = AttemptOutcome::Status(StatusCode::ClientErrorNotFound);
        assert!(matches!(should_retry(&outcome, 0, &config), RetryDecision::GiveUp));
    }

    #[test]
    fn version_not_supported_degrades_instead_of_waiting() {
        let config = RetryConfig::default();
        let outcome = AttemptOutcome::Status(StatusCode::ServerErrorVersionNotSupported);
        assert!(matches!(should_retry(&outcome, 0, &config), RetryDecision::DegradeVersion));
    }

    #[test]
    fn shutdown_always_gives_up() {
        let config = RetryConfig::default();
        assert!(matches!(
            should_retry(&AttemptOutcome::ShuttingDown, 0, &config),
            RetryDecision::GiveUp
        ));
    }

    #[test]
    fn transport_failure_gets_one_retry() {
        let config = RetryConfig::default();
        assert!(matches!(
            should_retry(&AttemptOutcome::Transport, 0, &config),
            RetryDecision::RetryAfter(_)
        ));
        assert!(matches!(
            should_retry(&AttemptOutcome::Transport, 1, &config),
            RetryDecision::Exhausted
        ));
    }

    #[test]
    fn delay_increases_with_attempts() {
        let config = RetryConfig::default();
        let d0 = compute_delay(0, &config);
        let d1 = compute_delay(1, &config);
        let d2 = compute_delay(2, &config);
        assert!(d1 > d0);
        assert!(d2 > d1);
    }

    #[test]
    fn delay_capped_at_max() {
        let config = RetryConfig {
            max_delay: Duration::from_secs(10),
            ..Default::default()
        };
        let d = compute_delay(20, &config);
        assert!(d <= Duration::from_secs(10));
    }
}
