// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Status Monitor (§4.4): one task per active job, polling the printer's
// state on an interval and reporting it to the Job Manager only when it
// changes. Also owns the opportunistic cancel path — telling the printer
// "stop this job" is a best-effort courtesy, not a guarantee.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use mprint_core::error::Result;
use mprint_core::types::{BlockReasons, PrinterState, PrinterStatus};

use crate::ipp_client::IppClient;

/// Message sent from a status-monitor task back to the Job Manager when
/// the printer's reported state changes.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub state: PrinterState,
}

/// Handle to a running status-monitor task. Dropping this does not stop
/// the task — call [`StatusMonitorHandle::stop`] explicitly, mirroring the
/// job manager's own explicit teardown.
pub struct StatusMonitorHandle {
    stop_tx: mpsc::Sender<()>,
}

impl StatusMonitorHandle {
    pub async fn stop(&self) {
        let _ = self.stop_tx.send(()).await;
    }
}

/// Spawn a status-monitor task polling `client` every `poll_interval`.
/// `on_change` fires exactly once per distinct reported state, and at
/// least once at task start.
pub fn spawn(
    client: Arc<IppClient>,
    poll_interval: std::time::Duration,
    on_change: mpsc::Sender<StatusChange>,
) -> StatusMonitorHandle {
    let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        let mut ticker = interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_reported: Option<PrinterState> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match poll_once(&client).await {
                        Ok(state) => {
                            let changed = last_reported
                                .as_ref()
                                .map(|prev| prev.status != state.status || prev.blocked_reasons != state.blocked_reasons)
                                .unwrap_or(true);
                            if changed {
                                debug!(status = ?state.status, "printer status changed");
                                last_reported = Some(state.clone());
                                if on_change.send(StatusChange { state }).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "status poll failed");
                            let unreachable = PrinterState {
                                status: PrinterStatus::UnableToConnect,
                                reasons: vec![PrinterStatus::UnableToConnect],
                                blocked_reasons: BlockReasons::UNABLE_TO_CONNECT,
                            };
                            let changed = last_reported
                                .as_ref()
                                .map(|prev| prev.status != unreachable.status)
                                .unwrap_or(true);
                            if changed {
                                last_reported = Some(unreachable.clone());
                                if on_change.send(StatusChange { state: unreachable }).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                }
                _ = stop_rx.recv() => {
                    info!("status monitor stopping");
                    break;
                }
            }
        }
    });

    StatusMonitorHandle { stop_tx }
}

async fn poll_once(client: &IppClient) -> Result<PrinterState> {
    let attrs = client.get_printer_attributes().await?;

    let status = attrs
        .get("printer-state")
        .map(|s| map_printer_state(s))
        .unwrap_or(PrinterStatus::Unknown);

    let reason_keywords: Vec<String> = attrs
        .get("printer-state-reasons")
        .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
        .unwrap_or_default();

    let blocked_reasons = reason_keywords
        .iter()
        .fold(BlockReasons::empty(), |acc, kw| acc | map_reason_keyword(kw));

    let reasons = reason_keywords.iter().map(|kw| map_reason_to_status(kw)).collect();

    Ok(PrinterState {
        status,
        reasons,
        blocked_reasons,
    })
}

fn map_printer_state(value: &str) -> PrinterStatus {
    match value {
        "3" | "idle" => PrinterStatus::Idle,
        "4" | "processing" => PrinterStatus::Printing,
        "5" | "stopped" => PrinterStatus::Busy,
        _ => PrinterStatus::Unknown,
    }
}

fn map_reason_keyword(keyword: &str) -> BlockReasons {
    let base = keyword.trim_end_matches("-error").trim_end_matches("-warning");
    match base {
        "media-empty" | "media-needed" => BlockReasons::OUT_OF_PAPER,
        "marker-supply-empty" | "toner-empty" => BlockReasons::OUT_OF_TONER,
        "marker-ink-empty" => BlockReasons::OUT_OF_INK,
        "marker-supply-low" | "toner-low" => BlockReasons::LOW_ON_TONER,
        "marker-ink-low" => BlockReasons::LOW_ON_INK,
        "marker-ink-almost-empty" => BlockReasons::REALLY_LOW_ON_INK,
        "media-jam" | "paper-jam" => BlockReasons::JAMMED,
        "door-open" | "cover-open" | "interlock-open" => BlockReasons::DOOR_OPEN,
        "service-needed" | "input-tray-missing" => BlockReasons::SERVICE_REQUEST,
        "paused" | "shutdown" => BlockReasons::BUSY,
        "connecting-to-device" | "timed-out" => BlockReasons::UNABLE_TO_CONNECT,
        "" | "none" => BlockReasons::empty(),
        _ => BlockReasons::UNKNOWN,
    }
}

fn map_reason_to_status(keyword: &str) -> PrinterStatus {
    match map_reason_keyword(keyword) {
        BlockReasons::OUT_OF_PAPER => PrinterStatus::OutOfPaper,
        BlockReasons::OUT_OF_TONER => PrinterStatus::OutOfToner,
        BlockReasons::OUT_OF_INK => PrinterStatus::OutOfInk,
        BlockReasons::LOW_ON_TONER => PrinterStatus::LowOnToner,
        BlockReasons::LOW_ON_INK => PrinterStatus::LowOnInk,
        BlockReasons::REALLY_LOW_ON_INK => PrinterStatus::VeryLowOnInk,
        BlockReasons::JAMMED => PrinterStatus::Jammed,
        BlockReasons::DOOR_OPEN => PrinterStatus::DoorOpen,
        BlockReasons::SERVICE_REQUEST => PrinterStatus::SvcRequest,
        BlockReasons::UNABLE_TO_CONNECT => PrinterStatus::UnableToConnect,
        BlockReasons::BUSY => PrinterStatus::Busy,
        _ => PrinterStatus::Unknown,
    }
}

/// Attempt to cancel the job currently running on this printer under
/// `requesting_user_name`, per §4.4's "success defined as the cancel
/// request itself did not error" rule — a printer accepting Cancel-Job
/// does not guarantee it stops mid-page.
pub async fn request_cancel(client: &IppClient, requesting_user_name: &str) -> Result<bool> {
    let jobs = client.get_jobs(requesting_user_name).await?;
    let Some(job) = jobs.first() else {
        debug!("no active job to cancel");
        return Ok(false);
    };
    client.cancel_job(job.job_id).await?;
    info!(job_id = job.job_id, "cancel request sent to printer");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn printer_state_maps_numeric_and_keyword_forms() {
        assert_eq!(map_printer_state("3"), PrinterStatus::Idle);
        assert_eq!(map_printer_state("idle"), PrinterStatus::Idle);
        assert_eq!(map_printer_state("processing"), PrinterStatus::Printing);
    }

    #[test]
    fn reason_keyword_maps_to_block_reason() {
        assert_eq!(map_reason_keyword("media-empty-error"), BlockReasons::OUT_OF_PAPER);
        assert_eq!(map_reason_keyword("door-open-warning"), BlockReasons::DOOR_OPEN);
    }

    #[test]
    fn empty_reason_list_yields_no_block_reasons() {
        let reasons: Vec<String> = Vec::new();
        let folded = reasons.iter().fold(BlockReasons::empty(), |acc, kw| acc | map_reason_keyword(kw));
        assert!(folded.is_empty());
    }

    #[test]
    fn unmapped_reason_falls_back_to_unknown() {
        assert_eq!(map_reason_keyword("cloud-connect-pending"), BlockReasons::UNKNOWN);
    }
}
