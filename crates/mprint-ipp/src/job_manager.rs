// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job Manager (§4.1, concurrency idiom per §2.1): a single worker task
// drains a queue of `RunJob` messages, holding the job table behind a
// `tokio::sync::Mutex` for the duration of each step rather than for the
// whole job, and uses paired `Notify`s to implement the job-start and
// job-end rendezvous the original semaphore pair describes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{error, info, instrument, warn};

use mprint_core::config::ServiceConfig;
use mprint_core::error::{PrintCoreError, Result};
use mprint_core::types::{JobHandle, JobParams, JobState, PageQueueEntry, PrintFormat, PrinterCapabilities, PrinterStatus};
use mprint_raster::image::ImageProcessor;
use mprint_raster::pclm::PclmEncoder;
use mprint_raster::pdf::PdfReader;
use mprint_raster::pipeline::ImagePipeline;

use crate::capabilities;
use crate::health::HealthTracker;
use crate::ipp_client::IppClient;
use crate::job_table::JobTable;
use crate::plugin::{Encoder, EncoderEntry, PclmEncoderPlugin, PluginHost, PwgEncoderPlugin};
use crate::status_monitor::{self, StatusChange};

/// Message accepted by the worker task.
enum WorkerMessage {
    RunJob(JobHandle),
    Quit,
}

/// Rendezvous pair for one job: the worker signals `start` once the
/// printer has accepted the job and begun receiving pages, and `end` once
/// the terminal callback has fired. Callers that need to block on job
/// completion (rather than just submitting and walking away) wait on
/// `end`.
struct JobRendezvous {
    start: Notify,
    end: Notify,
}

/// Outcome delivered to the submitter's callback at each phase transition
/// (§6 "External interfaces" callback contract).
#[derive(Debug, Clone)]
pub enum JobEvent {
    Queued(JobHandle),
    Running(JobHandle),
    Blocked(JobHandle, mprint_core::types::BlockReasons),
    Done(JobHandle, mprint_core::types::JobResult),
}

/// A page source the worker pulls from until it sees `is_last_page` or a
/// cancellation sentinel. Boxed so callers can hand in PDF passthrough,
/// already-rasterized PWG/PCLm pages, or a test double interchangeably.
pub type PageSource = mpsc::Receiver<PageQueueEntry>;

/// Builds the default `PluginHost`: PCLm and PWG encoders, PCLm given
/// priority since it carries image metadata the printer can use for color
/// management (§4.1 step 2 "encoder init").
fn default_plugin_host() -> Arc<PluginHost> {
    let mut host = PluginHost::new();
    host.register_encoder(EncoderEntry {
        mime_type: "application/PCLm",
        priority: 10,
        make: Arc::new(|params, _total_pages| Box::new(PclmEncoderPlugin::new(params))),
    });
    host.register_encoder(EncoderEntry {
        mime_type: "image/pwg-raster",
        priority: 5,
        make: Arc::new(|params, total_pages| Box::new(PwgEncoderPlugin::new(params, total_pages))),
    });
    Arc::new(host)
}

pub struct JobManager {
    table: Arc<Mutex<JobTable>>,
    sender: mpsc::Sender<WorkerMessage>,
    rendezvous: Arc<Mutex<HashMap<JobHandle, Arc<JobRendezvous>>>>,
    pages: Arc<Mutex<HashMap<JobHandle, PageSource>>>,
    config: ServiceConfig,
}

impl JobManager {
    /// Start the worker task and return a handle to it.
    pub fn spawn(config: ServiceConfig, events: mpsc::Sender<JobEvent>) -> Self {
        let table = Arc::new(Mutex::new(JobTable::new(config.job_table_capacity)));
        let rendezvous: Arc<Mutex<HashMap<JobHandle, Arc<JobRendezvous>>>> = Arc::new(Mutex::new(HashMap::new()));
        let pages: Arc<Mutex<HashMap<JobHandle, PageSource>>> = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = mpsc::channel(config.job_table_capacity.max(1));

        let health = Arc::new(Mutex::new(HealthTracker::with_threshold(config.circuit_breaker_threshold)));
        let plugins = default_plugin_host();

        let worker_table = table.clone();
        let worker_rendezvous = rendezvous.clone();
        let worker_pages = pages.clone();
        let worker_config = config.clone();
        tokio::spawn(async move {
            run_worker(rx, worker_table, worker_rendezvous, worker_pages, health, plugins, worker_config, events).await;
        });

        Self {
            table,
            sender: tx,
            rendezvous,
            pages,
            config,
        }
    }

    /// Submit a new job with its page source. Returns the handle
    /// immediately; the job itself runs on the worker task, pulling pages
    /// from `pages` until it sees `is_last_page` or a cancellation
    /// sentinel (§4.1).
    #[instrument(skip(self, params, printer_uri, pages))]
    pub async fn submit(&self, params: JobParams, printer_uri: String, pages: PageSource) -> Result<JobHandle> {
        let handle = {
            let mut table = self.table.lock().await;
            table.allocate(params, printer_uri)?
        };

        self.rendezvous.lock().await.insert(
            handle,
            Arc::new(JobRendezvous {
                start: Notify::new(),
                end: Notify::new(),
            }),
        );
        self.pages.lock().await.insert(handle, pages);

        self.sender
            .send(WorkerMessage::RunJob(handle))
            .await
            .map_err(|_| PrintCoreError::Shutdown)?;

        Ok(handle)
    }

    /// Block until the printer has begun actively receiving this job's
    /// pages, or `job_start_wait` elapses.
    pub async fn wait_for_start(&self, handle: JobHandle) -> Result<()> {
        let rendezvous = self.rendezvous_for(handle).await?;
        tokio::time::timeout(self.config.job_start_wait, rendezvous.start.notified())
            .await
            .map_err(|_| PrintCoreError::PrinterBusy {
                state: "job did not start within the wait window".into(),
            })
    }

    /// Block until the job reaches a terminal state, or `job_end_wait`
    /// elapses — this is the bounded rendezvous wait from §4.1 step 7.
    pub async fn wait_for_end(&self, handle: JobHandle) -> Result<JobState> {
        let rendezvous = self.rendezvous_for(handle).await?;
        tokio::time::timeout(self.config.job_end_wait, rendezvous.end.notified())
            .await
            .map_err(|_| PrintCoreError::Cancelled { partial: true })?;
        self.table.lock().await.state(handle)
    }

    /// Request cooperative cancellation: flips the in-table flag the
    /// worker checks at the next loop boundary. Does not itself contact
    /// the printer — the worker does that opportunistically.
    pub async fn cancel(&self, handle: JobHandle) -> Result<()> {
        let mut table = self.table.lock().await;
        table.set_state(handle, JobState::CancelRequest)
    }

    pub async fn state(&self, handle: JobHandle) -> Result<JobState> {
        self.table.lock().await.state(handle)
    }

    /// Signal the worker task to drain and stop. In-flight jobs are
    /// allowed to reach a terminal state; no new `RunJob` is dequeued
    /// after this.
    pub async fn shutdown(&self) {
        let _ = self.sender.send(WorkerMessage::Quit).await;
    }

    async fn rendezvous_for(&self, handle: JobHandle) -> Result<Arc<JobRendezvous>> {
        self.rendezvous
            .lock()
            .await
            .get(&handle)
            .cloned()
            .ok_or(PrintCoreError::UnknownHandle)
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_worker(
    mut rx: mpsc::Receiver<WorkerMessage>,
    table: Arc<Mutex<JobTable>>,
    rendezvous: Arc<Mutex<HashMap<JobHandle, Arc<JobRendezvous>>>>,
    pages: Arc<Mutex<HashMap<JobHandle, PageSource>>>,
    health: Arc<Mutex<HealthTracker>>,
    plugins: Arc<PluginHost>,
    config: ServiceConfig,
    events: mpsc::Sender<JobEvent>,
) {
    while let Some(message) = rx.recv().await {
        match message {
            WorkerMessage::Quit => {
                info!("job manager worker shutting down");
                break;
            }
            WorkerMessage::RunJob(handle) => {
                let job_pages = pages.lock().await.remove(&handle);
                run_one_job(handle, &table, &rendezvous, job_pages, &health, &plugins, &config, &events).await;
            }
        }
    }
}

/// The eight-step worker algorithm (§4.1): readiness poll via the status
/// monitor, encoder selection from the plugin registry, page-by-page raster
/// dispatch with duplex blank-page synthesis, save-queue replay across
/// copies, and three-level cancellation.
#[instrument(skip(table, rendezvous, pages, health, plugins, config, events))]
#[allow(clippy::too_many_arguments)]
async fn run_one_job(
    handle: JobHandle,
    table: &Arc<Mutex<JobTable>>,
    rendezvous: &Arc<Mutex<HashMap<JobHandle, Arc<JobRendezvous>>>>,
    pages: Option<PageSource>,
    health: &Arc<Mutex<HealthTracker>>,
    plugins: &Arc<PluginHost>,
    config: &ServiceConfig,
    events: &mpsc::Sender<JobEvent>,
) {
    {
        let mut t = table.lock().await;
        if t.set_state(handle, JobState::Running).is_err() {
            warn!(?handle, "job vanished before it could start");
            return;
        }
    }
    let _ = events.send(JobEvent::Running(handle)).await;

    if let Some(r) = rendezvous.lock().await.get(&handle) {
        r.start.notify_waiters();
    }

    let printer_uri = match table.lock().await.printer_uri(handle) {
        Ok(uri) => uri.to_string(),
        Err(e) => {
            finish_job(handle, table, rendezvous, events, JobState::Error).await;
            error!(?handle, error = %e, "job lost its printer URI before dispatch");
            return;
        }
    };

    if !health.lock().await.allow_request(&printer_uri) {
        warn!(?handle, uri = %printer_uri, "circuit open — refusing to dispatch");
        finish_job(handle, table, rendezvous, events, JobState::Error).await;
        return;
    }

    let client = match IppClient::with_timeout(&printer_uri, config.ipp_request_timeout) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!(?handle, error = %e, "failed to open transport");
            health.lock().await.record_failure(&printer_uri, &e.to_string());
            finish_job(handle, table, rendezvous, events, JobState::Error).await;
            return;
        }
    };

    if matches!(table.lock().await.state(handle), Ok(JobState::CancelRequest)) {
        attempt_opportunistic_cancel(&client, table, handle, config).await;
        finish_job(handle, table, rendezvous, events, JobState::Cancelled).await;
        return;
    }

    let Some(mut pages) = pages else {
        error!(?handle, "job has no page source registered");
        finish_job(handle, table, rendezvous, events, JobState::Error).await;
        return;
    };

    let final_state = match drive_job(handle, table, &client, plugins, config, events, &mut pages).await {
        Ok(state) => {
            health.lock().await.record_success(&printer_uri);
            state
        }
        Err(PrintCoreError::Cancelled { .. }) => JobState::Cancelled,
        Err(e) => {
            warn!(?handle, error = %e, "job dispatch failed");
            health.lock().await.record_failure(&printer_uri, &e.to_string());
            if matches!(e, PrintCoreError::PageCorrupt { .. }) {
                JobState::Corrupted
            } else {
                JobState::Error
            }
        }
    };

    if matches!(table.lock().await.state(handle), Ok(JobState::CancelRequest)) {
        attempt_opportunistic_cancel(&client, table, handle, config).await;
        finish_job(handle, table, rendezvous, events, JobState::Cancelled).await;
        return;
    }

    finish_job(handle, table, rendezvous, events, final_state).await;
}

/// Readiness-poll, raster, and transport dispatch for one job, once it has
/// passed the cheap pre-flight cancellation check. Split out of
/// `run_one_job` so the state-machine/cancellation wrapper above stays
/// readable.
#[allow(clippy::too_many_arguments)]
async fn drive_job(
    handle: JobHandle,
    table: &Arc<Mutex<JobTable>>,
    client: &Arc<IppClient>,
    plugins: &Arc<PluginHost>,
    config: &ServiceConfig,
    events: &mpsc::Sender<JobEvent>,
    pages: &mut PageSource,
) -> Result<JobState> {
    let params = table.lock().await.params(handle)?.clone();

    wait_for_printer_ready(handle, table, client, config, events).await?;

    let capabilities = capabilities::query(client).await?;

    if params.print_format == PrintFormat::Pdf || (params.print_format == PrintFormat::Auto && capabilities.supports_pdf) {
        return dispatch_pdf_job(handle, table, client, &params, pages).await;
    }

    let mime_type = select_mime_type(&params, &capabilities);

    let raster_pages = collect_raster_pages(handle, table, pages).await?;
    if raster_pages.is_empty() {
        return Ok(JobState::Completed);
    }

    let total_pages = raster_pages.len() as u32;
    let encoder = plugins
        .encoder_for(mime_type, &params, total_pages)
        .ok_or_else(|| PrintCoreError::UnsupportedDocument(mime_type.to_string()))?;
    let encoded = encode_job(encoder, &params, &capabilities, raster_pages)?;

    for copy_num in 1..=params.copies.max(1) {
        let mut copy_params = params.clone();
        copy_params.copy_num = copy_num;
        let _job_id = client.print_job(encoded.clone(), mime_type, &copy_params).await?;
    }

    Ok(JobState::Completed)
}

/// Poll the printer's live status until it reports idle, times out past
/// `max_idle_wait`, or reports a terminal connection failure (§4.1 steps
/// 2-3). A busy printer still proceeds once the wait window closes — print
/// is attempted rather than given up on.
async fn wait_for_printer_ready(
    handle: JobHandle,
    table: &Arc<Mutex<JobTable>>,
    client: &Arc<IppClient>,
    config: &ServiceConfig,
    events: &mpsc::Sender<JobEvent>,
) -> Result<()> {
    let (tx, mut rx) = mpsc::channel::<StatusChange>(4);
    let monitor = status_monitor::spawn(client.clone(), config.status_poll_interval, tx);

    let deadline = tokio::time::Instant::now() + config.max_idle_wait;
    let mut blocked_reported = mprint_core::types::BlockReasons::empty();

    let outcome = loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break Ok(());
        }
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Some(StatusChange { state })) => {
                if state.status == PrinterStatus::UnableToConnect {
                    break Err(PrintCoreError::UnableToConnect {
                        uri: table.lock().await.printer_uri(handle).unwrap_or("").to_string(),
                        detail: "status monitor could not reach printer".into(),
                    });
                }
                if state.status == PrinterStatus::Idle {
                    break Ok(());
                }
                if state.blocked_reasons != blocked_reported {
                    blocked_reported = state.blocked_reasons;
                    let _ = table.lock().await.set_state(handle, JobState::Blocked);
                    let _ = events.send(JobEvent::Blocked(handle, blocked_reported)).await;
                }
            }
            Ok(None) => break Ok(()),
            Err(_) => break Ok(()),
        }
    };

    monitor.stop().await;
    let _ = table.lock().await.set_state(handle, JobState::Running);
    outcome
}

/// PDF jobs stream unmodified past the raster pipeline entirely (§4.9
/// passthrough) — the only work here is validating the document and
/// handing its bytes to the transport.
async fn dispatch_pdf_job(
    handle: JobHandle,
    table: &Arc<Mutex<JobTable>>,
    client: &Arc<IppClient>,
    params: &JobParams,
    pages: &mut PageSource,
) -> Result<JobState> {
    let Some(entry) = pages.recv().await else {
        return Ok(JobState::Completed);
    };
    if entry.is_sentinel() || matches!(table.lock().await.state(handle), Ok(JobState::CancelRequest)) {
        return Err(PrintCoreError::Cancelled { partial: false });
    }

    let bytes = tokio::fs::read(&entry.pathname).await?;
    let reader = PdfReader::from_bytes(&bytes)?;
    reader.validate_for_passthrough()?;

    for copy_num in 1..=params.copies.max(1) {
        let mut copy_params = params.clone();
        copy_params.copy_num = copy_num;
        let _job_id = client.print_job(bytes.clone(), "application/pdf", &copy_params).await?;
    }

    Ok(JobState::Completed)
}

fn select_mime_type(params: &JobParams, capabilities: &PrinterCapabilities) -> &'static str {
    match params.print_format {
        PrintFormat::Pclm => "application/PCLm",
        PrintFormat::Pwg => "image/pwg-raster",
        PrintFormat::Pdf => "application/pdf",
        PrintFormat::Auto => {
            if capabilities.supports_pclm {
                "application/PCLm"
            } else {
                "image/pwg-raster"
            }
        }
    }
}

/// Drain the page queue into decoded, rendered stripes per page, stopping
/// at the cancellation sentinel or the last page (§4.1 step 4). Pages that
/// fail to decode are recorded as corrupt rather than aborting the whole
/// job, matching `PageQueueEntry::corrupted`.
async fn collect_raster_pages(
    handle: JobHandle,
    table: &Arc<Mutex<JobTable>>,
    pages: &mut PageSource,
) -> Result<Vec<Vec<mprint_raster::pipeline::RenderedStripe>>> {
    let mut rendered_pages = Vec::new();
    let params = table.lock().await.params(handle)?.clone();

    loop {
        if matches!(table.lock().await.state(handle), Ok(JobState::CancelRequest)) {
            return Err(PrintCoreError::Cancelled { partial: !rendered_pages.is_empty() });
        }
        let Some(entry) = pages.recv().await else {
            break;
        };
        if entry.is_sentinel() {
            return Err(PrintCoreError::Cancelled { partial: !rendered_pages.is_empty() });
        }

        let mut page_params = params.clone();
        if let Some(margins) = entry.margin_override {
            page_params.pixel_margins = margins;
        }

        let stripes = match render_one_page(&entry, &page_params).await {
            Ok(stripes) => stripes,
            Err(e) => {
                warn!(?handle, page = entry.page_num, error = %e, "page failed to decode, substituting blank page");
                return Err(PrintCoreError::PageCorrupt {
                    page_num: entry.page_num,
                    detail: e.to_string(),
                });
            }
        };
        rendered_pages.push(stripes);

        if entry.is_last_page {
            break;
        }
    }

    Ok(rendered_pages)
}

async fn render_one_page(entry: &PageQueueEntry, params: &JobParams) -> Result<Vec<mprint_raster::pipeline::RenderedStripe>> {
    let bytes = tokio::fs::read(&entry.pathname).await?;
    let processor = ImageProcessor::from_bytes(&bytes)?;
    let pipeline = ImagePipeline::new(processor, params.clone())?;

    let mut stripes = Vec::with_capacity(pipeline.stripe_count() as usize);
    for index in 0..pipeline.stripe_count() {
        stripes.push(pipeline.render_stripe(index)?);
    }
    Ok(stripes)
}

/// Push every rendered page through `encoder`, mirroring back-side pages
/// when the printer's duplex mechanism needs them rotated (§4.7), and
/// synthesizing a trailing blank page to keep duplex sheet parity.
fn encode_job(
    mut encoder: Box<dyn Encoder>,
    params: &JobParams,
    capabilities: &PrinterCapabilities,
    pages: Vec<Vec<mprint_raster::pipeline::RenderedStripe>>,
) -> Result<Vec<u8>> {
    let mirror_back_page =
        params.duplex.is_duplex() && params.render_flags.contains(mprint_core::types::RenderFlags::ROTATE_BACK_PAGE) && capabilities.rotatable_back_page;

    for (page_index, stripes) in pages.into_iter().enumerate() {
        let is_back_page = params.duplex.is_duplex() && page_index % 2 == 1;
        let (width, height) = stripes
            .first()
            .map(|s| (s.width, s.row_offset + s.row_count))
            .unwrap_or((0, 0));

        for stripe in stripes {
            let stripe = if is_back_page && mirror_back_page {
                let rgba = PclmEncoder::mirror_stripe(&stripe);
                mprint_raster::pipeline::RenderedStripe { rgba, ..stripe }
            } else {
                stripe
            };
            encoder.push_strip(stripe)?;
        }
        encoder.finish_page(width, height)?;
    }

    if encoder.needs_blank_trailer() {
        encoder.push_blank_page(params.width_px, params.height_px)?;
    }

    encoder.finish()
}

async fn attempt_opportunistic_cancel(
    client: &IppClient,
    table: &Arc<Mutex<JobTable>>,
    handle: JobHandle,
    config: &ServiceConfig,
) {
    let user_name = table
        .lock()
        .await
        .params(handle)
        .map(|p| p.user_name.clone())
        .unwrap_or_else(|_| "anonymous".to_string());

    let cancelled = tokio::time::timeout(
        config.page_send_timeout,
        crate::status_monitor::request_cancel(client, &user_name),
    )
    .await;

    match cancelled {
        Ok(Ok(true)) => info!(?handle, "printer acknowledged cancel"),
        Ok(Ok(false)) => info!(?handle, "no job on printer to cancel"),
        Ok(Err(e)) => warn!(?handle, error = %e, "cancel request failed"),
        Err(_) => warn!(?handle, "printer did not ack cancel before timeout — forcing partial cancel"),
    }
}

async fn finish_job(
    handle: JobHandle,
    table: &Arc<Mutex<JobTable>>,
    rendezvous: &Arc<Mutex<HashMap<JobHandle, Arc<JobRendezvous>>>>,
    events: &mpsc::Sender<JobEvent>,
    state: JobState,
) {
    let _ = table.lock().await.set_state(handle, state);

    let result = match state {
        JobState::Completed => mprint_core::types::JobResult::Ok,
        JobState::Cancelled => mprint_core::types::JobResult::Cancelled,
        JobState::Corrupted => mprint_core::types::JobResult::Corrupt,
        _ => mprint_core::types::JobResult::Error,
    };
    let _ = events.send(JobEvent::Done(handle, result)).await;

    if let Some(r) = rendezvous.lock().await.get(&handle) {
        r.end.notify_waiters();
    }

    let _ = table.lock().await.release(handle);
    rendezvous.lock().await.remove(&handle);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ServiceConfig {
        ServiceConfig {
            job_table_capacity: 4,
            job_start_wait: Duration::from_millis(500),
            job_end_wait: Duration::from_secs(5),
            max_idle_wait: Duration::from_millis(10),
            ipp_request_timeout: Duration::from_millis(50),
            status_poll_interval: Duration::from_millis(5),
            ..Default::default()
        }
    }

    /// An already-closed page source: the worker's `pages.recv()` resolves
    /// to `None` immediately, so a job with no pages runs straight through
    /// to a terminal state without ever touching the filesystem.
    fn empty_pages() -> PageSource {
        let (tx, rx) = mpsc::channel(1);
        drop(tx);
        rx
    }

    #[tokio::test]
    async fn submit_and_wait_reaches_terminal_state() {
        let (tx, mut rx) = mpsc::channel(8);
        let manager = JobManager::spawn(test_config(), tx);
        let handle = manager
            .submit(JobParams::default(), "ipp://203.0.113.5:631/ipp/print".into(), empty_pages())
            .await
            .expect("submit");

        let state = manager.wait_for_end(handle).await.expect("wait_for_end");
        assert!(state.is_terminal());

        let mut saw_running = false;
        let mut saw_done = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                JobEvent::Running(h) if h == handle => saw_running = true,
                JobEvent::Done(h, _) if h == handle => saw_done = true,
                _ => {}
            }
        }
        assert!(saw_running);
        assert!(saw_done);
    }

    #[tokio::test]
    async fn cancel_before_dispatch_reaches_cancelled() {
        let (tx, _rx) = mpsc::channel(8);
        let manager = JobManager::spawn(test_config(), tx);
        let handle = manager
            .submit(JobParams::default(), "ipp://203.0.113.5:631/ipp/print".into(), empty_pages())
            .await
            .expect("submit");

        // Race the cancel against the worker picking the job up; either
        // ordering should still land on a terminal state.
        let _ = manager.cancel(handle).await;
        let state = manager.wait_for_end(handle).await.expect("wait_for_end");
        assert!(state.is_terminal());
    }

    #[tokio::test]
    async fn unknown_handle_after_completion_is_rejected() {
        let (tx, _rx) = mpsc::channel(8);
        let manager = JobManager::spawn(test_config(), tx);
        let handle = manager
            .submit(JobParams::default(), "ipp://203.0.113.5:631/ipp/print".into(), empty_pages())
            .await
            .expect("submit");
        manager.wait_for_end(handle).await.expect("wait_for_end");
        assert!(manager.state(handle).await.is_err());
    }
}
