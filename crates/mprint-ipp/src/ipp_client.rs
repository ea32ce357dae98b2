// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Async IPP client: version negotiation, request composition, and the
// streaming Print-Job contract (§4.2).
//
// Uses the `ipp` crate's async API to send standard IPP operations:
//   - Get-Printer-Attributes  (RFC 8011 §4.2.5)
//   - Print-Job               (RFC 8011 §4.2.1)
//   - Get-Jobs                (RFC 8011 §4.2.6)
//   - Cancel-Job              (RFC 8011 §4.2.8)

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::OnceLock;
use std::time::Duration;

use ipp::model::IppVersion;
use ipp::prelude::*;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use mprint_core::error::{PrintCoreError, Result};
use mprint_core::types::{JobParams, MediaSize, PrintFormat};

use crate::retry::{self, RetryConfig, RetryDecision};

/// Process-wide app/OS identity, set once by `set_source_info` before
/// `init()` and read here when composing `document-format-details`
/// (§4.2.1, §9 "Global app/os/api version").
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub app_name: String,
    pub app_version: String,
    pub os_name: String,
}

static SOURCE_INFO: OnceLock<SourceInfo> = OnceLock::new();

/// Record the embedding application's identity. Must be called at most
/// once, before any job is started.
pub fn set_source_info(app_name: impl Into<String>, app_version: impl Into<String>, os_name: impl Into<String>) {
    let _ = SOURCE_INFO.set(SourceInfo {
        app_name: app_name.into(),
        app_version: app_version.into(),
        os_name: os_name.into(),
    });
}

fn source_info() -> Option<&'static SourceInfo> {
    SOURCE_INFO.get()
}

/// Attributes returned by a Get-Printer-Attributes response, flattened to
/// name → human-readable string.
pub type PrinterAttributes = HashMap<String, String>;

/// Summary of a remote print job as returned by Get-Jobs.
#[derive(Debug, Clone)]
pub struct RemoteJobInfo {
    pub job_id: i32,
    pub job_name: String,
    pub job_state: String,
    pub job_state_reasons: Vec<String>,
}

/// The three IPP version tiers negotiated in order, highest first.
const VERSION_CHAIN: &[IppVersion] = &[IppVersion::v2_0(), IppVersion::v1_1(), IppVersion::v1_0()];

fn version_pair(v: IppVersion) -> (u8, u8) {
    ((v.0 >> 8) as u8, (v.0 & 0xff) as u8)
}

/// Async IPP client wrapping the `ipp` crate, bound to a single printer
/// URI, with a cached negotiated version (§4.2).
/// Per-IPP-request timeout used when none is given explicitly, matching
/// `ServiceConfig::default().ipp_request_timeout` (§5).
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub struct IppClient {
    uri: Uri,
    negotiated_version: Mutex<Option<IppVersion>>,
    request_timeout: Duration,
}

impl IppClient {
    /// Create a new client targeting the given printer URI, with the
    /// default per-request timeout.
    pub fn new(uri: &str) -> Result<Self> {
        Self::with_timeout(uri, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a new client with a caller-supplied per-request timeout
    /// (§5), e.g. the embedding host's `ServiceConfig::ipp_request_timeout`.
    pub fn with_timeout(uri: &str, request_timeout: Duration) -> Result<Self> {
        let parsed: Uri = uri
            .parse()
            .map_err(|e| PrintCoreError::BadResponse(format!("invalid printer URI '{uri}': {e}")))?;
        Ok(Self {
            uri: parsed,
            negotiated_version: Mutex::new(None),
            request_timeout,
        })
    }

    /// Await a wire send, bounding it by `request_timeout` rather than
    /// trusting the transport's own (possibly unbounded) connect/read
    /// timeouts (§5 "per-IPP-request timeout").
    async fn bounded<F, T, E>(&self, send: F) -> Result<T>
    where
        F: std::future::Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        match tokio::time::timeout(self.request_timeout, send).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(PrintCoreError::UnableToConnect {
                uri: self.uri.to_string(),
                detail: e.to_string(),
            }),
            Err(_) => Err(PrintCoreError::UnableToConnect {
                uri: self.uri.to_string(),
                detail: format!("no response within {:?}", self.request_timeout),
            }),
        }
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Resolve the highest IPP version this printer accepts, trying
    /// 2.0 → 1.1 → 1.0 and caching the result for subsequent requests
    /// of this job (§4.2 "Version negotiation").
    #[instrument(skip(self), fields(uri = %self.uri))]
    pub async fn negotiate_version(&self) -> Result<IppVersion> {
        if let Some(cached) = *self.negotiated_version.lock().await {
            return Ok(cached);
        }

        let mut last_err: Option<PrintCoreError> = None;
        for &version in VERSION_CHAIN {
            match self.try_get_printer_attributes(version).await {
                Ok(_) => {
                    let (major, minor) = version_pair(version);
                    info!(major, minor, "negotiated IPP version");
                    *self.negotiated_version.lock().await = Some(version);
                    return Ok(version);
                }
                Err(e) if is_version_not_supported(&e) => {
                    let (major, minor) = version_pair(version);
                    debug!(major, minor, "printer rejected IPP version, stepping down");
                    last_err = Some(e);
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            PrintCoreError::VersionMismatch {
                major: 1,
                minor: 0,
            }
        }))
    }

    /// Run `make_request` with the retry discipline from `retry.rs`:
    /// transport and server-error outcomes are retried after a backoff
    /// delay up to their per-outcome budget, a version-not-supported
    /// outcome drops the cached negotiated version and re-negotiates on
    /// the next attempt, and anything else is returned immediately
    /// (§4.2 "Retry discipline").
    async fn send_with_retry<F, Fut, T>(&self, mut make_request: F) -> Result<T>
    where
        F: FnMut(IppVersion) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let config = RetryConfig::default();
        let mut attempt: u32 = 0;
        loop {
            let version = self.negotiate_version().await?;
            match make_request(version).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let outcome = retry::outcome_for_error(&e);
                    match retry::should_retry(&outcome, attempt, &config) {
                        RetryDecision::RetryAfter(delay) => {
                            warn!(attempt, delay_ms = delay.as_millis(), error = %e, "retrying IPP request");
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                        }
                        RetryDecision::DegradeVersion => {
                            *self.negotiated_version.lock().await = None;
                            attempt += 1;
                        }
                        RetryDecision::GiveUp | RetryDecision::Exhausted => return Err(e),
                    }
                }
            }
        }
    }

    async fn try_get_printer_attributes(&self, version: IppVersion) -> Result<IppAttributes> {
        let operation = IppOperationBuilder::get_printer_attributes(self.uri.clone())
            .version(version)
            .build();
        let client = AsyncIppClient::new(self.uri.clone());

        let response = self.bounded(client.send(operation)).await?;

        let status = response.header().status_code();
        if status == StatusCode::ServerErrorVersionNotSupported {
            return Err(PrintCoreError::VersionMismatch {
                major: version_pair(version).0,
                minor: version_pair(version).1,
            });
        }
        if !status.is_success() {
            return Err(PrintCoreError::BadResponse(format!(
                "Get-Printer-Attributes returned status {status:?}"
            )));
        }
        Ok(response.attributes().clone())
    }

    /// Query the printer for its capabilities and current state, after
    /// negotiating a version.
    #[instrument(skip(self), fields(uri = %self.uri))]
    pub async fn get_printer_attributes(&self) -> Result<PrinterAttributes> {
        let attrs = self.get_printer_attributes_raw().await?;
        let flat = flatten_attributes(&attrs);
        debug!(count = flat.len(), "received printer attributes");
        Ok(flat)
    }

    /// Same as [`get_printer_attributes`] but returns the raw attribute
    /// groups, for the Capability Parser.
    #[instrument(skip(self), fields(uri = %self.uri))]
    pub async fn get_printer_attributes_raw(&self) -> Result<IppAttributes> {
        self.send_with_retry(|version| self.try_get_printer_attributes(version)).await
    }

    /// Submit a document to the printer as a Print-Job, composing the
    /// request per §4.2 ("Request composition for Print-Job").
    ///
    /// `copies` is only sent when `params.print_format == Pdf` and
    /// `copies_supported` is true (§8 boundaries) — otherwise the caller
    /// (Job Manager) is responsible for looping one `Print-Job` per copy.
    #[instrument(skip(self, document_bytes, params), fields(uri = %self.uri, job_name = %params.job_name))]
    pub async fn print_job(&self, document_bytes: Vec<u8>, mime_type: &str, params: &JobParams) -> Result<i32> {
        self.send_with_retry(|version| self.try_print_job(version, document_bytes.clone(), mime_type, params))
            .await
    }

    async fn try_print_job(&self, version: IppVersion, document_bytes: Vec<u8>, mime_type: &str, params: &JobParams) -> Result<i32> {
        let payload = IppPayload::new(Cursor::new(document_bytes));

        let mut builder = IppOperationBuilder::print_job(self.uri.clone(), payload)
            .version(version)
            .user_name(&params.user_name)
            .job_title(&params.job_name)
            .document_format(mime_type);

        if let Some(info) = source_info() {
            builder = builder.attribute(IppAttribute::new(
                "document-format-details",
                IppValue::TextWithoutLanguage(format!(
                    "{} {} / {}",
                    info.app_name, info.app_version, info.os_name
                )),
            ));
        }

        builder = builder.attribute(IppAttribute::new(
            "sides",
            IppValue::Keyword(params.duplex.ipp_sides_keyword().to_string()),
        ));
        builder = builder.attribute(IppAttribute::new(
            "print-color-mode",
            IppValue::Keyword(params.color_space.ipp_keyword().to_string()),
        ));

        if version_pair(version).0 >= 2 {
            builder = builder.attribute(media_col_attribute(params));
        } else {
            builder = builder.attribute(IppAttribute::new(
                "media",
                IppValue::Keyword(params.media_size.pwg_keyword()),
            ));
        }

        if matches!(params.print_format, PrintFormat::Pdf) && params.copies_supported {
            builder = builder.attribute(IppAttribute::new(
                "copies",
                IppValue::Integer(params.copies as i32),
            ));
        }

        let operation = builder.build();
        let client = AsyncIppClient::new(self.uri.clone());

        info!(mime = mime_type, "sending Print-Job");
        let response = self.bounded(client.send(operation)).await?;

        let status = response.header().status_code();
        if status == StatusCode::ServerErrorVersionNotSupported {
            return Err(PrintCoreError::VersionMismatch {
                major: version_pair(version).0,
                minor: version_pair(version).1,
            });
        }
        if !status.is_success() {
            error!(status = ?status, "Print-Job failed");
            return Err(PrintCoreError::BadResponse(format!(
                "Print-Job returned status {status:?}"
            )));
        }

        let job_id = extract_job_id(response.attributes())
            .ok_or_else(|| PrintCoreError::BadResponse("Print-Job response missing job-id".into()))?;

        if job_state_reasons(response.attributes())
            .iter()
            .any(|r| r == "job-canceled-at-device")
        {
            warn!(job_id, "printer reports job-canceled-at-device on accept");
            return Err(PrintCoreError::Cancelled { partial: false });
        }

        info!(job_id, "print job accepted by printer");
        Ok(job_id)
    }

    /// Retrieve the list of jobs currently known to the printer.
    #[instrument(skip(self), fields(uri = %self.uri))]
    pub async fn get_jobs(&self, requesting_user_name: &str) -> Result<Vec<RemoteJobInfo>> {
        self.send_with_retry(|version| self.try_get_jobs(version, requesting_user_name)).await
    }

    async fn try_get_jobs(&self, version: IppVersion, requesting_user_name: &str) -> Result<Vec<RemoteJobInfo>> {
        let operation = IppOperationBuilder::get_jobs(self.uri.clone())
            .version(version)
            .attribute(IppAttribute::new("my-jobs", IppValue::Boolean(true)))
            .attribute(IppAttribute::new(
                "requesting-user-name",
                IppValue::NameWithoutLanguage(requesting_user_name.to_string()),
            ))
            .build();
        let client = AsyncIppClient::new(self.uri.clone());

        debug!("sending Get-Jobs");
        let response = self.bounded(client.send(operation)).await?;

        let status = response.header().status_code();
        if status == StatusCode::ServerErrorVersionNotSupported {
            return Err(PrintCoreError::VersionMismatch {
                major: version_pair(version).0,
                minor: version_pair(version).1,
            });
        }
        if !status.is_success() {
            return Err(PrintCoreError::BadResponse(format!(
                "Get-Jobs returned status {status:?}"
            )));
        }

        let jobs = parse_jobs(response.attributes());
        debug!(count = jobs.len(), "received job list");
        Ok(jobs)
    }

    /// Cancel a specific job on the printer.
    #[instrument(skip(self), fields(uri = %self.uri, job_id))]
    pub async fn cancel_job(&self, job_id: i32) -> Result<()> {
        self.send_with_retry(|version| self.try_cancel_job(version, job_id)).await
    }

    async fn try_cancel_job(&self, version: IppVersion, job_id: i32) -> Result<()> {
        let operation = IppOperationBuilder::cancel_job(self.uri.clone(), job_id)
            .version(version)
            .build();
        let client = AsyncIppClient::new(self.uri.clone());

        info!(job_id, "sending Cancel-Job");
        let response = self.bounded(client.send(operation)).await?;

        let status = response.header().status_code();
        if status == StatusCode::ServerErrorVersionNotSupported {
            return Err(PrintCoreError::VersionMismatch {
                major: version_pair(version).0,
                minor: version_pair(version).1,
            });
        }
        if !status.is_success() {
            error!(status = ?status, job_id, "Cancel-Job failed");
            return Err(PrintCoreError::BadResponse(format!(
                "Cancel-Job({job_id}) returned status {status:?}"
            )));
        }

        info!(job_id, "job cancelled");
        Ok(())
    }
}

fn is_version_not_supported(e: &PrintCoreError) -> bool {
    matches!(e, PrintCoreError::VersionMismatch { .. })
}

/// A named member of an IPP collection value: the member-attribute-name
/// value immediately followed by the member's own value, per RFC 8011
/// §5.1.5's `1setOf collection` encoding.
fn named_member(name: &str, value: IppValue) -> Vec<IppValue> {
    vec![IppValue::MemberAttrName(name.to_string()), value]
}

/// Build the `media-col` collection attribute for 2.0+ printers (§4.2),
/// with every member named rather than positional — an anonymous
/// `Collection` is ambiguous about which value is which attribute and most
/// printers reject it outright.
fn media_col_attribute(params: &JobParams) -> IppAttribute {
    let margins = params.pixel_margins;

    let mut media_size_members = named_member("media-size-name", IppValue::Keyword(params.media_size.pwg_keyword()));
    if let MediaSize::Custom { width_mm, height_mm } = params.media_size {
        media_size_members.extend(named_member("x-dimension", IppValue::Integer((width_mm * 100) as i32)));
        media_size_members.extend(named_member("y-dimension", IppValue::Integer((height_mm * 100) as i32)));
    }

    let mut members = Vec::new();
    members.extend(named_member(
        "media-type",
        IppValue::Keyword(format!("{:?}", params.media_type).to_lowercase()),
    ));
    members.extend(named_member("media-size", IppValue::Collection(media_size_members)));
    members.extend(named_member("media-top-margin", IppValue::Integer(margins.top as i32)));
    members.extend(named_member("media-bottom-margin", IppValue::Integer(margins.bottom as i32)));
    members.extend(named_member("media-left-margin", IppValue::Integer(margins.left as i32)));
    members.extend(named_member("media-right-margin", IppValue::Integer(margins.right as i32)));

    IppAttribute::new("media-col", IppValue::Collection(members))
}

fn flatten_attributes(attrs: &IppAttributes) -> PrinterAttributes {
    let mut map = HashMap::new();
    for group in attrs.groups() {
        for (name, attr) in group.attributes() {
            map.insert(name.clone(), format!("{}", attr.value()));
        }
    }
    map
}

fn extract_job_id(attrs: &IppAttributes) -> Option<i32> {
    for group in attrs.groups_of(DelimiterTag::JobAttributes) {
        if let Some(attr) = group.attributes().get("job-id")
            && let IppValue::Integer(id) = attr.value()
        {
            return Some(*id);
        }
    }
    None
}

fn job_state_reasons(attrs: &IppAttributes) -> Vec<String> {
    let mut reasons = Vec::new();
    for group in attrs.groups_of(DelimiterTag::JobAttributes) {
        if let Some(attr) = group.attributes().get("job-state-reasons") {
            reasons.push(format!("{}", attr.value()));
        }
    }
    reasons
}

fn parse_jobs(attrs: &IppAttributes) -> Vec<RemoteJobInfo> {
    let mut jobs = Vec::new();

    for group in attrs.groups_of(DelimiterTag::JobAttributes) {
        let attributes = group.attributes();

        let job_id = attributes.get("job-id").and_then(|a| {
            if let IppValue::Integer(id) = a.value() {
                Some(*id)
            } else {
                None
            }
        });

        let job_name = attributes
            .get("job-name")
            .map(|a| format!("{}", a.value()))
            .unwrap_or_default();

        let job_state = attributes
            .get("job-state")
            .map(|a| format!("{}", a.value()))
            .unwrap_or_else(|| "unknown".into());

        let job_state_reasons = attributes
            .get("job-state-reasons")
            .map(|a| {
                format!("{}", a.value())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect()
            })
            .unwrap_or_default();

        if let Some(id) = job_id {
            jobs.push(RemoteJobInfo {
                job_id: id,
                job_name,
                job_state,
                job_state_reasons,
            });
        }
    }

    jobs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_invalid_uri() {
        let result = IppClient::new("not a valid uri %%%");
        assert!(result.is_err());
    }

    #[test]
    fn new_accepts_valid_ipp_uri() {
        let client = IppClient::new("ipp://192.168.1.100:631/ipp/print");
        assert!(client.is_ok());
    }

    #[test]
    fn version_chain_steps_down_from_2_0() {
        let pairs: Vec<(u8, u8)> = VERSION_CHAIN.iter().map(|v| version_pair(*v)).collect();
        assert_eq!(pairs, vec![(2, 0), (1, 1), (1, 0)]);
    }

    #[test]
    fn media_col_names_every_member() {
        let params = JobParams::default();
        let attr = media_col_attribute(&params);
        if let IppValue::Collection(members) = attr.value() {
            let names: Vec<&String> = members
                .iter()
                .filter_map(|v| if let IppValue::MemberAttrName(n) = v { Some(n) } else { None })
                .collect();
            assert!(names.iter().any(|n| n.as_str() == "media-type"));
            assert!(names.iter().any(|n| n.as_str() == "media-size"));
            assert!(names.iter().any(|n| n.as_str() == "media-top-margin"));
        } else {
            panic!("expected a Collection value");
        }
    }

    #[test]
    fn source_info_is_readable_once_set() {
        // `set_source_info` is `OnceLock`-backed and process-global, so this
        // test only checks the accessor shape, not first-write-wins races
        // with other tests in this binary.
        set_source_info("mprint-test", "0.0.0", "test-os");
        assert!(source_info().is_some());
    }
}
