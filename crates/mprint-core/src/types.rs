// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the mobile print job pipeline: the job handle and
// its state machine, job parameters, printer capabilities, and the
// page-queue/printer-state vocabulary shared by every other crate.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Job handle
// ---------------------------------------------------------------------------

/// Opaque token naming a slot in the job table.
///
/// Encodes `(index, generation)` in a single `u32` so a stale handle from a
/// recycled slot can never be mistaken for the slot's current occupant —
/// the generation half is bumped every time a slot transitions out of
/// `Free`. Decoding a handle only tells you which slot to look at; whether
/// the handle is still *live* is a property of the slot, not the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle(u32);

const INDEX_BITS: u32 = 16;
const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;

impl JobHandle {
    pub fn encode(index: u16, generation: u16) -> Self {
        Self(((generation as u32) << INDEX_BITS) | (index as u32 & INDEX_MASK))
    }

    pub fn index(&self) -> u16 {
        (self.0 & INDEX_MASK) as u16
    }

    pub fn generation(&self) -> u16 {
        (self.0 >> INDEX_BITS) as u16
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Job state machine
// ---------------------------------------------------------------------------

/// Lifecycle state of a job slot.
///
/// `Free → Queued → Running ↔ Blocked → CancelRequest →
/// {Cancelled, Completed, Error, Corrupted} → Free`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Free,
    Queued,
    Running,
    Blocked,
    CancelRequest,
    Cancelled,
    Completed,
    Error,
    Corrupted,
}

impl JobState {
    /// True once the job has reached any of the four terminal states.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Completed | Self::Error | Self::Corrupted
        )
    }
}

/// Outcome reported to the caller alongside the terminal `Done` callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobResult {
    Ok,
    Error,
    Cancelled,
    Corrupt,
}

/// The four callback-visible phases named in the submission interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallbackPhase {
    Queued,
    Running,
    Blocked,
    Done,
}

bitflags::bitflags! {
    /// Reasons a job may be blocked, or why it finished the way it did.
    ///
    /// Mirrors the flat printer reason-code domain the status monitor
    /// reports; kept as a bitmask so it can diff "did the reason set
    /// change" with one XOR rather than a set comparison.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct BlockReasons: u32 {
        const OFFLINE             = 1 << 0;
        const BUSY                = 1 << 1;
        const CANCELLED           = 1 << 2;
        const OUT_OF_PAPER        = 1 << 3;
        const OUT_OF_INK          = 1 << 4;
        const OUT_OF_TONER        = 1 << 5;
        const JAMMED              = 1 << 6;
        const DOOR_OPEN           = 1 << 7;
        const SERVICE_REQUEST     = 1 << 8;
        const LOW_ON_INK          = 1 << 9;
        const LOW_ON_TONER        = 1 << 10;
        const REALLY_LOW_ON_INK   = 1 << 11;
        const UNKNOWN             = 1 << 12;
        const UNABLE_TO_CONNECT   = 1 << 13;
        const PARTIAL_CANCEL      = 1 << 14;
    }
}

impl BlockReasons {
    /// Render as the lower-case, hyphenless names used in the external
    /// callback contract (§6), e.g. `OUT_OF_PAPER` → `"out-of-paper"`.
    pub fn names(&self) -> Vec<&'static str> {
        let table: &[(Self, &str)] = &[
            (Self::OFFLINE, "offline"),
            (Self::BUSY, "busy"),
            (Self::CANCELLED, "cancelled"),
            (Self::OUT_OF_PAPER, "out-of-paper"),
            (Self::OUT_OF_INK, "out-of-ink"),
            (Self::OUT_OF_TONER, "out-of-toner"),
            (Self::JAMMED, "jammed"),
            (Self::DOOR_OPEN, "door-open"),
            (Self::SERVICE_REQUEST, "service-request"),
            (Self::LOW_ON_INK, "low-on-ink"),
            (Self::LOW_ON_TONER, "low-on-toner"),
            (Self::REALLY_LOW_ON_INK, "really-low-on-ink"),
            (Self::UNKNOWN, "unknown"),
            (Self::UNABLE_TO_CONNECT, "unable-to-connect"),
            (Self::PARTIAL_CANCEL, "partial-cancel"),
        ];
        table
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

bitflags::bitflags! {
    /// Job rendering flags (§3 `JobParams`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct RenderFlags: u32 {
        const AUTO_ROTATE        = 1 << 0;
        const AUTO_SCALE         = 1 << 1;
        const AUTO_FIT           = 1 << 2;
        const PORTRAIT           = 1 << 3;
        const LANDSCAPE          = 1 << 4;
        const CENTER_H           = 1 << 5;
        const CENTER_V           = 1 << 6;
        const CENTER_ON_ORIENTATION = 1 << 7;
        const ROTATE_BACK_PAGE   = 1 << 8;
        const DOCUMENT_SCALING   = 1 << 9;
    }
}

// ---------------------------------------------------------------------------
// Media size, type, duplex, color space
// ---------------------------------------------------------------------------

/// Canonical media sizes this crate's Capability Parser recognizes, plus an
/// open `Custom` case. This is the subset of the PCL media-ID numeration
/// reachable from IPP `media`/`media-size-name` keywords, not the full
/// driver-ID enumeration — job handling never sees a raw PCL media ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaSize {
    NaLetter,
    NaLegal,
    NaLedger,
    IsoA3,
    IsoA4,
    IsoA5,
    JisB4,
    JisB5,
    Photo4x6,
    Photo5x7,
    Custom { width_mm: u32, height_mm: u32 },
}

impl MediaSize {
    /// `(width_mm, height_mm)`.
    pub fn dimensions_mm(&self) -> (u32, u32) {
        match self {
            Self::NaLetter => (216, 279),
            Self::NaLegal => (216, 356),
            Self::NaLedger => (279, 432),
            Self::IsoA3 => (297, 420),
            Self::IsoA4 => (210, 297),
            Self::IsoA5 => (148, 210),
            Self::JisB4 => (257, 364),
            Self::JisB5 => (182, 257),
            Self::Photo4x6 => (102, 152),
            Self::Photo5x7 => (127, 178),
            Self::Custom {
                width_mm,
                height_mm,
            } => (*width_mm, *height_mm),
        }
    }

    /// PWG self-describing `media` keyword.
    pub fn pwg_keyword(&self) -> String {
        match self {
            Self::NaLetter => "na_letter_8.5x11in".into(),
            Self::NaLegal => "na_legal_8.5x14in".into(),
            Self::NaLedger => "na_ledger_11x17in".into(),
            Self::IsoA3 => "iso_a3_297x420mm".into(),
            Self::IsoA4 => "iso_a4_210x297mm".into(),
            Self::IsoA5 => "iso_a5_148x210mm".into(),
            Self::JisB4 => "jis_b4_257x364mm".into(),
            Self::JisB5 => "jis_b5_182x257mm".into(),
            Self::Photo4x6 => "na_index-4x6_4x6in".into(),
            Self::Photo5x7 => "na_5x7_5x7in".into(),
            Self::Custom {
                width_mm,
                height_mm,
            } => format!("custom_{width_mm}x{height_mm}mm_{width_mm}x{height_mm}mm"),
        }
    }

    /// All canonical (non-custom) sizes, in the order the Capability Parser
    /// matches them against a printer's advertised keywords.
    pub fn canonical() -> &'static [MediaSize] {
        &[
            Self::NaLetter,
            Self::NaLegal,
            Self::NaLedger,
            Self::IsoA3,
            Self::IsoA4,
            Self::IsoA5,
            Self::JisB4,
            Self::JisB5,
            Self::Photo4x6,
            Self::Photo5x7,
        ]
    }
}

/// Media-type bucket (§4.3 bucketing of IPP `media-type` keywords).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    Plain,
    Photo,
    PhotoGlossy,
}

/// Duplex printing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplexMode {
    None,
    LongEdge,
    ShortEdge,
}

impl DuplexMode {
    pub fn is_duplex(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// IPP `sides` keyword.
    pub fn ipp_sides_keyword(&self) -> &'static str {
        match self {
            Self::None => "one-sided",
            Self::LongEdge => "two-sided-long-edge",
            Self::ShortEdge => "two-sided-short-edge",
        }
    }
}

/// Job color space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorSpace {
    Mono,
    Srgb,
    AdobeRgb,
}

impl ColorSpace {
    /// IPP `print-color-mode` keyword.
    pub fn ipp_keyword(&self) -> &'static str {
        match self {
            Self::Mono => "monochrome",
            Self::Srgb => "color",
            Self::AdobeRgb => "color",
        }
    }
}

/// Wire format the Job Manager will produce for this job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrintFormat {
    Pdf,
    Pclm,
    Pwg,
    Auto,
}

impl PrintFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Pclm => "application/PCLm",
            Self::Pwg => "image/pwg-raster",
            Self::Auto => "application/octet-stream",
        }
    }
}

/// Integer pixel margins (device space).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelMargins {
    pub top: u32,
    pub left: u32,
    pub right: u32,
    pub bottom: u32,
}

impl PixelMargins {
    pub fn borderless() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.top == 0 && self.left == 0 && self.right == 0 && self.bottom == 0
    }
}

/// Float inch margins, as carried alongside pixel margins in `JobParams`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InchMargins {
    pub top: f32,
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
}

// ---------------------------------------------------------------------------
// Job parameters
// ---------------------------------------------------------------------------

/// Full job parameter set, negotiated between `get_default_job_params()`
/// and `get_final_job_params()` once printer capabilities are known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobParams {
    pub media_size: MediaSize,
    pub media_type: MediaType,
    pub duplex: DuplexMode,
    pub color_space: ColorSpace,
    pub media_tray: Option<String>,
    pub copies: u32,
    pub borderless: bool,
    pub render_flags: RenderFlags,
    pub pixel_margins: PixelMargins,
    pub inch_margins: InchMargins,
    pub pixel_units: u32,
    pub width_px: u32,
    pub height_px: u32,
    pub strip_height: u32,
    pub cancelled: bool,
    pub page_num: u32,
    pub copy_num: u32,
    pub page_backside: bool,
    pub print_format: PrintFormat,
    pub ipp_version_major: u8,
    pub ipp_version_minor: u8,
    pub copies_supported: bool,
    pub page_range: Option<String>,
    pub job_name: String,
    pub user_name: String,
    pub user_agent: Option<String>,
    pub pdf_render_resolution: u32,
}

impl Default for JobParams {
    fn default() -> Self {
        Self {
            media_size: MediaSize::IsoA4,
            media_type: MediaType::Plain,
            duplex: DuplexMode::None,
            color_space: ColorSpace::Srgb,
            media_tray: None,
            copies: 1,
            borderless: false,
            render_flags: RenderFlags::AUTO_FIT,
            pixel_margins: PixelMargins::default(),
            inch_margins: InchMargins::default(),
            pixel_units: 300,
            width_px: 2480,
            height_px: 3508,
            strip_height: 16,
            cancelled: false,
            page_num: 0,
            copy_num: 1,
            page_backside: false,
            print_format: PrintFormat::Auto,
            ipp_version_major: 2,
            ipp_version_minor: 0,
            copies_supported: false,
            page_range: None,
            job_name: "Print Job".to_string(),
            user_name: "anonymous".to_string(),
            user_agent: None,
            pdf_render_resolution: 300,
        }
    }
}

// ---------------------------------------------------------------------------
// Printer capabilities
// ---------------------------------------------------------------------------

/// Capabilities queried live from the printer via `Get-Printer-Attributes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterCapabilities {
    pub make_and_model: Option<String>,
    pub name: Option<String>,
    pub uuid: Option<String>,
    pub location: Option<String>,
    pub uri: Option<String>,
    pub supports_duplex: bool,
    pub supports_borderless: bool,
    pub supports_color: bool,
    pub supports_pdf: bool,
    pub supports_pclm: bool,
    pub supports_pwg: bool,
    pub face_down_tray: bool,
    pub rotatable_back_page: bool,
    pub media_size_name_supported: bool,
    pub can_copy: bool,
    pub media_sizes: Vec<MediaSize>,
    pub media_trays: Vec<String>,
    pub media_types: Vec<MediaType>,
    pub resolutions_dpi: Vec<u32>,
    pub ipp_version_major: u8,
    pub ipp_version_minor: u8,
    pub epcl_version: Option<String>,
    /// Preferred PCLm strip height, already clamped to `[16, 256]` — a
    /// printer-advertised `0` ("send whole page") is coerced to `16`.
    pub strip_height: u32,
    /// Margin floors, hundredths of a millimeter (top, bottom, left, right).
    pub margin_floors_mm100: (u32, u32, u32, u32),
    pub source_app_name: Option<String>,
    pub source_app_version: Option<String>,
    pub source_os_name: Option<String>,
    pub source_os_version: Option<String>,
}

impl Default for PrinterCapabilities {
    fn default() -> Self {
        Self {
            make_and_model: None,
            name: None,
            uuid: None,
            location: None,
            uri: None,
            supports_duplex: false,
            supports_borderless: false,
            supports_color: false,
            supports_pdf: false,
            supports_pclm: false,
            supports_pwg: false,
            face_down_tray: true,
            rotatable_back_page: false,
            media_size_name_supported: false,
            can_copy: false,
            media_sizes: Vec::new(),
            media_trays: Vec::new(),
            media_types: Vec::new(),
            resolutions_dpi: Vec::new(),
            ipp_version_major: 1,
            ipp_version_minor: 1,
            epcl_version: None,
            strip_height: 16,
            margin_floors_mm100: (0, 0, 0, 0),
            source_app_name: None,
            source_app_version: None,
            source_os_name: None,
            source_os_version: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Page queue entry
// ---------------------------------------------------------------------------

/// Fixed capacity of the per-job page queue (§3 invariant).
pub const MAX_PAGES_PER_JOB: usize = 1000;

/// One entry delivered to the worker via `page()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageQueueEntry {
    pub page_num: u32,
    pub is_pdf_page: bool,
    pub is_last_page: bool,
    pub corrupted: bool,
    /// Empty pathname is the cancellation sentinel (§4.1).
    pub pathname: String,
    pub margin_override: Option<PixelMargins>,
}

impl PageQueueEntry {
    /// The sentinel page posted to unblock a cancelled job's page-queue
    /// receive (§4.1 "Cancellation").
    pub fn cancel_sentinel(page_num: u32) -> Self {
        Self {
            page_num,
            is_pdf_page: false,
            is_last_page: true,
            corrupted: false,
            pathname: String::new(),
            margin_override: None,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.pathname.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Printer state
// ---------------------------------------------------------------------------

/// Normalized printer status (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrinterStatus {
    Initializing,
    ShuttingDown,
    UnableToConnect,
    Unknown,
    Offline,
    Busy,
    Cancelled,
    Idle,
    Printing,
    Jammed,
    OutOfPaper,
    OutOfInk,
    OutOfToner,
    DoorOpen,
    SvcRequest,
    LowOnInk,
    LowOnToner,
    VeryLowOnInk,
    PartialCancel,
}

/// Full printer state snapshot as reported by the Status Monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterState {
    pub status: PrinterStatus,
    pub reasons: Vec<PrinterStatus>,
    pub blocked_reasons: BlockReasons,
}

// ---------------------------------------------------------------------------
// Connection parameters
// ---------------------------------------------------------------------------

/// URI scheme used to reach a printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UriScheme {
    Ipp,
    Ipps,
}

impl UriScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ipp => "ipp",
            Self::Ipps => "ipps",
        }
    }
}

/// Parameters needed to open a connection to a printer, as passed to
/// `get_capabilities` and `start_job`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectInfo {
    pub addr: String,
    pub port: u16,
    pub uri_path: String,
    pub scheme: UriScheme,
    pub timeout_ms: u64,
}

impl ConnectInfo {
    pub fn uri(&self) -> String {
        format!(
            "{}://{}:{}{}",
            self.scheme.as_str(),
            self.addr,
            self.port,
            self.uri_path
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_handle_round_trips_index_and_generation() {
        let handle = JobHandle::encode(42, 7);
        assert_eq!(handle.index(), 42);
        assert_eq!(handle.generation(), 7);
    }

    #[test]
    fn job_handle_distinguishes_generations_of_same_slot() {
        let a = JobHandle::encode(3, 1);
        let b = JobHandle::encode(3, 2);
        assert_ne!(a, b);
        assert_eq!(a.index(), b.index());
    }

    #[test]
    fn block_reasons_names_only_set_bits() {
        let reasons = BlockReasons::OUT_OF_PAPER | BlockReasons::JAMMED;
        let names = reasons.names();
        assert!(names.contains(&"out-of-paper"));
        assert!(names.contains(&"jammed"));
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn job_state_terminal_classification() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(!JobState::Blocked.is_terminal());
    }

    #[test]
    fn duplex_mode_reports_is_duplex() {
        assert!(!DuplexMode::None.is_duplex());
        assert!(DuplexMode::LongEdge.is_duplex());
        assert!(DuplexMode::ShortEdge.is_duplex());
    }

    #[test]
    fn pixel_margins_borderless_is_zero() {
        assert!(PixelMargins::borderless().is_zero());
    }

    #[test]
    fn connect_info_formats_uri() {
        let info = ConnectInfo {
            addr: "192.168.1.50".into(),
            port: 631,
            uri_path: "/ipp/print".into(),
            scheme: UriScheme::Ipp,
            timeout_ms: 15_000,
        };
        assert_eq!(info.uri(), "ipp://192.168.1.50:631/ipp/print");
    }
}
