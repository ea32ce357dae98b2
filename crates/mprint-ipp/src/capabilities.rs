// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Capability Parser (§4.3): turns a printer's raw Get-Printer-Attributes
// response into a `PrinterCapabilities` the Job Manager and raster pipeline
// can act on directly, instead of re-parsing IPP keywords at every call
// site.

use std::collections::HashSet;

use ipp::attribute::IppAttributes;
use ipp::model::DelimiterTag;
use ipp::value::IppValue;
use tracing::{debug, info};

use mprint_core::error::Result;
use mprint_core::types::{MediaSize, MediaType, PrinterCapabilities};

use crate::ipp_client::IppClient;

/// Vendors whose `media-col-database` custom-size ranges are known to be
/// unreliable (advertise a range the firmware then rejects). Printers
/// whose `printer-make-and-model` contains one of these names have their
/// custom-size range ignored in favor of the canonical table only (§4.3).
const CUSTOM_SIZE_OPT_OUT_VENDORS: &[&str] = &[
    "Brother",
    "Epson",
    "Fuji Xerox",
    "Konica Minolta",
    "Kyocera",
    "Canon",
    "UTAX_TA",
];

/// Build `PrinterCapabilities` from a live Get-Printer-Attributes query.
pub async fn query(client: &IppClient) -> Result<PrinterCapabilities> {
    let attrs = client.get_printer_attributes_raw().await?;
    Ok(parse(&attrs))
}

/// Parse a `PrinterCapabilities` record from a raw IPP attribute set.
pub fn parse(attrs: &IppAttributes) -> PrinterCapabilities {
    let op_group = attrs.groups_of(DelimiterTag::PrinterAttributes).next();
    let get = |name: &str| op_group.and_then(|g| g.attributes().get(name));
    let get_all = |name: &str| -> Vec<String> {
        op_group
            .map(|g| {
                g.attributes()
                    .get(name)
                    .map(|a| values_to_strings(a.value()))
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    };

    let make_and_model = get("printer-make-and-model").map(value_to_string);
    let name = get("printer-name").map(value_to_string);
    let uuid = get("printer-uuid").map(value_to_string);
    let location = get("printer-location").map(value_to_string);
    let uri = get("printer-uri-supported").map(value_to_string);

    let sides_supported: HashSet<String> = get_all("sides-supported").into_iter().collect();
    let formats_supported: HashSet<String> = get_all("document-format-supported").into_iter().collect();
    let color_modes: HashSet<String> = get_all("print-color-mode-supported").into_iter().collect();

    let supports_duplex = sides_supported.iter().any(|s| s.starts_with("two-sided"));
    let supports_color = color_modes.contains("color") || color_modes.is_empty();
    let supports_pdf = formats_supported.contains("application/pdf");
    let supports_pclm = formats_supported.contains("application/PCLm");
    let supports_pwg = formats_supported.contains("image/pwg-raster");

    let media_supported: HashSet<String> = get_all("media-supported").into_iter().collect();
    let media_size_name_supported = !media_supported.is_empty();
    let custom_range = if trust_custom_size_range(make_and_model.as_deref()) {
        custom_size_range(&media_supported)
    } else {
        None
    };
    let media_sizes = canonical_sizes_present(&media_supported, custom_range);

    let media_types = get_all("media-type-supported")
        .iter()
        .filter_map(|s| bucket_media_type(s))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let media_trays = get_all("media-source-supported");

    let resolutions_dpi = get_all("printer-resolution-supported")
        .iter()
        .filter_map(|s| parse_square_dpi(s))
        .collect();

    let (ipp_version_major, ipp_version_minor) = highest_supported_version(&get_all("ipp-versions-supported"));

    let face_down_tray = make_and_model
        .as_deref()
        .map(|m| face_down_tray_heuristic(m))
        .unwrap_or(true);

    let margin_floors_mm100 = (
        margin_floor(get("media-top-margin-supported")),
        margin_floor(get("media-bottom-margin-supported")),
        margin_floor(get("media-left-margin-supported")),
        margin_floor(get("media-right-margin-supported")),
    );
    let supports_borderless = margin_floors_mm100 == (0, 0, 0, 0) && !media_supported.is_empty();

    let strip_height_raw = get("pclm-strip-height-preferred")
        .and_then(|a| integer_value(a.value()))
        .unwrap_or(0);
    let strip_height = clamp_strip_height(strip_height_raw);

    let can_copy = get("copies-supported").is_some();

    let caps = PrinterCapabilities {
        make_and_model,
        name,
        uuid,
        location,
        uri,
        supports_duplex,
        supports_borderless,
        supports_color,
        supports_pdf,
        supports_pclm,
        supports_pwg,
        face_down_tray,
        rotatable_back_page: supports_duplex,
        media_size_name_supported,
        can_copy,
        media_sizes,
        media_trays,
        media_types,
        resolutions_dpi,
        ipp_version_major,
        ipp_version_minor,
        epcl_version: get("epcl-version").map(value_to_string),
        strip_height,
        margin_floors_mm100,
        source_app_name: None,
        source_app_version: None,
        source_os_name: None,
        source_os_version: None,
    };

    info!(
        duplex = caps.supports_duplex,
        color = caps.supports_color,
        media_sizes = caps.media_sizes.len(),
        "parsed printer capabilities"
    );

    caps
}

/// Coerce an advertised strip height to `[16, 256]`, treating `0` ("send
/// whole page, no strip preference") as a request for the minimum strip
/// size rather than a literal zero-row strip (§9 Open Questions (a)).
fn clamp_strip_height(advertised: i64) -> u32 {
    if advertised <= 0 {
        16
    } else {
        (advertised as u32).clamp(16, 256)
    }
}

/// Canonical sizes a printer advertises directly, plus (when given) every
/// canonical size whose dimensions fall inside a `custom_min_*`/
/// `custom_max_*` range the printer separately advertised (§4.3).
fn canonical_sizes_present(keywords: &HashSet<String>, custom_range: Option<((u32, u32), (u32, u32))>) -> Vec<MediaSize> {
    let mut sizes: Vec<MediaSize> = if keywords.is_empty() {
        MediaSize::canonical().to_vec()
    } else {
        MediaSize::canonical()
            .iter()
            .filter(|size| keywords.contains(&size.pwg_keyword()))
            .copied()
            .collect()
    };

    if let Some(((min_w, min_h), (max_w, max_h))) = custom_range {
        for size in MediaSize::canonical() {
            if sizes.contains(size) {
                continue;
            }
            let (w, h) = size.dimensions_mm();
            let portrait_fits = w >= min_w && w <= max_w && h >= min_h && h <= max_h;
            let landscape_fits = h >= min_w && h <= max_w && w >= min_h && w <= max_h;
            if portrait_fits || landscape_fits {
                sizes.push(*size);
            }
        }
    }

    sizes
}

/// Scan `media-supported` for PWG 5101.1 `custom_min_WxHmm` /
/// `custom_max_WxHmm` keywords and return `(min, max)` in millimeters when
/// both are present (§4.3).
fn custom_size_range(media_supported: &HashSet<String>) -> Option<((u32, u32), (u32, u32))> {
    let min = media_supported
        .iter()
        .find_map(|kw| parse_custom_mm(kw, "custom_min_"))?;
    let max = media_supported
        .iter()
        .find_map(|kw| parse_custom_mm(kw, "custom_max_"))?;
    Some((min, max))
}

/// Parse a single `custom_min_WxHmm` / `custom_max_WxHmm` keyword into its
/// `(width_mm, height_mm)` pair.
fn parse_custom_mm(keyword: &str, prefix: &str) -> Option<(u32, u32)> {
    let rest = keyword.strip_prefix(prefix)?;
    let rest = rest.strip_suffix("mm")?;
    let (w, h) = rest.split_once('x')?;
    Some((w.parse().ok()?, h.parse().ok()?))
}

/// Whether this printer's advertised custom-size range should be trusted,
/// per the vendor opt-out table (§4.3, §9 Open Questions (c)).
pub fn trust_custom_size_range(make_and_model: Option<&str>) -> bool {
    match make_and_model {
        Some(model) => !CUSTOM_SIZE_OPT_OUT_VENDORS
            .iter()
            .any(|vendor| model.contains(vendor)),
        None => true,
    }
}

fn bucket_media_type(keyword: &str) -> Option<MediaType> {
    let lower = keyword.to_ascii_lowercase();
    if lower.contains("glossy") {
        Some(MediaType::PhotoGlossy)
    } else if lower.contains("photo") {
        Some(MediaType::Photo)
    } else if lower.contains("stationery") || lower.contains("plain") {
        Some(MediaType::Plain)
    } else {
        None
    }
}

/// Parse a `printer-resolution-supported` value of the form `"600x600dpi"`
/// and keep only square resolutions — the raster pipeline has no support
/// for anisotropic pixel aspect ratios.
fn parse_square_dpi(value: &str) -> Option<u32> {
    let lower = value.to_ascii_lowercase();
    let stripped = lower.strip_suffix("dpi").unwrap_or(&lower);
    let (x, y) = stripped.split_once('x')?;
    let x: u32 = x.trim().parse().ok()?;
    let y: u32 = y.trim().parse().ok()?;
    if x == y {
        Some(x)
    } else {
        debug!(x, y, "dropping anisotropic resolution");
        None
    }
}

fn highest_supported_version(versions: &[String]) -> (u8, u8) {
    let mut best = (1, 0);
    for v in versions {
        if let Some((major, minor)) = v.split_once('.') {
            if let (Ok(major), Ok(minor)) = (major.parse::<u8>(), minor.parse::<u8>())
                && (major, minor) > best
            {
                best = (major, minor);
            }
        }
    }
    best
}

fn face_down_tray_heuristic(make_and_model: &str) -> bool {
    !make_and_model.to_ascii_lowercase().contains("face-up only")
}

fn margin_floor(attr: Option<&ipp::attribute::IppAttribute>) -> u32 {
    attr.and_then(|a| integer_value(a.value())).unwrap_or(0).max(0) as u32
}

fn integer_value(value: &IppValue) -> Option<i64> {
    match value {
        IppValue::Integer(i) => Some(*i as i64),
        IppValue::RangeOfInteger { min, .. } => Some(*min as i64),
        _ => None,
    }
}

fn value_to_string(attr: &ipp::attribute::IppAttribute) -> String {
    format!("{}", attr.value())
}

fn values_to_strings(value: &IppValue) -> Vec<String> {
    match value {
        IppValue::Array(values) => values.iter().map(|v| format!("{v}")).collect(),
        other => format!("{other}")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_height_zero_coerces_to_sixteen() {
        assert_eq!(clamp_strip_height(0), 16);
    }

    #[test]
    fn strip_height_clamped_to_max() {
        assert_eq!(clamp_strip_height(4096), 256);
    }

    #[test]
    fn square_dpi_parses() {
        assert_eq!(parse_square_dpi("600x600dpi"), Some(600));
    }

    #[test]
    fn anisotropic_dpi_is_dropped() {
        assert_eq!(parse_square_dpi("600x300dpi"), None);
    }

    #[test]
    fn opted_out_vendor_does_not_trust_custom_range() {
        assert!(!trust_custom_size_range(Some("Brother HL-L2395DW")));
        assert!(trust_custom_size_range(Some("HP LaserJet Pro")));
        assert!(trust_custom_size_range(None));
    }

    #[test]
    fn empty_media_keywords_falls_back_to_full_canonical_table() {
        let sizes = canonical_sizes_present(&HashSet::new(), None);
        assert_eq!(sizes.len(), MediaSize::canonical().len());
    }

    #[test]
    fn custom_range_additively_includes_sizes_inside_bounds() {
        let keywords: HashSet<String> = [
            MediaSize::JisB5.pwg_keyword(),
            "custom_min_36x127mm".to_string(),
            "custom_max_216x1200mm".to_string(),
        ]
        .into_iter()
        .collect();
        let range = custom_size_range(&keywords);
        assert_eq!(range, Some(((36, 127), (216, 1200))));
        let sizes = canonical_sizes_present(&keywords, range);
        assert!(sizes.contains(&MediaSize::JisB5));
        assert!(sizes.contains(&MediaSize::NaLetter));
        assert!(sizes.contains(&MediaSize::IsoA4));
    }

    #[test]
    fn custom_range_is_none_without_both_keywords() {
        let keywords: HashSet<String> = ["custom_min_36x127mm".to_string()].into_iter().collect();
        assert_eq!(custom_size_range(&keywords), None);
    }

    #[test]
    fn media_type_bucketing() {
        assert_eq!(bucket_media_type("photographic-glossy"), Some(MediaType::PhotoGlossy));
        assert_eq!(bucket_media_type("photographic"), Some(MediaType::Photo));
        assert_eq!(bucket_media_type("stationery"), Some(MediaType::Plain));
        assert_eq!(bucket_media_type("envelope"), None);
    }

    #[test]
    fn version_picks_highest() {
        let versions = vec!["1.0".to_string(), "2.0".to_string(), "1.1".to_string()];
        assert_eq!(highest_supported_version(&versions), (2, 0));
    }
}
