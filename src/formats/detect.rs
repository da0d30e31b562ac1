//! Format detection
//!
//! Chooses a parser from weak signals: the filename extension first (cheap,
//! high confidence), then content sniffers in fixed specificity order so a
//! generic sniffer never shadows a specific one. Side-effect free and total:
//! no match yields [`FormatTag::Unknown`], never an error.

use super::FormatTag;
use std::path::Path;

/// Detects the format of a decoded text buffer
///
/// The filename may be absent or extension-less; detection then relies on
/// content alone. Sniffer order, most specific first:
///
/// 1. `##CLIN-EXPORT` self-describing document marker (flat export)
/// 2. `MSH|` leading segment (HL7 v2)
/// 3. JSON object carrying a `"resourceType"` member (FHIR bundle)
/// 4. delimiter in the first line (CSV fallback)
///
/// # Examples
///
/// ```
/// use intake::formats::{detect, FormatTag};
///
/// assert_eq!(detect("MSH|^~\\&|LAB|...", None), FormatTag::Hl7Pipe);
/// assert_eq!(detect("gibberish", Some("data.bin")), FormatTag::Unknown);
/// ```
pub fn detect(content: &str, filename: Option<&str>) -> FormatTag {
    if let Some(tag) = detect_by_extension(filename) {
        return tag;
    }

    let trimmed = content.trim_start();

    if sniff_flat_export(trimmed) {
        return FormatTag::FlatExport;
    }
    if sniff_hl7(trimmed) {
        return FormatTag::Hl7Pipe;
    }
    if sniff_fhir_bundle(trimmed) {
        return FormatTag::FhirBundle;
    }
    if sniff_csv(trimmed) {
        return FormatTag::CsvTable;
    }

    FormatTag::Unknown
}

fn detect_by_extension(filename: Option<&str>) -> Option<FormatTag> {
    let ext = Path::new(filename?).extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "csv" => Some(FormatTag::CsvTable),
        "json" => Some(FormatTag::FhirBundle),
        "hl7" => Some(FormatTag::Hl7Pipe),
        "exp" => Some(FormatTag::FlatExport),
        _ => None,
    }
}

fn sniff_flat_export(content: &str) -> bool {
    content.starts_with("##CLIN-EXPORT")
}

fn sniff_hl7(content: &str) -> bool {
    content.starts_with("MSH|")
}

fn sniff_fhir_bundle(content: &str) -> bool {
    content.starts_with('{') && content.contains("\"resourceType\"")
}

fn sniff_csv(content: &str) -> bool {
    match content.lines().next() {
        Some(first) => first.contains(',') || first.contains(';') || first.contains('\t'),
        None => false,
    }
}
