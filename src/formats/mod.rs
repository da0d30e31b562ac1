//! Format plugins
//!
//! Each supported external format is a pluggable parser implementing
//! [`FormatParser`]: raw content in, [`CanonicalBatch`] out, no store I/O.
//! The orchestrator picks a parser via [`detect`] and the tag-keyed
//! [`parser_for`] dispatch, so adding a format never touches the
//! orchestrator.

pub mod csv_table;
pub mod detect;
pub mod fhir_bundle;
pub mod flat_export;
pub mod hl7_pipe;

pub use detect::detect;

use crate::core::options::ImportOptions;
use crate::domain::batch::CanonicalBatch;
use crate::domain::errors::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag identifying a supported external format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatTag {
    /// Delimited tabular export, one observation per row
    CsvTable,
    /// FHIR-style JSON bundle of Patient/Encounter/Observation resources
    FhirBundle,
    /// HL7 v2-style pipe-delimited segments (MSH/PID/PV1/OBX)
    Hl7Pipe,
    /// Sectioned KEY=VALUE text export with a `##CLIN-EXPORT` marker
    FlatExport,
    /// No parser matched
    Unknown,
}

impl FormatTag {
    /// Short name used in logs and CLI output
    pub fn as_str(&self) -> &'static str {
        match self {
            FormatTag::CsvTable => "csv_table",
            FormatTag::FhirBundle => "fhir_bundle",
            FormatTag::Hl7Pipe => "hl7_pipe",
            FormatTag::FlatExport => "flat_export",
            FormatTag::Unknown => "unknown",
        }
    }

    /// Provenance tag stamped onto records parsed from this format
    pub fn source_system(&self) -> &'static str {
        match self {
            FormatTag::CsvTable => "csv",
            FormatTag::FhirBundle => "fhir",
            FormatTag::Hl7Pipe => "hl7v2",
            FormatTag::FlatExport => "flat-export",
            FormatTag::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parser plugin contract
///
/// Implementations transform raw decoded text into the canonical import
/// model or return a structured [`ParseError`]. Parsers must not perform
/// store I/O; identifier resolution belongs to the reconciliation engine.
pub trait FormatParser: Send + Sync {
    /// The format this parser handles
    fn tag(&self) -> FormatTag;

    /// Parses content into the canonical import model
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] when the content is malformed or, under
    /// strict validation, when a record is missing a required field.
    fn parse(&self, content: &str, options: &ImportOptions)
        -> Result<CanonicalBatch, ParseError>;
}

/// Returns the parser for a detected format tag
///
/// `FormatTag::Unknown` has no parser; the orchestrator turns it into an
/// `UNSUPPORTED_FORMAT` envelope before ever reaching this point.
pub fn parser_for(tag: FormatTag) -> Option<Box<dyn FormatParser>> {
    match tag {
        FormatTag::CsvTable => Some(Box::new(csv_table::CsvTableParser)),
        FormatTag::FhirBundle => Some(Box::new(fhir_bundle::FhirBundleParser)),
        FormatTag::Hl7Pipe => Some(Box::new(hl7_pipe::Hl7PipeParser)),
        FormatTag::FlatExport => Some(Box::new(flat_export::FlatExportParser)),
        FormatTag::Unknown => None,
    }
}

/// Parses a timestamp in any of the shapes the source systems emit:
/// RFC 3339, naive `YYYY-MM-DDTHH:MM:SS`, HL7 `YYYYMMDDHHMMSS` (seconds and
/// minutes optional), or a bare date (taken as midnight UTC).
pub(crate) fn parse_timestamp(raw: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y%m%d%H%M%S", "%Y%m%d%H%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    parse_date(raw)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
}

/// Parses a date as `YYYY-MM-DD` or compact `YYYYMMDD`
pub(crate) fn parse_date(raw: &str) -> Option<chrono::NaiveDate> {
    let raw = raw.trim();
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| chrono::NaiveDate::parse_from_str(raw, "%Y%m%d"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_shapes() {
        assert!(parse_timestamp("2024-01-01T10:00:00Z").is_some());
        assert!(parse_timestamp("2024-01-01T10:00:00").is_some());
        assert!(parse_timestamp("20240101100000").is_some());
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("  ").is_none());
    }

    #[test]
    fn test_bare_date_becomes_midnight_utc() {
        use chrono::TimeZone;
        let expected = chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-01"), Some(expected));
        assert_eq!(parse_timestamp("20240101"), Some(expected));
    }

    #[test]
    fn test_parse_date_shapes() {
        assert!(parse_date("1977-03-02").is_some());
        assert_eq!(parse_date("19770302"), parse_date("1977-03-02"));
        assert!(parse_date("03/02/1977").is_none());
    }

    #[test]
    fn test_format_tag_names() {
        assert_eq!(FormatTag::CsvTable.as_str(), "csv_table");
        assert_eq!(FormatTag::Hl7Pipe.source_system(), "hl7v2");
        assert_eq!(FormatTag::Unknown.to_string(), "unknown");
    }

    #[test]
    fn test_parser_dispatch_covers_all_known_formats() {
        for tag in [
            FormatTag::CsvTable,
            FormatTag::FhirBundle,
            FormatTag::Hl7Pipe,
            FormatTag::FlatExport,
        ] {
            let parser = parser_for(tag).expect("known format must have a parser");
            assert_eq!(parser.tag(), tag);
        }
        assert!(parser_for(FormatTag::Unknown).is_none());
    }
}
