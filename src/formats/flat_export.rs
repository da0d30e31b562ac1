//! Flat sectioned-text parser
//!
//! Parses the legacy `##CLIN-EXPORT` device dump: a version marker line,
//! then `[PATIENT]` / `[VISIT]` / `[OBS]` sections of `KEY=VALUE` lines.
//! Visits and observations bind to the most recently opened patient section;
//! an observation may name a visit by ordinal with `VISIT=<n>`, otherwise it
//! binds to the most recent visit in the file, or to none if no visit has
//! been opened yet.
//!
//! ```text
//! ##CLIN-EXPORT v1
//! [PATIENT]
//! ID=P1
//! SEX=F
//! [VISIT]
//! START=2024-01-01T10:00:00Z
//! LOCATION=WARD3
//! CLASS=I
//! [OBS]
//! CONCEPT=HR
//! TYPE=N
//! VALUE=72
//! UNIT=bpm
//! ```

use super::{parse_date, parse_timestamp, FormatParser, FormatTag};
use crate::core::options::ImportOptions;
use crate::domain::batch::{BatchMetadata, CanonicalBatch};
use crate::domain::errors::ParseError;
use crate::domain::ids::{PatientCode, VisitHandle};
use crate::domain::records::{ObservationRecord, PatientRecord, ValueKind, ValueSlots, VisitRecord};
use std::collections::HashMap;

/// Parser for `##CLIN-EXPORT` sectioned text dumps
pub struct FlatExportParser;

const MARKER: &str = "##CLIN-EXPORT";
const SUPPORTED_VERSION: &str = "v1";

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    Patient,
    Visit,
    Obs,
}

impl FormatParser for FlatExportParser {
    fn tag(&self) -> FormatTag {
        FormatTag::FlatExport
    }

    fn parse(
        &self,
        content: &str,
        _options: &ImportOptions,
    ) -> Result<CanonicalBatch, ParseError> {
        let mut lines = content.lines().map(str::trim).filter(|l| !l.is_empty());

        let header = lines
            .next()
            .filter(|l| l.starts_with(MARKER))
            .ok_or_else(|| ParseError::malformed("flat_export", "missing ##CLIN-EXPORT marker"))?;
        let version = header[MARKER.len()..].trim();
        if version != SUPPORTED_VERSION {
            return Err(ParseError::UnsupportedVersion(version.to_string()));
        }

        let source = self.tag().source_system();
        let mut batch = CanonicalBatch::new(BatchMetadata::new(source));

        let mut section: Option<Section> = None;
        let mut keys: HashMap<String, String> = HashMap::new();
        let mut section_index = 0usize;
        let mut current_patient: Option<PatientCode> = None;
        let mut current_visit: Option<VisitHandle> = None;

        let flush = |section: Option<Section>,
                     keys: &mut HashMap<String, String>,
                     index: usize,
                     batch: &mut CanonicalBatch,
                     current_patient: &mut Option<PatientCode>,
                     current_visit: &mut Option<VisitHandle>|
         -> Result<(), ParseError> {
            match section {
                None => Ok(()),
                Some(Section::Patient) => {
                    let patient = build_patient(keys, index, source)?;
                    *current_patient = Some(patient.code.clone());
                    *current_visit = None;
                    batch.patients.push(patient);
                    Ok(())
                }
                Some(Section::Visit) => {
                    let patient_code =
                        current_patient.clone().ok_or(ParseError::MissingField {
                            field: "[PATIENT] before [VISIT]".to_string(),
                            index,
                        })?;
                    let handle = VisitHandle::ordinal(batch.visits.len());
                    batch
                        .visits
                        .push(build_visit(keys, handle.clone(), patient_code, source));
                    *current_visit = Some(handle);
                    Ok(())
                }
                Some(Section::Obs) => {
                    let patient_code =
                        current_patient.clone().ok_or(ParseError::MissingField {
                            field: "[PATIENT] before [OBS]".to_string(),
                            index,
                        })?;
                    let obs =
                        build_observation(keys, index, patient_code, current_visit, source)?;
                    batch.observations.push(obs);
                    Ok(())
                }
            }
        };

        for line in lines {
            if line.starts_with('#') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                flush(
                    section,
                    &mut keys,
                    section_index,
                    &mut batch,
                    &mut current_patient,
                    &mut current_visit,
                )?;
                keys.clear();
                section_index += 1;
                section = Some(match name.to_ascii_uppercase().as_str() {
                    "PATIENT" => Section::Patient,
                    "VISIT" => Section::Visit,
                    "OBS" => Section::Obs,
                    other => {
                        return Err(ParseError::malformed(
                            "flat_export",
                            format!("unknown section [{other}]"),
                        ))
                    }
                });
            } else if let Some((key, value)) = line.split_once('=') {
                keys.insert(key.trim().to_ascii_uppercase(), value.trim().to_string());
            } else {
                return Err(ParseError::malformed(
                    "flat_export",
                    format!("unparseable line '{line}'"),
                ));
            }
        }
        flush(
            section,
            &mut keys,
            section_index,
            &mut batch,
            &mut current_patient,
            &mut current_visit,
        )?;

        if batch.is_empty() {
            return Err(ParseError::Empty);
        }
        Ok(batch)
    }
}

fn required(keys: &HashMap<String, String>, key: &str, index: usize) -> Result<String, ParseError> {
    keys.get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ParseError::MissingField {
            field: key.to_string(),
            index,
        })
}

fn build_patient(
    keys: &HashMap<String, String>,
    index: usize,
    source: &str,
) -> Result<PatientRecord, ParseError> {
    let id = required(keys, "ID", index)?;
    let code = PatientCode::new(id).map_err(|_| ParseError::MissingField {
        field: "ID".to_string(),
        index,
    })?;

    let age = match keys.get("AGE").map(|v| v.trim()).filter(|v| !v.is_empty()) {
        Some(raw) => Some(raw.parse().map_err(|_| ParseError::InvalidValue {
            field: "AGE".to_string(),
            index,
            message: format!("'{raw}' is not an integer"),
        })?),
        None => None,
    };

    Ok(PatientRecord {
        code,
        sex_code: keys.get("SEX").cloned().filter(|v| !v.is_empty()),
        age,
        birth_date: keys.get("BIRTH_DATE").and_then(|v| parse_date(v)),
        source: source.to_string(),
    })
}

fn build_visit(
    keys: &HashMap<String, String>,
    handle: VisitHandle,
    patient_code: PatientCode,
    source: &str,
) -> VisitRecord {
    VisitRecord {
        handle,
        patient_code,
        start: keys.get("START").and_then(|v| parse_timestamp(v)),
        end: keys.get("END").and_then(|v| parse_timestamp(v)),
        location_code: keys.get("LOCATION").cloned().filter(|v| !v.is_empty()),
        inpatient: matches!(keys.get("CLASS").map(String::as_str), Some("I") | Some("i")),
        notes: keys
            .get("NOTES")
            .filter(|v| !v.is_empty())
            .map(|v| serde_json::Value::String(v.clone())),
        source: source.to_string(),
    }
}

fn build_observation(
    keys: &HashMap<String, String>,
    index: usize,
    patient_code: PatientCode,
    current_visit: &Option<VisitHandle>,
    source: &str,
) -> Result<ObservationRecord, ParseError> {
    let concept = required(keys, "CONCEPT", index)?;
    let kind: ValueKind = required(keys, "TYPE", index)?
        .parse()
        .map_err(|message| ParseError::InvalidValue {
            field: "TYPE".to_string(),
            index,
            message,
        })?;
    let raw_value = required(keys, "VALUE", index)?;

    let value = match kind {
        ValueKind::Numeric => {
            ValueSlots::numeric(raw_value.parse().map_err(|_| ParseError::InvalidValue {
                field: "VALUE".to_string(),
                index,
                message: format!("'{raw_value}' is not numeric"),
            })?)
        }
        ValueKind::Text => ValueSlots::text(raw_value.clone()),
        ValueKind::Date => {
            ValueSlots::date(parse_date(&raw_value).ok_or_else(|| ParseError::InvalidValue {
                field: "VALUE".to_string(),
                index,
                message: format!("'{raw_value}' is not a date"),
            })?)
        }
        ValueKind::Selection => ValueSlots::selection(raw_value.clone()),
        ValueKind::Finding => ValueSlots::finding(raw_value.clone()),
        ValueKind::Raw => ValueSlots::raw(serde_json::Value::String(raw_value.clone())),
        ValueKind::Questionnaire => {
            ValueSlots::questionnaire(serde_json::Value::String(raw_value.clone()))
        }
    };

    let visit = match keys.get("VISIT").map(|v| v.trim()).filter(|v| !v.is_empty()) {
        Some(raw) => Some(VisitHandle::ordinal(raw.parse().map_err(|_| {
            ParseError::InvalidValue {
                field: "VISIT".to_string(),
                index,
                message: format!("'{raw}' is not a visit ordinal"),
            }
        })?)),
        None => current_visit.clone(),
    };

    let mut obs = ObservationRecord::new(patient_code, concept, kind, value, source);
    obs.visit = visit;
    obs.unit_code = keys.get("UNIT").cloned().filter(|v| !v.is_empty());
    obs.observed_at = keys.get("TIME").and_then(|v| parse_timestamp(v));
    Ok(obs)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
##CLIN-EXPORT v1
[PATIENT]
ID=P1
SEX=F
AGE=47
BIRTH_DATE=1977-03-02
[VISIT]
START=2024-01-01T10:00:00Z
END=2024-01-02T09:00:00Z
LOCATION=WARD3
CLASS=I
[OBS]
CONCEPT=HR
TYPE=N
VALUE=72
UNIT=bpm
TIME=2024-01-01T10:05:00Z
[OBS]
CONCEPT=NOTE
TYPE=T
VALUE=patient stable
[PATIENT]
ID=P2
[OBS]
CONCEPT=SMOKER
TYPE=S
VALUE=never
";

    fn parse(content: &str) -> Result<CanonicalBatch, ParseError> {
        FlatExportParser.parse(content, &ImportOptions::default())
    }

    #[test]
    fn test_parses_sections() {
        let batch = parse(SAMPLE).unwrap();

        assert_eq!(batch.patients.len(), 2);
        assert_eq!(batch.visits.len(), 1);
        assert_eq!(batch.observations.len(), 3);
        assert_eq!(batch.metadata.source_system, "flat-export");
    }

    #[test]
    fn test_observations_bind_to_current_context() {
        let batch = parse(SAMPLE).unwrap();

        assert_eq!(batch.observations[0].visit, Some(VisitHandle::ordinal(0)));
        assert_eq!(batch.observations[1].visit, Some(VisitHandle::ordinal(0)));
        // P2 has no visit section, so the observation floats.
        assert!(batch.observations[2].visit.is_none());
        assert_eq!(batch.observations[2].patient_code.as_str(), "P2");
    }

    #[test]
    fn test_patient_and_visit_fields() {
        let batch = parse(SAMPLE).unwrap();

        assert_eq!(batch.patients[0].age, Some(47));
        assert!(batch.visits[0].inpatient);
        assert_eq!(batch.visits[0].location_code.as_deref(), Some("WARD3"));
    }

    #[test]
    fn test_explicit_visit_ordinal() {
        let content = "\
##CLIN-EXPORT v1
[PATIENT]
ID=P1
[VISIT]
START=2024-01-01
[OBS]
CONCEPT=HR
TYPE=N
VALUE=60
VISIT=0
";
        let batch = parse(content).unwrap();
        assert_eq!(batch.observations[0].visit, Some(VisitHandle::ordinal(0)));
    }

    #[test]
    fn test_missing_marker_rejected() {
        let err = parse("[PATIENT]\nID=P1\n").unwrap_err();
        assert!(matches!(err, ParseError::Malformed { .. }));
    }

    #[test]
    fn test_wrong_version_rejected() {
        let err = parse("##CLIN-EXPORT v2\n[PATIENT]\nID=P1\n").unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedVersion(ref v) if v == "v2"));
    }

    #[test]
    fn test_obs_before_patient_rejected() {
        let content = "##CLIN-EXPORT v1\n[OBS]\nCONCEPT=HR\nTYPE=N\nVALUE=60\n";
        let err = parse(content).unwrap_err();
        assert!(matches!(err, ParseError::MissingField { ref field, .. } if field == "[PATIENT] before [OBS]"));
    }

    #[test]
    fn test_unknown_section_rejected() {
        let err = parse("##CLIN-EXPORT v1\n[DEVICE]\nID=X\n").unwrap_err();
        assert!(matches!(err, ParseError::Malformed { .. }));
    }

    #[test]
    fn test_marker_only_rejected() {
        let err = parse("##CLIN-EXPORT v1\n").unwrap_err();
        assert!(matches!(err, ParseError::Empty));
    }

    #[test]
    fn test_comment_lines_skipped() {
        let content = "##CLIN-EXPORT v1\n# exported 2024-01-05\n[PATIENT]\nID=P1\n";
        let batch = parse(content).unwrap();
        assert_eq!(batch.patients.len(), 1);
    }
}
