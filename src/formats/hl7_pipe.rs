//! HL7 v2-style pipe-delimited parser
//!
//! Reads a message as newline-separated segments. `PID` opens a patient
//! context, `PV1` opens a visit under the current patient, and `OBX` emits an
//! observation attached to the current visit when one is open. Only the
//! fields this importer has a canonical counterpart for are read; everything
//! else is passed over.
//!
//! Field positions follow the common v2 layout: PID-3 patient id, PID-7 date
//! of birth, PID-8 sex; PV1-2 patient class, PV1-3 location, PV1-44 admit
//! time, PV1-45 discharge time; OBX-2 value type, OBX-3 concept, OBX-5
//! value, OBX-6 units, OBX-14 observation time.

use super::{parse_date, parse_timestamp, FormatParser, FormatTag};
use crate::core::options::ImportOptions;
use crate::domain::batch::{BatchMetadata, CanonicalBatch};
use crate::domain::errors::ParseError;
use crate::domain::ids::{PatientCode, VisitHandle};
use crate::domain::records::{ObservationRecord, PatientRecord, ValueKind, ValueSlots, VisitRecord};

/// Parser for HL7 v2-style pipe-delimited messages
pub struct Hl7PipeParser;

impl FormatParser for Hl7PipeParser {
    fn tag(&self) -> FormatTag {
        FormatTag::Hl7Pipe
    }

    fn parse(
        &self,
        content: &str,
        _options: &ImportOptions,
    ) -> Result<CanonicalBatch, ParseError> {
        let source = self.tag().source_system();
        let mut batch = CanonicalBatch::new(BatchMetadata::new(source));

        let mut current_patient: Option<PatientCode> = None;
        let mut current_visit: Option<VisitHandle> = None;
        let mut saw_msh = false;

        // Segments may be separated by \r (wire form) or \n (file form).
        for (index, segment) in content
            .split(['\r', '\n'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .enumerate()
        {
            let fields: Vec<&str> = segment.split('|').collect();
            match fields[0] {
                "MSH" => saw_msh = true,
                "PID" => {
                    let patient = parse_pid(&fields, index, source)?;
                    current_patient = Some(patient.code.clone());
                    current_visit = None;
                    batch.patients.push(patient);
                }
                "PV1" => {
                    let patient_code =
                        current_patient.clone().ok_or(ParseError::MissingField {
                            field: "PID before PV1".to_string(),
                            index,
                        })?;
                    let handle = VisitHandle::ordinal(batch.visits.len());
                    batch
                        .visits
                        .push(parse_pv1(&fields, handle.clone(), patient_code, source));
                    current_visit = Some(handle);
                }
                "OBX" => {
                    let patient_code =
                        current_patient.clone().ok_or(ParseError::MissingField {
                            field: "PID before OBX".to_string(),
                            index,
                        })?;
                    let mut obs = parse_obx(&fields, index, patient_code, source)?;
                    obs.visit = current_visit.clone();
                    batch.observations.push(obs);
                }
                _ => {}
            }
        }

        if !saw_msh {
            return Err(ParseError::malformed("hl7_pipe", "missing MSH segment"));
        }
        if batch.is_empty() {
            return Err(ParseError::Empty);
        }

        Ok(batch)
    }
}

fn field<'a>(fields: &[&'a str], position: usize) -> Option<&'a str> {
    fields
        .get(position)
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
}

/// First component of a composite field (`id^assigner^...` → `id`)
fn component<'a>(fields: &[&'a str], position: usize) -> Option<&'a str> {
    field(fields, position)
        .and_then(|f| f.split('^').next())
        .map(str::trim)
        .filter(|f| !f.is_empty())
}

fn parse_pid(fields: &[&str], index: usize, source: &str) -> Result<PatientRecord, ParseError> {
    let id = component(fields, 3).ok_or(ParseError::MissingField {
        field: "PID-3".to_string(),
        index,
    })?;
    let code = PatientCode::new(id).map_err(|_| ParseError::MissingField {
        field: "PID-3".to_string(),
        index,
    })?;

    Ok(PatientRecord {
        code,
        sex_code: field(fields, 8).map(str::to_string),
        age: None,
        birth_date: field(fields, 7).and_then(parse_date),
        source: source.to_string(),
    })
}

fn parse_pv1(
    fields: &[&str],
    handle: VisitHandle,
    patient_code: PatientCode,
    source: &str,
) -> VisitRecord {
    VisitRecord {
        handle,
        patient_code,
        start: field(fields, 44).and_then(parse_timestamp),
        end: field(fields, 45).and_then(parse_timestamp),
        location_code: component(fields, 3).map(str::to_string),
        inpatient: matches!(field(fields, 2), Some("I")),
        notes: None,
        source: source.to_string(),
    }
}

fn parse_obx(
    fields: &[&str],
    index: usize,
    patient_code: PatientCode,
    source: &str,
) -> Result<ObservationRecord, ParseError> {
    let concept = component(fields, 3).ok_or(ParseError::MissingField {
        field: "OBX-3".to_string(),
        index,
    })?;
    let value_type = field(fields, 2).ok_or(ParseError::MissingField {
        field: "OBX-2".to_string(),
        index,
    })?;
    let raw_value = field(fields, 5).ok_or(ParseError::MissingField {
        field: "OBX-5".to_string(),
        index,
    })?;

    let (kind, value) = match value_type {
        "NM" => {
            let number: f64 = raw_value.parse().map_err(|_| ParseError::InvalidValue {
                field: "OBX-5".to_string(),
                index,
                message: format!("'{raw_value}' is not numeric"),
            })?;
            (ValueKind::Numeric, ValueSlots::numeric(number))
        }
        "ST" | "TX" | "FT" => (ValueKind::Text, ValueSlots::text(raw_value)),
        "DT" | "TS" => {
            let date = parse_date(raw_value.get(..8).unwrap_or(raw_value)).ok_or_else(|| {
                ParseError::InvalidValue {
                    field: "OBX-5".to_string(),
                    index,
                    message: format!("'{raw_value}' is not a date"),
                }
            })?;
            (ValueKind::Date, ValueSlots::date(date))
        }
        "CE" | "CWE" => {
            let code = raw_value.split('^').next().unwrap_or(raw_value);
            (ValueKind::Selection, ValueSlots::selection(code))
        }
        "ED" => (
            ValueKind::Raw,
            ValueSlots::raw(serde_json::Value::String(raw_value.to_string())),
        ),
        other => {
            return Err(ParseError::InvalidValue {
                field: "OBX-2".to_string(),
                index,
                message: format!("unsupported value type '{other}'"),
            })
        }
    };

    let mut obs = ObservationRecord::new(patient_code, concept, kind, value, source);
    obs.unit_code = component(fields, 6).map(str::to_string);
    obs.observed_at = field(fields, 14).and_then(parse_timestamp);
    Ok(obs)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
MSH|^~\\&|LAB|SITE4|||20240101100000||ORU^R01|MSG001|P|2.5
PID|1||P1^^^SITE4||DOE^JANE||19770302|F
PV1|1|I|WARD3^R1^B2|||||||||||||||||||||||||||||||||||||||||20240101100000|20240102090000
OBX|1|NM|8867-4^HeartRate||72|bpm^beats||||||||20240101100500
OBX|2|CE|72166-2^SmokingStatus||never^NeverSmoked
PID|2||P2^^^SITE4||ROE^RICHARD||19611118|M
OBX|1|ST|notes^ClinicalNote||patient reports dizziness";

    fn parse(content: &str) -> Result<CanonicalBatch, ParseError> {
        Hl7PipeParser.parse(content, &ImportOptions::default())
    }

    #[test]
    fn test_parses_message() {
        let batch = parse(SAMPLE).unwrap();

        assert_eq!(batch.patients.len(), 2);
        assert_eq!(batch.visits.len(), 1);
        assert_eq!(batch.observations.len(), 3);
        assert_eq!(batch.metadata.source_system, "hl7v2");
    }

    #[test]
    fn test_pid_fields() {
        let batch = parse(SAMPLE).unwrap();
        let p1 = &batch.patients[0];

        assert_eq!(p1.code.as_str(), "P1");
        assert_eq!(p1.sex_code.as_deref(), Some("F"));
        assert_eq!(
            p1.birth_date,
            chrono::NaiveDate::from_ymd_opt(1977, 3, 2)
        );
    }

    #[test]
    fn test_obx_attaches_to_current_visit() {
        let batch = parse(SAMPLE).unwrap();

        // First patient's observations sit under their PV1.
        assert_eq!(batch.observations[0].visit, Some(VisitHandle::ordinal(0)));
        assert_eq!(batch.observations[1].visit, Some(VisitHandle::ordinal(0)));
        // Second patient has no PV1, so their observation floats.
        assert!(batch.observations[2].visit.is_none());
        assert_eq!(batch.observations[2].patient_code.as_str(), "P2");
    }

    #[test]
    fn test_obx_value_mapping() {
        let batch = parse(SAMPLE).unwrap();

        let hr = &batch.observations[0];
        assert_eq!(hr.concept_code, "8867-4");
        assert_eq!(hr.kind, ValueKind::Numeric);
        assert_eq!(hr.value.numeric, Some(72.0));
        assert_eq!(hr.unit_code.as_deref(), Some("bpm"));
        assert!(hr.observed_at.is_some());

        let smoking = &batch.observations[1];
        assert_eq!(smoking.kind, ValueKind::Selection);
        assert_eq!(smoking.value.selection.as_deref(), Some("never"));
    }

    #[test]
    fn test_pv1_fields() {
        let batch = parse(SAMPLE).unwrap();
        let visit = &batch.visits[0];

        assert!(visit.inpatient);
        assert_eq!(visit.location_code.as_deref(), Some("WARD3"));
        assert!(visit.start.is_some());
        assert!(visit.end.is_some());
    }

    #[test]
    fn test_missing_msh_rejected() {
        let err = parse("PID|1||P1||DOE^JANE").unwrap_err();
        assert!(matches!(err, ParseError::Malformed { .. }));
    }

    #[test]
    fn test_obx_before_pid_rejected() {
        let content = "MSH|^~\\&|LAB\nOBX|1|NM|X||1";
        let err = parse(content).unwrap_err();
        assert!(matches!(err, ParseError::MissingField { ref field, .. } if field == "PID before OBX"));
    }

    #[test]
    fn test_carriage_return_separators() {
        let content = "MSH|^~\\&|LAB\rPID|1||P1\rOBX|1|NM|HR||60";
        let batch = parse(content).unwrap();
        assert_eq!(batch.patients.len(), 1);
        assert_eq!(batch.observations.len(), 1);
    }

    #[test]
    fn test_message_with_only_msh_rejected() {
        let err = parse("MSH|^~\\&|LAB|SITE4").unwrap_err();
        assert!(matches!(err, ParseError::Empty));
    }
}
