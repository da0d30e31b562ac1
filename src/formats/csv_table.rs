//! CSV table parser
//!
//! Parses a delimited tabular export where each row is one observation and
//! patient/visit attributes repeat across rows. Rows sharing a patient code
//! and visit start collapse into one visit; rows without a visit start
//! produce observations with no visit reference.
//!
//! Expected header (order-insensitive, unknown columns ignored):
//! `patient_id, sex, age, birth_date, visit_start, visit_end,
//! visit_location, visit_class, concept, value_type, value, unit,
//! observed_at`

use super::{parse_date, parse_timestamp, FormatParser, FormatTag};
use crate::core::options::ImportOptions;
use crate::domain::batch::{BatchMetadata, CanonicalBatch};
use crate::domain::errors::ParseError;
use crate::domain::ids::{PatientCode, VisitHandle};
use crate::domain::records::{
    ObservationRecord, PatientRecord, ValueKind, ValueSlots, VisitRecord,
};
use serde::Deserialize;
use std::collections::HashMap;

/// Parser for delimited tabular exports
pub struct CsvTableParser;

#[derive(Debug, Deserialize)]
struct Row {
    #[serde(default)]
    patient_id: Option<String>,
    #[serde(default)]
    sex: Option<String>,
    #[serde(default)]
    age: Option<String>,
    #[serde(default)]
    birth_date: Option<String>,
    #[serde(default)]
    visit_start: Option<String>,
    #[serde(default)]
    visit_end: Option<String>,
    #[serde(default)]
    visit_location: Option<String>,
    #[serde(default)]
    visit_class: Option<String>,
    #[serde(default)]
    concept: Option<String>,
    #[serde(default)]
    value_type: Option<String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    observed_at: Option<String>,
}

impl Row {
    fn required<'a>(&'a self, field: &str, index: usize) -> Result<&'a str, ParseError> {
        let value = match field {
            "patient_id" => &self.patient_id,
            "concept" => &self.concept,
            "value_type" => &self.value_type,
            "value" => &self.value,
            _ => &None,
        };
        match value.as_deref().map(str::trim) {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(ParseError::MissingField {
                field: field.to_string(),
                index,
            }),
        }
    }
}

impl FormatParser for CsvTableParser {
    fn tag(&self) -> FormatTag {
        FormatTag::CsvTable
    }

    fn parse(
        &self,
        content: &str,
        _options: &ImportOptions,
    ) -> Result<CanonicalBatch, ParseError> {
        let source = self.tag().source_system();
        let mut batch = CanonicalBatch::new(BatchMetadata::new(source));

        // Patient code → position in batch.patients, for attribute backfill.
        let mut patient_index: HashMap<String, usize> = HashMap::new();
        // (patient code, visit start) → position in batch.visits.
        let mut visit_index: HashMap<(String, String), usize> = HashMap::new();

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let mut saw_row = false;
        for (index, row) in reader.deserialize::<Row>().enumerate() {
            saw_row = true;
            let row = row.map_err(|e| ParseError::malformed("csv_table", e.to_string()))?;

            let code_str = row.required("patient_id", index)?;
            let concept = row.required("concept", index)?;
            let kind: ValueKind = row.required("value_type", index)?.parse().map_err(|_| {
                ParseError::InvalidValue {
                    field: "value_type".to_string(),
                    index,
                    message: format!("unknown code '{}'", row.value_type.as_deref().unwrap_or("")),
                }
            })?;
            let raw_value = row.required("value", index)?;

            let code = PatientCode::new(code_str).map_err(|_| ParseError::MissingField {
                field: "patient_id".to_string(),
                index,
            })?;

            let patient_pos = match patient_index.get(code_str) {
                Some(pos) => *pos,
                None => {
                    batch.patients.push(PatientRecord {
                        code: code.clone(),
                        sex_code: None,
                        age: None,
                        birth_date: None,
                        source: source.to_string(),
                    });
                    let pos = batch.patients.len() - 1;
                    patient_index.insert(code_str.to_string(), pos);
                    pos
                }
            };
            backfill_patient(&mut batch.patients[patient_pos], &row, index)?;

            // One visit per distinct (patient, start) pair.
            let visit = match row.visit_start.as_deref().map(str::trim) {
                Some(start) if !start.is_empty() => {
                    let key = (code_str.to_string(), start.to_string());
                    let pos = match visit_index.get(&key) {
                        Some(pos) => *pos,
                        None => {
                            let pos = batch.visits.len();
                            batch.visits.push(VisitRecord {
                                handle: VisitHandle::ordinal(pos),
                                patient_code: code.clone(),
                                start: parse_timestamp(start),
                                end: row
                                    .visit_end
                                    .as_deref()
                                    .and_then(parse_timestamp),
                                location_code: clean(&row.visit_location),
                                inpatient: matches!(
                                    row.visit_class.as_deref().map(str::trim),
                                    Some("I") | Some("i")
                                ),
                                notes: None,
                                source: source.to_string(),
                            });
                            visit_index.insert(key, pos);
                            pos
                        }
                    };
                    Some(VisitHandle::ordinal(pos))
                }
                _ => None,
            };

            let mut obs = ObservationRecord::new(
                code,
                concept,
                kind,
                slots_for(kind, raw_value, index)?,
                source,
            );
            obs.visit = visit;
            obs.unit_code = clean(&row.unit);
            obs.observed_at = row.observed_at.as_deref().and_then(parse_timestamp);
            batch.observations.push(obs);
        }

        if !saw_row {
            return Err(ParseError::Empty);
        }

        Ok(batch)
    }
}

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn backfill_patient(
    patient: &mut PatientRecord,
    row: &Row,
    index: usize,
) -> Result<(), ParseError> {
    if patient.sex_code.is_none() {
        patient.sex_code = clean(&row.sex);
    }
    if patient.age.is_none() {
        if let Some(age) = clean(&row.age) {
            patient.age = Some(age.parse().map_err(|_| ParseError::InvalidValue {
                field: "age".to_string(),
                index,
                message: format!("'{age}' is not an integer"),
            })?);
        }
    }
    if patient.birth_date.is_none() {
        if let Some(birth) = clean(&row.birth_date) {
            patient.birth_date =
                Some(parse_date(&birth).ok_or_else(|| ParseError::InvalidValue {
                    field: "birth_date".to_string(),
                    index,
                    message: format!("'{birth}' is not a date"),
                })?);
        }
    }
    Ok(())
}

fn slots_for(kind: ValueKind, raw: &str, index: usize) -> Result<ValueSlots, ParseError> {
    let slots = match kind {
        ValueKind::Numeric => {
            let value: f64 = raw.parse().map_err(|_| ParseError::InvalidValue {
                field: "value".to_string(),
                index,
                message: format!("'{raw}' is not numeric"),
            })?;
            ValueSlots::numeric(value)
        }
        ValueKind::Text => ValueSlots::text(raw),
        ValueKind::Date => {
            let date = parse_date(raw).ok_or_else(|| ParseError::InvalidValue {
                field: "value".to_string(),
                index,
                message: format!("'{raw}' is not a date"),
            })?;
            ValueSlots::date(date)
        }
        ValueKind::Selection => ValueSlots::selection(raw),
        ValueKind::Finding => ValueSlots::finding(raw),
        ValueKind::Raw => ValueSlots::raw(json_or_string(raw)),
        ValueKind::Questionnaire => ValueSlots::questionnaire(json_or_string(raw)),
    };
    Ok(slots)
}

fn json_or_string(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
patient_id,sex,age,birth_date,visit_start,visit_end,visit_location,visit_class,concept,value_type,value,unit,observed_at
P1,F,47,1977-03-02,2024-01-01T10:00:00Z,2024-01-01T11:00:00Z,WARD3,I,HR,N,72,bpm,2024-01-01T10:05:00Z
P1,F,47,1977-03-02,2024-01-01T10:00:00Z,,WARD3,I,TEMP,N,37.2,C,2024-01-01T10:06:00Z
P2,M,,,,,,,SMOKER,S,never,,
";

    fn parse(content: &str) -> Result<CanonicalBatch, ParseError> {
        CsvTableParser.parse(content, &ImportOptions::default())
    }

    #[test]
    fn test_parses_patients_visits_observations() {
        let batch = parse(SAMPLE).unwrap();

        assert_eq!(batch.patients.len(), 2);
        assert_eq!(batch.visits.len(), 1);
        assert_eq!(batch.observations.len(), 3);
        assert_eq!(batch.metadata.source_system, "csv");
    }

    #[test]
    fn test_rows_share_one_visit() {
        let batch = parse(SAMPLE).unwrap();

        assert_eq!(batch.observations[0].visit, Some(VisitHandle::ordinal(0)));
        assert_eq!(batch.observations[1].visit, Some(VisitHandle::ordinal(0)));
        assert!(batch.observations[2].visit.is_none());
        assert!(batch.visits[0].inpatient);
        assert_eq!(batch.visits[0].location_code.as_deref(), Some("WARD3"));
    }

    #[test]
    fn test_patient_attributes() {
        let batch = parse(SAMPLE).unwrap();
        let p1 = &batch.patients[0];

        assert_eq!(p1.code.as_str(), "P1");
        assert_eq!(p1.sex_code.as_deref(), Some("F"));
        assert_eq!(p1.age, Some(47));
        assert!(p1.birth_date.is_some());
    }

    #[test]
    fn test_value_slots_follow_kind() {
        let batch = parse(SAMPLE).unwrap();

        assert_eq!(batch.observations[0].value.numeric, Some(72.0));
        assert_eq!(batch.observations[0].unit_code.as_deref(), Some("bpm"));
        assert_eq!(batch.observations[2].value.selection.as_deref(), Some("never"));
    }

    #[test]
    fn test_missing_patient_id_rejected() {
        let content = "patient_id,concept,value_type,value\n,HR,N,72\n";
        let err = parse(content).unwrap_err();
        assert!(matches!(err, ParseError::MissingField { ref field, .. } if field == "patient_id"));
    }

    #[test]
    fn test_non_numeric_value_rejected() {
        let content = "patient_id,concept,value_type,value\nP1,HR,N,fast\n";
        let err = parse(content).unwrap_err();
        assert!(matches!(err, ParseError::InvalidValue { .. }));
    }

    #[test]
    fn test_unknown_value_type_rejected() {
        let content = "patient_id,concept,value_type,value\nP1,HR,Z,72\n";
        let err = parse(content).unwrap_err();
        assert!(matches!(err, ParseError::InvalidValue { ref field, .. } if field == "value_type"));
    }

    #[test]
    fn test_empty_content_rejected() {
        let err = parse("patient_id,concept,value_type,value\n").unwrap_err();
        assert!(matches!(err, ParseError::Empty));
    }
}
