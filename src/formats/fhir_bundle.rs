//! FHIR-style JSON bundle parser
//!
//! Walks a `Bundle` of `Patient`, `Encounter`, and `Observation` resources.
//! Patients are keyed by resource id, encounters become visits with a label
//! handle (so observation `encounter` references resolve by id rather than
//! position), and observation values map onto the canonical value slots from
//! the `value[x]` member present.

use super::{parse_date, parse_timestamp, FormatParser, FormatTag};
use crate::core::options::ImportOptions;
use crate::domain::batch::{BatchMetadata, CanonicalBatch};
use crate::domain::errors::ParseError;
use crate::domain::ids::{PatientCode, VisitHandle};
use crate::domain::records::{ObservationRecord, PatientRecord, ValueKind, ValueSlots, VisitRecord};
use serde_json::Value;

/// Parser for FHIR-style JSON bundles
pub struct FhirBundleParser;

impl FormatParser for FhirBundleParser {
    fn tag(&self) -> FormatTag {
        FormatTag::FhirBundle
    }

    fn parse(
        &self,
        content: &str,
        _options: &ImportOptions,
    ) -> Result<CanonicalBatch, ParseError> {
        let source = self.tag().source_system();
        let root: Value = serde_json::from_str(content)
            .map_err(|e| ParseError::malformed("fhir_bundle", e.to_string()))?;

        if root["resourceType"] != "Bundle" {
            return Err(ParseError::malformed(
                "fhir_bundle",
                "root resource is not a Bundle",
            ));
        }

        let entries = root["entry"].as_array().cloned().unwrap_or_default();
        if entries.is_empty() {
            return Err(ParseError::Empty);
        }

        let mut batch = CanonicalBatch::new(BatchMetadata::new(source));
        for (index, entry) in entries.iter().enumerate() {
            let resource = &entry["resource"];
            match resource["resourceType"].as_str() {
                Some("Patient") => batch.patients.push(parse_patient(resource, index, source)?),
                Some("Encounter") => batch.visits.push(parse_encounter(resource, index, source)?),
                Some("Observation") => batch
                    .observations
                    .push(parse_observation(resource, index, source)?),
                // Foreign resource types are ignored rather than rejected;
                // real bundles interleave resources this importer has no
                // counterpart for.
                _ => {}
            }
        }

        Ok(batch)
    }
}

fn str_field<'a>(resource: &'a Value, key: &str) -> Option<&'a str> {
    resource[key].as_str().map(str::trim).filter(|s| !s.is_empty())
}

/// Extracts the id out of a `Type/id` reference string
fn reference_id<'a>(resource: &'a Value, key: &str) -> Option<&'a str> {
    let reference = resource[key]["reference"].as_str()?;
    let id = reference.rsplit('/').next().unwrap_or(reference).trim();
    (!id.is_empty()).then_some(id)
}

fn parse_patient(resource: &Value, index: usize, source: &str) -> Result<PatientRecord, ParseError> {
    let id = str_field(resource, "id").ok_or(ParseError::MissingField {
        field: "Patient.id".to_string(),
        index,
    })?;
    let code = PatientCode::new(id).map_err(|_| ParseError::MissingField {
        field: "Patient.id".to_string(),
        index,
    })?;

    Ok(PatientRecord {
        code,
        sex_code: str_field(resource, "gender").map(str::to_string),
        age: None,
        birth_date: str_field(resource, "birthDate").and_then(parse_date),
        source: source.to_string(),
    })
}

fn parse_encounter(resource: &Value, index: usize, source: &str) -> Result<VisitRecord, ParseError> {
    let id = str_field(resource, "id").ok_or(ParseError::MissingField {
        field: "Encounter.id".to_string(),
        index,
    })?;
    let subject = reference_id(resource, "subject").ok_or(ParseError::MissingField {
        field: "Encounter.subject".to_string(),
        index,
    })?;
    let patient_code = PatientCode::new(subject).map_err(|_| ParseError::MissingField {
        field: "Encounter.subject".to_string(),
        index,
    })?;

    Ok(VisitRecord {
        handle: VisitHandle::label(id),
        patient_code,
        start: resource["period"]["start"]
            .as_str()
            .and_then(parse_timestamp),
        end: resource["period"]["end"].as_str().and_then(parse_timestamp),
        location_code: resource["location"][0]["location"]["reference"]
            .as_str()
            .map(str::to_string),
        inpatient: matches!(resource["class"]["code"].as_str(), Some("IMP" | "ACUTE")),
        notes: (!resource["note"].is_null()).then(|| resource["note"].clone()),
        source: source.to_string(),
    })
}

fn parse_observation(
    resource: &Value,
    index: usize,
    source: &str,
) -> Result<ObservationRecord, ParseError> {
    let subject = reference_id(resource, "subject").ok_or(ParseError::MissingField {
        field: "Observation.subject".to_string(),
        index,
    })?;
    let patient_code = PatientCode::new(subject).map_err(|_| ParseError::MissingField {
        field: "Observation.subject".to_string(),
        index,
    })?;

    let concept = resource["code"]["coding"][0]["code"]
        .as_str()
        .or_else(|| resource["code"]["text"].as_str())
        .ok_or(ParseError::MissingField {
            field: "Observation.code".to_string(),
            index,
        })?;

    let (kind, value, unit) = parse_value(resource, index)?;

    let mut obs = ObservationRecord::new(patient_code, concept, kind, value, source);
    obs.visit = reference_id(resource, "encounter").map(VisitHandle::label);
    obs.unit_code = unit;
    obs.observed_at = resource["effectiveDateTime"]
        .as_str()
        .and_then(parse_timestamp);
    Ok(obs)
}

fn parse_value(
    resource: &Value,
    index: usize,
) -> Result<(ValueKind, ValueSlots, Option<String>), ParseError> {
    if let Some(quantity) = resource.get("valueQuantity") {
        let value = quantity["value"]
            .as_f64()
            .ok_or_else(|| ParseError::InvalidValue {
                field: "valueQuantity.value".to_string(),
                index,
                message: "not a number".to_string(),
            })?;
        let unit = quantity["unit"].as_str().map(str::to_string);
        return Ok((ValueKind::Numeric, ValueSlots::numeric(value), unit));
    }
    if let Some(text) = resource["valueString"].as_str() {
        return Ok((ValueKind::Text, ValueSlots::text(text), None));
    }
    if let Some(raw) = resource["valueDateTime"].as_str() {
        let date_part = raw.get(..10).unwrap_or(raw);
        let date = parse_date(date_part).ok_or_else(|| {
            ParseError::InvalidValue {
                field: "valueDateTime".to_string(),
                index,
                message: format!("'{raw}' is not a date"),
            }
        })?;
        return Ok((ValueKind::Date, ValueSlots::date(date), None));
    }
    if let Some(concept) = resource.get("valueCodeableConcept") {
        let code = concept["coding"][0]["code"]
            .as_str()
            .or_else(|| concept["text"].as_str())
            .ok_or_else(|| ParseError::InvalidValue {
                field: "valueCodeableConcept".to_string(),
                index,
                message: "no coding or text".to_string(),
            })?;
        return Ok((ValueKind::Selection, ValueSlots::selection(code), None));
    }
    if let Some(attachment) = resource.get("valueAttachment") {
        return Ok((ValueKind::Raw, ValueSlots::raw(attachment.clone()), None));
    }

    Err(ParseError::MissingField {
        field: "Observation.value[x]".to_string(),
        index,
    })
}
