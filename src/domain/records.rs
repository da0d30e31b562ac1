//! Canonical record types
//!
//! This module defines the format-independent record shapes every parser must
//! produce and the reconciliation engine consumes. Patients carry their
//! natural key, visits reference patients by natural key (resolution order is
//! not guaranteed at parse time), and observations reference a patient by
//! natural key and optionally a visit by its batch handle.

use super::ids::{PatientCode, VisitHandle};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Canonical patient record
///
/// Created by a parser from external data; consumed, never mutated, by the
/// reconciliation engine except to merge an update when the duplicate
/// strategy is `update`.
///
/// # Examples
///
/// ```
/// use intake::domain::records::PatientRecord;
/// use intake::domain::ids::PatientCode;
///
/// let patient = PatientRecord::builder()
///     .code(PatientCode::new("P-10442").unwrap())
///     .sex_code("F")
///     .age(47)
///     .source("redcap")
///     .build()
///     .unwrap();
/// assert_eq!(patient.code.as_str(), "P-10442");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientRecord {
    /// External patient code (natural key, unique within one batch)
    pub code: PatientCode,

    /// Sex code as supplied by the source system (format-specific)
    pub sex_code: Option<String>,

    /// Age in years at ingestion time
    pub age: Option<u16>,

    /// Date of birth
    pub birth_date: Option<NaiveDate>,

    /// Source-system provenance tag
    pub source: String,
}

impl PatientRecord {
    /// Creates a new builder for constructing a PatientRecord
    pub fn builder() -> PatientRecordBuilder {
        PatientRecordBuilder::default()
    }

    /// Builds the partial update applied when the duplicate strategy is
    /// `update`: only the non-null incoming fields.
    pub fn to_patch(&self) -> PatientPatch {
        PatientPatch {
            sex_code: self.sex_code.clone(),
            age: self.age,
            birth_date: self.birth_date,
        }
    }
}

/// Builder for constructing PatientRecord instances
#[derive(Debug, Default)]
pub struct PatientRecordBuilder {
    code: Option<PatientCode>,
    sex_code: Option<String>,
    age: Option<u16>,
    birth_date: Option<NaiveDate>,
    source: Option<String>,
}

impl PatientRecordBuilder {
    /// Creates a new PatientRecordBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the patient natural key
    pub fn code(mut self, code: PatientCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Sets the sex code
    pub fn sex_code(mut self, sex_code: impl Into<String>) -> Self {
        self.sex_code = Some(sex_code.into());
        self
    }

    /// Sets the age in years
    pub fn age(mut self, age: u16) -> Self {
        self.age = Some(age);
        self
    }

    /// Sets the birth date
    pub fn birth_date(mut self, birth_date: NaiveDate) -> Self {
        self.birth_date = Some(birth_date);
        self
    }

    /// Sets the provenance tag
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Builds the PatientRecord
    ///
    /// # Errors
    ///
    /// Returns an error if the natural key is missing
    pub fn build(self) -> Result<PatientRecord, String> {
        Ok(PatientRecord {
            code: self.code.ok_or("code is required")?,
            sex_code: self.sex_code,
            age: self.age,
            birth_date: self.birth_date,
            source: self.source.unwrap_or_default(),
        })
    }
}

/// Non-null field subset merged onto an existing patient under `update`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientPatch {
    pub sex_code: Option<String>,
    pub age: Option<u16>,
    pub birth_date: Option<NaiveDate>,
}

impl PatientPatch {
    /// True when no field would change
    pub fn is_empty(&self) -> bool {
        self.sex_code.is_none() && self.age.is_none() && self.birth_date.is_none()
    }
}

/// Canonical visit record
///
/// References its patient by natural key only; the surrogate key is resolved
/// during reconciliation. The handle is the temporary id observations use to
/// point at this visit within the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitRecord {
    /// Batch-scoped handle observations may reference
    pub handle: VisitHandle,

    /// Natural key of the owning patient
    pub patient_code: PatientCode,

    /// Visit start timestamp
    pub start: Option<DateTime<Utc>>,

    /// Visit end timestamp
    pub end: Option<DateTime<Utc>>,

    /// Location code (ward, site, clinic)
    pub location_code: Option<String>,

    /// Inpatient (true) or outpatient (false) encounter
    pub inpatient: bool,

    /// Free-form notes blob
    pub notes: Option<serde_json::Value>,

    /// Source-system provenance tag
    pub source: String,
}

impl VisitRecord {
    /// Creates a minimal visit for a patient with the given handle
    pub fn new(handle: VisitHandle, patient_code: PatientCode, source: impl Into<String>) -> Self {
        Self {
            handle,
            patient_code,
            start: None,
            end: None,
            location_code: None,
            inpatient: false,
            notes: None,
            source: source.into(),
        }
    }
}

/// Observation value-type discriminant
///
/// Determines which slot of [`ValueSlots`] must be populated. Single-letter
/// codes follow the common clinical-data convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Numeric,
    Text,
    Date,
    Selection,
    Finding,
    Raw,
    Questionnaire,
}

impl ValueKind {
    /// Single-letter wire code for this kind
    pub fn as_code(&self) -> &'static str {
        match self {
            ValueKind::Numeric => "N",
            ValueKind::Text => "T",
            ValueKind::Date => "D",
            ValueKind::Selection => "S",
            ValueKind::Finding => "F",
            ValueKind::Raw => "R",
            ValueKind::Questionnaire => "Q",
        }
    }
}

impl FromStr for ValueKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "N" | "NUMERIC" => Ok(ValueKind::Numeric),
            "T" | "TEXT" => Ok(ValueKind::Text),
            "D" | "DATE" => Ok(ValueKind::Date),
            "S" | "SELECTION" => Ok(ValueKind::Selection),
            "F" | "FINDING" => Ok(ValueKind::Finding),
            "R" | "RAW" => Ok(ValueKind::Raw),
            "Q" | "QUESTIONNAIRE" => Ok(ValueKind::Questionnaire),
            other => Err(format!("Unknown value kind: {other}")),
        }
    }
}

/// Observation value slots
///
/// Exactly one slot matching the declared [`ValueKind`] must be populated;
/// the reconciliation engine rejects the single observation otherwise.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValueSlots {
    pub numeric: Option<f64>,
    pub text: Option<String>,
    pub date: Option<NaiveDate>,
    pub selection: Option<String>,
    pub finding: Option<String>,
    pub raw: Option<serde_json::Value>,
    pub questionnaire: Option<serde_json::Value>,
}

impl ValueSlots {
    /// Slots with only the numeric value set
    pub fn numeric(value: f64) -> Self {
        Self {
            numeric: Some(value),
            ..Self::default()
        }
    }

    /// Slots with only the text value set
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            text: Some(value.into()),
            ..Self::default()
        }
    }

    /// Slots with only the date value set
    pub fn date(value: NaiveDate) -> Self {
        Self {
            date: Some(value),
            ..Self::default()
        }
    }

    /// Slots with only the selection value set
    pub fn selection(value: impl Into<String>) -> Self {
        Self {
            selection: Some(value.into()),
            ..Self::default()
        }
    }

    /// Slots with only the finding value set
    pub fn finding(value: impl Into<String>) -> Self {
        Self {
            finding: Some(value.into()),
            ..Self::default()
        }
    }

    /// Slots with only the raw value set
    pub fn raw(value: serde_json::Value) -> Self {
        Self {
            raw: Some(value),
            ..Self::default()
        }
    }

    /// Slots with only the questionnaire value set
    pub fn questionnaire(value: serde_json::Value) -> Self {
        Self {
            questionnaire: Some(value),
            ..Self::default()
        }
    }

    /// True when the slot matching `kind` is populated
    pub fn matches(&self, kind: ValueKind) -> bool {
        match kind {
            ValueKind::Numeric => self.numeric.is_some(),
            ValueKind::Text => self.text.is_some(),
            ValueKind::Date => self.date.is_some(),
            ValueKind::Selection => self.selection.is_some(),
            ValueKind::Finding => self.finding.is_some(),
            ValueKind::Raw => self.raw.is_some(),
            ValueKind::Questionnaire => self.questionnaire.is_some(),
        }
    }
}

/// Canonical observation record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationRecord {
    /// Natural key of the owning patient
    pub patient_code: PatientCode,

    /// Optional reference to a visit in the same batch
    pub visit: Option<VisitHandle>,

    /// Concept code in the source's coding system
    pub concept_code: String,

    /// Value-type discriminant
    pub kind: ValueKind,

    /// Value slots; exactly one must match `kind`
    pub value: ValueSlots,

    /// Unit code for numeric values
    pub unit_code: Option<String>,

    /// Observation timestamp
    pub observed_at: Option<DateTime<Utc>>,

    /// Source-system provenance tag
    pub source: String,
}

impl ObservationRecord {
    /// Creates an observation with the given kind and value slots
    pub fn new(
        patient_code: PatientCode,
        concept_code: impl Into<String>,
        kind: ValueKind,
        value: ValueSlots,
        source: impl Into<String>,
    ) -> Self {
        Self {
            patient_code,
            visit: None,
            concept_code: concept_code.into(),
            kind,
            value,
            unit_code: None,
            observed_at: None,
            source: source.into(),
        }
    }

    /// Sets the visit handle
    pub fn with_visit(mut self, visit: VisitHandle) -> Self {
        self.visit = Some(visit);
        self
    }

    /// Sets the unit code
    pub fn with_unit(mut self, unit_code: impl Into<String>) -> Self {
        self.unit_code = Some(unit_code.into());
        self
    }

    /// Sets the observation timestamp
    pub fn with_observed_at(mut self, observed_at: DateTime<Utc>) -> Self {
        self.observed_at = Some(observed_at);
        self
    }
}
