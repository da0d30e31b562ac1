//! Canonical import model
//!
//! The shared data shape every parser produces and the reconciliation engine
//! consumes: lists of patient, visit, and observation records plus batch
//! metadata describing provenance.

use super::ids::{PatientCode, VisitHandle};
use super::records::{ObservationRecord, PatientRecord, VisitRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provenance metadata for one parsed batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchMetadata {
    /// Source-system code (e.g. "redcap", "hl7v2")
    pub source_system: String,

    /// Original filename, when one was supplied
    pub filename: Option<String>,

    /// Ingestion timestamp
    pub ingested_at: DateTime<Utc>,
}

impl BatchMetadata {
    /// Creates metadata for the given source system
    pub fn new(source_system: impl Into<String>) -> Self {
        Self {
            source_system: source_system.into(),
            filename: None,
            ingested_at: Utc::now(),
        }
    }

    /// Sets the original filename
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

/// Canonical import model for one batch
///
/// Parsers append records in source order; the engine processes patients,
/// then visits, then observations. Visits reference patients by natural key
/// and observations reference visits by handle, so records may arrive in any
/// relative order within their lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalBatch {
    /// Batch provenance
    pub metadata: BatchMetadata,

    /// Patient records
    pub patients: Vec<PatientRecord>,

    /// Visit records
    pub visits: Vec<VisitRecord>,

    /// Observation records
    pub observations: Vec<ObservationRecord>,
}

impl CanonicalBatch {
    /// Creates an empty batch with the given metadata
    pub fn new(metadata: BatchMetadata) -> Self {
        Self {
            metadata,
            patients: Vec::new(),
            visits: Vec::new(),
            observations: Vec::new(),
        }
    }

    /// True when the batch holds no records of any kind
    pub fn is_empty(&self) -> bool {
        self.patients.is_empty() && self.visits.is_empty() && self.observations.is_empty()
    }

    /// Forces every record's patient reference to the given code
    ///
    /// Used by `import_for_patient`: the caller already knows the subject and
    /// the stamped code overrides whatever the parser inferred. When
    /// `visit_ref` is set, observations without a visit reference are pointed
    /// at it as well.
    pub fn stamp_target(&mut self, patient_code: &PatientCode, visit_ref: Option<&VisitHandle>) {
        for patient in &mut self.patients {
            patient.code = patient_code.clone();
        }
        for visit in &mut self.visits {
            visit.patient_code = patient_code.clone();
        }
        for obs in &mut self.observations {
            obs.patient_code = patient_code.clone();
            if obs.visit.is_none() {
                obs.visit = visit_ref.cloned();
            }
        }
        // Distinct source patients may have collapsed onto one code.
        self.patients.dedup_by(|a, b| a.code == b.code);
    }
}
