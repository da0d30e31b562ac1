//! Store abstraction traits
//!
//! This module defines the repository-style contracts the reconciliation
//! engine writes through. One trait per entity level of the hierarchy
//! (patient → visit → observation) plus the [`ImportStore`] supertrait the
//! engine holds. Implementations must surface duplicate-key violations as
//! [`StoreError::DuplicateKey`](crate::domain::StoreError::DuplicateKey)
//! failures, never as silent no-ops.

use crate::domain::ids::{PatientCode, SurrogateId};
use crate::domain::records::{
    ObservationRecord, PatientPatch, PatientRecord, ValueKind, ValueSlots,
};
use crate::domain::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A patient row as held by the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPatient {
    /// Store-generated surrogate key
    pub id: SurrogateId,
    /// External natural key
    pub code: PatientCode,
    pub sex_code: Option<String>,
    pub age: Option<u16>,
    pub birth_date: Option<NaiveDate>,
    pub source: String,
}

impl StoredPatient {
    /// Applies the non-null fields of a patch
    pub fn apply(&mut self, patch: &PatientPatch) {
        if let Some(sex_code) = &patch.sex_code {
            self.sex_code = Some(sex_code.clone());
        }
        if let Some(age) = patch.age {
            self.age = Some(age);
        }
        if let Some(birth_date) = patch.birth_date {
            self.birth_date = Some(birth_date);
        }
    }
}

/// A visit row as held by the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredVisit {
    pub id: SurrogateId,
    /// Surrogate key of the owning patient
    pub patient_id: SurrogateId,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub location_code: Option<String>,
    pub inpatient: bool,
    pub notes: Option<serde_json::Value>,
    pub source: String,
}

/// An observation row ready for insertion
///
/// Both foreign keys are already resolved to surrogate keys; the engine
/// performs that resolution before handing rows to the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewObservation {
    pub patient_id: SurrogateId,
    pub visit_id: SurrogateId,
    pub concept_code: String,
    pub kind: ValueKind,
    pub value: ValueSlots,
    pub unit_code: Option<String>,
    pub observed_at: Option<DateTime<Utc>>,
    pub source: String,
}

impl NewObservation {
    /// Builds an insert row from a canonical record and its resolved keys
    pub fn from_record(
        record: &ObservationRecord,
        patient_id: SurrogateId,
        visit_id: SurrogateId,
    ) -> Self {
        Self {
            patient_id,
            visit_id,
            concept_code: record.concept_code.clone(),
            kind: record.kind,
            value: record.value.clone(),
            unit_code: record.unit_code.clone(),
            observed_at: record.observed_at,
            source: record.source.clone(),
        }
    }
}

/// Result of a batch observation insert
#[derive(Debug, Clone, Default)]
pub struct BulkCreateResult {
    /// Number of rows successfully created
    pub success_count: usize,

    /// Details of rows that failed
    pub failures: Vec<BulkCreateFailure>,
}

/// Details of a failed row in a batch insert
#[derive(Debug, Clone)]
pub struct BulkCreateFailure {
    /// Position of the row in the submitted batch
    pub index: usize,

    /// Error message
    pub error: String,
}

/// Patient repository contract
#[async_trait]
pub trait PatientStore: Send + Sync {
    /// Looks up a patient by natural key
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails for reasons other than "not found".
    async fn find_by_code(&self, code: &PatientCode) -> Result<Option<StoredPatient>>;

    /// Creates a patient, assigning a fresh surrogate key
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateKey`](crate::domain::StoreError::DuplicateKey)
    /// if the natural key already exists.
    async fn create_patient(&self, record: &PatientRecord) -> Result<StoredPatient>;

    /// Merges the non-null patch fields onto an existing patient
    ///
    /// Returns `true` when a row was updated, `false` when no row matched.
    async fn update_patient(&self, id: &SurrogateId, patch: &PatientPatch) -> Result<bool>;
}

/// Visit repository contract
///
/// Visits have no natural key lookup: the engine never de-duplicates them,
/// so each import creates new visit rows.
#[async_trait]
pub trait VisitStore: Send + Sync {
    /// Creates a visit under the given patient surrogate key
    async fn create_visit(
        &self,
        patient_id: SurrogateId,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        location_code: Option<String>,
        inpatient: bool,
        notes: Option<serde_json::Value>,
        source: String,
    ) -> Result<StoredVisit>;
}

/// Observation repository contract
#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Creates a batch of observation rows
    ///
    /// Partial failure is expected: rows that cannot be written come back in
    /// the result's failure list rather than failing the whole batch.
    async fn create_observations(&self, rows: Vec<NewObservation>) -> Result<BulkCreateResult>;

    /// Counts observations held for a patient
    async fn observation_count_for(&self, patient_id: &SurrogateId) -> Result<usize>;
}

/// Combined store contract held by the reconciliation engine
pub trait ImportStore: PatientStore + VisitStore + ObservationStore {}

impl<T: PatientStore + VisitStore + ObservationStore> ImportStore for T {}
