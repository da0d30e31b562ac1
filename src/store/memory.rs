//! In-memory store adapter
//!
//! Implements the repository contracts against process-local maps. Used by
//! the CLI and the test suite; persistent backends plug in through the same
//! traits. Natural-key uniqueness is enforced here so duplicate creates fail
//! loudly, matching what a relational backend's unique constraint would do.

use super::traits::{
    BulkCreateFailure, BulkCreateResult, NewObservation, ObservationStore, PatientStore,
    StoredPatient, StoredVisit, VisitStore,
};
use crate::domain::ids::{PatientCode, SurrogateId};
use crate::domain::records::{PatientPatch, PatientRecord};
use crate::domain::{Result, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Tables {
    patients: HashMap<PatientCode, StoredPatient>,
    visits: Vec<StoredVisit>,
    observations: Vec<StoredObservationRow>,
}

#[derive(Debug, Clone)]
struct StoredObservationRow {
    #[allow(dead_code)]
    id: SurrogateId,
    row: NewObservation,
}

/// In-memory store
///
/// # Examples
///
/// ```
/// use intake::store::MemoryStore;
/// use intake::store::traits::PatientStore;
/// use intake::domain::{PatientCode, PatientRecord};
///
/// # #[tokio::main]
/// # async fn main() -> intake::domain::Result<()> {
/// let store = MemoryStore::new();
/// let record = PatientRecord::builder()
///     .code(PatientCode::new("P1").unwrap())
///     .source("test")
///     .build()
///     .unwrap();
/// let stored = store.create_patient(&record).await?;
/// assert!(store.find_by_code(&record.code).await?.is_some());
/// assert_eq!(stored.code, record.code);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StoreError::QueryFailed("store mutex poisoned".to_string()).into())
    }

    /// Number of patients held
    pub fn patient_count(&self) -> usize {
        self.tables.lock().map(|t| t.patients.len()).unwrap_or(0)
    }

    /// Number of visits held
    pub fn visit_count(&self) -> usize {
        self.tables.lock().map(|t| t.visits.len()).unwrap_or(0)
    }

    /// Number of observations held
    pub fn observation_count(&self) -> usize {
        self.tables
            .lock()
            .map(|t| t.observations.len())
            .unwrap_or(0)
    }

    /// Snapshot of a patient row by natural key
    pub fn patient(&self, code: &PatientCode) -> Option<StoredPatient> {
        self.tables
            .lock()
            .ok()
            .and_then(|t| t.patients.get(code).cloned())
    }

    /// Snapshot of the visit rows owned by a patient
    pub fn visits_for(&self, patient_id: &SurrogateId) -> Vec<StoredVisit> {
        self.tables
            .lock()
            .map(|t| {
                t.visits
                    .iter()
                    .filter(|v| v.patient_id == *patient_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl PatientStore for MemoryStore {
    async fn find_by_code(&self, code: &PatientCode) -> Result<Option<StoredPatient>> {
        let tables = self.lock()?;
        Ok(tables.patients.get(code).cloned())
    }

    async fn create_patient(&self, record: &PatientRecord) -> Result<StoredPatient> {
        let mut tables = self.lock()?;
        if tables.patients.contains_key(&record.code) {
            return Err(StoreError::DuplicateKey(record.code.to_string()).into());
        }

        let stored = StoredPatient {
            id: SurrogateId::generate(),
            code: record.code.clone(),
            sex_code: record.sex_code.clone(),
            age: record.age,
            birth_date: record.birth_date,
            source: record.source.clone(),
        };
        tables.patients.insert(record.code.clone(), stored.clone());
        Ok(stored)
    }

    async fn update_patient(&self, id: &SurrogateId, patch: &PatientPatch) -> Result<bool> {
        let mut tables = self.lock()?;
        for patient in tables.patients.values_mut() {
            if patient.id == *id {
                patient.apply(patch);
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[async_trait]
impl VisitStore for MemoryStore {
    async fn create_visit(
        &self,
        patient_id: SurrogateId,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        location_code: Option<String>,
        inpatient: bool,
        notes: Option<serde_json::Value>,
        source: String,
    ) -> Result<StoredVisit> {
        let mut tables = self.lock()?;
        let visit = StoredVisit {
            id: SurrogateId::generate(),
            patient_id,
            start,
            end,
            location_code,
            inpatient,
            notes,
            source,
        };
        tables.visits.push(visit.clone());
        Ok(visit)
    }
}

#[async_trait]
impl ObservationStore for MemoryStore {
    async fn create_observations(&self, rows: Vec<NewObservation>) -> Result<BulkCreateResult> {
        let mut tables = self.lock()?;
        let mut result = BulkCreateResult::default();

        for (index, row) in rows.into_iter().enumerate() {
            // A row pointing at a visit this store never issued is a
            // referential-integrity violation, reported per row.
            let visit_known = tables.visits.iter().any(|v| v.id == row.visit_id);
            if !visit_known {
                result.failures.push(BulkCreateFailure {
                    index,
                    error: format!("unknown visit id {}", row.visit_id),
                });
                continue;
            }

            tables.observations.push(StoredObservationRow {
                id: SurrogateId::generate(),
                row,
            });
            result.success_count += 1;
        }

        Ok(result)
    }

    async fn observation_count_for(&self, patient_id: &SurrogateId) -> Result<usize> {
        let tables = self.lock()?;
        Ok(tables
            .observations
            .iter()
            .filter(|o| o.row.patient_id == *patient_id)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::records::{ValueKind, ValueSlots};
    use crate::domain::IntakeError;

    fn patient(code: &str) -> PatientRecord {
        PatientRecord::builder()
            .code(PatientCode::new(code).unwrap())
            .source("test")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_find_patient() {
        let store = MemoryStore::new();
        let created = store.create_patient(&patient("P1")).await.unwrap();

        let found = store
            .find_by_code(&PatientCode::new("P1").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(store.patient_count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_create_fails() {
        let store = MemoryStore::new();
        store.create_patient(&patient("P1")).await.unwrap();

        let err = store.create_patient(&patient("P1")).await.unwrap_err();
        assert!(matches!(
            err,
            IntakeError::Store(StoreError::DuplicateKey(_))
        ));
        assert_eq!(store.patient_count(), 1);
    }

    #[tokio::test]
    async fn test_update_patient_merges_patch() {
        let store = MemoryStore::new();
        let created = store.create_patient(&patient("P1")).await.unwrap();

        let patch = PatientPatch {
            sex_code: Some("F".to_string()),
            age: Some(52),
            birth_date: None,
        };
        let updated = store.update_patient(&created.id, &patch).await.unwrap();
        assert!(updated);

        let found = store.patient(&PatientCode::new("P1").unwrap()).unwrap();
        assert_eq!(found.sex_code.as_deref(), Some("F"));
        assert_eq!(found.age, Some(52));
        // Surrogate key stays stable across updates.
        assert_eq!(found.id, created.id);
    }

    #[tokio::test]
    async fn test_update_unknown_patient_returns_false() {
        let store = MemoryStore::new();
        let updated = store
            .update_patient(&SurrogateId::generate(), &PatientPatch::default())
            .await
            .unwrap();
        assert!(!updated);
    }

    #[tokio::test]
    async fn test_observation_batch_reports_bad_visit_refs() {
        let store = MemoryStore::new();
        let p = store.create_patient(&patient("P1")).await.unwrap();
        let visit = store
            .create_visit(p.id, None, None, None, false, None, "test".to_string())
            .await
            .unwrap();

        let good = NewObservation {
            patient_id: p.id,
            visit_id: visit.id,
            concept_code: "HR".to_string(),
            kind: ValueKind::Numeric,
            value: ValueSlots::numeric(61.0),
            unit_code: Some("bpm".to_string()),
            observed_at: None,
            source: "test".to_string(),
        };
        let mut bad = good.clone();
        bad.visit_id = SurrogateId::generate();

        let result = store
            .create_observations(vec![good, bad])
            .await
            .unwrap();

        assert_eq!(result.success_count, 1);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].index, 1);
        assert_eq!(store.observation_count_for(&p.id).await.unwrap(), 1);
    }
}
