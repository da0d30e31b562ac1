//! Reconciliation engine
//!
//! Takes a canonical batch and writes it through the store in three phases,
//! building the run's identifier map as it goes:
//!
//! 1. Patients: resolve each natural key against the store, applying the
//!    configured duplicate strategy, and record `code → surrogate` entries.
//! 2. Visits: resolve the owning patient through the map and create a row,
//!    recording `handle → surrogate` entries.
//! 3. Observations: resolve both foreign keys through the map and bulk-insert
//!    the rows that survive.
//!
//! Patients referenced by visits or observations but absent from the batch
//! are resolved against the store and cached in the map; only natural keys
//! created this run skip the store round trip.
//!
//! Record-level problems, store lookup faults included, fail the single
//! record and continue; the run aborts only on a pre-check failure or a
//! duplicate natural key under the `error` strategy.

use super::precheck::precheck;
use crate::core::options::{DuplicateStrategy, ImportOptions};
use crate::domain::batch::CanonicalBatch;
use crate::domain::envelope::{ImportEnvelope, ImportIssue, IssueCode, RecordPosition};
use crate::domain::idmap::IdentifierMap;
use crate::domain::ids::{PatientCode, SurrogateId};
use crate::domain::records::VisitRecord;
use crate::domain::{IntakeError, Result};
use crate::store::traits::{ImportStore, NewObservation};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Location code stamped on visits synthesized for floating observations
const DEFAULT_VISIT_LOCATION: &str = "UNASSIGNED";

/// Writes canonical batches through an [`ImportStore`]
pub struct ReconciliationEngine {
    store: Arc<dyn ImportStore>,
}

impl ReconciliationEngine {
    /// Creates an engine over the given store
    pub fn new(store: Arc<dyn ImportStore>) -> Self {
        Self { store }
    }

    /// Reconciles a batch against the store
    ///
    /// Returns the envelope describing the run. Record-level failures are
    /// reported inside the envelope with `success` still true.
    ///
    /// # Errors
    ///
    /// Returns [`IntakeError::DuplicatePatient`] when the duplicate strategy
    /// is `error` and an incoming natural key already exists, and propagates
    /// store faults raised during that strategy's lookup pass. Both happen
    /// before the first write, so nothing has been committed on abort.
    pub async fn import_to_database(
        &self,
        batch: &CanonicalBatch,
        options: &ImportOptions,
    ) -> Result<ImportEnvelope> {
        let mut envelope = ImportEnvelope::new();

        if let Some(issue) = precheck(batch) {
            warn!(code = issue.code.as_str(), "Batch rejected by pre-check");
            return Ok(ImportEnvelope::rejected(issue));
        }

        // Under the error strategy every lookup happens before any write, so
        // an abort leaves the store untouched.
        if options.duplicate_strategy == DuplicateStrategy::Error {
            let lookups = batch
                .patients
                .iter()
                .map(|patient| self.store.find_by_code(&patient.code));
            let existing = futures::future::try_join_all(lookups).await?;
            if let Some(patient) = batch
                .patients
                .iter()
                .zip(&existing)
                .find_map(|(patient, found)| found.as_ref().map(|_| patient))
            {
                return Err(IntakeError::DuplicatePatient(
                    patient.code.as_str().to_string(),
                ));
            }
        }

        info!(
            source = %batch.metadata.source_system,
            patients = batch.patients.len(),
            visits = batch.visits.len(),
            observations = batch.observations.len(),
            dry_run = options.dry_run,
            "Starting reconciliation"
        );

        self.reconcile_patients(batch, options, &mut envelope).await;
        self.reconcile_visits(batch, options, &mut envelope).await;
        self.reconcile_observations(batch, options, &mut envelope)
            .await;

        Ok(envelope)
    }

    async fn reconcile_patients(
        &self,
        batch: &CanonicalBatch,
        options: &ImportOptions,
        envelope: &mut ImportEnvelope,
    ) {
        for (index, patient) in batch.patients.iter().enumerate() {
            // A code repeated within the batch resolves to the first entry.
            if envelope.id_map.patient(&patient.code).is_some() {
                envelope.patients.duplicates += 1;
                envelope.add_issue(
                    ImportIssue::warning(
                        IssueCode::DuplicatePatient,
                        format!("patient '{}' appears more than once in batch", patient.code),
                    )
                    .at(RecordPosition::patient(index)),
                );
                continue;
            }

            let found = match self.store.find_by_code(&patient.code).await {
                Ok(found) => found,
                Err(e) => {
                    envelope.patients.failed += 1;
                    envelope.add_issue(
                        ImportIssue::error(
                            IssueCode::StoreFailure,
                            format!("lookup of patient '{}' failed: {e}", patient.code),
                        )
                        .at(RecordPosition::patient(index)),
                    );
                    continue;
                }
            };
            match found {
                Some(existing) => {
                    debug!(code = %patient.code, strategy = ?options.duplicate_strategy,
                           "Patient already exists");
                    if options.duplicate_strategy == DuplicateStrategy::Update {
                        let patch = patient.to_patch();
                        if !options.dry_run && !patch.is_empty() {
                            if let Err(e) = self.store.update_patient(&existing.id, &patch).await {
                                envelope.patients.failed += 1;
                                envelope.add_issue(
                                    ImportIssue::error(
                                        IssueCode::StoreFailure,
                                        format!("update of patient '{}' failed: {e}", patient.code),
                                    )
                                    .at(RecordPosition::patient(index)),
                                );
                                continue;
                            }
                        }
                    }
                    envelope.patients.duplicates += 1;
                    envelope.id_map.insert_patient(patient.code.clone(), existing.id);
                }
                None if options.dry_run => {
                    envelope.patients.imported += 1;
                    envelope
                        .id_map
                        .insert_patient(patient.code.clone(), SurrogateId::generate());
                }
                None => match self.store.create_patient(patient).await {
                    Ok(stored) => {
                        envelope.patients.imported += 1;
                        envelope.id_map.insert_patient(patient.code.clone(), stored.id);
                    }
                    Err(e) => {
                        envelope.patients.failed += 1;
                        envelope.add_issue(
                            ImportIssue::error(
                                IssueCode::StoreFailure,
                                format!("create of patient '{}' failed: {e}", patient.code),
                            )
                            .at(RecordPosition::patient(index)),
                        );
                    }
                },
            }
        }
    }

    /// Resolves a patient surrogate key by natural key
    ///
    /// Consults the run's map first, then falls back to the store for
    /// patients that exist outside this run, caching any hit in the map so
    /// later records skip the round trip.
    async fn resolve_patient(
        &self,
        code: &PatientCode,
        id_map: &mut IdentifierMap,
    ) -> Result<Option<SurrogateId>> {
        if let Some(id) = id_map.patient(code) {
            return Ok(Some(id));
        }
        match self.store.find_by_code(code).await? {
            Some(existing) => {
                debug!(code = %code, "Resolved patient from store");
                id_map.insert_patient(code.clone(), existing.id);
                Ok(Some(existing.id))
            }
            None => Ok(None),
        }
    }

    async fn reconcile_visits(
        &self,
        batch: &CanonicalBatch,
        options: &ImportOptions,
        envelope: &mut ImportEnvelope,
    ) {
        for (index, visit) in batch.visits.iter().enumerate() {
            let patient_id = match self
                .resolve_patient(&visit.patient_code, &mut envelope.id_map)
                .await
            {
                Ok(Some(id)) => id,
                Ok(None) => {
                    envelope.visits.failed += 1;
                    envelope.add_issue(
                        ImportIssue::error(
                            IssueCode::UnresolvedPatientRef,
                            format!("visit references unknown patient '{}'", visit.patient_code),
                        )
                        .at(RecordPosition::visit(index)),
                    );
                    continue;
                }
                Err(e) => {
                    envelope.visits.failed += 1;
                    envelope.add_issue(
                        ImportIssue::error(
                            IssueCode::StoreFailure,
                            format!(
                                "lookup of patient '{}' failed: {e}",
                                visit.patient_code
                            ),
                        )
                        .at(RecordPosition::visit(index)),
                    );
                    continue;
                }
            };

            if options.dry_run {
                envelope.visits.imported += 1;
                envelope
                    .id_map
                    .insert_visit(visit.handle.clone(), SurrogateId::generate());
                continue;
            }

            match self.create_visit_row(patient_id, visit).await {
                Ok(id) => {
                    envelope.visits.imported += 1;
                    envelope.id_map.insert_visit(visit.handle.clone(), id);
                }
                Err(e) => {
                    envelope.visits.failed += 1;
                    envelope.add_issue(
                        ImportIssue::error(
                            IssueCode::StoreFailure,
                            format!("create of visit {} failed: {e}", visit.handle),
                        )
                        .at(RecordPosition::visit(index)),
                    );
                }
            }
        }
    }

    async fn create_visit_row(&self, patient_id: SurrogateId, visit: &VisitRecord) -> Result<SurrogateId> {
        let stored = self
            .store
            .create_visit(
                patient_id,
                visit.start,
                visit.end,
                visit.location_code.clone(),
                visit.inpatient,
                visit.notes.clone(),
                visit.source.clone(),
            )
            .await?;
        Ok(stored.id)
    }

    async fn reconcile_observations(
        &self,
        batch: &CanonicalBatch,
        options: &ImportOptions,
        envelope: &mut ImportEnvelope,
    ) {
        // Observations without a resolvable visit are parked under one
        // synthesized visit per patient rather than dropped.
        let mut default_visits: HashMap<SurrogateId, SurrogateId> = HashMap::new();

        let mut rows: Vec<NewObservation> = Vec::new();
        // Row position in `rows` → record position in the batch, for mapping
        // bulk-insert failures back to their source records.
        let mut positions: Vec<usize> = Vec::new();

        for (index, obs) in batch.observations.iter().enumerate() {
            let patient_id = match self
                .resolve_patient(&obs.patient_code, &mut envelope.id_map)
                .await
            {
                Ok(Some(id)) => id,
                Ok(None) => {
                    envelope.observations.failed += 1;
                    envelope.add_issue(
                        ImportIssue::error(
                            IssueCode::UnresolvedPatientRef,
                            format!(
                                "observation references unknown patient '{}'",
                                obs.patient_code
                            ),
                        )
                        .at(RecordPosition::observation(index)),
                    );
                    continue;
                }
                Err(e) => {
                    envelope.observations.failed += 1;
                    envelope.add_issue(
                        ImportIssue::error(
                            IssueCode::StoreFailure,
                            format!("lookup of patient '{}' failed: {e}", obs.patient_code),
                        )
                        .at(RecordPosition::observation(index)),
                    );
                    continue;
                }
            };

            if !obs.value.matches(obs.kind) {
                envelope.observations.failed += 1;
                envelope.add_issue(
                    ImportIssue::error(
                        IssueCode::ValueKindMismatch,
                        format!(
                            "observation '{}' declares kind {} but that slot is empty",
                            obs.concept_code,
                            obs.kind.as_code()
                        ),
                    )
                    .at(RecordPosition::observation(index)),
                );
                continue;
            }

            let visit_id = match &obs.visit {
                Some(handle) => match envelope.id_map.visit(handle) {
                    Some(id) => id,
                    None => {
                        envelope.add_issue(
                            ImportIssue::warning(
                                IssueCode::UnresolvedVisitRef,
                                format!(
                                    "observation '{}' references unknown visit {handle}; \
                                     attached to default visit",
                                    obs.concept_code
                                ),
                            )
                            .at(RecordPosition::observation(index)),
                        );
                        match self
                            .default_visit(patient_id, batch, options, &mut default_visits)
                            .await
                        {
                            Ok(id) => id,
                            Err(e) => {
                                envelope.observations.failed += 1;
                                envelope.add_issue(
                                    ImportIssue::error(
                                        IssueCode::StoreFailure,
                                        format!("default visit creation failed: {e}"),
                                    )
                                    .at(RecordPosition::observation(index)),
                                );
                                continue;
                            }
                        }
                    }
                },
                None => match self
                    .default_visit(patient_id, batch, options, &mut default_visits)
                    .await
                {
                    Ok(id) => id,
                    Err(e) => {
                        envelope.observations.failed += 1;
                        envelope.add_issue(
                            ImportIssue::error(
                                IssueCode::StoreFailure,
                                format!("default visit creation failed: {e}"),
                            )
                            .at(RecordPosition::observation(index)),
                        );
                        continue;
                    }
                },
            };

            rows.push(NewObservation::from_record(obs, patient_id, visit_id));
            positions.push(index);
        }

        if options.dry_run {
            envelope.observations.imported += rows.len();
            return;
        }
        if rows.is_empty() {
            return;
        }

        match self.store.create_observations(rows).await {
            Ok(result) => {
                envelope.observations.imported += result.success_count;
                for failure in result.failures {
                    envelope.observations.failed += 1;
                    envelope.add_issue(
                        ImportIssue::error(
                            IssueCode::StoreFailure,
                            format!("observation insert failed: {}", failure.error),
                        )
                        .at(RecordPosition::observation(positions[failure.index])),
                    );
                }
            }
            Err(e) => {
                // The whole bulk insert failed; every submitted row failed.
                envelope.observations.failed += positions.len();
                envelope.add_issue(ImportIssue::error(
                    IssueCode::StoreFailure,
                    format!("observation batch insert failed: {e}"),
                ));
            }
        }
    }

    /// Returns the synthesized catch-all visit for a patient, creating it on
    /// first use. Outpatient, no timestamps, location `UNASSIGNED`.
    async fn default_visit(
        &self,
        patient_id: SurrogateId,
        batch: &CanonicalBatch,
        options: &ImportOptions,
        default_visits: &mut HashMap<SurrogateId, SurrogateId>,
    ) -> Result<SurrogateId> {
        if let Some(id) = default_visits.get(&patient_id) {
            return Ok(*id);
        }
        let id = if options.dry_run {
            SurrogateId::generate()
        } else {
            self.store
                .create_visit(
                    patient_id,
                    None,
                    None,
                    Some(DEFAULT_VISIT_LOCATION.to_string()),
                    false,
                    None,
                    batch.metadata.source_system.clone(),
                )
                .await?
                .id
        };
        default_visits.insert(patient_id, id);
        Ok(id)
    }
}
