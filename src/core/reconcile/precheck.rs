//! Structural pre-checks on a parsed batch
//!
//! Run once before reconciliation touches the store. A failed pre-check
//! rejects the whole run; nothing is written.

use crate::domain::batch::CanonicalBatch;
use crate::domain::envelope::{ImportIssue, IssueCode, RecordPosition};

/// Checks a batch for structural problems
///
/// Returns the first issue found, or `None` when the batch is fit for
/// reconciliation. Checked in order: a batch with no records at all, a
/// patient record carrying a blank natural key, and a batch whose visits or
/// observations have no patient to hang from.
pub fn precheck(batch: &CanonicalBatch) -> Option<ImportIssue> {
    if batch.is_empty() {
        return Some(ImportIssue::error(
            IssueCode::InvalidStructure,
            "batch contains no records",
        ));
    }

    // PatientCode::new refuses blank codes, but records that arrive through
    // deserialization bypass that constructor.
    for (index, patient) in batch.patients.iter().enumerate() {
        if patient.code.as_str().trim().is_empty() {
            return Some(
                ImportIssue::error(
                    IssueCode::MissingPatientId,
                    format!("patient record {index} has a blank identifier"),
                )
                .at(RecordPosition::patient(index)),
            );
        }
    }

    if batch.patients.is_empty() {
        return Some(ImportIssue::error(
            IssueCode::NoPatients,
            "batch contains visits or observations but no patients",
        ));
    }

    None
}
