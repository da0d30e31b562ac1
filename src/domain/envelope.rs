//! Import result envelope
//!
//! Structures for reporting the outcome of an import run: per-entity counts,
//! the run's identifier map, and a flat list of structured issues. Built
//! incrementally through the pipeline and returned once, at the end, so the
//! caller can decide whether a partially-successful import is acceptable.

use super::idmap::IdentifierMap;
use serde::Serialize;
use std::time::Duration;

/// Machine-readable issue code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    /// No parser matched the file
    UnsupportedFormat,
    /// Content exceeds the configured size limit
    FileTooLarge,
    /// A parser fault, wrapped rather than propagated
    ImportFailed,
    /// The canonical model is not a recognizable shape
    InvalidStructure,
    /// The canonical model contains zero patients
    NoPatients,
    /// A patient record has an empty natural key
    MissingPatientId,
    /// An incoming patient matched an existing natural key
    DuplicatePatient,
    /// A visit or observation references an unresolvable patient
    UnresolvedPatientRef,
    /// An observation references an unresolvable visit
    UnresolvedVisitRef,
    /// The populated value slot does not match the declared kind
    ValueKindMismatch,
    /// The store collaborator rejected a write
    StoreFailure,
}

impl IssueCode {
    /// Wire representation of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCode::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            IssueCode::FileTooLarge => "FILE_TOO_LARGE",
            IssueCode::ImportFailed => "IMPORT_FAILED",
            IssueCode::InvalidStructure => "INVALID_STRUCTURE",
            IssueCode::NoPatients => "NO_PATIENTS",
            IssueCode::MissingPatientId => "MISSING_PATIENT_ID",
            IssueCode::DuplicatePatient => "DUPLICATE_PATIENT",
            IssueCode::UnresolvedPatientRef => "UNRESOLVED_PATIENT_REF",
            IssueCode::UnresolvedVisitRef => "UNRESOLVED_VISIT_REF",
            IssueCode::ValueKindMismatch => "VALUE_KIND_MISMATCH",
            IssueCode::StoreFailure => "STORE_FAILURE",
        }
    }
}

/// Issue severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    /// Recorded but did not remove data from the run
    Warning,
    /// A record or the whole run was rejected
    Error,
}

/// Entity kind for positioning issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Patient,
    Visit,
    Observation,
}

/// Position of the offending record in the canonical batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordPosition {
    /// Which canonical list the record sits in
    pub kind: RecordKind,
    /// Zero-based index into that list
    pub index: usize,
}

impl RecordPosition {
    /// Position of the patient record at `index`
    pub fn patient(index: usize) -> Self {
        Self {
            kind: RecordKind::Patient,
            index,
        }
    }

    /// Position of the visit record at `index`
    pub fn visit(index: usize) -> Self {
        Self {
            kind: RecordKind::Visit,
            index,
        }
    }

    /// Position of the observation record at `index`
    pub fn observation(index: usize) -> Self {
        Self {
            kind: RecordKind::Observation,
            index,
        }
    }
}

/// One structured issue from an import run
#[derive(Debug, Clone, Serialize)]
pub struct ImportIssue {
    /// Machine-readable code
    pub code: IssueCode,

    /// Severity
    pub severity: IssueSeverity,

    /// Human-readable message
    pub message: String,

    /// Offending record position, when the issue is record-level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<RecordPosition>,
}

impl ImportIssue {
    /// Creates an error-severity issue
    pub fn error(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: IssueSeverity::Error,
            message: message.into(),
            position: None,
        }
    }

    /// Creates a warning-severity issue
    pub fn warning(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: IssueSeverity::Warning,
            message: message.into(),
            position: None,
        }
    }

    /// Attaches the offending record's position
    pub fn at(mut self, position: RecordPosition) -> Self {
        self.position = Some(position);
        self
    }
}

/// Per-entity outcome counts
///
/// Invariant: imported + duplicates + failed equals the number of input
/// records of that entity type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityCounts {
    /// Records created in the store
    pub imported: usize,
    /// Records resolved against existing store content
    pub duplicates: usize,
    /// Records rejected at the record level
    pub failed: usize,
}

impl EntityCounts {
    /// Total records accounted for
    pub fn total(&self) -> usize {
        self.imported + self.duplicates + self.failed
    }
}

/// Result envelope for one import run
#[derive(Debug, Clone, Serialize)]
pub struct ImportEnvelope {
    /// False only when the run aborted before or during reconciliation;
    /// record-level failures leave this true.
    pub success: bool,

    /// Patient phase counts
    pub patients: EntityCounts,

    /// Visit phase counts
    pub visits: EntityCounts,

    /// Observation phase counts
    pub observations: EntityCounts,

    /// Natural/temporary key → surrogate key map built during the run
    pub id_map: IdentifierMap,

    /// Structured errors and warnings, in discovery order
    pub issues: Vec<ImportIssue>,

    /// Wall-clock duration of the run
    #[serde(serialize_with = "serialize_duration_ms", rename = "duration_ms")]
    pub duration: Duration,
}

impl ImportEnvelope {
    /// Creates an empty successful envelope
    pub fn new() -> Self {
        Self {
            success: true,
            patients: EntityCounts::default(),
            visits: EntityCounts::default(),
            observations: EntityCounts::default(),
            id_map: IdentifierMap::new(),
            issues: Vec::new(),
            duration: Duration::from_secs(0),
        }
    }

    /// Creates a failed envelope carrying a single issue and no data
    ///
    /// Used for whole-run rejections: unsupported format, oversize content,
    /// parser faults, and pre-check failures.
    pub fn rejected(issue: ImportIssue) -> Self {
        let mut envelope = Self::new();
        envelope.success = false;
        envelope.issues.push(issue);
        envelope
    }

    /// Appends an issue
    pub fn add_issue(&mut self, issue: ImportIssue) {
        self.issues.push(issue);
    }

    /// Sets the run duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Issues of error severity
    pub fn errors(&self) -> impl Iterator<Item = &ImportIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Error)
    }

    /// True when the run completed and no record failed
    pub fn is_clean(&self) -> bool {
        self.success
            && self.patients.failed == 0
            && self.visits.failed == 0
            && self.observations.failed == 0
    }

    /// Logs a structured summary of the run
    pub fn log_summary(&self) {
        tracing::info!(
            success = self.success,
            patients_imported = self.patients.imported,
            patients_duplicate = self.patients.duplicates,
            patients_failed = self.patients.failed,
            visits_imported = self.visits.imported,
            visits_failed = self.visits.failed,
            observations_imported = self.observations.imported,
            observations_failed = self.observations.failed,
            id_map_entries = self.id_map.len(),
            duration_ms = self.duration.as_millis() as u64,
            "Import completed"
        );

        if !self.issues.is_empty() {
            tracing::warn!(issue_count = self.issues.len(), "Import recorded issues");
            for issue in &self.issues {
                tracing::warn!(
                    code = issue.code.as_str(),
                    severity = ?issue.severity,
                    message = %issue.message,
                    "Import issue"
                );
            }
        }
    }
}

impl Default for ImportEnvelope {
    fn default() -> Self {
        Self::new()
    }
}

fn serialize_duration_ms<S>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}
