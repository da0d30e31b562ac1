//! Domain models and types for Intake.
//!
//! This module contains the core domain models, types, and business rules for
//! the import-and-reconciliation pipeline.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Strongly-typed identifiers** ([`PatientCode`], [`SurrogateId`], [`VisitHandle`])
//! - **Canonical records** ([`PatientRecord`], [`VisitRecord`], [`ObservationRecord`])
//! - **The canonical import model** ([`CanonicalBatch`])
//! - **The run-scoped identifier map** ([`IdentifierMap`])
//! - **The result envelope** ([`ImportEnvelope`], [`ImportIssue`])
//! - **Error types** ([`IntakeError`], [`ParseError`], [`StoreError`])
//! - **Result type alias** ([`Result`])
//!
//! # Type Safety
//!
//! Intake uses the newtype pattern for identifiers to prevent mixing natural
//! and surrogate keys:
//!
//! ```rust
//! use intake::domain::{PatientCode, SurrogateId};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let code = PatientCode::new("P-10442")?;
//! let surrogate = SurrogateId::generate();
//!
//! // This won't compile - type safety prevents mixing keys
//! // let wrong: PatientCode = surrogate;  // Compile error!
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod envelope;
pub mod errors;
pub mod idmap;
pub mod ids;
pub mod records;
pub mod result;

pub use batch::{BatchMetadata, CanonicalBatch};
pub use envelope::{
    EntityCounts, ImportEnvelope, ImportIssue, IssueCode, IssueSeverity, RecordKind,
    RecordPosition,
};
pub use errors::{IntakeError, ParseError, StoreError};
pub use idmap::IdentifierMap;
pub use ids::{PatientCode, SurrogateId, VisitHandle};
pub use records::{
    ObservationRecord, PatientPatch, PatientRecord, ValueKind, ValueSlots, VisitRecord,
};
pub use result::Result;
