//! Store collaborator contracts and adapters
//!
//! The persistent store is an external collaborator: this module specifies
//! its interface ([`traits`]) and ships one adapter ([`MemoryStore`]) that
//! the CLI and tests run against.

pub mod memory;
pub mod traits;

pub use memory::MemoryStore;
pub use traits::{
    BulkCreateFailure, BulkCreateResult, ImportStore, NewObservation, ObservationStore,
    PatientStore, StoredPatient, StoredVisit, VisitStore,
};
