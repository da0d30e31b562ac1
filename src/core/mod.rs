//! Import pipeline
//!
//! The pipeline is detect → parse → reconcile. [`import`] holds the
//! orchestrator that callers use, [`reconcile`] the store-facing engine,
//! and [`options`] the per-run knobs.

pub mod import;
pub mod options;
pub mod reconcile;

pub use import::ImportOrchestrator;
pub use options::{DuplicateStrategy, ImportOptions, ValidationLevel};
pub use reconcile::ReconciliationEngine;
