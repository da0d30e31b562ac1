//! Reconciliation
//!
//! Natural-key to surrogate-key resolution and the duplicate policy live
//! here. Parsers never see the store; everything store-facing funnels
//! through [`ReconciliationEngine`].

pub mod engine;
pub mod precheck;

pub use engine::ReconciliationEngine;
pub use precheck::precheck;
