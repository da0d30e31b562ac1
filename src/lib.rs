// intake - Clinical Data Import and Reconciliation Tool
// Copyright (c) 2026 intake Contributors
// Licensed under the MIT License

//! # intake - Clinical Data Import and Reconciliation
//!
//! intake is a library and CLI for importing clinical research data from
//! heterogeneous export formats into a single canonical store. It detects
//! the format of raw content, normalizes it into a common patient → visit →
//! observation model, and reconciles external identifiers against the
//! store's surrogate keys with a configurable duplicate policy.
//!
//! ## Overview
//!
//! An import runs in three stages:
//!
//! - **Detect**: weak-signal format detection from filename extension and
//!   content sniffing
//! - **Normalize**: a format plugin parses the content into a
//!   [`CanonicalBatch`](domain::batch::CanonicalBatch)
//! - **Reconcile**: natural keys are resolved to surrogate keys and records
//!   are written through the store, with per-record failure accounting
//!
//! Supported formats: delimited CSV tables, FHIR-style JSON bundles, HL7
//! v2-style pipe-delimited messages, and `##CLIN-EXPORT` sectioned text.
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Import pipeline (orchestration, options, reconciliation)
//! - [`formats`] - Format detection and parser plugins
//! - [`store`] - Store traits and the in-memory adapter
//! - [`domain`] - Canonical records, identifiers, errors, result envelope
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging and observability
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use intake::core::import::ImportOrchestrator;
//! use intake::core::options::ImportOptions;
//! use intake::store::MemoryStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(MemoryStore::new());
//!     let orchestrator = ImportOrchestrator::new(store);
//!
//!     let content = "MSH|^~\\&|LAB\nPID|1||P1\nOBX|1|NM|HR||72";
//!     let envelope = orchestrator
//!         .import_file(content, Some("vitals.hl7"), &ImportOptions::default())
//!         .await;
//!
//!     println!(
//!         "imported {} patients, {} observations",
//!         envelope.patients.imported, envelope.observations.imported
//!     );
//! }
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod formats;
pub mod logging;
pub mod store;
