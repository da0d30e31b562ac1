//! Configuration management
//!
//! TOML-based configuration with environment variable substitution
//! (`${VAR_NAME}`), `INTAKE_*` overrides, defaults for every setting, and
//! validation on load.
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! name = "intake"
//! log_level = "info"
//!
//! [import]
//! duplicate_strategy = "skip"
//! max_file_size_bytes = 33554432
//! validation_level = "strict"
//!
//! [logging]
//! local_enabled = true
//! local_path = "logs"
//! local_rotation = "daily"
//! ```

pub mod loader;
pub mod schema;

pub use loader::load_config;
pub use schema::{ApplicationConfig, ImportConfig, IntakeConfig, LoggingConfig};
