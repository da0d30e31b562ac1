//! Configuration schema
//!
//! Type-safe structs for the TOML configuration file, one per section, each
//! with defaults and a `validate()` that reports the first problem found.

use crate::core::options::{DuplicateStrategy, ImportOptions, ValidationLevel};
use crate::domain::{IntakeError, Result};
use serde::{Deserialize, Serialize};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntakeConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Import pipeline settings
    #[serde(default)]
    pub import: ImportConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl IntakeConfig {
    /// Validates every section
    ///
    /// # Errors
    ///
    /// Returns [`IntakeError::Configuration`] naming the first invalid
    /// setting.
    pub fn validate(&self) -> Result<()> {
        self.application.validate()?;
        self.import.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Builds per-run import options from the `[import]` section
    ///
    /// # Errors
    ///
    /// Returns an error when the strategy or validation level string does
    /// not parse.
    pub fn import_options(&self) -> Result<ImportOptions> {
        ImportOptions::from_config(
            &self.import.duplicate_strategy,
            self.import.max_file_size_bytes,
            &self.import.validation_level,
            self.import.dry_run,
        )
    }
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name used in logs
    #[serde(default = "default_app_name")]
    pub name: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl ApplicationConfig {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(IntakeError::Configuration(
                "application.name must not be empty".to_string(),
            ));
        }
        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(IntakeError::Configuration(format!(
                "application.log_level '{other}' is invalid (expected trace, debug, info, warn, or error)"
            ))),
        }
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_level: default_log_level(),
        }
    }
}

/// Import pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Duplicate policy for patients (skip, update, error)
    #[serde(default = "default_duplicate_strategy")]
    pub duplicate_strategy: String,

    /// Reject content above this size before parsing
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: usize,

    /// Record validation level (only strict is supported)
    #[serde(default = "default_validation_level")]
    pub validation_level: String,

    /// Run the full pipeline without store writes
    #[serde(default)]
    pub dry_run: bool,
}

impl ImportConfig {
    fn validate(&self) -> Result<()> {
        self.duplicate_strategy.parse::<DuplicateStrategy>()?;
        self.validation_level.parse::<ValidationLevel>()?;
        if self.max_file_size_bytes == 0 {
            return Err(IntakeError::Configuration(
                "import.max_file_size_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            duplicate_strategy: default_duplicate_strategy(),
            max_file_size_bytes: default_max_file_size(),
            validation_level: default_validation_level(),
            dry_run: false,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Write JSON logs to a local rotating file
    #[serde(default)]
    pub local_enabled: bool,

    /// Directory for local log files
    #[serde(default = "default_log_path")]
    pub local_path: String,

    /// Rotation schedule (daily, hourly)
    #[serde(default = "default_log_rotation")]
    pub local_rotation: String,
}

impl LoggingConfig {
    fn validate(&self) -> Result<()> {
        if self.local_enabled && self.local_path.trim().is_empty() {
            return Err(IntakeError::Configuration(
                "logging.local_path must be set when logging.local_enabled is true".to_string(),
            ));
        }
        match self.local_rotation.as_str() {
            "daily" | "hourly" => Ok(()),
            other => Err(IntakeError::Configuration(format!(
                "logging.local_rotation '{other}' is invalid (expected daily or hourly)"
            ))),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: false,
            local_path: default_log_path(),
            local_rotation: default_log_rotation(),
        }
    }
}

fn default_app_name() -> String {
    "intake".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_duplicate_strategy() -> String {
    "skip".to_string()
}

fn default_max_file_size() -> usize {
    crate::core::options::DEFAULT_MAX_FILE_SIZE
}

fn default_validation_level() -> String {
    "strict".to_string()
}

fn default_log_path() -> String {
    "logs".to_string()
}

fn default_log_rotation() -> String {
    "daily".to_string()
}
