//! Import run options

use crate::domain::{IntakeError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Default ceiling on accepted content size (32 MiB)
pub const DEFAULT_MAX_FILE_SIZE: usize = 32 * 1024 * 1024;

/// Policy applied when an incoming patient natural key already exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateStrategy {
    /// Leave the store record untouched; downstream references still resolve
    #[default]
    Skip,
    /// Merge incoming non-null fields onto the existing record
    Update,
    /// Abort the whole import, naming the offending natural key
    Error,
}

impl FromStr for DuplicateStrategy {
    type Err = IntakeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "skip" => Ok(DuplicateStrategy::Skip),
            "update" => Ok(DuplicateStrategy::Update),
            "error" => Ok(DuplicateStrategy::Error),
            other => Err(IntakeError::Configuration(format!(
                "Unknown duplicate strategy '{other}' (expected skip, update, or error)"
            ))),
        }
    }
}

/// Record validation level
///
/// Only `strict` is supported: any record missing a required field is
/// rejected. Lenient modes are reserved and refused at configuration time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    #[default]
    Strict,
}

impl FromStr for ValidationLevel {
    type Err = IntakeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(ValidationLevel::Strict),
            other => Err(IntakeError::Configuration(format!(
                "Unsupported validation level '{other}' (only strict is supported)"
            ))),
        }
    }
}

/// Options for one import run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportOptions {
    /// Duplicate policy for patients (default `skip`)
    pub duplicate_strategy: DuplicateStrategy,

    /// Reject content above this size before parsing
    pub max_file_size: usize,

    /// Record validation level
    pub validation_level: ValidationLevel,

    /// Run the full pipeline without any store writes
    pub dry_run: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            duplicate_strategy: DuplicateStrategy::default(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            validation_level: ValidationLevel::default(),
            dry_run: false,
        }
    }
}

impl ImportOptions {
    /// Creates options from configuration strings
    pub fn from_config(
        duplicate_strategy: &str,
        max_file_size: usize,
        validation_level: &str,
        dry_run: bool,
    ) -> Result<Self> {
        Ok(Self {
            duplicate_strategy: duplicate_strategy.parse()?,
            max_file_size,
            validation_level: validation_level.parse()?,
            dry_run,
        })
    }

    /// Sets the duplicate strategy
    pub fn with_strategy(mut self, strategy: DuplicateStrategy) -> Self {
        self.duplicate_strategy = strategy;
        self
    }

    /// Sets the dry-run flag
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ImportOptions::default();
        assert_eq!(options.duplicate_strategy, DuplicateStrategy::Skip);
        assert_eq!(options.max_file_size, DEFAULT_MAX_FILE_SIZE);
        assert_eq!(options.validation_level, ValidationLevel::Strict);
        assert!(!options.dry_run);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!(
            "update".parse::<DuplicateStrategy>().unwrap(),
            DuplicateStrategy::Update
        );
        assert_eq!(
            " Error ".parse::<DuplicateStrategy>().unwrap(),
            DuplicateStrategy::Error
        );
        assert!("merge".parse::<DuplicateStrategy>().is_err());
    }

    #[test]
    fn test_lenient_validation_refused() {
        assert!("lenient".parse::<ValidationLevel>().is_err());
        assert!("strict".parse::<ValidationLevel>().is_ok());
    }

    #[test]
    fn test_from_config() {
        let options = ImportOptions::from_config("error", 1024, "strict", true).unwrap();
        assert_eq!(options.duplicate_strategy, DuplicateStrategy::Error);
        assert_eq!(options.max_file_size, 1024);
        assert!(options.dry_run);
    }
}
