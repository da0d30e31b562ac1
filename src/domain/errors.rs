//! Domain error types
//!
//! This module defines the error hierarchy for Intake. All errors are
//! domain-specific and don't expose third-party types.

use thiserror::Error;

/// Main Intake error type
///
/// This is the primary error type used throughout the application.
/// It wraps specific error types and provides context for error handling.
#[derive(Debug, Error)]
pub enum IntakeError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Parser-related errors
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Store-related errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Reconciliation process errors
    #[error("Reconciliation error: {0}")]
    Reconciliation(String),

    /// Duplicate natural key under the `error` duplicate strategy
    #[error("Patient code already exists in store: {0}")]
    DuplicatePatient(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

/// Parser-specific errors
///
/// Structured failures produced by format parsers. These never carry
/// third-party parser types so plugins stay swappable.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Content is not well-formed for the detected format
    #[error("Malformed {format} content: {message}")]
    Malformed { format: String, message: String },

    /// A required field is absent from a record
    #[error("Missing required field '{field}' in record {index}")]
    MissingField { field: String, index: usize },

    /// A field value could not be interpreted
    #[error("Invalid value for field '{field}' in record {index}: {message}")]
    InvalidValue {
        field: String,
        index: usize,
        message: String,
    },

    /// The file declares a format version this parser does not handle
    #[error("Unsupported format version: {0}")]
    UnsupportedVersion(String),

    /// Content is empty or contains no records
    #[error("No records found in content")]
    Empty,
}

impl ParseError {
    /// Shorthand for a malformed-content error
    pub fn malformed(format: impl Into<String>, message: impl Into<String>) -> Self {
        ParseError::Malformed {
            format: format.into(),
            message: message.into(),
        }
    }
}

/// Store collaborator errors
///
/// Errors surfaced by repository implementations. Duplicate-key violations
/// must come back as `DuplicateKey`, not as silent no-ops, so the
/// reconciliation engine can apply the duplicate strategy.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record with the same natural key already exists
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// The referenced record does not exist
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Failed to connect to the store
    #[error("Failed to connect to store: {0}")]
    ConnectionFailed(String),

    /// A write operation failed
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// A query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),
}

// Conversion from std::io::Error
impl From<std::io::Error> for IntakeError {
    fn from(err: std::io::Error) -> Self {
        IntakeError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for IntakeError {
    fn from(err: serde_json::Error) -> Self {
        IntakeError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for IntakeError {
    fn from(err: toml::de::Error) -> Self {
        IntakeError::Configuration(format!("TOML parse error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intake_error_display() {
        let err = IntakeError::Configuration("Invalid config".to_string());
        assert_eq!(err.to_string(), "Configuration error: Invalid config");
    }

    #[test]
    fn test_parse_error_conversion() {
        let parse_err = ParseError::Empty;
        let err: IntakeError = parse_err.into();
        assert!(matches!(err, IntakeError::Parse(_)));
    }

    #[test]
    fn test_store_error_conversion() {
        let store_err = StoreError::DuplicateKey("P123".to_string());
        let err: IntakeError = store_err.into();
        assert!(matches!(err, IntakeError::Store(_)));
    }

    #[test]
    fn test_missing_field_message() {
        let err = ParseError::MissingField {
            field: "patient_id".to_string(),
            index: 4,
        };
        assert_eq!(
            err.to_string(),
            "Missing required field 'patient_id' in record 4"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: IntakeError = io_err.into();
        assert!(matches!(err, IntakeError::Io(_)));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: IntakeError = json_err.into();
        assert!(matches!(err, IntakeError::Serialization(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let err: IntakeError = toml_err.into();
        assert!(matches!(err, IntakeError::Configuration(_)));
        assert!(err.to_string().contains("TOML parse error"));
    }

    #[test]
    fn test_errors_implement_std_error() {
        let _: &dyn std::error::Error = &IntakeError::Validation("x".to_string());
        let _: &dyn std::error::Error = &ParseError::Empty;
        let _: &dyn std::error::Error = &StoreError::NotFound("x".to_string());
    }
}
