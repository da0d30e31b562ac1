//! Domain identifier types with validation
//!
//! This module provides newtype wrappers for the identifiers flowing through
//! an import run. `PatientCode` is the externally supplied natural key,
//! `SurrogateId` is the store-generated key assigned on creation, and
//! `VisitHandle` is the batch-scoped temporary reference a parser assigns to
//! each visit so observations can point at visits before any store key exists.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Patient natural-key newtype wrapper
///
/// Represents the externally supplied patient code from a source file.
/// Unique within one import batch; never generated by the store.
///
/// # Examples
///
/// ```
/// use intake::domain::ids::PatientCode;
/// use std::str::FromStr;
///
/// let code = PatientCode::from_str("P-10442").unwrap();
/// assert_eq!(code.as_str(), "P-10442");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatientCode(String);

impl PatientCode {
    /// Creates a new PatientCode from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the code is empty or whitespace-only
    pub fn new(code: impl Into<String>) -> Result<Self, String> {
        let code = code.into();
        if code.trim().is_empty() {
            return Err("Patient code cannot be empty".to_string());
        }
        Ok(Self(code))
    }

    /// Returns the patient code as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes self and returns the inner String
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for PatientCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PatientCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for PatientCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Store surrogate-key newtype wrapper
///
/// Assigned by the store collaborator on creation, never by a parser.
/// UUID-backed; a fresh random id can be minted with [`SurrogateId::generate`]
/// (store adapters and dry runs use this).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurrogateId(Uuid);

impl SurrogateId {
    /// Mints a new random surrogate id
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SurrogateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SurrogateId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| format!("Invalid surrogate id '{s}': {e}"))
    }
}

/// Batch-scoped temporary visit reference
///
/// Parsers assign one handle per visit so observations can reference a visit
/// before reconciliation has created it. `Ordinal` is the visit's position in
/// the canonical batch; `Label` carries an external encounter identifier for
/// formats that have one (e.g. a bundle entry id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VisitHandle {
    /// Position of the visit in the canonical batch's visit list
    Ordinal(usize),
    /// External encounter identifier carried by the source format
    Label(String),
}

impl VisitHandle {
    /// Handle for the visit at the given batch position
    pub fn ordinal(index: usize) -> Self {
        VisitHandle::Ordinal(index)
    }

    /// Handle carrying an external encounter identifier
    pub fn label(label: impl Into<String>) -> Self {
        VisitHandle::Label(label.into())
    }
}

impl fmt::Display for VisitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisitHandle::Ordinal(i) => write!(f, "#{i}"),
            VisitHandle::Label(s) => write!(f, "{s}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patient_code_creation() {
        let code = PatientCode::new("P-10442").unwrap();
        assert_eq!(code.as_str(), "P-10442");
    }

    #[test]
    fn test_patient_code_empty_fails() {
        assert!(PatientCode::new("").is_err());
        assert!(PatientCode::new("   ").is_err());
    }

    #[test]
    fn test_patient_code_display() {
        let code = PatientCode::new("P1").unwrap();
        assert_eq!(format!("{}", code), "P1");
    }

    #[test]
    fn test_patient_code_from_str() {
        let code: PatientCode = "P-10442".parse().unwrap();
        assert_eq!(code.as_str(), "P-10442");
    }

    #[test]
    fn test_surrogate_id_generate_unique() {
        let a = SurrogateId::generate();
        let b = SurrogateId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_surrogate_id_roundtrip() {
        let id = SurrogateId::generate();
        let parsed: SurrogateId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_surrogate_id_invalid() {
        assert!("not-a-uuid".parse::<SurrogateId>().is_err());
    }

    #[test]
    fn test_visit_handle_display() {
        assert_eq!(VisitHandle::ordinal(3).to_string(), "#3");
        assert_eq!(VisitHandle::label("enc-9").to_string(), "enc-9");
    }

    #[test]
    fn test_visit_handle_equality() {
        assert_eq!(VisitHandle::ordinal(0), VisitHandle::Ordinal(0));
        assert_ne!(VisitHandle::ordinal(0), VisitHandle::label("0"));
    }

    #[test]
    fn test_patient_code_serialization() {
        let code = PatientCode::new("P1").unwrap();
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(json, "\"P1\"");
        let back: PatientCode = serde_json::from_str(&json).unwrap();
        assert_eq!(code, back);
    }
}
