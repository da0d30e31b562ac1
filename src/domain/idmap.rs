//! Run-scoped identifier map
//!
//! Two flat lookup tables built during reconciliation: patient natural key to
//! store surrogate key, and temporary visit handle to store surrogate key.
//! Scoped to a single import run and discarded afterwards; never shared
//! across runs.

use super::ids::{PatientCode, SurrogateId, VisitHandle};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::HashMap;

/// Identifier map for one import run
///
/// Populated monotonically: the patient phase inserts patient entries, the
/// visit phase inserts visit entries, and the observation phase only reads.
/// Patient lookups are bidirectional so failures can be reported with the
/// offending natural key.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IdentifierMap {
    patients: HashMap<PatientCode, SurrogateId>,
    #[serde(serialize_with = "serialize_visit_entries")]
    visits: HashMap<VisitHandle, SurrogateId>,
    #[serde(skip)]
    patients_reverse: HashMap<SurrogateId, PatientCode>,
}

impl IdentifierMap {
    /// Creates an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a patient natural key → surrogate key pair
    pub fn insert_patient(&mut self, code: PatientCode, id: SurrogateId) {
        self.patients_reverse.insert(id, code.clone());
        self.patients.insert(code, id);
    }

    /// Resolves a patient surrogate key by natural key
    pub fn patient(&self, code: &PatientCode) -> Option<SurrogateId> {
        self.patients.get(code).copied()
    }

    /// Resolves a patient natural key by surrogate key
    pub fn patient_code(&self, id: &SurrogateId) -> Option<&PatientCode> {
        self.patients_reverse.get(id)
    }

    /// Records a visit handle → surrogate key pair
    pub fn insert_visit(&mut self, handle: VisitHandle, id: SurrogateId) {
        self.visits.insert(handle, id);
    }

    /// Resolves a visit surrogate key by batch handle
    pub fn visit(&self, handle: &VisitHandle) -> Option<SurrogateId> {
        self.visits.get(handle).copied()
    }

    /// Number of patient entries
    pub fn patient_count(&self) -> usize {
        self.patients.len()
    }

    /// Number of visit entries
    pub fn visit_count(&self) -> usize {
        self.visits.len()
    }

    /// Total entries across both tables
    pub fn len(&self) -> usize {
        self.patients.len() + self.visits.len()
    }

    /// True when no entries have been recorded
    pub fn is_empty(&self) -> bool {
        self.patients.is_empty() && self.visits.is_empty()
    }
}

// Visit handles are enums, so the map is serialized keyed by the handle's
// canonical string form ("#0" for ordinals, the label otherwise).
fn serialize_visit_entries<S>(
    visits: &HashMap<VisitHandle, SurrogateId>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(visits.len()))?;
    for (handle, id) in visits {
        map.serialize_entry(&handle.to_string(), id)?;
    }
    map.end()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> PatientCode {
        PatientCode::new(s).unwrap()
    }

    #[test]
    fn test_empty_map() {
        let map = IdentifierMap::new();
        assert!(map.is_empty());
        assert_eq!(map.len(), 0);
        assert!(map.patient(&code("P1")).is_none());
    }

    #[test]
    fn test_patient_lookup_bidirectional() {
        let mut map = IdentifierMap::new();
        let id = SurrogateId::generate();
        map.insert_patient(code("P1"), id);

        assert_eq!(map.patient(&code("P1")), Some(id));
        assert_eq!(map.patient_code(&id), Some(&code("P1")));
        assert_eq!(map.patient_count(), 1);
    }

    #[test]
    fn test_visit_lookup() {
        let mut map = IdentifierMap::new();
        let id = SurrogateId::generate();
        map.insert_visit(VisitHandle::ordinal(2), id);

        assert_eq!(map.visit(&VisitHandle::ordinal(2)), Some(id));
        assert!(map.visit(&VisitHandle::ordinal(0)).is_none());
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_serializes_with_string_keys() {
        let mut map = IdentifierMap::new();
        map.insert_patient(code("P1"), SurrogateId::generate());
        map.insert_visit(VisitHandle::ordinal(0), SurrogateId::generate());

        let json = serde_json::to_value(&map).unwrap();
        assert!(json["patients"]["P1"].is_string());
        assert!(json["visits"]["#0"].is_string());
    }
}
