//! Canonical record and snapshot types
//!
//! A [`CanonicalRecord`] is one school flattened to the local schema. A
//! [`Snapshot`] is the full set of records known locally, keyed and ordered
//! by id.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::btree_map::{self, BTreeMap};

/// Primary key of a remote record
pub type RecordId = u64;

/// One remote entity flattened to local shape
///
/// Serializes as a flat JSON object: `id` first, then every field in
/// ascending name order. Missing remote values are stored as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub id: RecordId,

    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl CanonicalRecord {
    pub fn new(id: RecordId) -> Self {
        Self {
            id,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field assignment
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// Full local state of the dataset, uniquely keyed by id
///
/// On disk this is a JSON array of records in ascending id order. When a
/// file contains the same id twice, the later entry wins.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "Vec<CanonicalRecord>")]
pub struct Snapshot {
    records: BTreeMap<RecordId, CanonicalRecord>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: RecordId) -> Option<&CanonicalRecord> {
        self.records.get(&id)
    }

    /// Insert or replace a record, returning the one it replaced
    pub fn insert(&mut self, record: CanonicalRecord) -> Option<CanonicalRecord> {
        self.records.insert(record.id, record)
    }

    pub fn remove(&mut self, id: RecordId) -> Option<CanonicalRecord> {
        self.records.remove(&id)
    }

    /// Ids in ascending order
    pub fn ids(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.records.keys().copied()
    }

    /// Records in ascending id order
    pub fn iter(&self) -> btree_map::Values<'_, RecordId, CanonicalRecord> {
        self.records.values()
    }
}

impl From<Vec<CanonicalRecord>> for Snapshot {
    fn from(records: Vec<CanonicalRecord>) -> Self {
        records.into_iter().collect()
    }
}

impl FromIterator<CanonicalRecord> for Snapshot {
    fn from_iter<I: IntoIterator<Item = CanonicalRecord>>(iter: I) -> Self {
        let mut snapshot = Snapshot::new();
        for record in iter {
            snapshot.insert(record);
        }
        snapshot
    }
}

impl IntoIterator for Snapshot {
    type Item = CanonicalRecord;
    type IntoIter = btree_map::IntoValues<RecordId, CanonicalRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_values()
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.records.values())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_serializes_flat_with_id_first() {
        let record = CanonicalRecord::new(166027)
            .with_field("size", Value::Null)
            .with_field("name", "Harvard University");

        let text = serde_json::to_string(&record).unwrap();
        assert_eq!(
            text,
            r#"{"id":166027,"name":"Harvard University","size":null}"#
        );
    }

    #[test]
    fn test_snapshot_orders_by_id_and_dedupes() {
        let snapshot: Snapshot = serde_json::from_value(json!([
            {"id": 30, "name": "C"},
            {"id": 10, "name": "A"},
            {"id": 30, "name": "C2"},
        ]))
        .unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.ids().collect::<Vec<_>>(), vec![10, 30]);
        assert_eq!(snapshot.get(30).unwrap().get("name"), Some(&json!("C2")));

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value, json!([{"id": 10, "name": "A"}, {"id": 30, "name": "C2"}]));
    }

    #[test]
    fn test_snapshot_rejects_record_without_id() {
        let result: Result<Snapshot, _> = serde_json::from_value(json!([{"name": "orphan"}]));
        assert!(result.is_err());
    }
}
