//! Raw remote record → [`CanonicalRecord`]
//!
//! The Scorecard API returns requested fields either as flat dotted keys
//! (`"school.name": "..."`) or as nested objects (`latest: {student: {...}}`),
//! and mixtures of both. Path resolution accepts all of these and yields
//! `null` for any missing step instead of failing.
//!
//! Array paths use a `[]` marker: `latest.programs.cip_4_digit[].title`
//! projects `title` out of every element of the `cip_4_digit` list.

use crate::record::{CanonicalRecord, RecordId};
use serde_json::Value;
use thiserror::Error;

/// Why a raw record could not be normalized
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordShapeError {
    #[error("record has no id")]
    MissingId,

    #[error("record id {0} is not an unsigned integer")]
    InvalidId(String),
}

/// One canonical field and where it comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Local field name
    pub name: String,

    /// Remote path, optionally with a single `[]` list marker
    pub path: String,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Splits `list[].item` into `(list, item)`
    fn list_projection(&self) -> Option<(&str, &str)> {
        let (list, item) = self.path.split_once("[]")?;
        Some((list, item.trim_start_matches('.')))
    }

    /// The path to request from the remote API
    fn remote_path(&self) -> &str {
        match self.list_projection() {
            Some((list, _)) => list,
            None => &self.path,
        }
    }
}

/// Maps raw records onto a fixed canonical field set
#[derive(Debug, Clone)]
pub struct Normalizer {
    id_path: String,
    fields: Vec<FieldSpec>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::scorecard()
    }
}

impl Normalizer {
    pub fn new(id_path: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self {
            id_path: id_path.into(),
            fields,
        }
    }

    /// Field set for the College Scorecard `schools` endpoint
    pub fn scorecard() -> Self {
        let fields = [
            ("name", "school.name"),
            ("city", "school.city"),
            ("state", "school.state"),
            ("zip", "school.zip"),
            ("school_url", "school.school_url"),
            ("ownership", "school.ownership"),
            ("size", "latest.student.size"),
            ("admission_rate", "latest.admissions.admission_rate.overall"),
            ("tuition_in_state", "latest.cost.tuition.in_state"),
            ("tuition_out_of_state", "latest.cost.tuition.out_of_state"),
            ("completion_rate", "latest.completion.completion_rate_4yr_150nt"),
            ("median_earnings", "latest.earnings.10_yrs_after_entry.median"),
            ("programs", "latest.programs.cip_4_digit[].title"),
            ("credentials", "latest.programs.cip_4_digit[].credential.title"),
        ]
        .into_iter()
        .map(|(name, path)| FieldSpec::new(name, path))
        .collect();

        Self::new("id", fields)
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Comma-separated `fields` query parameter, id first, without duplicates
    pub fn remote_fields(&self) -> String {
        let mut paths: Vec<&str> = vec![self.id_path.as_str()];
        for spec in &self.fields {
            let path = spec.remote_path();
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        paths.join(",")
    }

    /// Normalize one raw record
    ///
    /// Every configured field is present in the output; only a missing or
    /// malformed id is an error.
    pub fn normalize(&self, raw: &Value) -> Result<CanonicalRecord, RecordShapeError> {
        let id = extract_id(resolve(raw, &self.id_path))?;
        let mut record = CanonicalRecord::new(id);

        for spec in &self.fields {
            let value = match spec.list_projection() {
                Some((list, item)) => project_list(resolve(raw, list), item),
                None => scalar_value(resolve(raw, &spec.path)),
            };
            record.fields.insert(spec.name.clone(), value);
        }

        Ok(record)
    }
}

fn extract_id(value: Option<&Value>) -> Result<RecordId, RecordShapeError> {
    match value {
        None | Some(Value::Null) => Err(RecordShapeError::MissingId),
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| RecordShapeError::InvalidId(n.to_string())),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| RecordShapeError::InvalidId(s.clone())),
        Some(other) => Err(RecordShapeError::InvalidId(other.to_string())),
    }
}

/// Resolve a dotted path with null propagation
///
/// At each level the longest matching key wins, so a flat `"school.name"`
/// key is preferred over `school -> name` nesting.
pub fn resolve<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }

    let object = value.as_object()?;
    if let Some(found) = object.get(path) {
        return Some(found);
    }

    let mut end = path.len();
    while let Some(dot) = path[..end].rfind('.') {
        if let Some(child) = object.get(&path[..dot]) {
            if let Some(found) = resolve(child, &path[dot + 1..]) {
                return Some(found);
            }
        }
        end = dot;
    }

    None
}

fn scalar_value(value: Option<&Value>) -> Value {
    match value {
        Some(Value::Array(items)) => Value::Array(dedupe_truthy(items.iter())),
        Some(Value::Object(_)) | None => Value::Null,
        Some(scalar) => scalar.clone(),
    }
}

fn project_list(list: Option<&Value>, item_path: &str) -> Value {
    let items: Vec<&Value> = match list {
        None | Some(Value::Null) => return Value::Null,
        Some(Value::Array(items)) => items.iter().collect(),
        // A single object where a list was expected is a list of one
        Some(single) => vec![single],
    };

    let projected = items.into_iter().filter_map(|item| resolve(item, item_path));
    Value::Array(dedupe_truthy(projected))
}

/// Flatten nested arrays, drop falsy values, dedupe in first-seen order
fn dedupe_truthy<'a>(values: impl Iterator<Item = &'a Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::new();
    for value in values {
        match value {
            Value::Array(inner) => {
                for flattened in dedupe_truthy(inner.iter()) {
                    if !out.contains(&flattened) {
                        out.push(flattened);
                    }
                }
            },
            Value::Object(_) => {},
            scalar if is_truthy(scalar) && !out.contains(scalar) => out.push(scalar.clone()),
            _ => {},
        }
    }
    out
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_nested_paths_yield_null() {
        let raw = json!({
            "id": 5,
            "school.name": "X",
            "latest": {"student": {"size": null}}
        });

        let record = Normalizer::scorecard().normalize(&raw).unwrap();

        assert_eq!(record.id, 5);
        assert_eq!(record.get("name"), Some(&json!("X")));
        assert_eq!(record.get("size"), Some(&Value::Null));
        assert_eq!(record.get("city"), Some(&Value::Null));
        assert_eq!(record.get("programs"), Some(&Value::Null));
        assert_eq!(record.fields.len(), Normalizer::scorecard().fields().len());
    }

    #[test]
    fn test_flat_and_nested_keys_resolve_alike() {
        let flat = json!({"id": 1, "latest.student.size": 1200, "school.city": "Boston"});
        let nested = json!({"id": 1, "latest": {"student": {"size": 1200}}, "school": {"city": "Boston"}});
        let mixed = json!({"id": 1, "latest.student": {"size": 1200}, "school": {"city": "Boston"}});

        let normalizer = Normalizer::scorecard();
        let expected = normalizer.normalize(&flat).unwrap();
        assert_eq!(normalizer.normalize(&nested).unwrap(), expected);
        assert_eq!(normalizer.normalize(&mixed).unwrap(), expected);
        assert_eq!(expected.get("size"), Some(&json!(1200)));
    }

    #[test]
    fn test_program_projection_dedupes_and_drops_falsy() {
        let raw = json!({
            "id": "166027",
            "latest.programs.cip_4_digit": [
                {"title": "Economics.", "credential": {"title": "Bachelor's Degree"}},
                {"title": "", "credential": {"title": "Bachelor's Degree"}},
                {"title": "Economics.", "credential": {"title": "Doctoral Degree"}},
                {"title": null, "credential": null},
                {"title": "History."}
            ]
        });

        let record = Normalizer::scorecard().normalize(&raw).unwrap();

        assert_eq!(record.id, 166027);
        assert_eq!(record.get("programs"), Some(&json!(["Economics.", "History."])));
        assert_eq!(
            record.get("credentials"),
            Some(&json!(["Bachelor's Degree", "Doctoral Degree"]))
        );
    }

    #[test]
    fn test_empty_program_list_is_empty_array() {
        let raw = json!({"id": 9, "latest": {"programs": {"cip_4_digit": []}}});
        let record = Normalizer::scorecard().normalize(&raw).unwrap();
        assert_eq!(record.get("programs"), Some(&json!([])));
    }

    #[test]
    fn test_missing_or_bad_id_is_rejected() {
        let normalizer = Normalizer::scorecard();
        assert_eq!(
            normalizer.normalize(&json!({"school.name": "No Id"})),
            Err(RecordShapeError::MissingId)
        );
        assert_eq!(
            normalizer.normalize(&json!({"id": null})),
            Err(RecordShapeError::MissingId)
        );
        assert!(matches!(
            normalizer.normalize(&json!({"id": -4})),
            Err(RecordShapeError::InvalidId(_))
        ));
        assert!(matches!(
            normalizer.normalize(&json!({"id": "abc"})),
            Err(RecordShapeError::InvalidId(_))
        ));
    }

    #[test]
    fn test_object_at_scalar_path_is_null() {
        let raw = json!({"id": 2, "school": {"name": {"en": "Nested"}}});
        let record = Normalizer::scorecard().normalize(&raw).unwrap();
        assert_eq!(record.get("name"), Some(&Value::Null));
    }

    #[test]
    fn test_remote_fields_request_list_once() {
        let fields = Normalizer::scorecard().remote_fields();
        assert!(fields.starts_with("id,school.name,"));
        assert_eq!(fields.matches("latest.programs.cip_4_digit").count(), 1);
        assert!(!fields.contains("[]"));
    }
}
