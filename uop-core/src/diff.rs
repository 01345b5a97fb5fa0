//! Field level differences between two versions of a record.
//!
//! Records are compared through their `serde_json` representation: every
//! top-level field is compared individually. A field that exists in the
//! original but not in the current value is reported as `null`, and applying
//! a `null` change removes the field again, so absent and `null` are treated
//! as the same state.

use crate::UopResult;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Changed fields mapped to their new values.
pub type FieldChanges = BTreeMap<String, Value>;

fn as_fields<T: Serialize>(value: &T) -> UopResult<Map<String, Value>> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            Ok(map)
        }
    }
}

/// Fields of `current` that differ from `original`.
pub fn field_diff<T: Serialize>(original: &T, current: &T) -> UopResult<FieldChanges> {
    let original = as_fields(original)?;
    let current = as_fields(current)?;
    let mut changes = FieldChanges::new();

    for (key, value) in &current {
        let before = original.get(key).unwrap_or(&Value::Null);
        if before != value {
            changes.insert(key.clone(), value.clone());
        }
    }
    for (key, value) in &original {
        if !current.contains_key(key) && !value.is_null() {
            changes.insert(key.clone(), Value::Null);
        }
    }

    Ok(changes)
}

/// Apply `changes` on top of `record`, returning the updated record.
pub fn apply_changes<T>(record: &T, changes: &FieldChanges) -> UopResult<T>
where
    T: Serialize + DeserializeOwned,
{
    let mut fields = as_fields(record)?;
    for (key, value) in changes {
        if value.is_null() {
            fields.remove(key);
        } else {
            fields.insert(key.clone(), value.clone());
        }
    }
    Ok(serde_json::from_value(Value::Object(fields))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MetaEntity, ObjectId, ObjectRecord};
    use serde_json::json;

    #[test]
    fn test_identical_records_have_no_diff() {
        let record = ObjectRecord::with_id(ObjectId::nil()).with("title", "a");
        assert!(field_diff(&record, &record.clone()).unwrap().is_empty());
    }

    #[test]
    fn test_diff_reports_changed_added_and_removed_fields() {
        let original = ObjectRecord::with_id(ObjectId::nil())
            .with("title", "a")
            .with("pages", 10);
        let mut current = original.clone();
        current.set("title", "b");
        current.set("author", "me");
        current.attributes.remove("pages");

        let diff = field_diff(&original, &current).unwrap();
        assert_eq!(diff.len(), 3);
        assert_eq!(diff["title"], json!("b"));
        assert_eq!(diff["author"], json!("me"));
        assert!(diff["pages"].is_null());
    }

    #[test]
    fn test_apply_changes_reproduces_current() {
        let original = ObjectRecord::with_id(ObjectId::nil())
            .with("title", "a")
            .with("pages", 10);
        let mut current = original.clone();
        current.set("title", "b");
        current.attributes.remove("pages");

        let diff = field_diff(&original, &current).unwrap();
        let applied = apply_changes(&original, &diff).unwrap();
        assert_eq!(applied, current);
    }

    #[test]
    fn test_diff_on_meta_entity_rename() {
        let original = MetaEntity::tag("urgent");
        let mut renamed = original.clone();
        renamed.name = "critical".to_string();
        let diff = field_diff(&original, &renamed).unwrap();
        assert_eq!(diff.len(), 1);
        assert_eq!(diff["name"], json!("critical"));
    }

    #[test]
    fn test_null_and_absent_are_equivalent() {
        let original = ObjectRecord::with_id(ObjectId::nil()).with("note", json!(null));
        let current = ObjectRecord::with_id(ObjectId::nil());
        assert!(field_diff(&original, &current).unwrap().is_empty());
    }
}
