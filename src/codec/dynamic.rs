//! Splits rows between declared fields and the dynamic JSON column, and
//! folds that column back into rows on the way out.

use std::collections::HashSet;

use serde_json::{ Map, Value };

use crate::value::{ FieldValue, RowData };

/// Copies declared keys through and moves every other key under
/// `dynamic_field`. Keys in `excluded` are dropped. The dynamic object is
/// always present, possibly empty.
///
/// A row that already carries `dynamic_field` as an object has its keys
/// merged in first; loose keys win over them.
pub fn partition(
    row: &RowData,
    declared: &HashSet<&str>,
    dynamic_field: &str,
    excluded: &HashSet<&str>
) -> RowData {
    let mut out = RowData::new();
    let mut extras = Map::new();
    if let Some(existing) = row.get(dynamic_field) {
        if let Value::Object(map) = existing.to_json() {
            extras.extend(map);
        }
    }
    for (key, value) in row {
        if key == dynamic_field || excluded.contains(key.as_str()) {
            continue;
        }
        if declared.contains(key.as_str()) {
            out.insert(key.clone(), value.clone());
        } else {
            extras.insert(key.clone(), value.to_json());
        }
    }
    out.insert(dynamic_field.to_string(), FieldValue::Json(Value::Object(extras)));
    out
}

/// Lifts the keys of the dynamic object to the top level. Declared keys
/// already on the row are kept. The dynamic key itself is removed unless
/// `keep_dynamic_field` is set.
pub fn merge(mut row: RowData, dynamic_field: &str, keep_dynamic_field: bool) -> RowData {
    let dynamic = if keep_dynamic_field {
        row.get(dynamic_field).cloned()
    } else {
        row.remove(dynamic_field)
    };
    if let Some(value) = dynamic {
        if let Value::Object(map) = value.to_json() {
            for (key, v) in map {
                if !row.contains_key(&key) {
                    row.insert(key, FieldValue::from(v));
                }
            }
        }
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{ row_from_json, row_to_json };
    use serde_json::json;

    #[test]
    fn undeclared_keys_move_under_the_dynamic_field() {
        let declared: HashSet<&str> = ["a"].into_iter().collect();
        let row = row_from_json(json!({"a": 1, "b": 2}));
        let split = partition(&row, &declared, "meta", &HashSet::new());
        assert_eq!(row_to_json(&split), json!({"a": 1, "meta": {"b": 2}}));
    }

    #[test]
    fn dynamic_object_is_always_present() {
        let declared: HashSet<&str> = ["a"].into_iter().collect();
        let row = row_from_json(json!({"a": 1}));
        let split = partition(&row, &declared, "$meta", &HashSet::new());
        assert_eq!(row_to_json(&split), json!({"a": 1, "$meta": {}}));
    }

    #[test]
    fn excluded_keys_are_dropped() {
        let declared: HashSet<&str> = ["text"].into_iter().collect();
        let excluded: HashSet<&str> = ["sparse"].into_iter().collect();
        let row = row_from_json(json!({"text": "x", "sparse": {"1": 0.5}, "tag": "t"}));
        let split = partition(&row, &declared, "$meta", &excluded);
        assert_eq!(row_to_json(&split), json!({"text": "x", "$meta": {"tag": "t"}}));
    }

    #[test]
    fn explicit_dynamic_objects_are_merged() {
        let declared: HashSet<&str> = HashSet::new();
        let row = row_from_json(json!({"$meta": {"x": 1, "y": 1}, "y": 2}));
        let split = partition(&row, &declared, "$meta", &HashSet::new());
        assert_eq!(row_to_json(&split), json!({"$meta": {"x": 1, "y": 2}}));
    }

    #[test]
    fn merge_lifts_dynamic_keys_without_overwriting() {
        let row = row_from_json(json!({"a": 1, "$meta": {"a": 9, "b": 2}}));
        assert_eq!(row_to_json(&merge(row.clone(), "$meta", false)), json!({"a": 1, "b": 2}));
        assert_eq!(
            row_to_json(&merge(row, "$meta", true)),
            json!({"a": 1, "b": 2, "$meta": {"a": 9, "b": 2}})
        );
    }
}
