/**
 * Shallow top-level state diff/apply.
 *
 * Grounded in `RollbackManager::createIncrementalSnapshot`/
 * `applyIncrementalSnapshot`: only top-level object keys are compared —
 * a changed nested value is treated as a whole-key replacement, not
 * recursively diffed — and removed keys are recorded under a reserved
 * `__deleted__` sub-object rather than simply being absent, so applying a
 * diff can distinguish "unchanged" from "deleted".
 */
use serde_json::{Map, Value};

const DELETED_MARKER: &str = "__deleted__";

/// Produces a diff object containing only the keys of `current` that are
/// new or changed relative to `base`, plus a `__deleted__` map of keys
/// present in `base` but absent from `current`.
pub fn diff(base: &Value, current: &Value) -> Value {
    let base_map = base.as_object().cloned().unwrap_or_default();
    let current_map = current.as_object().cloned().unwrap_or_default();

    let mut out = Map::new();
    for (key, value) in &current_map {
        if base_map.get(key) != Some(value) {
            out.insert(key.clone(), value.clone());
        }
    }

    let mut deleted = Map::new();
    for key in base_map.keys() {
        if !current_map.contains_key(key) {
            deleted.insert(key.clone(), Value::Bool(true));
        }
    }
    if !deleted.is_empty() {
        out.insert(DELETED_MARKER.to_string(), Value::Object(deleted));
    }

    Value::Object(out)
}

/// Applies a diff produced by [`diff`] on top of `base`.
pub fn apply(base: &Value, diff: &Value) -> Value {
    let mut result = base.as_object().cloned().unwrap_or_default();
    let diff_map = diff.as_object().cloned().unwrap_or_default();

    if let Some(Value::Object(deleted)) = diff_map.get(DELETED_MARKER) {
        for key in deleted.keys() {
            result.remove(key);
        }
    }
    for (key, value) in &diff_map {
        if key != DELETED_MARKER {
            result.insert(key.clone(), value.clone());
        }
    }
    Value::Object(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn diff_captures_additions_and_changes() {
        let base = json!({"a": 1, "b": 2});
        let current = json!({"a": 1, "b": 3, "c": 4});
        let d = diff(&base, &current);
        assert_eq!(d["b"], json!(3));
        assert_eq!(d["c"], json!(4));
        assert!(d.get("a").is_none());
    }

    #[test]
    fn diff_marks_removed_keys() {
        let base = json!({"a": 1, "b": 2});
        let current = json!({"a": 1});
        let d = diff(&base, &current);
        assert_eq!(d["__deleted__"]["b"], json!(true));
    }

    #[test]
    fn apply_reconstructs_current_from_base_and_diff() {
        let base = json!({"a": 1, "b": 2});
        let current = json!({"a": 1, "b": 3, "c": 4});
        let d = diff(&base, &current);
        let rebuilt = apply(&base, &d);
        assert_eq!(rebuilt, current);
    }

    #[test]
    fn apply_removes_deleted_keys() {
        let base = json!({"a": 1, "b": 2});
        let current = json!({"a": 1});
        let d = diff(&base, &current);
        assert_eq!(apply(&base, &d), current);
    }
}
