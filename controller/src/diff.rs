use serde_json::{Map, Value};

/// The fields of `desired` that are missing from `applied` or hold a
/// different value there.
///
/// Keys present only in `applied` are left alone: the result overwrites,
/// it never removes. An empty result means there is nothing to send.
pub fn spec_diff(desired: &Map<String, Value>, applied: &Map<String, Value>) -> Map<String, Value> {
    desired
        .iter()
        .filter(|(key, value)| applied.get(*key) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_added_field() {
        assert_eq!(
            spec_diff(&map(json!({"a": 1, "b": 2})), &map(json!({"a": 1}))),
            map(json!({"b": 2}))
        );
    }

    #[test]
    fn test_identical_is_empty() {
        let spec = map(json!({"a": 1, "env": {"X": "1"}, "argv": ["-v"]}));
        assert!(spec_diff(&spec, &spec.clone()).is_empty());
    }

    #[test]
    fn test_changed_values_compare_by_value() {
        assert_eq!(
            spec_diff(
                &map(json!({"env": {"X": "2", "Y": "1"}, "tasks": 4})),
                &map(json!({"env": {"Y": "1", "X": "1"}, "tasks": 4}))
            ),
            map(json!({"env": {"X": "2", "Y": "1"}}))
        );
    }

    #[test]
    fn test_never_removes_keys() {
        assert!(spec_diff(&map(json!({"a": 1})), &map(json!({"a": 1, "b": 2}))).is_empty());
    }

    #[test]
    fn test_null_is_a_value() {
        assert_eq!(
            spec_diff(&map(json!({"comment": null})), &map(json!({"comment": "hi"}))),
            map(json!({"comment": null}))
        );
        assert_eq!(
            spec_diff(&map(json!({"comment": null})), &map(json!({}))),
            map(json!({"comment": null}))
        );
    }
}
