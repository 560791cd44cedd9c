//! A from-scratch RFC 6902 JSON-Patch applier. No crate in the surrounding
//! ecosystem implements `test`, so this is implemented explicitly per the
//! design note to not silently skip that operation.

use serde_json::Value;

#[derive(Debug, Clone, thiserror::Error)]
pub enum PatchError {
    #[error("patch document must be a JSON array")]
    NotAnArray,
    #[error("patch operation missing field {0:?}")]
    MissingField(&'static str),
    #[error("unknown patch operation {0:?}")]
    UnknownOp(String),
    #[error("path {0:?} does not exist")]
    PathNotFound(String),
    #[error("test failed at {path:?}: expected {expected}, found {actual}")]
    TestFailed { path: String, expected: Value, actual: Value },
    #[error("invalid array index at {0:?}")]
    InvalidIndex(String),
}

fn unescape_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

fn pointer_tokens(pointer: &str) -> Vec<String> {
    if pointer.is_empty() {
        return Vec::new();
    }
    pointer.split('/').skip(1).map(unescape_token).collect()
}

fn navigate<'a>(root: &'a Value, tokens: &[String]) -> Result<&'a Value, PatchError> {
    let mut current = root;
    for token in tokens {
        current = match current {
            Value::Object(map) => map.get(token).ok_or_else(|| PatchError::PathNotFound(token.clone()))?,
            Value::Array(arr) => {
                let idx: usize = token.parse().map_err(|_| PatchError::InvalidIndex(token.clone()))?;
                arr.get(idx).ok_or_else(|| PatchError::PathNotFound(token.clone()))?
            }
            _ => return Err(PatchError::PathNotFound(token.clone())),
        };
    }
    Ok(current)
}

fn set_at(root: &mut Value, tokens: &[String], value: Value) -> Result<(), PatchError> {
    if tokens.is_empty() {
        *root = value;
        return Ok(());
    }
    let (last, parents) = tokens.split_last().unwrap();
    let parent = navigate_mut(root, parents)?;
    match parent {
        Value::Object(map) => {
            map.insert(last.clone(), value);
        }
        Value::Array(arr) => {
            if last == "-" {
                arr.push(value);
            } else {
                let idx: usize = last.parse().map_err(|_| PatchError::InvalidIndex(last.clone()))?;
                if idx > arr.len() {
                    return Err(PatchError::PathNotFound(last.clone()));
                }
                arr.insert(idx, value);
            }
        }
        _ => return Err(PatchError::PathNotFound(last.clone())),
    }
    Ok(())
}

fn replace_at(root: &mut Value, tokens: &[String], value: Value) -> Result<(), PatchError> {
    if tokens.is_empty() {
        *root = value;
        return Ok(());
    }
    let (last, parents) = tokens.split_last().unwrap();
    let parent = navigate_mut(root, parents)?;
    match parent {
        Value::Object(map) => {
            if !map.contains_key(last) {
                return Err(PatchError::PathNotFound(last.clone()));
            }
            map.insert(last.clone(), value);
        }
        Value::Array(arr) => {
            let idx: usize = last.parse().map_err(|_| PatchError::InvalidIndex(last.clone()))?;
            if idx >= arr.len() {
                return Err(PatchError::PathNotFound(last.clone()));
            }
            arr[idx] = value;
        }
        _ => return Err(PatchError::PathNotFound(last.clone())),
    }
    Ok(())
}

fn remove_at(root: &mut Value, tokens: &[String]) -> Result<Value, PatchError> {
    let (last, parents) = tokens.split_last().ok_or(PatchError::PathNotFound("".into()))?;
    let parent = navigate_mut(root, parents)?;
    match parent {
        Value::Object(map) => map.remove(last).ok_or_else(|| PatchError::PathNotFound(last.clone())),
        Value::Array(arr) => {
            let idx: usize = last.parse().map_err(|_| PatchError::InvalidIndex(last.clone()))?;
            if idx >= arr.len() {
                return Err(PatchError::PathNotFound(last.clone()));
            }
            Ok(arr.remove(idx))
        }
        _ => Err(PatchError::PathNotFound(last.clone())),
    }
}

fn navigate_mut<'a>(root: &'a mut Value, tokens: &[String]) -> Result<&'a mut Value, PatchError> {
    let mut current = root;
    for token in tokens {
        current = match current {
            Value::Object(map) => map.get_mut(token).ok_or_else(|| PatchError::PathNotFound(token.clone()))?,
            Value::Array(arr) => {
                let idx: usize = token.parse().map_err(|_| PatchError::InvalidIndex(token.clone()))?;
                arr.get_mut(idx).ok_or_else(|| PatchError::PathNotFound(token.clone()))?
            }
            _ => return Err(PatchError::PathNotFound(token.clone())),
        };
    }
    Ok(current)
}

/// Applies an RFC 6902 patch document to `state`, returning the new state
/// on success. `state` is left untouched on any failure: the applier
/// operates on a clone and only commits if every operation succeeds.
pub fn apply_patch(state: &Value, patches: &Value) -> Result<Value, PatchError> {
    let ops = patches.as_array().ok_or(PatchError::NotAnArray)?;
    let mut working = state.clone();

    for op in ops {
        let op_name = op.get("op").and_then(Value::as_str).ok_or(PatchError::MissingField("op"))?;
        let path = op.get("path").and_then(Value::as_str).ok_or(PatchError::MissingField("path"))?;
        let tokens = pointer_tokens(path);

        match op_name {
            "add" => {
                let value = op.get("value").ok_or(PatchError::MissingField("value"))?.clone();
                set_at(&mut working, &tokens, value)?;
            }
            "remove" => {
                remove_at(&mut working, &tokens)?;
            }
            "replace" => {
                let value = op.get("value").ok_or(PatchError::MissingField("value"))?.clone();
                replace_at(&mut working, &tokens, value)?;
            }
            "move" => {
                let from = op.get("from").and_then(Value::as_str).ok_or(PatchError::MissingField("from"))?;
                let from_tokens = pointer_tokens(from);
                let value = remove_at(&mut working, &from_tokens)?;
                set_at(&mut working, &tokens, value)?;
            }
            "copy" => {
                let from = op.get("from").and_then(Value::as_str).ok_or(PatchError::MissingField("from"))?;
                let from_tokens = pointer_tokens(from);
                let value = navigate(&working, &from_tokens)?.clone();
                set_at(&mut working, &tokens, value)?;
            }
            "test" => {
                let expected = op.get("value").ok_or(PatchError::MissingField("value"))?;
                let actual = navigate(&working, &tokens)?;
                if actual != expected {
                    return Err(PatchError::TestFailed {
                        path: path.to_string(),
                        expected: expected.clone(),
                        actual: actual.clone(),
                    });
                }
            }
            other => return Err(PatchError::UnknownOp(other.to_string())),
        }
    }

    Ok(working)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn add_sets_object_key() {
        let state = json!({"a": 1});
        let patches = json!([{"op": "add", "path": "/b", "value": 2}]);
        assert_eq!(apply_patch(&state, &patches).unwrap(), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn add_appends_to_array_with_dash() {
        let state = json!({"items": [1, 2]});
        let patches = json!([{"op": "add", "path": "/items/-", "value": 3}]);
        assert_eq!(apply_patch(&state, &patches).unwrap(), json!({"items": [1, 2, 3]}));
    }

    #[test]
    fn remove_deletes_key() {
        let state = json!({"a": 1, "b": 2});
        let patches = json!([{"op": "remove", "path": "/b"}]);
        assert_eq!(apply_patch(&state, &patches).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn replace_overwrites_existing_value() {
        let state = json!({"a": 1});
        let patches = json!([{"op": "replace", "path": "/a", "value": 99}]);
        assert_eq!(apply_patch(&state, &patches).unwrap(), json!({"a": 99}));
    }

    #[test]
    fn replace_on_missing_path_fails() {
        let state = json!({"a": 1});
        let patches = json!([{"op": "replace", "path": "/missing", "value": 1}]);
        assert!(apply_patch(&state, &patches).is_err());
    }

    #[test]
    fn move_relocates_value() {
        let state = json!({"a": 1});
        let patches = json!([{"op": "move", "from": "/a", "path": "/b"}]);
        assert_eq!(apply_patch(&state, &patches).unwrap(), json!({"b": 1}));
    }

    #[test]
    fn copy_duplicates_value() {
        let state = json!({"a": 1});
        let patches = json!([{"op": "copy", "from": "/a", "path": "/b"}]);
        assert_eq!(apply_patch(&state, &patches).unwrap(), json!({"a": 1, "b": 1}));
    }

    #[test]
    fn test_op_passes_when_values_match() {
        let state = json!({"a": 1});
        let patches = json!([{"op": "test", "path": "/a", "value": 1}, {"op": "replace", "path": "/a", "value": 2}]);
        assert_eq!(apply_patch(&state, &patches).unwrap(), json!({"a": 2}));
    }

    #[test]
    fn test_op_fails_leaves_state_untouched() {
        let state = json!({"a": 1});
        let patches = json!([{"op": "test", "path": "/a", "value": 2}]);
        assert!(apply_patch(&state, &patches).is_err());
    }

    #[test]
    fn unknown_op_is_rejected() {
        let state = json!({});
        let patches = json!([{"op": "frobnicate", "path": "/a"}]);
        assert!(matches!(apply_patch(&state, &patches), Err(PatchError::UnknownOp(_))));
    }
}
