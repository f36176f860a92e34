use serde_json::{Map, Value};

/// Marker splitting a field key into an array part and a per-element sub key.
pub const WILDCARD: &str = "[*].";

/// Splits a dotted path with optional `[n]` indices into its tokens.
fn tokens(path: &str) -> Vec<&str> {
    path.split(|c: char| c == '.' || c == '[' || c == ']')
        .filter(|token| !token.is_empty())
        .collect()
}

/// Reads a dotted path such as `user.address.city` or `items[0].name`.
pub fn get_path<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = data;
    for token in tokens(path) {
        current = match current {
            Value::Object(map) => map.get(token)?,
            Value::Array(items) => items.get(token.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Writes `value` at a dotted path, creating intermediate containers on the way.
///
/// # Behavior
/// A missing intermediate becomes an array when the next token is an index and an
/// object otherwise. A scalar standing in the way is replaced.
pub fn set_path(data: &mut Value, path: &str, value: Value) {
    let tokens = tokens(path);
    let Some((last, parents)) = tokens.split_last() else {
        return;
    };
    let mut current = data;
    for (position, token) in parents.iter().enumerate() {
        let next_is_index = tokens[position + 1].parse::<usize>().is_ok();
        current = child_mut(current, token, next_is_index);
    }
    match (current, last.parse::<usize>().ok()) {
        (Value::Array(items), Some(index)) => {
            if items.len() <= index {
                items.resize(index + 1, Value::Null);
            }
            items[index] = value;
        }
        (Value::Object(map), _) => {
            map.insert(last.to_string(), value);
        }
        (other, _) => {
            let mut map = Map::new();
            map.insert(last.to_string(), value);
            *other = Value::Object(map);
        }
    }
}

fn child_mut<'a>(current: &'a mut Value, token: &str, next_is_index: bool) -> &'a mut Value {
    let index = token.parse::<usize>().ok();
    if !(current.is_object() || (current.is_array() && index.is_some())) {
        *current = Value::Object(Map::new());
    }
    let slot = match (current, index) {
        (Value::Array(items), Some(index)) => {
            if items.len() <= index {
                items.resize(index + 1, Value::Null);
            }
            &mut items[index]
        }
        (Value::Object(map), _) => map.entry(token.to_string()).or_insert(Value::Null),
        (other, _) => other,
    };
    if !slot.is_object() && !slot.is_array() {
        *slot = if next_is_index {
            Value::Array(Vec::new())
        } else {
            Value::Object(Map::new())
        };
    }
    slot
}

/// Resolves a field key against request data.
///
/// # Behavior
/// A key without `[*].` is a plain dotted path. A key with it reads the array under the
/// leading part and resolves the remainder against every element; missing sub-values
/// become `null`. An absent or empty array resolves to `None`.
pub fn resolve_field(data: &Value, key: &str) -> Option<Value> {
    let Some((head, rest)) = key.split_once(WILDCARD) else {
        return get_path(data, key).cloned();
    };
    let items = data.get(head)?.as_array()?;
    let values: Vec<Value> = items
        .iter()
        .map(|item| resolve_field(item, rest).unwrap_or(Value::Null))
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(Value::Array(values))
    }
}

/// Writes a resolved field value back into request data, element by element for
/// wildcard keys.
pub fn write_field(data: &mut Value, key: &str, value: Value) {
    let Some((head, rest)) = key.split_once(WILDCARD) else {
        set_path(data, key, value);
        return;
    };
    let (Some(Value::Array(items)), Value::Array(values)) = (data.get_mut(head), value) else {
        return;
    };
    for (item, value) in items.iter_mut().zip(values) {
        write_field(item, rest, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_path() {
        let data = json!({"user": {"tags": ["a", "b"], "name": "x"}});
        assert_eq!(get_path(&data, "user.name"), Some(&json!("x")));
        assert_eq!(get_path(&data, "user.tags[1]"), Some(&json!("b")));
        assert_eq!(get_path(&data, "user.tags.0"), Some(&json!("a")));
        assert_eq!(get_path(&data, "user.missing"), None);
        assert_eq!(get_path(&data, "user.name.first"), None);
    }

    #[test]
    fn test_set_path_creates_containers() {
        let mut data = json!({"name": "x"});
        set_path(&mut data, "address.city", json!("Oslo"));
        set_path(&mut data, "list[1]", json!(2));
        set_path(&mut data, "name", json!("y"));
        assert_eq!(
            data,
            json!({"name": "y", "address": {"city": "Oslo"}, "list": [null, 2]})
        );
    }

    #[test]
    fn test_wildcard_resolution_and_write_back() {
        let mut data = json!({"items": [{"name": " a "}, {"other": 1}, {"name": "c"}]});
        assert_eq!(
            resolve_field(&data, "items[*].name"),
            Some(json!([" a ", null, "c"]))
        );
        assert_eq!(resolve_field(&json!({"items": []}), "items[*].name"), None);
        assert_eq!(resolve_field(&json!({}), "items[*].name"), None);

        write_field(&mut data, "items[*].name", json!(["a", null, "C"]));
        assert_eq!(
            data,
            json!({"items": [{"name": "a"}, {"other": 1, "name": null}, {"name": "C"}]})
        );
    }
}
