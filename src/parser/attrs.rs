use serde_json::{Map, Value};

/// Renders block attributes as `key: 'value', nested.key: 'value'`.
///
/// Nested objects are walked to any depth with their keys joined by `.`;
/// arrays are not descended into and print as compact JSON.
pub fn flatten_attributes(attrs: Option<&Map<String, Value>>) -> String {
    let mut out = Vec::new();
    if let Some(map) = attrs {
        push_entries(map, "", &mut out);
    }
    out.join(", ")
}

fn push_entries(map: &Map<String, Value>, prefix: &str, out: &mut Vec<String>) {
    for (key, value) in map {
        match value {
            Value::Object(inner) => push_entries(inner, &format!("{}{}.", prefix, key), out),
            leaf => out.push(format!("{}{}: '{}'", prefix, key, leaf_text(leaf))),
        }
    }
}

fn leaf_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
