//! Conversion between AWX JSON and Terraform values

use serde_json::{Number, Value};
use std::collections::HashMap;
use tfplug::types::Dynamic;

pub fn json_to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::Null,
        Value::Bool(b) => Dynamic::Bool(*b),
        Value::Number(n) => n.as_f64().map(Dynamic::Number).unwrap_or(Dynamic::Null),
        Value::String(s) => Dynamic::String(s.clone()),
        Value::Array(items) => Dynamic::List(items.iter().map(json_to_dynamic).collect()),
        Value::Object(entries) => Dynamic::Map(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), json_to_dynamic(v)))
                .collect::<HashMap<_, _>>(),
        ),
    }
}

/// Unknown values have no JSON form and become null. Whole numbers are
/// sent as integers.
pub fn dynamic_to_json(value: &Dynamic) -> Value {
    match value {
        Dynamic::Null | Dynamic::Unknown => Value::Null,
        Dynamic::Bool(b) => Value::Bool(*b),
        Dynamic::Number(n) => number_to_json(*n),
        Dynamic::String(s) => Value::String(s.clone()),
        Dynamic::List(items) => Value::Array(items.iter().map(dynamic_to_json).collect()),
        Dynamic::Map(entries) => Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), dynamic_to_json(v)))
                .collect(),
        ),
    }
}

fn number_to_json(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

/// Known, non-empty list of strings
pub fn string_list(value: &Dynamic) -> Vec<String> {
    value
        .as_list()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
