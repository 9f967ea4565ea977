//! Common types and utilities for the AWX API

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// One page of an AWX list endpoint
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

/// Error body returned by AWX: either `{"detail": "..."}` or a map of
/// field name to messages.
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

#[derive(Debug, thiserror::Error)]
#[error("API error details: detail={detail:?}, field_errors={field_errors:?}")]
pub struct ApiErrorDetails {
    pub detail: Option<String>,
    pub field_errors: BTreeMap<String, Vec<String>>,
}

impl From<ApiErrorResponse> for ApiErrorDetails {
    fn from(response: ApiErrorResponse) -> Self {
        let field_errors = response
            .fields
            .into_iter()
            .map(|(field, value)| {
                let messages = match value {
                    Value::Array(items) => items.iter().map(value_to_message).collect(),
                    other => vec![value_to_message(&other)],
                };
                (field, messages)
            })
            .collect();
        Self {
            detail: response.detail,
            field_errors,
        }
    }
}

impl ApiErrorDetails {
    /// Single line summary, `detail` first, then `field: message` pairs
    pub fn summary(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(detail) = &self.detail {
            parts.push(detail.clone());
        }
        for (field, messages) in &self.field_errors {
            parts.push(format!("{}: {}", field, messages.join(", ")));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }
}

fn value_to_message(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApiQueryParams {
    params: Vec<(String, String)>,
}

impl ApiQueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<K: Into<String>, V: ToString>(mut self, key: K, value: V) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    pub fn add_optional<K: Into<String>, V: ToString>(mut self, key: K, value: Option<V>) -> Self {
        if let Some(v) = value {
            self.params.push((key.into(), v.to_string()));
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn to_query_string(&self) -> String {
        if self.params.is_empty() {
            String::new()
        } else {
            format!(
                "?{}",
                self.params
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
                    .collect::<Vec<_>>()
                    .join("&")
            )
        }
    }
}

impl std::fmt::Display for ApiQueryParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pairs: Vec<_> = self
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        write!(f, "{}", pairs.join(", "))
    }
}

/// Numeric id of an object as AWX returns it
pub fn object_id(value: &Value) -> Option<i64> {
    value.get("id").and_then(Value::as_i64)
}
