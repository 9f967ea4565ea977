//! JSON/YAML canonicalization used to compare what the user wrote with
//! what AWX hands back

use serde_json::Value;
use tfplug::schema::{PlanModifier, PlanModifierRequest, PlanModifierResponse};
use tfplug::types::Dynamic;

/// Parses text as JSON, then YAML, and renders it as compact JSON with
/// sorted keys. Empty and null documents become "". Text that parses as
/// neither is returned trimmed.
pub fn normalize_json_yaml(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    match parse_json_yaml(trimmed) {
        Some(Value::Null) => String::new(),
        Some(value) => value.to_string(),
        None => trimmed.to_string(),
    }
}

pub fn parse_json_yaml(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text)
        .ok()
        .or_else(|| serde_yaml::from_str::<Value>(text).ok())
}

pub fn semantically_equal(a: &str, b: &str) -> bool {
    a == b || normalize_json_yaml(a) == normalize_json_yaml(b)
}

/// Setting values are decoded as a JSON object, then a JSON array, and
/// otherwise sent as the plain string.
pub fn setting_value_from_text(text: &str) -> Value {
    match serde_json::from_str::<Value>(text) {
        Ok(value @ Value::Object(_)) | Ok(value @ Value::Array(_)) => value,
        _ => Value::String(text.to_string()),
    }
}

/// Strings come back raw, everything else as compact JSON
pub fn setting_value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Keeps the prior text when the configured text means the same document
pub struct SemanticEquality;

impl PlanModifier for SemanticEquality {
    fn description(&self) -> String {
        "equivalent JSON or YAML documents do not produce a diff".to_string()
    }

    fn modify(&self, request: PlanModifierRequest) -> PlanModifierResponse {
        let plan_value = match (&request.state_value.value, &request.plan_value.value) {
            (Dynamic::String(state), Dynamic::String(plan)) if semantically_equal(state, plan) => {
                request.state_value
            }
            _ => request.plan_value,
        };

        PlanModifierResponse {
            plan_value,
            requires_replace: false,
            diagnostics: vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tfplug::types::{AttributePath, DynamicValue};

    #[test]
    fn json_and_yaml_normalize_to_the_same_text() {
        let json_text = r#"{ "b": 1, "a": {"y": true, "x": [1, 2]} }"#;
        let yaml_text = "---\na:\n  x:\n    - 1\n    - 2\n  y: true\nb: 1\n";

        assert_eq!(normalize_json_yaml(json_text), r#"{"a":{"x":[1,2],"y":true},"b":1}"#);
        assert_eq!(normalize_json_yaml(json_text), normalize_json_yaml(yaml_text));
        assert!(semantically_equal(json_text, yaml_text));
    }

    #[test]
    fn empty_documents_normalize_to_empty() {
        assert_eq!(normalize_json_yaml(""), "");
        assert_eq!(normalize_json_yaml("   \n"), "");
        assert_eq!(normalize_json_yaml("null"), "");
    }

    #[test]
    fn unparseable_text_is_trimmed() {
        assert_eq!(normalize_json_yaml("  {not: [valid  \n"), "{not: [valid");
    }

    #[test]
    fn setting_values_prefer_structured_json() {
        assert_eq!(setting_value_from_text(r#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(setting_value_from_text(r#"["x","y"]"#), json!(["x", "y"]));
        assert_eq!(setting_value_from_text("42"), json!("42"));
        assert_eq!(setting_value_from_text("https://awx"), json!("https://awx"));

        assert_eq!(setting_value_to_text(&json!("https://awx")), "https://awx");
        assert_eq!(setting_value_to_text(&json!({"a": 1})), r#"{"a":1}"#);
        assert_eq!(setting_value_to_text(&json!(true)), "true");
    }

    fn modify(state: &str, plan: &str) -> Dynamic {
        SemanticEquality
            .modify(PlanModifierRequest {
                config_value: DynamicValue::new(Dynamic::from(plan)),
                state_value: DynamicValue::new(Dynamic::from(state)),
                plan_value: DynamicValue::new(Dynamic::from(plan)),
                plan: DynamicValue::object(),
                path: AttributePath::new("variables"),
            })
            .plan_value
            .value
    }

    #[test]
    fn equivalent_documents_keep_the_prior_text() {
        assert_eq!(
            modify("{\"a\": 1}", "a: 1"),
            Dynamic::String("{\"a\": 1}".to_string())
        );
        assert_eq!(
            modify("{\"a\": 1}", "a: 2"),
            Dynamic::String("a: 2".to_string())
        );
    }
}
