//! Built-in attribute validators

use crate::schema::{Validator, ValidatorRequest, ValidatorResponse};
use crate::types::{Diagnostic, Dynamic};
use regex::Regex;

fn single(diagnostic: Option<Diagnostic>) -> ValidatorResponse {
    ValidatorResponse {
        diagnostics: diagnostic.into_iter().collect(),
    }
}

/// Checks a string against a regular expression
pub struct StringPatternValidator {
    pub pattern: Regex,
    pub description: String,
}

impl StringPatternValidator {
    pub fn create(pattern: Regex, description: &str) -> Box<dyn Validator> {
        Box::new(Self {
            pattern,
            description: description.to_string(),
        })
    }
}

impl Validator for StringPatternValidator {
    fn description(&self) -> String {
        format!("value must match {}", self.description)
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        single(match &request.config_value.value {
            Dynamic::String(s) if !self.pattern.is_match(s) => Some(
                Diagnostic::error(
                    format!("{} must match {}", request.path, self.description),
                    format!("Value '{}' does not match pattern", s),
                )
                .with_attribute(request.path),
            ),
            _ => None,
        })
    }
}

/// Restricts a string to a fixed set of values
pub struct OneOfValidator {
    pub allowed: Vec<String>,
}

impl OneOfValidator {
    pub fn create(allowed: &[&str]) -> Box<dyn Validator> {
        Box::new(Self {
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
        })
    }
}

impl Validator for OneOfValidator {
    fn description(&self) -> String {
        format!("value must be one of: {}", self.allowed.join(", "))
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        single(match &request.config_value.value {
            Dynamic::String(s) if !self.allowed.iter().any(|a| a == s) => Some(
                Diagnostic::error(
                    format!("Invalid value for {}", request.path),
                    format!(
                        "expected one of [{}], got '{}'",
                        self.allowed.join(", "),
                        s
                    ),
                )
                .with_attribute(request.path),
            ),
            _ => None,
        })
    }
}

/// Keeps numbers inside an inclusive range
pub struct NumberRangeValidator {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl NumberRangeValidator {
    pub fn create(min: Option<f64>, max: Option<f64>) -> Box<dyn Validator> {
        Box::new(Self { min, max })
    }
}

impl Validator for NumberRangeValidator {
    fn description(&self) -> String {
        format!("value must be within {:?}..={:?}", self.min, self.max)
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        let Some(n) = request.config_value.value.as_number() else {
            return single(None);
        };
        let detail = match (self.min, self.max) {
            (Some(min), _) if n < min => Some(format!("must be at least {}", min)),
            (_, Some(max)) if n > max => Some(format!("must be at most {}", max)),
            _ => None,
        };
        single(detail.map(|detail| {
            Diagnostic::error(format!("{} {}", request.path, detail), format!("Got {}", n))
                .with_attribute(request.path)
        }))
    }
}

/// Requires a string to parse as JSON
pub struct JsonStringValidator;

impl Validator for JsonStringValidator {
    fn description(&self) -> String {
        "value must be valid JSON".to_string()
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        single(match &request.config_value.value {
            Dynamic::String(s) if !s.is_empty() => serde_json::from_str::<serde_json::Value>(s)
                .err()
                .map(|e| {
                    Diagnostic::error(format!("{} is not valid JSON", request.path), e.to_string())
                        .with_attribute(request.path)
                }),
            _ => None,
        })
    }
}
