//! Turning client failures into Terraform diagnostics

use crate::api::ApiError;
use tfplug::types::{AttributePath, Diagnostic};
use tfplug::TfplugError;

pub fn not_configured() -> Diagnostic {
    Diagnostic::error(
        "Provider not configured",
        "Provider data was not properly configured",
    )
}

pub fn api_error(summary: impl Into<String>, error: &ApiError) -> Diagnostic {
    let summary = summary.into();
    tracing::error!("{}: {}", summary, error);
    Diagnostic::error(summary, error.to_string())
}

pub fn attribute_error(
    attribute: &str,
    summary: impl Into<String>,
    detail: impl Into<String>,
) -> Diagnostic {
    Diagnostic::error(summary, detail).with_attribute(AttributePath::new(attribute))
}

/// For writes into a state object, e.g. `.map_err(state_error("id"))?`
pub fn state_error(attribute: &str) -> impl FnOnce(TfplugError) -> Diagnostic + '_ {
    move |e| attribute_error(attribute, format!("Unable to set {}", attribute), e.to_string())
}

/// State ids are stringified AWX ids
pub fn parse_id(id: &str) -> Result<i64, Diagnostic> {
    id.trim().parse::<i64>().map_err(|_| {
        attribute_error(
            "id",
            "Invalid resource id",
            format!("expected a numeric AWX id, got '{}'", id),
        )
    })
}
