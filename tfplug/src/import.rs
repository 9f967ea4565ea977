//! Import helpers for simplifying resource import implementations

use crate::context::Context;
use crate::resource::{ImportResourceStateRequest, ImportResourceStateResponse, ImportedResource};
use crate::types::{AttributePath, Diagnostic, DynamicValue};

/// Sets the import ID to a specific attribute in state
///
/// This is useful for simple resources where the import ID maps directly to
/// a single attribute in the resource state.
///
/// Example: ID "42" -> state.id = "42"
pub fn import_state_passthrough_id(
    _ctx: &Context,
    attr_path: AttributePath,
    request: &ImportResourceStateRequest,
    response: &mut ImportResourceStateResponse,
) {
    let mut state = DynamicValue::object();

    if let Err(e) = state.set_string(&attr_path, request.id.clone()) {
        response.diagnostics.push(
            Diagnostic::error(
                format!("Failed to set import ID: {}", e),
                format!(
                    "Could not set attribute '{}' to value '{}'",
                    attr_path, request.id
                ),
            )
            .with_attribute(attr_path),
        );
        return;
    }

    response.imported_resources.push(ImportedResource {
        type_name: request.type_name.clone(),
        state,
        private: Vec::new(),
    });
}

/// Splits a composite import ID like `12:34` into its parts, checking the
/// number of parts and that none is empty.
pub fn split_import_id<'a>(
    id: &'a str,
    separator: char,
    parts: usize,
) -> Result<Vec<&'a str>, Diagnostic> {
    let split: Vec<&str> = id.split(separator).collect();
    if split.len() != parts || split.iter().any(|p| p.trim().is_empty()) {
        return Err(Diagnostic::error(
            "Unexpected import identifier",
            format!(
                "expected {} parts separated by '{}', got '{}'",
                parts, separator, id
            ),
        ));
    }
    Ok(split)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClientCapabilities;

    fn request(id: &str) -> ImportResourceStateRequest {
        ImportResourceStateRequest {
            type_name: "awx_team".to_string(),
            id: id.to_string(),
            client_capabilities: ClientCapabilities::default(),
        }
    }

    #[test]
    fn passthrough_sets_the_id_attribute() {
        let mut response = ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
        };
        import_state_passthrough_id(
            &Context::new(),
            AttributePath::new("id"),
            &request("17"),
            &mut response,
        );

        assert!(response.diagnostics.is_empty());
        let imported = &response.imported_resources[0];
        assert_eq!(imported.type_name, "awx_team");
        assert_eq!(
            imported.state.get_string(&AttributePath::new("id")).unwrap(),
            "17"
        );
    }

    #[test]
    fn composite_ids_are_checked() {
        assert_eq!(split_import_id("3:9", ':', 2).unwrap(), vec!["3", "9"]);
        assert!(split_import_id("3", ':', 2).is_err());
        assert!(split_import_id("3:", ':', 2).is_err());
        assert!(split_import_id("1:2:3", ':', 2).is_err());
    }
}
