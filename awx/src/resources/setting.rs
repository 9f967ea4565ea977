//! A single key of the `settings/all/` slug

use crate::api::settings::ALL;
use crate::api::Client;
use crate::diagnostics::{api_error, attribute_error, not_configured, state_error};
use crate::normalize::{
    semantically_equal, setting_value_from_text, setting_value_to_text, SemanticEquality,
};
use crate::provider_data::AwxProviderData;
use async_trait::async_trait;
use tfplug::context::Context;
use tfplug::plan_modifier::UseStateForUnknown;
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, ImportedResource,
    ReadResourceRequest, ReadResourceResponse, Resource, ResourceSchemaRequest,
    ResourceSchemaResponse, ResourceWithConfigure, ResourceWithImportState,
    UpdateResourceRequest, UpdateResourceResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, DynamicValue};
use tracing::{info, warn};

pub const TYPE_NAME: &str = "awx_setting";

#[derive(Default)]
pub struct SettingResource {
    provider_data: Option<AwxProviderData>,
}

impl SettingResource {
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&self) -> Result<&Client, Diagnostic> {
        self.provider_data
            .as_ref()
            .map(|data| data.client.as_ref())
            .ok_or_else(not_configured)
    }

    fn name(state: &DynamicValue) -> Result<String, Diagnostic> {
        state
            .get_string_opt(&AttributePath::new("name"))
            .ok_or_else(|| attribute_error("name", "Missing setting name", "the name must be known"))
    }

    async fn write(&self, plan: &DynamicValue) -> Result<DynamicValue, Diagnostic> {
        let client = self.client()?;
        let name = Self::name(plan)?;
        let text = plan
            .get_string_opt(&AttributePath::new("value"))
            .unwrap_or_default();

        client
            .settings()
            .patch(ALL, &name, setting_value_from_text(&text))
            .await
            .map_err(|e| api_error(format!("Unable to update setting {}", name), &e))?;
        info!("Updated setting {}", name);

        let mut state = plan.clone();
        state
            .set_string(&AttributePath::new("id"), name)
            .map_err(state_error("id"))?;
        Ok(state)
    }
}

fn schema() -> Schema {
    SchemaBuilder::new()
        .version(0)
        .description("Manages one AWX system setting")
        .attribute(
            AttributeBuilder::new("id", AttributeType::String)
                .computed()
                .plan_modifier(Box::new(UseStateForUnknown))
                .build(),
        )
        .attribute(
            AttributeBuilder::new("name", AttributeType::String)
                .description("Setting key, e.g. TOWER_URL_BASE")
                .required()
                .requires_replace()
                .build(),
        )
        .attribute(
            AttributeBuilder::new("value", AttributeType::String)
                .description("Plain string, or JSON text for list and object settings")
                .required()
                .plan_modifier(Box::new(SemanticEquality))
                .build(),
        )
        .build()
}

#[async_trait]
impl Resource for SettingResource {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    async fn schema(&self, _ctx: Context, _request: ResourceSchemaRequest) -> ResourceSchemaResponse {
        ResourceSchemaResponse {
            schema: schema(),
            diagnostics: vec![],
        }
    }

    async fn create(&self, _ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        match self.write(&request.planned_state).await {
            Ok(new_state) => CreateResourceResponse {
                new_state,
                private: vec![],
                diagnostics: vec![],
            },
            Err(diagnostic) => CreateResourceResponse {
                new_state: DynamicValue::null(),
                private: vec![],
                diagnostics: vec![diagnostic],
            },
        }
    }

    async fn read(&self, _ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
        let mut state = request.current_state;
        let result = async {
            let client = self.client()?;
            let name = Self::name(&state)?;
            let settings = client
                .settings()
                .get(ALL)
                .await
                .map_err(|e| api_error(format!("Unable to read setting {}", name), &e))?;
            Ok::<_, Diagnostic>(settings.get(&name).map(setting_value_to_text))
        }
        .await;

        match result {
            Ok(Some(text)) => {
                let current = state
                    .get_string_opt(&AttributePath::new("value"))
                    .unwrap_or_default();
                let mut diagnostics = vec![];
                if !semantically_equal(&current, &text) {
                    if let Err(e) = state.set_string(&AttributePath::new("value"), text) {
                        diagnostics.push(state_error("value")(e));
                    }
                }
                ReadResourceResponse {
                    new_state: Some(state),
                    diagnostics,
                    private: request.private,
                }
            }
            Ok(None) => {
                warn!("Setting is no longer offered by AWX, removing from state");
                ReadResourceResponse {
                    new_state: None,
                    diagnostics: vec![],
                    private: vec![],
                }
            }
            Err(diagnostic) => ReadResourceResponse {
                new_state: Some(state),
                diagnostics: vec![diagnostic],
                private: request.private,
            },
        }
    }

    async fn update(&self, _ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        match self.write(&request.planned_state).await {
            Ok(new_state) => UpdateResourceResponse {
                new_state,
                private: vec![],
                diagnostics: vec![],
            },
            Err(diagnostic) => UpdateResourceResponse {
                new_state: request.prior_state,
                private: vec![],
                diagnostics: vec![diagnostic],
            },
        }
    }

    /// Settings cannot be removed from AWX; the value stays as last written
    async fn delete(&self, _ctx: Context, _request: DeleteResourceRequest) -> DeleteResourceResponse {
        DeleteResourceResponse {
            diagnostics: vec![],
        }
    }

    fn as_import_state(&self) -> Option<&dyn ResourceWithImportState> {
        Some(self)
    }
}

#[async_trait]
impl ResourceWithConfigure for SettingResource {
    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureResourceRequest,
    ) -> ConfigureResourceResponse {
        self.provider_data = AwxProviderData::from_any(request.provider_data);
        ConfigureResourceResponse {
            diagnostics: vec![],
        }
    }
}

fn imported_state(name: &str) -> Result<DynamicValue, Diagnostic> {
    let mut state = DynamicValue::object();
    state
        .set_string(&AttributePath::new("id"), name.to_string())
        .map_err(state_error("id"))?;
    state
        .set_string(&AttributePath::new("name"), name.to_string())
        .map_err(state_error("name"))?;
    state
        .set_null(&AttributePath::new("value"))
        .map_err(state_error("value"))?;
    Ok(state)
}

#[async_trait]
impl ResourceWithImportState for SettingResource {
    /// The import id is the setting key
    async fn import_state(
        &self,
        _ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        match imported_state(&request.id) {
            Ok(state) => ImportResourceStateResponse {
                imported_resources: vec![ImportedResource {
                    type_name: request.type_name,
                    state,
                    private: vec![],
                }],
                diagnostics: vec![],
            },
            Err(diagnostic) => ImportResourceStateResponse {
                imported_resources: vec![],
                diagnostics: vec![diagnostic],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Auth;
    use mockito::{Matcher, Server};
    use serde_json::json;
    use std::sync::Arc;
    use tfplug::grpc::plan_change;
    use tfplug::types::ClientCapabilities;

    async fn configured(url: &str) -> SettingResource {
        let client = Client::new(url, Auth::from_credentials("admin", "password", ""), false).unwrap();
        let mut resource = SettingResource::new();
        resource
            .configure(
                Context::new(),
                ConfigureResourceRequest {
                    provider_data: Some(Arc::new(AwxProviderData::new(client))),
                },
            )
            .await;
        resource
    }

    fn state(name: &str, value: &str) -> DynamicValue {
        let mut state = DynamicValue::object();
        state.set_string(&AttributePath::new("name"), name.into()).unwrap();
        state.set_string(&AttributePath::new("value"), value.into()).unwrap();
        state
    }

    fn read_request(current_state: DynamicValue) -> ReadResourceRequest {
        ReadResourceRequest {
            type_name: TYPE_NAME.into(),
            current_state,
            private: vec![],
            provider_meta: None,
            client_capabilities: ClientCapabilities::default(),
        }
    }

    #[test]
    fn reformatted_values_plan_no_update() {
        let mut prior = state("AUTH_LDAP_USER_SEARCH", r#"["a","b"]"#);
        prior
            .set_string(&AttributePath::new("id"), "AUTH_LDAP_USER_SEARCH".to_string())
            .unwrap();
        let config = state("AUTH_LDAP_USER_SEARCH", r#"[ "a", "b" ]"#);
        let mut proposed = config.clone();
        proposed
            .set_string(&AttributePath::new("id"), "AUTH_LDAP_USER_SEARCH".to_string())
            .unwrap();

        let outcome = plan_change(&schema().block, &prior, &proposed, &config);
        assert!(outcome.requires_replace.is_empty());
        assert_eq!(outcome.planned_state, prior);

        let changed = state("AUTH_LDAP_USER_SEARCH", r#"["a","c"]"#);
        let outcome = plan_change(&schema().block, &prior, &changed, &changed);
        assert_eq!(
            outcome.planned_state.get_string(&AttributePath::new("value")).unwrap(),
            r#"["a","c"]"#
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_patches_only_the_named_key() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PATCH", "/api/v2/settings/all/")
            .match_body(Matcher::Json(json!({"AWX_TASK_ENV": {"HTTPS_PROXY": "proxy:3128"}})))
            .with_body("{}")
            .create_async()
            .await;

        let resource = configured(&server.url()).await;
        let plan = state("AWX_TASK_ENV", r#"{"HTTPS_PROXY": "proxy:3128"}"#);
        let response = resource
            .create(
                Context::new(),
                CreateResourceRequest {
                    type_name: TYPE_NAME.into(),
                    planned_state: plan.clone(),
                    config: plan,
                    planned_private: vec![],
                    provider_meta: None,
                },
            )
            .await;

        assert!(response.diagnostics.is_empty());
        assert_eq!(
            response.new_state.get_string(&AttributePath::new("id")).unwrap(),
            "AWX_TASK_ENV"
        );
        mock.assert_async().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn read_keeps_equivalent_text() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v2/settings/all/")
            .with_body(r#"{"AWX_TASK_ENV": {"b": 2, "a": 1}, "TOWER_URL_BASE": "https://new"}"#)
            .expect(2)
            .create_async()
            .await;

        let resource = configured(&server.url()).await;

        let written = r#"{ "a": 1, "b": 2 }"#;
        let response = resource
            .read(Context::new(), read_request(state("AWX_TASK_ENV", written)))
            .await;
        let kept = response.new_state.unwrap();
        assert_eq!(kept.get_string(&AttributePath::new("value")).unwrap(), written);

        let response = resource
            .read(Context::new(), read_request(state("TOWER_URL_BASE", "https://old")))
            .await;
        let drifted = response.new_state.unwrap();
        assert_eq!(
            drifted.get_string(&AttributePath::new("value")).unwrap(),
            "https://new"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unknown_keys_leave_the_state() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v2/settings/all/")
            .with_body(r#"{"TOWER_URL_BASE": "https://awx"}"#)
            .create_async()
            .await;

        let resource = configured(&server.url()).await;
        let response = resource
            .read(Context::new(), read_request(state("REMOVED_SETTING", "x")))
            .await;
        assert!(response.new_state.is_none());
    }
}
