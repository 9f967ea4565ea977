//! Role lookups among the `summary_fields.object_roles` of a parent object

use crate::api::Client;
use crate::diagnostics::{api_error, attribute_error, not_configured};
use crate::provider_data::AwxProviderData;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tfplug::context::Context;
use tfplug::data_source::{
    ConfigureDataSourceRequest, ConfigureDataSourceResponse, DataSource, DataSourceSchemaRequest,
    DataSourceSchemaResponse, DataSourceWithConfigure, ReadDataSourceRequest,
    ReadDataSourceResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};

#[derive(Debug)]
pub struct RoleSpec {
    pub type_name: &'static str,
    /// Parent kind in messages, e.g. "credential"
    pub parent: &'static str,
    pub parent_field: &'static str,
    pub collection: &'static str,
}

pub static ROLES: &[RoleSpec] = &[
    RoleSpec {
        type_name: "awx_credential_role",
        parent: "credential",
        parent_field: "credential_id",
        collection: "credentials",
    },
    RoleSpec {
        type_name: "awx_inventory_role",
        parent: "inventory",
        parent_field: "inventory_id",
        collection: "inventories",
    },
    RoleSpec {
        type_name: "awx_job_template_role",
        parent: "job_template",
        parent_field: "job_template_id",
        collection: "job_templates",
    },
    RoleSpec {
        type_name: "awx_organization_role",
        parent: "organization",
        parent_field: "organization_id",
        collection: "organizations",
    },
    RoleSpec {
        type_name: "awx_project_role",
        parent: "project",
        parent_field: "project_id",
        collection: "projects",
    },
];

#[derive(Debug, Clone, PartialEq)]
struct Role {
    id: i64,
    name: String,
}

/// Roles listed under `summary_fields.object_roles`, keyed by role field
fn object_roles(object: &Value) -> Vec<Role> {
    let mut roles: Vec<Role> = object
        .pointer("/summary_fields/object_roles")
        .and_then(Value::as_object)
        .map(|roles| {
            roles
                .values()
                .filter_map(|role| {
                    Some(Role {
                        id: role.get("id")?.as_i64()?,
                        name: role.get("name")?.as_str()?.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    roles.sort_by_key(|role| role.id);
    roles
}

impl RoleSpec {
    pub fn schema(&self) -> Schema {
        SchemaBuilder::new()
            .version(0)
            .description(&format!("Looks up a role of an AWX {}", self.parent))
            .attribute(
                AttributeBuilder::new("id", AttributeType::Number)
                    .description("Role id")
                    .optional()
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .description("Role name, e.g. Admin or Use")
                    .optional()
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new(self.parent_field, AttributeType::Number)
                    .required()
                    .build(),
            )
            .build()
    }

    pub async fn find(&self, client: &Client, config: &DynamicValue) -> Result<DynamicValue, Diagnostic> {
        let parent_id = config
            .get_i64_opt(&AttributePath::new(self.parent_field))
            .ok_or_else(|| {
                attribute_error(
                    self.parent_field,
                    format!("Missing {}", self.parent_field),
                    "the parent id must be known",
                )
            })?;
        let id = config.get_i64_opt(&AttributePath::new("id"));
        let name = config
            .get_string_opt(&AttributePath::new("name"))
            .filter(|name| !name.is_empty());
        if id.is_none() && name.is_none() {
            return Err(Diagnostic::error(
                "Get: Missing Parameters",
                "Please use one of the selectors (id or name)",
            ));
        }

        let parent = client
            .objects()
            .get(self.collection, parent_id)
            .await
            .map_err(|e| api_error(format!("Get: Failed to fetch {}", self.parent), &e))?;

        let roles = object_roles(&parent);
        let role = roles
            .iter()
            .find(|role| Some(role.id) == id)
            .or_else(|| roles.iter().find(|role| name.as_deref() == Some(role.name.as_str())))
            .ok_or_else(|| {
                Diagnostic::error(
                    format!("Failed to fetch {} role - Not Found", self.parent),
                    format!("{} {} has no such role", self.parent, parent_id),
                )
            })?;

        let mut state = HashMap::new();
        state.insert("id".to_string(), Dynamic::Number(role.id as f64));
        state.insert("name".to_string(), Dynamic::String(role.name.clone()));
        state.insert(self.parent_field.to_string(), Dynamic::Number(parent_id as f64));
        Ok(DynamicValue::new(Dynamic::Map(state)))
    }
}

pub struct RoleDataSource {
    spec: &'static RoleSpec,
    provider_data: Option<AwxProviderData>,
}

impl RoleDataSource {
    pub fn new(spec: &'static RoleSpec) -> Self {
        Self {
            spec,
            provider_data: None,
        }
    }
}

#[async_trait]
impl DataSource for RoleDataSource {
    fn type_name(&self) -> &str {
        self.spec.type_name
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: DataSourceSchemaRequest,
    ) -> DataSourceSchemaResponse {
        DataSourceSchemaResponse {
            schema: self.spec.schema(),
            diagnostics: vec![],
        }
    }

    async fn read(&self, _ctx: Context, request: ReadDataSourceRequest) -> ReadDataSourceResponse {
        let result = match &self.provider_data {
            Some(data) => self.spec.find(&data.client, &request.config).await,
            None => Err(not_configured()),
        };
        match result {
            Ok(state) => ReadDataSourceResponse {
                state,
                diagnostics: vec![],
            },
            Err(diagnostic) => ReadDataSourceResponse {
                state: request.config,
                diagnostics: vec![diagnostic],
            },
        }
    }
}

#[async_trait]
impl DataSourceWithConfigure for RoleDataSource {
    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureDataSourceRequest,
    ) -> ConfigureDataSourceResponse {
        self.provider_data = AwxProviderData::from_any(request.provider_data);
        ConfigureDataSourceResponse {
            diagnostics: vec![],
        }
    }
}
