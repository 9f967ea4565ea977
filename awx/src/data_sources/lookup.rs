//! Lookups of a single AWX object by id or name
//!
//! A lookup reuses the resource's [`ObjectSpec`] for its attributes and
//! exposes every field that AWX reads back.

use crate::api::common::object_id;
use crate::api::{ApiError, ApiQueryParams, Client};
use crate::diagnostics::{api_error, not_configured};
use crate::provider_data::AwxProviderData;
use crate::resources::catalog;
use crate::resources::credentials;
use crate::resources::object::{Field, ObjectSpec};
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

/// Extra query parameter taken from an attribute, e.g. `organization_id`
/// sent as `organization=`
#[derive(Debug, Clone, Copy)]
pub struct Filter {
    pub attr: &'static str,
    pub param: &'static str,
    pub required: bool,
}

#[derive(Debug)]
pub struct LookupSpec {
    pub object: &'static ObjectSpec,
    /// Attribute holding the AWX id
    pub id_attr: &'static str,
    /// Attribute that selects by name; None means id only
    pub name_attr: Option<&'static str>,
    pub filters: &'static [Filter],
}

const fn by_name(object: &'static ObjectSpec) -> LookupSpec {
    LookupSpec {
        object,
        id_attr: "id",
        name_attr: Some("name"),
        filters: &[],
    }
}

const fn credential(object: &'static ObjectSpec) -> LookupSpec {
    LookupSpec {
        object,
        id_attr: "credential_id",
        name_attr: None,
        filters: &[],
    }
}

pub static LOOKUPS: &[LookupSpec] = &[
    by_name(&catalog::ORGANIZATION),
    by_name(&catalog::TEAM),
    LookupSpec {
        object: &catalog::USER,
        id_attr: "id",
        name_attr: Some("username"),
        filters: &[],
    },
    by_name(&catalog::PROJECT),
    LookupSpec {
        object: &catalog::INVENTORY,
        id_attr: "id",
        name_attr: Some("name"),
        filters: &[Filter {
            attr: "organization_id",
            param: "organization",
            required: false,
        }],
    },
    LookupSpec {
        object: &catalog::INVENTORY_GROUP,
        id_attr: "id",
        name_attr: Some("name"),
        filters: &[Filter {
            attr: "inventory_id",
            param: "inventory",
            required: true,
        }],
    },
    by_name(&catalog::INVENTORY_SOURCE),
    by_name(&catalog::HOST),
    by_name(&catalog::JOB_TEMPLATE),
    by_name(&catalog::WORKFLOW_JOB_TEMPLATE),
    by_name(&catalog::NOTIFICATION_TEMPLATE),
    by_name(&catalog::EXECUTION_ENVIRONMENT),
    by_name(&catalog::SCHEDULE),
    by_name(&catalog::CREDENTIAL_TYPE),
    LookupSpec {
        object: &catalog::CREDENTIAL,
        id_attr: "id",
        name_attr: None,
        filters: &[],
    },
    credential(&credentials::MACHINE),
    credential(&credentials::SCM),
    credential(&credentials::VAULT),
    credential(&credentials::GITHUB_TOKEN),
    credential(&credentials::AZURE_KEY_VAULT),
    credential(&credentials::AZURE_RESOURCE_MANAGER),
    credential(&credentials::HASHIVAULT_SECRET),
    credential(&credentials::HASHIVAULT_SIGNED_SSH),
];

impl LookupSpec {
    pub fn type_name(&self) -> &'static str {
        self.object.type_name
    }

    fn is_selector(&self, name: &str) -> bool {
        self.name_attr == Some(name) || self.filters.iter().any(|f| f.attr == name)
    }

    /// Fields AWX reads back; secrets never leave the server in clear text
    fn exposed(&self) -> impl Iterator<Item = &'static Field> + '_ {
        self.object.fields.iter().filter(|field| !field.is_user_owned())
    }

    pub fn schema(&self) -> Schema {
        let id = AttributeBuilder::new(self.id_attr, AttributeType::Number)
            .description(&format!("{} id", self.object.kind));
        let id = match self.name_attr {
            Some(_) => id.optional().computed(),
            None => id.required(),
        };

        let mut builder = SchemaBuilder::new()
            .version(0)
            .description(&format!("Looks up an AWX {}", self.object.kind.to_lowercase()))
            .attribute(id.build());

        if let Some(name_attr) = self.name_attr {
            builder = builder.attribute(
                AttributeBuilder::new(name_attr, AttributeType::String)
                    .optional()
                    .computed()
                    .build(),
            );
        }
        for filter in self.filters {
            let attribute = AttributeBuilder::new(filter.attr, AttributeType::Number);
            let attribute = if filter.required {
                attribute.required()
            } else {
                attribute.optional().computed()
            };
            builder = builder.attribute(attribute.build());
        }
        for field in self.exposed().filter(|f| !self.is_selector(f.name)) {
            builder = builder.attribute(
                AttributeBuilder::new(field.name, field.kind.attribute_type())
                    .description(field.description)
                    .computed()
                    .build(),
            );
        }
        builder.build()
    }

    fn not_found(&self) -> Diagnostic {
        Diagnostic::error(
            format!("Get: {} does not exist", self.object.kind),
            "The query returned no element",
        )
    }

    fn params(&self, config: &DynamicValue, id: Option<i64>, name: Option<String>) -> ApiQueryParams {
        let mut params = ApiQueryParams::new()
            .add_optional("id", id)
            .add_optional(self.name_attr.unwrap_or("name"), name);
        for filter in self.filters {
            params = params.add_optional(
                filter.param,
                config.get_i64_opt(&AttributePath::new(filter.attr)),
            );
        }
        params
    }

    pub async fn find(&self, client: &Client, config: &DynamicValue) -> Result<Value, Diagnostic> {
        let id = config.get_i64_opt(&AttributePath::new(self.id_attr));
        let name = self
            .name_attr
            .and_then(|attr| config.get_string_opt(&AttributePath::new(attr)))
            .filter(|name| !name.is_empty());

        if id.is_none() && name.is_none() {
            return Err(Diagnostic::error(
                "Get: Missing Parameters",
                format!(
                    "Please use one of the selectors ({} or {})",
                    self.id_attr,
                    self.name_attr.unwrap_or("name")
                ),
            ));
        }

        let fetch_failed =
            |e: &ApiError| api_error(format!("Get: Failed to fetch {}", self.object.kind), e);

        if self.name_attr.is_none() {
            let id = id.unwrap_or_default();
            return match client.objects().get(self.object.collection, id).await {
                Ok(object) => Ok(object),
                Err(ApiError::NotFound(_)) => Err(self.not_found()),
                Err(e) => Err(fetch_failed(&e)),
            };
        }

        let mut found = client
            .objects()
            .list(self.object.collection, &self.params(config, id, name))
            .await
            .map_err(|e| fetch_failed(&e))?;
        match found.len() {
            0 => Err(self.not_found()),
            1 => Ok(found.remove(0)),
            n => Err(Diagnostic::error(
                "Get: found more than one Element",
                format!("The query returned {} elements", n),
            )),
        }
    }

    pub fn state(&self, object: &Value, config: &DynamicValue) -> DynamicValue {
        let mut entries: HashMap<String, Dynamic> =
            config.value.as_map().cloned().unwrap_or_default();

        if let Some(id) = object_id(object) {
            entries.insert(self.id_attr.to_string(), Dynamic::Number(id as f64));
        }
        if let Some(name_attr) = self.name_attr {
            if let Some(name) = object.get(name_attr).and_then(Value::as_str) {
                entries.insert(name_attr.to_string(), Dynamic::String(name.to_string()));
            }
        }
        for field in self.exposed() {
            if self.name_attr == Some(field.name) {
                continue;
            }
            let value = field.from_api(object, &Dynamic::Null);
            if value.is_null() && self.is_selector(field.name) {
                continue;
            }
            entries.insert(field.name.to_string(), value);
        }

        DynamicValue::new(Dynamic::Map(entries))
    }
}

pub struct LookupDataSource {
    spec: &'static LookupSpec,
    provider_data: Option<AwxProviderData>,
}

impl LookupDataSource {
    pub fn new(spec: &'static LookupSpec) -> Self {
        Self {
            spec,
            provider_data: None,
        }
    }

    async fn lookup(&self, config: &DynamicValue) -> Result<DynamicValue, Diagnostic> {
        let client = self
            .provider_data
            .as_ref()
            .map(|data| data.client.as_ref())
            .ok_or_else(not_configured)?;
        let object = self.spec.find(client, config).await?;
        Ok(self.spec.state(&object, config))
    }
}

#[async_trait]
impl DataSource for LookupDataSource {
    fn type_name(&self) -> &str {
        self.spec.type_name()
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
        match self.lookup(&request.config).await {
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
impl DataSourceWithConfigure for LookupDataSource {
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
