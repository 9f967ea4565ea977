//! Table driven resources for AWX objects
//!
//! Most AWX object types differ only in their collection and fields, so a
//! resource is an [`ObjectSpec`] plus the shared CRUD in [`ObjectResource`].

use crate::api::{ApiError, Client};
use crate::diagnostics::{api_error, attribute_error, not_configured, parse_id};
use crate::normalize::{parse_json_yaml, semantically_equal, setting_value_to_text, SemanticEquality};
use crate::provider_data::AwxProviderData;
use crate::values::{dynamic_to_json, json_to_dynamic};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tfplug::context::Context;
use tfplug::defaults::StaticDefault;
use tfplug::import_state_passthrough_id;
use tfplug::plan_modifier::UseStateForUnknown;
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, ReadResourceRequest,
    ReadResourceResponse, Resource, ResourceSchemaRequest, ResourceSchemaResponse,
    ResourceWithConfigure, ResourceWithImportState, UpdateResourceRequest, UpdateResourceResponse,
};
use tfplug::schema::{Attribute, AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use tfplug::validator::{OneOfValidator, StringPatternValidator};
use tracing::{info, warn};

/// AWX answers with this placeholder instead of secret values
pub const ENCRYPTED: &str = "$encrypted$";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Int,
    Bool,
    /// JSON or YAML text that AWX stores as text (variables, extra_vars)
    Json,
    /// JSON text that AWX stores as an object (extra_data, inputs)
    JsonObject,
}

impl FieldKind {
    pub fn attribute_type(self) -> AttributeType {
        match self {
            FieldKind::Int => AttributeType::Number,
            FieldKind::Bool => AttributeType::Bool,
            FieldKind::String | FieldKind::Json | FieldKind::JsonObject => AttributeType::String,
        }
    }

    fn is_document(self) -> bool {
        matches!(self, FieldKind::Json | FieldKind::JsonObject)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum FieldDefault {
    Str(&'static str),
    Int(i64),
    Bool(bool),
}

/// Where a field lives in the request body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Body,
    /// inside the credential `inputs` object
    Input,
    /// only used to build the request path
    Local,
}

#[derive(Debug, Clone, Copy)]
pub enum Check {
    OneOf(&'static [&'static str]),
    Pattern(&'static str, &'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub api: &'static str,
    pub kind: FieldKind,
    pub description: &'static str,
    pub required: bool,
    pub default: Option<FieldDefault>,
    pub force_new: bool,
    pub sensitive: bool,
    pub write_only: bool,
    pub location: Location,
    pub check: Option<Check>,
}

impl Field {
    const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            api: name,
            kind,
            description: "",
            required: false,
            default: None,
            force_new: false,
            sensitive: false,
            write_only: false,
            location: Location::Body,
            check: None,
        }
    }

    pub const fn string(name: &'static str) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub const fn int(name: &'static str) -> Self {
        Self::new(name, FieldKind::Int)
    }

    pub const fn bool(name: &'static str) -> Self {
        Self::new(name, FieldKind::Bool)
    }

    pub const fn json(name: &'static str) -> Self {
        Self::new(name, FieldKind::Json)
    }

    pub const fn json_object(name: &'static str) -> Self {
        Self::new(name, FieldKind::JsonObject)
    }

    /// Numeric reference to another object, `organization_id` -> `organization`
    pub const fn reference(name: &'static str, api: &'static str) -> Self {
        Self::new(name, FieldKind::Int).api(api)
    }

    pub const fn api(self, api: &'static str) -> Self {
        Self { api, ..self }
    }

    pub const fn describe(self, description: &'static str) -> Self {
        Self {
            description,
            ..self
        }
    }

    pub const fn required(self) -> Self {
        Self {
            required: true,
            ..self
        }
    }

    pub const fn default_str(self, value: &'static str) -> Self {
        Self {
            default: Some(FieldDefault::Str(value)),
            ..self
        }
    }

    pub const fn default_int(self, value: i64) -> Self {
        Self {
            default: Some(FieldDefault::Int(value)),
            ..self
        }
    }

    pub const fn default_bool(self, value: bool) -> Self {
        Self {
            default: Some(FieldDefault::Bool(value)),
            ..self
        }
    }

    pub const fn force_new(self) -> Self {
        Self {
            force_new: true,
            ..self
        }
    }

    pub const fn sensitive(self) -> Self {
        Self {
            sensitive: true,
            ..self
        }
    }

    /// Sent to AWX but never read back
    pub const fn write_only(self) -> Self {
        Self {
            write_only: true,
            sensitive: true,
            ..self
        }
    }

    pub const fn input(self) -> Self {
        Self {
            location: Location::Input,
            ..self
        }
    }

    pub const fn local(self) -> Self {
        Self {
            location: Location::Local,
            ..self
        }
    }

    pub const fn one_of(self, allowed: &'static [&'static str]) -> Self {
        Self {
            check: Some(Check::OneOf(allowed)),
            ..self
        }
    }

    pub const fn pattern(self, pattern: &'static str, description: &'static str) -> Self {
        Self {
            check: Some(Check::Pattern(pattern, description)),
            ..self
        }
    }

    /// Values only the user sets; AWX never reports them back
    pub fn is_user_owned(&self) -> bool {
        self.sensitive || self.write_only || self.location == Location::Local
    }

    /// Optional fields without a default are filled from AWX when unset
    pub fn is_computed(&self) -> bool {
        !self.required && (self.default.is_some() || !self.is_user_owned())
    }

    fn path(&self) -> AttributePath {
        AttributePath::new(self.name)
    }

    pub fn attribute(&self) -> Attribute {
        let mut builder =
            AttributeBuilder::new(self.name, self.kind.attribute_type()).description(self.description);

        builder = match (self.required, self.default) {
            (true, _) => builder.required(),
            (false, Some(FieldDefault::Str(v))) => builder.default(StaticDefault::string(v)),
            (false, Some(FieldDefault::Int(v))) => builder.default(StaticDefault::number(v as f64)),
            (false, Some(FieldDefault::Bool(v))) => builder.default(StaticDefault::bool(v)),
            (false, None) if self.is_computed() => builder.optional().computed(),
            (false, None) => builder.optional(),
        };

        if self.sensitive {
            builder = builder.sensitive();
        }
        if self.force_new {
            builder = builder.requires_replace();
        }
        if self.kind.is_document() {
            builder = builder.plan_modifier(Box::new(SemanticEquality));
        }
        match self.check {
            Some(Check::OneOf(allowed)) => builder = builder.validator(OneOfValidator::create(allowed)),
            Some(Check::Pattern(pattern, description)) => {
                if let Ok(re) = regex::Regex::new(pattern) {
                    builder = builder.validator(StringPatternValidator::create(re, description));
                }
            }
            None => {}
        }

        builder.build()
    }

    /// Request body value; None leaves the field out
    pub fn to_api(&self, value: &Dynamic) -> Result<Option<Value>, Diagnostic> {
        if value.is_null() || value.is_unknown() {
            return Ok(None);
        }
        match (self.kind, value) {
            (FieldKind::JsonObject, Dynamic::String(text)) => {
                if text.trim().is_empty() {
                    return Ok(None);
                }
                parse_json_yaml(text).map(Some).ok_or_else(|| {
                    attribute_error(
                        self.name,
                        format!("Invalid JSON in {}", self.name),
                        "the value must be a JSON or YAML document",
                    )
                })
            }
            (_, value) => Ok(Some(dynamic_to_json(value))),
        }
    }

    /// State value for this field given what AWX returned and what the
    /// state held before
    pub fn from_api(&self, object: &Value, current: &Dynamic) -> Dynamic {
        let keep = || {
            if current.is_unknown() {
                Dynamic::Null
            } else {
                current.clone()
            }
        };

        if self.is_user_owned() && !current.is_unknown() {
            return current.clone();
        }
        let raw = match self.location {
            Location::Body => object.get(self.api),
            Location::Input => object.get("inputs").and_then(|inputs| inputs.get(self.api)),
            Location::Local => None,
        };
        let raw = match raw {
            None => return keep(),
            Some(Value::String(s)) if s == ENCRYPTED => return keep(),
            Some(raw) => raw,
        };

        match self.kind {
            FieldKind::Json | FieldKind::JsonObject => {
                if raw.is_null() {
                    return Dynamic::Null;
                }
                let text = setting_value_to_text(raw);
                match current {
                    Dynamic::String(prior) if semantically_equal(prior, &text) => current.clone(),
                    _ => Dynamic::String(text),
                }
            }
            FieldKind::String => match raw {
                Value::Null => Dynamic::Null,
                Value::String(s) => Dynamic::String(s.clone()),
                other => Dynamic::String(other.to_string()),
            },
            FieldKind::Int | FieldKind::Bool => json_to_dynamic(raw),
        }
    }
}

/// Objects created through a parent, e.g.
/// `workflow_job_templates/<id>/schedules/`
#[derive(Debug, Clone, Copy)]
pub struct ParentRoute {
    pub field: &'static str,
    pub collection: &'static str,
    pub relation: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub enum CredentialTypeRef {
    Id(i64),
    Name(&'static str),
}

#[derive(Debug)]
pub struct ObjectSpec {
    pub type_name: &'static str,
    /// Human readable kind used in messages
    pub kind: &'static str,
    pub description: &'static str,
    pub collection: &'static str,
    pub parent: Option<ParentRoute>,
    pub credential_type: Option<CredentialTypeRef>,
    pub fields: &'static [Field],
}

impl ObjectSpec {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn schema(&self) -> Schema {
        let mut builder = SchemaBuilder::new()
            .version(0)
            .description(self.description)
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .description(&format!("{} id", self.kind))
                    .computed()
                    .plan_modifier(Box::new(UseStateForUnknown))
                    .build(),
            );
        for field in self.fields {
            builder = builder.attribute(field.attribute());
        }
        builder.build()
    }

    pub fn create_path(&self, plan: &DynamicValue) -> Result<String, Diagnostic> {
        match &self.parent {
            None => Ok(format!("{}/", self.collection)),
            Some(route) => {
                let parent_id = plan
                    .get_i64_opt(&AttributePath::new(route.field))
                    .ok_or_else(|| {
                        attribute_error(
                            route.field,
                            format!("Missing {}", route.field),
                            format!("{} is required to create a {}", route.field, self.kind),
                        )
                    })?;
                Ok(format!(
                    "{}/{}/{}/",
                    route.collection, parent_id, route.relation
                ))
            }
        }
    }

    /// JSON body for create and update. Credential types given by name are
    /// resolved against AWX.
    pub async fn body(&self, client: &Client, plan: &DynamicValue) -> Result<Value, Diagnostic> {
        let mut body = Map::new();
        let mut inputs = Map::new();

        for field in self.fields {
            let Some(value) = field.to_api(&plan.get(&field.path()))? else {
                continue;
            };
            match field.location {
                Location::Body => {
                    body.insert(field.api.to_string(), value);
                }
                Location::Input => {
                    inputs.insert(field.api.to_string(), value);
                }
                Location::Local => {}
            }
        }

        if let Some(credential_type) = self.credential_type {
            let id = match credential_type {
                CredentialTypeRef::Id(id) => id,
                CredentialTypeRef::Name(name) => client
                    .objects()
                    .credential_type_id(name)
                    .await
                    .map_err(|e| api_error("Unable to find Credential Type", &e))?
                    .ok_or_else(|| {
                        Diagnostic::error(
                            "Unable to find Credential Type",
                            format!("no credential type named '{}'", name),
                        )
                    })?,
            };
            body.insert("credential_type".to_string(), Value::from(id));
            body.insert("inputs".to_string(), Value::Object(inputs));
        }

        Ok(Value::Object(body))
    }

    /// Builds state from an AWX object. With `only_unknown` set, values the
    /// plan already decided are kept as planned.
    pub fn state_from_api(
        &self,
        object: &Value,
        base: &DynamicValue,
        only_unknown: bool,
    ) -> DynamicValue {
        let mut entries: HashMap<String, Dynamic> =
            base.value.as_map().cloned().unwrap_or_default();

        if let Some(id) = crate::api::common::object_id(object) {
            entries.insert("id".to_string(), Dynamic::String(id.to_string()));
        }
        for field in self.fields {
            let current = entries.get(field.name).cloned().unwrap_or(Dynamic::Null);
            if only_unknown && !current.is_unknown() {
                continue;
            }
            entries.insert(field.name.to_string(), field.from_api(object, &current));
        }

        DynamicValue::new(Dynamic::Map(entries))
    }
}

pub struct ObjectResource {
    spec: &'static ObjectSpec,
    provider_data: Option<AwxProviderData>,
}

impl ObjectResource {
    pub fn new(spec: &'static ObjectSpec) -> Self {
        Self {
            spec,
            provider_data: None,
        }
    }

    fn client(&self) -> Result<&Client, Diagnostic> {
        self.provider_data
            .as_ref()
            .map(|data| data.client.as_ref())
            .ok_or_else(not_configured)
    }

    fn id(state: &DynamicValue) -> Result<i64, Diagnostic> {
        match state.get_string_opt(&AttributePath::new("id")) {
            Some(id) => parse_id(&id),
            None => Err(attribute_error(
                "id",
                "Missing resource id",
                "the state holds no id",
            )),
        }
    }

    async fn create_object(&self, plan: &DynamicValue) -> Result<DynamicValue, Diagnostic> {
        let client = self.client()?;
        let body = self.spec.body(client, plan).await?;
        let path = self.spec.create_path(plan)?;

        let created = client
            .objects()
            .create(&path, &body)
            .await
            .map_err(|e| api_error(format!("Unable to create {}", self.spec.kind), &e))?;
        let state = self.spec.state_from_api(&created, plan, true);
        info!(
            "Created {} {}",
            self.spec.kind,
            state.get_string_opt(&AttributePath::new("id")).unwrap_or_default()
        );
        Ok(state)
    }

    async fn update_object(
        &self,
        prior: &DynamicValue,
        plan: &DynamicValue,
    ) -> Result<DynamicValue, Diagnostic> {
        let client = self.client()?;
        let id = Self::id(prior)?;
        let body = self.spec.body(client, plan).await?;

        let updated = client
            .objects()
            .update(self.spec.collection, id, &body)
            .await
            .map_err(|e| api_error(format!("Unable to update {}", self.spec.kind), &e))?;
        Ok(self.spec.state_from_api(&updated, plan, true))
    }

    async fn delete_object(&self, prior: &DynamicValue) -> Result<(), Diagnostic> {
        let client = self.client()?;
        let id = Self::id(prior)?;
        match client.objects().delete(self.spec.collection, id).await {
            Ok(()) | Err(ApiError::NotFound(_)) => Ok(()),
            Err(e) => Err(api_error(format!("Unable to delete {}", self.spec.kind), &e)),
        }
    }
}

#[async_trait]
impl Resource for ObjectResource {
    fn type_name(&self) -> &str {
        self.spec.type_name
    }

    async fn schema(&self, _ctx: Context, _request: ResourceSchemaRequest) -> ResourceSchemaResponse {
        ResourceSchemaResponse {
            schema: self.spec.schema(),
            diagnostics: vec![],
        }
    }

    async fn create(&self, _ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        match self.create_object(&request.planned_state).await {
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
        let failed = |state: DynamicValue, diagnostic: Diagnostic| ReadResourceResponse {
            new_state: Some(state),
            diagnostics: vec![diagnostic],
            private: vec![],
        };

        let client = match self.client() {
            Ok(client) => client,
            Err(diagnostic) => return failed(request.current_state, diagnostic),
        };
        let id = match Self::id(&request.current_state) {
            Ok(id) => id,
            Err(diagnostic) => return failed(request.current_state, diagnostic),
        };

        match client.objects().get(self.spec.collection, id).await {
            Ok(object) => ReadResourceResponse {
                new_state: Some(self.spec.state_from_api(&object, &request.current_state, false)),
                diagnostics: vec![],
                private: request.private,
            },
            Err(ApiError::NotFound(_)) => {
                warn!("{} {} no longer exists, removing from state", self.spec.kind, id);
                ReadResourceResponse {
                    new_state: None,
                    diagnostics: vec![],
                    private: vec![],
                }
            }
            Err(e) => failed(
                request.current_state,
                api_error(format!("Unable to read {}", self.spec.kind), &e),
            ),
        }
    }

    async fn update(&self, _ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        match self
            .update_object(&request.prior_state, &request.planned_state)
            .await
        {
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

    async fn delete(&self, _ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse {
        DeleteResourceResponse {
            diagnostics: self
                .delete_object(&request.prior_state)
                .await
                .err()
                .into_iter()
                .collect(),
        }
    }

    fn as_import_state(&self) -> Option<&dyn ResourceWithImportState> {
        Some(self)
    }
}

#[async_trait]
impl ResourceWithConfigure for ObjectResource {
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

#[async_trait]
impl ResourceWithImportState for ObjectResource {
    async fn import_state(
        &self,
        ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        let mut response = ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
        };
        if let Err(diagnostic) = parse_id(&request.id) {
            response.diagnostics.push(diagnostic);
            return response;
        }
        import_state_passthrough_id(&ctx, AttributePath::new("id"), &request, &mut response);
        response
    }
}
