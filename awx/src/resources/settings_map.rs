//! Resources that own part of a map valued setting, such as one team of
//! `SOCIAL_AUTH_SAML_TEAM_MAP`
//!
//! AWX only stores the whole map, so every write is a read-modify-write of
//! the key. Those cycles hold the client's lock for the (slug, key) pair and
//! PATCH only that key.

use crate::api::{ApiError, Client};
use crate::diagnostics::{api_error, attribute_error, not_configured};
use crate::provider_data::AwxProviderData;
use crate::values::string_list;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tfplug::context::Context;
use tfplug::defaults::StaticDefault;
use tfplug::plan_modifier::{UseStateForUnknown, UseValueOf};
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, ImportedResource,
    ReadResourceRequest, ReadResourceResponse, Resource, ResourceSchemaRequest,
    ResourceSchemaResponse, ResourceWithConfigure, ResourceWithImportState,
    UpdateResourceRequest, UpdateResourceResponse,
};
use tfplug::schema::{list_block, Attribute, AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// list of group names; AWX also accepts a single string
    Groups,
    Text,
    Flag,
}

#[derive(Debug, Clone, Copy)]
pub struct EntryField {
    pub name: &'static str,
    pub kind: EntryKind,
    pub required: bool,
    pub description: &'static str,
}

impl EntryField {
    const fn new(name: &'static str, kind: EntryKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: false,
            description,
        }
    }

    const fn required(self) -> Self {
        Self {
            required: true,
            ..self
        }
    }

    fn attribute(&self) -> Attribute {
        let builder = match self.kind {
            EntryKind::Groups => {
                AttributeBuilder::new(self.name, AttributeType::List(Box::new(AttributeType::String)))
            }
            EntryKind::Text => AttributeBuilder::new(self.name, AttributeType::String),
            EntryKind::Flag => AttributeBuilder::new(self.name, AttributeType::Bool),
        }
        .description(self.description);

        let builder = match (self.kind, self.required) {
            (_, true) => builder.required(),
            (EntryKind::Flag, false) => builder.default(StaticDefault::bool(false)),
            // AWX answers with [] for groups left out
            (EntryKind::Groups, false) => builder.optional().computed(),
            (_, false) => builder.optional(),
        };
        builder.build()
    }

    fn to_api(&self, value: &Dynamic) -> Value {
        match self.kind {
            EntryKind::Groups => Value::Array(
                string_list(value).into_iter().map(Value::String).collect(),
            ),
            EntryKind::Text => value
                .as_str()
                .map(|s| Value::String(s.to_string()))
                .unwrap_or(Value::Null),
            EntryKind::Flag => Value::Bool(value.as_bool().unwrap_or(false)),
        }
    }

    fn from_api(&self, value: Option<&Value>) -> Dynamic {
        match (self.kind, value) {
            (EntryKind::Groups, Some(Value::String(group))) => {
                Dynamic::List(vec![Dynamic::String(group.clone())])
            }
            (EntryKind::Groups, Some(Value::Array(groups))) => Dynamic::List(
                groups
                    .iter()
                    .filter_map(|g| g.as_str().map(|s| Dynamic::String(s.to_string())))
                    .collect(),
            ),
            (EntryKind::Groups, _) => Dynamic::List(vec![]),
            (EntryKind::Text, Some(Value::String(text))) => Dynamic::String(text.clone()),
            (EntryKind::Text, _) => Dynamic::Null,
            (EntryKind::Flag, Some(Value::Bool(flag))) => Dynamic::Bool(*flag),
            (EntryKind::Flag, _) => Dynamic::Bool(false),
        }
    }
}

/// One named entry of a map valued setting
#[derive(Debug)]
pub struct MapEntrySpec {
    pub type_name: &'static str,
    pub description: &'static str,
    pub slug: &'static str,
    pub key: &'static str,
    /// used in messages, e.g. "team map"
    pub entry: &'static str,
    pub fields: &'static [EntryField],
}

const TEAM_MAP_FIELDS: &[EntryField] = &[
    EntryField::new("users", EntryKind::Groups, "Groups whose members join this team"),
    EntryField::new("organization", EntryKind::Text, "Organization of the team").required(),
    EntryField::new(
        "remove",
        EntryKind::Flag,
        "Remove users that are not in the groups from the team",
    ),
];

pub static SAML_TEAM_MAP: MapEntrySpec = MapEntrySpec {
    type_name: "awx_settings_saml_team_map",
    description: "Maps SAML groups to an AWX team",
    slug: "saml",
    key: "SOCIAL_AUTH_SAML_TEAM_MAP",
    entry: "team map",
    fields: TEAM_MAP_FIELDS,
};

pub static LDAP_TEAM_MAP: MapEntrySpec = MapEntrySpec {
    type_name: "awx_settings_ldap_team_map",
    description: "Maps LDAP groups to an AWX team",
    slug: "ldap",
    key: "AUTH_LDAP_TEAM_MAP",
    entry: "team map",
    fields: TEAM_MAP_FIELDS,
};

pub static SAML_ORGANIZATION_MAP: MapEntrySpec = MapEntrySpec {
    type_name: "awx_settings_saml_organization_map",
    description: "Maps SAML groups to an AWX organization",
    slug: "saml",
    key: "SOCIAL_AUTH_SAML_ORGANIZATION_MAP",
    entry: "organization map",
    fields: &[
        EntryField::new("users", EntryKind::Groups, "Groups whose members join the organization"),
        EntryField::new("admins", EntryKind::Groups, "Groups whose members administer the organization"),
        EntryField::new(
            "remove_users",
            EntryKind::Flag,
            "Remove users that are not in the user groups",
        ),
        EntryField::new(
            "remove_admins",
            EntryKind::Flag,
            "Remove admins that are not in the admin groups",
        ),
    ],
};

pub static MAP_ENTRIES: &[&MapEntrySpec] = &[&SAML_TEAM_MAP, &LDAP_TEAM_MAP, &SAML_ORGANIZATION_MAP];

impl MapEntrySpec {
    pub fn schema(&self) -> Schema {
        let mut builder = SchemaBuilder::new()
            .version(0)
            .description(self.description)
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .computed()
                    .plan_modifier(Box::new(UseValueOf("name")))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .description("Entry name, the team or organization name")
                    .required()
                    .build(),
            );
        for field in self.fields {
            builder = builder.attribute(field.attribute());
        }
        builder.build()
    }

    /// Entry body from the plan, keeping keys this resource does not model
    fn entry(&self, plan: &DynamicValue, existing: Option<Value>) -> Value {
        let mut entry = match existing {
            Some(Value::Object(entry)) => entry,
            _ => Map::new(),
        };
        for field in self.fields {
            entry.insert(
                field.name.to_string(),
                field.to_api(&plan.get(&AttributePath::new(field.name))),
            );
        }
        Value::Object(entry)
    }

    fn state(&self, name: &str, entry: &Value) -> DynamicValue {
        let mut values = HashMap::new();
        values.insert("id".to_string(), Dynamic::String(name.to_string()));
        values.insert("name".to_string(), Dynamic::String(name.to_string()));
        for field in self.fields {
            values.insert(field.name.to_string(), field.from_api(entry.get(field.name)));
        }
        DynamicValue::new(Dynamic::Map(values))
    }
}

/// Reads the map stored under a settings key; null counts as empty
async fn load_map(client: &Client, slug: &str, key: &str) -> Result<Map<String, Value>, Diagnostic> {
    match client.settings().get_key(slug, key).await {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(other) => Err(Diagnostic::error(
            format!("Unable to parse {}", key),
            format!("expected an object, got {}", other),
        )),
        Err(e) => Err(api_error(format!("Unable to fetch {} settings", slug), &e)),
    }
}

pub struct MapEntryResource {
    spec: &'static MapEntrySpec,
    provider_data: Option<AwxProviderData>,
}

impl MapEntryResource {
    pub fn new(spec: &'static MapEntrySpec) -> Self {
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

    fn string(state: &DynamicValue, name: &str) -> Result<String, Diagnostic> {
        state
            .get_string_opt(&AttributePath::new(name))
            .ok_or_else(|| attribute_error(name, format!("Missing {}", name), "the value must be known"))
    }

    async fn save(&self, client: &Client, map: Map<String, Value>, action: &str) -> Result<(), Diagnostic> {
        client
            .settings()
            .patch(self.spec.slug, self.spec.key, Value::Object(map))
            .await
            .map_err(|e| api_error(format!("{}: {} not saved", action, self.spec.entry), &e))
    }

    async fn create_entry(&self, plan: &DynamicValue) -> Result<DynamicValue, Diagnostic> {
        let client = self.client()?;
        let name = Self::string(plan, "name")?;

        let _guard = client.lock_key(self.spec.slug, self.spec.key).await;
        let mut map = load_map(client, self.spec.slug, self.spec.key).await?;
        if map.contains_key(&name) {
            return Err(Diagnostic::error(
                format!("Create: {} already exists", self.spec.entry),
                format!("{} already holds an entry named {}", self.spec.key, name),
            ));
        }

        let entry = self.spec.entry(plan, None);
        map.insert(name.clone(), entry.clone());
        self.save(client, map, "Create").await?;
        info!("Added {} to {}", name, self.spec.key);
        Ok(self.spec.state(&name, &entry))
    }

    async fn update_entry(
        &self,
        prior: &DynamicValue,
        plan: &DynamicValue,
    ) -> Result<DynamicValue, Diagnostic> {
        let client = self.client()?;
        let old_name = Self::string(prior, "id")?;
        let name = Self::string(plan, "name")?;

        let _guard = client.lock_key(self.spec.slug, self.spec.key).await;
        let mut map = load_map(client, self.spec.slug, self.spec.key).await?;
        let existing = map.remove(&old_name);
        if name != old_name {
            info!("Renaming {} to {} in {}", old_name, name, self.spec.key);
        }

        let entry = self.spec.entry(plan, existing);
        map.insert(name.clone(), entry.clone());
        self.save(client, map, "Update").await?;
        Ok(self.spec.state(&name, &entry))
    }

    async fn read_entry(&self, state: &DynamicValue) -> Result<Option<DynamicValue>, Diagnostic> {
        let client = self.client()?;
        let name = Self::string(state, "id")?;
        let map = load_map(client, self.spec.slug, self.spec.key).await?;
        Ok(map.get(&name).map(|entry| self.spec.state(&name, entry)))
    }

    async fn delete_entry(&self, prior: &DynamicValue) -> Result<(), Diagnostic> {
        let client = self.client()?;
        let name = Self::string(prior, "id")?;

        let _guard = client.lock_key(self.spec.slug, self.spec.key).await;
        let mut map = load_map(client, self.spec.slug, self.spec.key).await?;
        if map.remove(&name).is_none() {
            return Ok(());
        }
        self.save(client, map, "Delete").await
    }
}

#[async_trait]
impl Resource for MapEntryResource {
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
        match self.create_entry(&request.planned_state).await {
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
        match self.read_entry(&request.current_state).await {
            Ok(Some(state)) => ReadResourceResponse {
                new_state: Some(state),
                diagnostics: vec![],
                private: request.private,
            },
            Ok(None) => {
                warn!("{} entry is gone from {}, removing from state", self.spec.entry, self.spec.key);
                ReadResourceResponse {
                    new_state: None,
                    diagnostics: vec![],
                    private: vec![],
                }
            }
            Err(diagnostic) => ReadResourceResponse {
                new_state: Some(request.current_state),
                diagnostics: vec![diagnostic],
                private: request.private,
            },
        }
    }

    async fn update(&self, _ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        match self
            .update_entry(&request.prior_state, &request.planned_state)
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
                .delete_entry(&request.prior_state)
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
impl ResourceWithConfigure for MapEntryResource {
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
impl ResourceWithImportState for MapEntryResource {
    /// The import id is the entry name
    async fn import_state(
        &self,
        _ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        ImportResourceStateResponse {
            imported_resources: vec![ImportedResource {
                type_name: request.type_name,
                state: self.spec.state(&request.id, &Value::Null),
                private: vec![],
            }],
            diagnostics: vec![],
        }
    }
}

pub const TEAM_ATTRIBUTES_TYPE_NAME: &str = "awx_settings_saml_team_attributes";
const TEAM_ATTRIBUTES_SLUG: &str = "saml";
const TEAM_ATTRIBUTES_KEY: &str = "SOCIAL_AUTH_SAML_TEAM_ATTR";
const TEAM_ORG_FIELDS: [&str; 3] = ["team", "organization", "team_alias"];

/// Owns the whole `SOCIAL_AUTH_SAML_TEAM_ATTR` value
#[derive(Default)]
pub struct TeamAttributesResource {
    provider_data: Option<AwxProviderData>,
}

impl TeamAttributesResource {
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&self) -> Result<&Client, Diagnostic> {
        self.provider_data
            .as_ref()
            .map(|data| data.client.as_ref())
            .ok_or_else(not_configured)
    }

    fn value(plan: &DynamicValue) -> Value {
        let team_org_map = plan
            .get_list(&AttributePath::new("team_org_map"))
            .unwrap_or_default()
            .iter()
            .map(|item| {
                Value::Object(
                    TEAM_ORG_FIELDS
                        .iter()
                        .map(|field| {
                            let text = item.get(field).and_then(Dynamic::as_str).unwrap_or_default();
                            (field.to_string(), Value::String(text.to_string()))
                        })
                        .collect(),
                )
            })
            .collect();

        let mut value = Map::new();
        value.insert(
            "saml_attr".to_string(),
            Value::String(
                plan.get_string_opt(&AttributePath::new("saml_attr"))
                    .unwrap_or_default(),
            ),
        );
        value.insert(
            "remove".to_string(),
            Value::Bool(
                plan.get_bool_opt(&AttributePath::new("remove"))
                    .unwrap_or(false),
            ),
        );
        value.insert("team_org_map".to_string(), Value::Array(team_org_map));
        Value::Object(value)
    }

    fn state(value: &Value) -> DynamicValue {
        let text = |v: Option<&Value>| Dynamic::String(v.and_then(Value::as_str).unwrap_or_default().to_string());
        let team_org_map = value
            .get("team_org_map")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| {
                        Dynamic::Map(
                            TEAM_ORG_FIELDS
                                .iter()
                                .map(|field| (field.to_string(), text(item.get(*field))))
                                .collect(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut values = HashMap::new();
        values.insert("id".to_string(), Dynamic::String(TEAM_ATTRIBUTES_KEY.to_string()));
        values.insert("saml_attr".to_string(), text(value.get("saml_attr")));
        values.insert(
            "remove".to_string(),
            Dynamic::Bool(value.get("remove").and_then(Value::as_bool).unwrap_or(false)),
        );
        values.insert("team_org_map".to_string(), Dynamic::List(team_org_map));
        DynamicValue::new(Dynamic::Map(values))
    }

    async fn write(&self, plan: &DynamicValue) -> Result<DynamicValue, Diagnostic> {
        let client = self.client()?;
        let value = Self::value(plan);

        let _guard = client.lock_key(TEAM_ATTRIBUTES_SLUG, TEAM_ATTRIBUTES_KEY).await;
        client
            .settings()
            .patch(TEAM_ATTRIBUTES_SLUG, TEAM_ATTRIBUTES_KEY, value.clone())
            .await
            .map_err(|e| api_error(format!("Unable to update {}", TEAM_ATTRIBUTES_KEY), &e))?;
        Ok(Self::state(&value))
    }

    async fn clear(&self) -> Result<(), Diagnostic> {
        let client = self.client()?;
        let _guard = client.lock_key(TEAM_ATTRIBUTES_SLUG, TEAM_ATTRIBUTES_KEY).await;
        match client
            .settings()
            .patch(TEAM_ATTRIBUTES_SLUG, TEAM_ATTRIBUTES_KEY, Value::Object(Map::new()))
            .await
        {
            Ok(()) | Err(ApiError::NotFound(_)) => Ok(()),
            Err(e) => Err(api_error(format!("Unable to clear {}", TEAM_ATTRIBUTES_KEY), &e)),
        }
    }

    async fn fetch(&self) -> Result<Option<DynamicValue>, Diagnostic> {
        let client = self.client()?;
        let value = client
            .settings()
            .get_key(TEAM_ATTRIBUTES_SLUG, TEAM_ATTRIBUTES_KEY)
            .await
            .map_err(|e| api_error(format!("Unable to fetch {}", TEAM_ATTRIBUTES_KEY), &e))?;
        Ok(match value {
            Value::Object(ref map) if !map.is_empty() => Some(Self::state(&value)),
            _ => None,
        })
    }
}

fn team_attributes_schema() -> Schema {
    let required_text = |name: &str, description: &str| {
        AttributeBuilder::new(name, AttributeType::String)
            .description(description)
            .required()
            .build()
    };

    SchemaBuilder::new()
        .version(0)
        .description("Maps a SAML attribute to AWX teams")
        .attribute(
            AttributeBuilder::new("id", AttributeType::String)
                .computed()
                .plan_modifier(Box::new(UseStateForUnknown))
                .build(),
        )
        .attribute(required_text("saml_attr", "SAML attribute holding the team names"))
        .attribute(
            AttributeBuilder::new("remove", AttributeType::Bool)
                .description("Remove users from teams they are no longer listed in")
                .required()
                .build(),
        )
        .block(list_block(
            "team_org_map",
            "Team to organization mapping",
            vec![
                required_text("team", "Team name in the SAML attribute"),
                required_text("organization", "Organization of the team"),
                required_text("team_alias", "Name of the team in AWX"),
            ],
        ))
        .build()
}

#[async_trait]
impl Resource for TeamAttributesResource {
    fn type_name(&self) -> &str {
        TEAM_ATTRIBUTES_TYPE_NAME
    }

    async fn schema(&self, _ctx: Context, _request: ResourceSchemaRequest) -> ResourceSchemaResponse {
        ResourceSchemaResponse {
            schema: team_attributes_schema(),
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
        match self.fetch().await {
            Ok(new_state) => ReadResourceResponse {
                new_state,
                diagnostics: vec![],
                private: request.private,
            },
            Err(diagnostic) => ReadResourceResponse {
                new_state: Some(request.current_state),
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

    async fn delete(&self, _ctx: Context, _request: DeleteResourceRequest) -> DeleteResourceResponse {
        DeleteResourceResponse {
            diagnostics: self.clear().await.err().into_iter().collect(),
        }
    }

    fn as_import_state(&self) -> Option<&dyn ResourceWithImportState> {
        Some(self)
    }
}

#[async_trait]
impl ResourceWithConfigure for TeamAttributesResource {
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
impl ResourceWithImportState for TeamAttributesResource {
    async fn import_state(
        &self,
        _ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        if request.id != TEAM_ATTRIBUTES_KEY {
            return ImportResourceStateResponse {
                imported_resources: vec![],
                diagnostics: vec![Diagnostic::error(
                    "Unexpected import identifier",
                    format!("expected {}, got '{}'", TEAM_ATTRIBUTES_KEY, request.id),
                )],
            };
        }
        ImportResourceStateResponse {
            imported_resources: vec![ImportedResource {
                type_name: request.type_name,
                state: Self::state(&Value::Null),
                private: vec![],
            }],
            diagnostics: vec![],
        }
    }
}
