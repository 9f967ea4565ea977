//! Associations between two existing AWX objects, e.g. a credential
//! attached to a job template

use crate::api::{ApiError, Client};
use crate::diagnostics::{api_error, attribute_error, not_configured, state_error};
use crate::provider_data::AwxProviderData;
use async_trait::async_trait;
use tfplug::context::Context;
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, ImportedResource,
    ReadResourceRequest, ReadResourceResponse, Resource, ResourceSchemaRequest,
    ResourceSchemaResponse, ResourceWithConfigure, ResourceWithImportState,
    UpdateResourceRequest, UpdateResourceResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::split_import_id;
use tfplug::types::{AttributePath, Diagnostic, DynamicValue};
use tracing::warn;

#[derive(Debug)]
pub struct AssociationSpec {
    pub type_name: &'static str,
    pub description: &'static str,
    pub parent_field: &'static str,
    pub parent_collection: &'static str,
    pub relation: &'static str,
    pub child_field: &'static str,
}

impl AssociationSpec {
    fn path(&self, parent_id: i64) -> String {
        format!("{}/{}/{}/", self.parent_collection, parent_id, self.relation)
    }

    pub fn schema(&self) -> Schema {
        SchemaBuilder::new()
            .version(0)
            .description(self.description)
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .description("Parent and child ids joined by ':'")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new(self.parent_field, AttributeType::Number)
                    .required()
                    .requires_replace()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new(self.child_field, AttributeType::Number)
                    .required()
                    .requires_replace()
                    .build(),
            )
            .build()
    }

    fn ids(&self, state: &DynamicValue) -> Result<(i64, i64), Diagnostic> {
        let get = |field: &str| {
            state.get_i64_opt(&AttributePath::new(field)).ok_or_else(|| {
                attribute_error(field, format!("Missing {}", field), "the value must be known")
            })
        };
        Ok((get(self.parent_field)?, get(self.child_field)?))
    }

    fn state(&self, parent_id: i64, child_id: i64) -> Result<DynamicValue, Diagnostic> {
        let mut state = DynamicValue::object();
        state
            .set_string(
                &AttributePath::new("id"),
                format!("{}:{}", parent_id, child_id),
            )
            .map_err(state_error("id"))?;
        state
            .set_number(&AttributePath::new(self.parent_field), parent_id as f64)
            .map_err(state_error(self.parent_field))?;
        state
            .set_number(&AttributePath::new(self.child_field), child_id as f64)
            .map_err(state_error(self.child_field))?;
        Ok(state)
    }
}

macro_rules! notification_associations {
    ($parent:literal, $collection:literal, $field:literal) => {
        [
            AssociationSpec {
                type_name: concat!("awx_", $parent, "_notification_template_error"),
                description: "Notifies when jobs fail",
                parent_field: $field,
                parent_collection: $collection,
                relation: "notification_templates_error",
                child_field: "notification_template_id",
            },
            AssociationSpec {
                type_name: concat!("awx_", $parent, "_notification_template_started"),
                description: "Notifies when jobs start",
                parent_field: $field,
                parent_collection: $collection,
                relation: "notification_templates_started",
                child_field: "notification_template_id",
            },
            AssociationSpec {
                type_name: concat!("awx_", $parent, "_notification_template_success"),
                description: "Notifies when jobs succeed",
                parent_field: $field,
                parent_collection: $collection,
                relation: "notification_templates_success",
                child_field: "notification_template_id",
            },
        ]
    };
}

pub static JOB_TEMPLATE_NOTIFICATIONS: [AssociationSpec; 3] =
    notification_associations!("job_template", "job_templates", "job_template_id");

pub static WORKFLOW_JOB_TEMPLATE_NOTIFICATIONS: [AssociationSpec; 3] = notification_associations!(
    "workflow_job_template",
    "workflow_job_templates",
    "workflow_job_template_id"
);

pub static JOB_TEMPLATE_CREDENTIAL: AssociationSpec = AssociationSpec {
    type_name: "awx_job_template_credential",
    description: "Attaches a credential to a job template",
    parent_field: "job_template_id",
    parent_collection: "job_templates",
    relation: "credentials",
    child_field: "credential_id",
};

pub static ORGANIZATION_GALAXY_CREDENTIAL: AssociationSpec = AssociationSpec {
    type_name: "awx_organization_galaxy_credential",
    description: "Adds a Galaxy credential to an organization",
    parent_field: "organization_id",
    parent_collection: "organizations",
    relation: "galaxy_credentials",
    child_field: "credential_id",
};

pub fn all() -> impl Iterator<Item = &'static AssociationSpec> {
    [&JOB_TEMPLATE_CREDENTIAL, &ORGANIZATION_GALAXY_CREDENTIAL]
        .into_iter()
        .chain(JOB_TEMPLATE_NOTIFICATIONS.iter())
        .chain(WORKFLOW_JOB_TEMPLATE_NOTIFICATIONS.iter())
}

pub struct AssociationResource {
    spec: &'static AssociationSpec,
    provider_data: Option<AwxProviderData>,
}

impl AssociationResource {
    pub fn new(spec: &'static AssociationSpec) -> Self {
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

    async fn associate(&self, plan: &DynamicValue) -> Result<DynamicValue, Diagnostic> {
        let client = self.client()?;
        let (parent_id, child_id) = self.spec.ids(plan)?;
        client
            .associations()
            .associate(&self.spec.path(parent_id), child_id)
            .await
            .map_err(|e| api_error(format!("Unable to create {}", self.spec.type_name), &e))?;
        self.spec.state(parent_id, child_id)
    }

    async fn still_associated(&self, state: &DynamicValue) -> Result<bool, Diagnostic> {
        let client = self.client()?;
        let (parent_id, child_id) = self.spec.ids(state)?;
        match client
            .associations()
            .is_associated(&self.spec.path(parent_id), child_id)
            .await
        {
            Ok(found) => Ok(found),
            Err(ApiError::NotFound(_)) => Ok(false),
            Err(e) => Err(api_error(format!("Unable to read {}", self.spec.type_name), &e)),
        }
    }

    async fn disassociate(&self, state: &DynamicValue) -> Result<(), Diagnostic> {
        let client = self.client()?;
        let (parent_id, child_id) = self.spec.ids(state)?;
        match client
            .associations()
            .disassociate(&self.spec.path(parent_id), child_id)
            .await
        {
            Ok(()) | Err(ApiError::NotFound(_)) => Ok(()),
            Err(e) => Err(api_error(format!("Unable to delete {}", self.spec.type_name), &e)),
        }
    }
}

#[async_trait]
impl Resource for AssociationResource {
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
        match self.associate(&request.planned_state).await {
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
        match self.still_associated(&request.current_state).await {
            Ok(true) => ReadResourceResponse {
                new_state: Some(request.current_state),
                diagnostics: vec![],
                private: request.private,
            },
            Ok(false) => {
                warn!("{} is no longer associated, removing from state", self.spec.type_name);
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

    /// Both ids force replacement, so there is nothing to change in place
    async fn update(&self, _ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        UpdateResourceResponse {
            new_state: request.planned_state,
            private: vec![],
            diagnostics: vec![],
        }
    }

    async fn delete(&self, _ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse {
        DeleteResourceResponse {
            diagnostics: self
                .disassociate(&request.prior_state)
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
impl ResourceWithConfigure for AssociationResource {
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
impl ResourceWithImportState for AssociationResource {
    /// Accepts `<parent_id>:<child_id>`
    async fn import_state(
        &self,
        _ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        let parsed = split_import_id(&request.id, ':', 2).and_then(|parts| {
            let parse = |part: &str| {
                part.trim().parse::<i64>().map_err(|_| {
                    Diagnostic::error(
                        "Unexpected import identifier",
                        format!("expected <{}>:<{}>, got '{}'", self.spec.parent_field, self.spec.child_field, request.id),
                    )
                })
            };
            self.spec.state(parse(parts[0])?, parse(parts[1])?)
        });

        match parsed {
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
