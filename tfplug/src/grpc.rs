//! gRPC service implementation of the Terraform Plugin Protocol v6
//!
//! Resources and data sources are created from the provider's factories on
//! every request and configured with the shared provider data, so no
//! resource instance outlives a single RPC.

use crate::context::Context;
use crate::data_source::{
    ConfigureDataSourceRequest, DataSourceSchemaRequest, DataSourceWithConfigure,
    ReadDataSourceRequest, ValidateDataSourceConfigRequest,
};
use crate::proto;
use crate::provider::{
    ConfigureProviderRequest, DataSourceFactory, Provider, ProviderMetadataRequest,
    ProviderSchemaRequest, ResourceFactory, StopProviderRequest, ValidateProviderConfigRequest,
};
use crate::resource::{
    ConfigureResourceRequest, CreateResourceRequest, DeleteResourceRequest,
    ImportResourceStateRequest, ReadResourceRequest, ResourceSchemaRequest,
    ResourceWithConfigure, UpdateResourceRequest, ValidateResourceConfigRequest,
};
use crate::schema::{
    Attribute, Block, DefaultRequest, NestingMode, PlanModifierRequest, Schema, StringKind,
    ValidatorRequest,
};
use crate::types::{
    has_errors, AttributePath, AttributePathStep, ClientCapabilities, Diagnostic,
    DiagnosticSeverity, Dynamic, DynamicValue,
};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tonic::{Request, Response, Status};
use tracing::{debug, warn};

type ProviderData = Option<Arc<dyn Any + Send + Sync>>;

/// Schemas are fixed for the life of the plugin, collect them once
struct Schemas {
    provider: Schema,
    resources: HashMap<String, Schema>,
    data_sources: HashMap<String, Schema>,
    diagnostics: Vec<Diagnostic>,
}

pub struct ProviderService<P: Provider> {
    provider: Arc<RwLock<P>>,
    provider_data: Arc<RwLock<ProviderData>>,
    resources: Arc<HashMap<String, ResourceFactory>>,
    data_sources: Arc<HashMap<String, DataSourceFactory>>,
    schemas: Arc<OnceCell<Schemas>>,
    root: Context,
}

impl<P: Provider + 'static> ProviderService<P> {
    pub fn new(provider: P) -> Self {
        let resources = provider.resources();
        let data_sources = provider.data_sources();
        Self {
            provider: Arc::new(RwLock::new(provider)),
            provider_data: Arc::new(RwLock::new(None)),
            resources: Arc::new(resources),
            data_sources: Arc::new(data_sources),
            schemas: Arc::new(OnceCell::new()),
            root: Context::new(),
        }
    }

    /// Context cancelled by StopProvider
    pub fn context(&self) -> Context {
        self.root.clone()
    }

    async fn schemas(&self) -> &Schemas {
        self.schemas
            .get_or_init(|| async {
                let ctx = self.root.child();
                let mut diagnostics = Vec::new();

                let provider_schema = {
                    let provider = self.provider.read().await;
                    let response = provider
                        .schema(ctx.clone(), ProviderSchemaRequest)
                        .await;
                    diagnostics.extend(response.diagnostics);
                    response.schema
                };

                let mut resources = HashMap::new();
                for (name, factory) in self.resources.iter() {
                    let response = factory().schema(ctx.clone(), ResourceSchemaRequest).await;
                    diagnostics.extend(response.diagnostics);
                    resources.insert(name.clone(), response.schema);
                }

                let mut data_sources = HashMap::new();
                for (name, factory) in self.data_sources.iter() {
                    let response = factory()
                        .schema(ctx.clone(), DataSourceSchemaRequest)
                        .await;
                    diagnostics.extend(response.diagnostics);
                    data_sources.insert(name.clone(), response.schema);
                }

                Schemas {
                    provider: provider_schema,
                    resources,
                    data_sources,
                    diagnostics,
                }
            })
            .await
    }

    async fn resource_schema(&self, type_name: &str) -> Result<&Schema, Diagnostic> {
        self.schemas()
            .await
            .resources
            .get(type_name)
            .ok_or_else(|| unknown_type("resource", type_name))
    }

    async fn data_source_schema(&self, type_name: &str) -> Result<&Schema, Diagnostic> {
        self.schemas()
            .await
            .data_sources
            .get(type_name)
            .ok_or_else(|| unknown_type("data source", type_name))
    }

    async fn resource(
        &self,
        ctx: &Context,
        type_name: &str,
    ) -> Result<Box<dyn ResourceWithConfigure>, Vec<Diagnostic>> {
        let factory = self
            .resources
            .get(type_name)
            .ok_or_else(|| vec![unknown_type("resource", type_name)])?;
        let mut resource = factory();
        let provider_data = self.provider_data.read().await.clone();
        let response = resource
            .configure(ctx.clone(), ConfigureResourceRequest { provider_data })
            .await;
        if has_errors(&response.diagnostics) {
            return Err(response.diagnostics);
        }
        Ok(resource)
    }

    async fn data_source(
        &self,
        ctx: &Context,
        type_name: &str,
    ) -> Result<Box<dyn DataSourceWithConfigure>, Vec<Diagnostic>> {
        let factory = self
            .data_sources
            .get(type_name)
            .ok_or_else(|| vec![unknown_type("data source", type_name)])?;
        let mut data_source = factory();
        let provider_data = self.provider_data.read().await.clone();
        let response = data_source
            .configure(ctx.clone(), ConfigureDataSourceRequest { provider_data })
            .await;
        if has_errors(&response.diagnostics) {
            return Err(response.diagnostics);
        }
        Ok(data_source)
    }
}

#[tonic::async_trait]
impl<P: Provider + 'static> proto::ProviderService for ProviderService<P> {
    async fn get_metadata(
        &self,
        _request: Request<proto::get_metadata::Request>,
    ) -> Result<Response<proto::get_metadata::Response>, Status> {
        let metadata = {
            let provider = self.provider.read().await;
            provider
                .metadata(self.root.child(), ProviderMetadataRequest)
                .await
        };

        let mut resources: Vec<_> = self.resources.keys().cloned().collect();
        resources.sort();
        let mut data_sources: Vec<_> = self.data_sources.keys().cloned().collect();
        data_sources.sort();

        Ok(Response::new(proto::get_metadata::Response {
            server_capabilities: Some(server_capabilities_to_proto(
                &metadata.server_capabilities,
            )),
            diagnostics: vec![],
            data_sources: data_sources
                .into_iter()
                .map(|type_name| proto::get_metadata::DataSourceMetadata { type_name })
                .collect(),
            resources: resources
                .into_iter()
                .map(|type_name| proto::get_metadata::ResourceMetadata { type_name })
                .collect(),
        }))
    }

    async fn get_provider_schema(
        &self,
        _request: Request<proto::get_provider_schema::Request>,
    ) -> Result<Response<proto::get_provider_schema::Response>, Status> {
        let schemas = self.schemas().await;
        let capabilities = {
            let provider = self.provider.read().await;
            provider
                .metadata(self.root.child(), ProviderMetadataRequest)
                .await
                .server_capabilities
        };

        Ok(Response::new(proto::get_provider_schema::Response {
            provider: Some(schema_to_proto(&schemas.provider)),
            resource_schemas: schemas
                .resources
                .iter()
                .map(|(name, schema)| (name.clone(), schema_to_proto(schema)))
                .collect(),
            data_source_schemas: schemas
                .data_sources
                .iter()
                .map(|(name, schema)| (name.clone(), schema_to_proto(schema)))
                .collect(),
            diagnostics: diagnostics_to_proto(&schemas.diagnostics),
            provider_meta: None,
            server_capabilities: Some(server_capabilities_to_proto(&capabilities)),
        }))
    }

    async fn validate_provider_config(
        &self,
        request: Request<proto::validate_provider_config::Request>,
    ) -> Result<Response<proto::validate_provider_config::Response>, Status> {
        let req = request.into_inner();
        let config = decode_dynamic_value(&req.config)?;

        let mut diagnostics = validate_block(
            &self.schemas().await.provider.block,
            &config.value,
            &AttributePath::root(),
        );
        if !has_errors(&diagnostics) {
            let provider = self.provider.read().await;
            let response = provider
                .validate(self.root.child(), ValidateProviderConfigRequest { config })
                .await;
            diagnostics.extend(response.diagnostics);
        }

        Ok(Response::new(proto::validate_provider_config::Response {
            diagnostics: diagnostics_to_proto(&diagnostics),
        }))
    }

    async fn validate_resource_config(
        &self,
        request: Request<proto::validate_resource_config::Request>,
    ) -> Result<Response<proto::validate_resource_config::Response>, Status> {
        let req = request.into_inner();
        let config = decode_dynamic_value(&req.config)?;
        debug!(type_name = %req.type_name, "validating resource config");

        let diagnostics = match self.resource_schema(&req.type_name).await {
            Err(diag) => vec![diag],
            Ok(schema) => {
                let mut diagnostics =
                    validate_block(&schema.block, &config.value, &AttributePath::root());
                if !has_errors(&diagnostics) {
                    let ctx = self.root.child();
                    match self.resource(&ctx, &req.type_name).await {
                        Ok(resource) => {
                            let response = resource
                                .validate(
                                    ctx,
                                    ValidateResourceConfigRequest {
                                        type_name: req.type_name.clone(),
                                        config,
                                        client_capabilities: client_capabilities_from_proto(
                                            req.client_capabilities.as_ref(),
                                        ),
                                    },
                                )
                                .await;
                            diagnostics.extend(response.diagnostics);
                        }
                        Err(diags) => diagnostics.extend(diags),
                    }
                }
                diagnostics
            }
        };

        Ok(Response::new(proto::validate_resource_config::Response {
            diagnostics: diagnostics_to_proto(&diagnostics),
        }))
    }

    async fn validate_data_resource_config(
        &self,
        request: Request<proto::validate_data_resource_config::Request>,
    ) -> Result<Response<proto::validate_data_resource_config::Response>, Status> {
        let req = request.into_inner();
        let config = decode_dynamic_value(&req.config)?;

        let diagnostics = match self.data_source_schema(&req.type_name).await {
            Err(diag) => vec![diag],
            Ok(schema) => {
                let mut diagnostics =
                    validate_block(&schema.block, &config.value, &AttributePath::root());
                if !has_errors(&diagnostics) {
                    let ctx = self.root.child();
                    match self.data_source(&ctx, &req.type_name).await {
                        Ok(data_source) => {
                            let response = data_source
                                .validate(
                                    ctx,
                                    ValidateDataSourceConfigRequest {
                                        type_name: req.type_name.clone(),
                                        config,
                                    },
                                )
                                .await;
                            diagnostics.extend(response.diagnostics);
                        }
                        Err(diags) => diagnostics.extend(diags),
                    }
                }
                diagnostics
            }
        };

        Ok(Response::new(
            proto::validate_data_resource_config::Response {
                diagnostics: diagnostics_to_proto(&diagnostics),
            },
        ))
    }

    async fn upgrade_resource_state(
        &self,
        request: Request<proto::upgrade_resource_state::Request>,
    ) -> Result<Response<proto::upgrade_resource_state::Response>, Status> {
        let req = request.into_inner();

        let schema = match self.resource_schema(&req.type_name).await {
            Ok(schema) => schema,
            Err(diag) => {
                return Ok(Response::new(proto::upgrade_resource_state::Response {
                    upgraded_state: None,
                    diagnostics: diagnostics_to_proto(&[diag]),
                }))
            }
        };

        let raw = req.raw_state.unwrap_or_default();
        if raw.json.is_empty() {
            let diagnostics = if raw.flatmap.is_empty() {
                vec![]
            } else {
                vec![Diagnostic::error(
                    "Unsupported state format",
                    "flatmap state from Terraform 0.11 and older cannot be upgraded",
                )]
            };
            return Ok(Response::new(proto::upgrade_resource_state::Response {
                upgraded_state: None,
                diagnostics: diagnostics_to_proto(&diagnostics),
            }));
        }

        let state = match DynamicValue::decode_json(&raw.json) {
            Ok(state) => state,
            Err(e) => {
                return Ok(Response::new(proto::upgrade_resource_state::Response {
                    upgraded_state: None,
                    diagnostics: diagnostics_to_proto(&[Diagnostic::error(
                        "Unable to read prior state",
                        e.to_string(),
                    )]),
                }))
            }
        };

        debug!(type_name = %req.type_name, version = req.version, "upgrading resource state");
        let upgraded = DynamicValue::new(schema.block.conform(state.value));

        Ok(Response::new(proto::upgrade_resource_state::Response {
            upgraded_state: Some(encode_dynamic_value(&upgraded)?),
            diagnostics: vec![],
        }))
    }

    async fn configure_provider(
        &self,
        request: Request<proto::configure_provider::Request>,
    ) -> Result<Response<proto::configure_provider::Response>, Status> {
        let req = request.into_inner();
        let config = decode_dynamic_value(&req.config)?;
        debug!(terraform_version = %req.terraform_version, "configuring provider");

        let response = {
            let mut provider = self.provider.write().await;
            provider
                .configure(
                    self.root.child(),
                    ConfigureProviderRequest {
                        terraform_version: req.terraform_version,
                        config,
                        client_capabilities: client_capabilities_from_proto(
                            req.client_capabilities.as_ref(),
                        ),
                    },
                )
                .await
        };

        if !has_errors(&response.diagnostics) {
            *self.provider_data.write().await = response.provider_data;
        }

        Ok(Response::new(proto::configure_provider::Response {
            diagnostics: diagnostics_to_proto(&response.diagnostics),
        }))
    }

    async fn read_resource(
        &self,
        request: Request<proto::read_resource::Request>,
    ) -> Result<Response<proto::read_resource::Response>, Status> {
        let req = request.into_inner();
        let current_state = decode_dynamic_value(&req.current_state)?;
        let ctx = self.root.child();

        let block = match self.resource_schema(&req.type_name).await {
            Ok(schema) => &schema.block,
            Err(diag) => return Ok(read_failed(req.current_state, req.private, vec![diag])),
        };
        let resource = match self.resource(&ctx, &req.type_name).await {
            Ok(resource) => resource,
            Err(diags) => return Ok(read_failed(req.current_state, req.private, diags)),
        };

        let response = resource
            .read(
                ctx,
                ReadResourceRequest {
                    type_name: req.type_name.clone(),
                    current_state: current_state.clone(),
                    private: req.private.clone(),
                    provider_meta: optional_dynamic_value(&req.provider_meta)?,
                    client_capabilities: client_capabilities_from_proto(
                        req.client_capabilities.as_ref(),
                    ),
                },
            )
            .await;

        let new_state = match response.new_state {
            Some(state) => DynamicValue::new(block.conform(resolve_unknowns(state.value))),
            None if has_errors(&response.diagnostics) => current_state,
            None => {
                debug!(type_name = %req.type_name, "resource no longer exists, removing from state");
                DynamicValue::null()
            }
        };

        Ok(Response::new(proto::read_resource::Response {
            new_state: Some(encode_dynamic_value(&new_state)?),
            diagnostics: diagnostics_to_proto(&response.diagnostics),
            private: response.private,
        }))
    }

    async fn plan_resource_change(
        &self,
        request: Request<proto::plan_resource_change::Request>,
    ) -> Result<Response<proto::plan_resource_change::Response>, Status> {
        let req = request.into_inner();
        let prior_state = decode_dynamic_value(&req.prior_state)?;
        let proposed = decode_dynamic_value(&req.proposed_new_state)?;
        let config = decode_dynamic_value(&req.config)?;

        let schema = match self.resource_schema(&req.type_name).await {
            Ok(schema) => schema,
            Err(diag) => {
                return Ok(Response::new(proto::plan_resource_change::Response {
                    planned_state: req.proposed_new_state,
                    requires_replace: vec![],
                    planned_private: req.prior_private,
                    diagnostics: diagnostics_to_proto(&[diag]),
                    legacy_type_system: false,
                }))
            }
        };

        let outcome = plan_change(&schema.block, &prior_state, &proposed, &config);

        Ok(Response::new(proto::plan_resource_change::Response {
            planned_state: Some(encode_dynamic_value(&outcome.planned_state)?),
            requires_replace: outcome
                .requires_replace
                .iter()
                .map(attribute_path_to_proto)
                .collect(),
            planned_private: req.prior_private,
            diagnostics: diagnostics_to_proto(&outcome.diagnostics),
            legacy_type_system: false,
        }))
    }

    async fn apply_resource_change(
        &self,
        request: Request<proto::apply_resource_change::Request>,
    ) -> Result<Response<proto::apply_resource_change::Response>, Status> {
        let req = request.into_inner();
        let prior_state = decode_dynamic_value(&req.prior_state)?;
        let planned_state = decode_dynamic_value(&req.planned_state)?;
        let config = decode_dynamic_value(&req.config)?;
        let provider_meta = optional_dynamic_value(&req.provider_meta)?;
        let ctx = self.root.child();

        let failed = |state: &DynamicValue, diags: Vec<Diagnostic>| {
            Ok::<_, Status>(Response::new(proto::apply_resource_change::Response {
                new_state: Some(encode_dynamic_value(state)?),
                private: vec![],
                diagnostics: diagnostics_to_proto(&diags),
                legacy_type_system: false,
            }))
        };

        let block = match self.resource_schema(&req.type_name).await {
            Ok(schema) => &schema.block,
            Err(diag) => return failed(&prior_state, vec![diag]),
        };
        let resource = match self.resource(&ctx, &req.type_name).await {
            Ok(resource) => resource,
            Err(diags) => return failed(&prior_state, diags),
        };

        let (new_state, private, diagnostics) = if planned_state.is_null() {
            debug!(type_name = %req.type_name, "deleting resource");
            let response = resource
                .delete(
                    ctx,
                    DeleteResourceRequest {
                        type_name: req.type_name.clone(),
                        prior_state: prior_state.clone(),
                        planned_private: req.planned_private.clone(),
                        provider_meta,
                    },
                )
                .await;
            let state = if has_errors(&response.diagnostics) {
                prior_state.clone()
            } else {
                DynamicValue::null()
            };
            (state, vec![], response.diagnostics)
        } else if prior_state.is_null() {
            debug!(type_name = %req.type_name, "creating resource");
            let response = resource
                .create(
                    ctx,
                    CreateResourceRequest {
                        type_name: req.type_name.clone(),
                        planned_state,
                        config,
                        planned_private: req.planned_private.clone(),
                        provider_meta,
                    },
                )
                .await;
            (response.new_state, response.private, response.diagnostics)
        } else {
            debug!(type_name = %req.type_name, "updating resource");
            let response = resource
                .update(
                    ctx,
                    UpdateResourceRequest {
                        type_name: req.type_name.clone(),
                        prior_state: prior_state.clone(),
                        planned_state,
                        config,
                        planned_private: req.planned_private.clone(),
                        provider_meta,
                    },
                )
                .await;
            let state = if response.new_state.is_null() && has_errors(&response.diagnostics) {
                prior_state.clone()
            } else {
                response.new_state
            };
            (state, response.private, response.diagnostics)
        };

        if has_errors(&diagnostics) {
            warn!(type_name = %req.type_name, "apply finished with errors");
        }

        let new_state = if new_state.is_null() {
            new_state
        } else {
            DynamicValue::new(block.conform(resolve_unknowns(new_state.value)))
        };

        Ok(Response::new(proto::apply_resource_change::Response {
            new_state: Some(encode_dynamic_value(&new_state)?),
            private,
            diagnostics: diagnostics_to_proto(&diagnostics),
            legacy_type_system: false,
        }))
    }

    async fn import_resource_state(
        &self,
        request: Request<proto::import_resource_state::Request>,
    ) -> Result<Response<proto::import_resource_state::Response>, Status> {
        let req = request.into_inner();
        let ctx = self.root.child();

        let failed = |diags: Vec<Diagnostic>| {
            Response::new(proto::import_resource_state::Response {
                imported_resources: vec![],
                diagnostics: diagnostics_to_proto(&diags),
            })
        };

        let block = match self.resource_schema(&req.type_name).await {
            Ok(schema) => &schema.block,
            Err(diag) => return Ok(failed(vec![diag])),
        };
        let resource = match self.resource(&ctx, &req.type_name).await {
            Ok(resource) => resource,
            Err(diags) => return Ok(failed(diags)),
        };
        let Some(importer) = resource.as_import_state() else {
            return Ok(failed(vec![Diagnostic::error(
                "Resource Import Not Implemented",
                format!("{} does not support import", req.type_name),
            )]));
        };

        let response = importer
            .import_state(
                ctx,
                ImportResourceStateRequest {
                    type_name: req.type_name.clone(),
                    id: req.id.clone(),
                    client_capabilities: client_capabilities_from_proto(
                        req.client_capabilities.as_ref(),
                    ),
                },
            )
            .await;

        let mut imported_resources = Vec::with_capacity(response.imported_resources.len());
        for imported in response.imported_resources {
            let state = DynamicValue::new(block.conform(imported.state.value));
            imported_resources.push(proto::import_resource_state::ImportedResource {
                type_name: imported.type_name,
                state: Some(encode_dynamic_value(&state)?),
                private: imported.private,
            });
        }

        Ok(Response::new(proto::import_resource_state::Response {
            imported_resources,
            diagnostics: diagnostics_to_proto(&response.diagnostics),
        }))
    }

    async fn read_data_source(
        &self,
        request: Request<proto::read_data_source::Request>,
    ) -> Result<Response<proto::read_data_source::Response>, Status> {
        let req = request.into_inner();
        let config = decode_dynamic_value(&req.config)?;
        let ctx = self.root.child();

        let failed = |diags: Vec<Diagnostic>| {
            Response::new(proto::read_data_source::Response {
                state: None,
                diagnostics: diagnostics_to_proto(&diags),
            })
        };

        let block = match self.data_source_schema(&req.type_name).await {
            Ok(schema) => &schema.block,
            Err(diag) => return Ok(failed(vec![diag])),
        };
        let data_source = match self.data_source(&ctx, &req.type_name).await {
            Ok(data_source) => data_source,
            Err(diags) => return Ok(failed(diags)),
        };

        debug!(type_name = %req.type_name, "reading data source");
        let response = data_source
            .read(
                ctx,
                ReadDataSourceRequest {
                    type_name: req.type_name.clone(),
                    config,
                    provider_meta: optional_dynamic_value(&req.provider_meta)?,
                    client_capabilities: client_capabilities_from_proto(
                        req.client_capabilities.as_ref(),
                    ),
                },
            )
            .await;

        if has_errors(&response.diagnostics) {
            return Ok(failed(response.diagnostics));
        }

        let state = DynamicValue::new(block.conform(resolve_unknowns(response.state.value)));
        Ok(Response::new(proto::read_data_source::Response {
            state: Some(encode_dynamic_value(&state)?),
            diagnostics: diagnostics_to_proto(&response.diagnostics),
        }))
    }

    async fn stop_provider(
        &self,
        _request: Request<proto::stop_provider::Request>,
    ) -> Result<Response<proto::stop_provider::Response>, Status> {
        debug!("stop requested, cancelling in-flight operations");
        self.root.cancel();

        let response = {
            let provider = self.provider.read().await;
            provider.stop(Context::new(), StopProviderRequest).await
        };

        Ok(Response::new(proto::stop_provider::Response {
            error: response.error.unwrap_or_default(),
        }))
    }
}

/// Result of planning a single resource change
pub struct PlanOutcome {
    pub planned_state: DynamicValue,
    pub requires_replace: Vec<AttributePath>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Computes the planned state from Terraform's proposal.
///
/// - destroy (proposed null) plans null
/// - defaults fill attributes left null in config
/// - computed attributes left null in config are unknown on create and keep
///   their prior value on update
/// - plan modifiers then run in declaration order
pub fn plan_change(
    block: &Block,
    prior_state: &DynamicValue,
    proposed: &DynamicValue,
    config: &DynamicValue,
) -> PlanOutcome {
    let mut outcome = PlanOutcome {
        planned_state: DynamicValue::null(),
        requires_replace: vec![],
        diagnostics: vec![],
    };
    if proposed.is_null() {
        return outcome;
    }

    let creating = prior_state.is_null();
    let mut planned = proposed.clone();

    for attr in &block.attributes {
        let path = AttributePath::new(&attr.name);
        if !config.get(&path).is_null() {
            continue;
        }

        let value = if let Some(default) = &attr.default {
            default
                .default_value(DefaultRequest { path: path.clone() })
                .value
                .value
        } else if attr.computed {
            if creating {
                Dynamic::Unknown
            } else {
                prior_state.get(&path)
            }
        } else {
            continue;
        };
        set_planned(&mut planned, &path, value, &mut outcome.diagnostics);
    }

    for attr in &block.attributes {
        run_plan_modifiers(attr, prior_state, config, &mut planned, &mut outcome);
    }

    outcome.planned_state = DynamicValue::new(block.conform(planned.value));
    outcome
}

fn run_plan_modifiers(
    attr: &Attribute,
    prior_state: &DynamicValue,
    config: &DynamicValue,
    planned: &mut DynamicValue,
    outcome: &mut PlanOutcome,
) {
    if attr.plan_modifiers.is_empty() {
        return;
    }
    let path = AttributePath::new(&attr.name);
    let state_value = DynamicValue::new(prior_state.get(&path));
    let config_value = DynamicValue::new(config.get(&path));
    let mut plan_value = DynamicValue::new(planned.get(&path));
    let plan = planned.clone();

    for modifier in &attr.plan_modifiers {
        let response = modifier.modify(PlanModifierRequest {
            config_value: config_value.clone(),
            state_value: state_value.clone(),
            plan_value,
            plan: plan.clone(),
            path: path.clone(),
        });
        plan_value = response.plan_value;
        outcome.diagnostics.extend(response.diagnostics);
        if response.requires_replace && !outcome.requires_replace.contains(&path) {
            outcome.requires_replace.push(path.clone());
        }
    }

    set_planned(planned, &path, plan_value.value, &mut outcome.diagnostics);
}

fn set_planned(
    planned: &mut DynamicValue,
    path: &AttributePath,
    value: Dynamic,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if let Dynamic::Map(map) = &mut planned.value {
        if let Some(AttributePathStep::AttributeName(name)) = path.steps.first() {
            map.insert(name.clone(), value);
            return;
        }
    }
    diagnostics.push(
        Diagnostic::error(
            "Unable to plan attribute",
            format!("planned value for {} is not an object", path),
        )
        .with_attribute(path.clone()),
    );
}

/// Checks a configuration object against a block: unknown arguments,
/// missing required arguments, read-only arguments, type mismatches and
/// attribute validators. Unknown values pass every check.
pub fn validate_block(block: &Block, config: &Dynamic, path: &AttributePath) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let entries = match config {
        Dynamic::Map(entries) => entries,
        Dynamic::Null | Dynamic::Unknown => return diagnostics,
        other => {
            diagnostics.push(
                Diagnostic::error(
                    "Invalid configuration",
                    format!("expected an object, got {}", other.type_name()),
                )
                .with_attribute(path.clone()),
            );
            return diagnostics;
        }
    };

    for name in entries.keys() {
        if block.attribute(name).is_none() && block.nested_block(name).is_none() {
            diagnostics.push(
                Diagnostic::error(
                    "Unsupported argument",
                    format!("An argument named \"{}\" is not expected here.", name),
                )
                .with_attribute(path.clone().attribute(name)),
            );
        }
    }

    for attr in &block.attributes {
        let attr_path = path.clone().attribute(&attr.name);
        let value = entries.get(&attr.name).unwrap_or(&Dynamic::Null);

        if value.is_null() {
            if attr.required {
                diagnostics.push(
                    Diagnostic::error(
                        "Missing required argument",
                        format!(
                            "The argument \"{}\" is required, but no definition was found.",
                            attr.name
                        ),
                    )
                    .with_attribute(attr_path),
                );
            }
            continue;
        }

        if attr.computed && !attr.optional && !attr.required {
            diagnostics.push(
                Diagnostic::error(
                    "Invalid configuration",
                    format!("\"{}\" is read-only and cannot be set", attr.name),
                )
                .with_attribute(attr_path),
            );
            continue;
        }

        if !attr.r#type.accepts(value) {
            diagnostics.push(
                Diagnostic::error(
                    format!("Incorrect attribute value type for {}", attr.name),
                    format!(
                        "expected {}, got {}",
                        attr.r#type.to_json(),
                        value.type_name()
                    ),
                )
                .with_attribute(attr_path),
            );
            continue;
        }

        if value.is_unknown() {
            continue;
        }
        for validator in &attr.validators {
            let response = validator.validate(ValidatorRequest {
                config_value: DynamicValue::new(value.clone()),
                path: attr_path.clone(),
            });
            diagnostics.extend(response.diagnostics);
        }
    }

    for nested in &block.block_types {
        let nested_path = path.clone().attribute(&nested.type_name);
        match (nested.nesting, entries.get(&nested.type_name)) {
            (NestingMode::List | NestingMode::Set, Some(Dynamic::List(items))) => {
                if nested.min_items > 0 && (items.len() as i64) < nested.min_items {
                    diagnostics.push(
                        Diagnostic::error(
                            "Insufficient blocks",
                            format!(
                                "At least {} \"{}\" blocks are required.",
                                nested.min_items, nested.type_name
                            ),
                        )
                        .with_attribute(nested_path.clone()),
                    );
                }
                for (idx, item) in items.iter().enumerate() {
                    diagnostics.extend(validate_block(
                        &nested.block,
                        item,
                        &nested_path.clone().index(idx as i64),
                    ));
                }
            }
            (_, Some(value)) => {
                diagnostics.extend(validate_block(&nested.block, value, &nested_path))
            }
            (_, None) => {}
        }
    }

    diagnostics
}

/// Applied and refreshed state must be wholly known
fn resolve_unknowns(value: Dynamic) -> Dynamic {
    match value {
        Dynamic::Unknown => Dynamic::Null,
        Dynamic::List(items) => Dynamic::List(items.into_iter().map(resolve_unknowns).collect()),
        Dynamic::Map(entries) => Dynamic::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k, resolve_unknowns(v)))
                .collect(),
        ),
        other => other,
    }
}

fn read_failed(
    current_state: Option<proto::DynamicValue>,
    private: Vec<u8>,
    diagnostics: Vec<Diagnostic>,
) -> Response<proto::read_resource::Response> {
    Response::new(proto::read_resource::Response {
        new_state: current_state,
        diagnostics: diagnostics_to_proto(&diagnostics),
        private,
    })
}

fn unknown_type(kind: &str, type_name: &str) -> Diagnostic {
    Diagnostic::error(
        format!("Unknown {} type", kind),
        format!("{} is not served by this provider", type_name),
    )
}

pub fn decode_dynamic_value(
    value: &Option<proto::DynamicValue>,
) -> Result<DynamicValue, Status> {
    match value {
        None => Ok(DynamicValue::null()),
        Some(v) if !v.msgpack.is_empty() => Ok(DynamicValue::decode_msgpack(&v.msgpack)?),
        Some(v) if !v.json.is_empty() => Ok(DynamicValue::decode_json(&v.json)?),
        Some(_) => Ok(DynamicValue::null()),
    }
}

fn optional_dynamic_value(
    value: &Option<proto::DynamicValue>,
) -> Result<Option<DynamicValue>, Status> {
    match value {
        None => Ok(None),
        Some(_) => decode_dynamic_value(value).map(Some),
    }
}

pub fn encode_dynamic_value(value: &DynamicValue) -> Result<proto::DynamicValue, Status> {
    Ok(proto::DynamicValue {
        msgpack: value.encode_msgpack()?,
        json: vec![],
    })
}

fn client_capabilities_from_proto(
    capabilities: Option<&proto::ClientCapabilities>,
) -> ClientCapabilities {
    capabilities
        .map(|c| ClientCapabilities {
            deferral_allowed: c.deferral_allowed,
            write_only_attributes_allowed: c.write_only_attributes_allowed,
        })
        .unwrap_or_default()
}

fn server_capabilities_to_proto(
    capabilities: &crate::types::ServerCapabilities,
) -> proto::ServerCapabilities {
    proto::ServerCapabilities {
        plan_destroy: capabilities.plan_destroy,
        get_provider_schema_optional: capabilities.get_provider_schema_optional,
        move_resource_state: capabilities.move_resource_state,
    }
}

fn string_kind_to_proto(kind: StringKind) -> i32 {
    match kind {
        StringKind::Plain => proto::StringKind::Plain as i32,
        StringKind::Markdown => proto::StringKind::Markdown as i32,
    }
}

pub fn schema_to_proto(schema: &Schema) -> proto::Schema {
    proto::Schema {
        version: schema.version,
        block: Some(block_to_proto(&schema.block)),
    }
}

fn block_to_proto(block: &Block) -> proto::schema::Block {
    proto::schema::Block {
        version: block.version,
        attributes: block
            .attributes
            .iter()
            .map(|attr| proto::schema::Attribute {
                name: attr.name.clone(),
                r#type: attr.r#type.to_bytes(),
                description: attr.description.clone(),
                required: attr.required,
                optional: attr.optional,
                computed: attr.computed,
                sensitive: attr.sensitive,
                description_kind: proto::StringKind::Plain as i32,
                deprecated: attr.deprecated,
            })
            .collect(),
        block_types: block
            .block_types
            .iter()
            .map(|nested| proto::schema::NestedBlock {
                type_name: nested.type_name.clone(),
                block: Some(block_to_proto(&nested.block)),
                nesting: match nested.nesting {
                    NestingMode::Invalid => proto::schema::nested_block::NestingMode::Invalid,
                    NestingMode::Single => proto::schema::nested_block::NestingMode::Single,
                    NestingMode::List => proto::schema::nested_block::NestingMode::List,
                    NestingMode::Set => proto::schema::nested_block::NestingMode::Set,
                    NestingMode::Map => proto::schema::nested_block::NestingMode::Map,
                    NestingMode::Group => proto::schema::nested_block::NestingMode::Group,
                } as i32,
                min_items: nested.min_items,
                max_items: nested.max_items,
            })
            .collect(),
        description: block.description.clone(),
        description_kind: string_kind_to_proto(block.description_kind),
        deprecated: block.deprecated,
    }
}

pub fn attribute_path_to_proto(path: &AttributePath) -> proto::AttributePath {
    use proto::attribute_path::step::Selector;

    proto::AttributePath {
        steps: path
            .steps
            .iter()
            .map(|step| proto::attribute_path::Step {
                selector: Some(match step {
                    AttributePathStep::AttributeName(name) => Selector::AttributeName(name.clone()),
                    AttributePathStep::ElementKeyString(key) => {
                        Selector::ElementKeyString(key.clone())
                    }
                    AttributePathStep::ElementKeyInt(idx) => Selector::ElementKeyInt(*idx),
                }),
            })
            .collect(),
    }
}

pub fn diagnostics_to_proto(diagnostics: &[Diagnostic]) -> Vec<proto::Diagnostic> {
    diagnostics
        .iter()
        .map(|diag| proto::Diagnostic {
            severity: match diag.severity {
                DiagnosticSeverity::Invalid => proto::diagnostic::Severity::Invalid,
                DiagnosticSeverity::Error => proto::diagnostic::Severity::Error,
                DiagnosticSeverity::Warning => proto::diagnostic::Severity::Warning,
            } as i32,
            summary: diag.summary.clone(),
            detail: diag.detail.clone(),
            attribute: diag.attribute.as_ref().map(attribute_path_to_proto),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::StaticDefault;
    use crate::schema::{list_block, AttributeBuilder, AttributeType, SchemaBuilder};
    use crate::validator::OneOfValidator;

    fn block() -> Block {
        SchemaBuilder::new()
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .required()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("kind", AttributeType::String)
                    .default(StaticDefault::string("cloud"))
                    .validator(OneOfValidator::create(&["cloud", "net"]))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("inventory_id", AttributeType::Number)
                    .optional()
                    .requires_replace()
                    .build(),
            )
            .block(list_block(
                "team_org_map",
                "",
                vec![AttributeBuilder::new("team", AttributeType::String)
                    .required()
                    .build()],
            ))
            .build()
            .block
    }

    fn object(pairs: &[(&str, Dynamic)]) -> DynamicValue {
        DynamicValue::new(Dynamic::Map(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        ))
    }

    #[test]
    fn plan_create_marks_computed_unknown_and_applies_defaults() {
        let config = object(&[("name", "a".into())]);
        let outcome = plan_change(&block(), &DynamicValue::null(), &config, &config);

        let planned = &outcome.planned_state;
        assert!(planned.get(&AttributePath::new("id")).is_unknown());
        assert_eq!(planned.get(&AttributePath::new("kind")), Dynamic::from("cloud"));
        assert_eq!(planned.get(&AttributePath::new("inventory_id")), Dynamic::Null);
        assert!(outcome.requires_replace.is_empty());
    }

    #[test]
    fn plan_update_keeps_prior_computed_values() {
        let prior = object(&[
            ("id", "7".into()),
            ("name", "a".into()),
            ("kind", "net".into()),
            ("inventory_id", Dynamic::Number(1.0)),
        ]);
        let config = object(&[
            ("name", "b".into()),
            ("kind", "net".into()),
            ("inventory_id", Dynamic::Number(1.0)),
        ]);
        let outcome = plan_change(&block(), &prior, &config, &config);

        assert_eq!(
            outcome.planned_state.get(&AttributePath::new("id")),
            Dynamic::from("7")
        );
        assert!(outcome.requires_replace.is_empty());
    }

    #[test]
    fn plan_update_reports_requires_replace() {
        let prior = object(&[
            ("id", "7".into()),
            ("name", "a".into()),
            ("inventory_id", Dynamic::Number(1.0)),
        ]);
        let config = object(&[("name", "a".into()), ("inventory_id", Dynamic::Number(2.0))]);
        let outcome = plan_change(&block(), &prior, &config, &config);

        assert_eq!(
            outcome.requires_replace,
            vec![AttributePath::new("inventory_id")]
        );
    }

    #[test]
    fn plan_destroy_is_null() {
        let prior = object(&[("id", "7".into()), ("name", "a".into())]);
        let outcome = plan_change(
            &block(),
            &prior,
            &DynamicValue::null(),
            &DynamicValue::null(),
        );
        assert!(outcome.planned_state.is_null());
    }

    #[test]
    fn validation_reports_missing_unknown_and_invalid() {
        let config = object(&[
            ("kind", "ssh".into()),
            ("bogus", "x".into()),
            ("id", "1".into()),
        ]);
        let diags = validate_block(&block(), &config.value, &AttributePath::root());
        let summaries: Vec<_> = diags.iter().map(|d| d.summary.as_str()).collect();

        assert!(summaries.contains(&"Unsupported argument"));
        assert!(summaries.contains(&"Missing required argument"));
        assert!(summaries.contains(&"Invalid value for kind"));
        assert!(summaries.contains(&"Invalid configuration"));
    }

    #[test]
    fn validation_skips_unknown_values_and_checks_nested_blocks() {
        let config = object(&[
            ("name", Dynamic::Unknown),
            ("kind", Dynamic::Unknown),
            (
                "team_org_map",
                Dynamic::List(vec![object(&[("team", Dynamic::Null)]).value]),
            ),
        ]);
        let diags = validate_block(&block(), &config.value, &AttributePath::root());

        assert_eq!(diags.len(), 1);
        assert_eq!(
            diags[0].attribute.as_ref().map(|p| p.to_string()),
            Some("team_org_map[0].team".to_string())
        );
    }

    #[test]
    fn type_mismatch_is_reported() {
        let config = object(&[("name", Dynamic::Bool(true))]);
        let diags = validate_block(&block(), &config.value, &AttributePath::root());
        assert_eq!(diags.len(), 1);
        assert!(diags[0].summary.starts_with("Incorrect attribute value type"));
    }

    #[test]
    fn resolve_unknowns_clears_nested_values() {
        let value = object(&[("id", Dynamic::Unknown), ("l", Dynamic::List(vec![Dynamic::Unknown]))]);
        assert!(!resolve_unknowns(value.value).contains_unknown());
    }
}
