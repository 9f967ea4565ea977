//! Drives the gRPC service end to end with an in-memory provider

use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tfplug::data_source::{
    ConfigureDataSourceRequest, ConfigureDataSourceResponse, DataSourceSchemaRequest,
    DataSourceSchemaResponse, ReadDataSourceRequest, ReadDataSourceResponse,
};
use tfplug::defaults::StaticDefault;
use tfplug::proto;
use tfplug::proto::ProviderService as _;
use tfplug::provider::{
    ConfigureProviderRequest, ConfigureProviderResponse, DataSourceFactory,
    ProviderSchemaRequest, ProviderSchemaResponse, ResourceFactory,
};
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, ReadResourceRequest,
    ReadResourceResponse, ResourceSchemaRequest, ResourceSchemaResponse, UpdateResourceRequest,
    UpdateResourceResponse,
};
use tfplug::types::has_errors;
use tfplug::*;
use tonic::Request;

type Store = Arc<Mutex<HashMap<String, String>>>;

struct MemoryProvider {
    store: Store,
}

#[async_trait]
impl Provider for MemoryProvider {
    fn type_name(&self) -> &str {
        "mem"
    }

    async fn schema(&self, _ctx: Context, _request: ProviderSchemaRequest) -> ProviderSchemaResponse {
        ProviderSchemaResponse {
            schema: SchemaBuilder::new()
                .attribute(
                    AttributeBuilder::new("prefix", AttributeType::String)
                        .optional()
                        .build(),
                )
                .build(),
            diagnostics: vec![],
        }
    }

    async fn configure(
        &mut self,
        _ctx: Context,
        _request: ConfigureProviderRequest,
    ) -> ConfigureProviderResponse {
        ConfigureProviderResponse {
            diagnostics: vec![],
            provider_data: Some(self.store.clone() as Arc<dyn Any + Send + Sync>),
        }
    }

    fn resources(&self) -> HashMap<String, ResourceFactory> {
        let mut resources: HashMap<String, ResourceFactory> = HashMap::new();
        resources.insert(
            "mem_item".to_string(),
            Box::new(|| Box::new(ItemResource { store: None })),
        );
        resources
    }

    fn data_sources(&self) -> HashMap<String, DataSourceFactory> {
        let mut data_sources: HashMap<String, DataSourceFactory> = HashMap::new();
        data_sources.insert(
            "mem_item".to_string(),
            Box::new(|| Box::new(ItemDataSource { store: None })),
        );
        data_sources
    }
}

struct ItemResource {
    store: Option<Store>,
}

fn item_schema() -> Schema {
    SchemaBuilder::new()
        .attribute(
            AttributeBuilder::new("id", AttributeType::String)
                .computed()
                .build(),
        )
        .attribute(
            AttributeBuilder::new("name", AttributeType::String)
                .required()
                .requires_replace()
                .build(),
        )
        .attribute(
            AttributeBuilder::new("value", AttributeType::String)
                .default(StaticDefault::string("empty"))
                .build(),
        )
        .build()
}

fn store_of(provider_data: Option<Arc<dyn Any + Send + Sync>>) -> Option<Store> {
    provider_data.and_then(|data| data.downcast_ref::<Store>().cloned())
}

impl ItemResource {
    fn store(&self) -> std::result::Result<&Store, Vec<Diagnostic>> {
        self.store
            .as_ref()
            .ok_or_else(|| vec![Diagnostic::error("Provider not configured", "")])
    }
}

#[async_trait]
impl Resource for ItemResource {
    fn type_name(&self) -> &str {
        "mem_item"
    }

    async fn schema(&self, _ctx: Context, _request: ResourceSchemaRequest) -> ResourceSchemaResponse {
        ResourceSchemaResponse {
            schema: item_schema(),
            diagnostics: vec![],
        }
    }

    async fn create(&self, _ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        let store = match self.store() {
            Ok(store) => store,
            Err(diagnostics) => {
                return CreateResourceResponse {
                    new_state: request.planned_state,
                    private: vec![],
                    diagnostics,
                }
            }
        };
        let mut state = request.planned_state;
        let name = state.get_string(&AttributePath::new("name")).unwrap();
        let value = state.get_string(&AttributePath::new("value")).unwrap();
        store.lock().unwrap().insert(name.clone(), value);
        state.set_string(&AttributePath::new("id"), name).unwrap();
        CreateResourceResponse {
            new_state: state,
            private: vec![],
            diagnostics: vec![],
        }
    }

    async fn read(&self, _ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
        let id = request
            .current_state
            .get_string(&AttributePath::new("id"))
            .unwrap_or_default();
        let found = self
            .store
            .as_ref()
            .and_then(|store| store.lock().unwrap().get(&id).cloned());
        ReadResourceResponse {
            new_state: found.map(|value| {
                let mut state = DynamicValue::object();
                state.set_string(&AttributePath::new("id"), id.clone()).unwrap();
                state.set_string(&AttributePath::new("name"), id.clone()).unwrap();
                state.set_string(&AttributePath::new("value"), value).unwrap();
                state
            }),
            diagnostics: vec![],
            private: request.private,
        }
    }

    async fn update(&self, _ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        UpdateResourceResponse {
            new_state: request.planned_state,
            private: vec![],
            diagnostics: vec![],
        }
    }

    async fn delete(&self, _ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse {
        if let Some(store) = &self.store {
            let id = request
                .prior_state
                .get_string(&AttributePath::new("id"))
                .unwrap_or_default();
            store.lock().unwrap().remove(&id);
        }
        DeleteResourceResponse {
            diagnostics: vec![],
        }
    }

    fn as_import_state(&self) -> Option<&dyn ResourceWithImportState> {
        Some(self)
    }
}

#[async_trait]
impl ResourceWithConfigure for ItemResource {
    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureResourceRequest,
    ) -> ConfigureResourceResponse {
        self.store = store_of(request.provider_data);
        ConfigureResourceResponse {
            diagnostics: vec![],
        }
    }
}

#[async_trait]
impl ResourceWithImportState for ItemResource {
    async fn import_state(
        &self,
        ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        let mut response = ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
        };
        import_state_passthrough_id(&ctx, AttributePath::new("id"), &request, &mut response);
        response
    }
}

struct ItemDataSource {
    store: Option<Store>,
}

#[async_trait]
impl DataSource for ItemDataSource {
    fn type_name(&self) -> &str {
        "mem_item"
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: DataSourceSchemaRequest,
    ) -> DataSourceSchemaResponse {
        DataSourceSchemaResponse {
            schema: SchemaBuilder::new()
                .attribute(
                    AttributeBuilder::new("name", AttributeType::String)
                        .required()
                        .build(),
                )
                .attribute(
                    AttributeBuilder::new("value", AttributeType::String)
                        .computed()
                        .build(),
                )
                .build(),
            diagnostics: vec![],
        }
    }

    async fn read(&self, _ctx: Context, request: ReadDataSourceRequest) -> ReadDataSourceResponse {
        let mut state = request.config;
        let name = state.get_string(&AttributePath::new("name")).unwrap();
        let value = self
            .store
            .as_ref()
            .and_then(|store| store.lock().unwrap().get(&name).cloned());
        match value {
            Some(value) => {
                state.set_string(&AttributePath::new("value"), value).unwrap();
                ReadDataSourceResponse {
                    state,
                    diagnostics: vec![],
                }
            }
            None => ReadDataSourceResponse {
                state,
                diagnostics: vec![Diagnostic::error("Item not found", name)],
            },
        }
    }
}

#[async_trait]
impl DataSourceWithConfigure for ItemDataSource {
    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureDataSourceRequest,
    ) -> ConfigureDataSourceResponse {
        self.store = store_of(request.provider_data);
        ConfigureDataSourceResponse {
            diagnostics: vec![],
        }
    }
}

fn service() -> (ProviderService<MemoryProvider>, Store) {
    let store: Store = Arc::new(Mutex::new(HashMap::new()));
    (
        ProviderService::new(MemoryProvider {
            store: store.clone(),
        }),
        store,
    )
}

fn object(pairs: &[(&str, Dynamic)]) -> DynamicValue {
    DynamicValue::new(Dynamic::Map(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
    ))
}

fn wire(value: &DynamicValue) -> Option<proto::DynamicValue> {
    Some(proto::DynamicValue {
        msgpack: value.encode_msgpack().unwrap(),
        json: vec![],
    })
}

fn unwire(value: Option<proto::DynamicValue>) -> DynamicValue {
    DynamicValue::decode_msgpack(&value.unwrap().msgpack).unwrap()
}

async fn configure(svc: &ProviderService<MemoryProvider>) {
    let response = svc
        .configure_provider(Request::new(proto::configure_provider::Request {
            terraform_version: "1.9.0".to_string(),
            config: wire(&object(&[("prefix", Dynamic::Null)])),
            client_capabilities: None,
        }))
        .await
        .unwrap()
        .into_inner();
    assert!(response.diagnostics.is_empty());
}

#[tokio::test]
async fn schema_lists_every_type() {
    let (svc, _) = service();
    let response = svc
        .get_provider_schema(Request::new(proto::get_provider_schema::Request {}))
        .await
        .unwrap()
        .into_inner();

    assert!(response.provider.is_some());
    let item = &response.resource_schemas["mem_item"];
    let attrs = &item.block.as_ref().unwrap().attributes;
    let value = attrs.iter().find(|a| a.name == "value").unwrap();
    assert!(value.optional && value.computed);
    assert!(response.data_source_schemas.contains_key("mem_item"));

    let metadata = svc
        .get_metadata(Request::new(proto::get_metadata::Request {}))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(metadata.resources[0].type_name, "mem_item");
    assert_eq!(metadata.data_sources[0].type_name, "mem_item");
}

#[tokio::test(flavor = "multi_thread")]
async fn create_read_delete_lifecycle() {
    let (svc, store) = service();
    configure(&svc).await;

    let config = object(&[
        ("id", Dynamic::Null),
        ("name", "alpha".into()),
        ("value", Dynamic::Null),
    ]);
    let plan = svc
        .plan_resource_change(Request::new(proto::plan_resource_change::Request {
            type_name: "mem_item".to_string(),
            prior_state: wire(&DynamicValue::null()),
            proposed_new_state: wire(&config),
            config: wire(&config),
            ..Default::default()
        }))
        .await
        .unwrap()
        .into_inner();
    assert!(plan.diagnostics.is_empty());
    let planned = unwire(plan.planned_state.clone());
    assert!(planned.get(&AttributePath::new("id")).is_unknown());
    assert_eq!(planned.get(&AttributePath::new("value")), Dynamic::from("empty"));

    let applied = svc
        .apply_resource_change(Request::new(proto::apply_resource_change::Request {
            type_name: "mem_item".to_string(),
            prior_state: wire(&DynamicValue::null()),
            planned_state: plan.planned_state,
            config: wire(&config),
            ..Default::default()
        }))
        .await
        .unwrap()
        .into_inner();
    assert!(applied.diagnostics.is_empty());
    let state = unwire(applied.new_state.clone());
    assert_eq!(state.get(&AttributePath::new("id")), Dynamic::from("alpha"));
    assert_eq!(store.lock().unwrap().get("alpha").unwrap(), "empty");

    let read = svc
        .read_resource(Request::new(proto::read_resource::Request {
            type_name: "mem_item".to_string(),
            current_state: applied.new_state.clone(),
            ..Default::default()
        }))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(unwire(read.new_state), state);

    let deleted = svc
        .apply_resource_change(Request::new(proto::apply_resource_change::Request {
            type_name: "mem_item".to_string(),
            prior_state: applied.new_state.clone(),
            planned_state: wire(&DynamicValue::null()),
            config: wire(&DynamicValue::null()),
            ..Default::default()
        }))
        .await
        .unwrap()
        .into_inner();
    assert!(unwire(deleted.new_state).is_null());
    assert!(store.lock().unwrap().is_empty());

    // gone remotely: read drops it from state
    let read = svc
        .read_resource(Request::new(proto::read_resource::Request {
            type_name: "mem_item".to_string(),
            current_state: applied.new_state,
            ..Default::default()
        }))
        .await
        .unwrap()
        .into_inner();
    assert!(unwire(read.new_state).is_null());
}

#[tokio::test]
async fn renaming_requires_replacement() {
    let (svc, _) = service();
    let prior = object(&[
        ("id", "alpha".into()),
        ("name", "alpha".into()),
        ("value", "empty".into()),
    ]);
    let config = object(&[
        ("id", Dynamic::Null),
        ("name", "beta".into()),
        ("value", Dynamic::Null),
    ]);
    let proposed = object(&[
        ("id", "alpha".into()),
        ("name", "beta".into()),
        ("value", "empty".into()),
    ]);

    let plan = svc
        .plan_resource_change(Request::new(proto::plan_resource_change::Request {
            type_name: "mem_item".to_string(),
            prior_state: wire(&prior),
            proposed_new_state: wire(&proposed),
            config: wire(&config),
            ..Default::default()
        }))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(plan.requires_replace.len(), 1);
    let planned = unwire(plan.planned_state);
    assert_eq!(planned.get(&AttributePath::new("id")), Dynamic::from("alpha"));
}

#[tokio::test]
async fn validation_catches_missing_and_unknown_arguments() {
    let (svc, _) = service();
    let config = object(&[("colour", "red".into())]);
    let response = svc
        .validate_resource_config(Request::new(proto::validate_resource_config::Request {
            type_name: "mem_item".to_string(),
            config: wire(&config),
            client_capabilities: None,
        }))
        .await
        .unwrap()
        .into_inner();

    let summaries: Vec<_> = response.diagnostics.iter().map(|d| d.summary.as_str()).collect();
    assert!(summaries.contains(&"Unsupported argument"));
    assert!(summaries.contains(&"Missing required argument"));

    let unknown_type = svc
        .validate_resource_config(Request::new(proto::validate_resource_config::Request {
            type_name: "mem_nothing".to_string(),
            config: wire(&config),
            client_capabilities: None,
        }))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(unknown_type.diagnostics.len(), 1);
}

#[tokio::test]
async fn upgrade_drops_attributes_no_longer_in_schema() {
    let (svc, _) = service();
    let response = svc
        .upgrade_resource_state(Request::new(proto::upgrade_resource_state::Request {
            type_name: "mem_item".to_string(),
            version: 0,
            raw_state: Some(proto::RawState {
                json: br#"{"id":"alpha","name":"alpha","legacy":true}"#.to_vec(),
                flatmap: HashMap::new(),
            }),
        }))
        .await
        .unwrap()
        .into_inner();

    assert!(response.diagnostics.is_empty());
    let state = unwire(response.upgraded_state);
    let map = state.value.as_map().unwrap();
    assert!(!map.contains_key("legacy"));
    assert_eq!(map["value"], Dynamic::Null);
}

#[tokio::test]
async fn import_sets_the_id() {
    let (svc, _) = service();
    configure(&svc).await;

    let response = svc
        .import_resource_state(Request::new(proto::import_resource_state::Request {
            type_name: "mem_item".to_string(),
            id: "alpha".to_string(),
            client_capabilities: None,
        }))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(response.imported_resources.len(), 1);
    let state = unwire(response.imported_resources[0].state.clone());
    assert_eq!(state.get(&AttributePath::new("id")), Dynamic::from("alpha"));
    assert_eq!(state.get(&AttributePath::new("name")), Dynamic::Null);
}

async fn read_item(
    svc: &ProviderService<MemoryProvider>,
    name: &str,
) -> tonic::Response<proto::read_data_source::Response> {
    svc.read_data_source(Request::new(proto::read_data_source::Request {
        type_name: "mem_item".to_string(),
        config: wire(&object(&[("name", name.into()), ("value", Dynamic::Null)])),
        ..Default::default()
    }))
    .await
    .unwrap()
}

#[tokio::test]
async fn data_source_reads_and_reports_errors() {
    let (svc, store) = service();
    configure(&svc).await;
    store
        .lock()
        .unwrap()
        .insert("alpha".to_string(), "one".to_string());

    let found = read_item(&svc, "alpha").await.into_inner();
    assert_eq!(
        unwire(found.state).get(&AttributePath::new("value")),
        Dynamic::from("one")
    );

    let missing = read_item(&svc, "beta").await.into_inner();
    assert!(missing.state.is_none());
    assert_eq!(missing.diagnostics[0].summary, "Item not found");
}

#[tokio::test]
async fn stop_cancels_the_root_context() {
    let (svc, _) = service();
    let ctx = svc.context().child();
    assert!(!ctx.is_cancelled());

    let response = svc
        .stop_provider(Request::new(proto::stop_provider::Request {}))
        .await
        .unwrap()
        .into_inner();

    assert!(response.error.is_empty());
    ctx.cancelled().await;
    assert!(ctx.is_cancelled());
}

#[tokio::test]
async fn apply_without_configure_reports_error() {
    let (svc, _) = service();
    let planned = object(&[
        ("id", Dynamic::Unknown),
        ("name", "alpha".into()),
        ("value", "empty".into()),
    ]);

    let response = svc
        .apply_resource_change(Request::new(proto::apply_resource_change::Request {
            type_name: "mem_item".to_string(),
            prior_state: wire(&DynamicValue::null()),
            planned_state: wire(&planned),
            config: wire(&planned),
            ..Default::default()
        }))
        .await
        .unwrap()
        .into_inner();

    let diagnostics: Vec<Diagnostic> = response
        .diagnostics
        .iter()
        .map(|d| Diagnostic::error(d.summary.clone(), d.detail.clone()))
        .collect();
    assert!(has_errors(&diagnostics));
    // unknowns never leak into applied state
    let state = unwire(response.new_state);
    assert_eq!(state.get(&AttributePath::new("id")), Dynamic::Null);
}
