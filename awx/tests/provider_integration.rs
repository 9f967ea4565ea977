//! Drives the provider the way the plugin server does: configure, then
//! build resources and data sources from the factories

use awx::AwxProvider;
use mockito::{Matcher, Server};
use serde_json::json;
use std::collections::HashMap;
use tfplug::context::Context;
use tfplug::data_source::{ConfigureDataSourceRequest, ReadDataSourceRequest};
use tfplug::provider::{ConfigureProviderRequest, Provider};
use tfplug::resource::{
    ConfigureResourceRequest, CreateResourceRequest, DeleteResourceRequest, ReadResourceRequest,
};
use tfplug::types::{AttributePath, ClientCapabilities, Dynamic, DynamicValue};
use tfplug::{DataSource, DataSourceWithConfigure, Resource, ResourceWithConfigure};

fn object(entries: &[(&str, Dynamic)]) -> DynamicValue {
    DynamicValue::new(Dynamic::Map(
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect::<HashMap<_, _>>(),
    ))
}

fn configure_request(url: &str) -> ConfigureProviderRequest {
    ConfigureProviderRequest {
        terraform_version: "1.9.0".into(),
        config: object(&[
            ("hostname", Dynamic::String(url.to_string())),
            ("token", Dynamic::from("integration-token")),
        ]),
        client_capabilities: ClientCapabilities::default(),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn organization_lifecycle_through_the_factories() {
    let mut server = Server::new_async().await;
    let _me = server
        .mock("GET", "/api/v2/me/")
        .match_header("authorization", "Bearer integration-token")
        .with_body(r#"{"count":1,"results":[{"id":1,"username":"admin"}]}"#)
        .create_async()
        .await;
    let create = server
        .mock("POST", "/api/v2/organizations/")
        .match_body(Matcher::PartialJson(json!({"name": "Engineering"})))
        .with_status(201)
        .with_body(r#"{"id":12,"name":"Engineering","description":"","max_hosts":0,"custom_virtualenv":null,"default_environment":null}"#)
        .create_async()
        .await;
    let read = server
        .mock("GET", "/api/v2/organizations/12/")
        .with_body(r#"{"id":12,"name":"Engineering","description":"Platform","max_hosts":0,"custom_virtualenv":null,"default_environment":null}"#)
        .create_async()
        .await;
    let delete = server
        .mock("DELETE", "/api/v2/organizations/12/")
        .with_status(204)
        .create_async()
        .await;

    let mut provider = AwxProvider::new();
    let configured = provider
        .configure(Context::new(), configure_request(&server.url()))
        .await;
    assert!(configured.diagnostics.is_empty(), "{:?}", configured.diagnostics);

    let factories = provider.resources();
    let mut resource = factories["awx_organization"]();
    resource
        .configure(
            Context::new(),
            ConfigureResourceRequest {
                provider_data: configured.provider_data.clone(),
            },
        )
        .await;

    let planned = object(&[
        ("id", Dynamic::Unknown),
        ("name", Dynamic::from("Engineering")),
        ("description", Dynamic::from("")),
        ("max_hosts", Dynamic::Number(0.0)),
        ("custom_virtualenv", Dynamic::Unknown),
        ("default_environment", Dynamic::Unknown),
    ]);
    let created = resource
        .create(
            Context::new(),
            CreateResourceRequest {
                type_name: "awx_organization".into(),
                planned_state: planned.clone(),
                config: planned,
                planned_private: vec![],
                provider_meta: None,
            },
        )
        .await;
    assert!(created.diagnostics.is_empty(), "{:?}", created.diagnostics);
    assert_eq!(
        created.new_state.get_string(&AttributePath::new("id")).unwrap(),
        "12"
    );

    let refreshed = resource
        .read(
            Context::new(),
            ReadResourceRequest {
                type_name: "awx_organization".into(),
                current_state: created.new_state.clone(),
                private: vec![],
                provider_meta: None,
                client_capabilities: ClientCapabilities::default(),
            },
        )
        .await;
    let state = refreshed.new_state.unwrap();
    assert_eq!(
        state.get_string(&AttributePath::new("description")).unwrap(),
        "Platform"
    );

    let deleted = resource
        .delete(
            Context::new(),
            DeleteResourceRequest {
                type_name: "awx_organization".into(),
                prior_state: state,
                planned_private: vec![],
                provider_meta: None,
            },
        )
        .await;
    assert!(deleted.diagnostics.is_empty());

    create.assert_async().await;
    read.assert_async().await;
    delete.assert_async().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn organization_lookup_through_the_factories() {
    let mut server = Server::new_async().await;
    let _me = server
        .mock("GET", "/api/v2/me/")
        .with_body(r#"{"count":1,"results":[{"id":1,"username":"admin"}]}"#)
        .create_async()
        .await;
    let _lookup = server
        .mock("GET", "/api/v2/organizations/")
        .match_query(Matcher::UrlEncoded("name".into(), "Default".into()))
        .with_body(r#"{"count":1,"next":null,"results":[{"id":1,"name":"Default","description":"","max_hosts":0}]}"#)
        .create_async()
        .await;

    let mut provider = AwxProvider::new();
    let configured = provider
        .configure(Context::new(), configure_request(&server.url()))
        .await;
    assert!(configured.diagnostics.is_empty());

    let factories = provider.data_sources();
    let mut data_source = factories["awx_organization"]();
    data_source
        .configure(
            Context::new(),
            ConfigureDataSourceRequest {
                provider_data: configured.provider_data,
            },
        )
        .await;

    let response = data_source
        .read(
            Context::new(),
            ReadDataSourceRequest {
                type_name: "awx_organization".into(),
                config: object(&[("id", Dynamic::Null), ("name", Dynamic::from("Default"))]),
                provider_meta: None,
                client_capabilities: ClientCapabilities::default(),
            },
        )
        .await;

    assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
    assert_eq!(response.state.get_i64(&AttributePath::new("id")).unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn unconfigured_resources_report_it() {
    let provider = AwxProvider::new();
    let factories = provider.resources();
    let resource = factories["awx_team"]();

    let planned = object(&[("name", Dynamic::from("ops")), ("organization_id", Dynamic::Number(1.0))]);
    let response = resource
        .create(
            Context::new(),
            CreateResourceRequest {
                type_name: "awx_team".into(),
                planned_state: planned.clone(),
                config: planned,
                planned_private: vec![],
                provider_meta: None,
            },
        )
        .await;

    assert_eq!(response.diagnostics[0].summary, "Provider not configured");
}
