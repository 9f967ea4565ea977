pub mod api;
pub mod config;
pub mod data_sources;
pub mod diagnostics;
pub mod normalize;
pub mod provider_data;
pub mod resources;
pub mod values;

use crate::api::Client;
use crate::config::ProviderConfig;
use crate::provider_data::AwxProviderData;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tfplug::context::Context;
use tfplug::provider::{
    ConfigureProviderRequest, ConfigureProviderResponse, DataSourceFactory, Provider,
    ProviderSchemaRequest, ProviderSchemaResponse, ResourceFactory,
};
use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::types::Diagnostic;
use tracing::{debug, info};

pub const TYPE_NAME: &str = "awx";

#[derive(Default)]
pub struct AwxProvider {
    provider_data: Option<AwxProviderData>,
}

impl AwxProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_configured(&self) -> bool {
        self.provider_data.is_some()
    }
}

fn schema() -> Schema {
    SchemaBuilder::new()
        .version(0)
        .description("Manages Ansible AWX / Automation Controller objects")
        .attribute(
            AttributeBuilder::new("hostname", AttributeType::String)
                .description("AWX base URL, defaults to AWX_HOSTNAME or http://localhost")
                .optional()
                .build(),
        )
        .attribute(
            AttributeBuilder::new("insecure", AttributeType::Bool)
                .description("Skip TLS certificate verification, defaults to AWX_INSECURE")
                .optional()
                .build(),
        )
        .attribute(
            AttributeBuilder::new("username", AttributeType::String)
                .description("Basic auth user, defaults to AWX_USERNAME or admin")
                .optional()
                .build(),
        )
        .attribute(
            AttributeBuilder::new("password", AttributeType::String)
                .description("Basic auth password, defaults to AWX_PASSWORD or password")
                .optional()
                .sensitive()
                .build(),
        )
        .attribute(
            AttributeBuilder::new("token", AttributeType::String)
                .description("OAuth2 token, preferred over basic auth when set")
                .optional()
                .sensitive()
                .build(),
        )
        .build()
}

async fn connect(config: &ProviderConfig) -> Result<Client, Diagnostic> {
    let client = Client::new(&config.hostname, config.auth(), config.insecure).map_err(|e| {
        Diagnostic::error("Unable to create AWX client", e.to_string())
    })?;

    client.me().await.map_err(|e| {
        Diagnostic::error(
            "Unable to auth user against AWX API: check the hostname, username and password",
            e.to_string(),
        )
    })?;
    Ok(client)
}

#[async_trait]
impl Provider for AwxProvider {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    async fn schema(&self, _ctx: Context, _request: ProviderSchemaRequest) -> ProviderSchemaResponse {
        ProviderSchemaResponse {
            schema: schema(),
            diagnostics: vec![],
        }
    }

    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureProviderRequest,
    ) -> ConfigureProviderResponse {
        let config = ProviderConfig::resolve(&request.config);
        debug!(?config, "configuring provider");

        match connect(&config).await {
            Ok(client) => {
                info!("Connected to AWX at {}", config.hostname);
                let data = AwxProviderData::new(client);
                self.provider_data = Some(data.clone());
                ConfigureProviderResponse {
                    diagnostics: vec![],
                    provider_data: Some(Arc::new(data)),
                }
            }
            Err(diagnostic) => ConfigureProviderResponse {
                diagnostics: vec![diagnostic],
                provider_data: None,
            },
        }
    }

    fn resources(&self) -> HashMap<String, ResourceFactory> {
        resources::factories()
    }

    fn data_sources(&self) -> HashMap<String, DataSourceFactory> {
        data_sources::factories()
    }
}
