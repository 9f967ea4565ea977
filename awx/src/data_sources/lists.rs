//! Data sources listing every object of a collection

use crate::api::{ApiQueryParams, Client};
use crate::diagnostics::{api_error, not_configured};
use crate::provider_data::AwxProviderData;
use crate::values::json_to_dynamic;
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
use tfplug::types::{Diagnostic, Dynamic, DynamicValue};

/// One attribute of a listed element and where AWX keeps it
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    /// Path into the AWX object, e.g. `["inputs", "username"]`
    pub path: &'static [&'static str],
    pub number: bool,
}

#[derive(Debug)]
pub struct ListSpec {
    pub type_name: &'static str,
    pub description: &'static str,
    pub collection: &'static str,
    /// Attribute holding the list
    pub attribute: &'static str,
    pub columns: &'static [Column],
}

pub static CREDENTIALS: ListSpec = ListSpec {
    type_name: "awx_credentials",
    description: "Lists every AWX credential",
    collection: "credentials",
    attribute: "credentials",
    columns: &[
        Column { name: "id", path: &["id"], number: true },
        Column { name: "username", path: &["inputs", "username"], number: false },
        Column { name: "kind", path: &["kind"], number: false },
        Column { name: "name", path: &["name"], number: false },
        Column { name: "organization_id", path: &["organization"], number: true },
    ],
};

pub static ORGANIZATIONS: ListSpec = ListSpec {
    type_name: "awx_organizations",
    description: "Lists every AWX organization",
    collection: "organizations",
    attribute: "organizations",
    columns: &[
        Column { name: "id", path: &["id"], number: true },
        Column { name: "name", path: &["name"], number: false },
    ],
};

pub static LISTS: &[&ListSpec] = &[&CREDENTIALS, &ORGANIZATIONS];

impl ListSpec {
    fn element_type(&self) -> AttributeType {
        AttributeType::Object(
            self.columns
                .iter()
                .map(|column| {
                    let type_ = if column.number {
                        AttributeType::Number
                    } else {
                        AttributeType::String
                    };
                    (column.name.to_string(), type_)
                })
                .collect(),
        )
    }

    pub fn schema(&self) -> Schema {
        SchemaBuilder::new()
            .version(0)
            .description(self.description)
            .attribute(
                AttributeBuilder::new(self.attribute, AttributeType::List(Box::new(self.element_type())))
                    .computed()
                    .build(),
            )
            .build()
    }

    fn element(&self, object: &Value) -> Dynamic {
        let values = self
            .columns
            .iter()
            .map(|column| {
                let raw = column
                    .path
                    .iter()
                    .try_fold(object, |value, key| value.get(*key));
                let value = match raw {
                    Some(Value::String(s)) if !column.number => Dynamic::String(s.clone()),
                    Some(raw) if column.number && raw.is_number() => json_to_dynamic(raw),
                    _ => Dynamic::Null,
                };
                (column.name.to_string(), value)
            })
            .collect::<HashMap<_, _>>();
        Dynamic::Map(values)
    }

    pub async fn fetch(&self, client: &Client) -> Result<DynamicValue, Diagnostic> {
        let objects = client
            .objects()
            .list(self.collection, &ApiQueryParams::new())
            .await
            .map_err(|e| api_error(format!("Unable to fetch {}", self.attribute), &e))?;

        let mut state = HashMap::new();
        state.insert(
            self.attribute.to_string(),
            Dynamic::List(objects.iter().map(|object| self.element(object)).collect()),
        );
        Ok(DynamicValue::new(Dynamic::Map(state)))
    }
}

pub struct ListDataSource {
    spec: &'static ListSpec,
    provider_data: Option<AwxProviderData>,
}

impl ListDataSource {
    pub fn new(spec: &'static ListSpec) -> Self {
        Self {
            spec,
            provider_data: None,
        }
    }
}

#[async_trait]
impl DataSource for ListDataSource {
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
            Some(data) => self.spec.fetch(&data.client).await,
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
impl DataSourceWithConfigure for ListDataSource {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Auth;
    use mockito::{Matcher, Server};
    use tfplug::types::AttributePath;

    #[test]
    fn elements_follow_nested_paths() {
        let object = serde_json::json!({"id": 3, "name": "ssh", "kind": "ssh",
                                        "organization": null, "inputs": {"username": "deploy"}});
        let element = CREDENTIALS.element(&object);

        assert_eq!(element.get("id"), Some(&Dynamic::Number(3.0)));
        assert_eq!(element.get("username"), Some(&Dynamic::from("deploy")));
        assert_eq!(element.get("organization_id"), Some(&Dynamic::Null));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lists_every_organization() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v2/organizations/")
            .match_query(Matcher::Any)
            .with_body(r#"{"count":2,"next":null,"results":[{"id":1,"name":"Default"},{"id":2,"name":"Eng"}]}"#)
            .create_async()
            .await;

        let client = Client::new(&server.url(), Auth::from_credentials("admin", "password", ""), false).unwrap();
        let state = ORGANIZATIONS.fetch(&client).await.unwrap();
        let organizations = state.get_list(&AttributePath::new("organizations")).unwrap();

        assert_eq!(organizations.len(), 2);
        assert_eq!(organizations[1].get("name"), Some(&Dynamic::from("Eng")));
        assert_eq!(organizations[1].get("id"), Some(&Dynamic::Number(2.0)));
    }
}
