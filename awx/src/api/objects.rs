//! Generic CRUD over AWX collections
//!
//! Every AWX object type follows the same conventions: list and create on
//! `<collection>/`, read, update and delete on `<collection>/<id>/`.

use super::common::ApiQueryParams;
use super::error::ApiError;
use super::Client;
use serde_json::Value;

pub struct ObjectsApi<'a> {
    client: &'a Client,
}

impl<'a> ObjectsApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn get(&self, collection: &str, id: i64) -> Result<Value, ApiError> {
        self.client.get(&object_path(collection, id)).await
    }

    /// POST to a collection or to a nested creation endpoint such as
    /// `workflow_job_templates/4/schedules/`
    pub async fn create(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        tracing::debug!("Creating object at {}", path);
        self.client.post(&collection_path(path), body).await
    }

    pub async fn update(&self, collection: &str, id: i64, body: &Value) -> Result<Value, ApiError> {
        tracing::debug!("Updating {} {}", collection, id);
        self.client.put(&object_path(collection, id), body).await
    }

    pub async fn delete(&self, collection: &str, id: i64) -> Result<(), ApiError> {
        tracing::debug!("Deleting {} {}", collection, id);
        self.client.delete(&object_path(collection, id)).await
    }

    pub async fn list(
        &self,
        collection: &str,
        params: &ApiQueryParams,
    ) -> Result<Vec<Value>, ApiError> {
        self.client.list(&collection_path(collection), params).await
    }

    /// Resolves a credential type name to its id
    pub async fn credential_type_id(&self, name: &str) -> Result<Option<i64>, ApiError> {
        let found = self
            .list("credential_types", &ApiQueryParams::new().add("name", name))
            .await?;
        Ok(found
            .iter()
            .find(|t| t.get("name").and_then(Value::as_str) == Some(name))
            .and_then(super::common::object_id))
    }
}

pub fn collection_path(collection: &str) -> String {
    format!("{}/", collection.trim_end_matches('/'))
}

pub fn object_path(collection: &str, id: i64) -> String {
    format!("{}/{}/", collection.trim_end_matches('/'), id)
}
