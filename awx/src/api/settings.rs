//! Settings slugs (`settings/<slug>/`)
//!
//! A slug is one JSON object holding many keys. Writes go through PATCH with
//! a single key so concurrent writers of other keys are left untouched.

use super::error::ApiError;
use super::Client;
use serde_json::{Map, Value};

pub const ALL: &str = "all";

pub struct SettingsApi<'a> {
    client: &'a Client,
}

impl<'a> SettingsApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn get(&self, slug: &str) -> Result<Map<String, Value>, ApiError> {
        self.client.get(&format!("settings/{}/", slug)).await
    }

    /// Value of one key, null when the slug does not carry it
    pub async fn get_key(&self, slug: &str, key: &str) -> Result<Value, ApiError> {
        let mut settings = self.get(slug).await?;
        Ok(settings.remove(key).unwrap_or(Value::Null))
    }

    pub async fn patch(&self, slug: &str, key: &str, value: Value) -> Result<(), ApiError> {
        tracing::debug!("Updating setting {} in {}", key, slug);
        let mut body = Map::new();
        body.insert(key.to_string(), value);
        let _: Value = self
            .client
            .patch(&format!("settings/{}/", slug), &body)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Auth;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn client(url: &str) -> Client {
        Client::new(url, Auth::from_credentials("admin", "password", ""), false).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn patch_sends_only_one_key() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PATCH", "/api/v2/settings/saml/")
            .match_body(Matcher::Json(json!({"SOCIAL_AUTH_SAML_TEAM_MAP": {}})))
            .with_body(r#"{"SOCIAL_AUTH_SAML_TEAM_MAP":{}}"#)
            .create_async()
            .await;

        client(&server.url())
            .settings()
            .patch("saml", "SOCIAL_AUTH_SAML_TEAM_MAP", json!({}))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_keys_read_as_null() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v2/settings/all/")
            .with_body(r#"{"TOWER_URL_BASE":"https://awx.example.com"}"#)
            .create_async()
            .await;

        let api_client = client(&server.url());
        let settings = api_client.settings();
        assert_eq!(
            settings.get_key(ALL, "TOWER_URL_BASE").await.unwrap(),
            json!("https://awx.example.com")
        );
        assert_eq!(settings.get_key(ALL, "MISSING").await.unwrap(), Value::Null);
    }
}
