//! Parent/child association endpoints such as
//! `job_templates/<id>/credentials/`

use super::common::ApiQueryParams;
use super::error::ApiError;
use super::Client;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
struct AssociationRequest {
    id: i64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    disassociate: bool,
}

pub struct AssociationsApi<'a> {
    client: &'a Client,
}

impl<'a> AssociationsApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn associate(&self, path: &str, child_id: i64) -> Result<(), ApiError> {
        tracing::debug!("Associating {} with {}", child_id, path);
        let _: Value = self
            .client
            .post(
                path,
                &AssociationRequest {
                    id: child_id,
                    disassociate: false,
                },
            )
            .await?;
        Ok(())
    }

    pub async fn disassociate(&self, path: &str, child_id: i64) -> Result<(), ApiError> {
        tracing::debug!("Disassociating {} from {}", child_id, path);
        let _: Value = self
            .client
            .post(
                path,
                &AssociationRequest {
                    id: child_id,
                    disassociate: true,
                },
            )
            .await?;
        Ok(())
    }

    pub async fn is_associated(&self, path: &str, child_id: i64) -> Result<bool, ApiError> {
        let found: Vec<Value> = self
            .client
            .list(path, &ApiQueryParams::new().add("id", child_id))
            .await?;
        Ok(found
            .iter()
            .any(|item| super::common::object_id(item) == Some(child_id)))
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
    async fn associate_and_disassociate_bodies() {
        let mut server = Server::new_async().await;
        let associate = server
            .mock("POST", "/api/v2/job_templates/3/credentials/")
            .match_body(Matcher::Json(json!({"id": 8})))
            .with_status(204)
            .create_async()
            .await;
        let disassociate = server
            .mock("POST", "/api/v2/job_templates/3/credentials/")
            .match_body(Matcher::Json(json!({"id": 8, "disassociate": true})))
            .with_status(204)
            .create_async()
            .await;

        let api_client = client(&server.url());
        let api = api_client.associations();
        api.associate("job_templates/3/credentials/", 8).await.unwrap();
        api.disassociate("job_templates/3/credentials/", 8)
            .await
            .unwrap();

        associate.assert_async().await;
        disassociate.assert_async().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn membership_is_checked_by_id() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v2/organizations/1/galaxy_credentials/")
            .match_query(Matcher::UrlEncoded("id".into(), "4".into()))
            .with_body(r#"{"count":0,"next":null,"results":[]}"#)
            .create_async()
            .await;

        let api_client = client(&server.url());
        let present = api_client
            .associations()
            .is_associated("organizations/1/galaxy_credentials/", 4)
            .await
            .unwrap();
        assert!(!present);
    }
}
