//! Job template launch and job polling

use super::error::ApiError;
use super::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tfplug::Context;
use tokio::time::Instant;

/// Statuses a job passes through before it finishes
pub const PENDING_STATUSES: &[&str] = &["new", "pending", "waiting", "running"];
pub const SUCCESS_STATUS: &str = "successful";

/// Body of `POST job_templates/<id>/launch/`; empty fields are left out
#[derive(Debug, Default, Serialize)]
pub struct LaunchRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inventory: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_vars: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LaunchResponse {
    pub id: i64,
    #[serde(default)]
    pub job: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
}

impl LaunchResponse {
    pub fn job_id(&self) -> i64 {
        self.job.unwrap_or(self.id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    pub id: i64,
    pub status: String,
    #[serde(default)]
    pub failed: bool,
}

impl Job {
    pub fn is_pending(&self) -> bool {
        PENDING_STATUSES.contains(&self.status.as_str())
    }

    pub fn is_successful(&self) -> bool {
        self.status == SUCCESS_STATUS
    }
}

#[derive(Debug, Clone)]
pub struct WaitConfig {
    pub initial_delay: Duration,
    pub interval: Duration,
    pub timeout: Duration,
}

impl WaitConfig {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(10),
            interval: Duration::from_secs(3),
            timeout: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug)]
pub enum WaitOutcome {
    Succeeded(Job),
    Failed(Job),
    TimedOut { last_status: Option<String> },
    Cancelled,
}

pub struct JobsApi<'a> {
    client: &'a Client,
}

impl<'a> JobsApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn template(&self, template_id: i64) -> Result<Value, ApiError> {
        self.client
            .get(&format!("job_templates/{}/", template_id))
            .await
    }

    pub async fn launch(
        &self,
        template_id: i64,
        request: &LaunchRequest,
    ) -> Result<LaunchResponse, ApiError> {
        tracing::info!("Launching job template {}", template_id);
        self.client
            .post(&format!("job_templates/{}/launch/", template_id), request)
            .await
    }

    pub async fn get(&self, job_id: i64) -> Result<Job, ApiError> {
        self.client.get(&format!("jobs/{}/", job_id)).await
    }

    /// Polls the job at a fixed interval until it leaves the pending
    /// statuses, the timeout passes or the context is cancelled.
    pub async fn wait(
        &self,
        ctx: &Context,
        job_id: i64,
        config: &WaitConfig,
    ) -> Result<WaitOutcome, ApiError> {
        let deadline = Instant::now() + config.timeout;

        if !pause(ctx, config.initial_delay.min(config.timeout)).await {
            return Ok(WaitOutcome::Cancelled);
        }

        loop {
            let job = self.get(job_id).await?;
            tracing::debug!("Job {} status {}", job_id, job.status);

            if !job.is_pending() {
                return Ok(if job.is_successful() {
                    WaitOutcome::Succeeded(job)
                } else {
                    WaitOutcome::Failed(job)
                });
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(WaitOutcome::TimedOut {
                    last_status: Some(job.status),
                });
            }

            if !pause(ctx, config.interval.min(deadline - now)).await {
                return Ok(WaitOutcome::Cancelled);
            }
        }
    }
}

/// Sleeps unless the context is cancelled first; false on cancellation
async fn pause(ctx: &Context, duration: Duration) -> bool {
    if ctx.is_cancelled() {
        return false;
    }
    tokio::select! {
        _ = ctx.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
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

    fn quick(timeout_ms: u64) -> WaitConfig {
        WaitConfig {
            initial_delay: Duration::from_millis(1),
            interval: Duration::from_millis(5),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[test]
    fn launch_request_skips_empty_fields() {
        let body = serde_json::to_value(LaunchRequest {
            limit: Some("web".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(body, json!({"limit": "web"}));
    }

    #[test]
    fn launch_response_prefers_job_field() {
        let response: LaunchResponse =
            serde_json::from_str(r#"{"id":40,"job":41,"status":"pending"}"#).unwrap();
        assert_eq!(response.job_id(), 41);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn launch_posts_only_set_fields() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v2/job_templates/5/launch/")
            .match_body(Matcher::Json(json!({"inventory": 2})))
            .with_status(201)
            .with_body(r#"{"id":90,"job":90,"status":"pending"}"#)
            .create_async()
            .await;

        let request = LaunchRequest {
            inventory: Some(2),
            ..Default::default()
        };
        let launched = client(&server.url())
            .jobs()
            .launch(5, &request)
            .await
            .unwrap();

        assert_eq!(launched.job_id(), 90);
        mock.assert_async().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn wait_reports_success() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v2/jobs/90/")
            .with_body(r#"{"id":90,"status":"successful","failed":false}"#)
            .create_async()
            .await;

        let api_client = client(&server.url());
        let outcome = api_client
            .jobs()
            .wait(&Context::new(), 90, &quick(1000))
            .await
            .unwrap();
        assert!(matches!(outcome, WaitOutcome::Succeeded(job) if job.id == 90));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn wait_reports_failure_statuses() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v2/jobs/91/")
            .with_body(r#"{"id":91,"status":"error","failed":true}"#)
            .create_async()
            .await;

        let api_client = client(&server.url());
        let outcome = api_client
            .jobs()
            .wait(&Context::new(), 91, &quick(1000))
            .await
            .unwrap();
        assert!(matches!(outcome, WaitOutcome::Failed(job) if job.status == "error"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn wait_times_out_on_running_jobs() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v2/jobs/92/")
            .with_body(r#"{"id":92,"status":"running"}"#)
            .expect_at_least(2)
            .create_async()
            .await;

        let api_client = client(&server.url());
        let outcome = api_client
            .jobs()
            .wait(&Context::new(), 92, &quick(30))
            .await
            .unwrap();
        match outcome {
            WaitOutcome::TimedOut { last_status } => {
                assert_eq!(last_status.as_deref(), Some("running"))
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn wait_stops_when_cancelled() {
        let api_client = client("http://127.0.0.1:9");
        let ctx = Context::new();
        ctx.cancel();

        let outcome = api_client
            .jobs()
            .wait(&ctx, 93, &WaitConfig::default())
            .await
            .unwrap();
        assert!(matches!(outcome, WaitOutcome::Cancelled));
    }
}
