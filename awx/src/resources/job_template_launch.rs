//! Launching a job template, optionally waiting for the job to finish

use crate::api::jobs::{LaunchRequest, WaitConfig, WaitOutcome};
use crate::api::{ApiError, Client};
use crate::diagnostics::{api_error, attribute_error, not_configured, parse_id, state_error};
use crate::normalize::normalize_json_yaml;
use crate::provider_data::AwxProviderData;
use async_trait::async_trait;
use std::time::Duration;
use tfplug::context::Context;
use tfplug::defaults::StaticDefault;
use tfplug::plan_modifier::UseStateForUnknown;
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse, ReadResourceRequest,
    ReadResourceResponse, Resource, ResourceSchemaRequest, ResourceSchemaResponse,
    ResourceWithConfigure, UpdateResourceRequest, UpdateResourceResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, DynamicValue};
use tracing::{info, warn};

pub const TYPE_NAME: &str = "awx_job_template_launch";
const DEFAULT_WAIT_TIMEOUT_SECONDS: i64 = 3600;

pub struct JobTemplateLaunchResource {
    provider_data: Option<AwxProviderData>,
    wait: WaitConfig,
}

impl JobTemplateLaunchResource {
    pub fn new() -> Self {
        Self {
            provider_data: None,
            wait: WaitConfig::default(),
        }
    }

    /// Overrides the polling delays; the timeout still comes from the plan
    pub fn with_wait_config(mut self, wait: WaitConfig) -> Self {
        self.wait = wait;
        self
    }

    fn client(&self) -> Result<&Client, Diagnostic> {
        self.provider_data
            .as_ref()
            .map(|data| data.client.as_ref())
            .ok_or_else(not_configured)
    }

    fn launch_request(plan: &DynamicValue) -> LaunchRequest {
        let text = |name: &str| {
            plan.get_string_opt(&AttributePath::new(name))
                .filter(|value| !value.trim().is_empty())
        };
        LaunchRequest {
            limit: text("limit"),
            inventory: plan
                .get_i64_opt(&AttributePath::new("inventory"))
                .filter(|id| *id > 0),
            extra_vars: text("extra_vars").map(|vars| normalize_json_yaml(&vars)),
        }
    }

    fn wait_config(&self, plan: &DynamicValue) -> WaitConfig {
        let seconds = plan
            .get_i64_opt(&AttributePath::new("wait_timeout_seconds"))
            .unwrap_or(DEFAULT_WAIT_TIMEOUT_SECONDS)
            .max(0);
        WaitConfig {
            timeout: Duration::from_secs(seconds as u64),
            ..self.wait.clone()
        }
    }

    /// Returns the state to keep and the diagnostics of the wait. The state
    /// is None only when nothing was launched.
    async fn launch(
        &self,
        ctx: &Context,
        plan: &DynamicValue,
    ) -> (Option<DynamicValue>, Vec<Diagnostic>) {
        let client = match self.client() {
            Ok(client) => client,
            Err(diagnostic) => return (None, vec![diagnostic]),
        };
        let template_id = match plan.get_i64_opt(&AttributePath::new("job_template_id")) {
            Some(id) => id,
            None => {
                return (
                    None,
                    vec![attribute_error(
                        "job_template_id",
                        "Missing job_template_id",
                        "the job template id must be known before launching",
                    )],
                )
            }
        };

        if let Err(e) = client.jobs().template(template_id).await {
            return (None, vec![api_error("Unable to fetch job template", &e)]);
        }

        let launched = match client
            .jobs()
            .launch(template_id, &Self::launch_request(plan))
            .await
        {
            Ok(launched) => launched,
            Err(e) => return (None, vec![api_error("Unable to launch job template", &e)]),
        };
        let job_id = launched.job_id();
        info!("Job template {} launched job {}", template_id, job_id);

        let mut state = plan.clone();
        if let Err(e) = state.set_string(&AttributePath::new("id"), job_id.to_string()) {
            return (None, vec![state_error("id")(e)]);
        }
        let mut status = launched.status.unwrap_or_else(|| "pending".to_string());
        let mut diagnostics = vec![];

        if plan
            .get_bool_opt(&AttributePath::new("wait_for_completion"))
            .unwrap_or(false)
        {
            match client
                .jobs()
                .wait(ctx, job_id, &self.wait_config(plan))
                .await
            {
                Ok(WaitOutcome::Succeeded(job)) => status = job.status,
                Ok(WaitOutcome::Failed(job)) => {
                    diagnostics.push(Diagnostic::error(
                        "JobTemplate execution failure",
                        format!(
                            "job {} of job template {} finished with status {}",
                            job.id, template_id, job.status
                        ),
                    ));
                    status = job.status;
                }
                Ok(WaitOutcome::TimedOut { last_status }) => {
                    diagnostics.push(Diagnostic::error(
                        "Timeout waiting for job",
                        format!(
                            "job {} of job template {} did not finish in time",
                            job_id, template_id
                        ),
                    ));
                    if let Some(last_status) = last_status {
                        status = last_status;
                    }
                }
                Ok(WaitOutcome::Cancelled) => diagnostics.push(Diagnostic::error(
                    "Job wait cancelled",
                    format!("stopped waiting for job {}", job_id),
                )),
                Err(e) => diagnostics.push(api_error("Unable to fetch job", &e)),
            }
        }

        if let Err(e) = state.set_string(&AttributePath::new("status"), status) {
            diagnostics.push(state_error("status")(e));
        }
        (Some(state), diagnostics)
    }

    async fn refresh_status(&self, state: &DynamicValue) -> Result<Option<String>, Diagnostic> {
        let client = self.client()?;
        let id = parse_id(&state.get_string_opt(&AttributePath::new("id")).unwrap_or_default())?;
        match client.jobs().get(id).await {
            Ok(job) => Ok(Some(job.status)),
            Err(ApiError::NotFound(_)) => Ok(None),
            Err(e) => Err(api_error("Unable to fetch job", &e)),
        }
    }
}

impl Default for JobTemplateLaunchResource {
    fn default() -> Self {
        Self::new()
    }
}

fn schema() -> Schema {
    let force_new = |name: &str, type_: AttributeType, description: &str| {
        AttributeBuilder::new(name, type_)
            .description(description)
            .optional()
            .requires_replace()
    };

    SchemaBuilder::new()
        .version(0)
        .description("Launches a job template")
        .attribute(
            AttributeBuilder::new("id", AttributeType::String)
                .description("Id of the launched job")
                .computed()
                .plan_modifier(Box::new(UseStateForUnknown))
                .build(),
        )
        .attribute(
            AttributeBuilder::new("job_template_id", AttributeType::Number)
                .description("Job template to launch")
                .required()
                .requires_replace()
                .build(),
        )
        .attribute(
            force_new(
                "limit",
                AttributeType::String,
                "Comma separated hosts to limit the run to, needs ask_limit_on_launch",
            )
            .build(),
        )
        .attribute(
            force_new(
                "inventory",
                AttributeType::Number,
                "Inventory override, needs ask_inventory_on_launch",
            )
            .build(),
        )
        .attribute(
            force_new(
                "extra_vars",
                AttributeType::String,
                "Extra variables as JSON or YAML, needs ask_variables_on_launch",
            )
            .build(),
        )
        .attribute(
            AttributeBuilder::new("wait_for_completion", AttributeType::Bool)
                .description("Wait for the job to finish")
                .default(StaticDefault::bool(false))
                .requires_replace()
                .build(),
        )
        .attribute(
            AttributeBuilder::new("wait_timeout_seconds", AttributeType::Number)
                .description("How long to wait for the job")
                .default(StaticDefault::number(DEFAULT_WAIT_TIMEOUT_SECONDS as f64))
                .build(),
        )
        .attribute(
            AttributeBuilder::new("status", AttributeType::String)
                .description("Last known job status")
                .computed()
                .build(),
        )
        .build()
}

#[async_trait]
impl Resource for JobTemplateLaunchResource {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    async fn schema(&self, _ctx: Context, _request: ResourceSchemaRequest) -> ResourceSchemaResponse {
        ResourceSchemaResponse {
            schema: schema(),
            diagnostics: vec![],
        }
    }

    async fn create(&self, ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        let (state, diagnostics) = self.launch(&ctx, &request.planned_state).await;
        CreateResourceResponse {
            new_state: state.unwrap_or_else(DynamicValue::null),
            private: vec![],
            diagnostics,
        }
    }

    async fn read(&self, _ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
        let mut state = request.current_state;
        let mut diagnostics = vec![];
        match self.refresh_status(&state).await {
            Ok(Some(status)) => {
                if let Err(e) = state.set_string(&AttributePath::new("status"), status) {
                    diagnostics.push(state_error("status")(e));
                }
            }
            Ok(None) => {}
            Err(diagnostic) => warn!("Keeping job state: {}", diagnostic.detail),
        }
        ReadResourceResponse {
            new_state: Some(state),
            diagnostics,
            private: request.private,
        }
    }

    /// Only the wait timeout can change in place and it matters only at launch
    async fn update(&self, _ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        let mut new_state = request.planned_state;
        let mut diagnostics = vec![];
        if new_state.get(&AttributePath::new("status")).is_unknown() {
            let path = AttributePath::new("status");
            let written = match request.prior_state.get_string_opt(&path) {
                Some(status) => new_state.set_string(&path, status),
                None => new_state.set_null(&path),
            };
            if let Err(e) = written {
                diagnostics.push(state_error("status")(e));
            }
        }
        UpdateResourceResponse {
            new_state,
            private: vec![],
            diagnostics,
        }
    }

    async fn delete(&self, _ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse {
        let diagnostics = match self.refresh_status(&request.prior_state).await {
            Ok(_) => vec![],
            Err(diagnostic) => vec![diagnostic],
        };
        DeleteResourceResponse { diagnostics }
    }
}

#[async_trait]
impl ResourceWithConfigure for JobTemplateLaunchResource {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Auth;
    use mockito::{Matcher, Server};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tfplug::types::{ClientCapabilities, Dynamic};

    fn fast_wait() -> WaitConfig {
        WaitConfig {
            initial_delay: Duration::from_millis(1),
            interval: Duration::from_millis(5),
            timeout: Duration::from_secs(1),
        }
    }

    async fn configured(url: &str) -> JobTemplateLaunchResource {
        let client = Client::new(url, Auth::from_credentials("admin", "password", ""), false).unwrap();
        let mut resource = JobTemplateLaunchResource::new().with_wait_config(fast_wait());
        resource
            .configure(
                Context::new(),
                ConfigureResourceRequest {
                    provider_data: Some(Arc::new(AwxProviderData::new(client))),
                },
            )
            .await;
        resource
    }

    fn plan(wait: bool, timeout: f64) -> DynamicValue {
        let mut entries = HashMap::new();
        entries.insert("id".to_string(), Dynamic::Unknown);
        entries.insert("job_template_id".to_string(), Dynamic::Number(5.0));
        entries.insert("limit".to_string(), Dynamic::from("web"));
        entries.insert("inventory".to_string(), Dynamic::Null);
        entries.insert("extra_vars".to_string(), Dynamic::from("a: 1"));
        entries.insert("wait_for_completion".to_string(), Dynamic::Bool(wait));
        entries.insert("wait_timeout_seconds".to_string(), Dynamic::Number(timeout));
        entries.insert("status".to_string(), Dynamic::Unknown);
        DynamicValue::new(Dynamic::Map(entries))
    }

    async fn create(resource: &JobTemplateLaunchResource, plan: DynamicValue) -> CreateResourceResponse {
        resource
            .create(
                Context::new(),
                CreateResourceRequest {
                    type_name: TYPE_NAME.into(),
                    planned_state: plan.clone(),
                    config: plan,
                    planned_private: vec![],
                    provider_meta: None,
                },
            )
            .await
    }

    async fn mock_template(server: &mut mockito::ServerGuard) -> mockito::Mock {
        server
            .mock("GET", "/api/v2/job_templates/5/")
            .with_body(r#"{"id":5,"name":"deploy"}"#)
            .create_async()
            .await
    }

    #[test]
    fn launch_request_leaves_out_empty_values() {
        let mut plan = plan(false, 10.0);
        plan.set_string(&AttributePath::new("limit"), "  ".into()).unwrap();
        let request = JobTemplateLaunchResource::launch_request(&plan);

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"extra_vars": "{\"a\":1}"})
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_without_waiting_stores_the_job_id() {
        let mut server = Server::new_async().await;
        let _template = mock_template(&mut server).await;
        let launch = server
            .mock("POST", "/api/v2/job_templates/5/launch/")
            .match_body(Matcher::PartialJson(json!({"limit": "web"})))
            .with_status(201)
            .with_body(r#"{"id":77,"job":77,"status":"pending"}"#)
            .create_async()
            .await;

        let resource = configured(&server.url()).await;
        let response = create(&resource, plan(false, 10.0)).await;

        assert!(response.diagnostics.is_empty());
        assert_eq!(response.new_state.get_string(&AttributePath::new("id")).unwrap(), "77");
        assert_eq!(
            response.new_state.get_string(&AttributePath::new("status")).unwrap(),
            "pending"
        );
        launch.assert_async().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_jobs_are_reported_but_kept() {
        let mut server = Server::new_async().await;
        let _template = mock_template(&mut server).await;
        let _launch = server
            .mock("POST", "/api/v2/job_templates/5/launch/")
            .with_status(201)
            .with_body(r#"{"id":78,"job":78}"#)
            .create_async()
            .await;
        let _job = server
            .mock("GET", "/api/v2/jobs/78/")
            .with_body(r#"{"id":78,"status":"failed","failed":true}"#)
            .create_async()
            .await;

        let resource = configured(&server.url()).await;
        let response = create(&resource, plan(true, 10.0)).await;

        assert_eq!(response.diagnostics.len(), 1);
        assert_eq!(response.diagnostics[0].summary, "JobTemplate execution failure");
        assert_eq!(response.new_state.get_string(&AttributePath::new("id")).unwrap(), "78");
        assert_eq!(
            response.new_state.get_string(&AttributePath::new("status")).unwrap(),
            "failed"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn running_jobs_time_out() {
        let mut server = Server::new_async().await;
        let _template = mock_template(&mut server).await;
        let _launch = server
            .mock("POST", "/api/v2/job_templates/5/launch/")
            .with_status(201)
            .with_body(r#"{"id":79}"#)
            .create_async()
            .await;
        let _job = server
            .mock("GET", "/api/v2/jobs/79/")
            .with_body(r#"{"id":79,"status":"running"}"#)
            .create_async()
            .await;

        let resource = configured(&server.url()).await;
        let response = create(&resource, plan(true, 0.0)).await;

        assert_eq!(response.diagnostics[0].summary, "Timeout waiting for job");
        assert_eq!(
            response.new_state.get_string(&AttributePath::new("status")).unwrap(),
            "running"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_templates_are_not_launched() {
        let mut server = Server::new_async().await;
        let _template = server
            .mock("GET", "/api/v2/job_templates/5/")
            .with_status(404)
            .create_async()
            .await;

        let resource = configured(&server.url()).await;
        let response = create(&resource, plan(false, 10.0)).await;

        assert!(response.new_state.is_null());
        assert_eq!(response.diagnostics[0].summary, "Unable to fetch job template");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn read_refreshes_the_status_and_keeps_missing_jobs() {
        let mut server = Server::new_async().await;
        let _job = server
            .mock("GET", "/api/v2/jobs/80/")
            .with_body(r#"{"id":80,"status":"successful"}"#)
            .create_async()
            .await;
        let _gone = server
            .mock("GET", "/api/v2/jobs/81/")
            .with_status(404)
            .create_async()
            .await;

        let resource = configured(&server.url()).await;
        let read = |id: &str| {
            let mut state = plan(false, 10.0);
            state.set_string(&AttributePath::new("id"), id.into()).unwrap();
            state.set_string(&AttributePath::new("status"), "pending".into()).unwrap();
            ReadResourceRequest {
                type_name: TYPE_NAME.into(),
                current_state: state,
                private: vec![],
                provider_meta: None,
                client_capabilities: ClientCapabilities::default(),
            }
        };

        let refreshed = resource.read(Context::new(), read("80")).await;
        let state = refreshed.new_state.unwrap();
        assert_eq!(state.get_string(&AttributePath::new("status")).unwrap(), "successful");

        let kept = resource.read(Context::new(), read("81")).await;
        let state = kept.new_state.unwrap();
        assert_eq!(state.get_string(&AttributePath::new("status")).unwrap(), "pending");
    }
}
