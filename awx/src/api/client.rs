use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::common::{ApiErrorDetails, ApiErrorResponse, ApiQueryParams, Page};
use super::error::ApiError;
use super::pool::{ConnectionPoolConfig, ConnectionStats, RequestStats};

const API_PREFIX: &str = "/api/v2/";
const PAGE_SIZE: u32 = 100;

/// How requests authenticate against AWX
#[derive(Clone)]
pub enum Auth {
    Basic { username: String, password: String },
    Token(String),
}

impl Auth {
    /// A non-empty token wins over username and password
    pub fn from_credentials(username: &str, password: &str, token: &str) -> Self {
        if token.is_empty() {
            Auth::Basic {
                username: username.to_string(),
                password: password.to_string(),
            }
        } else {
            Auth::Token(token.to_string())
        }
    }

    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Auth::Basic { username, password } => request.basic_auth(username, Some(password)),
            Auth::Token(token) => request.bearer_auth(token),
        }
    }
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .finish_non_exhaustive(),
            Auth::Token(_) => f.write_str("Token"),
        }
    }
}

/// AWX API client
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http_client: reqwest::Client,
    base_url: String,
    auth: Auth,
    retry_config: RetryConfig,
    stats: RequestStats,
    key_locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Only GET requests are retried; writes are sent exactly once
#[derive(Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub timeout_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 10000,
            timeout_seconds: 60,
        }
    }
}

impl Client {
    /// Create a new API client with default configuration
    pub fn new(hostname: &str, auth: Auth, insecure: bool) -> Result<Self, ApiError> {
        Self::with_config(hostname, auth, insecure, RetryConfig::default())
    }

    /// Create a new API client with custom retry configuration
    pub fn with_config(
        hostname: &str,
        auth: Auth,
        insecure: bool,
        retry_config: RetryConfig,
    ) -> Result<Self, ApiError> {
        let parsed = url::Url::parse(hostname)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", hostname, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ApiError::InvalidUrl(format!(
                "{}: scheme must be http or https",
                hostname
            )));
        }

        let pool_config = ConnectionPoolConfig {
            request_timeout: std::time::Duration::from_secs(retry_config.timeout_seconds),
            ..Default::default()
        };
        let http_client = pool_config.build_client(insecure)?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                http_client,
                base_url: hostname.trim_end_matches('/').to_string(),
                auth,
                retry_config,
                stats: RequestStats::default(),
                key_locks: std::sync::Mutex::new(HashMap::new()),
            }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Paths are relative to /api/v2/ unless they already carry the prefix
    /// (pagination links) or are absolute URLs.
    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with(API_PREFIX) {
            format!("{}{}", self.inner.base_url, path)
        } else {
            format!(
                "{}{}{}",
                self.inner.base_url,
                API_PREFIX,
                path.trim_start_matches('/')
            )
        }
    }

    /// Execute a GET request with retry logic
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute(Method::GET, path, None).await
    }

    /// Execute a GET request with query parameters
    pub async fn get_with_params<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &ApiQueryParams,
    ) -> Result<T, ApiError> {
        let full_path = format!("{}{}", path, params.to_query_string());
        self.get(&full_path).await
    }

    /// Fetch every page of a list endpoint
    pub async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &ApiQueryParams,
    ) -> Result<Vec<T>, ApiError> {
        let mut next = format!(
            "{}{}",
            path,
            params.clone().add("page_size", PAGE_SIZE).to_query_string()
        );
        let mut items = Vec::new();
        loop {
            let page: Page<T> = self.get(&next).await?;
            items.extend(page.results);
            match page.next {
                Some(link) if !link.is_empty() => next = link,
                _ => break,
            }
        }
        Ok(items)
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.execute(Method::POST, path, Some(to_json(body)?)).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.execute(Method::PUT, path, Some(to_json(body)?)).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.execute(Method::PATCH, path, Some(to_json(body)?)).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let _: Value = self.execute(Method::DELETE, path, None).await?;
        Ok(())
    }

    /// The authenticated user, used to verify credentials
    pub async fn me(&self) -> Result<Value, ApiError> {
        self.get("me/").await
    }

    /// Serializes read-modify-write cycles on one settings key within this
    /// process. Different keys never wait on each other.
    pub async fn lock_key(&self, slug: &str, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .inner
                .key_locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            locks
                .entry(format!("{}/{}", slug, key))
                .or_default()
                .clone()
        };
        lock.lock_owned().await
    }

    pub fn connection_stats(&self) -> ConnectionStats {
        self.inner.stats.snapshot()
    }

    /// Generic object operations
    pub fn objects(&self) -> crate::api::objects::ObjectsApi<'_> {
        crate::api::objects::ObjectsApi::new(self)
    }

    /// Job launch and polling
    pub fn jobs(&self) -> crate::api::jobs::JobsApi<'_> {
        crate::api::jobs::JobsApi::new(self)
    }

    /// Settings slugs
    pub fn settings(&self) -> crate::api::settings::SettingsApi<'_> {
        crate::api::settings::SettingsApi::new(self)
    }

    /// Parent/child association endpoints
    pub fn associations(&self) -> crate::api::associations::AssociationsApi<'_> {
        crate::api::associations::AssociationsApi::new(self)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        let max_retries = if method == Method::GET {
            self.inner.retry_config.max_retries
        } else {
            0
        };

        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let backoff = std::cmp::min(
                    self.inner.retry_config.initial_backoff_ms * (2_u64.pow(attempt - 1)),
                    self.inner.retry_config.max_backoff_ms,
                );
                tracing::debug!(
                    "Retrying request to {} after {}ms (attempt {})",
                    path,
                    backoff,
                    attempt
                );
                self.inner.stats.record_retry();
                tokio::time::sleep(tokio::time::Duration::from_millis(backoff)).await;
            }

            tracing::debug!(method = %method, url = %url, "AWX request");
            let mut request = self
                .inner
                .auth
                .apply(self.inner.http_client.request(method.clone(), &url));
            if let Some(body) = &body {
                request = request.json(body);
            }

            let can_retry = attempt < max_retries;
            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        self.inner.stats.record(true);
                        return parse_success_response(response).await;
                    }
                    self.inner.stats.record(false);

                    let transient = status == StatusCode::TOO_MANY_REQUESTS
                        || status.is_server_error();
                    if !(transient && can_retry) {
                        return handle_error_response(path, response).await;
                    }
                }
                Err(e) => {
                    self.inner.stats.record(false);
                    let transient = e.is_timeout() || e.is_connect();
                    if !(transient && can_retry) {
                        return Err(if e.is_timeout() {
                            ApiError::Timeout(self.inner.retry_config.timeout_seconds)
                        } else {
                            ApiError::RequestError(e)
                        });
                    }
                }
            }

            attempt += 1;
        }
    }
}

fn to_json<B: Serialize>(body: &B) -> Result<Value, ApiError> {
    serde_json::to_value(body)
        .map_err(|e| ApiError::ParseError(format!("Failed to encode request: {}", e)))
}

async fn parse_success_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ApiError> {
    let text = response.text().await?;
    let body = if text.trim().is_empty() { "null" } else { &text };

    serde_json::from_str::<T>(body).map_err(|e| {
        tracing::error!("Failed to deserialize response: {}", e);
        ApiError::ParseError(format!("Failed to parse response: {}", e))
    })
}

async fn handle_error_response<T>(path: &str, response: reqwest::Response) -> Result<T, ApiError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());

    match status {
        StatusCode::UNAUTHORIZED => return Err(ApiError::AuthError),
        StatusCode::NOT_FOUND => return Err(ApiError::NotFound(path.to_string())),
        StatusCode::TOO_MANY_REQUESTS => return Err(ApiError::RateLimited),
        StatusCode::SERVICE_UNAVAILABLE => return Err(ApiError::ServiceUnavailable),
        _ => {}
    }

    let details = serde_json::from_str::<ApiErrorResponse>(&text)
        .ok()
        .map(ApiErrorDetails::from);
    let message = details
        .as_ref()
        .and_then(|d| d.summary())
        .unwrap_or_else(|| {
            if text.is_empty() {
                status.canonical_reason().unwrap_or("error").to_string()
            } else {
                text.clone()
            }
        });

    Err(ApiError::ApiError {
        status: status.as_u16(),
        message,
        details: details.map(Box::new),
    })
}
