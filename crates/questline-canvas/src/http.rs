//! HTTP implementation of [`CanvasApi`] backed by `reqwest`.
//!
//! Authenticates with a bearer token, applies a fixed per-call timeout, and
//! feeds Canvas throttle headers (`X-Rate-Limit-Remaining`, `Retry-After`)
//! into the shared [`RateLimitBudget`]. Response statuses are classified
//! into the retryable/terminal split of [`CanvasError`]; timeouts and
//! transport failures are treated as transient.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::api::{
    AssignmentPayload, CanvasApi, ColumnPayload, ModuleItemPayload, ModulePayload, RemoteId,
    Submission,
};
use crate::error::{CanvasError, CanvasResult};
use crate::throttle::RateLimitBudget;

/// Canvas connection configuration.
#[derive(Debug, Clone)]
pub struct CanvasConfig {
    /// Base URL, e.g. `https://school.instructure.com`.
    pub base_url: String,
    /// Bearer token for the API user.
    pub token: String,
    /// Fixed per-call timeout.
    pub timeout: Duration,
}

impl CanvasConfig {
    /// Read `CANVAS_BASE_URL` and `CANVAS_TOKEN` from the environment.
    pub fn from_env() -> CanvasResult<Self> {
        let base_url = std::env::var("CANVAS_BASE_URL").map_err(|_| CanvasError::Permission {
            message: "CANVAS_BASE_URL is not set".to_string(),
        })?;
        let token = std::env::var("CANVAS_TOKEN").map_err(|_| CanvasError::Permission {
            message: "CANVAS_TOKEN is not set".to_string(),
        })?;
        Ok(Self {
            base_url,
            token,
            timeout: Duration::from_secs(30),
        })
    }

    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Production [`CanvasApi`] implementation over the Canvas REST endpoints.
pub struct HttpCanvasClient {
    config: CanvasConfig,
    http: reqwest::Client,
    budget: Arc<RateLimitBudget>,
}

/// Minimal body returned by Canvas create/update endpoints.
#[derive(Debug, serde::Deserialize)]
struct IdBody {
    id: RemoteId,
}

impl HttpCanvasClient {
    pub fn new(config: CanvasConfig, budget: Arc<RateLimitBudget>) -> CanvasResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("questline/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| CanvasError::Transient(e.to_string()))?;
        Ok(Self {
            config,
            http,
            budget,
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/api/v1/{}",
            self.config.base_url.trim_end_matches('/'),
            path
        )
    }

    /// Issue one request and classify the outcome. Does not retry; the
    /// retry loop lives in [`RetryPolicy`](crate::throttle::RetryPolicy)
    /// so fakes and the real client share it.
    async fn request<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> CanvasResult<T> {
        let url = self.url(path);
        debug!(method = %method, %url, "canvas request");

        let mut req = self
            .http
            .request(method, &url)
            .bearer_auth(&self.config.token);
        if let Some(body) = body {
            req = req.json(body);
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                CanvasError::Transient(format!("timeout calling {url}"))
            } else {
                CanvasError::Transient(e.to_string())
            }
        })?;

        self.budget.observe(rate_limit_remaining(&response));

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| CanvasError::UnexpectedResponse(e.to_string()));
        }

        let retry_after = retry_after_seconds(&response);
        let throttled = rate_limit_remaining(&response).is_some_and(|r| r <= 0.0);
        let message = response.text().await.unwrap_or_default();
        Err(classify_failure(status, throttled, retry_after, message))
    }
}

/// Parse `X-Rate-Limit-Remaining` if present.
fn rate_limit_remaining(response: &Response) -> Option<f64> {
    response
        .headers()
        .get("x-rate-limit-remaining")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<f64>().ok())
}

/// Parse `Retry-After` seconds if present.
fn retry_after_seconds(response: &Response) -> Option<f64> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<f64>().ok())
}

/// Map a non-success response into the error taxonomy.
///
/// Canvas signals throttling as 403 with a drained quota header (or 429);
/// other 401/403 responses are permission failures, remaining 4xx are
/// payload rejections, and 5xx is transient.
fn classify_failure(
    status: StatusCode,
    throttled: bool,
    retry_after: Option<f64>,
    message: String,
) -> CanvasError {
    if status == StatusCode::TOO_MANY_REQUESTS || (status == StatusCode::FORBIDDEN && throttled) {
        return CanvasError::RateLimited { retry_after };
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return CanvasError::Permission { message };
    }
    if status.is_client_error() {
        return CanvasError::SchemaRejected {
            status: status.as_u16(),
            message,
        };
    }
    CanvasError::Transient(format!("HTTP {}: {}", status.as_u16(), message))
}

#[async_trait]
impl CanvasApi for HttpCanvasClient {
    async fn create_module(
        &self,
        course_id: RemoteId,
        payload: &ModulePayload,
    ) -> CanvasResult<RemoteId> {
        let body = json!({ "module": payload });
        let created: IdBody = self
            .request(Method::POST, &format!("courses/{course_id}/modules"), Some(&body))
            .await?;
        Ok(created.id)
    }

    async fn update_module(
        &self,
        course_id: RemoteId,
        module_id: RemoteId,
        payload: &ModulePayload,
    ) -> CanvasResult<()> {
        let body = json!({ "module": payload });
        let _: IdBody = self
            .request(
                Method::PUT,
                &format!("courses/{course_id}/modules/{module_id}"),
                Some(&body),
            )
            .await?;
        Ok(())
    }

    async fn create_assignment(
        &self,
        course_id: RemoteId,
        payload: &AssignmentPayload,
    ) -> CanvasResult<RemoteId> {
        let body = json!({ "assignment": payload });
        let created: IdBody = self
            .request(
                Method::POST,
                &format!("courses/{course_id}/assignments"),
                Some(&body),
            )
            .await?;
        Ok(created.id)
    }

    async fn update_assignment(
        &self,
        course_id: RemoteId,
        assignment_id: RemoteId,
        payload: &AssignmentPayload,
    ) -> CanvasResult<()> {
        let body = json!({ "assignment": payload });
        let _: IdBody = self
            .request(
                Method::PUT,
                &format!("courses/{course_id}/assignments/{assignment_id}"),
                Some(&body),
            )
            .await?;
        Ok(())
    }

    async fn create_module_item(
        &self,
        course_id: RemoteId,
        module_id: RemoteId,
        payload: &ModuleItemPayload,
    ) -> CanvasResult<RemoteId> {
        let body = json!({ "module_item": payload });
        let created: IdBody = self
            .request(
                Method::POST,
                &format!("courses/{course_id}/modules/{module_id}/items"),
                Some(&body),
            )
            .await?;
        Ok(created.id)
    }

    async fn update_module_item(
        &self,
        course_id: RemoteId,
        module_id: RemoteId,
        item_id: RemoteId,
        payload: &ModuleItemPayload,
    ) -> CanvasResult<()> {
        let body = json!({ "module_item": payload });
        let _: IdBody = self
            .request(
                Method::PUT,
                &format!("courses/{course_id}/modules/{module_id}/items/{item_id}"),
                Some(&body),
            )
            .await?;
        Ok(())
    }

    async fn set_module_prerequisites(
        &self,
        course_id: RemoteId,
        module_id: RemoteId,
        prerequisite_ids: &[RemoteId],
    ) -> CanvasResult<()> {
        let body = json!({ "module": { "prerequisite_module_ids": prerequisite_ids } });
        let _: IdBody = self
            .request(
                Method::PUT,
                &format!("courses/{course_id}/modules/{module_id}"),
                Some(&body),
            )
            .await?;
        Ok(())
    }

    async fn create_gradebook_column(
        &self,
        course_id: RemoteId,
        payload: &ColumnPayload,
    ) -> CanvasResult<RemoteId> {
        let body = json!({ "column": payload });
        let created: IdBody = self
            .request(
                Method::POST,
                &format!("courses/{course_id}/custom_gradebook_columns"),
                Some(&body),
            )
            .await?;
        Ok(created.id)
    }

    async fn put_column_datum(
        &self,
        course_id: RemoteId,
        column_id: RemoteId,
        user_id: RemoteId,
        content: &str,
    ) -> CanvasResult<()> {
        let body = json!({ "column_data": { "content": content } });
        let _: serde_json::Value = self
            .request(
                Method::PUT,
                &format!(
                    "courses/{course_id}/custom_gradebook_columns/{column_id}/data/{user_id}"
                ),
                Some(&body),
            )
            .await?;
        Ok(())
    }

    async fn list_submissions(&self, course_id: RemoteId) -> CanvasResult<Vec<Submission>> {
        self.request::<(), Vec<Submission>>(
            Method::GET,
            &format!("courses/{course_id}/students/submissions?student_ids[]=all&per_page=100"),
            None,
        )
        .await
    }
}
