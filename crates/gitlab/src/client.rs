//! HTTP transport for the GitLab REST v4 API.

use std::time::Duration;

use async_trait::async_trait;
use reconcile::{
    AccessToken, ExternalRepositoryId, GatewayError, HookId, HookSettings, MergePipelineApi, WebhookApi,
    WebhookRecord,
};
use reqwest::header::RETRY_AFTER;
use reqwest::{RequestBuilder, Response};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::hooks::{created_hook_id, hook_body, hooks_from_json, pipeline_protection_from_json};

pub const DEFAULT_API_URL: &str = "https://gitlab.com/api/v4";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A [`WebhookApi`] and [`MergePipelineApi`] backed by GitLab's REST API.
#[derive(Clone)]
pub struct GitLabClient {
    base_url: String,
    client: reqwest::Client,
}

impl GitLabClient {
    /// Fails when the HTTP client (TLS backend, timeout) cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Transport {
                message: format!("building GitLab HTTP client failed: {e}"),
            })?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    fn project_url(&self, project: &ExternalRepositoryId) -> String {
        format!("{}/projects/{}", self.base_url.trim_end_matches('/'), project)
    }

    fn hooks_url(&self, project: &ExternalRepositoryId) -> String {
        format!("{}/hooks", self.project_url(project))
    }

    fn hook_url(&self, project: &ExternalRepositoryId, hook: &HookId) -> String {
        format!("{}/hooks/{}", self.project_url(project), hook)
    }

    async fn send(&self, request: RequestBuilder, token: &AccessToken, what: &str) -> Result<Response, GatewayError> {
        let response = request
            .bearer_auth(token.expose())
            .send()
            .await
            .map_err(|e| GatewayError::Transport {
                message: format!("{what} request failed: {e}"),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.bytes().await.unwrap_or_default();
        let message = serde_json::from_slice::<Value>(&body)
            .ok()
            .and_then(|value| {
                value
                    .get("message")
                    .or_else(|| value.get("error"))
                    .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
            })
            .unwrap_or_else(|| String::from_utf8_lossy(&body).to_string());
        Err(GatewayError::from_status(
            status.as_u16(),
            format!("{what}: {message}"),
            retry_after,
        ))
    }

    async fn json(&self, request: RequestBuilder, token: &AccessToken, what: &str) -> Result<Value, GatewayError> {
        self.send(request, token, what)
            .await?
            .json::<Value>()
            .await
            .map_err(|e| GatewayError::Transport {
                message: format!("invalid {what} response: {e}"),
            })
    }
}

#[async_trait]
impl WebhookApi for GitLabClient {
    #[instrument(skip(self, token))]
    async fn list_hooks(
        &self,
        token: &AccessToken,
        project: &ExternalRepositoryId,
    ) -> Result<Vec<WebhookRecord>, GatewayError> {
        let body = self
            .json(self.client.get(self.hooks_url(project)), token, "list project hooks")
            .await?;
        let hooks = hooks_from_json(&body)?;
        debug!(hooks = hooks.len(), "listed project hooks");
        Ok(hooks)
    }

    #[instrument(skip(self, token, settings), fields(url = %settings.url))]
    async fn create_hook(
        &self,
        token: &AccessToken,
        project: &ExternalRepositoryId,
        settings: &HookSettings,
    ) -> Result<HookId, GatewayError> {
        let request = self.client.post(self.hooks_url(project)).json(&hook_body(settings));
        let body = self.json(request, token, "create project hook").await?;
        created_hook_id(&body)
    }

    #[instrument(skip(self, token, settings), fields(url = %settings.url))]
    async fn edit_hook(
        &self,
        token: &AccessToken,
        project: &ExternalRepositoryId,
        hook: &HookId,
        settings: &HookSettings,
    ) -> Result<(), GatewayError> {
        let request = self.client.put(self.hook_url(project, hook)).json(&hook_body(settings));
        self.send(request, token, "edit project hook").await.map(|_| ())
    }

    #[instrument(skip(self, token))]
    async fn delete_hook(
        &self,
        token: &AccessToken,
        project: &ExternalRepositoryId,
        hook: &HookId,
    ) -> Result<(), GatewayError> {
        self.send(self.client.delete(self.hook_url(project, hook)), token, "delete project hook")
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl MergePipelineApi for GitLabClient {
    #[instrument(skip(self, token))]
    async fn get_pipeline_protection(
        &self,
        token: &AccessToken,
        project: &ExternalRepositoryId,
    ) -> Result<bool, GatewayError> {
        let body = self
            .json(self.client.get(self.project_url(project)), token, "get project")
            .await?;
        pipeline_protection_from_json(&body)
    }

    #[instrument(skip(self, token))]
    async fn set_pipeline_protection(
        &self,
        token: &AccessToken,
        project: &ExternalRepositoryId,
        enabled: bool,
    ) -> Result<(), GatewayError> {
        let request = self
            .client
            .put(self.project_url(project))
            .json(&json!({ "only_allow_merge_if_pipeline_succeeds": enabled }));
        self.send(request, token, "edit project").await.map(|_| ())
    }
}
