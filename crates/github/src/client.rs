//! HTTP transport for the GitHub GraphQL API.

use std::time::Duration;

use async_trait::async_trait;
use reconcile::{
    AccessToken, BranchProtectionApi, GatewayError, ProtectionState, RepositoryNodeId, RuleId, RuleSettings,
};
use reqwest::header::{ACCEPT, RETRY_AFTER, USER_AGENT};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::graphql::{
    create_rule_request, protection_page, protection_request, update_rule_request, CreateRuleData, GraphQlRequest,
    GraphQlResponse, ProtectionData, ProtectionPage, RulePayload, UpdateRuleData,
};

pub const DEFAULT_API_URL: &str = "https://api.github.com/graphql";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CLIENT_USER_AGENT: &str = concat!("cla-sync/", env!("CARGO_PKG_VERSION"));

/// A [`BranchProtectionApi`] backed by GitHub's GraphQL endpoint.
#[derive(Clone)]
pub struct GitHubClient {
    endpoint: String,
    client: reqwest::Client,
}

impl GitHubClient {
    /// Fails when the HTTP client (TLS backend, timeout) cannot be built.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Transport {
                message: format!("building GitHub HTTP client failed: {e}"),
            })?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        token: &AccessToken,
        request: &GraphQlRequest,
        what: &str,
    ) -> Result<T, GatewayError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token.expose())
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .header(ACCEPT, "application/vnd.github+json")
            .json(request)
            .send()
            .await
            .map_err(|e| GatewayError::Transport {
                message: format!("{what} request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(
                status.as_u16(),
                format!("{what}: {body}"),
                retry_after,
            ));
        }

        let envelope = response
            .json::<GraphQlResponse<T>>()
            .await
            .map_err(|e| GatewayError::Transport {
                message: format!("invalid {what} response: {e}"),
            })?;
        envelope.into_data(what)
    }

    async fn protection_page(
        &self,
        token: &AccessToken,
        owner: &str,
        repository: &str,
        after: Option<&str>,
        full_name: &str,
    ) -> Result<ProtectionPage, GatewayError> {
        let data: ProtectionData = self
            .execute(token, &protection_request(owner, repository, after), "branch protection query")
            .await?;
        protection_page(data, full_name)
    }
}

fn missing_rule(what: &str) -> GatewayError {
    GatewayError::Api {
        status: 200,
        message: format!("{what}: no branch protection rule in response"),
    }
}

#[async_trait]
impl BranchProtectionApi for GitHubClient {
    #[instrument(skip(self, token))]
    async fn fetch_protection(
        &self,
        token: &AccessToken,
        owner: &str,
        repository: &str,
    ) -> Result<ProtectionState, GatewayError> {
        let full_name = format!("{owner}/{repository}");
        let ProtectionPage {
            mut state,
            mut next_cursor,
        } = self.protection_page(token, owner, repository, None, &full_name).await?;
        let mut pages = 1;
        while let Some(cursor) = next_cursor {
            next_cursor = self
                .protection_page(token, owner, repository, Some(&cursor), &full_name)
                .await?
                .extend(&mut state);
            pages += 1;
        }
        debug!(rules = state.rules.len(), pages, default_branch = ?state.default_branch, "fetched branch protection");
        Ok(state)
    }

    #[instrument(skip(self, token, settings), fields(pattern = %settings.pattern))]
    async fn create_rule(
        &self,
        token: &AccessToken,
        repository: &RepositoryNodeId,
        settings: &RuleSettings,
    ) -> Result<RuleId, GatewayError> {
        let what = "createBranchProtectionRule";
        let data: CreateRuleData = self
            .execute(token, &create_rule_request(repository, settings), what)
            .await?;
        data.create_branch_protection_rule
            .and_then(RulePayload::rule_id)
            .ok_or_else(|| missing_rule(what))
    }

    #[instrument(skip(self, token, settings), fields(pattern = %settings.pattern))]
    async fn update_rule(&self, token: &AccessToken, rule: &RuleId, settings: &RuleSettings) -> Result<(), GatewayError> {
        let what = "updateBranchProtectionRule";
        let data: UpdateRuleData = self.execute(token, &update_rule_request(rule, settings), what).await?;
        data.update_branch_protection_rule
            .and_then(RulePayload::rule_id)
            .map(|_| ())
            .ok_or_else(|| missing_rule(what))
    }
}
