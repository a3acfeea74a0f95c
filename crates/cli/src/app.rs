//! Composition root: builds adapters and the router from configuration.

use std::sync::Arc;

use anyhow::Context;
use engine::{
    admission_for, build_router, Collaborators, DispatchReport, EngineSettings, EventRouter, Invocation, LogNotifier,
    Throttled,
};
use github::{GitHubClient, StaticTokenAuth};
use gitlab::{GitLabClient, OrganizationTokenAuth};
use listener::ParsedBatch;
use store::MemoryStore;
use tracing::{info, info_span, warn, Instrument};

use crate::config::Config;

pub struct App {
    router: EventRouter,
    config: Config,
}

impl App {
    /// Wires every collaborator around `store`.
    ///
    /// Each host gets its own rate limiter, shared by every client talking
    /// to that host.
    pub fn build(config: Config, store: Arc<MemoryStore>) -> anyhow::Result<Self> {
        let github_client = Arc::new(Throttled::new(
            GitHubClient::new(config.github.api_url_or(github::DEFAULT_API_URL))
                .context("creating GitHub client")?,
            admission_for(&config.rate_limit),
        ));
        let gitlab_client = Arc::new(Throttled::new(
            GitLabClient::new(config.gitlab.api_url_or(gitlab::DEFAULT_API_URL))
                .context("creating GitLab client")?,
            admission_for(&config.rate_limit),
        ));

        if config.github.access_token().is_none() {
            warn!("no GitHub token configured; branch protection will fail to authenticate");
        }

        let collaborators = Collaborators {
            organizations: store.clone(),
            repositories: store,
            notifier: Arc::new(LogNotifier),
            github_auth: Arc::new(StaticTokenAuth::new(config.github.access_token())),
            gitlab_auth: Arc::new(OrganizationTokenAuth::new(config.gitlab.access_token())),
            branch_protection: github_client,
            webhooks: gitlab_client.clone(),
            merge_pipeline: gitlab_client,
        };
        let settings = EngineSettings {
            tables: config.tables.resolve(&config.stage),
            branch_protection: config.branch_protection.clone(),
            webhook: config.webhook.clone(),
            merge_pipeline: config.merge_pipeline.clone(),
        };

        Ok(Self {
            router: build_router(&settings, &collaborators),
            config,
        })
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Dispatches one batch under a fresh invocation.
    pub async fn process(&self, batch: &ParsedBatch) -> DispatchReport {
        let invocation = match self.config.invocation.timeout() {
            Some(timeout) => Invocation::with_timeout(timeout),
            None => Invocation::unbounded(),
        };
        let span = info_span!("invocation", id = %invocation.id(), stage = %self.config.stage);

        async {
            let report = self.router.dispatch(&invocation, &batch.events).await;
            info!(
                events = report.events_seen,
                handled = report.handled,
                benign = report.benign,
                unrouted = report.unrouted,
                failed = report.failures.len(),
                rejected = batch.rejected.len(),
                "batch complete"
            );
            for failure in &report.failures {
                warn!(
                    event_id = %failure.event_id,
                    route = %failure.route,
                    handler = failure.handler,
                    error = %failure.error,
                    "event not reconciled"
                );
            }
            report
        }
        .instrument(span)
        .await
    }
}
