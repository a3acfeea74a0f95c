//! Assembles the event router from collaborators and settings.

use std::sync::Arc;

use reconcile::{
    AuthProvider, BranchProtectionApi, MergePipelineApi, Notifier, Operation, OrganizationStore, Platform,
    RepositoryStore, WebhookApi,
};
use tracing::{info, warn};

use crate::auto_enable::AutoEnableReconciler;
use crate::branch_protection::BranchProtectionReconciler;
use crate::handlers::{
    AutoEnableHandler, GitLabRepositoryHandler, OrganizationProtectionHandler, RepositoryProtectionHandler,
};
use crate::merge_pipeline::MergePipelineReconciler;
use crate::router::{ChangeHandler, EventRouter};
use crate::settings::{BranchProtectionSettings, MergePipelineSettings, Tables, WebhookSettings};
use crate::webhook::WebhookReconciler;

/// Every port the handlers call through, already wrapped in whatever
/// rate limiting the caller selected.
#[derive(Clone)]
pub struct Collaborators {
    pub organizations: Arc<dyn OrganizationStore>,
    pub repositories: Arc<dyn RepositoryStore>,
    pub notifier: Arc<dyn Notifier>,
    pub github_auth: Arc<dyn AuthProvider>,
    pub gitlab_auth: Arc<dyn AuthProvider>,
    pub branch_protection: Arc<dyn BranchProtectionApi>,
    pub webhooks: Arc<dyn WebhookApi>,
    pub merge_pipeline: Arc<dyn MergePipelineApi>,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub tables: Tables,
    pub branch_protection: BranchProtectionSettings,
    pub webhook: WebhookSettings,
    pub merge_pipeline: MergePipelineSettings,
}

/// Registers every handler on its table and operations.
///
/// | Table | Operations | Handlers |
/// |-------|------------|----------|
/// | GitHub organizations | INSERT, MODIFY | auto-enable, organization branch protection |
/// | GitLab organizations | INSERT, MODIFY | auto-enable |
/// | repositories | INSERT, MODIFY | repository branch protection |
/// | repositories | INSERT, MODIFY, REMOVE | GitLab webhook (when a webhook is configured) |
pub fn build_router(settings: &EngineSettings, collaborators: &Collaborators) -> EventRouter {
    let mut router = EventRouter::new();
    let tables = &settings.tables;

    let auto_enable = AutoEnableReconciler::new(
        Arc::clone(&collaborators.repositories),
        Arc::clone(&collaborators.notifier),
    );
    let github_auto_enable: Arc<dyn ChangeHandler> =
        Arc::new(AutoEnableHandler::new(Platform::GitHub, auto_enable.clone()));
    let gitlab_auto_enable: Arc<dyn ChangeHandler> = Arc::new(AutoEnableHandler::new(Platform::GitLab, auto_enable));
    let protection = BranchProtectionReconciler::new(
        Arc::clone(&collaborators.branch_protection),
        settings.branch_protection.clone(),
    );
    let organization_protection: Arc<dyn ChangeHandler> = Arc::new(OrganizationProtectionHandler::new(
        Arc::clone(&collaborators.repositories),
        Arc::clone(&collaborators.github_auth),
        protection.clone(),
    ));
    let repository_protection: Arc<dyn ChangeHandler> = Arc::new(RepositoryProtectionHandler::new(
        Arc::clone(&collaborators.organizations),
        Arc::clone(&collaborators.github_auth),
        protection,
    ));

    for operation in [Operation::Insert, Operation::Modify] {
        router.register(&tables.github_organizations, operation, Arc::clone(&github_auto_enable));
        router.register(&tables.github_organizations, operation, Arc::clone(&organization_protection));
        router.register(&tables.gitlab_organizations, operation, Arc::clone(&gitlab_auto_enable));
        router.register(&tables.repositories, operation, Arc::clone(&repository_protection));
    }

    match (&settings.webhook.url, &settings.webhook.secret) {
        (Some(url), Some(secret)) => {
            let merge_pipeline = settings
                .merge_pipeline
                .enabled
                .then(|| MergePipelineReconciler::new(Arc::clone(&collaborators.merge_pipeline)));
            let gitlab: Arc<dyn ChangeHandler> = Arc::new(GitLabRepositoryHandler::new(
                Arc::clone(&collaborators.organizations),
                Arc::clone(&collaborators.gitlab_auth),
                WebhookReconciler::new(Arc::clone(&collaborators.webhooks)),
                merge_pipeline,
                url.clone(),
                secret.clone(),
            ));
            for operation in [Operation::Insert, Operation::Modify, Operation::Remove] {
                router.register(&tables.repositories, operation, Arc::clone(&gitlab));
            }
        }
        _ => warn!("webhook url or secret not configured; GitLab repository changes are ignored"),
    }

    info!(
        github_organizations = %tables.github_organizations,
        gitlab_organizations = %tables.gitlab_organizations,
        repositories = %tables.repositories,
        "event router ready"
    );
    router
}
