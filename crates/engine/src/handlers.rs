//! Change handlers: decode an event, detect the triggering transition, and
//! run the matching reconciler.
//!
//! Each handler ignores events whose transition does not concern it, so the
//! same handler can be registered for `INSERT` and `MODIFY` (and `REMOVE`
//! where relevant) on a table.

use std::sync::Arc;

use async_trait::async_trait;
use reconcile::{
    auto_enable_triggered, branch_protection_triggered, repository_enablement, AuthProvider, ChangeEvent,
    EnablementChange, OrganizationRecord, OrganizationStore, Platform, ReconcileError, RepositoryRecord,
    RepositoryStore,
};
use tracing::{debug, info, instrument, warn};

use crate::auto_enable::AutoEnableReconciler;
use crate::branch_protection::BranchProtectionReconciler;
use crate::merge_pipeline::MergePipelineReconciler;
use crate::router::ChangeHandler;
use crate::webhook::WebhookReconciler;
use crate::Invocation;

// ============================================================================
// Organization tables
// ============================================================================

/// Runs auto-enable when an organization's `auto_enabled` turns on.
///
/// One handler serves one organization table, so it only touches
/// repositories hosted on that table's platform.
pub struct AutoEnableHandler {
    platform: Platform,
    reconciler: AutoEnableReconciler,
}

impl AutoEnableHandler {
    pub fn new(platform: Platform, reconciler: AutoEnableReconciler) -> Self {
        Self { platform, reconciler }
    }
}

#[async_trait]
impl ChangeHandler for AutoEnableHandler {
    fn name(&self) -> &'static str {
        "auto_enable"
    }

    #[instrument(skip_all, fields(event_id = %event.event_id, table = %event.table, operation = %event.operation))]
    async fn handle(&self, _invocation: &Invocation, event: &ChangeEvent) -> Result<(), ReconcileError> {
        let current: OrganizationRecord = event.decode_current()?;
        let previous: Option<OrganizationRecord> = event.decode_previous()?;
        if !auto_enable_triggered(event.operation, previous.as_ref(), &current) {
            debug!(organization = %current.organization_name, "auto_enabled unchanged");
            return Ok(());
        }

        let outcome = self.reconciler.reconcile(self.platform, &current).await?;
        let total = outcome.attempted();
        if !outcome.failed.is_empty() {
            if outcome.updated.is_empty() {
                return Err(ReconcileError::PartialFailure {
                    failed: outcome.failed.len(),
                    total,
                });
            }
            warn!(
                organization = %current.organization_name,
                updated = outcome.updated.len(),
                failed = outcome.failed.len(),
                "auto-enable partially applied"
            );
        }

        info!(
            organization = %current.organization_name,
            cla_group = %outcome.decision.cla_group_id,
            updated = outcome.updated.len(),
            notified = outcome.notified,
            "auto-enable applied"
        );
        Ok(())
    }
}

/// Protects every repository of a GitHub organization when its
/// `branch_protection_enabled` turns on.
pub struct OrganizationProtectionHandler {
    repositories: Arc<dyn RepositoryStore>,
    auth: Arc<dyn AuthProvider>,
    reconciler: BranchProtectionReconciler,
}

impl OrganizationProtectionHandler {
    pub fn new(
        repositories: Arc<dyn RepositoryStore>,
        auth: Arc<dyn AuthProvider>,
        reconciler: BranchProtectionReconciler,
    ) -> Self {
        Self {
            repositories,
            auth,
            reconciler,
        }
    }
}

#[async_trait]
impl ChangeHandler for OrganizationProtectionHandler {
    fn name(&self) -> &'static str {
        "organization_branch_protection"
    }

    #[instrument(skip_all, fields(event_id = %event.event_id, table = %event.table, operation = %event.operation))]
    async fn handle(&self, invocation: &Invocation, event: &ChangeEvent) -> Result<(), ReconcileError> {
        let current: OrganizationRecord = event.decode_current()?;
        let previous: Option<OrganizationRecord> = event.decode_previous()?;
        if !branch_protection_triggered(event.operation, previous.as_ref(), &current) {
            debug!(organization = %current.organization_name, "branch_protection_enabled unchanged");
            return Ok(());
        }

        let token = self.auth.refresh_organization_auth(&current).await?;
        let repositories = self
            .repositories
            .get_repositories_by_organization(Platform::GitHub, &current.organization_name)
            .await?;
        info!(
            organization = %current.organization_name,
            repositories = repositories.len(),
            "protecting organization repositories"
        );

        self.reconciler
            .protect_repositories(invocation, &token, repositories)
            .await
            .into_result()
    }
}

// ============================================================================
// Repositories table
// ============================================================================

/// Protects a single GitHub repository when it is enabled under an
/// organization that has branch protection turned on.
pub struct RepositoryProtectionHandler {
    organizations: Arc<dyn OrganizationStore>,
    auth: Arc<dyn AuthProvider>,
    reconciler: BranchProtectionReconciler,
}

impl RepositoryProtectionHandler {
    pub fn new(
        organizations: Arc<dyn OrganizationStore>,
        auth: Arc<dyn AuthProvider>,
        reconciler: BranchProtectionReconciler,
    ) -> Self {
        Self {
            organizations,
            auth,
            reconciler,
        }
    }
}

#[async_trait]
impl ChangeHandler for RepositoryProtectionHandler {
    fn name(&self) -> &'static str {
        "repository_branch_protection"
    }

    #[instrument(skip_all, fields(event_id = %event.event_id, table = %event.table, operation = %event.operation))]
    async fn handle(&self, invocation: &Invocation, event: &ChangeEvent) -> Result<(), ReconcileError> {
        let current: RepositoryRecord = event.decode_current()?;
        if current.repository_type != Platform::GitHub || current.archived {
            return Ok(());
        }
        let previous: Option<RepositoryRecord> = event.decode_previous()?;
        if repository_enablement(event.operation, previous.as_ref(), &current) != EnablementChange::Enabled {
            return Ok(());
        }

        let organization = self
            .organizations
            .get_organization_by_name(Platform::GitHub, &current.organization_name)
            .await?;
        if !organization.branch_protection_enabled {
            debug!(
                organization = %organization.organization_name,
                "organization does not enforce branch protection"
            );
            return Ok(());
        }

        let token = self.auth.refresh_organization_auth(&organization).await?;
        self.reconciler
            .protect_repository(invocation, &token, &current)
            .await
            .map(|_| ())
    }
}

/// Installs or removes the CLA bot webhook when a GitLab project's
/// enforcement changes, and turns on merge-pipeline protection alongside
/// the webhook.
pub struct GitLabRepositoryHandler {
    organizations: Arc<dyn OrganizationStore>,
    auth: Arc<dyn AuthProvider>,
    webhooks: WebhookReconciler,
    merge_pipeline: Option<MergePipelineReconciler>,
    hook_url: String,
    hook_secret: String,
}

impl GitLabRepositoryHandler {
    pub fn new(
        organizations: Arc<dyn OrganizationStore>,
        auth: Arc<dyn AuthProvider>,
        webhooks: WebhookReconciler,
        merge_pipeline: Option<MergePipelineReconciler>,
        hook_url: impl Into<String>,
        hook_secret: impl Into<String>,
    ) -> Self {
        Self {
            organizations,
            auth,
            webhooks,
            merge_pipeline,
            hook_url: hook_url.into(),
            hook_secret: hook_secret.into(),
        }
    }
}

#[async_trait]
impl ChangeHandler for GitLabRepositoryHandler {
    fn name(&self) -> &'static str {
        "gitlab_webhook"
    }

    #[instrument(skip_all, fields(event_id = %event.event_id, table = %event.table, operation = %event.operation))]
    async fn handle(&self, invocation: &Invocation, event: &ChangeEvent) -> Result<(), ReconcileError> {
        let current: RepositoryRecord = event.decode_current()?;
        if current.repository_type != Platform::GitLab {
            return Ok(());
        }
        let previous: Option<RepositoryRecord> = event.decode_previous()?;
        let change = repository_enablement(event.operation, previous.as_ref(), &current);
        if change == EnablementChange::Unchanged {
            return Ok(());
        }

        let organization = self
            .organizations
            .get_organization_by_name(Platform::GitLab, &current.organization_name)
            .await?;
        let token = self.auth.refresh_organization_auth(&organization).await?;
        let project = &current.external_id;

        match change {
            EnablementChange::Enabled => {
                self.webhooks
                    .set_webhook(invocation, &token, &self.hook_url, project, &self.hook_secret)
                    .await?;
                if let Some(merge_pipeline) = &self.merge_pipeline {
                    merge_pipeline.ensure(invocation, &token, project, true).await?;
                }
            }
            EnablementChange::Disabled => {
                self.webhooks
                    .remove_webhook(invocation, &token, &self.hook_url, project)
                    .await?;
            }
            EnablementChange::Unchanged => {}
        }
        Ok(())
    }
}
