//! Port traits: the collaborator capabilities the engine calls through.
//!
//! Each host capability is its own narrow trait so adapters implement only
//! what their host supports (GitHub: branch protection; GitLab: webhooks and
//! merge-pipeline settings) and the rate-limit decorators can wrap any of
//! them without knowing which host is behind it.
//!
//! All traits are object-safe via `async_trait` and are held as
//! `Arc<dyn Trait>` by the engine.

use async_trait::async_trait;

use crate::errors::{AuthError, GatewayError, NotifyError, StoreError};
use crate::protection::{ProtectionState, RuleSettings};
use crate::webhook::{HookSettings, WebhookRecord};
use crate::{
    AccessToken, ClaGroupId, ExternalRepositoryId, HookId, OrganizationName, OrganizationRecord, Platform,
    RepositoryId, RepositoryNodeId, RepositoryRecord, RuleId,
};

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Read access to organization records.
#[async_trait]
pub trait OrganizationStore: Send + Sync {
    /// Returns the organization registered under `name` on `platform`.
    ///
    /// Fails with [`StoreError::NotFound`] when there is none.
    async fn get_organization_by_name(
        &self,
        platform: Platform,
        name: &OrganizationName,
    ) -> Result<OrganizationRecord, StoreError>;
}

/// Read access and the field updates the engine is authorised to make on
/// repository records.
#[async_trait]
pub trait RepositoryStore: Send + Sync {
    /// Returns every `platform` repository recorded under `organization`,
    /// enabled or not.
    async fn get_repositories_by_organization(
        &self,
        platform: Platform,
        organization: &OrganizationName,
    ) -> Result<Vec<RepositoryRecord>, StoreError>;

    async fn update_repository_cla_group(
        &self,
        repository: &RepositoryId,
        cla_group: &ClaGroupId,
    ) -> Result<(), StoreError>;

    async fn set_repository_enabled(&self, repository: &RepositoryId, enabled: bool) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// Notification and auth
// ---------------------------------------------------------------------------

/// Sends notices to the CLA managers of a group.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_managers(&self, cla_group: &ClaGroupId, affected: &[RepositoryRecord]) -> Result<(), NotifyError>;
}

/// Produces a fresh access token for an organization's host API calls.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn refresh_organization_auth(&self, organization: &OrganizationRecord) -> Result<AccessToken, AuthError>;
}

// ---------------------------------------------------------------------------
// Host capabilities
// ---------------------------------------------------------------------------

/// Branch-protection rules on a repository host (GitHub).
#[async_trait]
pub trait BranchProtectionApi: Send + Sync {
    /// Fetches the repository's node id, default branch and protection rules.
    async fn fetch_protection(
        &self,
        token: &AccessToken,
        owner: &str,
        repository: &str,
    ) -> Result<ProtectionState, GatewayError>;

    /// Creates a rule for `settings.pattern`, returning its id.
    async fn create_rule(
        &self,
        token: &AccessToken,
        repository: &RepositoryNodeId,
        settings: &RuleSettings,
    ) -> Result<RuleId, GatewayError>;

    /// Replaces the settings of an existing rule.
    async fn update_rule(&self, token: &AccessToken, rule: &RuleId, settings: &RuleSettings) -> Result<(), GatewayError>;
}

/// Project webhooks (GitLab).
#[async_trait]
pub trait WebhookApi: Send + Sync {
    async fn list_hooks(&self, token: &AccessToken, project: &ExternalRepositoryId)
        -> Result<Vec<WebhookRecord>, GatewayError>;

    async fn create_hook(
        &self,
        token: &AccessToken,
        project: &ExternalRepositoryId,
        settings: &HookSettings,
    ) -> Result<HookId, GatewayError>;

    async fn edit_hook(
        &self,
        token: &AccessToken,
        project: &ExternalRepositoryId,
        hook: &HookId,
        settings: &HookSettings,
    ) -> Result<(), GatewayError>;

    async fn delete_hook(&self, token: &AccessToken, project: &ExternalRepositoryId, hook: &HookId)
        -> Result<(), GatewayError>;
}

/// The "only allow merge if the pipeline succeeds" project setting (GitLab).
#[async_trait]
pub trait MergePipelineApi: Send + Sync {
    async fn get_pipeline_protection(&self, token: &AccessToken, project: &ExternalRepositoryId)
        -> Result<bool, GatewayError>;

    async fn set_pipeline_protection(
        &self,
        token: &AccessToken,
        project: &ExternalRepositoryId,
        enabled: bool,
    ) -> Result<(), GatewayError>;
}
