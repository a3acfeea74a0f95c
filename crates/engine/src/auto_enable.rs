//! Auto-enable: assigning every repository of an organization to one CLA group.

use std::sync::Arc;

use reconcile::{
    determine_cla_group, ClaGroupDecision, Notifier, OrganizationRecord, Platform, ReconcileError, RepositoryId,
    RepositoryRecord, RepositoryStore,
};
use tracing::{info, instrument, warn};

/// What one auto-enable pass did.
#[derive(Debug)]
pub struct AutoEnableOutcome {
    pub decision: ClaGroupDecision,
    /// Repositories whose CLA group or enablement was changed.
    pub updated: Vec<RepositoryRecord>,
    /// Repositories whose update failed. Updates already applied are kept.
    pub failed: Vec<(RepositoryId, ReconcileError)>,
    pub notified: bool,
}

impl AutoEnableOutcome {
    /// Number of repositories that needed a change.
    pub fn attempted(&self) -> usize {
        self.updated.len() + self.failed.len()
    }
}

/// Decides an organization's CLA group and applies it to its repositories.
#[derive(Clone)]
pub struct AutoEnableReconciler {
    repositories: Arc<dyn RepositoryStore>,
    notifier: Arc<dyn Notifier>,
}

impl AutoEnableReconciler {
    pub fn new(repositories: Arc<dyn RepositoryStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { repositories, notifier }
    }

    /// Runs one pass for `organization` over its `platform` repositories.
    /// Repositories of the same name on the other host are left alone.
    ///
    /// Fails with [`ReconcileError::AmbiguousState`] before any write when the
    /// group cannot be determined. Individual repository failures are
    /// collected in the outcome.
    #[instrument(skip_all, fields(%platform, organization = %organization.organization_name))]
    pub async fn reconcile(
        &self,
        platform: Platform,
        organization: &OrganizationRecord,
    ) -> Result<AutoEnableOutcome, ReconcileError> {
        let repositories = self
            .repositories
            .get_repositories_by_organization(platform, &organization.organization_name)
            .await?;

        let decision = determine_cla_group(organization, &repositories).map_err(|reason| {
            ReconcileError::AmbiguousState {
                organization: organization.organization_name.clone(),
                reason,
            }
        })?;
        info!(
            cla_group = %decision.cla_group_id,
            source = ?decision.source,
            repositories = repositories.len(),
            "CLA group determined"
        );

        let mut updated = Vec::new();
        let mut failed = Vec::new();
        for repository in repositories {
            let needs_group = repository.cla_group_id.as_ref() != Some(&decision.cla_group_id);
            if !needs_group && repository.enabled {
                continue;
            }
            match self.apply(&repository, &decision, needs_group).await {
                Ok(()) => {
                    updated.push(RepositoryRecord {
                        cla_group_id: Some(decision.cla_group_id.clone()),
                        enabled: true,
                        ..repository
                    });
                }
                Err(error) => {
                    warn!(
                        repository = %repository.repository_name,
                        repository_id = %repository.repository_id,
                        error = %error,
                        "repository update failed"
                    );
                    failed.push((repository.repository_id, error));
                }
            }
        }

        let notified = if updated.is_empty() {
            false
        } else {
            match self.notifier.notify_managers(&decision.cla_group_id, &updated).await {
                Ok(()) => true,
                Err(error) => {
                    warn!(cla_group = %decision.cla_group_id, error = %error, "CLA manager notification failed");
                    false
                }
            }
        };

        Ok(AutoEnableOutcome {
            decision,
            updated,
            failed,
            notified,
        })
    }

    async fn apply(
        &self,
        repository: &RepositoryRecord,
        decision: &ClaGroupDecision,
        needs_group: bool,
    ) -> Result<(), ReconcileError> {
        if needs_group {
            self.repositories
                .update_repository_cla_group(&repository.repository_id, &decision.cla_group_id)
                .await?;
        }
        if !repository.enabled {
            self.repositories
                .set_repository_enabled(&repository.repository_id, true)
                .await?;
        }
        info!(
            repository = %repository.repository_name,
            cla_group = %decision.cla_group_id,
            "repository assigned to CLA group"
        );
        Ok(())
    }
}
