//! A [`Notifier`] that records CLA-manager notices in the log.

use async_trait::async_trait;
use reconcile::{ClaGroupId, Notifier, NotifyError, RepositoryRecord};
use tracing::info;

/// Emits one structured log event per notice instead of sending mail.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_managers(&self, cla_group: &ClaGroupId, affected: &[RepositoryRecord]) -> Result<(), NotifyError> {
        let repositories: Vec<&str> = affected.iter().map(|repo| repo.repository_name.as_str()).collect();
        info!(
            cla_group = %cla_group,
            count = affected.len(),
            repositories = ?repositories,
            "notifying CLA managers of auto-enabled repositories"
        );
        Ok(())
    }
}
