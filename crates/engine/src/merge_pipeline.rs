//! The "only allow merge if the pipeline succeeds" setting on GitLab projects.

use std::sync::Arc;

use reconcile::{AccessToken, ExternalRepositoryId, MergePipelineApi, ReconcileError};
use tracing::{debug, info, instrument};

use crate::Invocation;

#[derive(Clone)]
pub struct MergePipelineReconciler {
    api: Arc<dyn MergePipelineApi>,
}

impl MergePipelineReconciler {
    pub fn new(api: Arc<dyn MergePipelineApi>) -> Self {
        Self { api }
    }

    /// Sets the project's merge-pipeline protection to `enabled`, editing
    /// the project only when the current value differs. Returns whether an
    /// edit was made.
    #[instrument(skip_all, fields(project = %project, enabled = enabled))]
    pub async fn ensure(
        &self,
        invocation: &Invocation,
        token: &AccessToken,
        project: &ExternalRepositoryId,
        enabled: bool,
    ) -> Result<bool, ReconcileError> {
        let current = invocation
            .call(self.api.get_pipeline_protection(token, project))
            .await
            .map_err(|error| ReconcileError::gateway(project, error))?;
        if current == enabled {
            debug!("merge pipeline protection already in the desired state");
            return Ok(false);
        }

        invocation
            .call(self.api.set_pipeline_protection(token, project, enabled))
            .await
            .map_err(|error| ReconcileError::gateway(project, error))?;
        info!("merge pipeline protection updated");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{token, FakeGitLab};

    #[tokio::test]
    async fn edits_only_when_the_setting_differs() {
        let gitlab = FakeGitLab::default();
        let project = ExternalRepositoryId::new("1001").expect("non-empty");
        let reconciler = MergePipelineReconciler::new(Arc::new(gitlab.clone()));
        let invocation = Invocation::unbounded();

        let first = reconciler
            .ensure(&invocation, &token(), &project, true)
            .await
            .expect("first edit");
        let second = reconciler
            .ensure(&invocation, &token(), &project, true)
            .await
            .expect("already set");

        assert!(first);
        assert!(!second);
        assert_eq!(gitlab.pipeline_edits(), 1);
        assert!(gitlab.pipeline_protection(&project));
    }
}
