//! Find-or-create reconciliation of the CLA bot webhook on GitLab projects.

use std::sync::Arc;

use reconcile::{
    find_hook, plan_webhook, AccessToken, DesiredWebhook, ExternalRepositoryId, HookId, ReconcileError, WebhookApi,
    WebhookPlan,
};
use tracing::{debug, info, instrument};

use crate::Invocation;

/// What [`WebhookReconciler::set_webhook`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Created(HookId),
    Updated(HookId),
    Unchanged(HookId),
}

impl WebhookOutcome {
    pub fn hook_id(&self) -> &HookId {
        match self {
            WebhookOutcome::Created(id) | WebhookOutcome::Updated(id) | WebhookOutcome::Unchanged(id) => id,
        }
    }
}

#[derive(Clone)]
pub struct WebhookReconciler {
    api: Arc<dyn WebhookApi>,
}

impl WebhookReconciler {
    pub fn new(api: Arc<dyn WebhookApi>) -> Self {
        Self { api }
    }

    /// Ensures exactly one hook for `url` exists on `project`, subscribed to
    /// the CLA bot's events with SSL verification on.
    ///
    /// Repeating the call converges to the same single hook.
    #[instrument(skip_all, fields(project = %project, url = %url))]
    pub async fn set_webhook(
        &self,
        invocation: &Invocation,
        token: &AccessToken,
        url: &str,
        project: &ExternalRepositoryId,
        secret_token: &str,
    ) -> Result<WebhookOutcome, ReconcileError> {
        let existing = invocation
            .call(self.api.list_hooks(token, project))
            .await
            .map_err(|error| ReconcileError::gateway(project, error))?;

        let outcome = match plan_webhook(&existing, &DesiredWebhook::cla_hook(url, secret_token)) {
            WebhookPlan::Create(settings) => {
                let id = invocation
                    .call(self.api.create_hook(token, project, &settings))
                    .await
                    .map_err(|error| ReconcileError::gateway(project, error))?;
                WebhookOutcome::Created(id)
            }
            WebhookPlan::Update { hook_id, settings } => {
                invocation
                    .call(self.api.edit_hook(token, project, &hook_id, &settings))
                    .await
                    .map_err(|error| ReconcileError::gateway(project, error))?;
                WebhookOutcome::Updated(hook_id)
            }
            WebhookPlan::Noop { hook_id } => WebhookOutcome::Unchanged(hook_id),
        };

        info!(hook_id = %outcome.hook_id(), outcome = ?outcome, "webhook reconciled");
        Ok(outcome)
    }

    /// Deletes the hook for `url` from `project`. Returns the removed hook,
    /// or `None` when there was none.
    #[instrument(skip_all, fields(project = %project, url = %url))]
    pub async fn remove_webhook(
        &self,
        invocation: &Invocation,
        token: &AccessToken,
        url: &str,
        project: &ExternalRepositoryId,
    ) -> Result<Option<HookId>, ReconcileError> {
        let existing = invocation
            .call(self.api.list_hooks(token, project))
            .await
            .map_err(|error| ReconcileError::gateway(project, error))?;

        let Some(hook) = find_hook(&existing, url) else {
            debug!("no webhook to remove");
            return Ok(None);
        };

        invocation
            .call(self.api.delete_hook(token, project, &hook.id))
            .await
            .map_err(|error| ReconcileError::gateway(project, error))?;
        info!(hook_id = %hook.id, "webhook removed");
        Ok(Some(hook.id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{token, FakeGitLab};
    use reconcile::{EventKind, WebhookRecord};

    const URL: &str = "https://cla.example.org/v2/gitlab/activity";

    fn project() -> ExternalRepositoryId {
        ExternalRepositoryId::new("1001").expect("non-empty")
    }

    #[tokio::test]
    async fn setting_a_webhook_twice_leaves_exactly_one_hook() {
        let gitlab = FakeGitLab::default();
        let reconciler = WebhookReconciler::new(Arc::new(gitlab.clone()));
        let invocation = Invocation::unbounded();

        let first = reconciler
            .set_webhook(&invocation, &token(), URL, &project(), "s3cret")
            .await
            .expect("create");
        let second = reconciler
            .set_webhook(&invocation, &token(), URL, &project(), "s3cret")
            .await
            .expect("noop");

        assert!(matches!(first, WebhookOutcome::Created(_)));
        assert_eq!(second, WebhookOutcome::Unchanged(first.hook_id().clone()));
        let hooks = gitlab.hooks(&project());
        assert_eq!(hooks.len(), 1);
        assert!(hooks[0].ssl_verification);
        assert_eq!(gitlab.secret_of(&project(), first.hook_id()).as_deref(), Some("s3cret"));
    }

    #[tokio::test]
    async fn existing_hook_gains_missing_flags_and_keeps_unknown_ones() {
        let gitlab = FakeGitLab::default();
        let pipeline = EventKind::Other("pipeline_events".to_string());
        gitlab.seed_hook(
            &project(),
            WebhookRecord {
                id: HookId::new("77").expect("non-empty"),
                url: URL.to_string(),
                events: [EventKind::Push, pipeline.clone()].into_iter().collect(),
                ssl_verification: false,
            },
        );
        let reconciler = WebhookReconciler::new(Arc::new(gitlab.clone()));

        let outcome = reconciler
            .set_webhook(&Invocation::unbounded(), &token(), URL, &project(), "s3cret")
            .await
            .expect("edit");

        assert_eq!(outcome, WebhookOutcome::Updated(HookId::new("77").expect("non-empty")));
        let hooks = gitlab.hooks(&project());
        assert_eq!(hooks.len(), 1);
        assert!(hooks[0].events.contains(&pipeline));
        assert!(hooks[0].events.contains(&EventKind::MergeRequest));
        assert!(hooks[0].events.contains(&EventKind::Note));
        assert!(hooks[0].ssl_verification);
    }

    #[tokio::test]
    async fn removing_is_idempotent() {
        let gitlab = FakeGitLab::default();
        let reconciler = WebhookReconciler::new(Arc::new(gitlab.clone()));
        let invocation = Invocation::unbounded();
        reconciler
            .set_webhook(&invocation, &token(), URL, &project(), "s3cret")
            .await
            .expect("create");

        let removed = reconciler
            .remove_webhook(&invocation, &token(), URL, &project())
            .await
            .expect("delete");
        let again = reconciler
            .remove_webhook(&invocation, &token(), URL, &project())
            .await
            .expect("nothing to delete");

        assert!(removed.is_some());
        assert_eq!(again, None);
        assert!(gitlab.hooks(&project()).is_empty());
    }
}
