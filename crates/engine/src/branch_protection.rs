//! Branch-protection reconciliation for one repository and for a whole
//! organization.
//!
//! A single repository pass fetches the protection state, plans a
//! create/update/noop with [`plan_protection`] and applies it in one
//! mutation. The organization fan-out runs those passes on a bounded pool of
//! workers and waits for all of them; successful repositories are kept even
//! when others fail.

use std::sync::Arc;

use reconcile::{
    plan_protection, AccessToken, BranchProtectionApi, DecodeError, Platform, ProtectionPlan, ProtectionRequest,
    ProtectionState, ReconcileError, RepositoryRecord, RuleId,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn, Instrument};

use crate::settings::BranchProtectionSettings;
use crate::Invocation;

/// The result of reconciling one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionOutcome {
    /// `owner/name` of the repository.
    pub repository: String,
    /// `"create"`, `"update"` or `"noop"`.
    pub plan: &'static str,
    pub rule_id: RuleId,
}

/// The result of an organization fan-out.
#[derive(Debug, Default)]
pub struct FanOutReport {
    /// Repositories handed to a worker (or refused one because of the deadline).
    pub attempted: usize,
    /// Archived and non-GitHub repositories.
    pub skipped: usize,
    pub succeeded: Vec<ProtectionOutcome>,
    /// Failures in completion order, keyed by repository name.
    pub failed: Vec<(String, ReconcileError)>,
}

impl FanOutReport {
    /// Surfaces the first failure, if any. Real failures take precedence
    /// over benign ones.
    pub fn into_result(self) -> Result<(), ReconcileError> {
        let mut benign = None;
        for (_, error) in self.failed {
            if !error.is_benign() {
                return Err(error);
            }
            benign.get_or_insert(error);
        }
        benign.map_or(Ok(()), Err)
    }
}

#[derive(Clone)]
pub struct BranchProtectionReconciler {
    api: Arc<dyn BranchProtectionApi>,
    settings: Arc<BranchProtectionSettings>,
}

impl BranchProtectionReconciler {
    pub fn new(api: Arc<dyn BranchProtectionApi>, settings: BranchProtectionSettings) -> Self {
        Self {
            api,
            settings: Arc::new(settings),
        }
    }

    /// Ensures `request.branch_pattern` is protected with the requested
    /// status-check contexts.
    ///
    /// A fetch failure aborts before any mutation.
    #[instrument(skip_all, fields(repository = %request.full_name(), pattern = %request.branch_pattern))]
    pub async fn enable_branch_protection(
        &self,
        invocation: &Invocation,
        token: &AccessToken,
        request: &ProtectionRequest,
    ) -> Result<ProtectionOutcome, ReconcileError> {
        let state = self.fetch(invocation, token, &request.owner, &request.repository).await?;
        self.apply(invocation, token, &state, request).await
    }

    /// Protects `repository`'s default branch with the configured contexts.
    #[instrument(skip_all, fields(repository = %repository.repository_name))]
    pub async fn protect_repository(
        &self,
        invocation: &Invocation,
        token: &AccessToken,
        repository: &RepositoryRecord,
    ) -> Result<ProtectionOutcome, ReconcileError> {
        let (owner, name) = repository
            .owner_and_name()
            .ok_or_else(|| DecodeError::invalid("repository_name", "expected 'owner/name'"))?;

        let state = self.fetch(invocation, token, owner, name).await?;
        let branch = state
            .default_branch
            .clone()
            .unwrap_or_else(|| self.settings.fallback_branch.clone());
        let request = self.request_for(owner, name, branch);

        self.apply(invocation, token, &state, &request).await
    }

    /// Protects every eligible repository, at most `max_workers` at a time.
    ///
    /// Archived and non-GitHub repositories are skipped. Once the deadline
    /// has passed no further worker is started.
    #[instrument(skip_all, fields(repositories = repositories.len()))]
    pub async fn protect_repositories(
        &self,
        invocation: &Invocation,
        token: &AccessToken,
        repositories: Vec<RepositoryRecord>,
    ) -> FanOutReport {
        let permits = Arc::new(Semaphore::new(self.settings.max_workers.max(1)));
        let mut workers = JoinSet::new();
        let mut report = FanOutReport::default();

        for repository in repositories {
            if repository.archived || repository.repository_type != Platform::GitHub {
                debug!(repository = %repository.repository_name, "skipping repository");
                report.skipped += 1;
                continue;
            }
            report.attempted += 1;

            let permit = match Arc::clone(&permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(closed) => {
                    report.failed.push((
                        repository.repository_name,
                        ReconcileError::Worker {
                            message: closed.to_string(),
                        },
                    ));
                    continue;
                }
            };
            if invocation.is_expired() {
                report.failed.push((repository.repository_name, ReconcileError::Cancelled));
                continue;
            }

            let reconciler = self.clone();
            let invocation = *invocation;
            let token = token.clone();
            workers.spawn(
                async move {
                    let _permit = permit;
                    let result = reconciler.protect_repository(&invocation, &token, &repository).await;
                    (repository.repository_name, result)
                }
                .in_current_span(),
            );
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((_, Ok(outcome))) => report.succeeded.push(outcome),
                Ok((repository, Err(error))) => {
                    warn!(repository = %repository, error = %error, "branch protection failed");
                    report.failed.push((repository, error));
                }
                Err(join_error) => report.failed.push((
                    "<unknown>".to_string(),
                    ReconcileError::Worker {
                        message: join_error.to_string(),
                    },
                )),
            }
        }

        info!(
            attempted = report.attempted,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            skipped = report.skipped,
            "branch protection fan-out finished"
        );
        report
    }

    fn request_for(&self, owner: &str, repository: &str, branch_pattern: String) -> ProtectionRequest {
        ProtectionRequest {
            owner: owner.to_string(),
            repository: repository.to_string(),
            branch_pattern,
            enforce_admin: self.settings.enforce_admin,
            enable_contexts: self.settings.required_checks.clone(),
            disable_contexts: self.settings.disabled_checks.clone(),
        }
    }

    async fn fetch(
        &self,
        invocation: &Invocation,
        token: &AccessToken,
        owner: &str,
        repository: &str,
    ) -> Result<ProtectionState, ReconcileError> {
        invocation
            .call(self.api.fetch_protection(token, owner, repository))
            .await
            .map_err(|error| ReconcileError::gateway(format!("{owner}/{repository}"), error))
    }

    async fn apply(
        &self,
        invocation: &Invocation,
        token: &AccessToken,
        state: &ProtectionState,
        request: &ProtectionRequest,
    ) -> Result<ProtectionOutcome, ReconcileError> {
        let target = request.full_name();
        let plan = plan_protection(state, request);
        let kind = plan.kind();

        let rule_id = match plan {
            ProtectionPlan::Create {
                repository_node_id,
                settings,
            } => invocation
                .call(self.api.create_rule(token, &repository_node_id, &settings))
                .await
                .map_err(|error| ReconcileError::gateway(&target, error))?,
            ProtectionPlan::Update { rule_id, settings } => {
                invocation
                    .call(self.api.update_rule(token, &rule_id, &settings))
                    .await
                    .map_err(|error| ReconcileError::gateway(&target, error))?;
                rule_id
            }
            ProtectionPlan::Noop { rule_id } => rule_id,
        };

        info!(repository = %target, plan = kind, rule_id = %rule_id, "branch protection reconciled");
        Ok(ProtectionOutcome {
            repository: target,
            plan: kind,
            rule_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::{github_repository, token, FakeBranchProtection};
    use reconcile::{BranchProtectionRule, GatewayError};

    fn reconciler(api: &FakeBranchProtection) -> BranchProtectionReconciler {
        BranchProtectionReconciler::new(Arc::new(api.clone()), BranchProtectionSettings::default())
    }

    fn request(enable: &[&str], disable: &[&str]) -> ProtectionRequest {
        ProtectionRequest {
            owner: "acme".to_string(),
            repository: "widgets".to_string(),
            branch_pattern: "main".to_string(),
            enforce_admin: true,
            enable_contexts: enable.iter().map(|s| s.to_string()).collect(),
            disable_contexts: disable.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn existing_rule(contexts: &[&str]) -> BranchProtectionRule {
        BranchProtectionRule {
            id: RuleId::new("rule-9").expect("non-empty"),
            pattern: "main".to_string(),
            required_status_check_contexts: contexts.iter().map(|s| s.to_string()).collect(),
            requires_status_checks: true,
            is_admin_enforced: true,
            allows_deletions: false,
            allows_force_pushes: false,
        }
    }

    #[tokio::test]
    async fn creates_a_rule_when_none_matches() {
        let api = FakeBranchProtection::default();

        let outcome = reconciler(&api)
            .enable_branch_protection(&Invocation::unbounded(), &token(), &request(&["EasyCLA"], &[]))
            .await
            .expect("create succeeds");

        assert_eq!(outcome.plan, "create");
        let creates = api.creates();
        assert_eq!(creates.len(), 1);
        assert_eq!(creates[0].0.as_str(), "node:acme/widgets");
        assert_eq!(creates[0].1.required_status_check_contexts, vec!["EasyCLA".to_string()]);
        assert!(!creates[0].1.allows_deletions);
        assert!(!creates[0].1.allows_force_pushes);
    }

    #[tokio::test]
    async fn updates_the_matching_rule_with_merged_contexts() {
        let api = FakeBranchProtection::default().with_rule("acme/widgets", existing_rule(&["travis-ci", "DCO", "EasyCLA"]));

        let outcome = reconciler(&api)
            .enable_branch_protection(&Invocation::unbounded(), &token(), &request(&["CodeQL"], &["DCO"]))
            .await
            .expect("update succeeds");

        assert_eq!(outcome.plan, "update");
        assert_eq!(outcome.rule_id.as_str(), "rule-9");
        let updates = api.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(
            updates[0].1.required_status_check_contexts,
            vec!["travis-ci".to_string(), "EasyCLA".to_string(), "CodeQL".to_string()]
        );
        assert!(api.creates().is_empty());
    }

    #[tokio::test]
    async fn satisfied_rule_issues_no_mutation() {
        let api = FakeBranchProtection::default().with_rule("acme/widgets", existing_rule(&["EasyCLA"]));

        let outcome = reconciler(&api)
            .enable_branch_protection(&Invocation::unbounded(), &token(), &request(&["EasyCLA"], &[]))
            .await
            .expect("noop");

        assert_eq!(outcome.plan, "noop");
        assert_eq!(api.mutations(), 0);
    }

    #[tokio::test]
    async fn fetch_failure_aborts_without_mutation() {
        let api = FakeBranchProtection::default().failing_fetch("acme/widgets");

        let err = reconciler(&api)
            .enable_branch_protection(&Invocation::unbounded(), &token(), &request(&["EasyCLA"], &[]))
            .await
            .expect_err("fetch fails");

        assert!(matches!(
            err,
            ReconcileError::Gateway {
                source: GatewayError::Api { status: 502, .. },
                ..
            }
        ));
        assert_eq!(api.mutations(), 0);
    }

    #[tokio::test]
    async fn fan_out_is_bounded_and_touches_each_repository_once() {
        let api = FakeBranchProtection::default().with_delay(Duration::from_millis(20));
        let repositories: Vec<_> = (0..12).map(|n| github_repository(n, "acme")).collect();

        let report = reconciler(&api)
            .protect_repositories(&Invocation::unbounded(), &token(), repositories)
            .await;

        assert_eq!(report.attempted, 12);
        assert_eq!(report.succeeded.len(), 12);
        assert!(report.failed.is_empty());
        assert_eq!(api.mutations(), 12);
        assert!(api.max_in_flight() <= 5, "max in flight was {}", api.max_in_flight());
        assert!(api.max_in_flight() > 1);

        let mut nodes: Vec<String> = api.creates().into_iter().map(|(node, _)| node.to_string()).collect();
        nodes.sort();
        nodes.dedup();
        assert_eq!(nodes.len(), 12);
    }

    #[tokio::test]
    async fn fan_out_keeps_successes_and_surfaces_a_failure() {
        let api = FakeBranchProtection::default().failing_fetch("acme/repo-1");
        let repositories: Vec<_> = (0..3).map(|n| github_repository(n, "acme")).collect();

        let report = reconciler(&api)
            .protect_repositories(&Invocation::unbounded(), &token(), repositories)
            .await;

        assert_eq!(report.succeeded.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "acme/repo-1");
        assert_eq!(api.mutations(), 2);
        assert!(report.into_result().is_err());
    }

    #[tokio::test]
    async fn real_failure_outranks_a_missing_repository() {
        let api = FakeBranchProtection::default()
            .missing("acme/repo-0")
            .failing_fetch("acme/repo-1")
            .with_delay(Duration::from_millis(10));
        let repositories: Vec<_> = (0..3).map(|n| github_repository(n, "acme")).collect();

        let report = reconciler(&api)
            .protect_repositories(&Invocation::unbounded(), &token(), repositories)
            .await;
        assert_eq!(report.failed.len(), 2);

        let error = report.into_result().expect_err("host failure surfaces");
        assert!(!error.is_benign());
        assert!(matches!(
            error,
            ReconcileError::Gateway {
                source: GatewayError::Api { status: 502, .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn only_missing_repositories_stay_benign() {
        let api = FakeBranchProtection::default().missing("acme/repo-0");
        let report = reconciler(&api)
            .protect_repositories(&Invocation::unbounded(), &token(), vec![github_repository(0, "acme")])
            .await;

        let error = report.into_result().expect_err("not found surfaces");
        assert!(error.is_benign());
    }

    #[tokio::test]
    async fn fan_out_skips_archived_and_gitlab_repositories() {
        let api = FakeBranchProtection::default();
        let mut archived = github_repository(1, "acme");
        archived.archived = true;
        let mut gitlab = github_repository(2, "acme");
        gitlab.repository_type = Platform::GitLab;

        let report = reconciler(&api)
            .protect_repositories(
                &Invocation::unbounded(),
                &token(),
                vec![archived, gitlab, github_repository(3, "acme")],
            )
            .await;

        assert_eq!(report.skipped, 2);
        assert_eq!(report.attempted, 1);
        assert_eq!(api.fetches(), 1);
    }

    #[tokio::test]
    async fn expired_invocation_starts_no_workers() {
        let api = FakeBranchProtection::default();
        let repositories: Vec<_> = (0..3).map(|n| github_repository(n, "acme")).collect();

        let report = reconciler(&api)
            .protect_repositories(&Invocation::with_timeout(Duration::ZERO), &token(), repositories)
            .await;

        assert_eq!(report.failed.len(), 3);
        assert!(report
            .failed
            .iter()
            .all(|(_, error)| matches!(error, ReconcileError::Cancelled)));
        assert_eq!(api.fetches(), 0);
    }

    #[tokio::test]
    async fn repository_without_default_branch_uses_the_fallback() {
        let api = FakeBranchProtection::default().without_default_branch();

        let outcome = reconciler(&api)
            .protect_repository(&Invocation::unbounded(), &token(), &github_repository(1, "acme"))
            .await
            .expect("create");

        assert_eq!(outcome.plan, "create");
        assert_eq!(api.creates()[0].1.pattern, "main");
    }
}
