//! Hand-written fakes of the port traits and record builders shared by the
//! engine's tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reconcile::{
    AccessToken, AttributeMap, AttributeValue, AuthError, AuthProvider, BranchProtectionApi, BranchProtectionRule,
    ChangeEvent, ClaGroupId, EventId, ExternalRepositoryId, GatewayError, HookId, HookSettings, MergePipelineApi,
    Notifier, NotifyError, Operation, OrganizationId, OrganizationName, OrganizationRecord, Platform, ProjectSfid,
    ProtectionState, RepositoryId, RepositoryNodeId, RepositoryRecord, RepositoryStore, RuleId, RuleSettings,
    StoreError, TableName, WebhookApi, WebhookRecord,
};

// ============================================================================
// Builders
// ============================================================================

pub fn token() -> AccessToken {
    AccessToken::new("test-token").expect("non-empty")
}

/// An event with empty images, for routing tests.
pub fn change_event(id: &str, table: &str, operation: Operation) -> ChangeEvent {
    ChangeEvent {
        event_id: EventId::new(id).expect("non-empty"),
        table: TableName::new(table).expect("non-empty"),
        operation,
        before: None,
        after: None,
        approximate_creation: None,
    }
}

pub fn organization(name: &str) -> OrganizationRecord {
    OrganizationRecord {
        organization_id: OrganizationId::new(name).expect("non-empty"),
        organization_name: OrganizationName::new(name).expect("non-empty"),
        installation_or_auth_token: Some("12345".to_string()),
        project_sfid: ProjectSfid::new("P1"),
        auto_enabled: false,
        auto_enabled_cla_group_id: None,
        branch_protection_enabled: false,
    }
}

/// A GitHub repository `r-<n>` named `<org>/repo-<n>`.
pub fn repository(n: u32, org: &str, cla_group: Option<&str>, enabled: bool) -> RepositoryRecord {
    RepositoryRecord {
        repository_id: RepositoryId::new(format!("r-{n}")).expect("non-empty"),
        external_id: ExternalRepositoryId::new(n.to_string()).expect("non-empty"),
        repository_name: format!("{org}/repo-{n}"),
        organization_name: OrganizationName::new(org).expect("non-empty"),
        cla_group_id: cla_group.and_then(ClaGroupId::new),
        project_sfid: ProjectSfid::new("P1"),
        enabled,
        repository_type: Platform::GitHub,
        archived: false,
    }
}

/// An enabled GitHub repository in CLA group `G1`.
pub fn github_repository(n: u32, org: &str) -> RepositoryRecord {
    repository(n, org, Some("G1"), true)
}

pub fn gitlab_repository(n: u32, group: &str, enabled: bool) -> RepositoryRecord {
    RepositoryRecord {
        repository_type: Platform::GitLab,
        ..repository(n, group, Some("G1"), enabled)
    }
}

fn string(value: &str) -> AttributeValue {
    AttributeValue::String(value.to_string())
}

fn optional(image: &mut AttributeMap, field: &str, value: Option<&str>) {
    if let Some(value) = value {
        image.insert(field.to_string(), string(value));
    }
}

pub fn organization_image(org: &OrganizationRecord) -> AttributeMap {
    let mut image = BTreeMap::new();
    image.insert("organization_name".to_string(), string(org.organization_name.as_str()));
    image.insert("organization_id".to_string(), string(org.organization_id.as_str()));
    optional(
        &mut image,
        "organization_installation_id",
        org.installation_or_auth_token.as_deref(),
    );
    optional(&mut image, "project_sfid", org.project_sfid.as_ref().map(ProjectSfid::as_str));
    optional(
        &mut image,
        "auto_enabled_cla_group_id",
        org.auto_enabled_cla_group_id.as_ref().map(ClaGroupId::as_str),
    );
    image.insert("auto_enabled".to_string(), AttributeValue::Bool(org.auto_enabled));
    image.insert(
        "branch_protection_enabled".to_string(),
        AttributeValue::Bool(org.branch_protection_enabled),
    );
    image
}

pub fn repository_image(repo: &RepositoryRecord) -> AttributeMap {
    let mut image = BTreeMap::new();
    image.insert("repository_id".to_string(), string(repo.repository_id.as_str()));
    image.insert(
        "repository_external_id".to_string(),
        AttributeValue::Number(repo.external_id.to_string()),
    );
    image.insert("repository_name".to_string(), string(&repo.repository_name));
    image.insert(
        "repository_organization_name".to_string(),
        string(repo.organization_name.as_str()),
    );
    optional(
        &mut image,
        "repository_cla_group_id",
        repo.cla_group_id.as_ref().map(ClaGroupId::as_str),
    );
    optional(&mut image, "project_sfid", repo.project_sfid.as_ref().map(ProjectSfid::as_str));
    image.insert("enabled".to_string(), AttributeValue::Bool(repo.enabled));
    image.insert("repository_type".to_string(), string(repo.repository_type.as_str()));
    image.insert("archived".to_string(), AttributeValue::Bool(repo.archived));
    image
}

pub fn organization_event(
    id: &str,
    table: &str,
    operation: Operation,
    before: Option<&OrganizationRecord>,
    after: Option<&OrganizationRecord>,
) -> ChangeEvent {
    ChangeEvent {
        before: before.map(organization_image),
        after: after.map(organization_image),
        ..change_event(id, table, operation)
    }
}

pub fn repository_event(
    id: &str,
    table: &str,
    operation: Operation,
    before: Option<&RepositoryRecord>,
    after: Option<&RepositoryRecord>,
) -> ChangeEvent {
    ChangeEvent {
        before: before.map(repository_image),
        after: after.map(repository_image),
        ..change_event(id, table, operation)
    }
}

// ============================================================================
// GitHub branch protection
// ============================================================================

#[derive(Default)]
struct ProtectionHost {
    /// Rules keyed by `owner/name`.
    rules: HashMap<String, Vec<BranchProtectionRule>>,
    creates: Vec<(RepositoryNodeId, RuleSettings)>,
    updates: Vec<(RuleId, RuleSettings)>,
    failing_fetch: HashSet<String>,
    missing: HashSet<String>,
    no_default_branch: bool,
    fetches: usize,
}

/// An in-memory branch-protection host. Repository node ids are
/// `node:<owner>/<name>`; created rules are visible to later fetches.
#[derive(Clone, Default)]
pub struct FakeBranchProtection {
    host: Arc<Mutex<ProtectionHost>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    delay: Duration,
}

impl FakeBranchProtection {
    /// Makes every fetch take `delay`, so concurrent workers overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_rule(self, full_name: &str, rule: BranchProtectionRule) -> Self {
        self.lock().rules.entry(full_name.to_string()).or_default().push(rule);
        self
    }

    /// Fetches for `full_name` fail with a 502.
    pub fn failing_fetch(self, full_name: &str) -> Self {
        self.lock().failing_fetch.insert(full_name.to_string());
        self
    }

    /// Fetches for `full_name` report the repository as gone.
    pub fn missing(self, full_name: &str) -> Self {
        self.lock().missing.insert(full_name.to_string());
        self
    }

    pub fn without_default_branch(self) -> Self {
        self.lock().no_default_branch = true;
        self
    }

    pub fn creates(&self) -> Vec<(RepositoryNodeId, RuleSettings)> {
        self.lock().creates.clone()
    }

    pub fn updates(&self) -> Vec<(RuleId, RuleSettings)> {
        self.lock().updates.clone()
    }

    pub fn mutations(&self) -> usize {
        let host = self.lock();
        host.creates.len() + host.updates.len()
    }

    pub fn fetches(&self) -> usize {
        self.lock().fetches
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProtectionHost> {
        self.host.lock().expect("fake host lock")
    }
}

fn rule_from(id: RuleId, settings: &RuleSettings) -> BranchProtectionRule {
    BranchProtectionRule {
        id,
        pattern: settings.pattern.clone(),
        required_status_check_contexts: settings.required_status_check_contexts.clone(),
        requires_status_checks: settings.requires_status_checks,
        is_admin_enforced: settings.is_admin_enforced,
        allows_deletions: settings.allows_deletions,
        allows_force_pushes: settings.allows_force_pushes,
    }
}

#[async_trait]
impl BranchProtectionApi for FakeBranchProtection {
    async fn fetch_protection(
        &self,
        _token: &AccessToken,
        owner: &str,
        repository: &str,
    ) -> Result<ProtectionState, GatewayError> {
        let full_name = format!("{owner}/{repository}");
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut host = self.lock();
        host.fetches += 1;
        if host.missing.contains(&full_name) {
            return Err(GatewayError::NotFound { what: full_name });
        }
        if host.failing_fetch.contains(&full_name) {
            return Err(GatewayError::Api {
                status: 502,
                message: "bad gateway".to_string(),
            });
        }
        Ok(ProtectionState {
            repository_node_id: RepositoryNodeId::new(format!("node:{full_name}")).expect("non-empty"),
            default_branch: (!host.no_default_branch).then(|| "main".to_string()),
            rules: host.rules.get(&full_name).cloned().unwrap_or_default(),
        })
    }

    async fn create_rule(
        &self,
        _token: &AccessToken,
        repository: &RepositoryNodeId,
        settings: &RuleSettings,
    ) -> Result<RuleId, GatewayError> {
        let full_name = repository.as_str().trim_start_matches("node:").to_string();
        let id = RuleId::new(format!("rule:{full_name}")).expect("non-empty");
        let mut host = self.lock();
        host.creates.push((repository.clone(), settings.clone()));
        host.rules
            .entry(full_name)
            .or_default()
            .push(rule_from(id.clone(), settings));
        Ok(id)
    }

    async fn update_rule(&self, _token: &AccessToken, rule: &RuleId, settings: &RuleSettings) -> Result<(), GatewayError> {
        let mut host = self.lock();
        host.updates.push((rule.clone(), settings.clone()));
        for existing in host.rules.values_mut().flatten() {
            if existing.id == *rule {
                *existing = rule_from(rule.clone(), settings);
            }
        }
        Ok(())
    }
}

// ============================================================================
// GitLab
// ============================================================================

#[derive(Default)]
struct GitLabHost {
    hooks: HashMap<ExternalRepositoryId, Vec<(WebhookRecord, String)>>,
    next_hook: u64,
    list_calls: usize,
    pipeline: HashMap<ExternalRepositoryId, bool>,
    pipeline_edits: usize,
}

/// An in-memory GitLab: project hooks (with their secrets) and the
/// merge-pipeline setting.
#[derive(Clone, Default)]
pub struct FakeGitLab {
    host: Arc<Mutex<GitLabHost>>,
}

impl FakeGitLab {
    fn lock(&self) -> std::sync::MutexGuard<'_, GitLabHost> {
        self.host.lock().expect("fake host lock")
    }

    pub fn seed_hook(&self, project: &ExternalRepositoryId, hook: WebhookRecord) {
        self.lock()
            .hooks
            .entry(project.clone())
            .or_default()
            .push((hook, String::new()));
    }

    pub fn hooks(&self, project: &ExternalRepositoryId) -> Vec<WebhookRecord> {
        self.lock()
            .hooks
            .get(project)
            .map(|hooks| hooks.iter().map(|(hook, _)| hook.clone()).collect())
            .unwrap_or_default()
    }

    pub fn secret_of(&self, project: &ExternalRepositoryId, id: &HookId) -> Option<String> {
        self.lock()
            .hooks
            .get(project)?
            .iter()
            .find(|(hook, _)| hook.id == *id)
            .map(|(_, secret)| secret.clone())
    }

    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    pub fn pipeline_protection(&self, project: &ExternalRepositoryId) -> bool {
        self.lock().pipeline.get(project).copied().unwrap_or(false)
    }

    pub fn pipeline_edits(&self) -> usize {
        self.lock().pipeline_edits
    }
}

fn record_from(id: HookId, settings: &HookSettings) -> WebhookRecord {
    WebhookRecord {
        id,
        url: settings.url.clone(),
        events: settings.events.clone(),
        ssl_verification: settings.ssl_verification,
    }
}

#[async_trait]
impl WebhookApi for FakeGitLab {
    async fn list_hooks(
        &self,
        _token: &AccessToken,
        project: &ExternalRepositoryId,
    ) -> Result<Vec<WebhookRecord>, GatewayError> {
        self.lock().list_calls += 1;
        Ok(self.hooks(project))
    }

    async fn create_hook(
        &self,
        _token: &AccessToken,
        project: &ExternalRepositoryId,
        settings: &HookSettings,
    ) -> Result<HookId, GatewayError> {
        let mut host = self.lock();
        host.next_hook += 1;
        let id = HookId::new(host.next_hook.to_string()).expect("non-empty");
        host.hooks
            .entry(project.clone())
            .or_default()
            .push((record_from(id.clone(), settings), settings.secret_token.clone()));
        Ok(id)
    }

    async fn edit_hook(
        &self,
        _token: &AccessToken,
        project: &ExternalRepositoryId,
        hook: &HookId,
        settings: &HookSettings,
    ) -> Result<(), GatewayError> {
        let mut host = self.lock();
        let entry = host
            .hooks
            .get_mut(project)
            .and_then(|hooks| hooks.iter_mut().find(|(existing, _)| existing.id == *hook))
            .ok_or_else(|| GatewayError::NotFound {
                what: format!("hook {hook}"),
            })?;
        *entry = (record_from(hook.clone(), settings), settings.secret_token.clone());
        Ok(())
    }

    async fn delete_hook(
        &self,
        _token: &AccessToken,
        project: &ExternalRepositoryId,
        hook: &HookId,
    ) -> Result<(), GatewayError> {
        let mut host = self.lock();
        let hooks = host.hooks.entry(project.clone()).or_default();
        let before = hooks.len();
        hooks.retain(|(existing, _)| existing.id != *hook);
        if hooks.len() == before {
            return Err(GatewayError::NotFound {
                what: format!("hook {hook}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MergePipelineApi for FakeGitLab {
    async fn get_pipeline_protection(
        &self,
        _token: &AccessToken,
        project: &ExternalRepositoryId,
    ) -> Result<bool, GatewayError> {
        Ok(self.pipeline_protection(project))
    }

    async fn set_pipeline_protection(
        &self,
        _token: &AccessToken,
        project: &ExternalRepositoryId,
        enabled: bool,
    ) -> Result<(), GatewayError> {
        let mut host = self.lock();
        host.pipeline_edits += 1;
        host.pipeline.insert(project.clone(), enabled);
        Ok(())
    }
}

// ============================================================================
// Notification, auth and persistence
// ============================================================================

#[derive(Default)]
pub struct FakeNotifier {
    sent: Mutex<Vec<(ClaGroupId, Vec<RepositoryRecord>)>>,
    fail: bool,
}

impl FakeNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(ClaGroupId, Vec<RepositoryRecord>)> {
        self.sent.lock().expect("notifier lock").clone()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn notify_managers(&self, cla_group: &ClaGroupId, affected: &[RepositoryRecord]) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError {
                message: "mail relay unavailable".to_string(),
            });
        }
        self.sent
            .lock()
            .expect("notifier lock")
            .push((cla_group.clone(), affected.to_vec()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeAuth {
    refreshes: AtomicUsize,
    fail: bool,
}

impl FakeAuth {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthProvider for FakeAuth {
    async fn refresh_organization_auth(&self, organization: &OrganizationRecord) -> Result<AccessToken, AuthError> {
        if self.fail {
            return Err(AuthError::MissingCredentials {
                organization: organization.organization_name.clone(),
            });
        }
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(token())
    }
}

/// Delegates to `inner` except that every write to one repository fails.
pub struct FailingRepositoryStore {
    inner: Arc<dyn RepositoryStore>,
    failing: RepositoryId,
}

impl FailingRepositoryStore {
    pub fn new(inner: Arc<dyn RepositoryStore>, failing: &str) -> Self {
        Self {
            inner,
            failing: RepositoryId::new(failing).expect("non-empty"),
        }
    }

    fn check(&self, repository: &RepositoryId) -> Result<(), StoreError> {
        if *repository == self.failing {
            Err(StoreError::Backend {
                message: format!("write to {repository} rejected"),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RepositoryStore for FailingRepositoryStore {
    async fn get_repositories_by_organization(
        &self,
        platform: Platform,
        organization: &OrganizationName,
    ) -> Result<Vec<RepositoryRecord>, StoreError> {
        self.inner.get_repositories_by_organization(platform, organization).await
    }

    async fn update_repository_cla_group(
        &self,
        repository: &RepositoryId,
        cla_group: &ClaGroupId,
    ) -> Result<(), StoreError> {
        self.check(repository)?;
        self.inner.update_repository_cla_group(repository, cla_group).await
    }

    async fn set_repository_enabled(&self, repository: &RepositoryId, enabled: bool) -> Result<(), StoreError> {
        self.check(repository)?;
        self.inner.set_repository_enabled(repository, enabled).await
    }
}
