//! In-memory organization and repository records.

use async_trait::async_trait;
use reconcile::{
    ClaGroupId, OrganizationName, OrganizationRecord, OrganizationStore, Platform, RepositoryId, RepositoryRecord,
    RepositoryStore, StoreError,
};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::snapshot::Snapshot;

#[derive(Debug, Default)]
struct Records {
    github_organizations: Vec<OrganizationRecord>,
    gitlab_organizations: Vec<OrganizationRecord>,
    repositories: Vec<RepositoryRecord>,
}

impl Records {
    fn organizations(&self, platform: Platform) -> &Vec<OrganizationRecord> {
        match platform {
            Platform::GitHub => &self.github_organizations,
            Platform::GitLab => &self.gitlab_organizations,
        }
    }

    fn organizations_mut(&mut self, platform: Platform) -> &mut Vec<OrganizationRecord> {
        match platform {
            Platform::GitHub => &mut self.github_organizations,
            Platform::GitLab => &mut self.gitlab_organizations,
        }
    }

    fn repository_mut(&mut self, id: &RepositoryId) -> Result<&mut RepositoryRecord, StoreError> {
        self.repositories
            .iter_mut()
            .find(|repo| repo.repository_id == *id)
            .ok_or_else(|| StoreError::NotFound {
                what: format!("repository {id}"),
            })
    }
}

/// Organization names are matched case-insensitively, as the code hosts do.
fn same_name(a: &OrganizationName, b: &OrganizationName) -> bool {
    a.as_str().eq_ignore_ascii_case(b.as_str())
}

/// Records behind an async read/write lock. Writes replace records in place.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Records>,
}

impl MemoryStore {
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        info!(
            github_organizations = snapshot.github_organizations.len(),
            gitlab_organizations = snapshot.gitlab_organizations.len(),
            repositories = snapshot.repositories.len(),
            "loaded store snapshot"
        );
        Self {
            records: RwLock::new(Records {
                github_organizations: snapshot.github_organizations,
                gitlab_organizations: snapshot.gitlab_organizations,
                repositories: snapshot.repositories,
            }),
        }
    }

    /// Adds or replaces the organization with the same name.
    pub async fn insert_organization(&self, platform: Platform, organization: OrganizationRecord) {
        let mut records = self.records.write().await;
        let organizations = records.organizations_mut(platform);
        organizations.retain(|existing| !same_name(&existing.organization_name, &organization.organization_name));
        organizations.push(organization);
    }

    /// Adds or replaces the repository with the same id.
    pub async fn insert_repository(&self, repository: RepositoryRecord) {
        let mut records = self.records.write().await;
        records
            .repositories
            .retain(|existing| existing.repository_id != repository.repository_id);
        records.repositories.push(repository);
    }

    /// Copies the current records out, in insertion order.
    pub async fn snapshot(&self) -> Snapshot {
        let records = self.records.read().await;
        Snapshot {
            github_organizations: records.github_organizations.clone(),
            gitlab_organizations: records.gitlab_organizations.clone(),
            repositories: records.repositories.clone(),
        }
    }
}

#[async_trait]
impl OrganizationStore for MemoryStore {
    async fn get_organization_by_name(
        &self,
        platform: Platform,
        name: &OrganizationName,
    ) -> Result<OrganizationRecord, StoreError> {
        self.records
            .read()
            .await
            .organizations(platform)
            .iter()
            .find(|org| same_name(&org.organization_name, name))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                what: format!("{platform} organization {name}"),
            })
    }
}

#[async_trait]
impl RepositoryStore for MemoryStore {
    async fn get_repositories_by_organization(
        &self,
        platform: Platform,
        organization: &OrganizationName,
    ) -> Result<Vec<RepositoryRecord>, StoreError> {
        let repositories: Vec<RepositoryRecord> = self
            .records
            .read()
            .await
            .repositories
            .iter()
            .filter(|repo| repo.repository_type == platform && same_name(&repo.organization_name, organization))
            .cloned()
            .collect();
        debug!(%platform, organization = %organization, count = repositories.len(), "listed repositories");
        Ok(repositories)
    }

    async fn update_repository_cla_group(
        &self,
        repository: &RepositoryId,
        cla_group: &ClaGroupId,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        records.repository_mut(repository)?.cla_group_id = Some(cla_group.clone());
        Ok(())
    }

    async fn set_repository_enabled(&self, repository: &RepositoryId, enabled: bool) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        records.repository_mut(repository)?.enabled = enabled;
        Ok(())
    }
}
