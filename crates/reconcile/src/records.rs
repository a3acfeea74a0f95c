//! Organization and repository snapshots read from change images and from
//! the persistence layer.
//!
//! Both records are owned by the persistence layer. The engine only reads
//! them and requests field-level updates through [`crate::RepositoryStore`].

use serde::{Deserialize, Serialize};

use crate::decode::{DecodeError, FromImage, ImageReader};
use crate::{ClaGroupId, ExternalRepositoryId, OrganizationId, OrganizationName, ProjectSfid, RepositoryId};

/// The code host an organization or repository lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    GitHub,
    GitLab,
}

impl Platform {
    /// Returns the stored name of the platform (`"github"` / `"gitlab"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::GitHub => "github",
            Platform::GitLab => "gitlab",
        }
    }

    /// Parses a stored platform name, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("github") {
            Some(Platform::GitHub)
        } else if value.eq_ignore_ascii_case("gitlab") {
            Some(Platform::GitLab)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Organizations
// ---------------------------------------------------------------------------

/// A GitHub organization or GitLab group registered for CLA enforcement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationRecord {
    pub organization_id: OrganizationId,
    pub organization_name: OrganizationName,
    /// GitHub App installation id, or the stored GitLab access token.
    #[serde(default)]
    pub installation_or_auth_token: Option<String>,
    #[serde(default)]
    pub project_sfid: Option<ProjectSfid>,
    #[serde(default)]
    pub auto_enabled: bool,
    /// When set, auto-enable always assigns this CLA group.
    #[serde(default)]
    pub auto_enabled_cla_group_id: Option<ClaGroupId>,
    #[serde(default)]
    pub branch_protection_enabled: bool,
}

impl FromImage for OrganizationRecord {
    fn from_image(image: &ImageReader<'_>) -> Result<Self, DecodeError> {
        let name = image.required_str("organization_name")?;
        let organization_name = OrganizationName::new(name.clone())
            .ok_or_else(|| DecodeError::invalid("organization_name", "must not be empty"))?;
        // GitHub organization rows are keyed by name and carry no separate id.
        let organization_id = OrganizationId::new(image.optional_str("organization_id")?.unwrap_or(name))
            .ok_or_else(|| DecodeError::invalid("organization_id", "must not be empty"))?;

        let installation_or_auth_token = match image.optional_id("organization_installation_id")? {
            Some(installation) => Some(installation),
            None => image.optional_str("auth_info")?,
        };

        Ok(Self {
            organization_id,
            organization_name,
            installation_or_auth_token,
            project_sfid: image.optional_str("project_sfid")?.and_then(ProjectSfid::new),
            auto_enabled: image.bool_or("auto_enabled", false)?,
            auto_enabled_cla_group_id: image
                .optional_str("auto_enabled_cla_group_id")?
                .and_then(ClaGroupId::new),
            branch_protection_enabled: image.bool_or("branch_protection_enabled", false)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Repositories
// ---------------------------------------------------------------------------

/// A repository (GitHub) or project (GitLab) known to the CLA service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    pub repository_id: RepositoryId,
    pub external_id: ExternalRepositoryId,
    /// `"owner/name"` on GitHub; the full namespace path on GitLab.
    pub repository_name: String,
    pub organization_name: OrganizationName,
    #[serde(default)]
    pub cla_group_id: Option<ClaGroupId>,
    #[serde(default)]
    pub project_sfid: Option<ProjectSfid>,
    #[serde(default)]
    pub enabled: bool,
    pub repository_type: Platform,
    #[serde(default)]
    pub archived: bool,
}

impl RepositoryRecord {
    /// Splits a GitHub `"owner/name"` repository name.
    ///
    /// Returns `None` when the name has no owner segment.
    pub fn owner_and_name(&self) -> Option<(&str, &str)> {
        let (owner, name) = self.repository_name.split_once('/')?;
        if owner.is_empty() || name.is_empty() {
            None
        } else {
            Some((owner, name))
        }
    }
}

impl FromImage for RepositoryRecord {
    fn from_image(image: &ImageReader<'_>) -> Result<Self, DecodeError> {
        let repository_type = image.required_str("repository_type")?;
        let repository_type = Platform::parse(&repository_type).ok_or_else(|| {
            DecodeError::invalid("repository_type", format!("unknown platform '{repository_type}'"))
        })?;

        Ok(Self {
            repository_id: RepositoryId::new(image.required_str("repository_id")?)
                .ok_or_else(|| DecodeError::invalid("repository_id", "must not be empty"))?,
            external_id: ExternalRepositoryId::new(image.required_id("repository_external_id")?)
                .ok_or_else(|| DecodeError::invalid("repository_external_id", "must not be empty"))?,
            repository_name: image.required_str("repository_name")?,
            organization_name: OrganizationName::new(image.required_str("repository_organization_name")?)
                .ok_or_else(|| DecodeError::invalid("repository_organization_name", "must not be empty"))?,
            cla_group_id: image
                .optional_str("repository_cla_group_id")?
                .and_then(ClaGroupId::new),
            project_sfid: image.optional_str("project_sfid")?.and_then(ProjectSfid::new),
            enabled: image.bool_or("enabled", false)?,
            repository_type,
            archived: image.bool_or("archived", false)?,
        })
    }
}
