//! CLA-group determination for auto-enabled organizations.
//!
//! Precedence: an explicit `auto_enabled_cla_group_id` on the organization
//! always wins. Otherwise the group is inferred from the enabled repositories
//! already under the organization, and only when they agree on exactly one
//! `(cla_group_id, project_sfid)` pair.

use std::collections::BTreeSet;

use tracing::debug;

use crate::{ClaGroupId, OrganizationRecord, ProjectSfid, RepositoryRecord};

/// Where a determined CLA group came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaGroupSource {
    /// Set explicitly on the organization.
    Explicit,
    /// The single group shared by the organization's enabled repositories.
    InferredFromRepositories,
}

/// The outcome of a successful determination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaGroupDecision {
    pub cla_group_id: ClaGroupId,
    pub source: ClaGroupSource,
}

/// Why a CLA group could not be determined uniquely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmbiguityReason {
    /// No enabled repository carries a CLA group.
    NoClaGroup,
    /// Enabled repositories carry more than one distinct group/project pair.
    MultipleClaGroups(Vec<(ClaGroupId, Option<ProjectSfid>)>),
}

impl std::fmt::Display for AmbiguityReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AmbiguityReason::NoClaGroup => f.write_str("cannot determine CLA group"),
            AmbiguityReason::MultipleClaGroups(pairs) => {
                let groups: Vec<&str> = pairs.iter().map(|(group, _)| group.as_str()).collect();
                write!(f, "repositories span multiple CLA groups: {}", groups.join(", "))
            }
        }
    }
}

/// Determines the CLA group `organization`'s repositories should belong to.
pub fn determine_cla_group(
    organization: &OrganizationRecord,
    repositories: &[RepositoryRecord],
) -> Result<ClaGroupDecision, AmbiguityReason> {
    if let Some(explicit) = &organization.auto_enabled_cla_group_id {
        return Ok(ClaGroupDecision {
            cla_group_id: explicit.clone(),
            source: ClaGroupSource::Explicit,
        });
    }

    let pairs: BTreeSet<(ClaGroupId, Option<ProjectSfid>)> = repositories
        .iter()
        .filter(|repo| repo.enabled)
        .filter_map(|repo| {
            repo.cla_group_id
                .clone()
                .map(|group| (group, repo.project_sfid.clone()))
        })
        .collect();

    debug!(
        organization = %organization.organization_name,
        distinct_groups = pairs.len(),
        "inferring CLA group from enabled repositories"
    );

    let mut pairs = pairs.into_iter();
    match (pairs.next(), pairs.next()) {
        (None, _) => Err(AmbiguityReason::NoClaGroup),
        (Some((cla_group_id, _)), None) => Ok(ClaGroupDecision {
            cla_group_id,
            source: ClaGroupSource::InferredFromRepositories,
        }),
        (Some(first), Some(second)) => {
            let mut all = vec![first, second];
            all.extend(pairs);
            Err(AmbiguityReason::MultipleClaGroups(all))
        }
    }
}
