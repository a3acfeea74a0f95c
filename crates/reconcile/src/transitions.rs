//! Field transitions that trigger reconciliation.
//!
//! Each function takes the event's operation and decoded snapshots and says
//! whether a reconciler should run. `previous` is the before image of a
//! `MODIFY`; it is `None` for `INSERT` and `REMOVE`.

use crate::{Operation, OrganizationRecord, RepositoryRecord};

/// Auto-enable runs on `INSERT` with `auto_enabled`, or on `MODIFY` where
/// `auto_enabled` goes `false → true`.
pub fn auto_enable_triggered(
    operation: Operation,
    previous: Option<&OrganizationRecord>,
    current: &OrganizationRecord,
) -> bool {
    rising_edge(operation, previous.map(|org| org.auto_enabled), current.auto_enabled)
}

/// Organization-wide branch protection runs on `INSERT` with
/// `branch_protection_enabled`, or on `MODIFY` where it goes `false → true`.
pub fn branch_protection_triggered(
    operation: Operation,
    previous: Option<&OrganizationRecord>,
    current: &OrganizationRecord,
) -> bool {
    rising_edge(
        operation,
        previous.map(|org| org.branch_protection_enabled),
        current.branch_protection_enabled,
    )
}

fn rising_edge(operation: Operation, previous: Option<bool>, current: bool) -> bool {
    match operation {
        Operation::Insert => current,
        Operation::Modify => current && previous == Some(false),
        Operation::Remove => false,
    }
}

/// How a repository's CLA enforcement changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnablementChange {
    /// Enforcement was switched on (or the repository was created enabled).
    Enabled,
    /// Enforcement was switched off, or an enabled repository was removed.
    Disabled,
    Unchanged,
}

/// Classifies a repository change. `current` is the after image, or the
/// before image for a `REMOVE`.
pub fn repository_enablement(
    operation: Operation,
    previous: Option<&RepositoryRecord>,
    current: &RepositoryRecord,
) -> EnablementChange {
    match operation {
        Operation::Insert if current.enabled => EnablementChange::Enabled,
        Operation::Remove if current.enabled => EnablementChange::Disabled,
        Operation::Modify => match (previous.map(|repo| repo.enabled), current.enabled) {
            (Some(false), true) => EnablementChange::Enabled,
            (Some(true), false) => EnablementChange::Disabled,
            _ => EnablementChange::Unchanged,
        },
        _ => EnablementChange::Unchanged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExternalRepositoryId, OrganizationId, OrganizationName, Platform, RepositoryId};

    fn org(auto_enabled: bool, protected: bool) -> OrganizationRecord {
        OrganizationRecord {
            organization_id: OrganizationId::new("acme").expect("non-empty"),
            organization_name: OrganizationName::new("acme").expect("non-empty"),
            installation_or_auth_token: None,
            project_sfid: None,
            auto_enabled,
            auto_enabled_cla_group_id: None,
            branch_protection_enabled: protected,
        }
    }

    fn repo(enabled: bool) -> RepositoryRecord {
        RepositoryRecord {
            repository_id: RepositoryId::new("r-1").expect("non-empty"),
            external_id: ExternalRepositoryId::new("1").expect("non-empty"),
            repository_name: "acme/widgets".to_string(),
            organization_name: OrganizationName::new("acme").expect("non-empty"),
            cla_group_id: None,
            project_sfid: None,
            enabled,
            repository_type: Platform::GitLab,
            archived: false,
        }
    }

    #[test]
    fn auto_enable_fires_on_insert_and_rising_edge_only() {
        assert!(auto_enable_triggered(Operation::Insert, None, &org(true, false)));
        assert!(!auto_enable_triggered(Operation::Insert, None, &org(false, false)));
        assert!(auto_enable_triggered(Operation::Modify, Some(&org(false, false)), &org(true, false)));
        assert!(!auto_enable_triggered(Operation::Modify, Some(&org(true, false)), &org(true, false)));
        assert!(!auto_enable_triggered(Operation::Remove, None, &org(true, false)));
    }

    #[test]
    fn branch_protection_ignores_unrelated_modifications() {
        assert!(branch_protection_triggered(Operation::Modify, Some(&org(false, false)), &org(false, true)));
        assert!(!branch_protection_triggered(Operation::Modify, Some(&org(false, false)), &org(true, false)));
        assert!(!branch_protection_triggered(Operation::Modify, Some(&org(false, true)), &org(false, false)));
    }

    #[test]
    fn repository_enablement_classifies_each_operation() {
        assert_eq!(repository_enablement(Operation::Insert, None, &repo(true)), EnablementChange::Enabled);
        assert_eq!(repository_enablement(Operation::Insert, None, &repo(false)), EnablementChange::Unchanged);
        assert_eq!(
            repository_enablement(Operation::Modify, Some(&repo(false)), &repo(true)),
            EnablementChange::Enabled
        );
        assert_eq!(
            repository_enablement(Operation::Modify, Some(&repo(true)), &repo(false)),
            EnablementChange::Disabled
        );
        assert_eq!(
            repository_enablement(Operation::Modify, Some(&repo(true)), &repo(true)),
            EnablementChange::Unchanged
        );
        assert_eq!(repository_enablement(Operation::Remove, None, &repo(true)), EnablementChange::Disabled);
        assert_eq!(repository_enablement(Operation::Remove, None, &repo(false)), EnablementChange::Unchanged);
    }
}
