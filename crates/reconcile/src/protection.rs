//! Branch protection rules and the create-or-update planning that drives them.
//!
//! Planning is pure: given the rules observed on a repository and a
//! [`ProtectionRequest`], [`plan_protection`] decides whether to create a rule,
//! update the matching one, or do nothing. Required status-check contexts are
//! combined with [`merge_contexts`], which never drops a context that was not
//! explicitly disabled and is idempotent for a fixed enable/disable pair.

use serde::{Deserialize, Serialize};

use crate::{RepositoryNodeId, RuleId};

// ---------------------------------------------------------------------------
// Observed state
// ---------------------------------------------------------------------------

/// A branch protection rule as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchProtectionRule {
    pub id: RuleId,
    pub pattern: String,
    pub required_status_check_contexts: Vec<String>,
    pub requires_status_checks: bool,
    pub is_admin_enforced: bool,
    pub allows_deletions: bool,
    pub allows_force_pushes: bool,
}

/// Everything fetched about a repository's protection in one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionState {
    /// Node id of the repository; rule creation is keyed by it.
    pub repository_node_id: RepositoryNodeId,
    /// Name of the default branch, when the repository has one.
    pub default_branch: Option<String>,
    pub rules: Vec<BranchProtectionRule>,
}

impl ProtectionState {
    /// Returns the rule whose pattern equals `pattern` exactly.
    pub fn rule_for(&self, pattern: &str) -> Option<&BranchProtectionRule> {
        self.rules.iter().find(|rule| rule.pattern == pattern)
    }
}

// ---------------------------------------------------------------------------
// Desired state
// ---------------------------------------------------------------------------

/// A request to protect one branch pattern of one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionRequest {
    pub owner: String,
    pub repository: String,
    pub branch_pattern: String,
    pub enforce_admin: bool,
    /// Contexts that must be required after reconciliation.
    pub enable_contexts: Vec<String>,
    /// Contexts that must no longer be required.
    pub disable_contexts: Vec<String>,
}

impl ProtectionRequest {
    /// `"owner/repository"`, for log and error attribution.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repository)
    }
}

/// The settings written by a create or update mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSettings {
    pub pattern: String,
    pub required_status_check_contexts: Vec<String>,
    pub requires_status_checks: bool,
    pub is_admin_enforced: bool,
    pub allows_deletions: bool,
    pub allows_force_pushes: bool,
}

impl RuleSettings {
    fn for_contexts(pattern: &str, contexts: Vec<String>, enforce_admin: bool) -> Self {
        Self {
            pattern: pattern.to_string(),
            requires_status_checks: !contexts.is_empty(),
            required_status_check_contexts: contexts,
            is_admin_enforced: enforce_admin,
            allows_deletions: false,
            allows_force_pushes: false,
        }
    }

    fn is_satisfied_by(&self, rule: &BranchProtectionRule) -> bool {
        rule.required_status_check_contexts == self.required_status_check_contexts
            && rule.requires_status_checks == self.requires_status_checks
            && rule.is_admin_enforced == self.is_admin_enforced
            && rule.allows_deletions == self.allows_deletions
            && rule.allows_force_pushes == self.allows_force_pushes
    }
}

/// The mutation needed to bring one repository's rule to the desired state.
///
/// Transient: computed per reconciliation pass, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtectionPlan {
    /// No rule matches the pattern; create one.
    Create {
        repository_node_id: RepositoryNodeId,
        settings: RuleSettings,
    },
    /// A rule matches but differs from the desired settings.
    Update { rule_id: RuleId, settings: RuleSettings },
    /// The matching rule already has the desired settings.
    Noop { rule_id: RuleId },
}

impl ProtectionPlan {
    /// Short label for logging (`"create"`, `"update"`, `"noop"`).
    pub fn kind(&self) -> &'static str {
        match self {
            ProtectionPlan::Create { .. } => "create",
            ProtectionPlan::Update { .. } => "update",
            ProtectionPlan::Noop { .. } => "noop",
        }
    }
}

// ---------------------------------------------------------------------------
// Algorithms
// ---------------------------------------------------------------------------

/// Merges required status-check contexts.
///
/// Keeps `current` in order without duplicates, removes every context listed
/// in `disable`, then appends each `enable` context not already present.
///
/// A context listed in both `enable` and `disable` is removed and re-added,
/// so it ends up required at the end. Those contexts are appended after the
/// other enabled ones; otherwise a second pass would move them again.
pub fn merge_contexts(current: &[String], enable: &[String], disable: &[String]) -> Vec<String> {
    let (readded, added): (Vec<&String>, Vec<&String>) = enable.iter().partition(|context| disable.contains(context));

    let mut merged: Vec<String> = Vec::with_capacity(current.len() + enable.len());
    let kept = current.iter().filter(|context| !disable.contains(context));
    for context in kept.chain(added).chain(readded) {
        if !merged.contains(context) {
            merged.push(context.clone());
        }
    }
    merged
}

/// Computes the create-or-update mutation for `request` against the
/// observed `state`.
pub fn plan_protection(state: &ProtectionState, request: &ProtectionRequest) -> ProtectionPlan {
    match state.rule_for(&request.branch_pattern) {
        None => ProtectionPlan::Create {
            repository_node_id: state.repository_node_id.clone(),
            settings: RuleSettings::for_contexts(
                &request.branch_pattern,
                merge_contexts(&[], &request.enable_contexts, &request.disable_contexts),
                request.enforce_admin,
            ),
        },
        Some(rule) => {
            let settings = RuleSettings::for_contexts(
                &request.branch_pattern,
                merge_contexts(
                    &rule.required_status_check_contexts,
                    &request.enable_contexts,
                    &request.disable_contexts,
                ),
                request.enforce_admin,
            );
            if settings.is_satisfied_by(rule) {
                ProtectionPlan::Noop {
                    rule_id: rule.id.clone(),
                }
            } else {
                ProtectionPlan::Update {
                    rule_id: rule.id.clone(),
                    settings,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn rule(pattern: &str, contexts: &[&str]) -> BranchProtectionRule {
        BranchProtectionRule {
            id: RuleId::new("rule-1").expect("non-empty"),
            pattern: pattern.to_string(),
            required_status_check_contexts: strings(contexts),
            requires_status_checks: !contexts.is_empty(),
            is_admin_enforced: true,
            allows_deletions: false,
            allows_force_pushes: false,
        }
    }

    fn state(rules: Vec<BranchProtectionRule>) -> ProtectionState {
        ProtectionState {
            repository_node_id: RepositoryNodeId::new("R_1").expect("non-empty"),
            default_branch: Some("main".to_string()),
            rules,
        }
    }

    fn request(enable: &[&str], disable: &[&str]) -> ProtectionRequest {
        ProtectionRequest {
            owner: "acme".to_string(),
            repository: "widgets".to_string(),
            branch_pattern: "main".to_string(),
            enforce_admin: true,
            enable_contexts: strings(enable),
            disable_contexts: strings(disable),
        }
    }

    #[test]
    fn merge_removes_disabled_and_appends_enabled() {
        let merged = merge_contexts(
            &strings(&["travis-ci", "DCO", "EasyCLA"]),
            &strings(&["CodeQL"]),
            &strings(&["DCO"]),
        );
        assert_eq!(merged, strings(&["travis-ci", "EasyCLA", "CodeQL"]));
    }

    #[test]
    fn merge_deduplicates_existing_contexts() {
        let merged = merge_contexts(&strings(&["a", "b", "a"]), &strings(&["b", "c"]), &[]);
        assert_eq!(merged, strings(&["a", "b", "c"]));
    }

    #[test]
    fn context_in_both_lists_moves_to_the_end() {
        let both = strings(&["EasyCLA"]);
        let merged = merge_contexts(&strings(&["EasyCLA", "ci"]), &both, &both);
        assert_eq!(merged, strings(&["ci", "EasyCLA"]));
        assert_eq!(merge_contexts(&merged, &both, &both), merged);
    }

    #[test]
    fn readded_contexts_follow_newly_enabled_ones() {
        let enable = strings(&["EasyCLA", "CodeQL"]);
        let disable = strings(&["EasyCLA"]);
        let merged = merge_contexts(&[], &enable, &disable);
        assert_eq!(merged, strings(&["CodeQL", "EasyCLA"]));
        assert_eq!(merge_contexts(&merged, &enable, &disable), merged);
    }

    #[test]
    fn plan_creates_rule_when_pattern_is_unprotected() {
        let plan = plan_protection(&state(vec![rule("release/*", &["ci"])]), &request(&["EasyCLA"], &[]));

        match plan {
            ProtectionPlan::Create {
                repository_node_id,
                settings,
            } => {
                assert_eq!(repository_node_id.as_str(), "R_1");
                assert_eq!(settings.pattern, "main");
                assert_eq!(settings.required_status_check_contexts, strings(&["EasyCLA"]));
                assert!(settings.requires_status_checks);
                assert!(settings.is_admin_enforced);
                assert!(!settings.allows_deletions);
                assert!(!settings.allows_force_pushes);
            }
            other => panic!("expected create, got {other:?}"),
        }
    }

    #[test]
    fn plan_updates_matching_rule_with_merged_contexts() {
        let plan = plan_protection(&state(vec![rule("main", &["ci", "DCO"])]), &request(&["EasyCLA"], &["DCO"]));

        match plan {
            ProtectionPlan::Update { rule_id, settings } => {
                assert_eq!(rule_id.as_str(), "rule-1");
                assert_eq!(settings.required_status_check_contexts, strings(&["ci", "EasyCLA"]));
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn plan_is_noop_when_rule_already_satisfies_request() {
        let plan = plan_protection(&state(vec![rule("main", &["ci", "EasyCLA"])]), &request(&["EasyCLA"], &[]));
        assert_eq!(plan.kind(), "noop");
    }

    #[test]
    fn plan_updates_when_force_pushes_are_allowed() {
        let mut permissive = rule("main", &["EasyCLA"]);
        permissive.allows_force_pushes = true;

        let plan = plan_protection(&state(vec![permissive]), &request(&["EasyCLA"], &[]));
        assert_eq!(plan.kind(), "update");
    }

    fn context() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["EasyCLA", "DCO", "CodeQL", "travis-ci", "lint", "build"])
            .prop_map(str::to_string)
    }

    proptest! {
        #[test]
        fn merge_is_idempotent(
            current in prop::collection::vec(context(), 0..8),
            enable in prop::collection::vec(context(), 0..4),
            disable in prop::collection::vec(context(), 0..4),
        ) {
            let once = merge_contexts(&current, &enable, &disable);
            let twice = merge_contexts(&once, &enable, &disable);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn merge_never_drops_contexts_it_was_not_told_to_disable(
            current in prop::collection::vec(context(), 0..8),
            enable in prop::collection::vec(context(), 0..4),
            disable in prop::collection::vec(context(), 0..4),
        ) {
            let merged = merge_contexts(&current, &enable, &disable);
            for c in current.iter().filter(|c| !disable.contains(c)) {
                prop_assert!(merged.contains(c));
            }
            for c in &enable {
                prop_assert!(merged.contains(c));
            }
        }
    }
}
