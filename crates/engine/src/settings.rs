//! Engine settings, deserialised from the `[tables]`, `[branch_protection]`,
//! `[webhook]` and `[merge_pipeline]` sections of the configuration file.
//!
//! Every field has a default so a partial (or absent) section is valid.

use reconcile::TableName;
use serde::Deserialize;

// ============================================================================
// Tables
// ============================================================================

/// Source table name overrides. Unset names derive from the deployment stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TableSettings {
    pub github_organizations: Option<String>,
    pub gitlab_organizations: Option<String>,
    pub repositories: Option<String>,
}

/// Resolved source table names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    pub github_organizations: TableName,
    pub gitlab_organizations: TableName,
    pub repositories: TableName,
}

impl TableSettings {
    /// Resolves each table name, falling back to `cla-<stage>-<suffix>`.
    pub fn resolve(&self, stage: &str) -> Tables {
        let pick = |configured: &Option<String>, suffix: &str| -> TableName {
            configured
                .clone()
                .and_then(TableName::new)
                .unwrap_or_else(|| TableName::for_stage(stage, suffix))
        };

        Tables {
            github_organizations: pick(&self.github_organizations, "github-organizations"),
            gitlab_organizations: pick(&self.gitlab_organizations, "gitlab-organizations"),
            repositories: pick(&self.repositories, "repositories"),
        }
    }
}

// ============================================================================
// Reconciler settings
// ============================================================================

/// Default number of concurrent branch-protection workers per organization.
pub const DEFAULT_MAX_WORKERS: usize = 5;

/// Branch-protection reconciliation settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BranchProtectionSettings {
    /// Concurrent repositories per organization fan-out.
    pub max_workers: usize,
    /// Whether the rule also binds repository administrators.
    pub enforce_admin: bool,
    /// Status-check contexts every protected branch must require.
    pub required_checks: Vec<String>,
    /// Status-check contexts to remove from existing rules.
    pub disabled_checks: Vec<String>,
    /// Pattern used when the host reports no default branch.
    pub fallback_branch: String,
}

impl Default for BranchProtectionSettings {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            enforce_admin: true,
            required_checks: vec!["EasyCLA".to_string()],
            disabled_checks: Vec::new(),
            fallback_branch: "main".to_string(),
        }
    }
}

/// The CLA bot webhook installed on GitLab projects.
///
/// GitLab repository handling is only registered when both values are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WebhookSettings {
    pub url: Option<String>,
    pub secret: Option<String>,
}

/// Merge-pipeline protection on GitLab projects.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MergePipelineSettings {
    /// Turn on "only allow merge if the pipeline succeeds" when a project is enabled.
    pub enabled: bool,
}

impl Default for MergePipelineSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}
