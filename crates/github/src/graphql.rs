//! GraphQL documents and payload types for branch protection.
//!
//! Everything here is pure: request bodies are built from domain values and
//! response envelopes are mapped back, so the mapping can be tested without
//! a server.

use reconcile::{BranchProtectionRule, GatewayError, ProtectionState, RepositoryNodeId, RuleId, RuleSettings};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

/// Rules fetched per page of the protection query.
pub const RULES_PAGE_SIZE: u32 = 100;

pub const PROTECTION_QUERY: &str = r#"
query BranchProtection($owner: String!, $name: String!, $first: Int!, $after: String) {
  repository(owner: $owner, name: $name) {
    id
    defaultBranchRef { name }
    branchProtectionRules(first: $first, after: $after) {
      pageInfo { hasNextPage endCursor }
      nodes {
        id
        pattern
        requiredStatusCheckContexts
        requiresStatusChecks
        isAdminEnforced
        allowsDeletions
        allowsForcePushes
      }
    }
  }
}
"#;

pub const CREATE_RULE_MUTATION: &str = r#"
mutation CreateRule($input: CreateBranchProtectionRuleInput!) {
  createBranchProtectionRule(input: $input) {
    branchProtectionRule { id }
  }
}
"#;

pub const UPDATE_RULE_MUTATION: &str = r#"
mutation UpdateRule($input: UpdateBranchProtectionRuleInput!) {
  updateBranchProtectionRule(input: $input) {
    branchProtectionRule { id }
  }
}
"#;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct GraphQlRequest {
    pub query: &'static str,
    pub variables: Value,
}

/// The protection query for one page of rules. `after` is the previous
/// page's end cursor; `None` asks for the first page.
pub fn protection_request(owner: &str, name: &str, after: Option<&str>) -> GraphQlRequest {
    GraphQlRequest {
        query: PROTECTION_QUERY,
        variables: json!({ "owner": owner, "name": name, "first": RULES_PAGE_SIZE, "after": after }),
    }
}

fn rule_input(settings: &RuleSettings) -> serde_json::Map<String, Value> {
    let mut input = serde_json::Map::new();
    input.insert("pattern".into(), json!(settings.pattern));
    input.insert(
        "requiredStatusCheckContexts".into(),
        json!(settings.required_status_check_contexts),
    );
    input.insert("requiresStatusChecks".into(), json!(settings.requires_status_checks));
    input.insert("isAdminEnforced".into(), json!(settings.is_admin_enforced));
    input.insert("allowsDeletions".into(), json!(settings.allows_deletions));
    input.insert("allowsForcePushes".into(), json!(settings.allows_force_pushes));
    input
}

pub fn create_rule_request(repository: &RepositoryNodeId, settings: &RuleSettings) -> GraphQlRequest {
    let mut input = rule_input(settings);
    input.insert("repositoryId".into(), json!(repository.as_str()));
    GraphQlRequest {
        query: CREATE_RULE_MUTATION,
        variables: json!({ "input": input }),
    }
}

pub fn update_rule_request(rule: &RuleId, settings: &RuleSettings) -> GraphQlRequest {
    let mut input = rule_input(settings);
    input.insert("branchProtectionRuleId".into(), json!(rule.as_str()));
    GraphQlRequest {
        query: UPDATE_RULE_MUTATION,
        variables: json!({ "input": input }),
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlError {
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

impl<T> GraphQlResponse<T> {
    /// Returns the data, or the first error classified as a [`GatewayError`].
    pub fn into_data(self, what: &str) -> Result<T, GatewayError> {
        if let Some(error) = self.errors.into_iter().next() {
            return Err(match error.kind.as_deref() {
                Some("NOT_FOUND") => GatewayError::NotFound {
                    what: format!("{what}: {}", error.message),
                },
                Some("RATE_LIMITED") => GatewayError::RateLimited { retry_after: None },
                _ => GatewayError::Api {
                    status: 200,
                    message: error.message,
                },
            });
        }
        self.data.ok_or_else(|| GatewayError::Api {
            status: 200,
            message: format!("{what}: response carried neither data nor errors"),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ProtectionData {
    pub repository: Option<RepositoryNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryNode {
    pub id: String,
    pub default_branch_ref: Option<BranchRef>,
    pub branch_protection_rules: RuleConnection,
}

#[derive(Debug, Deserialize)]
pub struct BranchRef {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConnection {
    #[serde(default)]
    pub page_info: PageInfo,
    #[serde(default)]
    pub nodes: Vec<RuleNode>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[serde(default)]
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleNode {
    pub id: String,
    pub pattern: String,
    #[serde(default)]
    pub required_status_check_contexts: Vec<String>,
    pub requires_status_checks: bool,
    pub is_admin_enforced: bool,
    pub allows_deletions: bool,
    pub allows_force_pushes: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRuleData {
    pub create_branch_protection_rule: Option<RulePayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRuleData {
    pub update_branch_protection_rule: Option<RulePayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulePayload {
    pub branch_protection_rule: Option<RuleIdNode>,
}

#[derive(Debug, Deserialize)]
pub struct RuleIdNode {
    pub id: String,
}

impl RulePayload {
    pub fn rule_id(self) -> Option<RuleId> {
        self.branch_protection_rule.and_then(|node| RuleId::new(node.id))
    }
}

/// One page of the protection query, mapped into domain state.
#[derive(Debug)]
pub struct ProtectionPage {
    pub state: ProtectionState,
    /// Cursor for the next page of rules, if there is one.
    pub next_cursor: Option<String>,
}

impl ProtectionPage {
    /// Appends this page's rules to `state` (built from an earlier page) and
    /// returns the cursor for the page after it.
    pub fn extend(self, state: &mut ProtectionState) -> Option<String> {
        state.rules.extend(self.state.rules);
        self.next_cursor
    }
}

/// Maps one page of the protection query's data into domain state.
pub fn protection_page(data: ProtectionData, full_name: &str) -> Result<ProtectionPage, GatewayError> {
    let repository = data.repository.ok_or_else(|| GatewayError::NotFound {
        what: format!("repository {full_name}"),
    })?;
    let repository_node_id = RepositoryNodeId::new(repository.id).ok_or_else(|| GatewayError::Api {
        status: 200,
        message: format!("repository {full_name} has an empty node id"),
    })?;

    let RuleConnection { page_info, nodes } = repository.branch_protection_rules;
    let next_cursor = match (page_info.has_next_page, page_info.end_cursor) {
        (true, Some(cursor)) => Some(cursor),
        (true, None) => {
            warn!(repository = full_name, "rules page reports more pages but no cursor; later rules are skipped");
            None
        }
        (false, _) => None,
    };

    let rules = nodes
        .into_iter()
        .filter_map(|node| {
            Some(BranchProtectionRule {
                id: RuleId::new(node.id)?,
                pattern: node.pattern,
                required_status_check_contexts: node.required_status_check_contexts,
                requires_status_checks: node.requires_status_checks,
                is_admin_enforced: node.is_admin_enforced,
                allows_deletions: node.allows_deletions,
                allows_force_pushes: node.allows_force_pushes,
            })
        })
        .collect();

    Ok(ProtectionPage {
        state: ProtectionState {
            repository_node_id,
            default_branch: repository.default_branch_ref.map(|branch| branch.name),
            rules,
        },
        next_cursor,
    })
}
