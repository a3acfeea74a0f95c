//! Reconciliation domain for cla-sync.
//!
//! This crate contains every domain concept, newtype identifier, decision
//! algorithm and port trait used by the change-driven reconciliation engine.
//! Infrastructure crates implement the traits defined here; they never add
//! domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`OrganizationName`, `ClaGroupId`, etc.) |
//! | [`change`] | Change events, attribute images, routing keys |
//! | [`decode`] | Schema-driven image decoding and [`DecodeError`] |
//! | [`records`] | Organization and repository snapshots |
//! | [`transitions`] | Field transitions that trigger reconciliation |
//! | [`cla_group`] | CLA-group determination for auto-enable |
//! | [`protection`] | Branch protection rules, status-check merge, planning |
//! | [`webhook`] | Webhooks and find-or-create planning |
//! | [`ports`] | Persistence, notification, auth and host capability traits |
//! | [`errors`] | Error taxonomy |
//! | [`types`] | Shared value types |

pub mod change;
pub mod cla_group;
pub mod decode;
pub mod errors;
pub mod identifiers;
pub mod ports;
pub mod protection;
pub mod records;
pub mod transitions;
pub mod types;
pub mod webhook;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use change::{AttributeMap, AttributeValue, ChangeEvent, Operation, RouteKey};
pub use cla_group::{determine_cla_group, AmbiguityReason, ClaGroupDecision, ClaGroupSource};
pub use decode::{decode, AttributeKind, DecodeError, FromImage, ImageReader, ImageSide};
pub use errors::{AuthError, GatewayError, NotifyError, ReconcileError, StoreError};
pub use identifiers::{
    AccessToken, ClaGroupId, EventId, ExternalRepositoryId, HookId, InvocationId, OrganizationId,
    OrganizationName, ProjectSfid, RepositoryId, RepositoryNodeId, RuleId, TableName,
};
pub use ports::{
    AuthProvider, BranchProtectionApi, MergePipelineApi, Notifier, OrganizationStore, RepositoryStore,
    WebhookApi,
};
pub use protection::{
    merge_contexts, plan_protection, BranchProtectionRule, ProtectionPlan, ProtectionRequest, ProtectionState,
    RuleSettings,
};
pub use records::{OrganizationRecord, Platform, RepositoryRecord};
pub use transitions::{auto_enable_triggered, branch_protection_triggered, repository_enablement, EnablementChange};
pub use types::Timestamp;
pub use webhook::{find_hook, plan_webhook, DesiredWebhook, EventKind, HookSettings, WebhookPlan, WebhookRecord, REQUIRED_EVENTS};
