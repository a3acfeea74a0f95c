//! Orchestration for cla-sync.
//!
//! Turns a batch of change events into reconciliation work: the
//! [`EventRouter`] selects handlers by `table:operation`, handlers detect the
//! field transition that concerns them, and the reconcilers converge host
//! state through the port traits defined in [`reconcile`].
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`router`] | Handler registration and sequential batch dispatch |
//! | [`handlers`] | Organization and repository change handlers |
//! | [`auto_enable`] | CLA-group assignment across an organization |
//! | [`branch_protection`] | Per-repository protection and the bounded fan-out |
//! | [`webhook`] | GitLab webhook find-or-create and removal |
//! | [`merge_pipeline`] | GitLab merge-pipeline protection |
//! | [`limiter`] | Blocking and non-blocking rate-limit decorators |
//! | [`invocation`] | Correlation id and deadline for one delivery |
//! | [`settings`] | Table names and reconciler settings |
//! | [`wiring`] | Router assembly from collaborators |
//! | [`notify`] | Log-only CLA-manager notifier |

pub mod auto_enable;
pub mod branch_protection;
pub mod handlers;
pub mod invocation;
pub mod limiter;
pub mod merge_pipeline;
pub mod notify;
pub mod router;
pub mod settings;
pub mod webhook;
pub mod wiring;

#[cfg(test)]
pub(crate) mod testing;

pub use auto_enable::{AutoEnableOutcome, AutoEnableReconciler};
pub use branch_protection::{BranchProtectionReconciler, FanOutReport, ProtectionOutcome};
pub use handlers::{AutoEnableHandler, GitLabRepositoryHandler, OrganizationProtectionHandler, RepositoryProtectionHandler};
pub use invocation::Invocation;
pub use limiter::{admission_for, Admission, BlockingLimiter, NonBlockingLimiter, RateLimitConfig, RateLimitMode, Throttled, Unlimited};
pub use merge_pipeline::MergePipelineReconciler;
pub use notify::LogNotifier;
pub use router::{ChangeHandler, DispatchReport, EventRouter, HandlerFailure};
pub use settings::{
    BranchProtectionSettings, MergePipelineSettings, TableSettings, Tables, WebhookSettings, DEFAULT_MAX_WORKERS,
};
pub use webhook::{WebhookOutcome, WebhookReconciler};
pub use wiring::{build_router, Collaborators, EngineSettings};
