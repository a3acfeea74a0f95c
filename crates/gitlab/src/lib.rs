//! cla-sync GitLab infrastructure adapter.
//!
//! Implements [`reconcile::WebhookApi`] (project hooks) and
//! [`reconcile::MergePipelineApi`] (the `only_allow_merge_if_pipeline_succeeds`
//! project setting) over the GitLab REST v4 API. All calls are keyed by the
//! numeric project id stored as the repository's external id.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** No domain rules: deciding whether a hook must be
//! created, edited or left alone happens in [`reconcile::plan_webhook`].

pub mod auth;
pub mod client;
pub mod hooks;

pub use auth::OrganizationTokenAuth;
pub use client::{GitLabClient, DEFAULT_API_URL};
