//! cla-sync GitHub infrastructure adapter.
//!
//! Implements [`reconcile::BranchProtectionApi`] over the GitHub GraphQL v4
//! API: one query fetches a repository's node id, default branch and
//! protection rules, following the rule connection's cursor until every page
//! is read; rules are created or updated with one mutation each.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain domain rules. Planning
//! which mutation to issue happens in [`reconcile::plan_protection`]; this
//! crate only moves the result over the wire. Rate limiting is applied by
//! the engine's decorators, not here.

pub mod auth;
pub mod client;
pub mod graphql;

pub use auth::StaticTokenAuth;
pub use client::{GitHubClient, DEFAULT_API_URL};
