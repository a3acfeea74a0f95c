//! Error taxonomy for the reconciliation engine.
//!
//! Port-level errors ([`GatewayError`], [`StoreError`], [`NotifyError`],
//! [`AuthError`]) are produced by adapters. [`ReconcileError`] is what a
//! handler or reconciler returns; it attributes the failure to the
//! organization or repository being processed.
//!
//! Handler-level and per-repository errors are contained by their callers:
//! they never abort sibling work in the same batch or fan-out.

use std::time::Duration;

use thiserror::Error;

use crate::cla_group::AmbiguityReason;
use crate::decode::DecodeError;
use crate::OrganizationName;

// ---------------------------------------------------------------------------
// Port errors
// ---------------------------------------------------------------------------

/// A call through a host API capability failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The host answered with an error status or an error payload.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The call was refused locally (non-blocking limiter) or by the host.
    ///
    /// This engine does not requeue; the caller decides what to do.
    #[error("rate limited{}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// The addressed repository, project, rule or hook does not exist.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// The request never produced a usable response.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The invocation deadline passed before the call completed.
    #[error("call cancelled: invocation deadline exceeded")]
    Cancelled,
}

impl GatewayError {
    /// Classifies a non-success HTTP status from a host API.
    ///
    /// `404` becomes [`GatewayError::NotFound`] and `429` becomes
    /// [`GatewayError::RateLimited`]; everything else is an API error.
    pub fn from_status(status: u16, message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        match status {
            404 => GatewayError::NotFound { what: message.into() },
            429 => GatewayError::RateLimited { retry_after },
            _ => GatewayError::Api {
                status,
                message: message.into(),
            },
        }
    }
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(wait) => format!(" (retry after {}ms)", wait.as_millis()),
        None => String::new(),
    }
}

/// A persistence-layer call failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("persistence backend error: {message}")]
    Backend { message: String },
}

/// Sending a CLA-manager notification failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("notification failed: {message}")]
pub struct NotifyError {
    pub message: String,
}

/// An access token could not be produced for an organization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("no credentials configured for organization '{organization}'")]
    MissingCredentials { organization: OrganizationName },

    #[error("token refresh failed for organization '{organization}': {message}")]
    Refresh {
        organization: OrganizationName,
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Handler-level errors
// ---------------------------------------------------------------------------

/// Why one handler invocation or one repository's reconciliation failed.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The change image could not be decoded; the event is skipped.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The CLA group could not be determined; no external mutation was attempted.
    #[error("ambiguous state for organization '{organization}': {reason}")]
    AmbiguousState {
        organization: OrganizationName,
        reason: AmbiguityReason,
    },

    /// A host API call failed for `target` (an `owner/repo`, project id, or organization).
    #[error("{target}: {source}")]
    Gateway { target: String, source: GatewayError },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A related entity is absent. Usually a benign "nothing to do".
    #[error("not found: {what}")]
    NotFound { what: String },

    /// Some of a set of independent operations failed. Successful ones are kept.
    #[error("{failed} of {total} operations failed")]
    PartialFailure { failed: usize, total: usize },

    /// The invocation deadline passed before the work was started.
    #[error("invocation deadline exceeded")]
    Cancelled,

    /// A worker task ended without producing a result.
    #[error("worker failed: {message}")]
    Worker { message: String },
}

impl ReconcileError {
    /// Attributes a gateway failure to `target`.
    pub fn gateway(target: impl std::fmt::Display, source: GatewayError) -> Self {
        ReconcileError::Gateway {
            target: target.to_string(),
            source,
        }
    }

    /// `true` for "nothing to do" conditions that callers log but do not count
    /// as failures.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            ReconcileError::NotFound { .. }
                | ReconcileError::Store(StoreError::NotFound { .. })
                | ReconcileError::Gateway {
                    source: GatewayError::NotFound { .. },
                    ..
                }
        )
    }
}
