//! The invocation context every external call runs under.
//!
//! An [`Invocation`] is created once per batch delivery. It carries the
//! correlation id recorded on spans and the overall deadline (for example a
//! serverless function's remaining execution time). Host calls are wrapped in
//! [`Invocation::call`] so they abort when the deadline passes.

use std::future::Future;
use std::time::Duration;

use reconcile::{GatewayError, InvocationId};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct Invocation {
    id: InvocationId,
    deadline: Option<Instant>,
}

impl Invocation {
    /// Starts an invocation that must finish within `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            id: InvocationId::new_random(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Starts an invocation without a deadline.
    pub fn unbounded() -> Self {
        Self {
            id: InvocationId::new_random(),
            deadline: None,
        }
    }

    pub fn id(&self) -> InvocationId {
        self.id
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// `true` once the deadline has passed. Work not yet started must not start.
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Runs a host call, failing with [`GatewayError::Cancelled`] if the
    /// deadline passes first. The call is dropped (aborted) on expiry.
    pub async fn call<T, F>(&self, call: F) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        if self.is_expired() {
            return Err(GatewayError::Cancelled);
        }
        match self.deadline {
            None => call.await,
            Some(deadline) => tokio::time::timeout_at(deadline, call)
                .await
                .unwrap_or(Err(GatewayError::Cancelled)),
        }
    }
}
