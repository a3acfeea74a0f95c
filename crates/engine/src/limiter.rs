//! Rate-limited decorators for the host capability traits.
//!
//! [`Throttled`] wraps any [`BranchProtectionApi`], [`WebhookApi`] or
//! [`MergePipelineApi`] and asks an [`Admission`] strategy for a token before
//! every call. The strategy is chosen once, at construction, by
//! [`admission_for`]:
//!
//! - [`Unlimited`]: calls pass straight through.
//! - [`BlockingLimiter`]: waits for the next token (background reconciliation).
//! - [`NonBlockingLimiter`]: fails fast with [`GatewayError::RateLimited`]
//!   when the bucket is empty (request-path invocations).
//!
//! Limiter state is internally synchronised; one instance per host is shared
//! through an `Arc` by every decorator that talks to that host.

use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use governor::clock::{Clock, DefaultClock};
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reconcile::{
    AccessToken, BranchProtectionApi, ExternalRepositoryId, GatewayError, HookId, HookSettings, MergePipelineApi,
    ProtectionState, RepositoryNodeId, RuleId, RuleSettings, WebhookApi, WebhookRecord,
};
use serde::Deserialize;
use tracing::debug;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

// ============================================================================
// Configuration
// ============================================================================

/// Which admission strategy wraps the host clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitMode {
    None,
    #[default]
    Blocking,
    NonBlocking,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub mode: RateLimitMode,
    /// Steady refill rate, in tokens per second.
    pub per_second: u32,
    /// Bucket capacity for the non-blocking limiter. The blocking limiter
    /// refills at `per_second` with a capacity of `per_second`.
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            mode: RateLimitMode::default(),
            per_second: 2,
            burst: 5,
        }
    }
}

fn non_zero(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value.max(1)).unwrap_or(NonZeroU32::MIN)
}

/// Builds the admission strategy selected by `config`.
pub fn admission_for(config: &RateLimitConfig) -> Arc<dyn Admission> {
    match config.mode {
        RateLimitMode::None => Arc::new(Unlimited),
        RateLimitMode::Blocking => Arc::new(BlockingLimiter::per_second(non_zero(config.per_second))),
        RateLimitMode::NonBlocking => Arc::new(NonBlockingLimiter::new(
            non_zero(config.per_second),
            non_zero(config.burst),
        )),
    }
}

// ============================================================================
// Admission strategies
// ============================================================================

/// Grants or refuses permission for one outbound call.
#[async_trait]
pub trait Admission: Send + Sync {
    async fn admit(&self) -> Result<(), GatewayError>;
}

/// Admits every call immediately.
#[derive(Debug, Default)]
pub struct Unlimited;

#[async_trait]
impl Admission for Unlimited {
    async fn admit(&self) -> Result<(), GatewayError> {
        Ok(())
    }
}

/// A token bucket that suspends the caller until a token is available.
///
/// Waiting is bounded only by the caller's invocation deadline.
pub struct BlockingLimiter {
    limiter: DirectLimiter,
}

impl BlockingLimiter {
    pub fn per_second(rate: NonZeroU32) -> Self {
        Self {
            limiter: RateLimiter::direct(Quota::per_second(rate)),
        }
    }
}

impl std::fmt::Debug for BlockingLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingLimiter").finish_non_exhaustive()
    }
}

#[async_trait]
impl Admission for BlockingLimiter {
    async fn admit(&self) -> Result<(), GatewayError> {
        self.limiter.until_ready().await;
        Ok(())
    }
}

/// A token bucket with burst capacity that refuses calls when empty.
pub struct NonBlockingLimiter {
    limiter: DirectLimiter,
    clock: DefaultClock,
}

impl NonBlockingLimiter {
    pub fn new(rate: NonZeroU32, burst: NonZeroU32) -> Self {
        Self {
            limiter: RateLimiter::direct(Quota::per_second(rate).allow_burst(burst)),
            clock: DefaultClock::default(),
        }
    }
}

impl std::fmt::Debug for NonBlockingLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonBlockingLimiter").finish_non_exhaustive()
    }
}

#[async_trait]
impl Admission for NonBlockingLimiter {
    async fn admit(&self) -> Result<(), GatewayError> {
        match self.limiter.check() {
            Ok(()) => Ok(()),
            Err(not_until) => {
                let retry_after = not_until.wait_time_from(self.clock.now());
                debug!(retry_after_ms = retry_after.as_millis() as u64, "outbound call rate limited");
                Err(GatewayError::RateLimited {
                    retry_after: Some(retry_after),
                })
            }
        }
    }
}

// ============================================================================
// Decorator
// ============================================================================

/// A host client whose every call first passes an [`Admission`] check.
///
/// Implements exactly the capability traits the wrapped client implements,
/// so reconcilers never know whether (or how) they are being limited.
pub struct Throttled<T> {
    inner: T,
    admission: Arc<dyn Admission>,
}

impl<T> Throttled<T> {
    pub fn new(inner: T, admission: Arc<dyn Admission>) -> Self {
        Self { inner, admission }
    }
}

#[async_trait]
impl<T: BranchProtectionApi> BranchProtectionApi for Throttled<T> {
    async fn fetch_protection(
        &self,
        token: &AccessToken,
        owner: &str,
        repository: &str,
    ) -> Result<ProtectionState, GatewayError> {
        self.admission.admit().await?;
        self.inner.fetch_protection(token, owner, repository).await
    }

    async fn create_rule(
        &self,
        token: &AccessToken,
        repository: &RepositoryNodeId,
        settings: &RuleSettings,
    ) -> Result<RuleId, GatewayError> {
        self.admission.admit().await?;
        self.inner.create_rule(token, repository, settings).await
    }

    async fn update_rule(&self, token: &AccessToken, rule: &RuleId, settings: &RuleSettings) -> Result<(), GatewayError> {
        self.admission.admit().await?;
        self.inner.update_rule(token, rule, settings).await
    }
}

#[async_trait]
impl<T: WebhookApi> WebhookApi for Throttled<T> {
    async fn list_hooks(
        &self,
        token: &AccessToken,
        project: &ExternalRepositoryId,
    ) -> Result<Vec<WebhookRecord>, GatewayError> {
        self.admission.admit().await?;
        self.inner.list_hooks(token, project).await
    }

    async fn create_hook(
        &self,
        token: &AccessToken,
        project: &ExternalRepositoryId,
        settings: &HookSettings,
    ) -> Result<HookId, GatewayError> {
        self.admission.admit().await?;
        self.inner.create_hook(token, project, settings).await
    }

    async fn edit_hook(
        &self,
        token: &AccessToken,
        project: &ExternalRepositoryId,
        hook: &HookId,
        settings: &HookSettings,
    ) -> Result<(), GatewayError> {
        self.admission.admit().await?;
        self.inner.edit_hook(token, project, hook, settings).await
    }

    async fn delete_hook(
        &self,
        token: &AccessToken,
        project: &ExternalRepositoryId,
        hook: &HookId,
    ) -> Result<(), GatewayError> {
        self.admission.admit().await?;
        self.inner.delete_hook(token, project, hook).await
    }
}

#[async_trait]
impl<T: MergePipelineApi> MergePipelineApi for Throttled<T> {
    async fn get_pipeline_protection(
        &self,
        token: &AccessToken,
        project: &ExternalRepositoryId,
    ) -> Result<bool, GatewayError> {
        self.admission.admit().await?;
        self.inner.get_pipeline_protection(token, project).await
    }

    async fn set_pipeline_protection(
        &self,
        token: &AccessToken,
        project: &ExternalRepositoryId,
        enabled: bool,
    ) -> Result<(), GatewayError> {
        self.admission.admit().await?;
        self.inner.set_pipeline_protection(token, project, enabled).await
    }
}
