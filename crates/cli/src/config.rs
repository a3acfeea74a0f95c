//! The `cla-sync` configuration file.
//!
//! Every section is optional; an empty file (or no file) yields a working
//! configuration for the `dev` stage. Secrets may come from the environment
//! instead of the file:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `GITHUB_TOKEN` | `github.token` |
//! | `GITLAB_TOKEN` | `gitlab.token` |
//! | `CLA_WEBHOOK_SECRET` | `webhook.secret` |

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use engine::{BranchProtectionSettings, MergePipelineSettings, RateLimitConfig, TableSettings, WebhookSettings};
use reconcile::AccessToken;
use serde::Deserialize;

use crate::telemetry::TelemetryConfig;

pub const DEFAULT_STAGE: &str = "dev";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Deployment stage; prefixes the default table names.
    pub stage: String,
    pub tables: TableSettings,
    pub branch_protection: BranchProtectionSettings,
    pub webhook: WebhookSettings,
    pub merge_pipeline: MergePipelineSettings,
    pub rate_limit: RateLimitConfig,
    pub invocation: InvocationConfig,
    pub github: HostConfig,
    pub gitlab: HostConfig,
    pub telemetry: TelemetryConfig,
    /// JSON snapshot the in-memory store is seeded from.
    pub snapshot: Option<PathBuf>,
    /// Write the store back to `snapshot` after the batch.
    pub persist_snapshot: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stage: DEFAULT_STAGE.to_string(),
            tables: TableSettings::default(),
            branch_protection: BranchProtectionSettings::default(),
            webhook: WebhookSettings::default(),
            merge_pipeline: MergePipelineSettings::default(),
            rate_limit: RateLimitConfig::default(),
            invocation: InvocationConfig::default(),
            github: HostConfig::default(),
            gitlab: HostConfig::default(),
            telemetry: TelemetryConfig::default(),
            snapshot: None,
            persist_snapshot: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InvocationConfig {
    /// Overall deadline for one batch. `0` disables the deadline.
    pub timeout_secs: u64,
}

impl Default for InvocationConfig {
    fn default() -> Self {
        Self { timeout_secs: 300 }
    }
}

impl InvocationConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Connection settings for one code host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// API base URL. Unset means the public host.
    pub api_url: Option<String>,
    pub token: Option<String>,
}

impl HostConfig {
    pub fn api_url_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.api_url.as_deref().filter(|url| !url.is_empty()).unwrap_or(default)
    }

    pub fn access_token(&self) -> Option<AccessToken> {
        self.token.clone().and_then(AccessToken::new)
    }
}

impl Config {
    /// Reads `path`, or returns the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Fills secrets from the environment. Set, non-empty variables win
    /// over values in the file.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(name).filter(|value| !value.is_empty());
        if let Some(token) = var("GITHUB_TOKEN") {
            self.github.token = Some(token);
        }
        if let Some(token) = var("GITLAB_TOKEN") {
            self.gitlab.token = Some(token);
        }
        if let Some(secret) = var("CLA_WEBHOOK_SECRET") {
            self.webhook.secret = Some(secret);
        }
    }
}
