//! Project webhooks and find-or-create planning.
//!
//! At most one webhook per `(project, url)` is maintained. [`plan_webhook`]
//! looks the hook up by URL and either creates it, widens its subscriptions,
//! or leaves it alone. Subscriptions the engine does not recognise are kept.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::HookId;

/// A webhook event subscription flag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    MergeRequest,
    Push,
    Note,
    /// Any other subscription flag, kept under its host-side name
    /// (e.g. `"pipeline_events"`).
    Other(String),
}

/// Subscriptions the CLA bot needs on every enforced project.
pub const REQUIRED_EVENTS: [EventKind; 3] = [EventKind::MergeRequest, EventKind::Push, EventKind::Note];

/// A webhook as listed by the host.
///
/// Hosts do not return the secret token, so it is never compared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookRecord {
    pub id: HookId,
    pub url: String,
    pub events: BTreeSet<EventKind>,
    pub ssl_verification: bool,
}

/// The webhook a project should have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredWebhook {
    pub url: String,
    pub secret_token: String,
    pub events: BTreeSet<EventKind>,
}

impl DesiredWebhook {
    /// The CLA bot hook: [`REQUIRED_EVENTS`] delivered to `url` and signed with `secret_token`.
    pub fn cla_hook(url: impl Into<String>, secret_token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            secret_token: secret_token.into(),
            events: REQUIRED_EVENTS.into_iter().collect(),
        }
    }
}

/// The payload of a create or edit call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookSettings {
    pub url: String,
    pub events: BTreeSet<EventKind>,
    pub ssl_verification: bool,
    pub secret_token: String,
}

/// What to do to converge a project's webhooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookPlan {
    Create(HookSettings),
    Update { hook_id: HookId, settings: HookSettings },
    Noop { hook_id: HookId },
}

/// Finds the hook registered for `url`.
pub fn find_hook<'a>(hooks: &'a [WebhookRecord], url: &str) -> Option<&'a WebhookRecord> {
    hooks.iter().find(|hook| hook.url == url)
}

/// Plans the create/edit needed for `desired` given the project's `existing` hooks.
pub fn plan_webhook(existing: &[WebhookRecord], desired: &DesiredWebhook) -> WebhookPlan {
    match find_hook(existing, &desired.url) {
        None => WebhookPlan::Create(HookSettings {
            url: desired.url.clone(),
            events: desired.events.clone(),
            ssl_verification: true,
            secret_token: desired.secret_token.clone(),
        }),
        Some(hook) if desired.events.is_subset(&hook.events) && hook.ssl_verification => {
            WebhookPlan::Noop {
                hook_id: hook.id.clone(),
            }
        }
        Some(hook) => WebhookPlan::Update {
            hook_id: hook.id.clone(),
            settings: HookSettings {
                url: hook.url.clone(),
                events: hook.events.union(&desired.events).cloned().collect(),
                ssl_verification: true,
                secret_token: desired.secret_token.clone(),
            },
        },
    }
}
