//! Mapping between GitLab project-hook JSON and domain webhooks.
//!
//! GitLab models each subscription as a boolean `<name>_events` field. Any
//! such field set to `true` is read back; names the engine does not know
//! become [`EventKind::Other`] and are written back unchanged on edit.

use std::collections::BTreeSet;

use reconcile::{EventKind, GatewayError, HookId, HookSettings, WebhookRecord};
use serde_json::{Map, Value};

const EVENTS_SUFFIX: &str = "_events";

/// The GitLab field name for a subscription.
pub fn event_field(kind: &EventKind) -> &str {
    match kind {
        EventKind::MergeRequest => "merge_requests_events",
        EventKind::Push => "push_events",
        EventKind::Note => "note_events",
        EventKind::Other(field) => field,
    }
}

fn event_kind(field: &str) -> EventKind {
    match field {
        "merge_requests_events" => EventKind::MergeRequest,
        "push_events" => EventKind::Push,
        "note_events" => EventKind::Note,
        other => EventKind::Other(other.to_string()),
    }
}

/// Maps one hook object from `GET /projects/:id/hooks`.
pub fn hook_from_json(value: &Value) -> Result<WebhookRecord, GatewayError> {
    let object = value.as_object().ok_or_else(|| invalid("hook is not an object"))?;

    let id = match object.get("id") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.clone(),
        _ => return Err(invalid("hook has no id")),
    };
    let id = HookId::new(id).ok_or_else(|| invalid("hook has an empty id"))?;
    let url = object
        .get("url")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("hook has no url"))?
        .to_string();

    let events: BTreeSet<EventKind> = object
        .iter()
        .filter(|(field, flag)| field.ends_with(EVENTS_SUFFIX) && flag.as_bool() == Some(true))
        .map(|(field, _)| event_kind(field))
        .collect();

    Ok(WebhookRecord {
        id,
        url,
        events,
        ssl_verification: object
            .get("enable_ssl_verification")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

/// Maps the body of `GET /projects/:id/hooks`.
pub fn hooks_from_json(value: &Value) -> Result<Vec<WebhookRecord>, GatewayError> {
    value
        .as_array()
        .ok_or_else(|| invalid("hook list is not an array"))?
        .iter()
        .map(hook_from_json)
        .collect()
}

/// The body of a create or edit call.
pub fn hook_body(settings: &HookSettings) -> Value {
    let mut body = Map::new();
    body.insert("url".into(), Value::String(settings.url.clone()));
    body.insert("token".into(), Value::String(settings.secret_token.clone()));
    body.insert(
        "enable_ssl_verification".into(),
        Value::Bool(settings.ssl_verification),
    );
    for kind in &settings.events {
        body.insert(event_field(kind).to_string(), Value::Bool(true));
    }
    Value::Object(body)
}

/// Reads the hook id from a create response.
pub fn created_hook_id(value: &Value) -> Result<HookId, GatewayError> {
    hook_from_json(value).map(|hook| hook.id)
}

/// Reads `only_allow_merge_if_pipeline_succeeds` from a project object.
pub fn pipeline_protection_from_json(value: &Value) -> Result<bool, GatewayError> {
    value
        .get("only_allow_merge_if_pipeline_succeeds")
        .and_then(Value::as_bool)
        .ok_or_else(|| invalid("project has no only_allow_merge_if_pipeline_succeeds flag"))
}

fn invalid(reason: &str) -> GatewayError {
    GatewayError::Api {
        status: 200,
        message: format!("unexpected GitLab payload: {reason}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hook_flags_map_to_event_kinds() {
        let hook = hook_from_json(&json!({
            "id": 17,
            "url": "https://cla.example.org/hook",
            "push_events": true,
            "merge_requests_events": true,
            "note_events": false,
            "pipeline_events": true,
            "enable_ssl_verification": true,
            "created_at": "2024-01-01T00:00:00Z"
        }))
        .expect("valid hook");

        assert_eq!(hook.id.as_str(), "17");
        assert!(hook.ssl_verification);
        assert!(hook.events.contains(&EventKind::Push));
        assert!(hook.events.contains(&EventKind::MergeRequest));
        assert!(!hook.events.contains(&EventKind::Note));
        assert!(hook.events.contains(&EventKind::Other("pipeline_events".to_string())));
        assert_eq!(hook.events.len(), 3);
    }

    #[test]
    fn hook_without_url_is_rejected() {
        assert!(hook_from_json(&json!({ "id": 1 })).is_err());
        assert!(hooks_from_json(&json!({ "id": 1 })).is_err());
    }

    #[test]
    fn body_sets_every_subscription_and_the_secret() {
        let settings = HookSettings {
            url: "https://cla.example.org/hook".to_string(),
            events: [
                EventKind::Push,
                EventKind::Note,
                EventKind::Other("pipeline_events".to_string()),
            ]
            .into_iter()
            .collect(),
            ssl_verification: true,
            secret_token: "s3cret".to_string(),
        };
        let body = hook_body(&settings);

        assert_eq!(body["token"], "s3cret");
        assert_eq!(body["push_events"], true);
        assert_eq!(body["note_events"], true);
        assert_eq!(body["pipeline_events"], true);
        assert!(body.get("merge_requests_events").is_none());
        assert_eq!(body["enable_ssl_verification"], true);
    }

    #[test]
    fn pipeline_flag_is_read_from_the_project() {
        let project = json!({ "id": 5, "only_allow_merge_if_pipeline_succeeds": true });
        assert_eq!(pipeline_protection_from_json(&project), Ok(true));
        assert!(pipeline_protection_from_json(&json!({ "id": 5 })).is_err());
    }
}
