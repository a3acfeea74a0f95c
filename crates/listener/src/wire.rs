//! Serde types for one stream record.

use std::collections::BTreeMap;

use reconcile::{AttributeMap, AttributeValue};
use serde::Deserialize;

/// A kind-tagged attribute value, e.g. `{"S": "acme"}` or `{"BOOL": true}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub enum WireValue {
    S(String),
    N(String),
    #[serde(rename = "BOOL")]
    Bool(bool),
    L(Vec<WireValue>),
    M(BTreeMap<String, WireValue>),
    #[serde(rename = "NULL")]
    Null(bool),
    #[serde(rename = "SS")]
    StringSet(Vec<String>),
    #[serde(rename = "NS")]
    NumberSet(Vec<String>),
}

impl From<WireValue> for AttributeValue {
    fn from(value: WireValue) -> Self {
        match value {
            WireValue::S(s) => AttributeValue::String(s),
            WireValue::N(n) => AttributeValue::Number(n),
            WireValue::Bool(b) => AttributeValue::Bool(b),
            WireValue::L(items) => AttributeValue::List(items.into_iter().map(Into::into).collect()),
            WireValue::M(map) => AttributeValue::Map(image(map)),
            WireValue::Null(_) => AttributeValue::Null,
            WireValue::StringSet(items) => AttributeValue::StringSet(items),
            WireValue::NumberSet(items) => AttributeValue::List(items.into_iter().map(AttributeValue::Number).collect()),
        }
    }
}

pub type WireImage = BTreeMap<String, WireValue>;

/// Converts a wire image into a domain attribute map.
pub fn image(wire: WireImage) -> AttributeMap {
    wire.into_iter().map(|(name, value)| (name, value.into())).collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamRecord {
    #[serde(rename = "eventID")]
    pub event_id: Option<String>,
    #[serde(rename = "eventName")]
    pub event_name: String,
    #[serde(rename = "eventSourceARN")]
    pub event_source_arn: String,
    #[serde(default)]
    pub dynamodb: StreamPayload,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StreamPayload {
    pub old_image: Option<WireImage>,
    pub new_image: Option<WireImage>,
    /// Seconds since the epoch.
    pub approximate_creation_date_time: Option<f64>,
}
