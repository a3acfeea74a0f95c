//! Change events delivered by the upstream change feed.
//!
//! A [`ChangeEvent`] carries the table it came from, the kind of write, and
//! the before/after attribute images. Images are table-agnostic maps of
//! [`AttributeValue`]s; typed snapshots are produced from them by
//! [`crate::decode`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::decode::{decode, DecodeError, FromImage, ImageSide};
use crate::{EventId, TableName, Timestamp};

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// The kind of write that produced a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    /// A record was created. Only the after image is present.
    Insert,
    /// A record was updated. Both images are present.
    Modify,
    /// A record was deleted. Only the before image is present.
    Remove,
}

impl Operation {
    /// Returns the feed's name for this operation (`"INSERT"`, `"MODIFY"`, `"REMOVE"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Insert => "INSERT",
            Operation::Modify => "MODIFY",
            Operation::Remove => "REMOVE",
        }
    }

    /// Parses a feed event name. Returns `None` for unknown names.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "INSERT" => Some(Operation::Insert),
            "MODIFY" => Some(Operation::Modify),
            "REMOVE" => Some(Operation::Remove),
            _ => None,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Attribute values
// ---------------------------------------------------------------------------

/// One kind-tagged value in a change image.
///
/// Numbers keep the decimal string form used on the wire; the decoder parses
/// them into the width each field declares.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// A string value.
    String(String),
    /// A number in decimal string form.
    Number(String),
    /// A boolean value.
    Bool(bool),
    /// An ordered list of values of any kind.
    List(Vec<AttributeValue>),
    /// A nested attribute map.
    Map(AttributeMap),
    /// A set of strings.
    StringSet(Vec<String>),
    /// An explicit null. Treated as absent by the decoder.
    Null,
}

/// A change image: attribute name to value.
pub type AttributeMap = BTreeMap<String, AttributeValue>;

// ---------------------------------------------------------------------------
// Routing key
// ---------------------------------------------------------------------------

/// The `"table:operation"` key that selects handlers for an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteKey(String);

impl RouteKey {
    /// Builds the key for a table and operation.
    pub fn new(table: &TableName, operation: Operation) -> Self {
        Self(format!("{}:{}", table.as_str(), operation.as_str()))
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RouteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Change events
// ---------------------------------------------------------------------------

/// A single insert, modify or remove on a source table.
///
/// Events are ephemeral: created by the change feed, consumed once per
/// delivery, and never written back.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Feed-assigned identifier; used to attribute log entries and failures.
    pub event_id: EventId,
    /// Table the write happened on.
    pub table: TableName,
    /// Kind of write.
    pub operation: Operation,
    /// Record state before the write. Absent on `INSERT`.
    pub before: Option<AttributeMap>,
    /// Record state after the write. Absent on `REMOVE`.
    pub after: Option<AttributeMap>,
    /// Approximate time the write happened, when the feed reports it.
    pub approximate_creation: Option<Timestamp>,
}

impl ChangeEvent {
    /// Returns the routing key for this event.
    pub fn route_key(&self) -> RouteKey {
        RouteKey::new(&self.table, self.operation)
    }

    /// Decodes the before image into a typed snapshot.
    pub fn decode_before<T: FromImage>(&self) -> Result<T, DecodeError> {
        let image = self.before.as_ref().ok_or(DecodeError::MissingImage {
            image: ImageSide::Before,
        })?;
        decode(image)
    }

    /// Decodes the after image into a typed snapshot.
    pub fn decode_after<T: FromImage>(&self) -> Result<T, DecodeError> {
        let image = self.after.as_ref().ok_or(DecodeError::MissingImage {
            image: ImageSide::After,
        })?;
        decode(image)
    }

    /// Decodes the image that describes the record's current state: the after
    /// image, or the before image for a `REMOVE`.
    pub fn decode_current<T: FromImage>(&self) -> Result<T, DecodeError> {
        match self.operation {
            Operation::Remove => self.decode_before(),
            Operation::Insert | Operation::Modify => self.decode_after(),
        }
    }

    /// Decodes the before image only for `MODIFY` events; other operations
    /// have no previous state to compare against.
    pub fn decode_previous<T: FromImage>(&self) -> Result<Option<T>, DecodeError> {
        match self.operation {
            Operation::Modify => self.decode_before().map(Some),
            Operation::Insert | Operation::Remove => Ok(None),
        }
    }
}
