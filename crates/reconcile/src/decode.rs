//! Schema-driven decoding of change images into typed snapshots.
//!
//! Each target type implements [`FromImage`] by reading its fields through an
//! [`ImageReader`]. Every field is declared once, at the call site, together
//! with the kind it must have; a stored value of another kind fails with
//! [`DecodeError::KindMismatch`]. Decoding either yields a complete value or
//! an error, never a partially-filled result.

use std::str::FromStr;

use thiserror::Error;

use crate::change::{AttributeMap, AttributeValue};

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

/// The primitive kind tag carried by an [`AttributeValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    String,
    Number,
    Bool,
    List,
    Map,
    StringSet,
    Null,
}

impl AttributeKind {
    /// Returns the kind of a stored value.
    pub fn of(value: &AttributeValue) -> Self {
        match value {
            AttributeValue::String(_) => AttributeKind::String,
            AttributeValue::Number(_) => AttributeKind::Number,
            AttributeValue::Bool(_) => AttributeKind::Bool,
            AttributeValue::List(_) => AttributeKind::List,
            AttributeValue::Map(_) => AttributeKind::Map,
            AttributeValue::StringSet(_) => AttributeKind::StringSet,
            AttributeValue::Null => AttributeKind::Null,
        }
    }
}

impl std::fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AttributeKind::String => "string",
            AttributeKind::Number => "number",
            AttributeKind::Bool => "boolean",
            AttributeKind::List => "list",
            AttributeKind::Map => "map",
            AttributeKind::StringSet => "string set",
            AttributeKind::Null => "null",
        };
        f.write_str(name)
    }
}

/// Which image of a change event was being decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSide {
    Before,
    After,
}

impl std::fmt::Display for ImageSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageSide::Before => f.write_str("before"),
            ImageSide::After => f.write_str("after"),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A change image could not be decoded into the requested snapshot type.
///
/// The event carrying the image is skipped; the router logs it with the event id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The event does not carry the image the handler needs.
    #[error("change event has no {image} image")]
    MissingImage { image: ImageSide },

    /// A required attribute is absent (or stored as null).
    #[error("required attribute '{field}' is missing")]
    MissingField { field: String },

    /// An attribute is stored with a kind the target field cannot accept.
    #[error("attribute '{field}' is a {found}, expected {expected}")]
    KindMismatch {
        field: String,
        expected: AttributeKind,
        found: AttributeKind,
    },

    /// An attribute has the right kind but an unusable value.
    #[error("attribute '{field}' is invalid: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl DecodeError {
    /// Builds an [`DecodeError::InvalidValue`] for `field`.
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        DecodeError::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    fn missing(field: &str) -> Self {
        DecodeError::MissingField {
            field: field.to_string(),
        }
    }

    fn mismatch(field: &str, expected: AttributeKind, value: &AttributeValue) -> Self {
        DecodeError::KindMismatch {
            field: field.to_string(),
            expected,
            found: AttributeKind::of(value),
        }
    }
}

// ---------------------------------------------------------------------------
// Decoding entry points
// ---------------------------------------------------------------------------

/// A snapshot type that can be read from a change image.
pub trait FromImage: Sized {
    /// Reads every field of `Self` from `image`.
    fn from_image(image: &ImageReader<'_>) -> Result<Self, DecodeError>;
}

/// Decodes `image` into a `T`.
pub fn decode<T: FromImage>(image: &AttributeMap) -> Result<T, DecodeError> {
    T::from_image(&ImageReader::new(image))
}

/// Typed, kind-checked access to the attributes of one image.
#[derive(Debug, Clone, Copy)]
pub struct ImageReader<'a> {
    image: &'a AttributeMap,
}

impl<'a> ImageReader<'a> {
    pub fn new(image: &'a AttributeMap) -> Self {
        Self { image }
    }

    /// Looks up a field, treating an explicit null as absent.
    fn lookup(&self, field: &str) -> Option<&'a AttributeValue> {
        match self.image.get(field) {
            None | Some(AttributeValue::Null) => None,
            Some(value) => Some(value),
        }
    }

    /// A string field that must be present and non-empty.
    pub fn required_str(&self, field: &str) -> Result<String, DecodeError> {
        match self.optional_str(field)? {
            Some(value) => Ok(value),
            None => Err(DecodeError::missing(field)),
        }
    }

    /// A string field that may be absent. Empty strings read as `None`.
    pub fn optional_str(&self, field: &str) -> Result<Option<String>, DecodeError> {
        match self.lookup(field) {
            None => Ok(None),
            Some(AttributeValue::String(s)) if s.is_empty() => Ok(None),
            Some(AttributeValue::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(DecodeError::mismatch(field, AttributeKind::String, other)),
        }
    }

    /// An identifier that may be stored either as a string or as a number.
    ///
    /// Host-assigned ids are written as numbers by some writers and as
    /// strings by others; both project onto the same textual id.
    pub fn optional_id(&self, field: &str) -> Result<Option<String>, DecodeError> {
        match self.lookup(field) {
            None => Ok(None),
            Some(AttributeValue::String(s) | AttributeValue::Number(s)) if s.is_empty() => Ok(None),
            Some(AttributeValue::String(s) | AttributeValue::Number(s)) => Ok(Some(s.clone())),
            Some(other) => Err(DecodeError::mismatch(field, AttributeKind::String, other)),
        }
    }

    /// Like [`ImageReader::optional_id`] but the field must be present.
    pub fn required_id(&self, field: &str) -> Result<String, DecodeError> {
        self.optional_id(field)?
            .ok_or_else(|| DecodeError::missing(field))
    }

    /// A boolean field that may be absent.
    pub fn optional_bool(&self, field: &str) -> Result<Option<bool>, DecodeError> {
        match self.lookup(field) {
            None => Ok(None),
            Some(AttributeValue::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(DecodeError::mismatch(field, AttributeKind::Bool, other)),
        }
    }

    /// A boolean field, `default` when absent.
    pub fn bool_or(&self, field: &str, default: bool) -> Result<bool, DecodeError> {
        Ok(self.optional_bool(field)?.unwrap_or(default))
    }

    /// A numeric field parsed into `T`, `None` when absent.
    pub fn optional_number<T: FromStr>(&self, field: &str) -> Result<Option<T>, DecodeError> {
        match self.lookup(field) {
            None => Ok(None),
            Some(AttributeValue::Number(raw)) => raw
                .parse::<T>()
                .map(Some)
                .map_err(|_| DecodeError::invalid(field, format!("'{raw}' is not a valid number"))),
            Some(other) => Err(DecodeError::mismatch(field, AttributeKind::Number, other)),
        }
    }

    /// A list of strings stored either as a string set or as a list whose
    /// elements are all strings. Absent reads as empty.
    pub fn string_list(&self, field: &str) -> Result<Vec<String>, DecodeError> {
        match self.lookup(field) {
            None => Ok(Vec::new()),
            Some(AttributeValue::StringSet(items)) => Ok(items.clone()),
            Some(AttributeValue::List(items)) => items
                .iter()
                .map(|item| match item {
                    AttributeValue::String(s) => Ok(s.clone()),
                    other => Err(DecodeError::mismatch(field, AttributeKind::String, other)),
                })
                .collect(),
            Some(other) => Err(DecodeError::mismatch(field, AttributeKind::List, other)),
        }
    }
}
