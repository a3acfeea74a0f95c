//! Newtype domain identifiers.
//!
//! Every domain concept that has an identity is represented as a distinct newtype
//! wrapping a primitive, so a [`RepositoryId`] (the internal record key) cannot
//! be passed where an [`ExternalRepositoryId`] (the host-assigned project
//! number) is expected, even though both are strings underneath.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: persistence layer keys
// ---------------------------------------------------------------------------

string_id! {
    /// Internal identifier of an organization record.
    OrganizationId
}

string_id! {
    /// Name of a GitHub organization or GitLab group, as stored on the record.
    ///
    /// Organization names are the lookup key for repositories.
    OrganizationName
}

string_id! {
    /// Internal identifier of a repository record.
    RepositoryId
}

string_id! {
    /// Host-assigned identifier of a repository (GitHub repository id or
    /// GitLab project id).
    ///
    /// GitLab webhook and project-setting calls are keyed by this value.
    ExternalRepositoryId
}

string_id! {
    /// Identifies a CLA group: the set of CLA templates and enforcement
    /// settings shared by one or more repositories.
    ClaGroupId
}

string_id! {
    /// Salesforce identifier of the project an organization or repository
    /// belongs to.
    ProjectSfid
}

// ---------------------------------------------------------------------------
// Identifiers: change feed
// ---------------------------------------------------------------------------

string_id! {
    /// Identifier assigned by the change feed to one change event.
    EventId
}

string_id! {
    /// Name of the table a change event originated from.
    TableName
}

impl TableName {
    /// The conventional `cla-<stage>-<suffix>` table name of a deployment stage.
    pub fn for_stage(stage: &str, suffix: &str) -> Self {
        Self(format!("cla-{stage}-{suffix}"))
    }
}

// ---------------------------------------------------------------------------
// Identifiers: host API objects
// ---------------------------------------------------------------------------

string_id! {
    /// GraphQL node id of a GitHub branch protection rule.
    RuleId
}

string_id! {
    /// GraphQL node id of a GitHub repository. Rule creation is keyed by it.
    RepositoryNodeId
}

string_id! {
    /// Host-assigned identifier of a project webhook.
    HookId
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies a single invocation of the engine (one batch delivery).
///
/// Generated fresh for every delivery; recorded on spans so all activity from
/// one invocation can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvocationId(Uuid);

impl InvocationId {
    /// Generates a new random invocation identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for InvocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// A bearer token for a host API call.
///
/// Produced by an [`crate::AuthProvider`] immediately before the calls that
/// need it. The value is never printed; `Debug` and `Display` are redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wraps a raw token, returning `None` if it is empty.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let v = value.into();
        if v.is_empty() {
            None
        } else {
            Some(Self(v))
        }
    }

    /// Returns the raw token for use in an `Authorization` header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

impl std::fmt::Display for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<redacted>")
    }
}
