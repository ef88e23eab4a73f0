//! Identity types for arbor nodes and trees

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Node identifier using UUIDv7 for timestamp-sortable IDs.
/// Ties between siblings with equal order keys are broken by this value.
pub type NodeId = Uuid;

/// Identifier of a comment author (collaborator-owned user record).
pub type AuthorId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Sibling ordering value: an explicit integer position, or the insertion
/// timestamp in microseconds for discussion threads.
pub type OrderKey = i64;

/// Generate a new UUIDv7 NodeId (timestamp-sortable).
pub fn new_node_id() -> NodeId {
    Uuid::now_v7()
}

/// Name of a logical tree or thread.
///
/// Examples: `"categories"`, a menu slug such as `"main-menu"`, or
/// `"comments:<document-id>"` for one document's discussion thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TreeId(String);

impl TreeId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Tree id of the comment thread attached to a document.
    pub fn thread_for(document_id: Uuid) -> Self {
        Self(format!("comments:{}", document_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TreeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TreeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for TreeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Convert a timestamp into the order key used for thread siblings.
pub fn order_key_from_timestamp(ts: Timestamp) -> OrderKey {
    ts.timestamp_micros()
}
