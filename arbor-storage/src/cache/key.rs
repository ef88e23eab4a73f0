//! Snapshot cache keys.
//!
//! A snapshot is cached once per tree, per language and per schema version.
//! The text form is `{tree_id}:{language}:{schema_version}`. Tree ids may
//! themselves contain `:` (comment threads are `comments:<uuid>`), so the
//! key is parsed from the right.

use std::fmt;
use std::str::FromStr;

use arbor_core::{CacheError, TreeId};

/// Cache key for one materialized snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotKey {
    inner: KeyInner,
}

/// Private inner struct - keys are only built through `new` or `parse`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct KeyInner {
    tree_id: TreeId,
    language: String,
    schema_version: u32,
}

impl SnapshotKey {
    pub fn new(tree_id: TreeId, language: impl Into<String>, schema_version: u32) -> Self {
        Self {
            inner: KeyInner {
                tree_id,
                language: language.into(),
                schema_version,
            },
        }
    }

    pub fn tree_id(&self) -> &TreeId {
        &self.inner.tree_id
    }

    pub fn language(&self) -> &str {
        &self.inner.language
    }

    pub fn schema_version(&self) -> u32 {
        self.inner.schema_version
    }

    /// Bytes used as the backend key.
    pub fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// Parse the text form. Returns `InvalidKey` when the language or
    /// version segment is missing or the version is not a number.
    pub fn parse(raw: &str) -> Result<Self, CacheError> {
        let invalid = || CacheError::InvalidKey {
            key: raw.to_string(),
        };
        let mut parts = raw.rsplitn(3, ':');
        let version = parts.next().ok_or_else(invalid)?;
        let language = parts.next().ok_or_else(invalid)?;
        let tree = parts.next().ok_or_else(invalid)?;
        if tree.is_empty() || language.is_empty() {
            return Err(invalid());
        }
        let schema_version = version.parse::<u32>().map_err(|_| invalid())?;
        Ok(Self::new(TreeId::from(tree), language, schema_version))
    }

    /// Decode backend key bytes.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        std::str::from_utf8(bytes).ok().and_then(|s| Self::parse(s).ok())
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.inner.tree_id, self.inner.language, self.inner.schema_version
        )
    }
}

impl FromStr for SnapshotKey {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
