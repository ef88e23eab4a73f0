//! Node types shared by category trees, menus and comment threads.

use crate::{AuthorId, NodeId, OrderKey, Timestamp, TreeId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix of the text form of [`NodeKind::SyntheticParent`].
const SYNTHETIC_PARENT_PREFIX: &str = "synthetic-parent:";

// ============================================================================
// NODE KIND
// ============================================================================

/// Discriminator for what a node is and how it is materialized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// Ordinary persisted node (category, link, page entry).
    Plain,
    /// Menu entry that expands into children fetched at read time by the
    /// resolver registered under `resolver`.
    SyntheticParent { resolver: String },
    /// Discussion thread entry with moderation state.
    Comment {
        approved: bool,
        author_id: Option<AuthorId>,
    },
}

impl NodeKind {
    pub fn synthetic(resolver: impl Into<String>) -> Self {
        NodeKind::SyntheticParent {
            resolver: resolver.into(),
        }
    }

    /// A freshly submitted comment, always pending.
    pub fn pending_comment(author_id: Option<AuthorId>) -> Self {
        NodeKind::Comment {
            approved: false,
            author_id,
        }
    }

    /// Name of the resolver for synthetic parents.
    pub fn resolver_name(&self) -> Option<&str> {
        match self {
            NodeKind::SyntheticParent { resolver } => Some(resolver),
            _ => None,
        }
    }

    pub fn is_comment(&self) -> bool {
        matches!(self, NodeKind::Comment { .. })
    }

    /// Approval flag; `None` for non-comment nodes.
    pub fn approved(&self) -> Option<bool> {
        match self {
            NodeKind::Comment { approved, .. } => Some(*approved),
            _ => None,
        }
    }

    pub fn author_id(&self) -> Option<AuthorId> {
        match self {
            NodeKind::Comment { author_id, .. } => *author_id,
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Plain => f.write_str("plain"),
            NodeKind::SyntheticParent { resolver } => {
                write!(f, "{}{}", SYNTHETIC_PARENT_PREFIX, resolver)
            }
            NodeKind::Comment { .. } => f.write_str("comment"),
        }
    }
}

/// Error when parsing an invalid node kind string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeKindParseError(pub String);

impl fmt::Display for NodeKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid node kind: {}", self.0)
    }
}

impl std::error::Error for NodeKindParseError {}

impl FromStr for NodeKind {
    type Err = NodeKindParseError;

    /// Parses `plain`, `synthetic-parent:<name>` or `comment`.
    /// A parsed comment starts pending with no author.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(NodeKind::Plain),
            "comment" => Ok(NodeKind::pending_comment(None)),
            other => match other.strip_prefix(SYNTHETIC_PARENT_PREFIX) {
                Some(name) if !name.is_empty() => Ok(NodeKind::synthetic(name)),
                _ => Err(NodeKindParseError(s.to_string())),
            },
        }
    }
}

// ============================================================================
// NODE
// ============================================================================

/// A single persisted element of a tree or thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub tree_id: TreeId,
    /// `None` means the node is a root of its tree.
    pub parent_id: Option<NodeId>,
    pub order_key: OrderKey,
    /// Distance from the root; roots have depth 0.
    pub depth: u32,
    pub kind: NodeKind,
    /// Kind-specific data (link target, label keys, comment text).
    pub payload: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Node {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Sort key giving the deterministic sibling order.
    pub fn sibling_key(&self) -> (OrderKey, NodeId) {
        (self.order_key, self.id)
    }
}

/// Input for creating a node.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNode {
    pub tree_id: TreeId,
    pub parent_id: Option<NodeId>,
    pub order_key: OrderKey,
    pub kind: NodeKind,
    pub payload: serde_json::Value,
}

impl NewNode {
    /// A plain root node with an empty payload.
    pub fn root(tree_id: impl Into<TreeId>, order_key: OrderKey) -> Self {
        Self {
            tree_id: tree_id.into(),
            parent_id: None,
            order_key,
            kind: NodeKind::Plain,
            payload: serde_json::Value::Null,
        }
    }

    /// A plain child node with an empty payload.
    pub fn child(tree_id: impl Into<TreeId>, parent_id: NodeId, order_key: OrderKey) -> Self {
        Self {
            parent_id: Some(parent_id),
            ..Self::root(tree_id, order_key)
        }
    }

    pub fn with_kind(mut self, kind: NodeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ============================================================================
// TESTS
// ============================================================================
