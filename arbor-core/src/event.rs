//! Node mutation events.

use crate::{NodeId, Timestamp, TreeId};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// What happened to the node named in a [`NodeChanged`] event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Created,
    Moved,
    Deleted,
    Updated,
    ApprovalChanged,
}

/// Emitted after a node write commits.
///
/// Consumers key off `tree_id`; the remaining fields are informational.
/// Delivery is at-least-once, so handlers must be idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeChanged {
    pub tree_id: TreeId,
    pub node_id: Option<NodeId>,
    pub change: ChangeKind,
    pub occurred_at: Timestamp,
}

impl NodeChanged {
    pub fn new(tree_id: TreeId, node_id: NodeId, change: ChangeKind) -> Self {
        Self {
            tree_id,
            node_id: Some(node_id),
            change,
            occurred_at: Utc::now(),
        }
    }

    /// Event that names only a tree (forwarded or externally issued).
    pub fn for_tree(tree_id: TreeId, change: ChangeKind) -> Self {
        Self {
            tree_id,
            node_id: None,
            change,
            occurred_at: Utc::now(),
        }
    }
}
