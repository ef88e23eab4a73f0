//! Materialized, language-specific tree renderings stored in the cache.

use crate::{NodeId, NodeKind, OrderKey, Timestamp, TreeId};
use serde::{Deserialize, Serialize};

/// Synthetic child attached to a snapshot at read time. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransientChild {
    /// Display label in the snapshot's language.
    pub label: String,
    /// Opaque reference to the target (URL, slug, document id).
    pub target: String,
    /// Resolver that produced this child.
    pub resolver: String,
}

/// One node of a snapshot, with its persisted and transient children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub id: NodeId,
    pub depth: u32,
    pub order_key: OrderKey,
    pub kind: NodeKind,
    pub label: Option<String>,
    pub payload: serde_json::Value,
    pub children: Vec<SnapshotNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transient_children: Vec<TransientChild>,
}

impl SnapshotNode {
    /// Count of this node plus all persisted descendants.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(SnapshotNode::subtree_len).sum::<usize>()
    }
}

/// A fully materialized rendering of one tree in one language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tree_id: TreeId,
    pub language: String,
    pub schema_version: u32,
    pub built_at: Timestamp,
    /// Root nodes in sibling order.
    pub roots: Vec<SnapshotNode>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Number of persisted nodes in the snapshot.
    pub fn node_count(&self) -> usize {
        self.roots.iter().map(SnapshotNode::subtree_len).sum()
    }

    /// Depth-first walk in rendering order.
    pub fn walk(&self) -> Vec<&SnapshotNode> {
        fn visit<'a>(node: &'a SnapshotNode, out: &mut Vec<&'a SnapshotNode>) {
            out.push(node);
            for child in &node.children {
                visit(child, out);
            }
        }
        let mut out = Vec::new();
        for root in &self.roots {
            visit(root, &mut out);
        }
        out
    }

    pub fn find(&self, id: NodeId) -> Option<&SnapshotNode> {
        self.walk().into_iter().find(|n| n.id == id)
    }
}
