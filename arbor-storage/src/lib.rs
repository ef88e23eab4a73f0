//! Arbor Storage - Tree Store Trait, In-Memory Store and Snapshot Cache
//!
//! Defines the storage abstraction for hierarchical nodes and the
//! read-through cache layer that holds per-language tree snapshots.
//! A relational implementation of [`TreeStore`] lives with the host
//! application; [`InMemoryTreeStore`] is the reference implementation.

pub mod cache;
mod invalidation;
mod memory;

pub use cache::{
    CacheBackend, CacheLayer, CacheLayerStats, CacheStats, CachedEntry, InMemoryCacheBackend,
    LmdbCacheBackend, LmdbCacheError, SnapshotKey,
};
pub use invalidation::{wire_invalidation, CacheInvalidator};
pub use memory::InMemoryTreeStore;

use arbor_core::{ArborResult, AuthorId, NewNode, Node, NodeId, OrderKey, TreeId};

// ============================================================================
// RESULT TYPES
// ============================================================================

/// Outcome of a comment moderation write.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalChange {
    /// The node after the write.
    pub node: Node,
    /// Approval flag before the write.
    pub previously_approved: bool,
}

impl ApprovalChange {
    /// True when this write moved the comment from pending to approved.
    pub fn became_approved(&self) -> bool {
        !self.previously_approved && self.node.kind.approved() == Some(true)
    }
}

// ============================================================================
// STORAGE TRAIT
// ============================================================================

/// Storage trait for hierarchical nodes.
///
/// Implementations run each mutation as one transaction: a move or cascade
/// delete is either fully visible to readers or not at all, and no reader
/// observes a node whose `depth` disagrees with its current parent. Every
/// successful mutation publishes one `NodeChanged` after it commits.
pub trait TreeStore: Send + Sync {
    // === Mutations ===

    /// Insert a node under `parent_id` (or as a root).
    ///
    /// Fails with `InvalidParent` if the parent does not exist or belongs
    /// to a different tree.
    fn create_node(&self, new: NewNode) -> ArborResult<Node>;

    /// Reparent and/or reorder a node, recomputing depth for its subtree.
    ///
    /// Fails with `CycleDetected` if `new_parent_id` is the node itself or
    /// one of its descendants, and with `InvalidParent` if the parent is
    /// missing or in another tree.
    fn move_node(
        &self,
        id: NodeId,
        new_parent_id: Option<NodeId>,
        new_order_key: OrderKey,
    ) -> ArborResult<Node>;

    /// Delete a node. Without `cascade` a node with children is rejected
    /// with `NodeHasChildren`. Returns the ids removed, in pre-order.
    fn delete_node(&self, id: NodeId, cascade: bool) -> ArborResult<Vec<NodeId>>;

    /// Replace a node's payload.
    fn update_payload(&self, id: NodeId, payload: serde_json::Value) -> ArborResult<Node>;

    /// Set the approval flag of a comment node.
    fn set_comment_approval(&self, id: NodeId, approved: bool) -> ArborResult<ApprovalChange>;

    // === Queries ===

    /// Get a node by ID.
    fn get_node(&self, id: NodeId) -> ArborResult<Option<Node>>;

    /// Children of `parent_id` (roots when `None`), ordered by
    /// `order_key` then `id`. Unknown trees or parents yield an empty list.
    fn list_children(&self, tree_id: &TreeId, parent_id: Option<NodeId>) -> ArborResult<Vec<Node>>;

    /// Ancestors of a node, root first, parent last.
    fn ancestors_of(&self, id: NodeId) -> ArborResult<Vec<Node>>;

    /// Descendants of a node in depth-first sibling order.
    fn descendants_of(&self, id: NodeId) -> ArborResult<Vec<Node>>;

    /// Every node of a tree in depth-first sibling order.
    fn list_tree(&self, tree_id: &TreeId) -> ArborResult<Vec<Node>>;

    /// Approved comments written by an author, across all threads.
    fn count_approved_comments(&self, author_id: AuthorId) -> ArborResult<u64>;

    /// Trees that currently hold at least one node.
    fn tree_ids(&self) -> ArborResult<Vec<TreeId>>;
}
