//! In-memory tree store.
//!
//! Adjacency list with an ordered sibling index and cached depth. A single
//! `RwLock` covers the whole state, so every mutation is atomic for
//! readers.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use arbor_core::{
    ArborResult, AuthorId, ChangeKind, NewNode, Node, NodeChanged, NodeId, NodeKind, OrderKey,
    StorageError, TreeError, TreeId,
};
use arbor_events::EventSink;
use chrono::Utc;

use crate::{ApprovalChange, TreeStore};

type SiblingKey = (TreeId, Option<NodeId>);

#[derive(Debug, Default)]
struct TreeState {
    nodes: HashMap<NodeId, Node>,
    siblings: HashMap<SiblingKey, BTreeSet<(OrderKey, NodeId)>>,
}

impl TreeState {
    fn node(&self, id: NodeId) -> ArborResult<&Node> {
        self.nodes
            .get(&id)
            .ok_or_else(|| TreeError::NodeNotFound { id }.into())
    }

    fn child_ids(&self, tree_id: &TreeId, parent_id: Option<NodeId>) -> Vec<NodeId> {
        self.siblings
            .get(&(tree_id.clone(), parent_id))
            .map(|set| set.iter().map(|(_, id)| *id).collect())
            .unwrap_or_default()
    }

    fn attach(&mut self, node: &Node) {
        self.siblings
            .entry((node.tree_id.clone(), node.parent_id))
            .or_default()
            .insert(node.sibling_key());
    }

    fn detach(&mut self, node: &Node) {
        let key = (node.tree_id.clone(), node.parent_id);
        if let Some(set) = self.siblings.get_mut(&key) {
            set.remove(&node.sibling_key());
            if set.is_empty() {
                self.siblings.remove(&key);
            }
        }
    }

    /// Whether `ancestor` lies on the parent chain of `id` (or is `id`).
    fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        // The chain is acyclic, so it is never longer than the node count.
        for _ in 0..=self.nodes.len() {
            match current {
                Some(cur) if cur == ancestor => return true,
                Some(cur) => current = self.nodes.get(&cur).and_then(|n| n.parent_id),
                None => return false,
            }
        }
        false
    }

    /// Pre-order walk below `id`, excluding `id`.
    fn descendant_ids(&self, tree_id: &TreeId, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.child_ids(tree_id, Some(id));
        stack.reverse();
        while let Some(next) = stack.pop() {
            out.push(next);
            let mut children = self.child_ids(tree_id, Some(next));
            children.reverse();
            stack.extend(children);
        }
        out
    }

    /// Validate that `parent_id` may hold children of `tree_id`; returns the
    /// parent's depth.
    fn parent_depth(&self, tree_id: &TreeId, parent_id: NodeId) -> ArborResult<u32> {
        let parent = self.nodes.get(&parent_id).ok_or_else(|| TreeError::InvalidParent {
            parent_id,
            tree_id: tree_id.clone(),
            reason: "parent does not exist".to_string(),
        })?;
        if &parent.tree_id != tree_id {
            return Err(TreeError::InvalidParent {
                parent_id,
                tree_id: tree_id.clone(),
                reason: format!("parent belongs to tree {}", parent.tree_id),
            }
            .into());
        }
        Ok(parent.depth)
    }
}

/// In-memory [`TreeStore`].
#[derive(Default)]
pub struct InMemoryTreeStore {
    state: RwLock<TreeState>,
    sink: Option<Arc<dyn EventSink>>,
}

impl InMemoryTreeStore {
    /// Create a store that publishes no events.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that publishes `NodeChanged` to `sink` after each write.
    pub fn with_event_sink(sink: Arc<dyn EventSink>) -> Self {
        Self {
            state: RwLock::default(),
            sink: Some(sink),
        }
    }

    /// Number of stored nodes across all trees.
    pub fn node_count(&self) -> usize {
        self.read().map(|s| s.nodes.len()).unwrap_or(0)
    }

    fn read(&self) -> ArborResult<RwLockReadGuard<'_, TreeState>> {
        self.state
            .read()
            .map_err(|_| StorageError::LockPoisoned.into())
    }

    fn write(&self) -> ArborResult<RwLockWriteGuard<'_, TreeState>> {
        self.state
            .write()
            .map_err(|_| StorageError::LockPoisoned.into())
    }

    /// Publish after the write guard has been released.
    fn emit(&self, event: NodeChanged) {
        if let Some(sink) = &self.sink {
            sink.publish(event);
        }
    }
}

impl std::fmt::Debug for InMemoryTreeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTreeStore")
            .field("nodes", &self.node_count())
            .field("publishes_events", &self.sink.is_some())
            .finish()
    }
}

impl TreeStore for InMemoryTreeStore {
    fn create_node(&self, new: NewNode) -> ArborResult<Node> {
        let node = {
            let mut state = self.write()?;
            let depth = match new.parent_id {
                Some(parent_id) => state.parent_depth(&new.tree_id, parent_id)? + 1,
                None => 0,
            };
            let now = Utc::now();
            let node = Node {
                id: arbor_core::new_node_id(),
                tree_id: new.tree_id,
                parent_id: new.parent_id,
                order_key: new.order_key,
                depth,
                kind: new.kind,
                payload: new.payload,
                created_at: now,
                updated_at: now,
            };
            state.attach(&node);
            state.nodes.insert(node.id, node.clone());
            node
        };

        self.emit(NodeChanged::new(
            node.tree_id.clone(),
            node.id,
            ChangeKind::Created,
        ));
        Ok(node)
    }

    fn move_node(
        &self,
        id: NodeId,
        new_parent_id: Option<NodeId>,
        new_order_key: OrderKey,
    ) -> ArborResult<Node> {
        let moved = {
            let mut state = self.write()?;
            let original = state.node(id)?.clone();

            let depth = match new_parent_id {
                Some(parent_id) => {
                    if state.is_ancestor_or_self(id, parent_id) {
                        return Err(TreeError::CycleDetected {
                            node_id: id,
                            new_parent_id: parent_id,
                        }
                        .into());
                    }
                    state.parent_depth(&original.tree_id, parent_id)? + 1
                }
                None => 0,
            };

            state.detach(&original);
            let mut node = original;
            node.parent_id = new_parent_id;
            node.order_key = new_order_key;
            node.depth = depth;
            node.updated_at = Utc::now();
            state.attach(&node);
            state.nodes.insert(id, node.clone());

            // Parents precede children in pre-order, so each parent's depth
            // is already final when its children are visited.
            for descendant in state.descendant_ids(&node.tree_id, id) {
                let parent_depth = state
                    .nodes
                    .get(&descendant)
                    .and_then(|d| d.parent_id)
                    .and_then(|p| state.nodes.get(&p))
                    .map(|p| p.depth)
                    .unwrap_or(0);
                if let Some(d) = state.nodes.get_mut(&descendant) {
                    d.depth = parent_depth + 1;
                }
            }
            node
        };

        self.emit(NodeChanged::new(
            moved.tree_id.clone(),
            moved.id,
            ChangeKind::Moved,
        ));
        Ok(moved)
    }

    fn delete_node(&self, id: NodeId, cascade: bool) -> ArborResult<Vec<NodeId>> {
        let (tree_id, removed) = {
            let mut state = self.write()?;
            let node = state.node(id)?.clone();
            let descendants = state.descendant_ids(&node.tree_id, id);
            if !cascade && !descendants.is_empty() {
                return Err(TreeError::NodeHasChildren {
                    node_id: id,
                    child_count: state.child_ids(&node.tree_id, Some(id)).len(),
                }
                .into());
            }

            let mut removed = Vec::with_capacity(descendants.len() + 1);
            removed.push(id);
            removed.extend(descendants);
            for gone in &removed {
                if let Some(n) = state.nodes.remove(gone) {
                    state.detach(&n);
                }
            }
            (node.tree_id, removed)
        };

        self.emit(NodeChanged::new(tree_id, id, ChangeKind::Deleted));
        Ok(removed)
    }

    fn update_payload(&self, id: NodeId, payload: serde_json::Value) -> ArborResult<Node> {
        let node = {
            let mut state = self.write()?;
            let node = state
                .nodes
                .get_mut(&id)
                .ok_or(TreeError::NodeNotFound { id })?;
            node.payload = payload;
            node.updated_at = Utc::now();
            node.clone()
        };

        self.emit(NodeChanged::new(
            node.tree_id.clone(),
            node.id,
            ChangeKind::Updated,
        ));
        Ok(node)
    }

    fn set_comment_approval(&self, id: NodeId, approved: bool) -> ArborResult<ApprovalChange> {
        let change = {
            let mut state = self.write()?;
            let node = state
                .nodes
                .get_mut(&id)
                .ok_or(TreeError::NodeNotFound { id })?;
            let previously_approved = match &mut node.kind {
                NodeKind::Comment {
                    approved: current, ..
                } => std::mem::replace(current, approved),
                _ => return Err(TreeError::NotAComment { id }.into()),
            };
            if previously_approved != approved {
                node.updated_at = Utc::now();
            }
            ApprovalChange {
                node: node.clone(),
                previously_approved,
            }
        };

        // Unchanged flag: no write, no event.
        if change.previously_approved != approved {
            self.emit(NodeChanged::new(
                change.node.tree_id.clone(),
                id,
                ChangeKind::ApprovalChanged,
            ));
        }
        Ok(change)
    }

    fn get_node(&self, id: NodeId) -> ArborResult<Option<Node>> {
        Ok(self.read()?.nodes.get(&id).cloned())
    }

    fn list_children(&self, tree_id: &TreeId, parent_id: Option<NodeId>) -> ArborResult<Vec<Node>> {
        let state = self.read()?;
        Ok(state
            .child_ids(tree_id, parent_id)
            .into_iter()
            .filter_map(|id| state.nodes.get(&id).cloned())
            .collect())
    }

    fn ancestors_of(&self, id: NodeId) -> ArborResult<Vec<Node>> {
        let state = self.read()?;
        let mut ancestors = Vec::new();
        let mut current = state.node(id)?.parent_id;
        while let Some(parent_id) = current {
            let parent = state.node(parent_id)?;
            ancestors.push(parent.clone());
            current = parent.parent_id;
        }
        ancestors.reverse();
        Ok(ancestors)
    }

    fn descendants_of(&self, id: NodeId) -> ArborResult<Vec<Node>> {
        let state = self.read()?;
        let tree_id = state.node(id)?.tree_id.clone();
        Ok(state
            .descendant_ids(&tree_id, id)
            .into_iter()
            .filter_map(|d| state.nodes.get(&d).cloned())
            .collect())
    }

    fn list_tree(&self, tree_id: &TreeId) -> ArborResult<Vec<Node>> {
        let state = self.read()?;
        let mut out = Vec::new();
        for root in state.child_ids(tree_id, None) {
            if let Some(node) = state.nodes.get(&root) {
                out.push(node.clone());
            }
            out.extend(
                state
                    .descendant_ids(tree_id, root)
                    .into_iter()
                    .filter_map(|d| state.nodes.get(&d).cloned()),
            );
        }
        Ok(out)
    }

    fn count_approved_comments(&self, author_id: AuthorId) -> ArborResult<u64> {
        let state = self.read()?;
        Ok(state
            .nodes
            .values()
            .filter(|n| {
                matches!(
                    n.kind,
                    NodeKind::Comment {
                        approved: true,
                        author_id: Some(a),
                    } if a == author_id
                )
            })
            .count() as u64)
    }

    fn tree_ids(&self) -> ArborResult<Vec<TreeId>> {
        let state = self.read()?;
        let mut trees: Vec<TreeId> = state
            .siblings
            .keys()
            .filter(|(_, parent)| parent.is_none())
            .map(|(tree, _)| tree.clone())
            .collect();
        trees.sort();
        trees.dedup();
        Ok(trees)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::ArborError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CollectingSink {
        events: Mutex<Vec<NodeChanged>>,
    }

    impl EventSink for CollectingSink {
        fn publish(&self, event: NodeChanged) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn tree() -> TreeId {
        TreeId::from("categories")
    }

    /// A -> B -> C
    fn chain(store: &InMemoryTreeStore) -> (Node, Node, Node) {
        let a = store.create_node(NewNode::root(tree(), 0)).unwrap();
        let b = store.create_node(NewNode::child(tree(), a.id, 0)).unwrap();
        let c = store.create_node(NewNode::child(tree(), b.id, 0)).unwrap();
        (a, b, c)
    }

    #[test]
    fn test_create_computes_depth_and_ancestors() {
        let store = InMemoryTreeStore::new();
        let (a, b, c) = chain(&store);

        assert_eq!(a.depth, 0);
        assert_eq!(b.depth, 1);
        assert_eq!(c.depth, 2);

        let ancestors: Vec<NodeId> = store
            .ancestors_of(c.id)
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ancestors, vec![a.id, b.id]);
        assert!(store.ancestors_of(a.id).unwrap().is_empty());
    }

    #[test]
    fn test_create_with_missing_parent_is_invalid() {
        let store = InMemoryTreeStore::new();
        let result = store.create_node(NewNode::child(tree(), arbor_core::new_node_id(), 0));
        assert!(matches!(
            result,
            Err(ArborError::Tree(TreeError::InvalidParent { .. }))
        ));
        assert_eq!(store.node_count(), 0);
    }

    #[test]
    fn test_create_with_cross_tree_parent_is_invalid() {
        let store = InMemoryTreeStore::new();
        let footer_root = store.create_node(NewNode::root("footer", 0)).unwrap();
        let result = store.create_node(NewNode::child("main-menu", footer_root.id, 0));
        assert!(matches!(
            result,
            Err(ArborError::Tree(TreeError::InvalidParent { .. }))
        ));
    }

    #[test]
    fn test_move_under_descendant_is_cycle() {
        let store = InMemoryTreeStore::new();
        let (a, _b, c) = chain(&store);

        let result = store.move_node(a.id, Some(c.id), 0);
        assert!(matches!(
            result,
            Err(ArborError::Tree(TreeError::CycleDetected { .. }))
        ));

        let result = store.move_node(a.id, Some(a.id), 0);
        assert!(matches!(
            result,
            Err(ArborError::Tree(TreeError::CycleDetected { .. }))
        ));

        // Tree unchanged
        assert_eq!(store.get_node(a.id).unwrap().unwrap(), a);
        assert_eq!(store.get_node(c.id).unwrap().unwrap().depth, 2);
    }

    #[test]
    fn test_move_recomputes_subtree_depth() {
        let store = InMemoryTreeStore::new();
        let (a, b, c) = chain(&store);
        let other = store.create_node(NewNode::root(tree(), 1)).unwrap();
        let deep = store.create_node(NewNode::child(tree(), other.id, 0)).unwrap();

        // Move B (with C) under `deep`: depths become 2 and 3.
        let moved = store.move_node(b.id, Some(deep.id), 5).unwrap();
        assert_eq!(moved.depth, 2);
        assert_eq!(moved.order_key, 5);
        assert_eq!(store.get_node(c.id).unwrap().unwrap().depth, 3);
        assert!(store.list_children(&tree(), Some(a.id)).unwrap().is_empty());

        // Promote B to a root.
        store.move_node(b.id, None, 9).unwrap();
        assert_eq!(store.get_node(b.id).unwrap().unwrap().depth, 0);
        assert_eq!(store.get_node(c.id).unwrap().unwrap().depth, 1);
    }

    #[test]
    fn test_move_to_other_tree_is_invalid() {
        let store = InMemoryTreeStore::new();
        let (a, _, _) = chain(&store);
        let foreign = store.create_node(NewNode::root("footer", 0)).unwrap();
        let result = store.move_node(a.id, Some(foreign.id), 0);
        assert!(matches!(
            result,
            Err(ArborError::Tree(TreeError::InvalidParent { .. }))
        ));
    }

    #[test]
    fn test_list_children_orders_by_key_then_id() {
        let store = InMemoryTreeStore::new();
        let root = store.create_node(NewNode::root(tree(), 0)).unwrap();
        let late = store.create_node(NewNode::child(tree(), root.id, 20)).unwrap();
        let tie_a = store.create_node(NewNode::child(tree(), root.id, 10)).unwrap();
        let tie_b = store.create_node(NewNode::child(tree(), root.id, 10)).unwrap();

        let ids: Vec<NodeId> = store
            .list_children(&tree(), Some(root.id))
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        let (first, second) = if tie_a.id < tie_b.id {
            (tie_a.id, tie_b.id)
        } else {
            (tie_b.id, tie_a.id)
        };
        assert_eq!(ids, vec![first, second, late.id]);
    }

    #[test]
    fn test_list_children_of_unknown_tree_is_empty() {
        let store = InMemoryTreeStore::new();
        assert!(store
            .list_children(&TreeId::from("nope"), None)
            .unwrap()
            .is_empty());
        assert!(store.list_tree(&TreeId::from("nope")).unwrap().is_empty());
    }

    #[test]
    fn test_delete_without_cascade_rejects_parent() {
        let store = InMemoryTreeStore::new();
        let (a, b, c) = chain(&store);

        let result = store.delete_node(a.id, false);
        assert!(matches!(
            result,
            Err(ArborError::Tree(TreeError::NodeHasChildren { child_count: 1, .. }))
        ));
        assert!(store.get_node(b.id).unwrap().is_some());
        assert_eq!(store.list_children(&tree(), Some(b.id)).unwrap()[0].id, c.id);
    }

    #[test]
    fn test_delete_cascade_removes_subtree() {
        let store = InMemoryTreeStore::new();
        let (a, b, c) = chain(&store);

        let removed = store.delete_node(b.id, true).unwrap();
        assert_eq!(removed, vec![b.id, c.id]);
        assert!(store.get_node(c.id).unwrap().is_none());
        assert!(store.list_children(&tree(), Some(a.id)).unwrap().is_empty());

        // Leaf delete needs no cascade.
        assert_eq!(store.delete_node(a.id, false).unwrap(), vec![a.id]);
        assert!(store.tree_ids().unwrap().is_empty());
    }

    #[test]
    fn test_list_tree_is_preorder() {
        let store = InMemoryTreeStore::new();
        let (a, b, c) = chain(&store);
        let second_root = store.create_node(NewNode::root(tree(), 1)).unwrap();
        let sibling = store.create_node(NewNode::child(tree(), a.id, 1)).unwrap();

        let ids: Vec<NodeId> = store
            .list_tree(&tree())
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![a.id, b.id, c.id, sibling.id, second_root.id]);

        let below_a: Vec<NodeId> = store
            .descendants_of(a.id)
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(below_a, vec![b.id, c.id, sibling.id]);
    }

    #[test]
    fn test_every_mutation_publishes_once() {
        let sink = Arc::new(CollectingSink::default());
        let store = InMemoryTreeStore::with_event_sink(sink.clone());
        let (a, b, _) = chain(&store);
        store.move_node(b.id, None, 1).unwrap();
        store
            .update_payload(a.id, serde_json::json!({"label": "Root"}))
            .unwrap();
        store.delete_node(b.id, true).unwrap();

        let events = sink.events.lock().unwrap();
        let kinds: Vec<ChangeKind> = events.iter().map(|e| e.change).collect();
        assert_eq!(
            kinds,
            vec![
                ChangeKind::Created,
                ChangeKind::Created,
                ChangeKind::Created,
                ChangeKind::Moved,
                ChangeKind::Updated,
                ChangeKind::Deleted,
            ]
        );
        assert!(events.iter().all(|e| e.tree_id == tree()));
    }

    #[test]
    fn test_rejected_writes_publish_nothing() {
        let sink = Arc::new(CollectingSink::default());
        let store = InMemoryTreeStore::with_event_sink(sink.clone());
        let (a, _, c) = chain(&store);
        let before = sink.events.lock().unwrap().len();

        assert!(store.move_node(a.id, Some(c.id), 0).is_err());
        assert!(store.delete_node(a.id, false).is_err());

        assert_eq!(sink.events.lock().unwrap().len(), before);
    }

    #[test]
    fn test_comment_approval_and_count() {
        let store = InMemoryTreeStore::new();
        let author = arbor_core::new_node_id();
        let thread = TreeId::from("comments:doc-1");
        let comment = store
            .create_node(NewNode::root(thread.clone(), 1).with_kind(NodeKind::pending_comment(Some(author))))
            .unwrap();

        assert_eq!(store.count_approved_comments(author).unwrap(), 0);
        let change = store.set_comment_approval(comment.id, true).unwrap();
        assert!(change.became_approved());
        assert_eq!(store.count_approved_comments(author).unwrap(), 1);

        let again = store.set_comment_approval(comment.id, true).unwrap();
        assert!(!again.became_approved());

        let plain = store.create_node(NewNode::root(thread, 2)).unwrap();
        assert!(matches!(
            store.set_comment_approval(plain.id, true),
            Err(ArborError::Tree(TreeError::NotAComment { .. }))
        ));
    }

    #[test]
    fn test_unknown_node_errors() {
        let store = InMemoryTreeStore::new();
        let id = arbor_core::new_node_id();
        assert!(store.get_node(id).unwrap().is_none());
        assert!(matches!(
            store.ancestors_of(id),
            Err(ArborError::Tree(TreeError::NodeNotFound { .. }))
        ));
        assert!(store.move_node(id, None, 0).is_err());
        assert!(store.delete_node(id, true).is_err());
    }
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
