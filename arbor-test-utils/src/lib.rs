//! Arbor Test Utilities
//!
//! Shared test infrastructure for the arbor workspace:
//! - Proptest generators for ids, kinds and tree shapes
//! - Scripted and failing collaborators (top-N sources, cache backend,
//!   trust store, event handler)
//! - Fixtures for the menu, category and thread scenarios
//! - Assertions over tree invariants

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, Once};
use std::time::Duration;

pub use arbor_core::{
    ArborConfig, ArborError, ArborResult, AuthorId, CacheError, ChangeKind, NewNode, Node,
    NodeChanged, NodeId, NodeKind, Snapshot, StorageError, TreeError, TreeId,
};
pub use arbor_storage::{InMemoryTreeStore, TreeStore};

use arbor_events::EventHandler;
use arbor_snapshot::{TopNItem, TopNSource};
use arbor_core::OrderKey;
use arbor_storage::{ApprovalChange, CacheBackend, CacheStats, CachedEntry, SnapshotKey};
use arbor_threads::AuthorTrustStore;

// ============================================================================
// LOGGING
// ============================================================================

static TRACING: Once = Once::new();

/// Install a fmt subscriber filtered by `RUST_LOG` (default `warn`).
/// Safe to call from every test.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// COLLABORATORS
// ============================================================================

/// Top-N source returning a fixed list, ignoring the requested limit.
#[derive(Debug, Default)]
pub struct StaticTopNSource {
    items: Vec<TopNItem>,
    calls: AtomicUsize,
}

impl StaticTopNSource {
    pub fn new(items: Vec<TopNItem>) -> Self {
        Self {
            items,
            calls: AtomicUsize::new(0),
        }
    }

    /// `count` items labelled `"{prefix} 1"`, `"{prefix} 2"`, ...
    pub fn numbered(prefix: &str, count: usize) -> Self {
        Self::new(
            (1..=count)
                .map(|i| TopNItem::new(format!("{prefix} {i}"), format!("/{prefix}/{i}")))
                .collect(),
        )
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl TopNSource for StaticTopNSource {
    fn top_n(&self, _criteria: &str, _limit: usize, _language: &str) -> ArborResult<Vec<TopNItem>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.items.clone())
    }
}

/// Top-N source whose every query fails.
#[derive(Debug, Default)]
pub struct FailingTopNSource;

impl TopNSource for FailingTopNSource {
    fn top_n(&self, criteria: &str, _limit: usize, _language: &str) -> ArborResult<Vec<TopNItem>> {
        Err(StorageError::Backend {
            reason: format!("collaborator query {criteria} failed"),
        }
        .into())
    }
}

/// Cache backend that is always unavailable.
#[derive(Debug, Default)]
pub struct FailingCacheBackend;

impl FailingCacheBackend {
    fn unavailable<T>() -> ArborResult<T> {
        Err(CacheError::Unavailable {
            reason: "connection refused".to_string(),
        }
        .into())
    }
}

impl CacheBackend for FailingCacheBackend {
    fn get(&self, _key: &SnapshotKey) -> ArborResult<Option<CachedEntry>> {
        Self::unavailable()
    }

    fn set(&self, _key: &SnapshotKey, _bytes: &[u8], _ttl: Duration) -> ArborResult<()> {
        Self::unavailable()
    }

    fn delete(&self, _key: &SnapshotKey) -> ArborResult<bool> {
        Self::unavailable()
    }

    fn stats(&self) -> CacheStats {
        CacheStats::default()
    }
}

/// Trust store whose queries fail; writes are counted.
#[derive(Debug, Default)]
pub struct FailingTrustStore {
    writes: AtomicUsize,
}

impl FailingTrustStore {
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

impl AuthorTrustStore for FailingTrustStore {
    fn get_trust(&self, author_id: AuthorId) -> ArborResult<bool> {
        Err(arbor_core::TrustError::QueryFailed {
            author_id,
            reason: "trust table locked".to_string(),
        }
        .into())
    }

    fn set_trusted(&self, _author_id: AuthorId) -> ArborResult<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Event handler that records every event it receives.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    events: Mutex<Vec<NodeChanged>>,
}

impl RecordingHandler {
    pub fn events(&self) -> Vec<NodeChanged> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn trees(&self) -> Vec<TreeId> {
        self.events().into_iter().map(|e| e.tree_id).collect()
    }
}

impl EventHandler for RecordingHandler {
    fn name(&self) -> &str {
        "recording"
    }

    fn handle(&self, event: &NodeChanged) -> ArborResult<()> {
        self.events
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?
            .push(event.clone());
        Ok(())
    }
}

/// In-memory tree store whose approved-comment count query fails.
#[derive(Debug, Default)]
pub struct CountFailingTreeStore {
    inner: InMemoryTreeStore,
}

impl TreeStore for CountFailingTreeStore {
    fn create_node(&self, new: NewNode) -> ArborResult<Node> {
        self.inner.create_node(new)
    }

    fn move_node(
        &self,
        id: NodeId,
        new_parent_id: Option<NodeId>,
        new_order_key: OrderKey,
    ) -> ArborResult<Node> {
        self.inner.move_node(id, new_parent_id, new_order_key)
    }

    fn delete_node(&self, id: NodeId, cascade: bool) -> ArborResult<Vec<NodeId>> {
        self.inner.delete_node(id, cascade)
    }

    fn update_payload(&self, id: NodeId, payload: serde_json::Value) -> ArborResult<Node> {
        self.inner.update_payload(id, payload)
    }

    fn set_comment_approval(&self, id: NodeId, approved: bool) -> ArborResult<ApprovalChange> {
        self.inner.set_comment_approval(id, approved)
    }

    fn get_node(&self, id: NodeId) -> ArborResult<Option<Node>> {
        self.inner.get_node(id)
    }

    fn list_children(&self, tree_id: &TreeId, parent_id: Option<NodeId>) -> ArborResult<Vec<Node>> {
        self.inner.list_children(tree_id, parent_id)
    }

    fn ancestors_of(&self, id: NodeId) -> ArborResult<Vec<Node>> {
        self.inner.ancestors_of(id)
    }

    fn descendants_of(&self, id: NodeId) -> ArborResult<Vec<Node>> {
        self.inner.descendants_of(id)
    }

    fn list_tree(&self, tree_id: &TreeId) -> ArborResult<Vec<Node>> {
        self.inner.list_tree(tree_id)
    }

    fn count_approved_comments(&self, _author_id: AuthorId) -> ArborResult<u64> {
        Err(StorageError::Backend {
            reason: "comment count timed out".to_string(),
        }
        .into())
    }

    fn tree_ids(&self) -> ArborResult<Vec<TreeId>> {
        self.inner.tree_ids()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for arbor types.

    use super::*;
    use proptest::prelude::*;

    /// Menu, category or thread tree ids (thread ids contain `:`).
    pub fn arb_tree_id() -> impl Strategy<Value = TreeId> {
        prop_oneof![
            "[a-z][a-z-]{0,15}".prop_map(|s| TreeId::from(s.as_str())),
            any::<u128>().prop_map(|n| TreeId::thread_for(arbor_core::NodeId::from_u128(n))),
        ]
    }

    pub fn arb_language() -> impl Strategy<Value = String> {
        prop_oneof![Just("en"), Just("es"), Just("de"), Just("fr")].prop_map(String::from)
    }

    pub fn arb_node_kind() -> impl Strategy<Value = NodeKind> {
        prop_oneof![
            Just(NodeKind::Plain),
            "[a-z][a-z-]{0,11}".prop_map(NodeKind::synthetic),
            (any::<bool>(), proptest::option::of(any::<u128>())).prop_map(|(approved, author)| {
                NodeKind::Comment {
                    approved,
                    author_id: author.map(arbor_core::NodeId::from_u128),
                }
            }),
        ]
    }

    /// Tree shape as parent indices: entry `i` is `None` (root) or the
    /// index of an earlier node.
    pub fn arb_tree_shape(max_nodes: usize) -> impl Strategy<Value = Vec<Option<usize>>> {
        proptest::collection::vec(proptest::option::of(any::<prop::sample::Index>()), 1..max_nodes)
            .prop_map(|picks| {
                picks
                    .into_iter()
                    .enumerate()
                    .map(|(i, pick)| match pick {
                        Some(index) if i > 0 => Some(index.index(i)),
                        _ => None,
                    })
                    .collect()
            })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common scenarios.

    use super::*;

    /// Two-language configuration with an `important-docs` resolver limited to 2.
    pub fn menu_config() -> ArborConfig {
        ArborConfig::for_languages(["en", "es"]).with_resolver("important-docs", 2)
    }

    /// Root `A`, child `B` of `A`, child `C` of `B`.
    pub fn chain(store: &dyn TreeStore, tree: &TreeId) -> ArborResult<(Node, Node, Node)> {
        let a = store.create_node(NewNode::root(tree.clone(), 0))?;
        let b = store.create_node(NewNode::child(tree.clone(), a.id, 0))?;
        let c = store.create_node(NewNode::child(tree.clone(), b.id, 0))?;
        Ok((a, b, c))
    }

    /// Materialize a shape from [`generators::arb_tree_shape`].
    pub fn build_shape(
        store: &dyn TreeStore,
        tree: &TreeId,
        shape: &[Option<usize>],
    ) -> ArborResult<Vec<Node>> {
        let mut nodes: Vec<Node> = Vec::with_capacity(shape.len());
        for (i, parent) in shape.iter().enumerate() {
            let order_key = (i % 3) as i64;
            let new = match parent.and_then(|p| nodes.get(p)) {
                Some(parent) => NewNode::child(tree.clone(), parent.id, order_key),
                None => NewNode::root(tree.clone(), order_key),
            };
            nodes.push(store.create_node(new)?);
        }
        Ok(nodes)
    }

    /// A plain labelled menu entry.
    pub fn link(tree: &TreeId, parent: Option<NodeId>, order: i64, en: &str, es: &str) -> NewNode {
        NewNode {
            parent_id: parent,
            ..NewNode::root(tree.clone(), order)
        }
        .with_payload(serde_json::json!({
            "labels": {"en": en, "es": es},
            "url": format!("/{}", en.to_lowercase()),
        }))
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over arbor invariants.

    use super::*;

    /// Assert that an ArborResult is a tree error matching `pred`.
    #[track_caller]
    pub fn assert_tree_error<T: std::fmt::Debug>(
        result: &ArborResult<T>,
        pred: impl Fn(&TreeError) -> bool,
    ) {
        match result {
            Err(ArborError::Tree(e)) if pred(e) => {}
            other => panic!("Expected matching Tree error, got: {:?}", other),
        }
    }

    /// Assert depth and acyclicity for every node of `tree`.
    #[track_caller]
    pub fn assert_tree_consistent(store: &dyn TreeStore, tree: &TreeId) {
        let nodes = store.list_tree(tree).expect("list_tree should succeed");
        for node in &nodes {
            let ancestors = store
                .ancestors_of(node.id)
                .expect("ancestors_of should succeed");
            assert!(ancestors.len() <= nodes.len(), "parent chain of {} loops", node.id);
            assert_eq!(node.depth as usize, ancestors.len(), "depth of {}", node.id);
            if let Some(parent) = ancestors.last() {
                assert_eq!(Some(parent.id), node.parent_id);
                assert_eq!(node.depth, parent.depth + 1);
            } else {
                assert!(node.is_root());
            }
        }
    }
}
