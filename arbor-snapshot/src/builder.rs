//! Materializes a tree's nodes into a nested, language-specific snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use arbor_core::{ArborConfig, Node, NodeId, Snapshot, SnapshotNode, TreeId};
use chrono::Utc;

use crate::labels::{LabelProvider, PayloadLabelProvider};
use crate::resolver::ResolverRegistry;

/// Builds [`Snapshot`]s from flat node lists.
///
/// Pending comments are not rendered, and neither is anything below them.
/// Synthetic parents get their transient children from the registry.
pub struct SnapshotBuilder {
    registry: Arc<ResolverRegistry>,
    labels: Arc<dyn LabelProvider>,
    schema_version: u32,
}

impl SnapshotBuilder {
    pub fn new(
        registry: Arc<ResolverRegistry>,
        labels: Arc<dyn LabelProvider>,
        schema_version: u32,
    ) -> Self {
        Self {
            registry,
            labels,
            schema_version,
        }
    }

    /// Builder using payload labels and the configured schema version.
    pub fn from_config(registry: Arc<ResolverRegistry>, config: &ArborConfig) -> Self {
        Self::new(
            registry,
            Arc::new(PayloadLabelProvider::from_config(config)),
            config.schema_version,
        )
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Build a snapshot of `tree_id` from its nodes.
    ///
    /// `nodes` must list parents before children with siblings in order,
    /// as `TreeStore::list_tree` returns them. Nodes of other trees and
    /// nodes whose parent is absent are skipped.
    pub fn build(&self, tree_id: &TreeId, nodes: &[Node], language: &str) -> Snapshot {
        let mut children: HashMap<Option<NodeId>, Vec<&Node>> = HashMap::new();
        for node in nodes.iter().filter(|n| &n.tree_id == tree_id) {
            children.entry(node.parent_id).or_default().push(node);
        }

        let roots = self.render_level(&children, None, language);
        Snapshot {
            tree_id: tree_id.clone(),
            language: language.to_string(),
            schema_version: self.schema_version,
            built_at: Utc::now(),
            roots,
        }
    }

    fn render_level(
        &self,
        children: &HashMap<Option<NodeId>, Vec<&Node>>,
        parent: Option<NodeId>,
        language: &str,
    ) -> Vec<SnapshotNode> {
        children
            .get(&parent)
            .map(|level| {
                level
                    .iter()
                    .filter(|node| is_visible(node))
                    .map(|node| self.render(children, node, language))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn render(
        &self,
        children: &HashMap<Option<NodeId>, Vec<&Node>>,
        node: &Node,
        language: &str,
    ) -> SnapshotNode {
        SnapshotNode {
            id: node.id,
            depth: node.depth,
            order_key: node.order_key,
            kind: node.kind.clone(),
            label: self.labels.label(node, language),
            payload: node.payload.clone(),
            children: self.render_level(children, Some(node.id), language),
            transient_children: self.registry.resolve(node, language),
        }
    }
}

/// Pending comments are hidden; everything else renders.
fn is_visible(node: &Node) -> bool {
    node.kind.approved() != Some(false)
}

impl std::fmt::Debug for SnapshotBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotBuilder")
            .field("registry", &self.registry)
            .field("schema_version", &self.schema_version)
            .finish()
    }
}
