//! Cross-tree forwarding owned by collaborating components.
//!
//! A menu whose special entry lists categories renders stale labels once a
//! category changes. The component that wires those trees together
//! registers a [`TreeLinkHandler`] so a change in the source tree is
//! republished for each dependent tree.

use std::collections::HashMap;
use std::sync::Weak;

use arbor_core::{ArborResult, NodeChanged, TreeId};

use crate::bus::{EventHandler, EventSink};

/// Republishes events from a source tree for its dependent trees.
///
/// Forwarding is one hop: only events carrying a `node_id` (direct writes)
/// are forwarded, and forwarded events carry none, so mutual links cannot
/// loop.
pub struct TreeLinkHandler {
    links: HashMap<TreeId, Vec<TreeId>>,
    sink: Weak<dyn EventSink>,
}

impl TreeLinkHandler {
    pub fn new(sink: Weak<dyn EventSink>) -> Self {
        Self {
            links: HashMap::new(),
            sink,
        }
    }

    /// Declare that changes in `source` also invalidate `dependent`.
    pub fn link(mut self, source: impl Into<TreeId>, dependent: impl Into<TreeId>) -> Self {
        let dependents = self.links.entry(source.into()).or_default();
        let dependent = dependent.into();
        if !dependents.contains(&dependent) {
            dependents.push(dependent);
        }
        self
    }

    pub fn dependents_of(&self, source: &TreeId) -> &[TreeId] {
        self.links.get(source).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl EventHandler for TreeLinkHandler {
    fn name(&self) -> &str {
        "tree-link"
    }

    fn handle(&self, event: &NodeChanged) -> ArborResult<()> {
        if event.node_id.is_none() {
            return Ok(());
        }
        let dependents = self.dependents_of(&event.tree_id);
        if dependents.is_empty() {
            return Ok(());
        }
        // Bus already dropped: nothing left to notify.
        let Some(sink) = self.sink.upgrade() else {
            return Ok(());
        };
        for dependent in dependents {
            tracing::debug!(
                source = %event.tree_id,
                dependent = %dependent,
                "forwarding tree change"
            );
            sink.publish(NodeChanged::for_tree(dependent.clone(), event.change));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InvalidationBus;
    use arbor_core::{ChangeKind, StorageError};
    use std::sync::{Arc, Mutex};

    fn recorder(bus: &InvalidationBus) -> Arc<Mutex<Vec<NodeChanged>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(Arc::new(move |e: &NodeChanged| -> ArborResult<()> {
            sink.lock()
                .map_err(|_| StorageError::LockPoisoned)?
                .push(e.clone());
            Ok(())
        }));
        seen
    }

    #[test]
    fn test_forwards_direct_writes_to_dependents() {
        let bus = Arc::new(InvalidationBus::new());
        let weak: Weak<dyn EventSink> = Arc::downgrade(&bus) as Weak<dyn EventSink>;
        bus.subscribe(Arc::new(
            TreeLinkHandler::new(weak)
                .link("categories", "main-menu")
                .link("categories", "footer"),
        ));
        let seen = recorder(&bus);

        bus.publish(NodeChanged::new(
            TreeId::from("categories"),
            arbor_core::new_node_id(),
            ChangeKind::Updated,
        ));

        let trees: Vec<String> = seen
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.tree_id.to_string())
            .collect();
        assert_eq!(trees, vec!["main-menu", "footer", "categories"]);
    }

    #[test]
    fn test_mutual_links_do_not_loop() {
        let bus = Arc::new(InvalidationBus::new());
        let weak: Weak<dyn EventSink> = Arc::downgrade(&bus) as Weak<dyn EventSink>;
        bus.subscribe(Arc::new(
            TreeLinkHandler::new(weak).link("a", "b").link("b", "a"),
        ));
        let seen = recorder(&bus);

        bus.publish(NodeChanged::new(
            TreeId::from("a"),
            arbor_core::new_node_id(),
            ChangeKind::Created,
        ));

        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_duplicate_links_are_collapsed() {
        let bus = Arc::new(InvalidationBus::new());
        let weak: Weak<dyn EventSink> = Arc::downgrade(&bus) as Weak<dyn EventSink>;
        let handler = TreeLinkHandler::new(weak)
            .link("categories", "main-menu")
            .link("categories", "main-menu");
        assert_eq!(handler.dependents_of(&TreeId::from("categories")).len(), 1);
        assert!(handler.dependents_of(&TreeId::from("pages")).is_empty());
    }
}
