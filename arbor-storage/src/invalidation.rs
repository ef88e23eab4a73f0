//! Bus handler that busts cached snapshots on node writes.

use std::sync::Arc;

use arbor_core::{ArborResult, NodeChanged};
use arbor_events::{EventHandler, InvalidationBus, SubscriptionId};

use crate::cache::CacheLayer;

/// Calls [`CacheLayer::invalidate`] once per received event.
#[derive(Debug, Clone)]
pub struct CacheInvalidator {
    cache: Arc<CacheLayer>,
}

impl CacheInvalidator {
    pub fn new(cache: Arc<CacheLayer>) -> Self {
        Self { cache }
    }
}

impl EventHandler for CacheInvalidator {
    fn name(&self) -> &str {
        "cache-invalidator"
    }

    fn handle(&self, event: &NodeChanged) -> ArborResult<()> {
        let removed = self.cache.invalidate(&event.tree_id);
        tracing::debug!(
            tree_id = %event.tree_id,
            change = ?event.change,
            removed,
            "handled node change"
        );
        Ok(())
    }
}

/// Subscribe a [`CacheInvalidator`] for `cache` to `bus`.
pub fn wire_invalidation(bus: &InvalidationBus, cache: Arc<CacheLayer>) -> SubscriptionId {
    bus.subscribe(Arc::new(CacheInvalidator::new(cache)))
}
