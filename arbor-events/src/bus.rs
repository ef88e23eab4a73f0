//! Observer-style bus delivering [`NodeChanged`] events to registered handlers.
//!
//! Writers publish after their write commits. Delivery is synchronous and
//! in-process: `publish` returns once every handler has run. A failing
//! handler is logged and skipped; it never fails the publisher's write.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use arbor_core::{ArborResult, NodeChanged};

/// Receives node mutation events.
///
/// Handlers must be idempotent: delivery is at-least-once and the same
/// event may be observed twice.
pub trait EventHandler: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str {
        "handler"
    }

    fn handle(&self, event: &NodeChanged) -> ArborResult<()>;
}

impl<F> EventHandler for F
where
    F: Fn(&NodeChanged) -> ArborResult<()> + Send + Sync,
{
    fn handle(&self, event: &NodeChanged) -> ArborResult<()> {
        self(event)
    }
}

/// Anything a store can publish mutation events to.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: NodeChanged);
}

/// Handle returned by [`InvalidationBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    pub published: u64,
    pub deliveries: u64,
    pub handler_failures: u64,
}

/// Typed event bus for `NodeChanged`.
#[derive(Default)]
pub struct InvalidationBus {
    handlers: RwLock<Vec<(SubscriptionId, Arc<dyn EventHandler>)>>,
    next_id: AtomicU64,
    published: AtomicU64,
    deliveries: AtomicU64,
    failures: AtomicU64,
}

impl InvalidationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Every later `publish` reaches it.
    pub fn subscribe(&self, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut handlers = match self.handlers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tracing::debug!(handler = handler.name(), "subscribed event handler");
        handlers.push((id, handler));
        id
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = match self.handlers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = handlers.len();
        handlers.retain(|(sid, _)| *sid != id);
        handlers.len() != before
    }

    pub fn handler_count(&self) -> usize {
        match self.handlers.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            published: self.published.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            handler_failures: self.failures.load(Ordering::Relaxed),
        }
    }

    /// Deliver an event to every handler, each exactly once.
    ///
    /// The handler list is copied before delivery so handlers may publish
    /// or subscribe without deadlocking.
    pub fn publish(&self, event: NodeChanged) {
        let handlers: Vec<Arc<dyn EventHandler>> = match self.handlers.read() {
            Ok(guard) => guard.iter().map(|(_, h)| Arc::clone(h)).collect(),
            Err(poisoned) => poisoned
                .into_inner()
                .iter()
                .map(|(_, h)| Arc::clone(h))
                .collect(),
        };
        self.published.fetch_add(1, Ordering::Relaxed);

        for handler in handlers {
            self.deliveries.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = handler.handle(&event) {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    handler = handler.name(),
                    tree_id = %event.tree_id,
                    error = %e,
                    "event handler failed"
                );
            }
        }
    }
}

impl EventSink for InvalidationBus {
    fn publish(&self, event: NodeChanged) {
        InvalidationBus::publish(self, event)
    }
}

impl std::fmt::Debug for InvalidationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationBus")
            .field("handlers", &self.handler_count())
            .field("stats", &self.stats())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod prop_tests {
    use super::*;
    use arbor_core::{ChangeKind, TreeId};
    use proptest::prelude::*;
    use std::sync::atomic::AtomicUsize;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Every publish reaches each currently subscribed handler exactly once.
        #[test]
        fn prop_delivery_matches_subscriptions(
            subscribed in 0usize..8,
            dropped in proptest::collection::vec(any::<bool>(), 8),
            publishes in 1usize..5,
        ) {
            let bus = InvalidationBus::new();
            let counters: Vec<Arc<AtomicUsize>> =
                (0..subscribed).map(|_| Arc::new(AtomicUsize::new(0))).collect();
            let ids: Vec<SubscriptionId> = counters
                .iter()
                .map(|counter| {
                    let counter = Arc::clone(counter);
                    bus.subscribe(Arc::new(move |_: &NodeChanged| -> ArborResult<()> {
                        counter.fetch_add(1, Ordering::Relaxed);
                        Ok(())
                    }))
                })
                .collect();
            for (id, gone) in ids.iter().zip(&dropped) {
                if *gone {
                    prop_assert!(bus.unsubscribe(*id));
                }
            }

            for _ in 0..publishes {
                bus.publish(NodeChanged::for_tree(TreeId::from("t"), ChangeKind::Updated));
            }

            let mut live = 0;
            for (counter, gone) in counters.iter().zip(&dropped) {
                let expected = if *gone { 0 } else { publishes };
                if !*gone {
                    live += 1;
                }
                prop_assert_eq!(counter.load(Ordering::Relaxed), expected);
            }
            prop_assert_eq!(bus.handler_count(), live);
            prop_assert_eq!(bus.stats().deliveries, (live * publishes) as u64);
        }
    }
}
