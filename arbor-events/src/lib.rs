//! Arbor Events - Invalidation Bus
//!
//! Explicit observer-pattern delivery of [`NodeChanged`] events from tree
//! writers to cache invalidation and other subscribers.
//!
//! # Architecture
//!
//! ```text
//! TreeStore write ──commit──→ EventSink::publish(NodeChanged)
//!                                  │
//!                                  ├──→ CacheInvalidator  (busts every language)
//!                                  └──→ TreeLinkHandler   (republishes for dependents)
//! ```
//!
//! # Key Types
//!
//! - `EventHandler`: a subscriber; closures implement it too
//! - `EventSink`: what stores publish to
//! - `InvalidationBus`: the in-process bus
//! - `TreeLinkHandler`: opt-in cross-tree forwarding

mod bus;
mod forward;

pub use bus::{BusStats, EventHandler, EventSink, InvalidationBus, SubscriptionId};
pub use forward::TreeLinkHandler;

// Re-export core event types for convenience
pub use arbor_core::{ChangeKind, NodeChanged};
