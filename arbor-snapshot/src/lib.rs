//! Arbor Snapshot - Materialization and Read-Through Reads
//!
//! Turns stored trees into language-specific [`Snapshot`]s, attaching
//! transient children from dynamic resolvers, and serves them through the
//! snapshot cache.
//!
//! ```text
//! TreeReader::read(tree, lang)
//!   ├─ CacheLayer::get ──────────────► hit: SnapshotRead { source: Cache }
//!   └─ miss: TreeStore::list_tree
//!            └─ SnapshotBuilder::build
//!                 ├─ LabelProvider::label        (per node)
//!                 └─ ResolverRegistry::resolve   (synthetic parents)
//!            └─ CacheLayer::set ─────────► SnapshotRead { source: Store }
//! ```
//!
//! [`Snapshot`]: arbor_core::Snapshot

mod builder;
mod labels;
mod reader;
mod resolver;

pub use builder::SnapshotBuilder;
pub use labels::{LabelProvider, PayloadLabelProvider};
pub use reader::{SnapshotRead, SnapshotSource, TreeReader};
pub use resolver::{
    CollaboratorResolver, DynamicNodeResolver, ResolverRegistry, TopNItem, TopNSource,
    CRITERIA_FIELD, DEFAULT_RESOLVER_LIMIT,
};
