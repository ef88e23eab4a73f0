//! Arbor Core - Node, Snapshot and Event Types
//!
//! Pure data structures shared by every arbor crate: node identity and kinds,
//! materialized snapshots, mutation events, errors and configuration.
//! This crate contains no storage or caching logic.

mod config;
mod error;
mod event;
mod identity;
mod node;
mod snapshot;

pub use config::{
    ArborConfig, CacheSettings, LmdbSettings, PromotionSettings, ResolverSettings,
    DEFAULT_PROMOTION_THRESHOLD, DEFAULT_TTL_SECS,
};
pub use error::{
    ArborError, ArborResult, CacheError, ConfigError, ResolverError, StorageError, TreeError,
    TrustError,
};
pub use event::{ChangeKind, NodeChanged};
pub use identity::{
    new_node_id, order_key_from_timestamp, AuthorId, NodeId, OrderKey, Timestamp, TreeId,
};
pub use node::{NewNode, Node, NodeKind, NodeKindParseError};
pub use snapshot::{Snapshot, SnapshotNode, TransientChild};
