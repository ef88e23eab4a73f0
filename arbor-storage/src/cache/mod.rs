//! Snapshot cache: versioned keys, pluggable TTL backends and the
//! per-language cache layer.
//!
//! ```ignore
//! let layer = CacheLayer::from_config(Arc::new(InMemoryCacheBackend::new()), &config);
//! layer.set(&tree_id, "en", &snapshot, config.ttl_for(&tree_id));
//! assert!(layer.get(&tree_id, "en").is_some());
//!
//! // Any write to the tree drops every language at once.
//! layer.invalidate(&tree_id);
//! ```

mod key;
mod layer;
mod lmdb_backend;
mod memory;
mod traits;

pub use key::SnapshotKey;
pub use layer::{CacheLayer, CacheLayerStats};
pub use lmdb_backend::{LmdbCacheBackend, LmdbCacheError};
pub use memory::InMemoryCacheBackend;
pub use traits::{CacheBackend, CacheStats, CachedEntry};
