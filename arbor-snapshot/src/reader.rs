//! Read-through tree reads: cache first, store on a miss.

use std::sync::Arc;

use arbor_core::{ArborConfig, ArborResult, Snapshot, TreeId};
use arbor_storage::{CacheLayer, TreeStore};

use crate::builder::SnapshotBuilder;

/// Where a snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    Cache,
    Store,
}

/// A snapshot plus its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRead {
    pub snapshot: Snapshot,
    pub source: SnapshotSource,
}

impl SnapshotRead {
    pub fn from_cache(&self) -> bool {
        self.source == SnapshotSource::Cache
    }
}

/// Serves tree snapshots through the cache layer.
///
/// Concurrent misses for the same key each rebuild and each `set`; the
/// last write wins and both values are equivalent. A build that overlaps
/// an invalidation of its tree is returned but not cached.
pub struct TreeReader {
    store: Arc<dyn TreeStore>,
    cache: Arc<CacheLayer>,
    builder: SnapshotBuilder,
    config: ArborConfig,
}

impl TreeReader {
    pub fn new(
        store: Arc<dyn TreeStore>,
        cache: Arc<CacheLayer>,
        builder: SnapshotBuilder,
        config: ArborConfig,
    ) -> Self {
        Self {
            store,
            cache,
            builder,
            config,
        }
    }

    /// Snapshot of `tree_id` in `language`.
    ///
    /// An unknown or empty tree yields an empty snapshot, which is not
    /// cached. Only a failing store surfaces as an error.
    pub fn read(&self, tree_id: &TreeId, language: &str) -> ArborResult<SnapshotRead> {
        if let Some(snapshot) = self.cache.get(tree_id, language) {
            return Ok(SnapshotRead {
                snapshot,
                source: SnapshotSource::Cache,
            });
        }

        tracing::info!(tree_id = %tree_id, language, "snapshot cache miss, building");
        let generation = self.cache.generation(tree_id);
        let nodes = self.store.list_tree(tree_id)?;
        let snapshot = self.builder.build(tree_id, &nodes, language);

        if snapshot.is_empty() {
            tracing::warn!(tree_id = %tree_id, language, "tree has no nodes");
        } else {
            self.cache.set_if_current(
                tree_id,
                language,
                &snapshot,
                self.config.ttl_for(tree_id),
                generation,
            );
        }

        Ok(SnapshotRead {
            snapshot,
            source: SnapshotSource::Store,
        })
    }

    /// Build and cache the snapshot for every configured language.
    pub fn warm(&self, tree_id: &TreeId) -> ArborResult<usize> {
        let mut built = 0;
        for language in &self.config.languages {
            if !self.read(tree_id, language)?.from_cache() {
                built += 1;
            }
        }
        Ok(built)
    }

    pub fn cache(&self) -> &Arc<CacheLayer> {
        &self.cache
    }
}

impl std::fmt::Debug for TreeReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeReader")
            .field("cache", &self.cache)
            .field("builder", &self.builder)
            .finish()
    }
}
