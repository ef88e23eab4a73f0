//! Versioned, per-language snapshot cache over a pluggable backend.
//!
//! Snapshots embed language-specific labels, so each tree is cached once
//! per configured language and `invalidate` fans out over the whole
//! language set. Backend failures never reach the caller: a failed read is
//! a miss and a failed write or delete is logged and skipped.
//!
//! Each tree carries an invalidation generation. Readers capture it before
//! loading from the store and populate through [`CacheLayer::set_if_current`],
//! so a snapshot built from pre-write data is never left behind by an
//! invalidation that ran while it was being built.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use arbor_core::{ArborConfig, ArborError, CacheError, Snapshot, TreeId};

use super::key::SnapshotKey;
use super::traits::{CacheBackend, CacheStats};

/// Layer counters plus the backend's own statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheLayerStats {
    pub backend: CacheStats,
    /// Snapshots written.
    pub stores: u64,
    /// `invalidate` calls.
    pub invalidations: u64,
    /// Backend errors absorbed as misses or no-ops.
    pub degraded: u64,
    /// Writes dropped because the tree was invalidated mid-build.
    pub stale_skips: u64,
}

/// Read-through snapshot cache injected into readers and invalidators.
pub struct CacheLayer {
    backend: Arc<dyn CacheBackend>,
    languages: Vec<String>,
    schema_version: u32,
    generations: RwLock<HashMap<TreeId, u64>>,
    stores: AtomicU64,
    invalidations: AtomicU64,
    degraded: AtomicU64,
    stale_skips: AtomicU64,
}

impl CacheLayer {
    pub fn new(
        backend: Arc<dyn CacheBackend>,
        languages: impl IntoIterator<Item = impl Into<String>>,
        schema_version: u32,
    ) -> Self {
        Self {
            backend,
            languages: languages.into_iter().map(Into::into).collect(),
            schema_version,
            generations: RwLock::new(HashMap::new()),
            stores: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            degraded: AtomicU64::new(0),
            stale_skips: AtomicU64::new(0),
        }
    }

    /// Layer over `backend` using the configured languages and schema version.
    pub fn from_config(backend: Arc<dyn CacheBackend>, config: &ArborConfig) -> Self {
        Self::new(backend, config.languages.iter().cloned(), config.schema_version)
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn key(&self, tree_id: &TreeId, language: &str) -> SnapshotKey {
        SnapshotKey::new(tree_id.clone(), language, self.schema_version)
    }

    /// Invalidation generation of `tree_id`; bumped by every `invalidate`.
    pub fn generation(&self, tree_id: &TreeId) -> u64 {
        let generations = self.generations.read().unwrap_or_else(|e| e.into_inner());
        generations.get(tree_id).copied().unwrap_or(0)
    }

    fn bump_generation(&self, tree_id: &TreeId) {
        let mut generations = self.generations.write().unwrap_or_else(|e| e.into_inner());
        *generations.entry(tree_id.clone()).or_insert(0) += 1;
    }

    /// Cached snapshot for a tree in one language.
    pub fn get(&self, tree_id: &TreeId, language: &str) -> Option<Snapshot> {
        let key = self.key(tree_id, language);
        let entry = match self.backend.get(&key) {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                self.degrade("get", &key, &e);
                return None;
            }
        };

        match serde_json::from_slice::<Snapshot>(&entry.bytes) {
            Ok(snapshot) => {
                tracing::debug!(key = %key, "snapshot cache hit");
                Some(snapshot)
            }
            Err(e) => {
                let err: ArborError = CacheError::Deserialization {
                    reason: e.to_string(),
                }
                .into();
                self.degrade("decode", &key, &err);
                // Unreadable entries are dropped so the next read repopulates.
                if let Err(e) = self.backend.delete(&key) {
                    self.degrade("delete", &key, &e);
                }
                None
            }
        }
    }

    /// Store a snapshot for `ttl`. A zero `ttl` stores nothing.
    ///
    /// Returns true if the snapshot was written.
    pub fn set(&self, tree_id: &TreeId, language: &str, snapshot: &Snapshot, ttl: Duration) -> bool {
        if ttl.is_zero() {
            return false;
        }
        let key = self.key(tree_id, language);
        let bytes = match serde_json::to_vec(snapshot) {
            Ok(bytes) => bytes,
            Err(e) => {
                let err: ArborError = CacheError::Serialization {
                    reason: e.to_string(),
                }
                .into();
                self.degrade("encode", &key, &err);
                return false;
            }
        };

        match self.backend.set(&key, &bytes, ttl) {
            Ok(()) => {
                self.stores.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %key, bytes = bytes.len(), ttl_secs = ttl.as_secs(), "snapshot cached");
                true
            }
            Err(e) => {
                self.degrade("set", &key, &e);
                false
            }
        }
    }

    /// Store a snapshot built after observing `generation`.
    ///
    /// Nothing is kept if `tree_id` was invalidated since: the write is
    /// skipped, or removed again when the invalidation lands during it.
    /// Returns true if the snapshot remains cached.
    pub fn set_if_current(
        &self,
        tree_id: &TreeId,
        language: &str,
        snapshot: &Snapshot,
        ttl: Duration,
        generation: u64,
    ) -> bool {
        if self.generation(tree_id) != generation {
            self.skip_stale(tree_id, language);
            return false;
        }
        if !self.set(tree_id, language, snapshot, ttl) {
            return false;
        }
        // `invalidate` bumps before deleting, so a change seen here means
        // the delete may already have run ahead of our write.
        if self.generation(tree_id) != generation {
            let key = self.key(tree_id, language);
            if let Err(e) = self.backend.delete(&key) {
                self.degrade("delete", &key, &e);
            }
            self.skip_stale(tree_id, language);
            return false;
        }
        true
    }

    /// Delete the entry for every configured language of `tree_id`.
    ///
    /// Idempotent: absent entries are skipped. Returns the number of
    /// entries actually removed.
    pub fn invalidate(&self, tree_id: &TreeId) -> usize {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        self.bump_generation(tree_id);
        let mut removed = 0;
        for language in &self.languages {
            let key = self.key(tree_id, language);
            match self.backend.delete(&key) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => self.degrade("delete", &key, &e),
            }
        }
        tracing::info!(tree_id = %tree_id, removed, "invalidated tree snapshots");
        removed
    }

    pub fn stats(&self) -> CacheLayerStats {
        CacheLayerStats {
            backend: self.backend.stats(),
            stores: self.stores.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
            stale_skips: self.stale_skips.load(Ordering::Relaxed),
        }
    }

    fn skip_stale(&self, tree_id: &TreeId, language: &str) {
        self.stale_skips.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(tree_id = %tree_id, language, "tree invalidated during build, not caching");
    }

    fn degrade(&self, op: &'static str, key: &SnapshotKey, error: &ArborError) {
        self.degraded.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(op, key = %key, error = %error, "cache backend degraded");
    }
}

impl std::fmt::Debug for CacheLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLayer")
            .field("languages", &self.languages)
            .field("schema_version", &self.schema_version)
            .field("stats", &self.stats())
            .finish()
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use crate::cache::InMemoryCacheBackend;
    use chrono::Utc;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Invalidating twice leaves the same state as invalidating once,
        /// and every configured language reads as a miss afterwards.
        #[test]
        fn prop_invalidate_idempotent(
            cached in proptest::collection::vec(any::<bool>(), 3),
            tree in "[a-z]{1,8}(:[a-z0-9]{1,8})?",
        ) {
            let languages = ["en", "es", "de"];
            let layer = CacheLayer::new(Arc::new(InMemoryCacheBackend::new()), languages, 1);
            let tree_id = TreeId::from(tree.as_str());
            for (lang, present) in languages.iter().zip(&cached) {
                if *present {
                    let snap = Snapshot {
                        tree_id: tree_id.clone(),
                        language: lang.to_string(),
                        schema_version: 1,
                        built_at: Utc::now(),
                        roots: Vec::new(),
                    };
                    layer.set(&tree_id, lang, &snap, Duration::from_secs(60));
                }
            }

            let first = layer.invalidate(&tree_id);
            prop_assert_eq!(first, cached.iter().filter(|c| **c).count());
            prop_assert_eq!(layer.invalidate(&tree_id), 0);
            for lang in languages {
                prop_assert!(layer.get(&tree_id, lang).is_none());
            }
        }
    }
}
