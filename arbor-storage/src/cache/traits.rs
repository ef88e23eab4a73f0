//! Cache backend trait and statistics.

use std::time::Duration;

use arbor_core::{ArborResult, Timestamp};
use chrono::{DateTime, Utc};

use super::key::SnapshotKey;

/// A stored value with its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntry {
    pub bytes: Vec<u8>,
    pub cached_at: Timestamp,
    pub expires_at: Timestamp,
}

impl CachedEntry {
    pub fn new(bytes: Vec<u8>, ttl: Duration) -> Self {
        let cached_at = Utc::now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| cached_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            bytes,
            cached_at,
            expires_at,
        }
    }

    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Pluggable byte store for snapshots.
///
/// Implementations are thread-safe and never return an expired entry.
/// Errors are surfaced to the cache layer, which treats them as misses.
pub trait CacheBackend: Send + Sync {
    /// Fetch a live entry.
    fn get(&self, key: &SnapshotKey) -> ArborResult<Option<CachedEntry>>;

    /// Store bytes under `key` for `ttl`, replacing any previous value.
    fn set(&self, key: &SnapshotKey, bytes: &[u8], ttl: Duration) -> ArborResult<()>;

    /// Remove an entry. Returns true if one was present.
    fn delete(&self, key: &SnapshotKey) -> ArborResult<bool>;

    fn stats(&self) -> CacheStats;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses (including expired entries).
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Approximate stored bytes.
    pub memory_bytes: u64,
    /// Entries dropped because their TTL ran out.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
