//! In-process cache backend with TTL expiry.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use arbor_core::{ArborResult, StorageError};
use chrono::Utc;

use super::key::SnapshotKey;
use super::traits::{CacheBackend, CacheStats, CachedEntry};

/// `HashMap`-backed [`CacheBackend`]. Expired entries are dropped on read
/// or by [`InMemoryCacheBackend::purge_expired`].
#[derive(Debug, Default)]
pub struct InMemoryCacheBackend {
    entries: RwLock<HashMap<SnapshotKey, CachedEntry>>,
    stats: RwLock<CacheStats>,
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry. Returns the number removed.
    pub fn purge_expired(&self) -> ArborResult<usize> {
        let now = Utc::now();
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        let removed = before - entries.len();
        let (count, bytes) = totals(&entries);
        drop(entries);

        if let Ok(mut stats) = self.stats.write() {
            stats.evictions += removed as u64;
            stats.entry_count = count;
            stats.memory_bytes = bytes;
        }
        Ok(removed)
    }

    fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }
}

fn totals(entries: &HashMap<SnapshotKey, CachedEntry>) -> (u64, u64) {
    let bytes = entries.values().map(|e| e.bytes.len() as u64).sum();
    (entries.len() as u64, bytes)
}

impl CacheBackend for InMemoryCacheBackend {
    fn get(&self, key: &SnapshotKey) -> ArborResult<Option<CachedEntry>> {
        let live = {
            let entries = self
                .entries
                .read()
                .map_err(|_| StorageError::LockPoisoned)?;
            match entries.get(key) {
                Some(entry) if !entry.is_expired() => Some(Some(entry.clone())),
                Some(_) => None,
                None => Some(None),
            }
        };

        match live {
            Some(Some(entry)) => {
                self.record(|s| s.hits += 1);
                Ok(Some(entry))
            }
            Some(None) => {
                self.record(|s| s.misses += 1);
                Ok(None)
            }
            None => {
                // Expired: evict under the write lock.
                let mut entries = self
                    .entries
                    .write()
                    .map_err(|_| StorageError::LockPoisoned)?;
                let evicted = match entries.get(key) {
                    Some(entry) if entry.is_expired() => entries.remove(key).is_some(),
                    _ => false,
                };
                let (count, bytes) = totals(&entries);
                drop(entries);
                self.record(|s| {
                    s.misses += 1;
                    if evicted {
                        s.evictions += 1;
                    }
                    s.entry_count = count;
                    s.memory_bytes = bytes;
                });
                Ok(None)
            }
        }
    }

    fn set(&self, key: &SnapshotKey, bytes: &[u8], ttl: Duration) -> ArborResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        entries.insert(key.clone(), CachedEntry::new(bytes.to_vec(), ttl));
        let (count, total) = totals(&entries);
        drop(entries);
        self.record(|s| {
            s.entry_count = count;
            s.memory_bytes = total;
        });
        Ok(())
    }

    fn delete(&self, key: &SnapshotKey) -> ArborResult<bool> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        let removed = entries.remove(key).is_some();
        let (count, total) = totals(&entries);
        drop(entries);
        self.record(|s| {
            s.entry_count = count;
            s.memory_bytes = total;
        });
        Ok(removed)
    }

    fn stats(&self) -> CacheStats {
        self.stats.read().map(|s| s.clone()).unwrap_or_default()
    }
}
