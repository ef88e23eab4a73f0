//! LMDB-backed snapshot cache.
//!
//! Uses the heed crate (Rust bindings for LMDB) for a memory-mapped store
//! that survives restarts. Values are laid out as
//! `[cached_at millis: 8 bytes LE][expires_at millis: 8 bytes LE][bytes]`.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. `get` uses a read transaction; `set`,
//! `delete` and lazy expiry use write transactions. Statistics are kept
//! behind a lock next to the environment.

use std::path::Path;
use std::sync::RwLock;
use std::time::Duration;

use arbor_core::{ArborError, ArborResult, CacheError, LmdbSettings, Timestamp};
use chrono::{DateTime, Utc};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use super::key::SnapshotKey;
use super::traits::{CacheBackend, CacheStats, CachedEntry};

const HEADER_LEN: usize = 16;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Stored value shorter than its header or with an invalid timestamp.
    #[error("Corrupt cache entry: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for ArborError {
    fn from(e: LmdbCacheError) -> Self {
        match e {
            LmdbCacheError::Corrupt(reason) => CacheError::Deserialization { reason }.into(),
            other => CacheError::Unavailable {
                reason: other.to_string(),
            }
            .into(),
        }
    }
}

fn txn_err(e: heed::Error) -> LmdbCacheError {
    LmdbCacheError::Transaction(e.to_string())
}

/// LMDB-backed [`CacheBackend`].
pub struct LmdbCacheBackend {
    env: Env,
    db: Database<Bytes, Bytes>,
    stats: RwLock<CacheStats>,
}

impl LmdbCacheBackend {
    /// Open the cache described by the `[lmdb]` configuration section.
    pub fn from_settings(settings: &LmdbSettings) -> Result<Self, LmdbCacheError> {
        Self::new(&settings.path, settings.max_size_mb)
    }

    /// Open (or create) a cache at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the LMDB
    /// environment or database cannot be opened.
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per path by this process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        let entry_count = db.len(&wtxn).map_err(txn_err)?;
        let mut memory_bytes = 0u64;
        for item in db.iter(&wtxn).map_err(txn_err)? {
            let (_, value) = item.map_err(txn_err)?;
            memory_bytes += value.len() as u64;
        }
        wtxn.commit().map_err(txn_err)?;

        Ok(Self {
            env,
            db,
            stats: RwLock::new(CacheStats {
                entry_count,
                memory_bytes,
                ..CacheStats::default()
            }),
        })
    }

    fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }

    fn remove(&self, raw_key: &[u8]) -> Result<bool, LmdbCacheError> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let freed = self
            .db
            .get(&wtxn, raw_key)
            .map_err(txn_err)?
            .map_or(0, |v| v.len() as u64);
        let deleted = self.db.delete(&mut wtxn, raw_key).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        if deleted {
            self.record(|s| {
                s.entry_count = s.entry_count.saturating_sub(1);
                s.memory_bytes = s.memory_bytes.saturating_sub(freed);
            });
        }
        Ok(deleted)
    }
}

fn encode_value(entry: &CachedEntry) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + entry.bytes.len());
    out.extend_from_slice(&entry.cached_at.timestamp_millis().to_le_bytes());
    out.extend_from_slice(&entry.expires_at.timestamp_millis().to_le_bytes());
    out.extend_from_slice(&entry.bytes);
    out
}

fn read_millis(bytes: &[u8]) -> Result<Timestamp, LmdbCacheError> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| LmdbCacheError::Corrupt("truncated timestamp".into()))?;
    DateTime::<Utc>::from_timestamp_millis(i64::from_le_bytes(raw))
        .ok_or_else(|| LmdbCacheError::Corrupt("timestamp out of range".into()))
}

fn decode_value(bytes: &[u8]) -> Result<CachedEntry, LmdbCacheError> {
    if bytes.len() < HEADER_LEN {
        return Err(LmdbCacheError::Corrupt(format!(
            "entry is {} bytes, header needs {}",
            bytes.len(),
            HEADER_LEN
        )));
    }
    Ok(CachedEntry {
        cached_at: read_millis(&bytes[0..8])?,
        expires_at: read_millis(&bytes[8..16])?,
        bytes: bytes[HEADER_LEN..].to_vec(),
    })
}

impl CacheBackend for LmdbCacheBackend {
    fn get(&self, key: &SnapshotKey) -> ArborResult<Option<CachedEntry>> {
        let encoded_key = key.encode();
        let found = {
            let rtxn = self.env.read_txn().map_err(txn_err)?;
            self.db
                .get(&rtxn, &encoded_key)
                .map_err(txn_err)?
                .map(decode_value)
        };

        match found {
            None => {
                self.record(|s| s.misses += 1);
                Ok(None)
            }
            Some(Err(e)) => {
                self.record(|s| s.misses += 1);
                Err(e.into())
            }
            Some(Ok(entry)) if entry.is_expired() => {
                let evicted = self.remove(&encoded_key)?;
                self.record(|s| {
                    s.misses += 1;
                    if evicted {
                        s.evictions += 1;
                    }
                });
                Ok(None)
            }
            Some(Ok(entry)) => {
                self.record(|s| s.hits += 1);
                Ok(Some(entry))
            }
        }
    }

    fn set(&self, key: &SnapshotKey, bytes: &[u8], ttl: Duration) -> ArborResult<()> {
        let encoded_key = key.encode();
        let value = encode_value(&CachedEntry::new(bytes.to_vec(), ttl));

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let replaced = self
            .db
            .get(&wtxn, &encoded_key)
            .map_err(txn_err)?
            .map(|v| v.len() as u64);
        self.db
            .put(&mut wtxn, &encoded_key, &value)
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;

        self.record(|s| {
            match replaced {
                Some(old) => s.memory_bytes = s.memory_bytes.saturating_sub(old),
                None => s.entry_count += 1,
            }
            s.memory_bytes += value.len() as u64;
        });
        Ok(())
    }

    fn delete(&self, key: &SnapshotKey) -> ArborResult<bool> {
        Ok(self.remove(&key.encode())?)
    }

    fn stats(&self) -> CacheStats {
        self.stats.read().map(|s| s.clone()).unwrap_or_default()
    }
}

impl std::fmt::Debug for LmdbCacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbCacheBackend")
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::TreeId;
    use tempfile::TempDir;

    fn create_test_backend() -> (LmdbCacheBackend, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let backend =
            LmdbCacheBackend::new(temp_dir.path(), 10).expect("backend creation should succeed");
        (backend, temp_dir)
    }

    fn key(tree: &str, lang: &str) -> SnapshotKey {
        SnapshotKey::new(TreeId::from(tree), lang, 1)
    }

    #[test]
    fn test_set_and_get() {
        let (backend, _dir) = create_test_backend();
        backend
            .set(&key("main-menu", "en"), b"{\"roots\":[]}", Duration::from_secs(60))
            .expect("set should succeed");

        let entry = backend
            .get(&key("main-menu", "en"))
            .expect("get should succeed")
            .expect("entry should exist");
        assert_eq!(entry.bytes, b"{\"roots\":[]}");
        assert!(entry.expires_at > entry.cached_at);

        assert!(backend
            .get(&key("main-menu", "de"))
            .expect("get should succeed")
            .is_none());
        let stats = backend.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 1);
    }

    #[test]
    fn test_colon_tree_ids_do_not_collide() {
        let (backend, _dir) = create_test_backend();
        let thread = key("comments:abc", "en");
        let other = key("comments", "abc");
        backend.set(&thread, b"thread", Duration::from_secs(60)).unwrap();
        assert!(backend.get(&other).unwrap().is_none());
        assert_eq!(backend.get(&thread).unwrap().unwrap().bytes, b"thread");
    }

    #[test]
    fn test_expired_entry_is_evicted() {
        let (backend, _dir) = create_test_backend();
        backend
            .set(&key("footer", "en"), b"stale", Duration::ZERO)
            .unwrap();
        assert!(backend.get(&key("footer", "en")).unwrap().is_none());
        assert_eq!(backend.stats().evictions, 1);
        assert_eq!(backend.stats().entry_count, 0);
    }

    #[test]
    fn test_delete() {
        let (backend, _dir) = create_test_backend();
        backend
            .set(&key("footer", "en"), b"x", Duration::from_secs(60))
            .unwrap();
        assert!(backend.delete(&key("footer", "en")).unwrap());
        assert!(!backend.delete(&key("footer", "en")).unwrap());
        assert!(backend.get(&key("footer", "en")).unwrap().is_none());
    }

    #[test]
    fn test_entries_survive_reopen() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        {
            let backend = LmdbCacheBackend::new(temp_dir.path(), 10).unwrap();
            backend
                .set(&key("categories", "fr"), b"persisted", Duration::from_secs(3600))
                .unwrap();
        }
        let reopened = LmdbCacheBackend::new(temp_dir.path(), 10).unwrap();
        assert_eq!(reopened.stats().entry_count, 1);
        assert_eq!(
            reopened.get(&key("categories", "fr")).unwrap().unwrap().bytes,
            b"persisted"
        );
    }

    #[test]
    fn test_memory_bytes_tracks_live_entries() {
        let (backend, dir) = create_test_backend();
        let menu = key("main-menu", "en");
        let value_len = (HEADER_LEN + 4) as u64;

        backend.set(&menu, b"abcd", Duration::from_secs(60)).unwrap();
        backend.set(&menu, b"efgh", Duration::from_secs(60)).unwrap();
        backend.set(&key("footer", "en"), b"ijkl", Duration::from_secs(60)).unwrap();
        assert_eq!(backend.stats().memory_bytes, 2 * value_len);

        assert!(backend.delete(&menu).unwrap());
        assert_eq!(backend.stats().memory_bytes, value_len);
        assert_eq!(backend.stats().entry_count, 1);

        drop(backend);
        let reopened = LmdbCacheBackend::new(dir.path(), 10).unwrap();
        assert_eq!(reopened.stats().memory_bytes, value_len);
    }

    #[test]
    fn test_open_from_settings() {
        let dir = TempDir::new().expect("tempdir should be created");
        let settings = LmdbSettings {
            path: dir.path().join("snapshots").to_string_lossy().into_owned(),
            max_size_mb: 4,
        };
        let backend = LmdbCacheBackend::from_settings(&settings).expect("settings should open");
        backend.set(&key("footer", "en"), b"x", Duration::from_secs(60)).unwrap();
        assert!(backend.get(&key("footer", "en")).unwrap().is_some());
    }

    #[test]
    fn test_corrupt_value_is_an_error() {
        assert!(matches!(
            decode_value(&[1, 2, 3]),
            Err(LmdbCacheError::Corrupt(_))
        ));
        let err: ArborError = LmdbCacheError::Corrupt("bad".into()).into();
        assert!(matches!(err, ArborError::Cache(CacheError::Deserialization { .. })));
    }
}
