//! Author trust state, owned by a collaborating component.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use arbor_core::{ArborResult, AuthorId, StorageError};
use serde::{Deserialize, Serialize};

/// Per-author trust record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorTrustState {
    /// Approved comments at the last promotion check.
    pub approved_count: u64,
    pub is_trusted: bool,
}

/// Read and grant author trust.
///
/// Trust is sticky: nothing here revokes it.
pub trait AuthorTrustStore: Send + Sync {
    fn get_trust(&self, author_id: AuthorId) -> ArborResult<bool>;

    /// Mark the author trusted. Idempotent.
    fn set_trusted(&self, author_id: AuthorId) -> ArborResult<()>;

    /// Remember the latest approved-comment count seen for an author.
    fn record_approved_count(&self, _author_id: AuthorId, _count: u64) -> ArborResult<()> {
        Ok(())
    }
}

/// In-memory [`AuthorTrustStore`].
#[derive(Debug, Default)]
pub struct InMemoryTrustStore {
    states: RwLock<HashMap<AuthorId, AuthorTrustState>>,
    trust_writes: AtomicU64,
}

impl InMemoryTrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current record for an author (default if never seen).
    pub fn state(&self, author_id: AuthorId) -> ArborResult<AuthorTrustState> {
        let states = self.states.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(states.get(&author_id).copied().unwrap_or_default())
    }

    /// Number of `set_trusted` calls, including repeats.
    pub fn trust_writes(&self) -> u64 {
        self.trust_writes.load(Ordering::Relaxed)
    }
}

impl AuthorTrustStore for InMemoryTrustStore {
    fn get_trust(&self, author_id: AuthorId) -> ArborResult<bool> {
        Ok(self.state(author_id)?.is_trusted)
    }

    fn set_trusted(&self, author_id: AuthorId) -> ArborResult<()> {
        let mut states = self.states.write().map_err(|_| StorageError::LockPoisoned)?;
        states.entry(author_id).or_default().is_trusted = true;
        self.trust_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn record_approved_count(&self, author_id: AuthorId, count: u64) -> ArborResult<()> {
        let mut states = self.states.write().map_err(|_| StorageError::LockPoisoned)?;
        states.entry(author_id).or_default().approved_count = count;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_trusted_is_idempotent() {
        let trust = InMemoryTrustStore::new();
        let author = arbor_core::new_node_id();
        assert!(!trust.get_trust(author).unwrap());

        trust.set_trusted(author).unwrap();
        trust.set_trusted(author).unwrap();

        assert!(trust.get_trust(author).unwrap());
        assert_eq!(trust.trust_writes(), 2);
    }

    #[test]
    fn test_count_does_not_affect_trust() {
        let trust = InMemoryTrustStore::new();
        let author = arbor_core::new_node_id();
        trust.record_approved_count(author, 42).unwrap();
        assert_eq!(
            trust.state(author).unwrap(),
            AuthorTrustState {
                approved_count: 42,
                is_trusted: false
            }
        );
    }
}
