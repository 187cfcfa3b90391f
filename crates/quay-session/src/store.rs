//! The shared store collaborator.
//!
//! A [`SessionStore`] is an opaque key-value cache keyed by [`SessionKey`].
//! Replication, persistence and eviction policy are the store's business;
//! the provider only relies on per-key atomic `get`/`put`.

use async_trait::async_trait;
use quay_types::{Session, SessionKey};
use serde::Serialize;

use crate::error::{Result, TransactionError};

/// Trait for session store backends.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Fetch the session stored under `key`.
    async fn get(&self, key: &SessionKey) -> Result<Option<Session>>;

    /// Store `session` under `key`, replacing any previous value.
    async fn put(&self, key: SessionKey, session: Session) -> Result<()>;

    /// Remove the entry under `key`. Returns whether an entry was removed.
    ///
    /// The provider only ever awaits this from a detached task.
    async fn remove(&self, key: &SessionKey) -> Result<bool>;

    /// Every value currently held.
    ///
    /// This need not be a snapshot: entries written or removed concurrently
    /// may or may not appear.
    async fn values(&self) -> Result<Vec<Session>>;

    /// Begin a transaction.
    ///
    /// Stores without transaction support keep the default, which reports
    /// [`TransactionError::NotSupported`].
    async fn begin(&self) -> std::result::Result<Box<dyn StoreTransaction>, TransactionError> {
        Err(TransactionError::NotSupported)
    }

    /// Live counters, if the store keeps any.
    fn stats(&self) -> Option<StoreStats> {
        None
    }

    /// Short name used in log lines and `Display` output.
    fn name(&self) -> &str {
        "store"
    }
}

/// An open store transaction.
///
/// A transaction may stay open for as long as the connection that caused
/// it, so implementations must not assume it is short-lived.
#[async_trait]
pub trait StoreTransaction: Send + Sync {
    /// Read `key` as seen by this transaction.
    async fn get(&mut self, key: &SessionKey) -> Result<Option<Session>>;

    /// Write `session` under `key` as part of this transaction.
    async fn put(&mut self, key: SessionKey, session: Session) -> Result<()>;

    /// Make every write visible atomically.
    async fn commit(self: Box<Self>) -> std::result::Result<(), TransactionError>;

    /// Discard every write.
    async fn rollback(self: Box<Self>) -> std::result::Result<(), TransactionError>;
}

/// Store counters exposed for operational monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Seconds since the store started.
    pub time_since_start_secs: u64,

    /// Entries currently held.
    pub current_entries: usize,

    /// Entries ever created.
    pub total_entries: u64,

    /// Put operations.
    pub stores: u64,

    /// Get operations.
    pub retrievals: u64,

    /// Gets that found an entry.
    pub hits: u64,

    /// Gets that found nothing.
    pub misses: u64,

    /// Removals that found an entry.
    pub remove_hits: u64,

    /// Removals that found nothing.
    pub remove_misses: u64,

    /// Entries dropped by the store's own capacity policy.
    pub evictions: u64,
}

impl StoreStats {
    /// Fraction of retrievals that hit, or `0.0` before any retrieval.
    pub fn hit_ratio(&self) -> f64 {
        if self.retrievals == 0 {
            0.0
        } else {
            self.hits as f64 / self.retrievals as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_ratio() {
        assert_eq!(StoreStats::default().hit_ratio(), 0.0);

        let stats = StoreStats {
            retrievals: 4,
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert_eq!(stats.hit_ratio(), 0.75);
    }

    #[test]
    fn test_serializes_for_exporters() {
        let stats = StoreStats {
            current_entries: 2,
            evictions: 1,
            ..Default::default()
        };
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["current_entries"], 2);
        assert_eq!(json["evictions"], 1);
        assert_eq!(json["remove_misses"], 0);
    }
}
