//! In-memory reference store.
//!
//! Values cross a `serde_json` boundary on every read and write, the same
//! way they would on their way into a distributed cache, so a session that
//! cannot be serialized fails here rather than in production.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use quay_types::{Session, SessionKey};
use tracing::{debug, trace, warn};

use crate::error::{Result, TransactionError};
use crate::store::{SessionStore, StoreStats, StoreTransaction};

#[derive(Debug, Default)]
struct Counters {
    total_entries: AtomicU64,
    stores: AtomicU64,
    retrievals: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    remove_hits: AtomicU64,
    remove_misses: AtomicU64,
    evictions: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

struct Inner {
    entries: Mutex<LruCache<SessionKey, Vec<u8>>>,
    counters: Counters,
    started: Instant,
}

/// Process-local [`SessionStore`] with optional LRU capacity and
/// optimistic transactions.
///
/// Clones share the same entries.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
    transactional: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an unbounded store without transaction support.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(LruCache::unbounded()),
                counters: Counters::default(),
                started: Instant::now(),
            }),
            transactional: false,
        }
    }

    /// Bound the store to `max_entries`, evicting least recently used
    /// entries beyond that. `0` leaves the store unbounded.
    pub fn with_max_entries(self, max_entries: usize) -> Self {
        if let Some(cap) = NonZeroUsize::new(max_entries) {
            self.inner.entries.lock().resize(cap);
        }
        self
    }

    /// Enable transaction support.
    pub fn with_transactions(mut self) -> Self {
        self.transactional = true;
        self
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.lock().is_empty()
    }

    /// Whether `key` is present. Does not touch counters or LRU order.
    pub fn contains(&self, key: &SessionKey) -> bool {
        self.inner.entries.lock().contains(key)
    }

    fn read_bytes(&self, key: &SessionKey) -> Option<Vec<u8>> {
        let counters = &self.inner.counters;
        Counters::bump(&counters.retrievals);

        let found = self.inner.entries.lock().get(key).cloned();
        if found.is_some() {
            Counters::bump(&counters.hits);
        } else {
            Counters::bump(&counters.misses);
        }
        found
    }

    fn insert_locked(&self, entries: &mut LruCache<SessionKey, Vec<u8>>, key: SessionKey, bytes: Vec<u8>) {
        let counters = &self.inner.counters;
        let existed = entries.contains(&key);
        let displaced = entries.push(key.clone(), bytes);

        Counters::bump(&counters.stores);
        if !existed {
            Counters::bump(&counters.total_entries);
        }
        if let Some((displaced_key, _)) = displaced {
            if displaced_key != key {
                Counters::bump(&counters.evictions);
                debug!(key = %displaced_key, "Evicted least recently used session");
            }
        }
    }
}

fn encode(session: &Session) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(session)?)
}

fn decode(bytes: &[u8]) -> Result<Session> {
    Ok(serde_json::from_slice(bytes)?)
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, key: &SessionKey) -> Result<Option<Session>> {
        self.read_bytes(key).map(|bytes| decode(&bytes)).transpose()
    }

    async fn put(&self, key: SessionKey, session: Session) -> Result<()> {
        let bytes = encode(&session)?;
        let mut entries = self.inner.entries.lock();
        self.insert_locked(&mut entries, key, bytes);
        Ok(())
    }

    async fn remove(&self, key: &SessionKey) -> Result<bool> {
        let removed = self.inner.entries.lock().pop(key).is_some();
        let counters = &self.inner.counters;
        if removed {
            Counters::bump(&counters.remove_hits);
        } else {
            Counters::bump(&counters.remove_misses);
        }
        Ok(removed)
    }

    async fn values(&self) -> Result<Vec<Session>> {
        let raw: Vec<(SessionKey, Vec<u8>)> = self
            .inner
            .entries
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut sessions = Vec::with_capacity(raw.len());
        for (key, bytes) in raw {
            match decode(&bytes) {
                Ok(session) => sessions.push(session),
                Err(e) => warn!(key = %key, error = %e, "Skipping undecodable session"),
            }
        }
        Ok(sessions)
    }

    async fn begin(&self) -> std::result::Result<Box<dyn StoreTransaction>, TransactionError> {
        if !self.transactional {
            return Err(TransactionError::NotSupported);
        }
        trace!("Transaction started");
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            reads: HashMap::new(),
            writes: HashMap::new(),
        }))
    }

    fn stats(&self) -> Option<StoreStats> {
        let c = &self.inner.counters;
        Some(StoreStats {
            time_since_start_secs: self.inner.started.elapsed().as_secs(),
            current_entries: self.len(),
            total_entries: c.total_entries.load(Ordering::Relaxed),
            stores: c.stores.load(Ordering::Relaxed),
            retrievals: c.retrievals.load(Ordering::Relaxed),
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            remove_hits: c.remove_hits.load(Ordering::Relaxed),
            remove_misses: c.remove_misses.load(Ordering::Relaxed),
            evictions: c.evictions.load(Ordering::Relaxed),
        })
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Optimistic transaction over a [`MemoryStore`].
///
/// Writes are buffered until commit. A key that was both read and written
/// must still hold the value that was read, otherwise the commit rolls back.
struct MemoryTransaction {
    store: MemoryStore,
    reads: HashMap<SessionKey, Option<Vec<u8>>>,
    writes: HashMap<SessionKey, Vec<u8>>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn get(&mut self, key: &SessionKey) -> Result<Option<Session>> {
        if let Some(bytes) = self.writes.get(key) {
            return decode(bytes).map(Some);
        }
        let bytes = self.store.read_bytes(key);
        self.reads.entry(key.clone()).or_insert_with(|| bytes.clone());
        bytes.map(|b| decode(&b)).transpose()
    }

    async fn put(&mut self, key: SessionKey, session: Session) -> Result<()> {
        let bytes = encode(&session)?;
        self.writes.insert(key, bytes);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> std::result::Result<(), TransactionError> {
        let MemoryTransaction { store, reads, writes } = *self;
        let mut entries = store.inner.entries.lock();

        for key in writes.keys() {
            if let Some(read) = reads.get(key) {
                if entries.peek(key).map(Vec::as_slice) != read.as_deref() {
                    return Err(TransactionError::RolledBack(format!(
                        "{key} was modified concurrently"
                    )));
                }
            }
        }

        let count = writes.len();
        for (key, bytes) in writes {
            store.insert_locked(&mut entries, key, bytes);
        }
        trace!(writes = count, "Transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> std::result::Result<(), TransactionError> {
        trace!(writes = self.writes.len(), "Transaction rolled back");
        Ok(())
    }
}
