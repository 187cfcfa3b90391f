//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use quay_session::{
    EventBus, ListenerId, MemoryStore, Result, SessionError, SessionStore, StoreStats,
    StoreTransaction, TransactionError,
};
use quay_types::{IpcConnection, NotAttached, Session, SessionKey};

/// A connection that may or may not carry a session.
pub struct TestConnection {
    identifier: String,
    session: Mutex<Option<Session>>,
}

impl TestConnection {
    pub fn new(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            session: Mutex::new(None),
        }
    }

    pub fn with_session(session: Session) -> Self {
        let conn = Self::new(session.identifier());
        conn.attach(session);
        conn
    }

    pub fn attach(&self, session: Session) {
        *self.session.lock() = Some(session);
    }
}

impl IpcConnection for TestConnection {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn session(&self) -> std::result::Result<Session, NotAttached> {
        self.session.lock().clone().ok_or(NotAttached)
    }
}

/// Counts of transaction outcomes observed by a [`ScriptedStore`].
#[derive(Default)]
pub struct TxCounts {
    pub begun: AtomicUsize,
    pub committed: AtomicUsize,
    pub rolled_back: AtomicUsize,
}

impl TxCounts {
    pub fn begun(&self) -> usize {
        self.begun.load(Ordering::SeqCst)
    }

    pub fn committed(&self) -> usize {
        self.committed.load(Ordering::SeqCst)
    }

    pub fn rolled_back(&self) -> usize {
        self.rolled_back.load(Ordering::SeqCst)
    }
}

/// Transactional store backed by a [`MemoryStore`] whose begin and commit
/// outcomes can be forced, and which records every removal.
#[derive(Clone)]
pub struct ScriptedStore {
    pub memory: MemoryStore,
    pub removed: Arc<Mutex<Vec<SessionKey>>>,
    pub tx: Arc<TxCounts>,
    begin_failure: Arc<Mutex<Option<TransactionError>>>,
    commit_failure: Arc<Mutex<Option<TransactionError>>>,
    read_failure: Arc<AtomicBool>,
    fail_removals: bool,
    yield_on_begin: bool,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self {
            memory: MemoryStore::new().with_transactions(),
            removed: Arc::new(Mutex::new(Vec::new())),
            tx: Arc::new(TxCounts::default()),
            begin_failure: Arc::new(Mutex::new(None)),
            commit_failure: Arc::new(Mutex::new(None)),
            read_failure: Arc::new(AtomicBool::new(false)),
            fail_removals: false,
            yield_on_begin: false,
        }
    }

    /// Yield to the runtime before every `begin`, so concurrent lookups
    /// interleave there.
    pub fn yielding_begin(mut self) -> Self {
        self.yield_on_begin = true;
        self
    }

    /// Make the next read through a transaction fail.
    pub fn fail_next_transactional_read(&self) {
        self.read_failure.store(true, Ordering::SeqCst);
    }

    /// Make every removal fail after recording it.
    pub fn failing_removals(mut self) -> Self {
        self.fail_removals = true;
        self
    }

    /// Make the next `begin` fail with `err`.
    pub fn fail_next_begin(&self, err: TransactionError) {
        *self.begin_failure.lock() = Some(err);
    }

    /// Make the next commit fail with `err` without applying its writes.
    pub fn fail_next_commit(&self, err: TransactionError) {
        *self.commit_failure.lock() = Some(err);
    }

    pub fn removed_keys(&self) -> Vec<SessionKey> {
        self.removed.lock().clone()
    }
}

#[async_trait]
impl SessionStore for ScriptedStore {
    async fn get(&self, key: &SessionKey) -> Result<Option<Session>> {
        self.memory.get(key).await
    }

    async fn put(&self, key: SessionKey, session: Session) -> Result<()> {
        self.memory.put(key, session).await
    }

    async fn remove(&self, key: &SessionKey) -> Result<bool> {
        self.removed.lock().push(key.clone());
        if self.fail_removals {
            return Err(SessionError::Store("removal refused".to_string()));
        }
        self.memory.remove(key).await
    }

    async fn values(&self) -> Result<Vec<Session>> {
        self.memory.values().await
    }

    async fn begin(&self) -> std::result::Result<Box<dyn StoreTransaction>, TransactionError> {
        if self.yield_on_begin {
            tokio::task::yield_now().await;
        }
        let forced = self.begin_failure.lock().take();
        if let Some(err) = forced {
            return Err(err);
        }
        let inner = self.memory.begin().await?;
        self.tx.begun.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedTransaction {
            inner,
            counts: Arc::clone(&self.tx),
            commit_failure: Arc::clone(&self.commit_failure),
            read_failure: Arc::clone(&self.read_failure),
        }))
    }

    fn stats(&self) -> Option<StoreStats> {
        self.memory.stats()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct ScriptedTransaction {
    inner: Box<dyn StoreTransaction>,
    counts: Arc<TxCounts>,
    commit_failure: Arc<Mutex<Option<TransactionError>>>,
    read_failure: Arc<AtomicBool>,
}

#[async_trait]
impl StoreTransaction for ScriptedTransaction {
    async fn get(&mut self, key: &SessionKey) -> Result<Option<Session>> {
        if self.read_failure.swap(false, Ordering::SeqCst) {
            return Err(SessionError::Store("read refused".to_string()));
        }
        self.inner.get(key).await
    }

    async fn put(&mut self, key: SessionKey, session: Session) -> Result<()> {
        self.inner.put(key, session).await
    }

    async fn commit(self: Box<Self>) -> std::result::Result<(), TransactionError> {
        let ScriptedTransaction {
            inner,
            counts,
            commit_failure,
            ..
        } = *self;
        let forced = commit_failure.lock().take();
        if let Some(err) = forced {
            counts.rolled_back.fetch_add(1, Ordering::SeqCst);
            inner.rollback().await?;
            return Err(err);
        }
        inner.commit().await?;
        counts.committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> std::result::Result<(), TransactionError> {
        self.counts.rolled_back.fetch_add(1, Ordering::SeqCst);
        self.inner.rollback().await
    }
}

/// Event bus whose unregister always fails.
#[derive(Default)]
pub struct StuckEventBus {
    pub registered: AtomicUsize,
}

impl EventBus for StuckEventBus {
    fn register(
        &self,
        _listener: Arc<dyn quay_session::ConnectionDestroyListener>,
    ) -> Result<ListenerId> {
        let n = self.registered.fetch_add(1, Ordering::SeqCst);
        Ok(ListenerId::new(n as u64))
    }

    fn unregister(&self, _id: ListenerId) -> Result<()> {
        Err(SessionError::Registration("event bus is gone".to_string()))
    }
}

/// Poll `check` until it holds, yielding to spawned tasks in between.
pub async fn wait_until<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
