//! Session lifecycle manager.
//!
//! The provider looks sessions up in the store, creates them on a miss,
//! evicts stale ones lazily on lookup and actively from a periodic sweep,
//! and writes sessions back when their connection is torn down.
//!
//! The store is the only source of truth. The provider keeps no session
//! between calls and takes no lock across a session's lifetime; the only
//! per-session state it holds is the open transaction of a transactional
//! lookup, parked until the matching write-back.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use quay_types::{HasSessionConfig, IpcConnection, NotAttached, Session, SessionKey};
use tracing::{debug, error, info, trace, warn};

use crate::error::{Result, SessionError, TransactionError};
use crate::events::{ConnectionDestroyListener, EventBus, ListenerId};
use crate::monitoring::{MonitoringRegistry, StatsSource};
use crate::scheduler::{PeriodicJob, ScheduleHandle, Scheduler};
use crate::store::{SessionStore, StoreStats, StoreTransaction};

/// Sweep schedule.
#[derive(Debug, Clone, Copy)]
struct SweepSchedule {
    initial_delay: Duration,
    period: Duration,
}

/// What `start` registered, so `stop` can undo exactly that.
#[derive(Default)]
struct Registration {
    started: bool,
    listener: Option<ListenerId>,
    sweep: Option<ScheduleHandle>,
    monitoring: bool,
}

/// Looks up, creates, expires and writes back sessions.
pub struct SessionProvider {
    store: Arc<dyn SessionStore>,
    expiration_time: Duration,
    transactional: bool,
    sweep: Option<SweepSchedule>,
    event_bus: Option<Arc<dyn EventBus>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    monitoring: Option<(Arc<dyn MonitoringRegistry>, String)>,
    pending: Mutex<HashMap<SessionKey, Box<dyn StoreTransaction>>>,
    registration: Mutex<Registration>,
}

impl SessionProvider {
    /// Create a provider over `store` using the given session settings.
    pub fn new<C: HasSessionConfig>(store: Arc<dyn SessionStore>, config: &C) -> Self {
        let sweep = config.sweep_enabled().then(|| SweepSchedule {
            initial_delay: config.initial_check_delay(),
            period: config.check_period(),
        });

        Self {
            store,
            expiration_time: config.expiration_time(),
            transactional: config.transactional(),
            sweep,
            event_bus: None,
            scheduler: None,
            monitoring: None,
            pending: Mutex::new(HashMap::new()),
            registration: Mutex::new(Registration::default()),
        }
    }

    /// Subscribe to connection-destroy events from `bus` on start.
    pub fn with_event_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Register the sweep with `scheduler` on start.
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Publish statistics to `registry` under `name` on start.
    pub fn with_monitoring(
        mut self,
        registry: Arc<dyn MonitoringRegistry>,
        name: impl Into<String>,
    ) -> Self {
        self.monitoring = Some((registry, name.into()));
        self
    }

    /// Timeout given to newly created sessions.
    pub fn expiration_time(&self) -> Duration {
        self.expiration_time
    }

    /// Number of transactions opened by a lookup and not yet committed.
    ///
    /// A transaction stays pending until the session it was opened for is
    /// written back. If that session is never attached to a connection, the
    /// transaction is only released by [`stop`](Self::stop).
    pub fn pending_transactions(&self) -> usize {
        self.pending.lock().len()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Register with the event bus, scheduler and monitoring registry.
    ///
    /// Call this before the transport starts accepting traffic. If a step
    /// fails, the earlier steps stay registered and [`stop`](Self::stop)
    /// undoes them.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut reg = self.registration.lock();
        if reg.started {
            return Err(SessionError::Registration(
                "session provider already started".to_string(),
            ));
        }
        reg.started = true;

        if let Some(bus) = &self.event_bus {
            let listener: Arc<dyn ConnectionDestroyListener> = self.clone();
            reg.listener = Some(bus.register(listener)?);
        }

        match (&self.scheduler, self.sweep) {
            (Some(scheduler), Some(schedule)) => {
                let job: Arc<dyn PeriodicJob> = self.clone();
                reg.sweep = Some(scheduler.schedule_at_fixed_rate(
                    job,
                    schedule.initial_delay,
                    schedule.period,
                )?);
            }
            (None, Some(_)) => debug!("No scheduler configured, sessions expire on lookup only"),
            _ => {}
        }

        if let Some((registry, name)) = &self.monitoring {
            let source: Arc<dyn StatsSource> = self.clone();
            registry.register(name, source)?;
            reg.monitoring = true;
        }

        info!(
            store = %self.store.name(),
            expiration_secs = self.expiration_time.as_secs(),
            transactional = self.transactional,
            sweep = reg.sweep.is_some(),
            "Session provider started"
        );
        Ok(())
    }

    /// Cancel the sweep, unregister from the event bus and then from the
    /// monitoring registry, and roll back every pending transaction.
    ///
    /// Every step runs even if an earlier one fails; the first failure is
    /// returned.
    pub async fn stop(&self) -> Result<()> {
        let (listener, sweep, monitoring) = {
            let mut reg = self.registration.lock();
            reg.started = false;
            (
                reg.listener.take(),
                reg.sweep.take(),
                std::mem::take(&mut reg.monitoring),
            )
        };

        if let Some(handle) = sweep {
            handle.cancel();
        }

        let mut first_error = None;

        if let (Some(id), Some(bus)) = (listener, &self.event_bus) {
            if let Err(e) = bus.unregister(id) {
                warn!(error = %e, "Failed to unregister from event bus");
                first_error.get_or_insert(e);
            }
        }

        if monitoring {
            if let Some((registry, name)) = &self.monitoring {
                if let Err(e) = registry.unregister(name) {
                    warn!(error = %e, "Failed to unregister statistics");
                    first_error.get_or_insert(e);
                }
            }
        }

        let pending: Vec<_> = self.pending.lock().drain().collect();
        for (key, tx) in pending {
            warn!(key = %key, "Rolling back transaction of a session never written back");
            if let Err(e) = tx.rollback().await {
                error!(key = %key, error = %e, "Rollback failed during shutdown");
            }
        }

        info!("Session provider stopped");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lookup
    // ─────────────────────────────────────────────────────────────────────

    /// Return the live session for `(session_id, identifier)`, or a new one.
    ///
    /// A miss, or a hit whose deadline has passed, yields a fresh session
    /// with a newly generated id and the configured timeout; the requested
    /// id is never reused. Only store failures and fatal transaction
    /// failures are returned as errors.
    pub async fn get_session(&self, session_id: &str, identifier: &str) -> Result<Session> {
        let key = SessionKey::new(session_id, identifier);
        let mut tx = self.open_transaction(&key).await?;

        let found = match tx.as_mut() {
            Some((tx, _)) => tx.get(&key).await,
            None => self.store.get(&key).await,
        };
        let found = match found {
            Ok(found) => found,
            Err(e) => {
                error!(key = %key, error = %e, "Session lookup failed");
                match tx {
                    // Another connection's session still depends on it.
                    Some((tx, true)) => self.park(key, tx).await?,
                    Some((tx, false)) => abandon(tx, &key).await?,
                    None => {}
                }
                return Err(e);
            }
        };

        let session = match found {
            Some(session) if session.is_expired() => {
                self.expire_session(session);
                None
            }
            Some(session) => {
                trace!(session = %session, "Session found");
                Some(session)
            }
            None => None,
        };

        let session = match session {
            Some(session) => session,
            None => {
                let session = Session::generate(identifier, self.expiration_time);
                info!(session = %session, "Created session");
                session
            }
        };

        if let Some((tx, _)) = tx {
            self.park(session.key().clone(), tx).await?;
        }
        Ok(session)
    }

    /// Begin, or rejoin, the transaction for a lookup of `key`.
    ///
    /// The flag is true when the transaction was already pending.
    async fn open_transaction(
        &self,
        key: &SessionKey,
    ) -> Result<Option<(Box<dyn StoreTransaction>, bool)>> {
        if !self.transactional {
            return Ok(None);
        }

        let joined = self.pending.lock().remove(key);
        if let Some(tx) = joined {
            debug!(key = %key, "Joining pending transaction");
            return Ok(Some((tx, true)));
        }

        match self.store.begin().await {
            Ok(tx) => Ok(Some((tx, false))),
            Err(TransactionError::NotSupported) => {
                warn!(
                    store = %self.store.name(),
                    "Store does not support transactions, continuing without"
                );
                Ok(None)
            }
            Err(e) if e.is_fatal() => {
                error!(error = %e, "Could not begin session transaction");
                Err(e.into())
            }
            Err(e) => {
                warn!(error = %e, "Could not begin session transaction, continuing without");
                Ok(None)
            }
        }
    }

    /// Hold `tx` until `key` is written back.
    ///
    /// If a concurrent lookup parked a transaction under the same key first,
    /// that one is kept and `tx` is rolled back.
    async fn park(&self, key: SessionKey, tx: Box<dyn StoreTransaction>) -> Result<()> {
        let displaced = {
            let mut pending = self.pending.lock();
            match pending.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(tx);
                    None
                }
                Entry::Occupied(slot) => Some((slot.key().clone(), tx)),
            }
        };

        match displaced {
            Some((key, tx)) => {
                debug!(key = %key, "Transaction already pending, rolling back the later one");
                abandon(tx, &key).await
            }
            None => Ok(()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Expiry
    // ─────────────────────────────────────────────────────────────────────

    /// Scan the whole store once and expire every stale session.
    ///
    /// Returns how many sessions were expired. Failures are logged; an entry
    /// missed here is picked up by the next sweep or lookup.
    pub async fn sweep(&self) -> usize {
        let sessions = match self.store.values().await {
            Ok(sessions) => sessions,
            Err(e) => {
                error!(error = %e, "Session sweep could not read the store");
                return 0;
            }
        };

        let scanned = sessions.len();
        let mut expired = 0;
        for session in sessions {
            if session.is_expired() {
                self.expire_session(session);
                expired += 1;
            }
        }

        debug!(scanned, expired, "Session sweep finished");
        expired
    }

    /// Clear `session` and remove its key from the store in the background.
    ///
    /// Removal is best effort. A failure, or the absence of a tokio runtime
    /// to run it on, leaves a stale entry that the next lookup or sweep
    /// evicts again.
    fn expire_session(&self, mut session: Session) {
        info!(session = %session, "Expiring session");
        let key = session.key().clone();

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let store = Arc::clone(&self.store);
                runtime.spawn(async move {
                    match store.remove(&key).await {
                        Ok(true) => trace!(key = %key, "Removed expired session"),
                        Ok(false) => trace!(key = %key, "Expired session was already gone"),
                        Err(e) => warn!(key = %key, error = %e, "Failed to remove expired session"),
                    }
                });
            }
            Err(e) => warn!(key = %key, error = %e, "No tokio runtime, skipping removal"),
        }

        session.clear();
    }

    // ─────────────────────────────────────────────────────────────────────
    // Write-back
    // ─────────────────────────────────────────────────────────────────────

    /// Persist the session of a torn-down connection.
    ///
    /// A connection without a session is ignored. Without a pending
    /// transaction the session is put straight into the store; with one,
    /// the write joins it and the transaction is committed. Rolled-back
    /// commits and store failures are logged; only fatal transaction
    /// failures are returned.
    pub async fn write_back(&self, connection: &dyn IpcConnection) -> Result<()> {
        let session = match connection.session() {
            Ok(session) => session,
            Err(NotAttached) => {
                trace!(identifier = %connection.identifier(), "No session attached");
                return Ok(());
            }
        };

        let key = session.key().clone();
        let tx = self.pending.lock().remove(&key);
        match tx {
            Some(tx) => self.commit_write_back(tx, key, session).await,
            None => {
                match self.store.put(key.clone(), session).await {
                    Ok(()) => debug!(key = %key, "Session written back"),
                    Err(e) => error!(key = %key, error = %e, "Failed to write session back"),
                }
                Ok(())
            }
        }
    }

    async fn commit_write_back(
        &self,
        mut tx: Box<dyn StoreTransaction>,
        key: SessionKey,
        session: Session,
    ) -> Result<()> {
        if let Err(e) = tx.put(key.clone(), session).await {
            error!(key = %key, error = %e, "Failed to write session back");
            return abandon(tx, &key).await;
        }

        match tx.commit().await {
            Ok(()) => {
                debug!(key = %key, "Session written back and committed");
                Ok(())
            }
            Err(e) if e.is_fatal() => {
                error!(key = %key, error = %e, "Session commit failed, store state is unknown");
                Err(e.into())
            }
            Err(e) => {
                error!(key = %key, error = %e, "Session write-back was rolled back");
                Ok(())
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Statistics
    // ─────────────────────────────────────────────────────────────────────

    /// Current counters of the underlying store.
    ///
    /// Stores that keep no counters report all zeros.
    pub fn statistics(&self) -> StoreStats {
        self.store.stats().unwrap_or_default()
    }
}

/// Roll back `tx`, surfacing only fatal failures.
async fn abandon(tx: Box<dyn StoreTransaction>, key: &SessionKey) -> Result<()> {
    match tx.rollback().await {
        Ok(()) => Ok(()),
        Err(e) if e.is_fatal() => {
            error!(key = %key, error = %e, "Rollback failed, store state is unknown");
            Err(e.into())
        }
        Err(e) => {
            warn!(key = %key, error = %e, "Rollback failed");
            Ok(())
        }
    }
}

#[async_trait]
impl ConnectionDestroyListener for SessionProvider {
    async fn connection_destroyed(&self, connection: &dyn IpcConnection) -> Result<()> {
        self.write_back(connection).await
    }
}

#[async_trait]
impl PeriodicJob for SessionProvider {
    async fn run(&self) {
        self.sweep().await;
    }
}

impl StatsSource for SessionProvider {
    fn stats(&self) -> StoreStats {
        self.statistics()
    }
}

impl std::fmt::Display for SessionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionProvider{{store={}}}", self.store.name())
    }
}
