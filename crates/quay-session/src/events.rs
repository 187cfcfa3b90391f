//! Connection-destroy event delivery.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use quay_types::IpcConnection;
use tracing::{debug, error};

use crate::error::{Result, SessionError};

/// Receives a notification when a connection is torn down.
#[async_trait]
pub trait ConnectionDestroyListener: Send + Sync {
    /// Called once per destroyed connection.
    ///
    /// Only errors that leave the store in an unknown state should be
    /// returned; everything else is the listener's to log.
    async fn connection_destroyed(&self, connection: &dyn IpcConnection) -> Result<()>;
}

/// Handle returned by [`EventBus::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Wrap a raw id minted by an [`EventBus`] implementation.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Registration side of the event bus.
pub trait EventBus: Send + Sync {
    /// Subscribe `listener` to connection-destroy events.
    fn register(&self, listener: Arc<dyn ConnectionDestroyListener>) -> Result<ListenerId>;

    /// Remove a previously registered listener.
    fn unregister(&self, id: ListenerId) -> Result<()>;
}

/// In-process [`EventBus`] that the transport calls on teardown.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn ConnectionDestroyListener>)>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Deliver a connection-destroy event to every registered listener.
    ///
    /// Every listener runs even if an earlier one fails. The first error is
    /// returned after all of them have been notified.
    pub async fn connection_destroyed(&self, connection: &dyn IpcConnection) -> Result<()> {
        let listeners: Vec<_> = self.listeners.read().clone();
        debug!(
            identifier = %connection.identifier(),
            listeners = listeners.len(),
            "Dispatching connection destroy"
        );

        let mut first_error = None;
        for (id, listener) in listeners {
            if let Err(e) = listener.connection_destroyed(connection).await {
                error!(listener = %id, error = %e, "Connection destroy listener failed");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl EventBus for ListenerRegistry {
    fn register(&self, listener: Arc<dyn ConnectionDestroyListener>) -> Result<ListenerId> {
        let id = ListenerId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        debug!(listener = %id, "Registered connection destroy listener");
        Ok(id)
    }

    fn unregister(&self, id: ListenerId) -> Result<()> {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        if listeners.len() == before {
            return Err(SessionError::Registration(format!("{id} is not registered")));
        }
        debug!(listener = %id, "Unregistered connection destroy listener");
        Ok(())
    }
}
