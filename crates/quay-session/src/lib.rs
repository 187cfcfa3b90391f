//! Expiring session lifecycle over a shared key-value store.
//!
//! This crate maps a `(session id, identifier)` pair to a mutable, expiring
//! [`Session`](quay_types::Session) kept in a [`SessionStore`]:
//! - Lookups create a fresh session on a miss and lazily evict stale hits
//! - A periodic sweep evicts expired sessions that are never looked up again
//! - Connection teardown writes the in-flight session back to the store,
//!   optionally committing a transaction opened at lookup time
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use quay_session::{ListenerRegistry, MemoryStore, SessionProvider, TokioScheduler};
//! use quay_types::SessionConfigProvider;
//!
//! let events = Arc::new(ListenerRegistry::new());
//! let provider = Arc::new(
//!     SessionProvider::new(Arc::new(MemoryStore::new()), &SessionConfigProvider::default())
//!         .with_event_bus(events.clone())
//!         .with_scheduler(Arc::new(TokioScheduler::new())),
//! );
//! provider.start()?;
//!
//! let session = provider.get_session("unknown", "client-1").await?;
//! ```

mod error;
mod events;
mod memory;
mod monitoring;
mod provider;
mod scheduler;
mod store;

pub use error::{Result, SessionError, TransactionError};
pub use events::{ConnectionDestroyListener, EventBus, ListenerId, ListenerRegistry};
pub use memory::MemoryStore;
pub use monitoring::{MonitoringRegistry, StatsRegistry, StatsSource};
pub use provider::SessionProvider;
pub use scheduler::{PeriodicJob, ScheduleHandle, Scheduler, TokioScheduler};
pub use store::{SessionStore, StoreStats, StoreTransaction};
