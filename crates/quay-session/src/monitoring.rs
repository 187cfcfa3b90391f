//! Registration of statistics for external exporters.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Result, SessionError};
use crate::store::StoreStats;

/// Anything that can report store counters.
pub trait StatsSource: Send + Sync {
    fn stats(&self) -> StoreStats;
}

/// Where statistics sources are published for monitoring.
pub trait MonitoringRegistry: Send + Sync {
    /// Publish `source` under `name`.
    fn register(&self, name: &str, source: Arc<dyn StatsSource>) -> Result<()>;

    /// Withdraw the source published under `name`.
    fn unregister(&self, name: &str) -> Result<()>;
}

/// In-process [`MonitoringRegistry`] that exporters can read from.
#[derive(Default)]
pub struct StatsRegistry {
    sources: RwLock<BTreeMap<String, Arc<dyn StatsSource>>>,
}

impl StatsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.sources.read().keys().cloned().collect()
    }

    /// Current counters of every registered source.
    pub fn snapshot(&self) -> BTreeMap<String, StoreStats> {
        self.sources
            .read()
            .iter()
            .map(|(name, source)| (name.clone(), source.stats()))
            .collect()
    }
}

impl MonitoringRegistry for StatsRegistry {
    fn register(&self, name: &str, source: Arc<dyn StatsSource>) -> Result<()> {
        let mut sources = self.sources.write();
        if sources.contains_key(name) {
            return Err(SessionError::Registration(format!(
                "'{name}' is already registered"
            )));
        }
        sources.insert(name.to_string(), source);
        debug!(name = %name, "Registered statistics source");
        Ok(())
    }

    fn unregister(&self, name: &str) -> Result<()> {
        match self.sources.write().remove(name) {
            Some(_) => {
                debug!(name = %name, "Unregistered statistics source");
                Ok(())
            }
            None => Err(SessionError::Registration(format!(
                "'{name}' is not registered"
            ))),
        }
    }
}
