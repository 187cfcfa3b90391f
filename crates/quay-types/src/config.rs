//! Configuration traits for decoupled config passing between crates.
//!
//! The session provider reads its settings through [`HasSessionConfig`], so
//! it does not need to know about the TOML file model in `quay-config`.

use std::time::Duration;

/// Base trait for all configuration types.
///
/// Implementations should be cheaply cloneable and thread-safe.
pub trait ConfigProvider: Clone + Send + Sync + 'static {}

/// Session lifecycle configuration.
///
/// Provides the timeout handed to new sessions and the schedule of the
/// periodic expiry sweep.
pub trait HasSessionConfig: ConfigProvider {
    /// Timeout given to newly created sessions.
    fn expiration_time(&self) -> Duration;

    /// Whether lookups and write-backs run inside a store transaction.
    fn transactional(&self) -> bool {
        false
    }

    /// Whether the periodic sweep is registered with the scheduler.
    fn sweep_enabled(&self) -> bool {
        true
    }

    /// Delay before the first sweep.
    fn initial_check_delay(&self) -> Duration {
        defaults::initial_check_delay()
    }

    /// Interval between sweeps.
    fn check_period(&self) -> Duration {
        defaults::check_period()
    }
}

/// Default session configuration values.
pub mod defaults {
    use std::time::Duration;

    pub const EXPIRATION_TIME_SECS: u64 = 30 * 60;
    pub const INITIAL_CHECK_DELAY_SECS: u64 = 60;
    pub const CHECK_PERIOD_SECS: u64 = 15 * 60;
    pub const MONITORING_NAME: &str = "sessions";

    pub fn expiration_time() -> Duration {
        Duration::from_secs(EXPIRATION_TIME_SECS)
    }

    pub fn initial_check_delay() -> Duration {
        Duration::from_secs(INITIAL_CHECK_DELAY_SECS)
    }

    pub fn check_period() -> Duration {
        Duration::from_secs(CHECK_PERIOD_SECS)
    }
}

/// Standalone session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfigProvider {
    pub expiration_time: Duration,
    pub transactional: bool,
    pub sweep_enabled: bool,
    pub initial_check_delay: Duration,
    pub check_period: Duration,
}

impl Default for SessionConfigProvider {
    fn default() -> Self {
        Self {
            expiration_time: defaults::expiration_time(),
            transactional: false,
            sweep_enabled: true,
            initial_check_delay: defaults::initial_check_delay(),
            check_period: defaults::check_period(),
        }
    }
}

impl ConfigProvider for SessionConfigProvider {}

impl HasSessionConfig for SessionConfigProvider {
    fn expiration_time(&self) -> Duration {
        self.expiration_time
    }

    fn transactional(&self) -> bool {
        self.transactional
    }

    fn sweep_enabled(&self) -> bool {
        self.sweep_enabled
    }

    fn initial_check_delay(&self) -> Duration {
        self.initial_check_delay
    }

    fn check_period(&self) -> Duration {
        self.check_period
    }
}
