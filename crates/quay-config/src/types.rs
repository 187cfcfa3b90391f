//! Configuration file model.

use std::time::Duration;

use quay_types::{ConfigProvider, HasSessionConfig, TimeUnit, config_defaults};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Root configuration.
///
/// ```toml
/// [session]
/// expiration_time = 30
/// expiration_time_unit = "minutes"
/// transactional = false
///
/// [sweep]
/// enabled = true
/// initial_check_delay = 1
/// check_period = 15
/// check_period_unit = "minutes"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuayConfig {
    pub session: SessionConfig,
    pub sweep: SweepConfig,
    pub store: StoreConfig,
    pub monitoring: MonitoringConfig,
    pub logging: LoggingConfig,
}

impl QuayConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a TOML document.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.sweep.enabled && self.sweep.check_period == 0 {
            return Err(ConfigError::Invalid {
                field: "sweep.check_period".to_string(),
                reason: "must be greater than zero while the sweep is enabled".to_string(),
            });
        }
        if self.monitoring.enabled && self.monitoring.name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "monitoring.name".to_string(),
                reason: "must not be empty while monitoring is enabled".to_string(),
            });
        }
        Ok(())
    }

    /// Resolve the settings the session provider reads.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            expiration_time: self.session.expiration(),
            transactional: self.session.transactional,
            sweep_enabled: self.sweep.enabled,
            initial_check_delay: self.sweep.initial_delay(),
            check_period: self.sweep.period(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// Timeout and transaction settings for new sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Timeout amount, in `expiration_time_unit`.
    pub expiration_time: u64,
    pub expiration_time_unit: TimeUnit,
    /// Wrap lookup and write-back in a store transaction.
    pub transactional: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expiration_time: config_defaults::EXPIRATION_TIME_SECS / 60,
            expiration_time_unit: TimeUnit::Minutes,
            transactional: false,
        }
    }
}

impl SessionConfig {
    pub fn expiration(&self) -> Duration {
        self.expiration_time_unit.to_duration(self.expiration_time)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sweep
// ─────────────────────────────────────────────────────────────────────────────

/// Schedule of the periodic expiry sweep.
///
/// Both delays share `check_period_unit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub enabled: bool,
    pub initial_check_delay: u64,
    pub check_period: u64,
    pub check_period_unit: TimeUnit,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_check_delay: 1,
            check_period: 15,
            check_period_unit: TimeUnit::Minutes,
        }
    }
}

impl SweepConfig {
    pub fn initial_delay(&self) -> Duration {
        self.check_period_unit.to_duration(self.initial_check_delay)
    }

    pub fn period(&self) -> Duration {
        self.check_period_unit.to_duration(self.check_period)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store, monitoring, logging
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory reference store settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum number of entries before LRU eviction. `0` means unbounded.
    pub max_entries: usize,
}

/// Registration of the statistics surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enabled: bool,
    /// Name the statistics are registered under.
    pub name: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: config_defaults::MONITORING_NAME.to_string(),
        }
    }
}

/// Log output settings for the host binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolved settings
// ─────────────────────────────────────────────────────────────────────────────

/// Session settings resolved into durations.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub expiration_time: Duration,
    pub transactional: bool,
    pub sweep_enabled: bool,
    pub initial_check_delay: Duration,
    pub check_period: Duration,
}

impl ConfigProvider for SessionSettings {}

impl HasSessionConfig for SessionSettings {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_reference_defaults() {
        let config = QuayConfig::from_toml("").unwrap();
        let settings = config.session_settings();
        assert_eq!(settings.expiration_time, Duration::from_secs(1800));
        assert_eq!(settings.initial_check_delay, Duration::from_secs(60));
        assert_eq!(settings.check_period, Duration::from_secs(900));
        assert!(settings.sweep_enabled);
        assert!(!settings.transactional);
        assert_eq!(config.store.max_entries, 0);
        assert_eq!(config.monitoring.name, "sessions");
    }

    #[test]
    fn test_parse_full() {
        let toml = r#"
[session]
expiration_time = 2
expiration_time_unit = "hours"
transactional = true

[sweep]
enabled = true
initial_check_delay = 5
check_period = 30
check_period_unit = "seconds"

[store]
max_entries = 500

[monitoring]
enabled = false

[logging]
filter = "quay_session=debug"
json = true
"#;
        let config = QuayConfig::from_toml(toml).unwrap();
        let settings = config.session_settings();
        assert_eq!(settings.expiration_time, Duration::from_secs(7200));
        assert!(settings.transactional);
        assert_eq!(settings.initial_check_delay, Duration::from_secs(5));
        assert_eq!(settings.check_period, Duration::from_secs(30));
        assert_eq!(config.store.max_entries, 500);
        assert!(!config.monitoring.enabled);
        assert_eq!(config.logging.filter, "quay_session=debug");
        assert!(config.logging.json);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = QuayConfig::from_toml("[session]\nexpiration_time = 10\n").unwrap();
        assert_eq!(config.session.expiration_time_unit, TimeUnit::Minutes);
        assert_eq!(config.session.expiration(), Duration::from_secs(600));
        assert_eq!(config.sweep, SweepConfig::default());
    }

    #[test]
    fn test_zero_period_rejected_when_enabled() {
        let err = QuayConfig::from_toml("[sweep]\ncheck_period = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "sweep.check_period"));
    }

    #[test]
    fn test_zero_period_allowed_when_disabled() {
        let config = QuayConfig::from_toml("[sweep]\nenabled = false\ncheck_period = 0\n").unwrap();
        assert!(!config.session_settings().sweep_enabled);
    }

    #[test]
    fn test_unknown_unit_is_parse_error() {
        let err = QuayConfig::from_toml("[session]\nexpiration_time_unit = \"fortnights\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = QuayConfig::new();
        config.session.expiration_time = 45;
        config.store.max_entries = 10;
        let text = config.to_toml().unwrap();
        assert_eq!(QuayConfig::from_toml(&text).unwrap(), config);
    }
}
