//! Command handlers.

pub mod config;
pub mod serve;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use quay_config::{LoggingConfig, QuayConfig};
use tracing_subscriber::EnvFilter;

/// Shared context for all commands.
pub struct Context {
    pub config_path: Option<PathBuf>,
    pub verbose: bool,
}

impl Context {
    /// Load the configuration selected on the command line.
    pub fn load_config(&self) -> Result<QuayConfig> {
        quay_config::load_config(self.config_path.as_deref()).context("failed to load configuration")
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `--verbose`, which wins over `[logging].filter`.
pub fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let fallback = if verbose {
        "quay=debug,quay_session=debug,quay_config=debug,info"
    } else {
        logging.filter.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
