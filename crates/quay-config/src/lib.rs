//! Configuration system for the Quay session layer.
//!
//! Provides TOML-based configuration with:
//! - Session timeout as an `(amount, unit)` pair (`[session]`)
//! - Expiry sweep schedule (`[sweep]`)
//! - Reference store capacity (`[store]`)
//! - Statistics registration (`[monitoring]`) and log filtering (`[logging]`)
//!
//! Every section is optional; an empty file yields the reference defaults.

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{load_config, load_config_file, save_config, xdg_config_dir, xdg_config_path};
pub use error::{ConfigError, Result};
pub use types::*;
