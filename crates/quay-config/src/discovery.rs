//! Locating, loading and saving configuration files.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::types::QuayConfig;

const APP_NAME: &str = "quay";
const CONFIG_FILE: &str = "config.toml";

/// `$XDG_CONFIG_HOME/quay`, if a config directory can be determined.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// `$XDG_CONFIG_HOME/quay/config.toml`.
pub fn xdg_config_path() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join(CONFIG_FILE))
}

/// Load configuration.
///
/// An explicit path must exist. Without one, the XDG config file is used
/// when present, and defaults otherwise.
pub fn load_config(explicit: Option<&Path>) -> Result<QuayConfig> {
    if let Some(path) = explicit {
        return load_config_file(path);
    }

    match xdg_config_path() {
        Some(path) if path.exists() => load_config_file(&path),
        _ => {
            debug!("No config file found, using defaults");
            Ok(QuayConfig::default())
        }
    }
}

/// Load configuration from a specific file.
pub fn load_config_file(path: &Path) -> Result<QuayConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    debug!(path = %path.display(), "Loaded config file");
    QuayConfig::from_toml(&contents)
}

/// Save configuration to a file.
///
/// Creates parent directories if they don't exist.
pub fn save_config(config: &QuayConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFile {
            path: parent.display().to_string(),
            source: e,
        })?;
    }

    let contents = config.to_toml()?;
    std::fs::write(path, contents).map_err(|e| ConfigError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(())
}
