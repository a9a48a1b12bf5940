//! Configuration management for tunwright

mod deploy;
mod endpoint;
pub mod serde_utils;

pub use deploy::{
    ContainersConfig, DeployConfig, DnsConfig, PathsConfig, SettleConfig, TimeoutsConfig,
    TunnelConfig,
};
pub use endpoint::EndpointConfig;

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// File name looked up in the working directory before the per-user config
pub const PROJECT_CONFIG_FILE: &str = "tunwright.toml";

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tunwright")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Pick the configuration file to use
///
/// An explicit path always wins. Otherwise `./tunwright.toml`, then the
/// per-user file; `None` means built-in defaults.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    let project = PathBuf::from(PROJECT_CONFIG_FILE);
    if project.exists() {
        return Some(project);
    }

    let user = default_config_path();
    user.exists().then_some(user)
}

/// Load the deploy configuration following [`resolve_config_path`]
pub fn load_deploy_config(explicit: Option<&Path>) -> Result<DeployConfig, ConfigError> {
    let config = match resolve_config_path(explicit) {
        Some(path) => {
            tracing::debug!("Loading configuration from {:?}", path);
            load_config(&path)?
        }
        None => {
            tracing::debug!("No configuration file found, using defaults");
            DeployConfig::default()
        }
    };
    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
        }
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}
