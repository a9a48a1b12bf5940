//! Core error types for tunwright

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the tunwright ecosystem
#[derive(Error, Debug)]
pub enum TwError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Probe error
    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    /// Action error
    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while reading observed state.
///
/// Probes are tolerant by contract, so these only surface as warnings
/// attached to a probe result, never as an aborted run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The tunnel registry CLI could not be listed
    #[error("Tunnel registry unavailable: {0}")]
    RegistryUnavailable(String),

    /// The container runtime could not be queried
    #[error("Container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// A local file could not be read
    #[error("Failed to read {path}: {message}")]
    Unreadable { path: PathBuf, message: String },
}

/// Errors raised by the action executor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// A fatal action failed; the stderr of the causing command is kept verbatim
    #[error("{action} failed: {stderr}")]
    Fatal { action: String, stderr: String },

    /// State that automation must not resolve on the operator's behalf
    #[error("Ambiguous state: {0}")]
    Ambiguous(String),

    /// An action needed a tunnel id that no earlier step produced
    #[error("No tunnel id available for {0}")]
    MissingTunnelId(String),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),
}
