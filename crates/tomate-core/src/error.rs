//! Core error types for tomate-core.
//!
//! Invalid state transitions are not errors: they are reported as `false`
//! by the timer and session APIs. The types here cover configuration and
//! plugin failures only.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for tomate-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Plugin-related errors
    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Missing required configuration key
    #[error("Missing required configuration key: {0}")]
    MissingKey(String),

    /// Failed to access the data directory
    #[error("Failed to access data directory: {0}")]
    DataDir(String),
}

/// Errors raised by or about plugins.
#[derive(Error, Debug)]
pub enum PluginError {
    /// A plugin hook or handler reported a failure
    #[error("{0}")]
    Failed(String),

    /// A plugin panicked
    #[error("plugin panicked: {0}")]
    Panicked(String),

    /// Handler invoked while the plugin was already running
    #[error("plugin is busy (re-entrant dispatch)")]
    Busy,

    /// A manifest could not be read or parsed
    #[error("Invalid plugin manifest {path}: {message}")]
    InvalidManifest { path: PathBuf, message: String },

    /// A manifest names an entry point with no registered factory
    #[error("Unknown plugin entry '{0}'")]
    UnknownEntry(String),
}

impl PluginError {
    /// Shorthand for a plugin-reported failure.
    pub fn failed(message: impl Into<String>) -> Self {
        PluginError::Failed(message.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
