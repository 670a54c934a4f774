//! Core error types for riseup-core.
//!
//! Scheduling never fails loudly: disabled alarms, non-positive delays and
//! out-of-horizon requests are logged no-ops. The types here cover the
//! surfaces that can fail for real (persistence, configuration, input
//! parsing and platform collaborators).

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for riseup-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Platform collaborator errors
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
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

    /// Unknown dot-path key
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    /// Data directory could not be determined or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Time-of-day string could not be parsed
    #[error("Invalid time of day '{input}': expected HH:MM or h:MM AM/PM")]
    InvalidTimeOfDay { input: String },

    /// Unknown haptic pattern name
    #[error("Unknown haptic pattern '{0}'")]
    UnknownPattern(String),
}

/// Errors reported by platform collaborators (sensors, sessions).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The sensor produced an error for one update
    #[error("Sensor error: {0}")]
    Sensor(String),

    /// The feature is not available on this device
    #[error("{0} is not available on this device")]
    Unavailable(&'static str),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
