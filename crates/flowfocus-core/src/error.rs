//! Core error types for flowfocus-core.
//!
//! Most engine failures are recovered locally (logged and ignored); these
//! types cover the places where an error does reach the embedder: opening
//! storage, loading configuration, and talking to a torn-down engine.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for flowfocus-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Overlay surface errors
    #[error("Overlay error: {0}")]
    Overlay(#[from] OverlayError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The engine task has shut down and no longer accepts commands.
    #[error("Timer engine is not running")]
    EngineStopped,
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
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

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
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

    /// Unknown dotted key
    #[error("Unknown config key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A required field is absent
    #[error("Missing field '{0}'")]
    MissingField(&'static str),

    /// A field has the wrong JSON type
    #[error("Field '{field}' must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    /// A numeric field is out of range
    #[error("Field '{field}' out of range: {value}")]
    OutOfRange { field: &'static str, value: String },

    /// Unknown session type name
    #[error("Unknown session type '{0}'")]
    UnknownSessionType(String),

    /// Message could not be decoded at all
    #[error("Malformed message: {0}")]
    Malformed(String),
}

/// Errors raised by a host while creating or talking to a detached surface.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OverlayError {
    /// The host refused to create the surface
    #[error("Overlay surface creation blocked: {0}")]
    Blocked(String),

    /// The surface is gone
    #[error("Overlay surface closed")]
    Closed,
}

/// Errors raised by a notification or cue backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NotifyError {
    /// Notifications are not permitted by the host
    #[error("Notification permission denied")]
    PermissionDenied,

    /// The backend failed to dispatch
    #[error("Dispatch failed: {0}")]
    Dispatch(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) if e.code == rusqlite::ErrorCode::DatabaseLocked => {
                StorageError::Locked
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Storage(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
