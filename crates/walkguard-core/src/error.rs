//! Core error types for walkguard-core.
//!
//! This module defines the error hierarchy using thiserror. Lifecycle
//! violations (conflicts, bad transitions, missing records) are first-class
//! variants so callers can distinguish "too late to cancel" from a broken
//! database.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for walkguard-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Gateway delivery errors (only surfaced directly for manual test sends;
    /// the dispatcher handles these internally)
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// A record lookup came up empty
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// The operation conflicts with existing state (e.g. starting a walk
    /// session while one is already active)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The record exists but is not in a state that permits the operation
    /// (e.g. cancelling an alert whose countdown already fired)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Dispatch was asked to notify a user with an empty trusted-contact list
    #[error("user {user_id} has no trusted contacts")]
    NoContacts { user_id: i64 },

    /// Input validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
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

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

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

    /// Missing required configuration key
    #[error("Missing required configuration key: {0}")]
    MissingKey(String),
}

/// Per-send delivery errors reported by an [`SmsGateway`](crate::gateway::SmsGateway).
///
/// The dispatcher retries `Transient` failures with backoff; `Permanent`
/// failures are recorded and never retried.
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    /// Retryable failure: rate limit, timeout, provider outage
    #[error("transient delivery failure: {reason}")]
    Transient { reason: String },

    /// Non-retryable failure: invalid number, account suspended
    #[error("permanent delivery failure: {reason}")]
    Permanent { reason: String },
}

impl GatewayError {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient {
            reason: reason.into(),
        }
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        Self::Permanent {
            reason: reason.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

// Helper implementations for converting from other error types

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
        CoreError::Database(DatabaseError::from(err))
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for CoreError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        CoreError::Custom(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
