//! Error types for sightline.
//!
//! This module defines all error types used throughout the sightline crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for sightline operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Sighting Errors ===
    /// A sighting failed validation before it reached storage.
    #[error("invalid sighting: {reason}")]
    InvalidSighting {
        /// Why the sighting was rejected.
        reason: String,
    },

    // === Sync Errors ===
    /// A sync transport failed to deliver a batch.
    #[error("sync transport '{transport}' failed: {message}")]
    SyncTransport {
        /// Name of the transport.
        transport: &'static str,
        /// Description of what went wrong.
        message: String,
    },

    // === Library Errors ===
    /// The offline reference library could not be loaded.
    #[error("offline library error: {0}")]
    Library(String),

    // === I/O Errors ===
    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An operation timed out.
    #[error("operation timed out: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
    },

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for sightline operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create an invalid sighting error.
    #[must_use]
    pub fn invalid_sighting(reason: impl Into<String>) -> Self {
        Self::InvalidSighting {
            reason: reason.into(),
        }
    }

    /// Create a sync transport error.
    #[must_use]
    pub fn sync_transport(transport: &'static str, message: impl Into<String>) -> Self {
        Self::SyncTransport {
            transport,
            message: message.into(),
        }
    }

    /// Create a timeout error for the named operation.
    #[must_use]
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Check if this error is a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
