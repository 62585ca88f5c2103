//! Error types for fabric-sync
//!
//! Reconciliation treats several error kinds as control flow rather than
//! failure: [`Error::NotFound`] skips an item, [`Error::AlreadyExists`] is an
//! idempotent success, and [`Error::Connection`] aborts only the current pass.

use thiserror::Error;

/// Result type alias for fabric-sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for fabric-sync
#[derive(Error, Debug)]
pub enum Error {
    /// An object the caller expected to exist is missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// A create collided with an existing object
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// The downstream repository (or intent store) is unreachable
    #[error("Connection error: {0}")]
    Connection(String),

    /// An upstream resource failed a precondition check
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Fabric repository backend error
    #[error("Repository error ({backend}): {message}")]
    Repository {
        /// Backend name
        backend: String,
        /// Error message
        message: String,
    },

    /// Intent store backend error
    #[error("Intent store error ({backend}): {message}")]
    IntentStore {
        /// Backend name
        backend: String,
        /// Error message
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Sync lock could not be acquired
    #[error("Lock error: {0}")]
    Lock(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an "already exists" error
    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::AlreadyExists(msg.into())
    }

    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a repository backend error
    pub fn repository(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Repository {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Create an intent store backend error
    pub fn intent_store(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::IntentStore {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a lock error
    pub fn lock(msg: impl Into<String>) -> Self {
        Self::Lock(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
