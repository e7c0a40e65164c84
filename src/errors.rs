//! Dual-store Error Hierarchy
//!
//! Errors are grouped by the layer that produces them: backend storage,
//! capability probing on the legacy backend, watch event filtering, and
//! configuration.

use std::num::ParseIntError;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failures reported by a storage backend
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A backend lacks an operation the caller needs
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    /// Failures while filtering or delivering watch events
    #[error(transparent)]
    Watch(#[from] WatchError),

    /// Configuration loading failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configuration validation failures
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Unrecoverable failures
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Object does not exist in the backend
    #[error("{name} not found")]
    NotFound { name: String },

    /// Create collided with an existing object
    #[error("{name} already exists")]
    AlreadyExists { name: String },

    /// Optimistic concurrency check failed
    #[error("Conflict on {name}: expected resource version {expected}, found {actual}")]
    Conflict {
        name: String,
        expected: String,
        actual: String,
    },

    /// Validation callback or precondition rejected the object
    #[error("{name} is invalid: {reason}")]
    Invalid { name: String, reason: String },

    /// Transient or permanent backend failure
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Raised when the legacy backend is wired without an operation.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("legacy storage does not implement create")]
    NoCreateMethod,

    #[error("legacy storage does not implement update")]
    NoUpdateMethod,

    #[error("legacy storage lister is missing")]
    ListerMissing,

    #[error("legacy storage graceful deleter is missing")]
    DeleterMissing,

    #[error("{method} is not implemented by legacy storage")]
    NotImplemented { method: &'static str },
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Resource versions must be decimal integers
    #[error("invalid resource version {value:?}")]
    InvalidResourceVersion {
        value: String,
        #[source]
        source: ParseIntError,
    },

    /// Modified events reaching a filtered watch must carry the previous object
    #[error("old object must be set for modified events")]
    MissingOldObject,

    /// Selector could not be parsed or evaluated
    #[error("predicate error: {0}")]
    Predicate(String),
}

impl Error {
    /// True when the error means the object is absent from the backend.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Storage(StorageError::NotFound { .. }))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::Storage(StorageError::AlreadyExists { .. }))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Storage(StorageError::Conflict { .. }))
    }

    /// Short label used in metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Storage(StorageError::NotFound { .. }) => "not_found",
            Error::Storage(StorageError::AlreadyExists { .. }) => "already_exists",
            Error::Storage(StorageError::Conflict { .. }) => "conflict",
            Error::Storage(StorageError::Invalid { .. }) => "invalid",
            Error::Storage(StorageError::Backend(_)) => "backend",
            Error::Capability(_) => "capability",
            Error::Watch(_) => "watch",
            Error::Config(_) | Error::InvalidConfig(_) => "config",
            Error::Fatal(_) => "fatal",
        }
    }
}

impl StorageError {
    pub fn not_found(name: impl Into<String>) -> Self {
        StorageError::NotFound { name: name.into() }
    }
}
