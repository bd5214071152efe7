//! Error types for the task store sync service.
//!
//! Two families live here:
//!
//! - [`SyncError`] for service lifecycle failures (bad configuration, a watch
//!   backend that cannot start, starting twice).
//! - [`MutationError`] for the mutation façade. Repository failures never
//!   escape a façade call as a panic; they are classified into a
//!   [`FailureKind`] so callers can tell "not found" from "I/O error"
//!   without parsing messages.

use std::fmt;

use taskboard_store::RepoError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while setting up or running the sync service.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The native file watcher could not be created.
    #[error("file watch error: {0}")]
    Watch(#[from] notify::Error),

    /// `start` was called on a service that is already running.
    #[error("sync service already started")]
    AlreadyStarted,

    /// The service has been disposed.
    #[error("sync service disposed")]
    Disposed,
}

/// A specialized `Result` type for sync service operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Classification of a failed mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    NotFound,
    Validation,
    Io,
    Corrupt,
    Unsupported,
    /// The requested variant of the operation does not exist yet.
    NotImplemented,
    /// The façade was disposed before the call.
    Disposed,
}

impl FailureKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not found",
            Self::Validation => "validation",
            Self::Io => "I/O",
            Self::Corrupt => "corrupt store",
            Self::Unsupported => "unsupported",
            Self::NotImplemented => "not implemented",
            Self::Disposed => "disposed",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed mutation: its kind plus a human-readable message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct MutationError {
    pub kind: FailureKind,
    pub message: String,
}

impl MutationError {
    #[must_use]
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn disposed() -> Self {
        Self::new(FailureKind::Disposed, "mutation façade has been disposed")
    }
}

impl From<RepoError> for MutationError {
    fn from(err: RepoError) -> Self {
        let kind = match &err {
            RepoError::NotFound(_) => FailureKind::NotFound,
            RepoError::Validation(_) => FailureKind::Validation,
            RepoError::Io { .. } => FailureKind::Io,
            RepoError::Corrupt { .. } => FailureKind::Corrupt,
            RepoError::Unsupported(_) => FailureKind::Unsupported,
        };
        Self::new(kind, err.to_string())
    }
}

/// Result of a mutation façade operation.
pub type MutationResult<T> = std::result::Result<T, MutationError>;
