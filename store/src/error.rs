//! Error types for task repository operations.
//!
//! Every [`TaskRepository`](crate::TaskRepository) method reports failures
//! through [`RepoError`]. Callers that need a coarser classification (for
//! example the sync service's mutation results) match on the variant rather
//! than on the message text.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{TaskRef, TaskRefError};

/// Errors that can occur while reading or mutating a task store.
#[derive(Error, Debug)]
pub enum RepoError {
    /// The referenced task or subtask does not exist.
    #[error("task {0} not found")]
    NotFound(TaskRef),

    /// The request was rejected before touching the store.
    #[error("validation failed: {0}")]
    Validation(String),

    /// File system I/O error.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The task store file is not valid JSON for the expected shape.
    #[error("corrupt task store {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The repository cannot perform this capability.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl RepoError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Corrupt {
            path: path.into(),
            source,
        }
    }
}

impl From<TaskRefError> for RepoError {
    fn from(err: TaskRefError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// A specialized `Result` type for repository operations.
pub type Result<T> = std::result::Result<T, RepoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display_uses_dotted_address() {
        let err = RepoError::NotFound(TaskRef::Subtask { parent: 3, id: 1 });
        assert_eq!(err.to_string(), "task 3.1 not found");
    }

    #[test]
    fn io_error_keeps_source() {
        use std::error::Error;

        let err = RepoError::io(
            "/tmp/tasks.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/tmp/tasks.json"));
        assert!(err.source().is_some());
    }

    #[test]
    fn corrupt_error_display() {
        let json_err = serde_json::from_str::<serde_json::Value>("{ nope").unwrap_err();
        let err = RepoError::corrupt("tasks.json", json_err);
        assert!(err.to_string().starts_with("corrupt task store tasks.json"));
    }

    #[test]
    fn task_ref_error_becomes_validation() {
        let err: RepoError = TaskRefError::Empty.into();
        assert!(matches!(err, RepoError::Validation(_)));
    }
}
