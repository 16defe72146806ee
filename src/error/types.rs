//! Error types
//!
//! Defines the errors surfaced by path resolution and storage operations.

use std::io;
use std::path::PathBuf;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors surfaced by the adapter.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested filename resolves outside the configured root.
    #[error("Path traversal attempt: \"{filename}\" is out of range of {}", .root.display())]
    PathTraversal { filename: String, root: PathBuf },

    /// The target file does not exist.
    #[error("File not found: {}", .path.display())]
    NotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A create-exclusive write hit an existing file.
    #[error("File already exists: {}", .path.display())]
    AlreadyExists {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Any other storage failure.
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Fieldless view of [`StorageError`], handy for matching in callers and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    PathTraversal,
    NotFound,
    AlreadyExists,
    Io,
}

impl StorageError {
    /// Creates a path traversal error for `filename` under `root`.
    pub fn path_traversal(filename: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self::PathTraversal {
            filename: filename.into(),
            root: root.into(),
        }
    }

    /// Classifies an I/O error raised while operating on `path`.
    ///
    /// `NotFound` and `AlreadyExists` get their own variants, everything
    /// else is wrapped as [`StorageError::Io`].
    pub fn from_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound { path, source },
            io::ErrorKind::AlreadyExists => Self::AlreadyExists { path, source },
            _ => Self::Io { path, source },
        }
    }

    /// Wraps an I/O error as [`StorageError::Io`] without classification.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PathTraversal { .. } => ErrorKind::PathTraversal,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    /// Returns true for the containment violation.
    pub fn is_security_violation(&self) -> bool {
        matches!(self, Self::PathTraversal { .. })
    }
}
