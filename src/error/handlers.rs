//! Error handlers
//!
//! Logs storage errors and maps them to process exit codes for the binary.

use crate::error::types::{ErrorKind, StorageError};
use log::{error, warn};

/// Log a storage error at a level matching its severity
pub fn handle_error(err: &StorageError) {
    match err.kind() {
        ErrorKind::PathTraversal => warn!("Rejected request: {}", err),
        ErrorKind::NotFound | ErrorKind::AlreadyExists => warn!("Storage error: {}", err),
        ErrorKind::Io => error!("Storage error: {}", err),
    }
}

/// Convert error to a process exit code
pub fn error_to_exit_code(err: &StorageError) -> u8 {
    match err.kind() {
        ErrorKind::NotFound => 2,
        ErrorKind::AlreadyExists => 3,
        ErrorKind::PathTraversal => 4,
        ErrorKind::Io => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn exit_codes_are_distinct_per_kind() {
        let errors = [
            StorageError::path_traversal("..", "/r"),
            StorageError::from_io("/r/a", io::Error::from(io::ErrorKind::NotFound)),
            StorageError::from_io("/r/a", io::Error::from(io::ErrorKind::AlreadyExists)),
            StorageError::io("/r/a", io::Error::other("disk full")),
        ];

        let mut codes: Vec<u8> = errors.iter().map(error_to_exit_code).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        assert!(codes.iter().all(|code| *code != 0));
    }
}
