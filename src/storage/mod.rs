//! File system storage management
//!
//! Handles path resolution, resilient writes and the root-scoped adapter.

pub mod filesystem;
pub mod metadata;
pub mod operations;
pub mod validation;
pub mod writer;

// Re-export commonly used types
pub use filesystem::{FileSystem, LocalFileSystem, OpenMode};
pub use metadata::{DEFAULT_MIME_TYPE, FileMetadata, guess_mime_type};
pub use operations::{LocalAdapter, ReadOptions, ReadStream};
pub use validation::{ContainmentPolicy, ResolvedPath, normalize_root, resolve_path};
pub use writer::{ResilientWriter, WriteContent, WriteOptions};
