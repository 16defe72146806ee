//! Local storage adapter
//!
//! File access (read, write, stat, exists, delete, streamed read) confined to
//! a root directory. Writes create missing parent directories on the fly.

pub mod config;
pub mod error;
pub mod storage;
pub mod utils;

pub use config::AdapterConfig;
pub use error::{ErrorKind, StorageError, StorageResult};
pub use storage::{
    ContainmentPolicy, FileMetadata, LocalAdapter, ReadOptions, ReadStream, WriteContent,
    WriteOptions,
};
