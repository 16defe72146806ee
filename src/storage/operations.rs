//! Storage operations
//!
//! The adapter every caller goes through: read, stat, exists, streamed read,
//! write and remove, all confined to the storage root.

use bytes::Bytes;
use log::{debug, info};
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt, Take};
use tokio_util::io::ReaderStream;

use crate::config::{AdapterConfig, DEFAULT_READ_CHUNK_SIZE};
use crate::error::{StorageError, StorageResult};
use crate::storage::filesystem::{FileSystem, LocalFileSystem};
use crate::storage::metadata::FileMetadata;
use crate::storage::validation::{
    ContainmentPolicy, ResolvedPath, normalize_root, resolve_path, verify_canonical,
};
use crate::storage::writer::{ResilientWriter, WriteContent, WriteOptions};

/// Lazy, finite stream of file chunks. Not restartable.
pub type ReadStream = ReaderStream<Take<File>>;

/// Byte range of a read stream. Both ends are inclusive offsets; a missing
/// `start` reads from the beginning and a missing `end` reads to EOF.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl ReadOptions {
    pub fn range(start: u64, end: u64) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Number of bytes to read from `start`, `None` for an inverted range.
    fn limit(&self) -> Option<u64> {
        let start = self.start.unwrap_or(0);
        match self.end {
            Some(end) => end.checked_sub(start).map(|len| len.saturating_add(1)),
            None => Some(u64::MAX),
        }
    }
}

/// File access scoped to a root directory.
#[derive(Debug, Clone)]
pub struct LocalAdapter<F = LocalFileSystem> {
    root: PathBuf,
    containment: ContainmentPolicy,
    read_chunk_size: usize,
    writer: ResilientWriter<F>,
}

impl LocalAdapter<LocalFileSystem> {
    /// Creates an adapter over the local disk. A relative `root` is made
    /// absolute against the current directory.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        Self::with_file_system(root, LocalFileSystem)
    }

    /// Creates an adapter from configuration, creating the root first when
    /// `create_root` is set.
    pub async fn from_config(config: &AdapterConfig) -> StorageResult<Self> {
        let root = config.storage_root_path();

        if config.create_root {
            fs::create_dir_all(&root)
                .await
                .map_err(|e| StorageError::io(&root, e))?;
        }

        let adapter = Self::new(&root)?
            .with_containment(config.containment)
            .with_read_chunk_size(config.read_chunk_size);

        info!(
            "Storage adapter ready at {} ({:?} containment)",
            adapter.root.display(),
            adapter.containment
        );

        Ok(adapter)
    }
}

impl<F: FileSystem> LocalAdapter<F> {
    /// Creates an adapter that writes through `fs`.
    pub fn with_file_system(root: impl AsRef<Path>, fs: F) -> StorageResult<Self> {
        let root = root.as_ref();
        let root = normalize_root(root).map_err(|e| StorageError::io(root, e))?;

        Ok(Self {
            root,
            containment: ContainmentPolicy::default(),
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            writer: ResilientWriter::new(fs),
        })
    }

    pub fn with_containment(mut self, containment: ContainmentPolicy) -> Self {
        self.containment = containment;
        self
    }

    pub fn with_read_chunk_size(mut self, read_chunk_size: usize) -> Self {
        self.read_chunk_size = read_chunk_size.max(1);
        self
    }

    /// The absolute, normalized root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `filename` and applies the configured containment policy.
    pub async fn resolve(&self, filename: &str) -> StorageResult<ResolvedPath> {
        let resolved = resolve_path(&self.root, filename)?;

        if self.containment == ContainmentPolicy::Canonical {
            verify_canonical(&self.root, &resolved, filename).await?;
        }

        Ok(resolved)
    }

    /// Reads a whole file.
    pub async fn read(&self, filename: &str) -> StorageResult<Bytes> {
        let path = self.resolve(filename).await?;

        let data = fs::read(&path)
            .await
            .map_err(|e| StorageError::from_io(path.as_path(), e))?;

        debug!("Read {} ({} bytes)", path.as_path().display(), data.len());
        Ok(Bytes::from(data))
    }

    /// Returns normalized metadata of a file.
    pub async fn read_info(&self, filename: &str) -> StorageResult<FileMetadata> {
        let path = self.resolve(filename).await?;
        self.stat(path.as_path()).await
    }

    /// Returns whether `filename` is an existing regular file.
    ///
    /// A missing file is `false`; any other stat failure is an error.
    pub async fn exists(&self, filename: &str) -> StorageResult<bool> {
        let path = self.resolve(filename).await?;

        match fs::metadata(&path).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::from_io(path.into_path_buf(), e)),
        }
    }

    /// Opens `filename` and returns a stream over its chunks, limited to
    /// the range in `options`.
    ///
    /// The file is opened here so a missing file fails immediately; content
    /// is read as the stream is polled. An inverted range is an
    /// [`StorageError::Io`] with `InvalidInput`.
    pub async fn create_read_stream(
        &self,
        filename: &str,
        options: &ReadOptions,
    ) -> StorageResult<ReadStream> {
        let path = self.resolve(filename).await?;

        let limit = options.limit().ok_or_else(|| {
            StorageError::io(
                path.as_path(),
                io::Error::new(io::ErrorKind::InvalidInput, "range end is before start"),
            )
        })?;

        let mut file = File::open(&path)
            .await
            .map_err(|e| StorageError::from_io(path.as_path(), e))?;

        if let Some(start) = options.start.filter(|start| *start > 0) {
            file.seek(SeekFrom::Start(start))
                .await
                .map_err(|e| StorageError::io(path.as_path(), e))?;
        }

        debug!(
            "Opened read stream for {} ({:?})",
            path.as_path().display(),
            options
        );
        Ok(ReaderStream::with_capacity(
            file.take(limit),
            self.read_chunk_size,
        ))
    }

    /// Writes `content` to `filename`, creating missing parent directories,
    /// and returns the fresh metadata of the written file.
    ///
    /// # Errors
    ///
    /// * [`StorageError::PathTraversal`] when `filename` escapes the root.
    /// * [`StorageError::AlreadyExists`] when the file exists and
    ///   `options.overwrite` is off. The existing content is left untouched.
    /// * [`StorageError::Io`] for any other failure. Content written before
    ///   the failure stays on disk.
    pub async fn write(
        &self,
        filename: &str,
        content: impl Into<WriteContent>,
        options: &WriteOptions,
    ) -> StorageResult<FileMetadata> {
        let path = self.resolve(filename).await?;

        let written = self
            .writer
            .write(path.as_path(), content.into(), options)
            .await?;

        info!(
            "Stored {} ({} bytes, overwrite: {})",
            path.as_path().display(),
            written,
            options.overwrite
        );

        self.stat(path.as_path()).await
    }

    /// Deletes a file. Deleting a missing file is an error.
    pub async fn remove(&self, filename: &str) -> StorageResult<()> {
        let path = self.resolve(filename).await?;

        fs::remove_file(&path)
            .await
            .map_err(|e| StorageError::from_io(path.as_path(), e))?;

        info!("Deleted {}", path.as_path().display());
        Ok(())
    }

    async fn stat(&self, path: &Path) -> StorageResult<FileMetadata> {
        let metadata = fs::metadata(path)
            .await
            .map_err(|e| StorageError::from_io(path, e))?;

        FileMetadata::from_std(path, &metadata).map_err(|e| StorageError::io(path, e))
    }
}
