//! Resilient writes
//!
//! Writes content to a resolved path. If the open fails because a parent
//! directory is missing, the directories are created and the open is retried
//! once. Partial content is not rolled back on failure.

use bytes::Bytes;
use futures::Stream;
use log::{debug, warn};
use std::fmt;
use std::io;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::io::StreamReader;

use crate::error::{StorageError, StorageResult};
use crate::storage::filesystem::{FileSystem, LocalFileSystem, OpenMode};

/// Content handed to a write.
pub enum WriteContent {
    /// An in-memory buffer.
    Bytes(Bytes),
    /// A streamed source, read until EOF.
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}

impl WriteContent {
    /// Wraps any async reader.
    pub fn reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        WriteContent::Reader(Box::new(reader))
    }

    /// Wraps a stream of byte chunks.
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + Unpin + 'static,
    {
        WriteContent::Reader(Box::new(StreamReader::new(stream)))
    }
}

impl fmt::Debug for WriteContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteContent::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            WriteContent::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

impl From<Bytes> for WriteContent {
    fn from(bytes: Bytes) -> Self {
        WriteContent::Bytes(bytes)
    }
}

impl From<Vec<u8>> for WriteContent {
    fn from(bytes: Vec<u8>) -> Self {
        WriteContent::Bytes(Bytes::from(bytes))
    }
}

impl From<&[u8]> for WriteContent {
    fn from(bytes: &[u8]) -> Self {
        WriteContent::Bytes(Bytes::copy_from_slice(bytes))
    }
}

impl From<String> for WriteContent {
    fn from(text: String) -> Self {
        WriteContent::Bytes(Bytes::from(text))
    }
}

impl From<&str> for WriteContent {
    fn from(text: &str) -> Self {
        WriteContent::Bytes(Bytes::copy_from_slice(text.as_bytes()))
    }
}

/// Options for a single write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Replace an existing file instead of failing.
    pub overwrite: bool,
    /// Unix permission bits applied when the file is created.
    pub mode: Option<u32>,
}

impl WriteOptions {
    pub fn overwrite() -> Self {
        Self {
            overwrite: true,
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }
}

/// Why an open attempt failed.
#[derive(Debug)]
enum OpenFailure {
    DirectoryMissing(io::Error),
    AlreadyExists(io::Error),
    Other(io::Error),
}

impl OpenFailure {
    fn classify(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => OpenFailure::DirectoryMissing(err),
            io::ErrorKind::AlreadyExists => OpenFailure::AlreadyExists(err),
            _ => OpenFailure::Other(err),
        }
    }
}

/// Steps of the open protocol. `Streaming` is reached by leaving the loop
/// with an open file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Idle,
    CreatingDirs,
}

/// State of one write call.
struct WriteSession<'a> {
    path: &'a Path,
    mode: OpenMode,
    permissions: Option<u32>,
    retried: bool,
}

impl<'a> WriteSession<'a> {
    fn new(path: &'a Path, options: &WriteOptions) -> Self {
        Self {
            path,
            mode: OpenMode::from_overwrite(options.overwrite),
            permissions: options.mode,
            retried: false,
        }
    }

    /// Runs Idle/CreatingDirs until the file is open or the session fails.
    async fn open<F: FileSystem>(&mut self, fs: &F) -> StorageResult<F::File> {
        let mut state = SessionState::Idle;

        loop {
            state = match state {
                SessionState::Idle => {
                    let err = match fs.open_write(self.path, self.mode, self.permissions).await {
                        Ok(file) => return Ok(file),
                        Err(err) => err,
                    };

                    match OpenFailure::classify(err) {
                        OpenFailure::DirectoryMissing(_) if !self.retried => {
                            SessionState::CreatingDirs
                        }
                        OpenFailure::AlreadyExists(source) => {
                            return Err(StorageError::AlreadyExists {
                                path: self.path.to_path_buf(),
                                source,
                            });
                        }
                        OpenFailure::DirectoryMissing(source) | OpenFailure::Other(source) => {
                            return Err(StorageError::io(self.path, source));
                        }
                    }
                }
                SessionState::CreatingDirs => {
                    let Some(parent) = self.path.parent() else {
                        return Err(StorageError::io(
                            self.path,
                            io::Error::new(io::ErrorKind::NotFound, "path has no parent"),
                        ));
                    };

                    debug!("Creating missing directories {}", parent.display());
                    fs.create_dir_all(parent).await.map_err(|e| {
                        warn!("Failed to create directories {}: {}", parent.display(), e);
                        StorageError::io(parent, e)
                    })?;

                    self.retried = true;
                    SessionState::Idle
                }
            };
        }
    }
}

/// Copies `content` into `file` and closes it. The file is dropped before
/// any error is returned.
async fn transfer<W>(mut file: W, content: WriteContent, path: &Path) -> StorageResult<u64>
where
    W: AsyncWrite + Unpin,
{
    let written = match content {
        WriteContent::Bytes(bytes) => file.write_all(&bytes).await.map(|_| bytes.len() as u64),
        WriteContent::Reader(mut reader) => tokio::io::copy(&mut reader, &mut file).await,
    }
    .map_err(|e| StorageError::io(path, e))?;

    file.shutdown()
        .await
        .map_err(|e| StorageError::io(path, e))?;

    Ok(written)
}

/// Writes content through a [`FileSystem`], creating missing parent
/// directories at most once per call.
#[derive(Debug, Clone, Default)]
pub struct ResilientWriter<F = LocalFileSystem> {
    fs: F,
}

impl<F: FileSystem> ResilientWriter<F> {
    pub fn new(fs: F) -> Self {
        Self { fs }
    }

    /// Writes `content` to `path` and returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// * [`StorageError::AlreadyExists`] when `overwrite` is off and the file exists.
    /// * [`StorageError::Io`] when the open, the directory creation or the
    ///   transfer fails.
    pub async fn write(
        &self,
        path: &Path,
        content: WriteContent,
        options: &WriteOptions,
    ) -> StorageResult<u64> {
        let mut session = WriteSession::new(path, options);
        let file = session.open(&self.fs).await?;

        let written = transfer(file, content, path).await?;
        debug!(
            "Wrote {} bytes to {}{}",
            written,
            path.display(),
            if session.retried { " after creating directories" } else { "" }
        );

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};
    use tempfile::TempDir;

    struct FakeFile {
        sink: Arc<Mutex<Vec<u8>>>,
        fail_writes: bool,
    }

    impl AsyncWrite for FakeFile {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if self.fail_writes {
                return Poll::Ready(Err(io::Error::other("device went away")));
            }
            self.sink.lock().unwrap().extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    /// Backend whose first `missing_opens` opens report a missing directory.
    #[derive(Default)]
    struct FakeFs {
        missing_opens: usize,
        existing: bool,
        fail_mkdir: bool,
        fail_writes: bool,
        opens: AtomicUsize,
        mkdirs: AtomicUsize,
        sink: Arc<Mutex<Vec<u8>>>,
    }

    impl FileSystem for FakeFs {
        type File = FakeFile;

        async fn open_write(
            &self,
            _path: &Path,
            _mode: OpenMode,
            _permissions: Option<u32>,
        ) -> io::Result<FakeFile> {
            let attempt = self.opens.fetch_add(1, Ordering::SeqCst);
            if self.existing {
                return Err(io::Error::from(io::ErrorKind::AlreadyExists));
            }
            if attempt < self.missing_opens {
                return Err(io::Error::from(io::ErrorKind::NotFound));
            }
            Ok(FakeFile {
                sink: Arc::clone(&self.sink),
                fail_writes: self.fail_writes,
            })
        }

        async fn create_dir_all(&self, _path: &Path) -> io::Result<()> {
            self.mkdirs.fetch_add(1, Ordering::SeqCst);
            if self.fail_mkdir {
                return Err(io::Error::from(io::ErrorKind::PermissionDenied));
            }
            Ok(())
        }
    }

    async fn write_with(fs: &FakeFs, content: &str) -> StorageResult<u64> {
        let session_path = Path::new("/root/new/nested/file.txt");
        let mut session = WriteSession::new(session_path, &WriteOptions::default());
        let file = session.open(fs).await?;
        transfer(file, content.into(), session_path).await
    }

    #[tokio::test]
    async fn retries_once_after_creating_directories() {
        let fs = FakeFs {
            missing_opens: 1,
            ..FakeFs::default()
        };

        let written = write_with(&fs, "hello").await.unwrap();

        assert_eq!(written, 5);
        assert_eq!(fs.mkdirs.load(Ordering::SeqCst), 1);
        assert_eq!(fs.opens.load(Ordering::SeqCst), 2);
        assert_eq!(fs.sink.lock().unwrap().as_slice(), b"hello");
    }

    #[tokio::test]
    async fn persistent_missing_directory_is_not_retried_forever() {
        let fs = FakeFs {
            missing_opens: usize::MAX,
            ..FakeFs::default()
        };

        let err = write_with(&fs, "hello").await.unwrap_err();

        assert!(matches!(err, StorageError::Io { .. }));
        assert_eq!(fs.mkdirs.load(Ordering::SeqCst), 1);
        assert_eq!(fs.opens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn directory_creation_failure_surfaces_as_io() {
        let fs = FakeFs {
            missing_opens: usize::MAX,
            fail_mkdir: true,
            ..FakeFs::default()
        };

        let err = write_with(&fs, "hello").await.unwrap_err();

        match err {
            StorageError::Io { path, source } => {
                assert_eq!(path, Path::new("/root/new/nested"));
                assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(fs.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn existing_file_skips_directory_retry() {
        let fs = FakeFs {
            existing: true,
            ..FakeFs::default()
        };

        let err = write_with(&fs, "hello").await.unwrap_err();

        assert!(matches!(err, StorageError::AlreadyExists { .. }));
        assert_eq!(fs.mkdirs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn mid_transfer_fault_surfaces_as_io() {
        let fs = FakeFs {
            fail_writes: true,
            ..FakeFs::default()
        };

        let err = write_with(&fs, "hello").await.unwrap_err();

        assert!(matches!(err, StorageError::Io { .. }));
    }

    #[tokio::test]
    async fn creates_nested_directories_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("new/nested/dir/file.txt");
        let writer = ResilientWriter::new(LocalFileSystem);

        let written = writer
            .write(&path, "content".into(), &WriteOptions::default())
            .await
            .unwrap();

        assert_eq!(written, 7);
        assert!(dir.path().join("new/nested/dir").is_dir());
        assert_eq!(std::fs::read(&path).unwrap(), b"content");
    }

    #[tokio::test]
    async fn streams_reader_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b.bin");
        let writer = ResilientWriter::<LocalFileSystem>::default();
        let payload: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();

        let written = writer
            .write(
                &path,
                WriteContent::reader(std::io::Cursor::new(payload.clone())),
                &WriteOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(written, payload.len() as u64);
        assert_eq!(std::fs::read(&path).unwrap(), payload);
    }

    #[tokio::test]
    async fn streams_chunked_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chunks/out.txt");
        let writer = ResilientWriter::new(LocalFileSystem);
        let chunks = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"one ")),
            Ok(Bytes::from_static(b"two ")),
            Ok(Bytes::from_static(b"three")),
        ]);

        writer
            .write(&path, WriteContent::stream(chunks), &WriteOptions::default())
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one two three");
    }

    #[tokio::test]
    async fn failing_stream_surfaces_as_io() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.txt");
        let writer = ResilientWriter::new(LocalFileSystem);
        let chunks = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "source dropped")),
        ]);

        let err = writer
            .write(&path, WriteContent::stream(chunks), &WriteOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Io { .. }));
    }
}
