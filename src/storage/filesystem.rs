//! File system operations
//!
//! The backend the writer opens files through. `LocalFileSystem` is the real
//! one; the trait exists so the writer can be driven by any sink.

use std::future::Future;
use std::io;
use std::path::Path;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWrite;

/// Mode a file is opened with for writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Fail if the file already exists.
    CreateExclusive,
    /// Create the file, or truncate it if present.
    CreateOrTruncate,
}

impl OpenMode {
    pub fn from_overwrite(overwrite: bool) -> Self {
        if overwrite {
            OpenMode::CreateOrTruncate
        } else {
            OpenMode::CreateExclusive
        }
    }
}

/// Write-side storage backend.
pub trait FileSystem: Send + Sync {
    type File: AsyncWrite + Unpin + Send;

    /// Open `path` for writing. A missing parent directory must surface as
    /// `io::ErrorKind::NotFound`.
    fn open_write(
        &self,
        path: &Path,
        mode: OpenMode,
        permissions: Option<u32>,
    ) -> impl Future<Output = io::Result<Self::File>> + Send;

    /// Create `path` and all of its missing ancestors.
    fn create_dir_all(&self, path: &Path) -> impl Future<Output = io::Result<()>> + Send;
}

/// Backend over the local disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    type File = File;

    async fn open_write(
        &self,
        path: &Path,
        mode: OpenMode,
        permissions: Option<u32>,
    ) -> io::Result<File> {
        let mut options = OpenOptions::new();
        options.write(true);

        match mode {
            OpenMode::CreateExclusive => options.create_new(true),
            OpenMode::CreateOrTruncate => options.create(true).truncate(true),
        };

        #[cfg(unix)]
        {
            if let Some(permissions) = permissions {
                options.mode(permissions);
            }
        }
        #[cfg(not(unix))]
        let _ = permissions;

        options.open(path).await
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn overwrite_flag_selects_mode() {
        assert_eq!(OpenMode::from_overwrite(true), OpenMode::CreateOrTruncate);
        assert_eq!(OpenMode::from_overwrite(false), OpenMode::CreateExclusive);
    }

    #[tokio::test]
    async fn missing_parent_reports_not_found() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing/file.txt");

        let err = LocalFileSystem
            .open_write(&path, OpenMode::CreateOrTruncate, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn exclusive_open_reports_already_exists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file.txt");
        fs::write(&path, b"x").await.unwrap();

        let err = LocalFileSystem
            .open_write(&path, OpenMode::CreateExclusive, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn permissions_apply_on_create() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file.txt");
        drop(
            LocalFileSystem
                .open_write(&path, OpenMode::CreateExclusive, Some(0o600))
                .await
                .unwrap(),
        );

        let mode = fs::metadata(&path).await.unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
