//! Path validation
//!
//! Resolves user-supplied filenames against the storage root and enforces
//! that every resolved path stays inside it.

use log::warn;
use serde::Deserialize;
use std::ffi::OsStr;
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use crate::error::{StorageError, StorageResult};

/// How strictly containment is checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainmentPolicy {
    /// Compare the normalized path against the root, without touching disk.
    #[default]
    Lexical,
    /// Additionally resolve symlinks of the deepest existing ancestor and
    /// compare against the canonical root.
    Canonical,
}

/// A filename joined onto the root, normalized and checked for containment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath(PathBuf);

impl ResolvedPath {
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }
}

impl AsRef<Path> for ResolvedPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

/// Makes `root` absolute against the current directory and collapses
/// `.` and `..` segments.
pub fn normalize_root(root: &Path) -> io::Result<PathBuf> {
    let absolute = std::path::absolute(root)?;
    let mut normalized = PathBuf::new();

    for component in absolute.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            Component::Normal(part) => normalized.push(part),
        }
    }

    Ok(normalized)
}

/// Resolves `filename` under `root`.
///
/// `root` must already be absolute and normalized (see [`normalize_root`]).
/// Leading separators in `filename` are ignored, so `/a.txt` lands at
/// `<root>/a.txt`. A `..` that climbs above `root` is rejected even if later
/// segments come back inside, and so is any filename whose parent directory
/// is not within `root` (this includes the root itself).
///
/// # Errors
///
/// Returns [`StorageError::PathTraversal`] when containment fails.
pub fn resolve_path(root: &Path, filename: &str) -> StorageResult<ResolvedPath> {
    let mut segments: Vec<&OsStr> = Vec::new();

    for component in Path::new(filename).components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                if segments.pop().is_none() {
                    warn!("Rejected filename climbing above root: {}", filename);
                    return Err(StorageError::path_traversal(filename, root));
                }
            }
            Component::Normal(part) => segments.push(part),
        }
    }

    let mut resolved = root.to_path_buf();
    resolved.extend(segments);

    let contained = resolved
        .parent()
        .is_some_and(|parent| parent.starts_with(root));
    if !contained {
        warn!("Rejected filename outside of root: {}", filename);
        return Err(StorageError::path_traversal(filename, root));
    }

    Ok(ResolvedPath(resolved))
}

/// Canonicalizes the deepest existing ancestor of `path` and re-attaches
/// the missing tail. Returns `None` when a dangling symlink is in the way.
async fn canonicalize_existing(path: &Path) -> io::Result<Option<PathBuf>> {
    let mut ancestor = path;
    let mut tail: Vec<&OsStr> = Vec::new();

    let canonical = loop {
        match fs::canonicalize(ancestor).await {
            Ok(canonical) => break canonical,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if fs::symlink_metadata(ancestor).await.is_ok() {
                    warn!("Dangling symlink: {}", ancestor.display());
                    return Ok(None);
                }
                match (ancestor.parent(), ancestor.file_name()) {
                    (Some(parent), Some(name)) => {
                        tail.push(name);
                        ancestor = parent;
                    }
                    _ => return Err(e),
                }
            }
            Err(e) => return Err(e),
        }
    };

    let mut resolved = canonical;
    resolved.extend(tail.into_iter().rev());
    Ok(Some(resolved))
}

/// Re-checks a resolved path against the canonical (symlink-free) root.
///
/// Both the root and the resolved path are canonicalized up to their
/// deepest existing ancestor, so a root that does not exist yet is fine.
/// The same parent-within-root rule then applies. A dangling symlink on the
/// way is rejected since its target cannot be checked.
pub async fn verify_canonical(
    root: &Path,
    resolved: &ResolvedPath,
    filename: &str,
) -> StorageResult<()> {
    let canonical_root = canonicalize_existing(root)
        .await
        .map_err(|e| StorageError::io(root, e))?
        .ok_or_else(|| StorageError::path_traversal(filename, root))?;

    let target = canonicalize_existing(resolved.as_path())
        .await
        .map_err(|e| StorageError::io(resolved.as_path(), e))?
        .ok_or_else(|| StorageError::path_traversal(filename, root))?;

    let contained = target
        .parent()
        .is_some_and(|parent| parent.starts_with(&canonical_root));
    if !contained {
        warn!(
            "Rejected filename escaping root through a link: {} -> {}",
            filename,
            target.display()
        );
        return Err(StorageError::path_traversal(filename, root));
    }

    Ok(())
}
