//! File metadata
//!
//! Normalizes filesystem status records into [`FileMetadata`].

use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Mime type reported when the extension is unknown.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

const MIME_TYPES: &[(&str, &str)] = &[
    ("bin", "application/octet-stream"),
    ("css", "text/css"),
    ("csv", "text/csv"),
    ("gif", "image/gif"),
    ("gz", "application/gzip"),
    ("htm", "text/html"),
    ("html", "text/html"),
    ("jpeg", "image/jpeg"),
    ("jpg", "image/jpeg"),
    ("js", "text/javascript"),
    ("json", "application/json"),
    ("md", "text/markdown"),
    ("mp3", "audio/mpeg"),
    ("mp4", "video/mp4"),
    ("pdf", "application/pdf"),
    ("png", "image/png"),
    ("svg", "image/svg+xml"),
    ("tar", "application/x-tar"),
    ("toml", "application/toml"),
    ("txt", "text/plain"),
    ("wasm", "application/wasm"),
    ("webp", "image/webp"),
    ("xml", "application/xml"),
    ("yaml", "application/yaml"),
    ("yml", "application/yaml"),
    ("zip", "application/zip"),
];

/// Guess a mime type from the file extension.
pub fn guess_mime_type(path: &Path) -> &'static str {
    let Some(extension) = path.extension().and_then(|ext| ext.to_str()) else {
        return DEFAULT_MIME_TYPE;
    };

    MIME_TYPES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(extension))
        .map(|(_, mime)| *mime)
        .unwrap_or(DEFAULT_MIME_TYPE)
}

/// Normalized metadata of a stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub mime_type: String,
    /// Birth time, when the platform reports one.
    pub created: Option<SystemTime>,
    pub modified: SystemTime,
    pub size: u64,
}

impl FileMetadata {
    /// Builds metadata from a status record.
    ///
    /// Fails when the platform does not report a modification time; only
    /// the birth time is optional.
    pub fn from_std(path: &Path, metadata: &std::fs::Metadata) -> io::Result<Self> {
        Ok(Self {
            mime_type: guess_mime_type(path).to_string(),
            created: metadata.created().ok(),
            modified: metadata.modified()?,
            size: metadata.len(),
        })
    }

    /// Modification time in milliseconds since the unix epoch.
    pub fn modified_millis(&self) -> u128 {
        millis_since_epoch(self.modified)
    }

    pub fn created_millis(&self) -> Option<u128> {
        self.created.map(millis_since_epoch)
    }
}

fn millis_since_epoch(time: SystemTime) -> u128 {
    time.duration_since(UNIX_EPOCH)
        .map(|dur| dur.as_millis())
        .unwrap_or(0)
}
