//! Configuration management for the local storage adapter
//!
//! Layers an optional TOML file and `LOCAL_STORAGE_*` environment variables
//! over built-in defaults.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::storage::ContainmentPolicy;

/// Default location of the configuration file, without extension
pub const DEFAULT_CONFIG_PATH: &str = "config";

/// Default storage root, relative to the working directory
pub const DEFAULT_STORAGE_ROOT: &str = "./storage_root";

/// Default chunk size for read streams
pub const DEFAULT_READ_CHUNK_SIZE: usize = 64 * 1024;

/// Adapter configuration
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    /// Directory every operation is confined to
    /// Environment: LOCAL_STORAGE_STORAGE_ROOT
    pub storage_root: String,

    /// Lexical (default) or canonical containment checks
    pub containment: ContainmentPolicy,

    /// Chunk size for read streams in bytes
    pub read_chunk_size: usize,

    /// Create the storage root when the adapter starts
    pub create_root: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            storage_root: DEFAULT_STORAGE_ROOT.to_string(),
            containment: ContainmentPolicy::Lexical,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            create_root: true,
        }
    }
}

impl AdapterConfig {
    /// Load configuration from `config.toml` (if present) with environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new(DEFAULT_CONFIG_PATH))
    }

    /// Load configuration from the given file (if present) with environment overrides
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .set_default("storage_root", DEFAULT_STORAGE_ROOT)?
            .set_default("containment", "lexical")?
            .set_default("read_chunk_size", DEFAULT_READ_CHUNK_SIZE as i64)?
            .set_default("create_root", true)?
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix("LOCAL_STORAGE"))
            .build()?;

        let config: AdapterConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_root.trim().is_empty() {
            return Err(ConfigError::Message("storage_root cannot be empty".into()));
        }

        if self.read_chunk_size == 0 {
            return Err(ConfigError::Message(
                "read_chunk_size must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Get storage root as PathBuf
    pub fn storage_root_path(&self) -> PathBuf {
        PathBuf::from(&self.storage_root)
    }
}
