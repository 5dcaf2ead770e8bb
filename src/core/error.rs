//! Error types for queue storage and configuration

use std::path::PathBuf;
use thiserror::Error;

/// Queue storage and configuration errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Queue directory could not be created
    #[error("Failed to create directory {path:?}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// New queue file could not be created
    #[error("Failed to create file {path:?}: {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading, appending, sizing or deleting a file failed
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Record larger than `max_object_size`
    #[error("Object of {size} bytes exceeds the maximum object size of {max} bytes")]
    ObjectTooLarge { size: u64, max: u64 },

    /// Preset with contradictory limits
    #[error("Invalid performance preset: {0}")]
    InvalidPreset(String),

    /// Preset TOML could not be parsed
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Value could not be encoded as JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the underlying file or directory no longer exists.
    ///
    /// Files may be removed at any time by the OS or by quota eviction, so
    /// callers skip this condition silently.
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::CreateDirectory { source, .. }
            | StorageError::CreateFile { source, .. }
            | StorageError::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Queue operation result type
pub type Result<T> = std::result::Result<T, StorageError>;
