//! Append-only file handle

use crate::error::{Result, StorageError};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Handle to a single queued file
///
/// Cheap to clone; holds only the path. The file itself may disappear at any
/// time, in which case operations fail with a not-found [`StorageError`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct File {
    name: String,
    path: PathBuf,
}

impl File {
    /// Handle for `path`; does not touch the filesystem
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        File { name, path }
    }

    /// File name (the encoded creation timestamp)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full path on disk
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `data` at the end of the file
    ///
    /// The bytes go out in a single `write_all` on an append-mode handle, so
    /// existing content is never rewritten and an interruption can only
    /// truncate the record being appended. With `synchronized` the data is
    /// also flushed to stable storage before returning.
    pub fn append(&self, data: &[u8], synchronized: bool) -> Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| StorageError::io(&self.path, e))?;

        file.write_all(data)
            .map_err(|e| StorageError::io(&self.path, e))?;

        if synchronized {
            file.sync_data()
                .map_err(|e| StorageError::io(&self.path, e))?;
        }

        Ok(())
    }

    /// Read the whole file
    pub fn read(&self) -> Result<Vec<u8>> {
        std::fs::read(&self.path).map_err(|e| StorageError::io(&self.path, e))
    }

    /// Current size in bytes
    pub fn size(&self) -> Result<u64> {
        std::fs::metadata(&self.path)
            .map(|m| m.len())
            .map_err(|e| StorageError::io(&self.path, e))
    }

    /// Remove the file from disk
    pub fn delete(&self) -> Result<()> {
        std::fs::remove_file(&self.path).map_err(|e| StorageError::io(&self.path, e))
    }
}
