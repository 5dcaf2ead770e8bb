//! Directory holding one signal's queued files

use super::File;
use crate::error::{Result, StorageError};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// Version segment of the on-disk layout
const LAYOUT_VERSION: &str = "v1";

/// Sandboxed directory of queued files
#[derive(Debug, Clone)]
pub struct Directory {
    path: PathBuf,
}

impl Directory {
    /// Open `path`, creating it and any missing parents
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path).map_err(|source| StorageError::CreateDirectory {
            path: path.clone(),
            source,
        })?;
        Ok(Directory { path })
    }

    /// Open the directory for one telemetry signal: `<root>/<vendor>.<signal>/v1`
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use persistence_exporter::Directory;
    ///
    /// let spans = Directory::for_signal("/var/cache/app", "otel", "spans")?;
    /// assert!(spans.path().ends_with("otel.spans/v1"));
    /// # Ok::<(), persistence_exporter::StorageError>(())
    /// ```
    pub fn for_signal<P: AsRef<Path>>(root: P, vendor: &str, signal: &str) -> Result<Self> {
        let path = root
            .as_ref()
            .join(format!("{}.{}", vendor, signal))
            .join(LAYOUT_VERSION);
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create an empty file; fails if `name` already exists
    pub fn create_file(&self, name: &str) -> Result<File> {
        let path = self.path.join(name);
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| StorageError::CreateFile {
                path: path.clone(),
                source,
            })?;
        Ok(File::new(path))
    }

    /// Look up an existing file by name
    pub fn file(&self, name: &str) -> Option<File> {
        let path = self.path.join(name);
        if path.is_file() {
            Some(File::new(path))
        } else {
            None
        }
    }

    /// All regular files currently in the directory, in no particular order
    ///
    /// Any entry may be gone by the time the caller touches it.
    pub fn files(&self) -> Result<Vec<File>> {
        let entries =
            std::fs::read_dir(&self.path).map_err(|e| StorageError::io(&self.path, e))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => return Err(StorageError::io(&self.path, e)),
            };
            // Entries removed mid-listing simply drop out
            match entry.file_type() {
                Ok(file_type) if file_type.is_file() => files.push(File::new(entry.path())),
                _ => {}
            }
        }
        Ok(files)
    }

    /// Sum of the sizes of all files, skipping any that vanish mid-count
    pub fn size(&self) -> Result<u64> {
        let mut total = 0;
        for file in self.files()? {
            match file.size() {
                Ok(size) => total += size,
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }
}
