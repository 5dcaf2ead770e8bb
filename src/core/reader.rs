//! Read side of the export queue

use crate::format::DataFormat;
use crate::orchestrator::FilesOrchestrator;
use crate::storage::File;
use std::sync::Arc;
use tracing::warn;

/// One file's contents, wrapped into a parseable document
///
/// Deleting `file` is the only way to mark the batch as consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub data: Vec<u8>,
    pub file: File,
}

/// Source of batches for the export worker
pub trait FileReader: Send + Sync {
    /// Oldest batch currently eligible for export
    fn read_next_batch(&self) -> Option<Batch>;

    /// Feed every queued batch to `process`, oldest first
    ///
    /// A batch is marked as read when `process` returns `true`. Returns
    /// `false` if any file could not be read.
    fn on_remaining_batches(&self, process: &mut dyn FnMut(&Batch) -> bool) -> bool;

    /// Delete the batch's source file; a missing file is not an error
    fn mark_batch_as_read(&self, batch: &Batch);
}

/// [`FileReader`] pulling files through a [`FilesOrchestrator`]
pub struct OrchestratedFileReader {
    orchestrator: Arc<FilesOrchestrator>,
    format: DataFormat,
}

impl OrchestratedFileReader {
    pub fn new(orchestrator: Arc<FilesOrchestrator>, format: DataFormat) -> Self {
        OrchestratedFileReader {
            orchestrator,
            format,
        }
    }

    fn batch_from(&self, file: File, contents: &[u8]) -> Batch {
        Batch {
            data: self.format.wrap_batch(contents),
            file,
        }
    }
}

impl FileReader for OrchestratedFileReader {
    fn read_next_batch(&self) -> Option<Batch> {
        let files = match self.orchestrator.get_readable_files() {
            Ok(files) => files,
            Err(e) => {
                warn!("Failed to list readable files: {}", e);
                return None;
            }
        };

        for file in files {
            match file.read() {
                Ok(contents) => return Some(self.batch_from(file, &contents)),
                Err(e) if e.is_not_found() => continue,
                Err(e) => {
                    warn!("Failed to read {}: {}", file.name(), e);
                    return None;
                }
            }
        }
        None
    }

    fn on_remaining_batches(&self, process: &mut dyn FnMut(&Batch) -> bool) -> bool {
        let files = match self.orchestrator.get_all_files() {
            Ok(files) => files,
            Err(e) => {
                warn!("Failed to list remaining files: {}", e);
                return false;
            }
        };

        let mut all_read = true;
        for file in files {
            match file.read() {
                Ok(contents) => {
                    let batch = self.batch_from(file, &contents);
                    if process(&batch) {
                        self.mark_batch_as_read(&batch);
                    }
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    warn!("Failed to read {}: {}", file.name(), e);
                    all_read = false;
                }
            }
        }
        all_read
    }

    fn mark_batch_as_read(&self, batch: &Batch) {
        self.orchestrator.delete(&batch.file);
    }
}
