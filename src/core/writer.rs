//! Write side of the export queue
//!
//! Producers hand encoded records to a [`FileWriter`]. The orchestrated
//! implementation appends them from a dedicated writer thread so `write`
//! never blocks the caller on disk IO.

use crate::error::{Result, StorageError};
use crate::format::DataFormat;
use crate::orchestrator::FilesOrchestrator;
use crossbeam::channel::{self, Sender, TrySendError};
use serde::Serialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, warn};

/// Records waiting for the writer thread before new ones are dropped
const WRITE_QUEUE_CAPACITY: usize = 4096;

/// Sink for encoded records
pub trait FileWriter: Send + Sync {
    /// Queue `data` for appending; returns immediately
    fn write(&self, data: Vec<u8>);

    /// Append `data` and wait until it is on disk
    fn write_sync(&self, data: Vec<u8>);

    /// Wait until every previously queued write has been applied
    fn flush(&self);
}

/// JSON encoding on top of any [`FileWriter`]
pub trait FileWriterExt: FileWriter {
    /// Encode `value` as JSON and queue it
    fn write_value<T: Serialize + ?Sized>(&self, value: &T) {
        match serde_json::to_vec(value) {
            Ok(data) => self.write(data),
            Err(e) => error!("Failed to encode value, dropping it: {}", e),
        }
    }

    /// Encode `value` as JSON and append it synchronously
    fn write_value_sync<T: Serialize + ?Sized>(&self, value: &T) {
        match serde_json::to_vec(value) {
            Ok(data) => self.write_sync(data),
            Err(e) => error!("Failed to encode value, dropping it: {}", e),
        }
    }
}

impl<W: FileWriter + ?Sized> FileWriterExt for W {}

enum WriterCommand {
    Write(Vec<u8>),
    WriteSync(Vec<u8>, Sender<()>),
    Flush(Sender<()>),
}

/// [`FileWriter`] appending through a [`FilesOrchestrator`]
///
/// All appends happen on one thread, in submission order. Each record is
/// appended with a single call, prefixed by the format separator when the
/// file already holds data, so an interrupted write can only damage the
/// newest record.
pub struct OrchestratedFileWriter {
    sender: Option<Sender<WriterCommand>>,
    thread: Option<JoinHandle<()>>,
    max_object_size: u64,
}

impl OrchestratedFileWriter {
    pub fn new(orchestrator: Arc<FilesOrchestrator>, format: DataFormat) -> Result<Self> {
        let max_object_size = orchestrator.performance().max_object_size;
        let (sender, receiver) = channel::bounded::<WriterCommand>(WRITE_QUEUE_CAPACITY);

        let directory = orchestrator.directory().path().to_path_buf();
        let thread = thread::Builder::new()
            .name("persistence-file-writer".to_string())
            .spawn(move || {
                for command in receiver.iter() {
                    match command {
                        WriterCommand::Write(data) => {
                            append_record(&orchestrator, &format, &data, false)
                        }
                        WriterCommand::WriteSync(data, done) => {
                            append_record(&orchestrator, &format, &data, true);
                            let _ = done.send(());
                        }
                        WriterCommand::Flush(done) => {
                            let _ = done.send(());
                        }
                    }
                }
            })
            .map_err(|e| StorageError::io(directory, e))?;

        Ok(OrchestratedFileWriter {
            sender: Some(sender),
            thread: Some(thread),
            max_object_size,
        })
    }

    fn accepts(&self, data: &[u8]) -> bool {
        let size = data.len() as u64;
        if size > self.max_object_size {
            let err = StorageError::ObjectTooLarge {
                size,
                max: self.max_object_size,
            };
            error!("Dropping record: {}", err);
            return false;
        }
        true
    }

    /// Send a command and wait for the writer thread to acknowledge it
    fn send_and_wait(&self, make: impl FnOnce(Sender<()>) -> WriterCommand) {
        let Some(sender) = &self.sender else {
            return;
        };
        let (done, acknowledged) = channel::bounded(1);
        if sender.send(make(done)).is_ok() {
            let _ = acknowledged.recv();
        } else {
            warn!("File writer thread has stopped");
        }
    }
}

impl FileWriter for OrchestratedFileWriter {
    fn write(&self, data: Vec<u8>) {
        if !self.accepts(&data) {
            return;
        }
        let Some(sender) = &self.sender else {
            return;
        };
        match sender.try_send(WriterCommand::Write(data)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Write queue full ({} records), dropping record", WRITE_QUEUE_CAPACITY)
            }
            Err(TrySendError::Disconnected(_)) => warn!("File writer thread has stopped"),
        }
    }

    fn write_sync(&self, data: Vec<u8>) {
        if !self.accepts(&data) {
            return;
        }
        self.send_and_wait(|done| WriterCommand::WriteSync(data, done));
    }

    fn flush(&self) {
        self.send_and_wait(WriterCommand::Flush);
    }
}

impl Drop for OrchestratedFileWriter {
    fn drop(&mut self) {
        // Closing the channel lets the thread drain what is queued and exit
        self.sender.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn append_record(
    orchestrator: &FilesOrchestrator,
    format: &DataFormat,
    data: &[u8],
    synchronized: bool,
) {
    let result = orchestrator
        .get_writable_file_for_record(data.len() as u64, format.separator().len() as u64)
        .and_then(|file| {
            let file_is_empty = file.size()? == 0;
            file.append(&format.frame_record(data, file_is_empty), synchronized)
        });

    if let Err(e) = result {
        error!("Failed to write {} bytes: {}", data.len(), e);
    }
}
