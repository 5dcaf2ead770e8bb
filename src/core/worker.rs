//! Background export loop
//!
//! A [`DataExportWorker`] owns one thread that repeatedly waits for the
//! current delay, checks whether exporting is permitted, pulls the oldest
//! batch, and hands it to the [`DataExporter`]. The outcome feeds back into
//! the delay and decides whether the batch's file is deleted.

use crate::delay::Delay;
use crate::reader::{Batch, FileReader};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Outcome of one export attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataExportStatus {
    /// Keep the batch and try again later
    pub needs_retry: bool,
}

impl DataExportStatus {
    pub fn success() -> Self {
        DataExportStatus { needs_retry: false }
    }

    pub fn retry() -> Self {
        DataExportStatus { needs_retry: true }
    }
}

/// Transport delivering a batch downstream
///
/// Only `needs_retry` is inspected; the cause of a failure is the exporter's
/// business.
pub trait DataExporter: Send + Sync {
    fn export(&self, data: &[u8]) -> DataExportStatus;
}

/// Handle the decorator uses to drive a worker
pub trait ExportWorker: Send + Sync {
    /// Export every queued batch now; `false` if some file could not be read
    fn flush(&self) -> bool;

    /// Stop scheduling exports, waiting for one in progress to finish
    fn cancel_synchronously(&self);
}

/// Predicate deciding whether exports may run this cycle
pub type ExportCondition = Box<dyn Fn() -> bool + Send + Sync>;

/// Everything an export cycle touches; locked for the duration of a cycle
struct ExportState {
    reader: Arc<dyn FileReader>,
    exporter: Arc<dyn DataExporter>,
    export_condition: ExportCondition,
    delay: Box<dyn Delay>,
}

impl ExportState {
    fn run_cycle(&mut self) {
        if !(self.export_condition)() {
            debug!("Export condition not met, backing off");
            self.delay.increase();
            return;
        }

        let Some(batch) = self.reader.read_next_batch() else {
            self.delay.increase();
            return;
        };

        let status = self.exporter.export(&batch.data);
        if status.needs_retry {
            debug!("Export of {} needs retry", batch.file.name());
            self.delay.increase();
        } else {
            self.reader.mark_batch_as_read(&batch);
            self.delay.decrease();
        }
    }

    fn flush(&mut self) -> bool {
        let exporter = Arc::clone(&self.exporter);
        let drained = self.reader.on_remaining_batches(&mut |batch: &Batch| {
            !exporter.export(&batch.data).needs_retry
        });
        if drained {
            self.delay.reset();
        }
        drained
    }
}

/// Periodic exporter of queued batches
///
/// Exports never overlap: loop cycles and [`flush`](ExportWorker::flush)
/// take the same lock. Cancellation is cooperative and checked before each
/// wait and before each export; an export already running is allowed to
/// finish.
pub struct DataExportWorker {
    state: Arc<Mutex<ExportState>>,
    cancelled: Arc<AtomicBool>,
    wake: Sender<()>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl DataExportWorker {
    /// Spawn the export loop
    ///
    /// The first cycle runs after `delay.current()`.
    pub fn new<C>(
        reader: Arc<dyn FileReader>,
        exporter: Arc<dyn DataExporter>,
        export_condition: C,
        delay: Box<dyn Delay>,
    ) -> std::io::Result<Self>
    where
        C: Fn() -> bool + Send + Sync + 'static,
    {
        let state = Arc::new(Mutex::new(ExportState {
            reader,
            exporter,
            export_condition: Box::new(export_condition),
            delay,
        }));
        let cancelled = Arc::new(AtomicBool::new(false));
        let (wake, wake_receiver) = channel::bounded(1);

        let thread = {
            let state = Arc::clone(&state);
            let cancelled = Arc::clone(&cancelled);
            thread::Builder::new()
                .name("persistence-export-worker".to_string())
                .spawn(move || run_loop(&state, &cancelled, &wake_receiver))?
        };

        Ok(DataExportWorker {
            state,
            cancelled,
            wake,
            thread: Mutex::new(Some(thread)),
        })
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

fn run_loop(state: &Mutex<ExportState>, cancelled: &AtomicBool, wake: &Receiver<()>) {
    loop {
        if cancelled.load(Ordering::SeqCst) {
            break;
        }

        let delay = state.lock().delay.current();
        // Woken early only by cancellation, which is re-checked below
        let _ = wake.recv_timeout(delay);

        let mut state = state.lock();
        if cancelled.load(Ordering::SeqCst) {
            break;
        }
        state.run_cycle();
    }
    debug!("Export worker stopped");
}

impl ExportWorker for DataExportWorker {
    fn flush(&self) -> bool {
        self.state.lock().flush()
    }

    fn cancel_synchronously(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let _ = self.wake.try_send(());

        let Some(thread) = self.thread.lock().take() else {
            return;
        };
        if thread.thread().id() == thread::current().id() {
            // Called from inside an export; the loop exits after this cycle
            return;
        }
        if thread.join().is_err() {
            warn!("Export worker thread panicked");
        }
    }
}

impl Drop for DataExportWorker {
    fn drop(&mut self) {
        self.cancel_synchronously();
    }
}
