//! Persistence in front of any batching exporter
//!
//! [`PersistenceExporterDecorator`] turns an in-memory exporter into a
//! durable one: values are queued on disk as JSON and handed to the wrapped
//! exporter from the background worker.

use crate::clock::SystemDateProvider;
use crate::delay::DataExportDelay;
use crate::error::{Result, StorageError};
use crate::format::DataFormat;
use crate::orchestrator::FilesOrchestrator;
use crate::preset::PersistencePerformancePreset;
use crate::reader::OrchestratedFileReader;
use crate::storage::Directory;
use crate::worker::{DataExportStatus, DataExportWorker, DataExporter, ExportWorker};
use crate::writer::{FileWriter, OrchestratedFileWriter};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

/// Exporter of decoded signals, wrapped by [`PersistenceExporterDecorator`]
pub trait DecoratedExporter: Send + Sync + 'static {
    type Signal: Serialize + DeserializeOwned;

    fn export(&self, values: Vec<Self::Signal>) -> DataExportStatus;
}

/// Decodes queued batches and passes them to the wrapped exporter
pub(crate) struct SignalDataExporter<E> {
    exporter: Arc<E>,
}

impl<E: DecoratedExporter> SignalDataExporter<E> {
    pub(crate) fn new(exporter: Arc<E>) -> Self {
        SignalDataExporter { exporter }
    }
}

impl<E: DecoratedExporter> DataExporter for SignalDataExporter<E> {
    fn export(&self, data: &[u8]) -> DataExportStatus {
        match serde_json::from_slice::<Vec<Vec<E::Signal>>>(data) {
            Ok(records) => self.exporter.export(records.into_iter().flatten().collect()),
            Err(e) => {
                // A damaged batch never decodes; retrying it would stall the queue
                warn!("Dropping batch that failed to decode: {}", e);
                DataExportStatus::success()
            }
        }
    }
}

/// Durable queue in front of a [`DecoratedExporter`]
///
/// # Examples
///
/// ```rust,no_run
/// use persistence_exporter::{
///     DataExportStatus, DecoratedExporter, Directory, PersistenceExporterDecorator,
///     PersistencePerformancePreset,
/// };
///
/// struct Stdout;
///
/// impl DecoratedExporter for Stdout {
///     type Signal = String;
///
///     fn export(&self, values: Vec<String>) -> DataExportStatus {
///         for value in values {
///             println!("{}", value);
///         }
///         DataExportStatus::success()
///     }
/// }
///
/// # fn main() -> persistence_exporter::Result<()> {
/// let directory = Directory::for_signal("/tmp/telemetry", "stdout", "logs")?;
/// let exporter = PersistenceExporterDecorator::new(
///     Stdout,
///     directory,
///     || true,
///     PersistencePerformancePreset::instant_data_delivery(),
/// )?;
///
/// exporter.export(&["started".to_string()])?;
/// exporter.shutdown();
/// # Ok(())
/// # }
/// ```
pub struct PersistenceExporterDecorator<E: DecoratedExporter> {
    writer: Arc<dyn FileWriter>,
    worker: Box<dyn ExportWorker>,
    synchronous_write: bool,
    _exporter: PhantomData<Arc<E>>,
}

impl<E: DecoratedExporter> PersistenceExporterDecorator<E> {
    /// Queue exports for `exporter` in `directory`
    ///
    /// Exports are attempted only while `export_condition` returns `true`.
    pub fn new<C>(
        exporter: E,
        directory: Directory,
        export_condition: C,
        preset: PersistencePerformancePreset,
    ) -> Result<Self>
    where
        C: Fn() -> bool + Send + Sync + 'static,
    {
        preset.validate()?;

        let path = directory.path().to_path_buf();
        let orchestrator = Arc::new(FilesOrchestrator::new(
            directory,
            preset.storage.clone(),
            Arc::new(SystemDateProvider),
        ));
        let writer = OrchestratedFileWriter::new(Arc::clone(&orchestrator), DataFormat::json_array())?;
        let reader = OrchestratedFileReader::new(orchestrator, DataFormat::json_array());
        let worker = DataExportWorker::new(
            Arc::new(reader),
            Arc::new(SignalDataExporter::new(Arc::new(exporter))),
            export_condition,
            Box::new(DataExportDelay::new(&preset.export)),
        )
        .map_err(|e| StorageError::io(&path, e))?;

        debug!("Persisting exports in {}", path.display());
        Ok(Self::with_components(
            Arc::new(writer),
            Box::new(worker),
            preset.synchronous_write,
        ))
    }

    pub(crate) fn with_components(
        writer: Arc<dyn FileWriter>,
        worker: Box<dyn ExportWorker>,
        synchronous_write: bool,
    ) -> Self {
        PersistenceExporterDecorator {
            writer,
            worker,
            synchronous_write,
            _exporter: PhantomData,
        }
    }

    /// Queue `values` as one record
    ///
    /// Returns once the record is on disk when the preset asks for
    /// synchronous writes, otherwise as soon as it is queued.
    pub fn export(&self, values: &[E::Signal]) -> Result<()> {
        let data = serde_json::to_vec(values)?;
        if self.synchronous_write {
            self.writer.write_sync(data);
        } else {
            self.writer.write(data);
        }
        Ok(())
    }

    /// Export everything queued so far, including the newest file
    pub fn flush(&self) -> bool {
        self.writer.flush();
        self.worker.flush()
    }

    /// Flush, then stop the worker
    pub fn shutdown(&self) {
        if !self.flush() {
            warn!("Some queued data could not be read during shutdown");
        }
        self.worker.cancel_synchronously();
    }
}
