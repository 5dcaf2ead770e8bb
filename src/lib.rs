//! # persistence-exporter - Durable On-Disk Export Queue
//!
//! `persistence-exporter` puts a crash-resilient write-ahead queue in front
//! of a telemetry exporter. Producers append serialized batches to files in a
//! directory; a background worker exports them on a self-tuning cadence and
//! deletes each file once its export succeeds.
//!
//! - **Bounded storage**: files rotate by size, age and object count, and
//!   the directory stays under a quota by evicting the oldest files
//! - **No locking**: writer and reader share a directory safely through
//!   non-overlapping age windows
//! - **Adaptive cadence**: the export delay shrinks while exports succeed
//!   and grows while they fail or there is nothing to do
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use persistence_exporter::{
//!     DataExportStatus, DecoratedExporter, Directory, PersistenceExporterDecorator,
//!     PersistencePerformancePreset, Result,
//! };
//!
//! struct Collector;
//!
//! impl DecoratedExporter for Collector {
//!     type Signal = serde_json::Value;
//!
//!     fn export(&self, _values: Vec<serde_json::Value>) -> DataExportStatus {
//!         // send `values` over the network
//!         DataExportStatus::success()
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! let directory = Directory::for_signal("/var/cache/my-app", "otel", "spans")?;
//! let exporter = PersistenceExporterDecorator::new(
//!     Collector,
//!     directory,
//!     || true,
//!     PersistencePerformancePreset::low_runtime_impact(),
//! )?;
//!
//! exporter.export(&[serde_json::json!({"name": "GET /", "duration_ms": 12})])?;
//!
//! // Deliver everything still queued before exiting
//! exporter.shutdown();
//! # Ok(())
//! # }
//! ```
//!
//! ## Building Blocks
//!
//! The decorator is a thin assembly of public parts that can be used
//! directly: [`FilesOrchestrator`], [`OrchestratedFileWriter`],
//! [`OrchestratedFileReader`], [`DataExportDelay`] and [`DataExportWorker`].

pub mod core;
mod decorator;

// Re-export core modules internally so crate:: paths in core still work
pub(crate) use core::{
    clock, delay, error, format, orchestrator, preset, reader, storage, worker, writer,
};

pub use crate::core::{
    clock::{DateProvider, RelativeDateProvider, SystemDateProvider},
    delay::{DataExportDelay, Delay},
    error::{Result, StorageError},
    format::DataFormat,
    orchestrator::{creation_date_from, file_name_from, FilesOrchestrator},
    preset::{ExportPerformancePreset, PersistencePerformancePreset, StoragePerformancePreset},
    reader::{Batch, FileReader, OrchestratedFileReader},
    storage::{Directory, File},
    worker::{DataExportStatus, DataExportWorker, DataExporter, ExportCondition, ExportWorker},
    writer::{FileWriter, FileWriterExt, OrchestratedFileWriter},
};
pub use decorator::{DecoratedExporter, PersistenceExporterDecorator};
