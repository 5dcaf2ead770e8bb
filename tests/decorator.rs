//! Decorator end to end: values survive on disk until the wrapped exporter
//! accepts them

use parking_lot::Mutex;
use persistence_exporter::{
    DataExportStatus, DecoratedExporter, Directory, ExportPerformancePreset,
    PersistenceExporterDecorator, PersistencePerformancePreset,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LogRecord {
    severity: String,
    body: String,
}

fn log(severity: &str, body: &str) -> LogRecord {
    LogRecord {
        severity: severity.to_string(),
        body: body.to_string(),
    }
}

struct LogSink {
    accept: bool,
    received: Arc<Mutex<Vec<LogRecord>>>,
}

impl DecoratedExporter for LogSink {
    type Signal = LogRecord;

    fn export(&self, values: Vec<LogRecord>) -> DataExportStatus {
        if !self.accept {
            return DataExportStatus::retry();
        }
        self.received.lock().extend(values);
        DataExportStatus::success()
    }
}

fn quick_preset() -> PersistencePerformancePreset {
    let mut preset = PersistencePerformancePreset::instant_data_delivery();
    preset.export = ExportPerformancePreset {
        initial_export_delay: Duration::from_millis(10),
        default_export_delay: Duration::from_millis(10),
        min_export_delay: Duration::from_millis(10),
        max_export_delay: Duration::from_millis(50),
        export_delay_change_rate: 0.5,
    };
    preset
}

fn directory(dir: &TempDir) -> Directory {
    Directory::for_signal(dir.path(), "test", "logs").unwrap()
}

#[test]
fn test_shutdown_delivers_every_value() {
    let dir = TempDir::new().unwrap();
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = LogSink {
        accept: true,
        received: received.clone(),
    };

    let decorator =
        PersistenceExporterDecorator::new(sink, directory(&dir), || true, quick_preset())
            .unwrap();
    decorator
        .export(&[log("INFO", "started"), log("DEBUG", "config loaded")])
        .unwrap();
    decorator.export(&[log("WARN", "slow request")]).unwrap();
    decorator.shutdown();

    assert_eq!(
        *received.lock(),
        vec![
            log("INFO", "started"),
            log("DEBUG", "config loaded"),
            log("WARN", "slow request"),
        ]
    );
    assert!(directory(&dir).files().unwrap().is_empty());
}

#[test]
fn test_rejected_values_survive_restart() {
    let dir = TempDir::new().unwrap();
    let received = Arc::new(Mutex::new(Vec::new()));

    {
        let offline = LogSink {
            accept: false,
            received: received.clone(),
        };
        let decorator =
            PersistenceExporterDecorator::new(offline, directory(&dir), || true, quick_preset())
                .unwrap();
        decorator.export(&[log("ERROR", "upstream down")]).unwrap();
        decorator.shutdown();
    }
    assert!(received.lock().is_empty());
    assert_eq!(directory(&dir).files().unwrap().len(), 1);

    let online = LogSink {
        accept: true,
        received: received.clone(),
    };
    let decorator =
        PersistenceExporterDecorator::new(online, directory(&dir), || true, quick_preset())
            .unwrap();
    assert!(decorator.flush());
    decorator.shutdown();

    assert_eq!(*received.lock(), vec![log("ERROR", "upstream down")]);
    assert!(directory(&dir).files().unwrap().is_empty());
}

#[test]
fn test_torn_batch_is_dropped_without_blocking_the_queue() {
    let dir = TempDir::new().unwrap();
    let received = Arc::new(Mutex::new(Vec::new()));

    {
        let offline = LogSink {
            accept: false,
            received: received.clone(),
        };
        let decorator =
            PersistenceExporterDecorator::new(offline, directory(&dir), || true, quick_preset())
                .unwrap();
        decorator.export(&[log("INFO", "one")]).unwrap();
        decorator.export(&[log("INFO", "two")]).unwrap();
        decorator.shutdown();
    }

    // Crash in the middle of appending the second record
    let files = directory(&dir).files().unwrap();
    assert_eq!(files.len(), 1);
    let size = files[0].size().unwrap();
    std::fs::OpenOptions::new()
        .write(true)
        .open(files[0].path())
        .unwrap()
        .set_len(size - 5)
        .unwrap();

    let online = LogSink {
        accept: true,
        received: received.clone(),
    };
    let decorator =
        PersistenceExporterDecorator::new(online, directory(&dir), || true, quick_preset())
            .unwrap();
    assert!(decorator.flush());
    assert!(received.lock().is_empty());
    assert!(directory(&dir).files().unwrap().is_empty());

    decorator.export(&[log("INFO", "three")]).unwrap();
    decorator.shutdown();
    assert_eq!(*received.lock(), vec![log("INFO", "three")]);
}
