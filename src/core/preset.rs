//! Performance presets for storage and export
//!
//! All tuning lives in [`PersistencePerformancePreset`], an explicit,
//! fully-specified value passed at construction. Two named presets cover the
//! common trade-offs; custom presets can be built in code or loaded from TOML.
//!
//! # Age-window contract
//!
//! Writers and readers share a directory without a lock. A file is safe to
//! read only once nobody will append to it again, which the orchestrator
//! approximates by age: the active file stops receiving writes once older than
//! `max_file_age_for_write`, and becomes readable once older than
//! `min_file_age_for_read`. `min_file_age_for_read` must therefore exceed the
//! worst-case gap between a file's creation and its last append, including
//! slow disks and clock adjustments. The named presets keep a 0.5s margin.

use crate::error::{Result, StorageError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Rotation and retention limits for one directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoragePerformancePreset {
    /// Maximum size of a single file in bytes
    ///
    /// If the active file cannot take the next object, a new file is created.
    pub max_file_size: u64,

    /// Maximum total size of the directory in bytes
    ///
    /// When exceeded, the oldest files are deleted before a new file is created.
    pub max_directory_size: u64,

    /// Maximum age at which the active file is still reused for writes
    #[serde(
        serialize_with = "serialize_secs",
        deserialize_with = "deserialize_secs"
    )]
    pub max_file_age_for_write: Duration,

    /// Minimum age before a file may be exported
    #[serde(
        serialize_with = "serialize_secs",
        deserialize_with = "deserialize_secs"
    )]
    pub min_file_age_for_read: Duration,

    /// Files older than this are obsolete and deleted without export
    #[serde(
        serialize_with = "serialize_secs",
        deserialize_with = "deserialize_secs"
    )]
    pub max_file_age_for_read: Duration,

    /// Maximum number of objects appended to one file
    pub max_objects_in_file: u64,

    /// Maximum encoded size of one object; larger objects are dropped
    pub max_object_size: u64,
}

/// Bounds and rate of the adaptive export cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportPerformancePreset {
    /// Delay before the first export attempt
    #[serde(
        serialize_with = "serialize_secs",
        deserialize_with = "deserialize_secs"
    )]
    pub initial_export_delay: Duration,

    /// Delay the cadence returns to after a completed flush
    #[serde(
        serialize_with = "serialize_secs",
        deserialize_with = "deserialize_secs"
    )]
    pub default_export_delay: Duration,

    #[serde(
        serialize_with = "serialize_secs",
        deserialize_with = "deserialize_secs"
    )]
    pub min_export_delay: Duration,

    #[serde(
        serialize_with = "serialize_secs",
        deserialize_with = "deserialize_secs"
    )]
    pub max_export_delay: Duration,

    /// Fraction by which the delay grows or shrinks per cycle, in `[0, 1]`
    pub export_delay_change_rate: f64,
}

/// Complete configuration of a persistent exporter
///
/// # Examples
///
/// ```
/// use persistence_exporter::PersistencePerformancePreset;
///
/// let preset = PersistencePerformancePreset::from_toml_str(r#"
///     synchronous_write = false
///
///     [storage]
///     max_file_size = 4194304
///     max_directory_size = 536870912
///     max_file_age_for_write = 4.75
///     min_file_age_for_read = 5.25
///     max_file_age_for_read = 64800.0
///     max_objects_in_file = 500
///     max_object_size = 262144
///
///     [export]
///     initial_export_delay = 5.0
///     default_export_delay = 5.0
///     min_export_delay = 1.0
///     max_export_delay = 20.0
///     export_delay_change_rate = 0.1
/// "#).unwrap();
///
/// assert_eq!(preset, PersistencePerformancePreset::low_runtime_impact());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PersistencePerformancePreset {
    /// Block producers until each object reaches disk
    pub synchronous_write: bool,
    pub storage: StoragePerformancePreset,
    pub export: ExportPerformancePreset,
}

impl PersistencePerformancePreset {
    /// Preset minimising runtime impact and the number of export requests
    pub fn low_runtime_impact() -> Self {
        PersistencePerformancePreset {
            storage: StoragePerformancePreset {
                max_file_size: 4 * 1024 * 1024,
                max_directory_size: 512 * 1024 * 1024,
                max_file_age_for_write: Duration::from_millis(4_750),
                // max_file_age_for_write + 0.5s margin
                min_file_age_for_read: Duration::from_millis(5_250),
                max_file_age_for_read: Duration::from_secs(18 * 60 * 60),
                max_objects_in_file: 500,
                max_object_size: 256 * 1024,
            },
            export: ExportPerformancePreset {
                initial_export_delay: Duration::from_secs(5),
                default_export_delay: Duration::from_secs(5),
                min_export_delay: Duration::from_secs(1),
                max_export_delay: Duration::from_secs(20),
                export_delay_change_rate: 0.1,
            },
            synchronous_write: false,
        }
    }

    /// Preset minimising the time between recording and delivery
    pub fn instant_data_delivery() -> Self {
        let base = Self::low_runtime_impact();
        PersistencePerformancePreset {
            storage: StoragePerformancePreset {
                max_file_age_for_write: Duration::from_millis(2_750),
                // max_file_age_for_write + 0.5s margin
                min_file_age_for_read: Duration::from_millis(3_250),
                ..base.storage
            },
            export: ExportPerformancePreset {
                initial_export_delay: Duration::from_millis(500),
                default_export_delay: Duration::from_secs(3),
                min_export_delay: Duration::from_secs(1),
                max_export_delay: Duration::from_secs(5),
                export_delay_change_rate: 0.5,
            },
            synchronous_write: true,
        }
    }

    /// Parse and validate a preset from TOML
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let preset: PersistencePerformancePreset = toml::from_str(s)?;
        preset.validate()?;
        Ok(preset)
    }

    /// Load and validate a preset from a TOML file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| StorageError::io(path, e))?;
        Self::from_toml_str(&content)
    }

    /// Check the preset for contradictions
    ///
    /// Hard contradictions are errors. A read window that opens before the
    /// write window closes is only warned about: some setups (draining
    /// everything on flush, tests writing and reading one file) rely on it.
    pub fn validate(&self) -> Result<()> {
        let storage = &self.storage;
        let export = &self.export;

        if storage.max_file_size == 0 {
            return Err(StorageError::InvalidPreset(
                "max_file_size must be greater than 0".to_string(),
            ));
        }
        if storage.max_objects_in_file == 0 {
            return Err(StorageError::InvalidPreset(
                "max_objects_in_file must be greater than 0".to_string(),
            ));
        }
        if storage.min_file_age_for_read > storage.max_file_age_for_read {
            return Err(StorageError::InvalidPreset(format!(
                "min_file_age_for_read ({:?}) exceeds max_file_age_for_read ({:?})",
                storage.min_file_age_for_read, storage.max_file_age_for_read
            )));
        }
        if export.min_export_delay > export.max_export_delay {
            return Err(StorageError::InvalidPreset(format!(
                "min_export_delay ({:?}) exceeds max_export_delay ({:?})",
                export.min_export_delay, export.max_export_delay
            )));
        }
        if !(0.0..=1.0).contains(&export.export_delay_change_rate) {
            return Err(StorageError::InvalidPreset(format!(
                "export_delay_change_rate must be within [0, 1], got {}",
                export.export_delay_change_rate
            )));
        }

        if storage.min_file_age_for_read < storage.max_file_age_for_write {
            warn!(
                "min_file_age_for_read ({:?}) is below max_file_age_for_write ({:?}); \
                 files may be read while still being written",
                storage.min_file_age_for_read, storage.max_file_age_for_write
            );
        }
        if storage.max_object_size > storage.max_file_size {
            warn!(
                "max_object_size ({}) exceeds max_file_size ({}); such objects can never be stored",
                storage.max_object_size, storage.max_file_size
            );
        }

        Ok(())
    }
}

impl Default for PersistencePerformancePreset {
    fn default() -> Self {
        Self::low_runtime_impact()
    }
}

fn serialize_secs<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

fn deserialize_secs<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}
