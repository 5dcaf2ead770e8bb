//! Rotation and retention policy for a queue directory
//!
//! The orchestrator decides which file receives the next write and which
//! files are currently safe to read. It never locks files: a file is handed to
//! readers only after it has aged past the write window (see
//! [`preset`](crate::preset) for the contract).

use crate::clock::{age, DateProvider};
use crate::error::{Result, StorageError};
use crate::preset::StoragePerformancePreset;
use crate::storage::{Directory, File};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Width of file names; wide enough for any `u64` millisecond count
const FILE_NAME_WIDTH: usize = 20;

/// Encode a creation date as a file name
///
/// Names are milliseconds since the Unix epoch, zero-padded so that lexical
/// order equals creation order.
pub fn file_name_from(date: DateTime<Utc>) -> String {
    file_name_from_millis(date.timestamp_millis().max(0) as u64)
}

fn file_name_from_millis(millis: u64) -> String {
    format!("{:0width$}", millis, width = FILE_NAME_WIDTH)
}

/// Decode the creation date from a file name, `None` for foreign files
pub fn creation_date_from(name: &str) -> Option<DateTime<Utc>> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let millis: u64 = name.parse().ok()?;
    Utc.timestamp_millis_opt(i64::try_from(millis).ok()?).single()
}

/// Write-side bookkeeping for the active file
#[derive(Debug, Default)]
struct WriteState {
    /// Name of the last file returned by `get_writable_file`
    last_file_name: Option<String>,
    /// Times that file was handed out; tracks the number of objects in it
    last_file_uses: u64,
    /// Timestamp of the newest file created, to keep names unique within a tick
    last_created_millis: Option<u64>,
}

/// Decides file rotation (write side) and read eligibility (read side)
///
/// One orchestrator owns one directory and is shared, via `Arc`, by the
/// writer and reader working on it.
pub struct FilesOrchestrator {
    directory: Directory,
    performance: StoragePerformancePreset,
    date_provider: Arc<dyn DateProvider>,
    write_state: Mutex<WriteState>,
}

impl FilesOrchestrator {
    pub fn new(
        directory: Directory,
        performance: StoragePerformancePreset,
        date_provider: Arc<dyn DateProvider>,
    ) -> Self {
        FilesOrchestrator {
            directory,
            performance,
            date_provider,
            write_state: Mutex::new(WriteState::default()),
        }
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn performance(&self) -> &StoragePerformancePreset {
        &self.performance
    }

    // Write side

    /// File that should receive the next `write_size` bytes
    ///
    /// Reuses the active file while it is young enough, has room for the
    /// write, and has not reached the object limit. Otherwise evicts the
    /// oldest files down to the directory quota and creates a new file.
    pub fn get_writable_file(&self, write_size: u64) -> Result<File> {
        self.get_writable_file_for_record(write_size, 0)
    }

    /// File that should receive a record of `object_size` bytes
    ///
    /// `separator_size` bytes are written ahead of the record when it lands
    /// in a non-empty file, so they count toward `max_file_size` on reuse but
    /// not toward `max_object_size`.
    pub fn get_writable_file_for_record(
        &self,
        object_size: u64,
        separator_size: u64,
    ) -> Result<File> {
        if object_size > self.performance.max_object_size {
            return Err(StorageError::ObjectTooLarge {
                size: object_size,
                max: self.performance.max_object_size,
            });
        }

        let mut state = self.write_state.lock();
        let now = self.date_provider.now();

        if let Some(file) = self.reusable_file(&state, now, object_size, separator_size) {
            state.last_file_uses += 1;
            return Ok(file);
        }

        // Purging lists and stats the whole directory; only worth it when a
        // new file is about to be created.
        self.purge_directory_if_needed(object_size)?;

        let file = self.create_next_file(&mut state, now)?;
        state.last_file_name = Some(file.name().to_string());
        state.last_file_uses = 1;
        Ok(file)
    }

    fn reusable_file(
        &self,
        state: &WriteState,
        now: DateTime<Utc>,
        object_size: u64,
        separator_size: u64,
    ) -> Option<File> {
        let name = state.last_file_name.as_deref()?;
        let file = self.directory.file(name)?;
        let created = creation_date_from(name)?;

        let recent_enough = age(now, created) <= self.performance.max_file_age_for_write;
        let can_take_more = state.last_file_uses < self.performance.max_objects_in_file;
        if !recent_enough || !can_take_more {
            return None;
        }

        match file.size() {
            Ok(size) => {
                let framed_size = if size == 0 {
                    object_size
                } else {
                    object_size.saturating_add(separator_size)
                };
                if size.saturating_add(framed_size) <= self.performance.max_file_size {
                    Some(file)
                } else {
                    None
                }
            }
            Err(e) => {
                if !e.is_not_found() {
                    warn!("Failed to read size of writable file {}: {}", name, e);
                }
                None
            }
        }
    }

    fn create_next_file(&self, state: &mut WriteState, now: DateTime<Utc>) -> Result<File> {
        let mut millis = now.timestamp_millis().max(0) as u64;
        if let Some(last) = state.last_created_millis {
            if millis <= last {
                millis = last + 1;
            }
        }

        loop {
            let name = file_name_from_millis(millis);
            match self.directory.create_file(&name) {
                Ok(file) => {
                    debug!("Created file {} in {:?}", name, self.directory.path());
                    state.last_created_millis = Some(millis);
                    return Ok(file);
                }
                // Left behind by an earlier run whose clock was ahead
                Err(StorageError::CreateFile { ref source, .. })
                    if source.kind() == std::io::ErrorKind::AlreadyExists =>
                {
                    millis += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Delete oldest files until the directory can take `write_size` more bytes
    fn purge_directory_if_needed(&self, write_size: u64) -> Result<()> {
        let mut files = Vec::new();
        for file in self.directory.files()? {
            match file.size() {
                Ok(size) => files.push((creation_date_from(file.name()), file, size)),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        let total: u64 = files.iter().map(|(_, _, size)| size).sum();
        let required = total.saturating_add(write_size);
        if required <= self.performance.max_directory_size {
            return Ok(());
        }

        // Foreign names (None) sort first and go before any queued batch
        files.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.name().cmp(b.1.name())));

        let to_free = required - self.performance.max_directory_size;
        let mut freed = 0u64;
        for (_, file, size) in files {
            if freed >= to_free {
                break;
            }
            match file.delete() {
                Ok(()) => debug!("Evicted {} ({} bytes) to stay within quota", file.name(), size),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
            freed += size;
        }

        Ok(())
    }

    /// Name of the file writers will append to next, if any
    fn active_file_name(&self, now: DateTime<Utc>) -> Option<String> {
        let state = self.write_state.lock();
        let name = state.last_file_name.as_ref()?;
        let created = creation_date_from(name)?;

        let recent_enough = age(now, created) <= self.performance.max_file_age_for_write;
        let can_take_more = state.last_file_uses < self.performance.max_objects_in_file;
        if recent_enough && can_take_more {
            Some(name.clone())
        } else {
            None
        }
    }

    // Read side

    /// Files within the retention window, oldest first
    ///
    /// The active write file is excluded while it may still be appended to.
    /// Files past `max_file_age_for_read` are deleted along the way.
    pub fn get_readable_files(&self) -> Result<Vec<File>> {
        let now = self.date_provider.now();
        let active = self.active_file_name(now);

        let mut readable = Vec::new();
        for file in self.directory.files()? {
            let Some(created) = creation_date_from(file.name()) else {
                continue;
            };
            let file_age = age(now, created);

            if file_age > self.performance.max_file_age_for_read {
                match file.delete() {
                    Ok(()) => debug!("Deleted obsolete file {}", file.name()),
                    Err(e) if e.is_not_found() => {}
                    Err(e) => warn!("Failed to delete obsolete file {}: {}", file.name(), e),
                }
                continue;
            }

            if active.as_deref() == Some(file.name()) {
                continue;
            }

            if file_age >= self.performance.min_file_age_for_read {
                readable.push(file);
            }
        }

        readable.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(readable)
    }

    /// Oldest file within the retention window
    pub fn get_readable_file(&self) -> Result<Option<File>> {
        Ok(self.get_readable_files()?.into_iter().next())
    }

    /// Every queued file regardless of age, oldest first
    pub fn get_all_files(&self) -> Result<Vec<File>> {
        let mut files: Vec<File> = self
            .directory
            .files()?
            .into_iter()
            .filter(|f| creation_date_from(f.name()).is_some())
            .collect();
        files.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(files)
    }

    /// Delete a file, tolerating its absence
    pub fn delete(&self, file: &File) {
        match file.delete() {
            Ok(()) => debug!("Deleted {}", file.name()),
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!("Failed to delete {}: {}", file.name(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{RelativeDateProvider, SystemDateProvider};
    use std::time::Duration;
    use tempfile::TempDir;

    fn preset() -> StoragePerformancePreset {
        StoragePerformancePreset {
            max_file_size: 1000,
            max_directory_size: 1_000_000,
            max_file_age_for_write: Duration::from_secs(1),
            min_file_age_for_read: Duration::from_secs(2),
            max_file_age_for_read: Duration::from_secs(10),
            max_objects_in_file: 3,
            max_object_size: 100,
        }
    }

    fn orchestrator(
        dir: &TempDir,
        performance: StoragePerformancePreset,
        clock: Arc<dyn DateProvider>,
    ) -> FilesOrchestrator {
        FilesOrchestrator::new(Directory::new(dir.path()).unwrap(), performance, clock)
    }

    #[test]
    fn test_file_names_sort_by_creation() {
        let early = Utc.timestamp_millis_opt(999).unwrap();
        let late = Utc.timestamp_millis_opt(1_000).unwrap();

        assert!(file_name_from(early) < file_name_from(late));
        assert_eq!(file_name_from(late), "00000000000000001000");
        assert_eq!(creation_date_from(&file_name_from(late)), Some(late));
    }

    #[test]
    fn test_foreign_names_are_not_dates() {
        assert_eq!(creation_date_from(""), None);
        assert_eq!(creation_date_from("+12"), None);
        assert_eq!(creation_date_from(".DS_Store"), None);
        assert_eq!(creation_date_from("99999999999999999999999"), None);
    }

    #[test]
    fn test_reuses_file_until_object_limit() {
        let dir = TempDir::new().unwrap();
        let orchestrator = orchestrator(&dir, preset(), Arc::new(SystemDateProvider));

        let first = orchestrator.get_writable_file(10).unwrap();
        assert_eq!(orchestrator.get_writable_file(10).unwrap(), first);
        assert_eq!(orchestrator.get_writable_file(10).unwrap(), first);

        let fourth = orchestrator.get_writable_file(10).unwrap();
        assert_ne!(fourth, first);
        assert!(fourth.name() > first.name());
    }

    #[test]
    fn test_rotates_when_file_is_full() {
        let dir = TempDir::new().unwrap();
        let orchestrator = orchestrator(&dir, preset(), Arc::new(SystemDateProvider));

        let first = orchestrator.get_writable_file(100).unwrap();
        first.append(&[0u8; 950], false).unwrap();

        let second = orchestrator.get_writable_file(51).unwrap();
        assert_ne!(second, first);
    }

    #[test]
    fn test_separator_counts_toward_file_size() {
        let dir = TempDir::new().unwrap();
        let mut performance = preset();
        performance.max_file_size = 10;
        performance.max_object_size = 10;
        let orchestrator = orchestrator(&dir, performance, Arc::new(SystemDateProvider));

        let first = orchestrator.get_writable_file_for_record(5, 1).unwrap();
        first.append(b"12345", false).unwrap();

        // 5 + 1 + 5 would overflow the 10 byte limit
        let second = orchestrator.get_writable_file_for_record(5, 1).unwrap();
        assert_ne!(second, first);

        // 4 + 1 + 5 fits exactly
        second.append(b"1234", false).unwrap();
        let third = orchestrator.get_writable_file_for_record(5, 1).unwrap();
        assert_eq!(third, second);
    }

    #[test]
    fn test_rotates_when_file_is_too_old() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(RelativeDateProvider::starting_now(Duration::ZERO));
        let orchestrator = orchestrator(&dir, preset(), clock.clone());

        let first = orchestrator.get_writable_file(1).unwrap();
        clock.advance(Duration::from_millis(1_500));
        let second = orchestrator.get_writable_file(1).unwrap();

        assert_ne!(second, first);
    }

    #[test]
    fn test_same_tick_names_are_unique() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(RelativeDateProvider::starting_now(Duration::ZERO));
        let mut performance = preset();
        performance.max_objects_in_file = 1;
        let orchestrator = orchestrator(&dir, performance, clock);

        let names: Vec<String> = (0..5)
            .map(|_| orchestrator.get_writable_file(1).unwrap().name().to_string())
            .collect();

        let mut sorted = names.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted, names);
        assert_eq!(orchestrator.directory().files().unwrap().len(), 5);
    }

    #[test]
    fn test_rejects_oversized_object() {
        let dir = TempDir::new().unwrap();
        let orchestrator = orchestrator(&dir, preset(), Arc::new(SystemDateProvider));

        assert!(matches!(
            orchestrator.get_writable_file(101),
            Err(StorageError::ObjectTooLarge { size: 101, max: 100 })
        ));
        assert!(orchestrator.directory().files().unwrap().is_empty());
    }

    #[test]
    fn test_evicts_oldest_files_over_quota() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(RelativeDateProvider::starting_now(Duration::from_secs(1)));
        let mut performance = preset();
        performance.max_directory_size = 250;
        performance.max_objects_in_file = 1;
        let orchestrator = orchestrator(&dir, performance, clock);

        let mut created = Vec::new();
        for _ in 0..3 {
            let file = orchestrator.get_writable_file(100).unwrap();
            file.append(&[1u8; 100], false).unwrap();
            created.push(file);
        }

        // 200 bytes stored before the third file; 300 would exceed 250
        let files = orchestrator.get_all_files().unwrap();
        assert_eq!(files, created[1..].to_vec());
        assert!(orchestrator.directory().size().unwrap() <= 250);
    }

    #[test]
    fn test_read_window() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(RelativeDateProvider::starting_now(Duration::ZERO));
        let orchestrator = orchestrator(&dir, preset(), clock.clone());
        let directory = orchestrator.directory().clone();

        let file = directory.create_file(&file_name_from(clock.now())).unwrap();
        assert_eq!(orchestrator.get_readable_file().unwrap(), None);

        clock.advance(Duration::from_secs(2));
        assert_eq!(orchestrator.get_readable_file().unwrap(), Some(file.clone()));

        clock.advance(Duration::from_secs(9));
        assert_eq!(orchestrator.get_readable_file().unwrap(), None);
        assert!(directory.file(file.name()).is_none(), "obsolete file is deleted");
    }

    #[test]
    fn test_active_file_is_not_readable() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(RelativeDateProvider::starting_now(Duration::ZERO));
        let mut performance = preset();
        performance.min_file_age_for_read = Duration::ZERO;
        let orchestrator = orchestrator(&dir, performance, clock.clone());

        let active = orchestrator.get_writable_file(1).unwrap();
        assert!(orchestrator.get_readable_files().unwrap().is_empty());
        assert_eq!(orchestrator.get_all_files().unwrap(), vec![active.clone()]);

        // Past the write window the file is no longer active
        clock.advance(Duration::from_secs(2));
        assert_eq!(orchestrator.get_readable_files().unwrap(), vec![active]);
    }

    #[test]
    fn test_readable_files_oldest_first() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(RelativeDateProvider::starting_now(Duration::from_secs(60)));
        let mut performance = preset();
        performance.min_file_age_for_read = Duration::ZERO;
        performance.max_file_age_for_read = Duration::from_secs(3600);
        let orchestrator = orchestrator(&dir, performance, clock.clone());
        let directory = orchestrator.directory();

        let names: Vec<String> = (0..3).map(|_| file_name_from(clock.now())).collect();
        for name in names.iter().rev() {
            directory.create_file(name).unwrap();
        }
        directory.create_file("not-a-batch").unwrap();

        let readable: Vec<String> = orchestrator
            .get_readable_files()
            .unwrap()
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        assert_eq!(readable, names);
    }

    proptest::proptest! {
        #[test]
        fn prop_file_names_preserve_order(a in 0i64..4_102_444_800_000, b in 0i64..4_102_444_800_000) {
            let (a, b) = (a.min(b), a.max(b));
            let early = file_name_from(Utc.timestamp_millis_opt(a).unwrap());
            let late = file_name_from(Utc.timestamp_millis_opt(b).unwrap());

            proptest::prop_assert!(early <= late);
            proptest::prop_assert_eq!(early.len(), FILE_NAME_WIDTH);
            proptest::prop_assert_eq!(creation_date_from(&late), Utc.timestamp_millis_opt(b).single());
        }
    }
}
