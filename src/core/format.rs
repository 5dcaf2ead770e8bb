//! Framing of records on disk and in read batches

/// How records are joined in a file and wrapped into a batch
///
/// The writer joins records with `separator`; the reader wraps a file's
/// contents in `prefix` and `suffix`. Together they turn the file
/// `o1,o2,o3` into the document `[o1,o2,o3]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFormat {
    prefix: Vec<u8>,
    suffix: Vec<u8>,
    separator: Vec<u8>,
}

impl DataFormat {
    pub fn new(
        prefix: impl Into<Vec<u8>>,
        suffix: impl Into<Vec<u8>>,
        separator: impl Into<Vec<u8>>,
    ) -> Self {
        DataFormat {
            prefix: prefix.into(),
            suffix: suffix.into(),
            separator: separator.into(),
        }
    }

    /// Comma-separated records wrapped as a JSON array
    pub fn json_array() -> Self {
        Self::new("[", "]", ",")
    }

    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    pub fn suffix(&self) -> &[u8] {
        &self.suffix
    }

    pub fn separator(&self) -> &[u8] {
        &self.separator
    }

    /// Bytes to append for `record` given whether the file already holds data
    pub(crate) fn frame_record(&self, record: &[u8], file_is_empty: bool) -> Vec<u8> {
        if file_is_empty {
            return record.to_vec();
        }
        let mut framed = Vec::with_capacity(self.separator.len() + record.len());
        framed.extend_from_slice(&self.separator);
        framed.extend_from_slice(record);
        framed
    }

    /// Wrap a file's contents into one parseable document
    pub(crate) fn wrap_batch(&self, contents: &[u8]) -> Vec<u8> {
        let mut batch =
            Vec::with_capacity(self.prefix.len() + contents.len() + self.suffix.len());
        batch.extend_from_slice(&self.prefix);
        batch.extend_from_slice(contents);
        batch.extend_from_slice(&self.suffix);
        batch
    }
}
