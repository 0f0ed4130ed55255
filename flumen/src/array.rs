//! In-memory record array backed by a flat file.
//!
//! [`FixedRecordArray`] loads its whole backing file on open and keeps every
//! record in a `Vec`. All edits are in-memory until [`FixedRecordArray::save`]
//! rewrites the file. Use it for small, frequently edited sequences such as
//! calendar keys; large append-mostly data belongs in a
//! [`StreamingRecordArray`](crate::stream::StreamingRecordArray).
//!
//! # Durability
//!
//! `save` truncates and rewrites the file in place. A crash mid-save can leave
//! a truncated file; there is no temp-file-and-rename step.

use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{Result, StorageError};
use crate::record::{self, Record};
use crate::span::{self, Span};

/// A mutable sequence of fixed-width records held fully in memory.
#[derive(Debug)]
pub struct FixedRecordArray<T: Record> {
    /// Path to the backing file.
    path: PathBuf,
    /// The in-memory records.
    data: Vec<T>,
}

impl<T: Record> FixedRecordArray<T> {
    /// Opens the array at `path`, loading every record.
    ///
    /// If the file does not exist an empty file is created and the array
    /// starts empty. The parent directory must already exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadFailed`] if the file exists but cannot be
    /// read, or [`StorageError::WriteFailed`] if it cannot be created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = load_or_create(&path)?;
        Ok(Self { path, data })
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the array holds no records.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns all records as a slice.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Returns the first record, if any.
    pub fn first(&self) -> Option<T> {
        self.data.first().copied()
    }

    /// Returns the last record, if any.
    pub fn last(&self) -> Option<T> {
        self.data.last().copied()
    }

    /// Returns the record at `index`; negative indices count from the end.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::IndexOutOfBounds`] if no such record exists.
    pub fn get(&self, index: i64) -> Result<T> {
        let i = span::resolve_index(index, self.data.len())?;
        Ok(self.data[i])
    }

    /// Returns the records covered by `span`.
    pub fn get_range(&self, span: impl Into<Span>) -> &[T] {
        &self.data[span.into().resolve(self.data.len())]
    }

    /// Replaces the record at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::IndexOutOfBounds`] if no such record exists.
    pub fn set(&mut self, index: i64, value: T) -> Result<()> {
        let i = span::resolve_index(index, self.data.len())?;
        self.data[i] = value;
        Ok(())
    }

    /// Replaces the records covered by `span` with `values`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::LengthMismatch`] if `values` is not exactly as
    /// long as the resolved range.
    pub fn set_range(&mut self, span: impl Into<Span>, values: &[T]) -> Result<()> {
        let range = span.into().resolve(self.data.len());
        if range.len() != values.len() {
            return Err(StorageError::LengthMismatch {
                expected: range.len(),
                found: values.len(),
            }
            .into());
        }
        self.data[range].copy_from_slice(values);
        Ok(())
    }

    /// Sets every record covered by `span` to `value`.
    pub fn fill_range(&mut self, span: impl Into<Span>, value: T) {
        let range = span.into().resolve(self.data.len());
        self.data[range].fill(value);
    }

    /// Inserts `values` before position `index`.
    ///
    /// `index` may equal the length, which appends.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::IndexOutOfBounds`] if `index` is outside
    /// `-len..=len`.
    pub fn insert(&mut self, index: i64, values: &[T]) -> Result<()> {
        let at = span::resolve_insert_point(index, self.data.len())?;
        self.data.splice(at..at, values.iter().copied());
        Ok(())
    }

    /// Removes and returns the record at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::IndexOutOfBounds`] if no such record exists.
    pub fn delete(&mut self, index: i64) -> Result<T> {
        let i = span::resolve_index(index, self.data.len())?;
        Ok(self.data.remove(i))
    }

    /// Removes the records covered by `span`, returning how many were removed.
    pub fn delete_range(&mut self, span: impl Into<Span>) -> usize {
        let range = span.into().resolve(self.data.len());
        self.data.drain(range).count()
    }

    /// Removes every record at the given positions.
    ///
    /// Positions may be unordered or repeated; out-of-range positions are
    /// ignored.
    pub fn delete_positions(&mut self, positions: &[usize]) -> usize {
        let before = self.data.len();
        let mut doomed = vec![false; before];
        for &p in positions {
            if p < before {
                doomed[p] = true;
            }
        }
        let mut i = 0;
        self.data.retain(|_| {
            let keep = !doomed[i];
            i += 1;
            keep
        });
        before - self.data.len()
    }

    /// Appends one record.
    pub fn append(&mut self, value: T) {
        self.data.push(value);
    }

    /// Appends records in order.
    pub fn extend(&mut self, values: &[T]) {
        self.data.extend_from_slice(values);
    }

    /// Removes every record in memory.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Writes the full in-memory sequence to the backing file.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::TimestampOutOfRange`] if a record has no
    /// encoding (the file is left untouched), or
    /// [`StorageError::WriteFailed`] if the file cannot be written.
    pub fn save(&self) -> Result<()> {
        write_records(&self.path, &self.data)
    }

    /// Discards unsaved edits and reloads the backing file.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadFailed`] if the file cannot be read.
    pub fn reload(&mut self) -> Result<()> {
        self.data = load_or_create(&self.path)?;
        Ok(())
    }
}

/// Reads every record from `path`, creating an empty file if it is missing.
fn load_or_create<T: Record>(path: &Path) -> Result<Vec<T>> {
    match read_records(path) {
        Ok(records) => Ok(records),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            File::create(path).map_err(|e| StorageError::WriteFailed {
                path: path.to_path_buf(),
                offset: 0,
                source: e,
            })?;
            Ok(Vec::new())
        }
        Err(e) => Err(StorageError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        }
        .into()),
    }
}

/// Reads and decodes every record of a file.
pub(crate) fn read_records<T: Record>(path: &Path) -> std::io::Result<Vec<T>> {
    let bytes = fs::read(path)?;
    if bytes.len() % T::SIZE != 0 {
        tracing::warn!(
            path = %path.display(),
            size = bytes.len(),
            record_size = T::SIZE,
            "file size is not a multiple of the record size; ignoring trailing bytes"
        );
    }
    Ok(record::decode_all(&bytes))
}

/// Truncates `path` and writes `values` as its only content.
pub(crate) fn write_records<T: Record>(path: &Path, values: &[T]) -> Result<()> {
    let bytes = record::encode_all(values)?;
    fs::write(path, bytes).map_err(|e| StorageError::WriteFailed {
        path: path.to_path_buf(),
        offset: 0,
        source: e,
    })?;
    tracing::debug!(path = %path.display(), records = values.len(), "rewrote record file");
    Ok(())
}

/// Removes `path`; a file that is already gone is not an error.
pub(crate) fn remove_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "removed record file");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::RemoveFailed {
            path: path.to_path_buf(),
            source: e,
        }
        .into()),
    }
}
