//! File-resident record array that never loads more than it needs.
//!
//! [`StreamingRecordArray`] keeps no records in memory. Its cost model is
//! split in two:
//!
//! - **Growth and reads are cheap.** `append`/`extend` open the file in append
//!   mode and write only the new bytes. `get`/`get_range` seek to
//!   `position * T::SIZE` and read exactly the requested byte range.
//! - **Corrections are O(n).** `set`, `insert` and `delete` read the whole
//!   file, edit it in memory, and rewrite it.
//!
//! The length is derived from the file size (`size / T::SIZE`), so there is
//! no header to keep in sync. An absent file is an empty array, and a delete
//! that leaves the array empty removes the file.
//!
//! # Open-ended reads
//!
//! [`get_range`](StreamingRecordArray::get_range) resolves the stop bound
//! against `len + 1`: an omitted stop reads to the end and a stop of `-1`
//! also reads to the end (`-2` drops the last record, and so on). Reads are
//! clamped at end of file.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use crate::array::{read_records, remove_file, write_records};
use crate::error::{Result, StorageError};
use crate::record::{self, Record};
use crate::span::{self, Span};

/// A mutable sequence of fixed-width records that lives in its file.
#[derive(Debug, Clone)]
pub struct StreamingRecordArray<T: Record> {
    /// Path to the backing file.
    path: PathBuf,
    _record: PhantomData<T>,
}

impl<T: Record> StreamingRecordArray<T> {
    /// Creates a handle on the array at `path`. No I/O is performed.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            _record: PhantomData,
        }
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `true` if the backing file exists.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Returns the number of whole records in the file.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadFailed`] if the file metadata cannot be read.
    pub fn len(&self) -> Result<usize> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(usize::try_from(meta.len()).unwrap_or(usize::MAX) / T::SIZE),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(self.read_error(e)),
        }
    }

    /// Returns `true` if the array holds no records.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadFailed`] if the file metadata cannot be read.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Reads the record at `index`; negative indices count from the end.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::IndexOutOfBounds`] if no such record exists or
    /// [`StorageError::ReadFailed`] on I/O failure.
    pub fn get(&self, index: i64) -> Result<T> {
        let i = span::resolve_index(index, self.len()?)?;
        let mut file = File::open(&self.path).map_err(|e| self.read_error(e))?;
        file.seek(SeekFrom::Start(byte_offset::<T>(i)))
            .map_err(|e| self.read_error(e))?;
        let mut buf = vec![0u8; T::SIZE];
        file.read_exact(&mut buf).map_err(|e| self.read_error(e))?;
        Ok(T::decode(&buf))
    }

    /// Reads the records covered by `span`, touching only their bytes.
    ///
    /// See the module docs for how the stop bound is resolved.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadFailed`] on I/O failure.
    pub fn get_range(&self, span: impl Into<Span>) -> Result<Vec<T>> {
        let len = self.len()?;
        let (start, stop) = open_ended_bounds(span.into(), len);
        let (start, stop) = (start.min(len), stop.min(len));
        if stop <= start {
            return Ok(Vec::new());
        }

        let mut file = File::open(&self.path).map_err(|e| self.read_error(e))?;
        file.seek(SeekFrom::Start(byte_offset::<T>(start)))
            .map_err(|e| self.read_error(e))?;
        let mut bytes = Vec::with_capacity((stop - start) * T::SIZE);
        file.take(byte_offset::<T>(stop - start))
            .read_to_end(&mut bytes)
            .map_err(|e| self.read_error(e))?;
        Ok(record::decode_all(&bytes))
    }

    /// Reads every record.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadFailed`] on I/O failure.
    pub fn read_all(&self) -> Result<Vec<T>> {
        match read_records(&self.path) {
            Ok(records) => Ok(records),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(self.read_error(e)),
        }
    }

    /// Appends one record to the end of the file, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::WriteFailed`] on I/O failure.
    pub fn append(&self, value: T) -> Result<()> {
        self.extend(&[value])
    }

    /// Appends records to the end of the file, creating it if needed.
    ///
    /// Existing content is never read.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::TimestampOutOfRange`] if a value has no
    /// encoding (nothing is written), or [`StorageError::WriteFailed`] on I/O
    /// failure.
    pub fn extend(&self, values: &[T]) -> Result<()> {
        let bytes = record::encode_all(values)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.write_error(0, e))?;
        let offset = file.metadata().map(|m| m.len()).unwrap_or(0);
        file.write_all(&bytes)
            .map_err(|e| self.write_error(offset, e))?;
        Ok(())
    }

    /// Replaces the record at `index` (full rewrite).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::IndexOutOfBounds`] if no such record exists,
    /// or an I/O error.
    pub fn set(&self, index: i64, value: T) -> Result<()> {
        let mut data = self.read_all()?;
        let i = span::resolve_index(index, data.len())?;
        data[i] = value;
        self.rewrite(&data)
    }

    /// Replaces the records covered by `span` (full rewrite).
    ///
    /// The span is resolved with ordinary slice semantics, not the
    /// open-ended read rule.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::LengthMismatch`] if `values` does not exactly
    /// cover the resolved range, or an I/O error.
    pub fn set_range(&self, span: impl Into<Span>, values: &[T]) -> Result<()> {
        let mut data = self.read_all()?;
        let range = span.into().resolve(data.len());
        if range.len() != values.len() {
            return Err(StorageError::LengthMismatch {
                expected: range.len(),
                found: values.len(),
            }
            .into());
        }
        data[range].copy_from_slice(values);
        self.rewrite(&data)
    }

    /// Inserts `values` before position `index` (full rewrite).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::IndexOutOfBounds`] if `index` is outside
    /// `-len..=len`, or an I/O error.
    pub fn insert(&self, index: i64, values: &[T]) -> Result<()> {
        let mut data = self.read_all()?;
        let at = span::resolve_insert_point(index, data.len())?;
        data.splice(at..at, values.iter().copied());
        self.rewrite(&data)
    }

    /// Removes the record at `index` (full rewrite).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::IndexOutOfBounds`] if no such record exists,
    /// or an I/O error.
    pub fn delete(&self, index: i64) -> Result<T> {
        let mut data = self.read_all()?;
        let i = span::resolve_index(index, data.len())?;
        let removed = data.remove(i);
        self.rewrite_or_remove(&data)?;
        Ok(removed)
    }

    /// Removes the records covered by `span` (full rewrite).
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read, rewritten or removed.
    pub fn delete_range(&self, span: impl Into<Span>) -> Result<usize> {
        let mut data = self.read_all()?;
        let range = span.into().resolve(data.len());
        let removed = data.drain(range).count();
        self.rewrite_or_remove(&data)?;
        Ok(removed)
    }

    /// Removes every record and the backing file.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::RemoveFailed`] if the file cannot be removed.
    pub fn clear(&self) -> Result<()> {
        remove_file(&self.path)
    }

    fn rewrite(&self, data: &[T]) -> Result<()> {
        write_records(&self.path, data)
    }

    fn rewrite_or_remove(&self, data: &[T]) -> Result<()> {
        if data.is_empty() {
            remove_file(&self.path)
        } else {
            write_records(&self.path, data)
        }
    }

    fn read_error(&self, source: std::io::Error) -> crate::error::FlumenError {
        StorageError::ReadFailed {
            path: self.path.clone(),
            source,
        }
        .into()
    }

    fn write_error(&self, offset: u64, source: std::io::Error) -> crate::error::FlumenError {
        StorageError::WriteFailed {
            path: self.path.clone(),
            offset,
            source,
        }
        .into()
    }
}

/// Resolves a read span to `[start, stop)` record bounds before EOF clamping.
///
/// An omitted stop resolves to `len + 1` and a negative stop to
/// `len + 1 + stop`. Negative starts count from `len`.
fn open_ended_bounds(span: Span, len: usize) -> (usize, usize) {
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let start = match span.start {
        None => 0,
        Some(s) if s < 0 => (len_i + s).max(0),
        Some(s) => s,
    };
    let stop = match span.stop {
        None => len_i + 1,
        Some(s) if s < 0 => (len_i + 1 + s).max(0),
        Some(s) => s,
    };
    let start = usize::try_from(start).unwrap_or(0);
    let stop = usize::try_from(stop).unwrap_or(0);
    (start, stop.max(start))
}

fn byte_offset<T: Record>(records: usize) -> u64 {
    u64::try_from(records * T::SIZE).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> Vec<f32> {
        vec![1.0, 2.0, 3.0, 4.0, 5.0]
    }

    fn array_in(dir: &tempfile::TempDir) -> StreamingRecordArray<f32> {
        StreamingRecordArray::new(dir.path().join("values.field"))
    }

    #[test]
    fn test_absent_file_is_empty() {
        let dir = tempdir().unwrap();
        let array = array_in(&dir);
        assert!(!array.exists());
        assert_eq!(array.len().unwrap(), 0);
        assert!(array.get_range(Span::all()).unwrap().is_empty());
        assert!(array.get(0).is_err());
    }

    #[test]
    fn test_insert_into_sequence() {
        let dir = tempdir().unwrap();
        let array = array_in(&dir);

        array.insert(0, &sample()).unwrap();
        assert_eq!(array.get_range(Span::all()).unwrap(), sample());

        array.insert(2, &[6.0]).unwrap();
        assert_eq!(array.get(2).unwrap(), 6.0);
        assert_eq!(
            array.get_range(Span::all()).unwrap(),
            vec![1.0, 2.0, 6.0, 3.0, 4.0, 5.0]
        );
    }

    #[test]
    fn test_get_single_and_ranges() {
        let dir = tempdir().unwrap();
        let array = array_in(&dir);
        array.extend(&sample()).unwrap();

        assert_eq!(array.get_range(0..2).unwrap(), vec![1.0, 2.0]);
        assert_eq!(array.get(-1).unwrap(), 5.0);
        assert_eq!(array.get(0).unwrap(), 1.0);
    }

    #[test]
    fn test_set_single_and_range() {
        let dir = tempdir().unwrap();
        let array = array_in(&dir);
        array.extend(&sample()).unwrap();

        array.set(0, 6.0).unwrap();
        assert_eq!(array.get(0).unwrap(), 6.0);

        array.set_range(0..2, &[7.0, 8.0]).unwrap();
        assert_eq!(array.get_range(0..2).unwrap(), vec![7.0, 8.0]);
        assert_eq!(array.len().unwrap(), 5);
    }

    #[test]
    fn test_delete_shifts_and_empty_removes_file() {
        let dir = tempdir().unwrap();
        let array = array_in(&dir);
        array.extend(&sample()).unwrap();

        array.delete(0).unwrap();
        assert_eq!(array.get_range(Span::all()).unwrap(), vec![2.0, 3.0, 4.0, 5.0]);
        assert_eq!(array.len().unwrap(), 4);

        array.delete_range(0..2).unwrap();
        assert_eq!(array.get_range(Span::all()).unwrap(), vec![4.0, 5.0]);

        array.delete_range(Span::all()).unwrap();
        assert!(!array.exists());
    }

    #[test]
    fn test_append_and_extend() {
        let dir = tempdir().unwrap();
        let array = array_in(&dir);

        array.append(1.0).unwrap();
        assert_eq!(array.get(0).unwrap(), 1.0);
        array.append(2.0).unwrap();
        assert_eq!(array.get(1).unwrap(), 2.0);

        array.extend(&[6.0, 7.0]).unwrap();
        assert_eq!(array.get_range(Span::all()).unwrap(), vec![1.0, 2.0, 6.0, 7.0]);
    }

    #[test]
    fn test_open_ended_bounds() {
        assert_eq!(open_ended_bounds(Span::from(0..2), 5), (0, 2));
        assert_eq!(open_ended_bounds(Span::from(..3), 5), (0, 3));
        assert_eq!(open_ended_bounds(Span::from(2..), 5), (2, 6));
        assert_eq!(open_ended_bounds(Span::all(), 5), (0, 6));
        assert_eq!(open_ended_bounds(Span::from(0..-1), 5), (0, 5));
        assert_eq!(open_ended_bounds(Span::from(0..-2), 5), (0, 4));
        assert_eq!(open_ended_bounds(Span::from(-2..), 5), (3, 6));
    }

    #[test]
    fn test_negative_stop_reads_to_end() {
        let dir = tempdir().unwrap();
        let array = array_in(&dir);
        array.extend(&sample()).unwrap();

        assert_eq!(array.get_range(0..-1).unwrap(), sample());
        assert_eq!(array.get_range(0..-2).unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(array.get_range(3..100).unwrap(), vec![4.0, 5.0]);
    }

    #[test]
    fn test_misaligned_tail_is_not_counted() {
        let dir = tempdir().unwrap();
        let array = array_in(&dir);
        array.extend(&[1.0, 2.0]).unwrap();

        let mut file = OpenOptions::new().append(true).open(array.path()).unwrap();
        file.write_all(&[0xAA, 0xBB]).unwrap();

        assert_eq!(array.len().unwrap(), 2);
        assert_eq!(array.get_range(Span::all()).unwrap(), vec![1.0, 2.0]);
    }
}
