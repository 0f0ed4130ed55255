//! The field store: one streaming `f32` array per field.
//!
//! Fields live under `<root>/FieldStore/` as `<field>.field` files of raw
//! little-endian `f32` values. Position `i` of a field is meaningful only
//! together with position `i` of the calendar of the frequency the caller
//! associates with it.
//!
//! Nothing is cached: every call opens its field file, so the store is just a
//! directory handle.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError, StoreKind};
use crate::span::Span;
use crate::stream::StreamingRecordArray;

/// Subdirectory of the root holding field files.
pub const FIELD_DIR: &str = "FieldStore";

/// File extension of field files.
pub const FIELD_EXTENSION: &str = "field";

/// Directory of per-field value arrays.
#[derive(Debug, Clone)]
pub struct FieldStore {
    dir: PathBuf,
}

impl FieldStore {
    /// Opens the field store under `root`, creating its directory.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DirectoryAccess`] if the directory cannot be
    /// created.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let dir = root.as_ref().join(FIELD_DIR);
        fs::create_dir_all(&dir).map_err(|e| StoreError::DirectoryAccess {
            path: dir.clone(),
            source: e,
        })?;
        Ok(Self { dir })
    }

    /// Returns the `FieldStore` directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file path of `field`.
    pub fn field_path(&self, field: &str) -> PathBuf {
        self.dir.join(format!("{field}.{FIELD_EXTENSION}"))
    }

    /// Returns `true` if `field` has a file.
    pub fn contains(&self, field: &str) -> bool {
        self.field_path(field).is_file()
    }

    /// Lists every field, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DirectoryAccess`] if the directory cannot be
    /// listed.
    pub fn fields(&self) -> Result<Vec<String>> {
        let access = |e: std::io::Error| StoreError::DirectoryAccess {
            path: self.dir.clone(),
            source: e,
        };
        let mut fields = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(access)? {
            let path = entry.map_err(access)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(FIELD_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                fields.push(stem.to_string());
            }
        }
        fields.sort_unstable();
        Ok(fields)
    }

    /// Creates `field` holding `values`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] if the field has a file, or a
    /// storage error on write failure.
    pub fn insert(&self, field: &str, values: &[f32]) -> Result<()> {
        if self.contains(field) {
            return Err(StoreError::AlreadyExists {
                kind: StoreKind::Field,
                name: field.to_string(),
            }
            .into());
        }
        self.array(field).extend(values)?;
        tracing::debug!(field, values = values.len(), "inserted field");
        Ok(())
    }

    /// Reads positions `[start, end)` of `field`.
    ///
    /// Uses the open-ended read rule of
    /// [`StreamingRecordArray::get_range`]: an `end` of `-1` reads through
    /// the last value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the field has no file, or a
    /// storage error on read failure.
    pub fn find(&self, field: &str, start: i64, end: i64) -> Result<Vec<f32>> {
        self.existing(field)?.get_range(start..end)
    }

    /// Reads every value of `field`.
    ///
    /// # Errors
    ///
    /// Same as [`find`](Self::find).
    pub fn find_all(&self, field: &str) -> Result<Vec<f32>> {
        self.existing(field)?.get_range(Span::all())
    }

    /// Overwrites positions `[start, end)` of `field` with `values`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the field has no file, a
    /// length-mismatch storage error if `values` does not cover the range
    /// exactly, or a storage error on I/O failure.
    pub fn update(&self, field: &str, start: i64, end: i64, values: &[f32]) -> Result<()> {
        self.existing(field)?.set_range(start..end, values)?;
        tracing::debug!(field, start, end, "updated field");
        Ok(())
    }

    /// Appends `values` to `field`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the field has no file, or a
    /// storage error on write failure.
    pub fn append(&self, field: &str, values: &[f32]) -> Result<()> {
        self.existing(field)?.extend(values)
    }

    /// Returns the number of values in `field`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the field has no file.
    pub fn len(&self, field: &str) -> Result<usize> {
        self.existing(field)?.len()
    }

    /// Deletes `field` and its file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the field has no file, or a
    /// storage error if it cannot be removed.
    pub fn delete(&self, field: &str) -> Result<()> {
        self.existing(field)?.clear()?;
        tracing::debug!(field, "deleted field");
        Ok(())
    }

    fn array(&self, field: &str) -> StreamingRecordArray<f32> {
        StreamingRecordArray::new(self.field_path(field))
    }

    fn existing(&self, field: &str) -> Result<StreamingRecordArray<f32>> {
        let array = self.array(field);
        if !array.exists() {
            return Err(StoreError::NotFound {
                kind: StoreKind::Field,
                name: field.to_string(),
            }
            .into());
        }
        Ok(array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_insert_find_update() {
        let dir = tempdir().unwrap();
        let store = FieldStore::open(dir.path()).unwrap();

        store.insert("close", &[1858.48, 1794.43, 1779.18, 1753.2]).unwrap();
        store.update("close", 2, 4, &[1800.0, 1844.88]).unwrap();
        assert_eq!(
            store.find("close", 0, -1).unwrap(),
            vec![1858.48, 1794.43, 1800.0, 1844.88]
        );
        assert_eq!(store.find("close", 1, 3).unwrap(), vec![1794.43, 1800.0]);
    }

    #[test]
    fn test_insert_twice_fails() {
        let dir = tempdir().unwrap();
        let store = FieldStore::open(dir.path()).unwrap();
        store.insert("close", &[]).unwrap();
        assert!(store.contains("close"));

        let err = store.insert("close", &[1.0]).unwrap_err();
        assert!(matches!(
            err,
            crate::FlumenError::Store(StoreError::AlreadyExists { kind: StoreKind::Field, .. })
        ));
    }

    #[test]
    fn test_missing_field() {
        let dir = tempdir().unwrap();
        let store = FieldStore::open(dir.path()).unwrap();

        assert!(store.find("open", 0, -1).is_err());
        assert!(store.update("open", 0, 1, &[1.0]).is_err());
        assert!(store.append("open", &[1.0]).is_err());
        assert!(store.delete("open").is_err());
    }

    #[test]
    fn test_append_len_and_delete() {
        let dir = tempdir().unwrap();
        let store = FieldStore::open(dir.path()).unwrap();
        store.insert("volume", &[1.0, 2.0]).unwrap();
        store.append("volume", &[3.0]).unwrap();
        assert_eq!(store.len("volume").unwrap(), 3);
        assert_eq!(store.find_all("volume").unwrap(), vec![1.0, 2.0, 3.0]);

        store.delete("volume").unwrap();
        assert!(!store.contains("volume"));
        assert!(!store.field_path("volume").exists());
    }

    #[test]
    fn test_fields_lists_sorted_names() {
        let dir = tempdir().unwrap();
        let store = FieldStore::open(dir.path()).unwrap();
        store.insert("b.close.D", &[1.0]).unwrap();
        store.insert("a.close.D", &[1.0]).unwrap();
        std::fs::write(store.dir().join("README"), b"x").unwrap();

        assert_eq!(store.fields().unwrap(), vec!["a.close.D", "b.close.D"]);
    }
}
