//! A key → value map persisted as a single JSON snapshot.
//!
//! [`DurableMap`] is loaded eagerly and saved by rewriting its whole file.
//! The on-disk form is
//!
//! ```json
//! { "version": 1, "entries": [[key, value], ...] }
//! ```
//!
//! with entries in key order. An empty file, or one cut short mid-write, loads
//! as an empty map.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};

/// Snapshot format version written by [`DurableMap::save`].
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize)]
struct SnapshotRef<'a, K, V> {
    version: u32,
    entries: Vec<(&'a K, &'a V)>,
}

#[derive(Deserialize)]
struct Snapshot<K, V> {
    entries: Vec<(K, V)>,
}

/// An ordered map that lives in memory and is persisted on demand.
#[derive(Debug)]
pub struct DurableMap<K, V> {
    path: PathBuf,
    entries: BTreeMap<K, V>,
}

impl<K, V> DurableMap<K, V>
where
    K: Ord + Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    /// Opens the map at `path`, creating an empty file if it is missing.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadFailed`] if the file cannot be read,
    /// [`StorageError::WriteFailed`] if it cannot be created, or
    /// [`StorageError::Deserialize`] if it holds malformed (but complete) JSON.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            std::fs::write(&path, b"").map_err(|e| StorageError::WriteFailed {
                path: path.clone(),
                offset: 0,
                source: e,
            })?;
        }
        let entries = load_entries(&path)?;
        Ok(Self { path, entries })
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the value for `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.entries.get(key)
    }

    /// Returns a mutable reference to the value for `key`.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.entries.get_mut(key)
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.entries.contains_key(key)
    }

    /// Sets `key` to `value`, returning the previous value.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.entries.insert(key, value)
    }

    /// Removes `key`, returning its value.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.entries.remove(key)
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over entries in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, K, V> {
        self.entries.iter()
    }

    /// Iterates over keys in order.
    pub fn keys(&self) -> btree_map::Keys<'_, K, V> {
        self.entries.keys()
    }

    /// Removes every entry in memory.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Overwrites the backing file with the current entries.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialize`] or [`StorageError::WriteFailed`].
    pub fn save(&self) -> Result<()> {
        let snapshot = SnapshotRef {
            version: SNAPSHOT_VERSION,
            entries: self.entries.iter().collect(),
        };
        let json = serde_json::to_string_pretty(&snapshot).map_err(|e| {
            StorageError::Serialize {
                path: self.path.clone(),
                source: e,
            }
        })?;
        std::fs::write(&self.path, json).map_err(|e| StorageError::WriteFailed {
            path: self.path.clone(),
            offset: 0,
            source: e,
        })?;
        tracing::debug!(
            path = %self.path.display(),
            entries = self.entries.len(),
            "saved map snapshot"
        );
        Ok(())
    }

    /// Discards unsaved edits and reloads the backing file.
    ///
    /// # Errors
    ///
    /// Same as [`DurableMap::open`].
    pub fn reload(&mut self) -> Result<()> {
        self.entries = load_entries(&self.path)?;
        Ok(())
    }

}

fn load_entries<K, V>(path: &Path) -> Result<BTreeMap<K, V>>
where
    K: Ord + DeserializeOwned,
    V: DeserializeOwned,
{
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => {
            return Err(StorageError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            }
            .into());
        }
    };
    if data.trim().is_empty() {
        return Ok(BTreeMap::new());
    }

    match serde_json::from_str::<Snapshot<K, V>>(&data) {
        Ok(snapshot) => Ok(snapshot.entries.into_iter().collect()),
        Err(e) if e.is_eof() => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "truncated map snapshot; starting empty"
            );
            Ok(BTreeMap::new())
        }
        Err(e) => Err(StorageError::Deserialize {
            path: path.to_path_buf(),
            source: e,
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_creates_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("m.map");

        let map = DurableMap::<String, i64>::open(&path).unwrap();
        assert!(map.is_empty());
        assert!(path.is_file());
    }

    #[test]
    fn test_save_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("m.map");

        let mut map = DurableMap::<String, i64>::open(&path).unwrap();
        map.insert("b".to_string(), 2);
        map.insert("a".to_string(), 1);
        map.save().unwrap();

        let reopened = DurableMap::<String, i64>::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.get("a"), Some(&1));
        let keys: Vec<_> = reopened.keys().cloned().collect();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_reload_discards_edits() {
        let dir = tempdir().unwrap();
        let mut map = DurableMap::<String, i64>::open(dir.path().join("m.map")).unwrap();
        map.insert("a".to_string(), 1);
        map.save().unwrap();

        map.remove("a");
        map.insert("z".to_string(), 26);
        map.reload().unwrap();
        assert!(map.contains_key("a"));
        assert!(!map.contains_key("z"));
    }

    #[test]
    fn test_string_keys_are_found_by_str() {
        let dir = tempdir().unwrap();
        let mut map = DurableMap::<String, i64>::open(dir.path().join("m.map")).unwrap();
        map.insert("a".to_string(), 1);

        *map.get_mut("a").unwrap() += 1;
        assert_eq!(map.get("a"), Some(&2));
        assert_eq!(map.remove("a"), Some(2));
        assert!(!map.contains_key("a"));
        assert_eq!(map.get("missing"), None);
    }

    #[test]
    fn test_truncated_snapshot_loads_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("m.map");
        std::fs::write(&path, r#"{"version":1,"entries":[["a","#).unwrap();

        let map = DurableMap::<String, i64>::open(&path).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_malformed_snapshot_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("m.map");
        std::fs::write(&path, "not json").unwrap();

        let err = DurableMap::<String, i64>::open(&path).unwrap_err();
        assert!(matches!(
            err,
            crate::FlumenError::Storage(StorageError::Deserialize { .. })
        ));
    }
}
