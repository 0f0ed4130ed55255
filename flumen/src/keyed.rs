//! Key-addressable record arrays.
//!
//! A [`KeyedRecordArray`] stores a sequence of keys in a
//! [`FixedRecordArray`] and derives a `key → position` index from it. Callers
//! address entries either by position or by key through a [`Locator`]:
//!
//! | Locator              | Addresses                                   |
//! |----------------------|---------------------------------------------|
//! | `Position(i)`        | the key stored at position `i`              |
//! | `Positions(span)`    | the keys stored in a positional span        |
//! | `Key(k)`             | the (first) position holding `k`            |
//! | `KeyRange(a, b)`     | every position whose key lies in `[a, b]`   |
//!
//! The index is rebuilt from scratch after every mutation and never persisted;
//! only the keys are written to disk.
//!
//! # Key order
//!
//! Keys are not required to be sorted. While they are in ascending order,
//! key-range lookups binary-search; otherwise they scan. Both paths return the
//! same entries: every position whose key lies in the range, in positional
//! order.

use std::collections::HashMap;
use std::hash::Hash;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::array::{FixedRecordArray, remove_file};
use crate::error::{Result, StorageError};
use crate::record::Record;
use crate::span::Span;

/// A timestamp calendar: keys are UTC instants.
pub type TimestampIndex = KeyedRecordArray<DateTime<Utc>>;

/// Addresses entries of a [`KeyedRecordArray`] by position or by key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locator<K> {
    /// A single position; negative values count from the end.
    Position(i64),
    /// A positional span.
    Positions(Span),
    /// A single key.
    Key(K),
    /// All keys within `[start, end]`, inclusive on both ends.
    KeyRange(K, K),
}

impl<K> From<i64> for Locator<K> {
    fn from(index: i64) -> Self {
        Locator::Position(index)
    }
}

impl<K> From<Span> for Locator<K> {
    fn from(span: Span) -> Self {
        Locator::Positions(span)
    }
}

/// The result of a [`KeyedRecordArray::get`].
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<K> {
    /// The key at a single position.
    Key(K),
    /// The keys in a positional span.
    Keys(Vec<K>),
    /// The position of a single key.
    Position(usize),
    /// `(key, position)` pairs for a key range.
    Positions(PositionSeries<K>),
}

/// An ordered run of `(key, position)` pairs.
///
/// This is the "data series" view of a keyed array: the keys act as the index
/// and the positions as the values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PositionSeries<K> {
    entries: Vec<(K, usize)>,
}

impl<K: Copy> PositionSeries<K> {
    /// Numbers `keys` consecutively starting at `offset`.
    pub fn from_keys(keys: &[K], offset: usize) -> Self {
        Self {
            entries: keys.iter().copied().zip(offset..).collect(),
        }
    }

    /// Wraps already paired entries.
    pub fn from_entries(entries: Vec<(K, usize)>) -> Self {
        Self { entries }
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the series is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the `(key, position)` pairs.
    pub fn entries(&self) -> &[(K, usize)] {
        &self.entries
    }

    /// Iterates over `(key, position)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (K, usize)> + '_ {
        self.entries.iter().copied()
    }

    /// Returns the keys in order.
    pub fn keys(&self) -> Vec<K> {
        self.entries.iter().map(|(k, _)| *k).collect()
    }

    /// Returns the positions in order.
    pub fn positions(&self) -> Vec<usize> {
        self.entries.iter().map(|(_, p)| *p).collect()
    }

    /// Returns the first `(key, position)` pair.
    pub fn first(&self) -> Option<(K, usize)> {
        self.entries.first().copied()
    }

    /// Returns the last `(key, position)` pair.
    pub fn last(&self) -> Option<(K, usize)> {
        self.entries.last().copied()
    }

    /// Returns `first..last + 1` if the positions are consecutive.
    pub fn contiguous_range(&self) -> Option<std::ops::Range<usize>> {
        let (_, first) = self.first()?;
        let contiguous = self
            .entries
            .iter()
            .enumerate()
            .all(|(i, (_, p))| *p == first + i);
        contiguous.then(|| first..first + self.entries.len())
    }
}

/// A persisted key sequence with a derived key → position index.
#[derive(Debug)]
pub struct KeyedRecordArray<K: Record + Eq + Hash + Ord> {
    /// The persisted keys.
    keys: FixedRecordArray<K>,
    /// First position of each distinct key.
    positions: HashMap<K, usize>,
    /// Whether `keys` is currently in non-decreasing order.
    sorted: bool,
}

impl<K: Record + Eq + Hash + Ord> KeyedRecordArray<K> {
    /// Opens the key file at `path`, creating it if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadFailed`] if the file cannot be read.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let keys = FixedRecordArray::open(path)?;
        let mut array = Self {
            keys,
            positions: HashMap::new(),
            sorted: true,
        };
        array.rebuild_index();
        Ok(array)
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        self.keys.path()
    }

    /// Returns the number of keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if there are no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns every key in positional order.
    pub fn keys(&self) -> &[K] {
        self.keys.as_slice()
    }

    /// Returns the first key.
    pub fn first(&self) -> Option<K> {
        self.keys.first()
    }

    /// Returns the last key.
    pub fn last(&self) -> Option<K> {
        self.keys.last()
    }

    /// Returns `true` if `key` is present.
    pub fn contains(&self, key: &K) -> bool {
        self.positions.contains_key(key)
    }

    /// Returns the key stored at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::IndexOutOfBounds`] if no such position exists.
    pub fn key_at(&self, index: i64) -> Result<K> {
        self.keys.get(index)
    }

    /// Returns the keys stored in a positional span.
    pub fn keys_in(&self, span: impl Into<Span>) -> &[K] {
        self.keys.get_range(span)
    }

    /// Returns the first position holding `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::KeyNotFound`] if the key is absent.
    pub fn position_of(&self, key: &K) -> Result<usize> {
        self.positions.get(key).copied().ok_or_else(|| {
            StorageError::KeyNotFound {
                key: format!("{key:?}"),
            }
            .into()
        })
    }

    /// Returns the `(key, position)` pairs whose keys lie in `[start, end]`.
    pub fn positions_between(&self, start: &K, end: &K) -> PositionSeries<K> {
        let keys = self.keys.as_slice();
        let entries = self
            .range_positions(start, end)
            .into_iter()
            .map(|p| (keys[p], p))
            .collect();
        PositionSeries::from_entries(entries)
    }

    /// Returns every key numbered by its position.
    pub fn series(&self) -> PositionSeries<K> {
        PositionSeries::from_keys(self.keys.as_slice(), 0)
    }

    /// Looks up entries by position or key.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::IndexOutOfBounds`] for a bad position or
    /// [`StorageError::KeyNotFound`] for an absent key.
    pub fn get(&self, locator: Locator<K>) -> Result<Lookup<K>> {
        match locator {
            Locator::Position(i) => self.key_at(i).map(Lookup::Key),
            Locator::Positions(span) => Ok(Lookup::Keys(self.keys_in(span).to_vec())),
            Locator::Key(k) => self.position_of(&k).map(Lookup::Position),
            Locator::KeyRange(a, b) => Ok(Lookup::Positions(self.positions_between(&a, &b))),
        }
    }

    /// Inserts `values` before the addressed entry.
    ///
    /// A key locator is resolved through the index. An unknown key on an
    /// empty array inserts at position 0.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UnresolvableKey`] if the key is unknown and the
    /// array is not empty, [`StorageError::InvalidLocator`] for range
    /// locators, or [`StorageError::IndexOutOfBounds`] for a bad position.
    pub fn insert(&mut self, locator: Locator<K>, values: &[K]) -> Result<()> {
        let at = match locator {
            Locator::Position(i) => i,
            Locator::Key(k) => match self.positions.get(&k) {
                Some(&p) => to_index(p),
                None if self.is_empty() => 0,
                None => {
                    return Err(StorageError::UnresolvableKey {
                        key: format!("{k:?}"),
                    }
                    .into());
                }
            },
            Locator::Positions(_) | Locator::KeyRange(..) => {
                return Err(StorageError::InvalidLocator {
                    reason: "insert needs a single position or key".to_string(),
                }
                .into());
            }
        };
        self.keys.insert(at, values)?;
        self.rebuild_index();
        Ok(())
    }

    /// Overwrites the addressed entries with `value`.
    ///
    /// A key locator overwrites every entry holding that key.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::IndexOutOfBounds`] for a bad position or
    /// [`StorageError::KeyNotFound`] for an absent key.
    pub fn set(&mut self, locator: Locator<K>, value: K) -> Result<()> {
        match locator {
            Locator::Position(i) => self.keys.set(i, value)?,
            Locator::Positions(span) => self.keys.fill_range(span, value),
            Locator::Key(k) => {
                let positions = self.require_key_positions(&k)?;
                for p in positions {
                    self.keys.set(to_index(p), value)?;
                }
            }
            Locator::KeyRange(a, b) => {
                for p in self.range_positions(&a, &b) {
                    self.keys.set(to_index(p), value)?;
                }
            }
        }
        self.rebuild_index();
        Ok(())
    }

    /// Removes the addressed entries, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::IndexOutOfBounds`] for a bad position or
    /// [`StorageError::KeyNotFound`] for an absent key.
    pub fn delete(&mut self, locator: Locator<K>) -> Result<usize> {
        let removed = match locator {
            Locator::Position(i) => self.keys.delete(i).map(|_| 1)?,
            Locator::Positions(span) => self.keys.delete_range(span),
            Locator::Key(k) => {
                let positions = self.require_key_positions(&k)?;
                self.keys.delete_positions(&positions)
            }
            Locator::KeyRange(a, b) => {
                let positions = self.range_positions(&a, &b);
                self.keys.delete_positions(&positions)
            }
        };
        self.rebuild_index();
        Ok(removed)
    }

    /// Appends one key.
    pub fn append(&mut self, key: K) {
        self.keys.append(key);
        self.rebuild_index();
    }

    /// Appends keys in order.
    pub fn extend(&mut self, keys: &[K]) {
        self.keys.extend(keys);
        self.rebuild_index();
    }

    /// Removes every key in memory.
    pub fn clear(&mut self) {
        self.keys.clear();
        self.rebuild_index();
    }

    /// Writes the keys to disk; an empty array removes its file instead.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::WriteFailed`] or [`StorageError::RemoveFailed`]
    /// on I/O failure.
    pub fn save(&self) -> Result<()> {
        if self.keys.is_empty() {
            remove_file(self.keys.path())
        } else {
            self.keys.save()
        }
    }

    /// Discards unsaved edits and reloads the keys from disk.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadFailed`] if the file cannot be read.
    pub fn reload(&mut self) -> Result<()> {
        self.keys.reload()?;
        self.rebuild_index();
        Ok(())
    }

    fn rebuild_index(&mut self) {
        let keys = self.keys.as_slice();
        self.positions.clear();
        self.positions.reserve(keys.len());
        for (i, k) in keys.iter().enumerate() {
            self.positions.entry(*k).or_insert(i);
        }
        self.sorted = keys.windows(2).all(|w| w[0] <= w[1]);
    }

    fn range_positions(&self, start: &K, end: &K) -> Vec<usize> {
        let keys = self.keys.as_slice();
        if self.sorted {
            let lo = keys.partition_point(|k| k < start);
            let hi = keys.partition_point(|k| k <= end);
            (lo..hi.max(lo)).collect()
        } else {
            keys.iter()
                .enumerate()
                .filter(|(_, k)| *k >= start && *k <= end)
                .map(|(i, _)| i)
                .collect()
        }
    }

    fn require_key_positions(&self, key: &K) -> Result<Vec<usize>> {
        let positions = self.range_positions(key, key);
        if positions.is_empty() {
            return Err(StorageError::KeyNotFound {
                key: format!("{key:?}"),
            }
            .into());
        }
        Ok(positions)
    }
}

fn to_index(position: usize) -> i64 {
    i64::try_from(position).unwrap_or(i64::MAX)
}
