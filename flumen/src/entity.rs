//! The entity store: a validity window per entity.
//!
//! All windows live in one JSON snapshot at `<root>/entities.entity`, rewritten
//! after every mutation.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError, StoreKind};
use crate::map::DurableMap;

/// File name of the entity snapshot under the root.
pub const ENTITY_FILE: &str = "entities.entity";

/// The time span during which an entity has data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityWindow {
    /// First instant.
    pub start: DateTime<Utc>,
    /// Last instant.
    pub end: DateTime<Utc>,
}

impl EntityWindow {
    /// Creates a window, checking that it does not end before it starts.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidWindow`] if `end < start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end < start {
            return Err(StoreError::InvalidWindow { start, end }.into());
        }
        Ok(Self { start, end })
    }

    /// Returns the smallest window covering both `self` and `other`.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// Entity id → validity window.
#[derive(Debug)]
pub struct EntityStore {
    windows: DurableMap<String, EntityWindow>,
}

impl EntityStore {
    /// Opens (or creates) the entity snapshot under `root`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the snapshot cannot be read or is
    /// malformed.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let windows = DurableMap::open(root.as_ref().join(ENTITY_FILE))?;
        tracing::info!(entities = windows.len(), "opened entity store");
        Ok(Self { windows })
    }

    /// Returns the snapshot path.
    pub fn path(&self) -> &Path {
        self.windows.path()
    }

    /// Returns `true` if `entity` has a window.
    pub fn contains(&self, entity: &str) -> bool {
        self.windows.contains_key(entity)
    }

    /// Returns the number of entities.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Returns `true` if there are no entities.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Iterates over `(entity, window)` pairs in entity order.
    pub fn entities(&self) -> impl Iterator<Item = (&str, &EntityWindow)> {
        self.windows.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Records the window of a new entity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidWindow`] if `end < start`,
    /// [`StoreError::AlreadyExists`] if the entity is known, or a storage
    /// error if the snapshot cannot be written.
    pub fn insert(&mut self, entity: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
        let window = EntityWindow::new(start, end)?;
        if self.contains(entity) {
            return Err(StoreError::AlreadyExists {
                kind: StoreKind::Entity,
                name: entity.to_string(),
            }
            .into());
        }
        self.windows.insert(entity.to_string(), window);
        self.windows.save()
    }

    /// Returns the window of `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the entity is unknown.
    pub fn find(&self, entity: &str) -> Result<EntityWindow> {
        self.windows
            .get(entity)
            .copied()
            .ok_or_else(|| not_found(entity))
    }

    /// Replaces the start and/or end of an entity's window.
    ///
    /// The updated window is not re-validated.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the entity is unknown, or a
    /// storage error if the snapshot cannot be written.
    pub fn update(
        &mut self,
        entity: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let window = self
            .windows
            .get_mut(entity)
            .ok_or_else(|| not_found(entity))?;
        if let Some(start) = start {
            window.start = start;
        }
        if let Some(end) = end {
            window.end = end;
        }
        self.windows.save()
    }

    /// Forgets an entity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the entity is unknown, or a
    /// storage error if the snapshot cannot be written.
    pub fn delete(&mut self, entity: &str) -> Result<()> {
        self.windows
            .remove(entity)
            .ok_or_else(|| not_found(entity))?;
        self.windows.save()
    }
}

fn not_found(entity: &str) -> crate::error::FlumenError {
    StoreError::NotFound {
        kind: StoreKind::Entity,
        name: entity.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_insert_then_find() {
        let dir = tempdir().unwrap();
        let mut store = EntityStore::open(dir.path()).unwrap();

        store.insert("XSHG.600519", date(2020, 1, 1), date(2020, 12, 31)).unwrap();
        let window = store.find("XSHG.600519").unwrap();
        assert_eq!(window.start, date(2020, 1, 1));
        assert_eq!(window.end, date(2020, 12, 31));
        assert!(dir.path().join(ENTITY_FILE).is_file());
    }

    #[test]
    fn test_insert_rejects_duplicates_and_inverted_windows() {
        let dir = tempdir().unwrap();
        let mut store = EntityStore::open(dir.path()).unwrap();
        store.insert("a", date(2020, 1, 1), date(2020, 2, 1)).unwrap();

        let err = store.insert("a", date(2020, 1, 1), date(2020, 2, 1)).unwrap_err();
        assert!(matches!(
            err,
            crate::FlumenError::Store(StoreError::AlreadyExists { kind: StoreKind::Entity, .. })
        ));

        let err = store.insert("b", date(2020, 2, 1), date(2020, 1, 1)).unwrap_err();
        assert!(matches!(
            err,
            crate::FlumenError::Store(StoreError::InvalidWindow { .. })
        ));
    }

    #[test]
    fn test_update_is_not_revalidated() {
        let dir = tempdir().unwrap();
        let mut store = EntityStore::open(dir.path()).unwrap();
        store.insert("a", date(2020, 1, 1), date(2020, 2, 1)).unwrap();

        store.update("a", Some(date(2021, 1, 1)), None).unwrap();
        let window = store.find("a").unwrap();
        assert!(window.end < window.start);
    }

    #[test]
    fn test_unknown_entity() {
        let dir = tempdir().unwrap();
        let mut store = EntityStore::open(dir.path()).unwrap();

        assert!(store.find("nope").is_err());
        assert!(store.update("nope", None, Some(date(2020, 1, 1))).is_err());
        assert!(store.delete("nope").is_err());
    }

    #[test]
    fn test_mutations_are_persisted() {
        let dir = tempdir().unwrap();
        {
            let mut store = EntityStore::open(dir.path()).unwrap();
            store.insert("a", date(2020, 1, 1), date(2020, 2, 1)).unwrap();
            store.insert("b", date(2020, 1, 1), date(2020, 3, 1)).unwrap();
            store.delete("a").unwrap();
        }
        let store = EntityStore::open(dir.path()).unwrap();
        assert_eq!(store.len(), 1);
        let names: Vec<_> = store.entities().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["b"]);
    }

    #[test]
    fn test_window_union() {
        let a = EntityWindow::new(date(2020, 1, 1), date(2020, 2, 1)).unwrap();
        let b = EntityWindow::new(date(2019, 6, 1), date(2020, 1, 15)).unwrap();
        assert_eq!(
            a.union(&b),
            EntityWindow::new(date(2019, 6, 1), date(2020, 2, 1)).unwrap()
        );
    }
}
