//! The time-series store: entity × field × frequency value streams.
//!
//! [`TimeSeriesStore`] composes the three lower stores and keeps their
//! position spaces aligned:
//!
//! - the [`CalendarStore`] gives each timestamp of a frequency a position,
//! - the [`FieldStore`] holds one value array per `(entity, field, frequency)`
//!   at file name `{entity}.{field}.{FREQ}`, where value `i` belongs to
//!   calendar position `i`,
//! - the [`EntityStore`] records the span each entity has data for.
//!
//! A write touches up to three files and is not atomic across them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::calendar::{CalendarStore, SharedTradingCalendar};
use crate::config::FlumenConfig;
use crate::entity::{EntityStore, EntityWindow};
use crate::error::{Result, StoreError};
use crate::field::FieldStore;
use crate::frequency::Frequency;
use crate::trading::SessionCalendar;

/// A value stream for one entity, field and frequency over a window.
///
/// `values[i]` belongs to the `i`-th timestamp the frequency generates for
/// `[start, end]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    /// Entity identifier (`"XSHG.600519"`).
    pub entity_id: String,
    /// Field identifier (`"close"`).
    pub field_id: String,
    /// Sampling frequency.
    pub freq: Frequency,
    /// First instant of the window.
    pub start: DateTime<Utc>,
    /// Last instant of the window.
    pub end: DateTime<Utc>,
    /// One value per generated timestamp.
    pub values: Vec<f32>,
}

impl TimeSeries {
    /// Creates a series, checking the window is not inverted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidWindow`] if `end < start`.
    pub fn new(
        entity_id: impl Into<String>,
        field_id: impl Into<String>,
        freq: Frequency,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        values: Vec<f32>,
    ) -> Result<Self> {
        EntityWindow::new(start, end)?;
        Ok(Self {
            entity_id: entity_id.into(),
            field_id: field_id.into(),
            freq,
            start,
            end,
            values,
        })
    }

    /// Returns the field file name the series is stored under.
    pub fn field_name(&self) -> String {
        field_name(&self.entity_id, &self.field_id, &self.freq)
    }
}

/// Returns the field file name for an entity, field and frequency.
pub fn field_name(entity: &str, field: &str, freq: &Frequency) -> String {
    format!("{entity}.{field}.{}", freq.raw())
}

/// Reads and writes [`TimeSeries`] under one root directory.
#[derive(Debug)]
pub struct TimeSeriesStore {
    root: PathBuf,
    calendars: CalendarStore,
    entities: EntityStore,
    fields: FieldStore,
}

impl TimeSeriesStore {
    /// Opens (or creates) a dataset at `root` with the preset exchanges.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the three stores cannot be opened.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::open_with(root, Arc::new(SessionCalendar::with_presets()))
    }

    /// Opens the dataset described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the three stores cannot be opened.
    pub fn from_config(config: &FlumenConfig) -> Result<Self> {
        Self::open_with(&config.root, Arc::new(config.trading_calendar()))
    }

    /// Opens (or creates) a dataset at `root` using `trading` for market
    /// frequencies.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the three stores cannot be opened.
    pub fn open_with<P: AsRef<Path>>(root: P, trading: SharedTradingCalendar) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|e| StoreError::DirectoryAccess {
            path: root.clone(),
            source: e,
        })?;
        let calendars = CalendarStore::open_with(&root, trading)?;
        let entities = EntityStore::open(&root)?;
        let fields = FieldStore::open(&root)?;
        Ok(Self {
            root,
            calendars,
            entities,
            fields,
        })
    }

    /// Returns the dataset root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the calendar store.
    pub fn calendars(&self) -> &CalendarStore {
        &self.calendars
    }

    /// Returns the calendar store mutably.
    pub fn calendars_mut(&mut self) -> &mut CalendarStore {
        &mut self.calendars
    }

    /// Returns the entity store.
    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    /// Returns the entity store mutably.
    pub fn entities_mut(&mut self) -> &mut EntityStore {
        &mut self.entities
    }

    /// Returns the field store.
    pub fn fields(&self) -> &FieldStore {
        &self.fields
    }

    /// Stores `series`.
    ///
    /// 1. Makes sure the frequency's calendar covers the window.
    /// 2. Locates the window's calendar positions, which must number exactly
    ///    `series.values.len()`.
    /// 3. Pads the field array with `NaN` up to the first position if it is
    ///    shorter, overwrites the values it already holds and appends the
    ///    rest.
    /// 4. Records or widens the entity's window.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::WindowBeforeCalendar`] if the window starts
    /// before the frequency's existing calendar,
    /// [`StoreError::LengthMismatch`] if the values do not line up
    /// with the calendar window, [`StoreError::NonContiguousWindow`] if the
    /// window's positions are not consecutive, or any error of the
    /// underlying stores.
    pub fn write(&mut self, series: &TimeSeries) -> Result<()> {
        let freq = &series.freq;
        self.calendars.ensure(freq, series.start, series.end)?;

        let window = self.calendars.locate(freq, series.start, series.end)?;
        if window.len() != series.values.len() {
            // Calendars are never backfilled, so the head of the window is lost.
            let first = self.calendars.calendar(freq)?.first();
            if let Some(first) = first.filter(|first| series.start < *first) {
                return Err(StoreError::WindowBeforeCalendar {
                    freq: freq.raw().to_string(),
                    start: series.start,
                    first,
                }
                .into());
            }
            return Err(StoreError::LengthMismatch {
                expected: window.len(),
                found: series.values.len(),
            }
            .into());
        }

        if let Some((_, first)) = window.first() {
            let range = window
                .contiguous_range()
                .ok_or_else(|| StoreError::NonContiguousWindow {
                    freq: freq.raw().to_string(),
                })?;
            self.write_values(&series.field_name(), first, range.end, &series.values)?;
        }

        let window = EntityWindow::new(series.start, series.end)?;
        match self.entities.find(&series.entity_id) {
            Ok(existing) => {
                let widened = existing.union(&window);
                if widened != existing {
                    self.entities.update(
                        &series.entity_id,
                        Some(widened.start),
                        Some(widened.end),
                    )?;
                }
            }
            Err(_) => self
                .entities
                .insert(&series.entity_id, window.start, window.end)?,
        }

        tracing::debug!(
            entity = %series.entity_id,
            field = %series.field_id,
            freq = %freq,
            values = series.values.len(),
            "wrote series"
        );
        Ok(())
    }

    /// Reads `(timestamp, value)` pairs of a stored series over
    /// `[start, end]`.
    ///
    /// Positions past the end of the field array are omitted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the entity, calendar or field is
    /// unknown, or a storage error.
    pub fn read(
        &self,
        entity: &str,
        field: &str,
        freq: &Frequency,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, f32)>> {
        self.entities.find(entity)?;
        let window = self.calendars.locate(freq, start, end)?;
        let name = field_name(entity, field, freq);
        let (Some((_, first)), Some((_, last))) = (window.first(), window.last()) else {
            // Still report a missing field.
            self.fields.len(&name)?;
            return Ok(Vec::new());
        };

        let values = self
            .fields
            .find(&name, to_i64(first), to_i64(last + 1))?;
        Ok(window
            .iter()
            .filter_map(|(ts, pos)| values.get(pos - first).map(|v| (ts, *v)))
            .collect())
    }

    /// Deletes the field array of an entity, field and frequency.
    ///
    /// The entity window and the calendar are left in place.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the field is unknown, or a storage
    /// error.
    pub fn remove(&mut self, entity: &str, field: &str, freq: &Frequency) -> Result<()> {
        self.fields.delete(&field_name(entity, field, freq))
    }

    fn write_values(&self, name: &str, first: usize, end: usize, values: &[f32]) -> Result<()> {
        if !self.fields.contains(name) {
            let mut padded = vec![f32::NAN; first];
            padded.extend_from_slice(values);
            return self.fields.insert(name, &padded);
        }

        let len = self.fields.len(name)?;
        if len < first {
            self.fields.append(name, &vec![f32::NAN; first - len])?;
        }
        let len = len.max(first);

        // Positions [first, overlap_end) already exist and are overwritten.
        let overlap_end = end.min(len);
        let split = overlap_end.saturating_sub(first);
        let (overwrite, append) = values.split_at(split);
        if !overwrite.is_empty() {
            self.fields
                .update(name, to_i64(first), to_i64(overlap_end), overwrite)?;
        }
        if !append.is_empty() {
            self.fields.append(name, append)?;
        }
        Ok(())
    }
}

fn to_i64(position: usize) -> i64 {
    i64::try_from(position).unwrap_or(i64::MAX)
}
