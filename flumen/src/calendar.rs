//! The calendar store: one timestamp index per frequency.
//!
//! Calendars live under `<root>/CalendarStore/` as `<FREQ>.calendar` files of
//! raw `i64` nanosecond timestamps, one file per [`Frequency`]. A calendar
//! gives every timestamp of its frequency a stable position, and those
//! positions are what field arrays are indexed by.
//!
//! Calendars only grow at the end. [`CalendarStore::extend_to`] appends
//! timestamps after the current last one, so existing positions never move.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::array::remove_file;
use crate::error::{Result, StoreError, StoreKind};
use crate::frequency::Frequency;
use crate::keyed::{PositionSeries, TimestampIndex};
use crate::range::generate_range;
use crate::trading::{SessionCalendar, TradingCalendar};

/// Subdirectory of the root holding calendar files.
pub const CALENDAR_DIR: &str = "CalendarStore";

/// File extension of calendar files.
pub const CALENDAR_EXTENSION: &str = "calendar";

/// A shareable trading calendar.
pub type SharedTradingCalendar = Arc<dyn TradingCalendar + Send + Sync>;

/// Catalogue of per-frequency calendars.
pub struct CalendarStore {
    /// The `CalendarStore` directory.
    dir: PathBuf,
    /// Loaded calendars keyed by frequency.
    calendars: BTreeMap<Frequency, TimestampIndex>,
    /// Source of exchange sessions for market frequencies.
    trading: SharedTradingCalendar,
}

impl fmt::Debug for CalendarStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalendarStore")
            .field("dir", &self.dir)
            .field("calendars", &self.calendars.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl CalendarStore {
    /// Opens the calendar store under `root` with the preset exchanges.
    ///
    /// # Errors
    ///
    /// See [`CalendarStore::open_with`].
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::open_with(root, Arc::new(SessionCalendar::with_presets()))
    }

    /// Opens the calendar store under `root`, expanding market frequencies
    /// against `trading`.
    ///
    /// Creates the directory if needed, then loads every `*.calendar` file
    /// whose stem parses as a frequency. Other files are skipped, and so are
    /// empty calendar files, which a later [`create`](Self::create) replaces.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DirectoryAccess`] if the directory cannot be
    /// created or listed, or a storage error if a calendar file cannot be
    /// read.
    pub fn open_with<P: AsRef<Path>>(root: P, trading: SharedTradingCalendar) -> Result<Self> {
        let dir = root.as_ref().join(CALENDAR_DIR);
        fs::create_dir_all(&dir).map_err(|e| StoreError::DirectoryAccess {
            path: dir.clone(),
            source: e,
        })?;

        let entries = fs::read_dir(&dir).map_err(|e| StoreError::DirectoryAccess {
            path: dir.clone(),
            source: e,
        })?;

        let mut calendars = BTreeMap::new();
        for entry in entries {
            let path = entry
                .map_err(|e| StoreError::DirectoryAccess {
                    path: dir.clone(),
                    source: e,
                })?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some(CALENDAR_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match Frequency::parse(stem) {
                Ok(freq) => {
                    let index = TimestampIndex::open(&path)?;
                    if index.is_empty() {
                        tracing::warn!(path = %path.display(), "skipping empty calendar file");
                        continue;
                    }
                    calendars.insert(freq, index);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping calendar file");
                }
            }
        }

        tracing::info!(dir = %dir.display(), calendars = calendars.len(), "opened calendar store");
        Ok(Self {
            dir,
            calendars,
            trading,
        })
    }

    /// Returns the `CalendarStore` directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the trading calendar used for market frequencies.
    pub fn trading(&self) -> &(dyn TradingCalendar + Send + Sync) {
        self.trading.as_ref()
    }

    /// Returns the file path a calendar for `freq` is stored at.
    pub fn calendar_path(&self, freq: &Frequency) -> PathBuf {
        self.dir.join(format!("{}.{CALENDAR_EXTENSION}", freq.raw()))
    }

    /// Returns `true` if a calendar exists for `freq`.
    pub fn contains(&self, freq: &Frequency) -> bool {
        self.calendars.contains_key(freq)
    }

    /// Iterates over the frequencies with a calendar, in raw-string order.
    pub fn frequencies(&self) -> impl Iterator<Item = &Frequency> {
        self.calendars.keys()
    }

    /// Returns the calendar for `freq`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if there is none.
    pub fn calendar(&self, freq: &Frequency) -> Result<&TimestampIndex> {
        self.calendars.get(freq).ok_or_else(|| not_found(freq))
    }

    /// Returns the number of timestamps in the calendar for `freq`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if there is no calendar.
    pub fn len(&self, freq: &Frequency) -> Result<usize> {
        Ok(self.calendar(freq)?.len())
    }

    /// Returns the last timestamp of the calendar for `freq`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if there is no calendar, or
    /// [`StoreError::EmptyCalendar`] if it holds no timestamps.
    pub fn last(&self, freq: &Frequency) -> Result<DateTime<Utc>> {
        self.calendar(freq)?.last().ok_or_else(|| {
            StoreError::EmptyCalendar {
                freq: freq.raw().to_string(),
            }
            .into()
        })
    }

    /// Generates and persists the calendar for `freq` over `[start, end]`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] if a calendar exists,
    /// [`StoreError::EmptyCalendar`] if the window holds no timestamps, a
    /// trading calendar error for unknown exchanges, or a storage error.
    pub fn create(
        &mut self,
        freq: &Frequency,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<()> {
        if self.contains(freq) {
            return Err(StoreError::AlreadyExists {
                kind: StoreKind::Calendar,
                name: freq.raw().to_string(),
            }
            .into());
        }

        let stamps = self.generate(freq, start, end)?;
        if stamps.is_empty() {
            return Err(StoreError::EmptyCalendar {
                freq: freq.raw().to_string(),
            }
            .into());
        }

        let mut index = TimestampIndex::open(self.calendar_path(freq))?;
        index.clear();
        index.extend(&stamps);
        if let Err(e) = index.save() {
            // Do not leave the empty file `open` created behind.
            if let Err(cleanup) = remove_file(index.path()) {
                tracing::warn!(
                    path = %index.path().display(),
                    error = %cleanup,
                    "failed to remove calendar file"
                );
            }
            return Err(e);
        }
        tracing::info!(freq = %freq, timestamps = stamps.len(), "created calendar");
        self.calendars.insert(freq.clone(), index);
        Ok(())
    }

    /// Returns `(timestamp, position)` pairs of the calendar within
    /// `[start, end]`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if there is no calendar.
    pub fn get(
        &self,
        freq: &Frequency,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<PositionSeries<DateTime<Utc>>> {
        Ok(self.calendar(freq)?.positions_between(&start, &end))
    }

    /// Returns the calendar entries a series over `[start, end]` maps to.
    ///
    /// Same as [`get`](Self::get) for arithmetic frequencies. Market windows
    /// are date-granular, so the key range is widened to cover every
    /// timestamp the frequency generates for the window, such as a trading
    /// day whose local midnight falls before `start` in UTC.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if there is no calendar, or a trading
    /// calendar error.
    pub fn locate(
        &self,
        freq: &Frequency,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<PositionSeries<DateTime<Utc>>> {
        let index = self.calendar(freq)?;
        let (mut lo, mut hi) = (start, end);
        if freq.is_market() {
            let stamps = self.generate(freq, start, end)?;
            if let (Some(first), Some(last)) = (stamps.first(), stamps.last()) {
                lo = lo.min(*first);
                hi = hi.max(*last);
            }
        }
        Ok(index.positions_between(&lo, &hi))
    }

    /// Appends the timestamps after the current last one up to `end`.
    ///
    /// Returns the number of timestamps appended.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if there is no calendar,
    /// [`StoreError::EmptyCalendar`] if it is empty,
    /// [`StoreError::NotAfterLastTimestamp`] if `end` is not strictly after
    /// the last timestamp, or a storage error.
    pub fn extend_to(&mut self, freq: &Frequency, end: DateTime<Utc>) -> Result<usize> {
        let last = self.last(freq)?;
        if end <= last {
            return Err(StoreError::NotAfterLastTimestamp { end, last }.into());
        }

        // The generated range starts at `last` itself.
        let stamps: Vec<_> = self
            .generate(freq, last, end)?
            .into_iter()
            .filter(|t| *t > last)
            .collect();

        let index = self
            .calendars
            .get_mut(freq)
            .ok_or_else(|| not_found(freq))?;
        index.extend(&stamps);
        index.save()?;
        tracing::info!(
            freq = %freq,
            appended = stamps.len(),
            total = index.len(),
            "extended calendar"
        );
        Ok(stamps.len())
    }

    /// Makes sure the calendar for `freq` covers `[start, end]` as far as
    /// possible.
    ///
    /// Creates the calendar if it is missing and extends it if `end` is past
    /// its last timestamp. A window starting before the calendar's first
    /// timestamp is not backfilled.
    ///
    /// # Errors
    ///
    /// Same as [`create`](Self::create) and [`extend_to`](Self::extend_to).
    pub fn ensure(
        &mut self,
        freq: &Frequency,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<()> {
        if !self.contains(freq) {
            return self.create(freq, start, end);
        }
        if end > self.last(freq)? {
            self.extend_to(freq, end)?;
        }
        Ok(())
    }

    /// Deletes the calendar for `freq` and its file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if there is no calendar, or a storage
    /// error if the file cannot be removed.
    pub fn drop(&mut self, freq: &Frequency) -> Result<()> {
        let mut index = self.calendars.remove(freq).ok_or_else(|| not_found(freq))?;
        index.clear();
        index.save()?;
        tracing::info!(freq = %freq, "dropped calendar");
        Ok(())
    }

    fn generate(
        &self,
        freq: &Frequency,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>> {
        generate_range(freq, start, end, chrono_tz::UTC, self.trading())
    }
}

fn not_found(freq: &Frequency) -> crate::error::FlumenError {
    StoreError::NotFound {
        kind: StoreKind::Calendar,
        name: freq.raw().to_string(),
    }
    .into()
}
