//! # flumen
//!
//! Flat-file time-series storage for market data.
//!
//! flumen keeps three kinds of data under a root directory:
//!
//! - **Calendars**: per-frequency sequences of UTC timestamps, generated by
//!   calendar arithmetic (`D`, `15T`, `M`, ...) or by an exchange's trading
//!   sessions (`SSED`, `SSET`, `HKEXD`).
//! - **Entity windows**: the span of time each entity has data for.
//! - **Fields**: `f32` value arrays whose positions line up with a calendar's.
//!
//! Every file is a flat run of fixed-width little-endian records (or one JSON
//! snapshot for entity windows), so appends and positional reads touch only
//! the bytes they need.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chrono::{TimeZone, Utc};
//! use flumen::{Frequency, TimeSeries, TimeSeriesStore};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut store = TimeSeriesStore::open("./market_data")?;
//!
//! let daily: Frequency = "D".parse()?;
//! let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
//! let end = Utc.with_ymd_and_hms(2020, 1, 3, 0, 0, 0).unwrap();
//!
//! let series = TimeSeries::new("XSHG.600519", "close", daily.clone(), start, end, vec![
//!     1858.48, 1794.43, 1779.18,
//! ])?;
//! store.write(&series)?;
//!
//! for (timestamp, value) in store.read("XSHG.600519", "close", &daily, start, end)? {
//!     println!("{timestamp}: {value}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! Storage primitives, leaves first:
//!
//! - [`record`]: fixed-width record codecs
//! - [`span`]: positional ranges with negative bounds
//! - [`array`]: [`FixedRecordArray`], fully in memory, explicit save
//! - [`stream`]: [`StreamingRecordArray`], file-resident, seek-and-read
//! - [`keyed`]: [`KeyedRecordArray`], keys plus a derived key → position index
//! - [`map`]: [`DurableMap`], a JSON-snapshotted map
//!
//! Time:
//!
//! - [`frequency`]: the frequency grammar
//! - [`range`]: timestamp generation for a frequency and window
//! - [`trading`]: exchange trading calendars
//! - [`config`]: dataset and exchange configuration
//!
//! Stores:
//!
//! - [`calendar`]: [`CalendarStore`]
//! - [`entity`]: [`EntityStore`]
//! - [`field`]: [`FieldStore`]
//! - [`timeseries`]: [`TimeSeriesStore`], composing the three
//! - [`error`]: error types

pub mod array;
pub mod calendar;
pub mod config;
pub mod entity;
pub mod error;
pub mod field;
pub mod frequency;
pub mod keyed;
pub mod map;
pub mod range;
pub mod record;
pub mod span;
pub mod stream;
pub mod timeseries;
pub mod trading;

// Re-export primary API types at crate root for convenience.
pub use array::FixedRecordArray;
pub use calendar::CalendarStore;
pub use config::{ExchangeConfig, FlumenConfig};
pub use entity::{EntityStore, EntityWindow};
pub use error::{FlumenError, Result};
pub use field::FieldStore;
pub use frequency::{Frequency, FrequencyUnit, UnitFamily};
pub use keyed::{KeyedRecordArray, Locator, Lookup, PositionSeries, TimestampIndex};
pub use map::DurableMap;
pub use range::generate_range;
pub use record::Record;
pub use span::Span;
pub use stream::StreamingRecordArray;
pub use timeseries::{TimeSeries, TimeSeriesStore};
pub use trading::{Session, SessionCalendar, TradingCalendar};
