//! Error types for the flumen storage engine.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// The main error type for all flumen operations.
///
/// Each variant wraps the error enum of one layer of the engine, so callers
/// can match broadly (`FlumenError::Store(_)`) or precisely
/// (`FlumenError::Store(StoreError::NotFound { .. })`).
#[derive(Error, Debug)]
pub enum FlumenError {
    /// Error parsing or interpreting a frequency string.
    #[error("frequency error: {0}")]
    Frequency(#[from] FrequencyError),

    /// Error in one of the primitive record storages.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Error in one of the calendar, entity, field or time-series stores.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error returned by a trading calendar.
    #[error("trading calendar error: {0}")]
    TradingCalendar(#[from] TradingCalendarError),

    /// Error loading or validating configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors produced by the frequency grammar.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrequencyError {
    /// The string is not of the form `<digits><letters>`.
    #[error("invalid frequency: {input}")]
    InvalidFrequency {
        /// The uppercased input string.
        input: String,
    },

    /// The unit token is not a known frequency unit.
    #[error("invalid frequency unit: {unit}")]
    InvalidUnit {
        /// The unrecognized unit token.
        unit: String,
    },

    /// An exchange-only accessor was called on an arithmetic unit.
    #[error("frequency unit {unit} is not an exchange frequency")]
    NotMarketUnit {
        /// The unit token.
        unit: String,
    },
}

/// Errors produced by the primitive record storages (arrays and maps).
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to read a backing file.
    #[error("failed to read '{}': {source}", path.display())]
    ReadFailed {
        /// The backing file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a backing file.
    #[error("failed to write '{}' at offset {offset}: {source}", path.display())]
    WriteFailed {
        /// The backing file path.
        path: PathBuf,
        /// The byte offset where the write started.
        offset: u64,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to remove a backing file.
    #[error("failed to remove '{}': {source}", path.display())]
    RemoveFailed {
        /// The backing file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A positional index is outside the array.
    #[error("index {index} is out of bounds for length {len}")]
    IndexOutOfBounds {
        /// The requested (possibly negative) index.
        index: i64,
        /// The array length.
        len: usize,
    },

    /// A key lookup found no matching entry.
    #[error("key not found: {key}")]
    KeyNotFound {
        /// The key, rendered for display.
        key: String,
    },

    /// A key passed as an insertion point does not resolve to a position.
    #[error("index {key} not found")]
    UnresolvableKey {
        /// The key, rendered for display.
        key: String,
    },

    /// The locator kind is not accepted by the operation.
    #[error("invalid locator: {reason}")]
    InvalidLocator {
        /// Why the locator was rejected.
        reason: String,
    },

    /// A replacement slice has a different length than its target range.
    #[error("cannot assign {found} values to a range of {expected} records")]
    LengthMismatch {
        /// Number of records in the target range.
        expected: usize,
        /// Number of values supplied.
        found: usize,
    },

    /// A timestamp has no `i64` nanosecond encoding.
    #[error("timestamp {timestamp} is outside the storable range (1677-09-21 to 2262-04-11)")]
    TimestampOutOfRange {
        /// The rejected timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Failed to serialize a map snapshot.
    #[error("failed to serialize '{}': {source}", path.display())]
    Serialize {
        /// The backing file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A map snapshot is present but malformed.
    #[error("failed to parse '{}': {source}", path.display())]
    Deserialize {
        /// The backing file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// The kind of object a store operation addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// A frequency calendar.
    Calendar,
    /// An entity validity window.
    Entity,
    /// A field value array.
    Field,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreKind::Calendar => "calendar",
            StoreKind::Entity => "entity",
            StoreKind::Field => "field",
        };
        f.write_str(name)
    }
}

/// Errors produced by the calendar, entity, field and time-series stores.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store directory could not be created or listed.
    #[error("failed to access store directory '{}': {source}", path.display())]
    DirectoryAccess {
        /// The directory path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Create/insert addressed an object that is already present.
    #[error("{kind} {name} already exists")]
    AlreadyExists {
        /// What kind of object.
        kind: StoreKind,
        /// Its identifier.
        name: String,
    },

    /// An operation addressed an object that is absent.
    #[error("{kind} {name} does not exist")]
    NotFound {
        /// What kind of object.
        kind: StoreKind,
        /// Its identifier.
        name: String,
    },

    /// A validity window ends before it starts.
    #[error("window end {end} is before start {start}")]
    InvalidWindow {
        /// Window start.
        start: DateTime<Utc>,
        /// Window end.
        end: DateTime<Utc>,
    },

    /// A calendar extension does not move past the current last timestamp.
    #[error("end datetime {end} must be greater than current end datetime {last}")]
    NotAfterLastTimestamp {
        /// Requested new end.
        end: DateTime<Utc>,
        /// Current last calendar timestamp.
        last: DateTime<Utc>,
    },

    /// A calendar exists but holds no timestamps.
    #[error("calendar {freq} is empty")]
    EmptyCalendar {
        /// The frequency string.
        freq: String,
    },

    /// The calendar positions of a window are not consecutive.
    #[error("calendar {freq} has a gap inside the requested window")]
    NonContiguousWindow {
        /// The frequency string.
        freq: String,
    },

    /// A series window starts before the first timestamp of its calendar.
    #[error("calendar {freq} starts at {first}, after the window start {start}")]
    WindowBeforeCalendar {
        /// The frequency string.
        freq: String,
        /// Requested window start.
        start: DateTime<Utc>,
        /// First calendar timestamp.
        first: DateTime<Utc>,
    },

    /// A value series does not line up with the calendar window it targets.
    #[error("series has {found} values but the calendar window holds {expected} timestamps")]
    LengthMismatch {
        /// Timestamps in the calendar window.
        expected: usize,
        /// Values supplied.
        found: usize,
    },
}

/// Errors returned by a [`TradingCalendar`](crate::trading::TradingCalendar).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TradingCalendarError {
    /// No calendar is configured for the exchange code.
    #[error("unknown exchange: {exchange}")]
    UnknownExchange {
        /// The exchange code.
        exchange: String,
    },

    /// The cadence cannot be expanded over a session schedule.
    #[error("unsupported market cadence {cadence} for exchange {exchange}")]
    UnsupportedCadence {
        /// The exchange code.
        exchange: String,
        /// The canonical cadence string.
        cadence: String,
    },
}

/// Errors produced while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config '{}': {source}", path.display())]
    Read {
        /// The config file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for the expected shape.
    #[error("failed to parse config '{}': {source}", path.display())]
    Parse {
        /// The config file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// An exchange definition is inconsistent.
    #[error("invalid exchange {code}: {reason}")]
    InvalidExchange {
        /// The exchange code.
        code: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// Type alias for `Result<T, FlumenError>`.
pub type Result<T> = std::result::Result<T, FlumenError>;
