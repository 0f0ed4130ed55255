//! Positional ranges with end-relative (negative) bounds.
//!
//! A [`Span`] is a half-open `[start, stop)` range over record positions
//! where either bound may be omitted or negative. Negative bounds count from
//! the end of the array, so `Span::new(Some(0), Some(-1))` is "everything but
//! the last record" under [`Span::resolve`].

use std::ops::{Range, RangeFrom, RangeFull, RangeTo};

use crate::error::{Result, StorageError};

/// A half-open positional range with optional, possibly negative, bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Inclusive start; `None` means the beginning.
    pub start: Option<i64>,
    /// Exclusive stop; `None` means the end.
    pub stop: Option<i64>,
}

impl Span {
    /// Creates a span from explicit bounds.
    pub fn new(start: Option<i64>, stop: Option<i64>) -> Self {
        Self { start, stop }
    }

    /// The span covering every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Resolves the span against an array of `len` records.
    ///
    /// Bounds are clamped into `0..=len` and an inverted span resolves to an
    /// empty range at `start`, so the result can always be used to index a
    /// slice of length `len`.
    pub fn resolve(&self, len: usize) -> Range<usize> {
        let start = self.start.map_or(0, |s| clamp_bound(s, len));
        let stop = self.stop.map_or(len, |s| clamp_bound(s, len));
        start..stop.max(start)
    }
}

impl From<Range<i64>> for Span {
    fn from(range: Range<i64>) -> Self {
        Self::new(Some(range.start), Some(range.end))
    }
}

impl From<RangeFrom<i64>> for Span {
    fn from(range: RangeFrom<i64>) -> Self {
        Self::new(Some(range.start), None)
    }
}

impl From<RangeTo<i64>> for Span {
    fn from(range: RangeTo<i64>) -> Self {
        Self::new(None, Some(range.end))
    }
}

impl From<RangeFull> for Span {
    fn from(_: RangeFull) -> Self {
        Self::all()
    }
}

/// Resolves a single, possibly negative, index against `len`.
///
/// # Errors
///
/// Returns [`StorageError::IndexOutOfBounds`] if the index does not address
/// an existing record.
pub fn resolve_index(index: i64, len: usize) -> Result<usize> {
    let resolved = if index < 0 {
        i64::try_from(len).ok().and_then(|l| usize::try_from(l + index).ok())
    } else {
        usize::try_from(index).ok()
    };
    match resolved {
        Some(i) if i < len => Ok(i),
        _ => Err(StorageError::IndexOutOfBounds { index, len }.into()),
    }
}

/// Resolves an insertion point, where `len` itself (append) is valid.
///
/// # Errors
///
/// Returns [`StorageError::IndexOutOfBounds`] if the point is outside
/// `-len..=len`.
pub fn resolve_insert_point(index: i64, len: usize) -> Result<usize> {
    if usize::try_from(index).is_ok_and(|i| i == len) {
        return Ok(len);
    }
    resolve_index(index, len)
}

fn clamp_bound(bound: i64, len: usize) -> usize {
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let resolved = if bound < 0 { len_i + bound } else { bound };
    usize::try_from(resolved.clamp(0, len_i)).unwrap_or(0)
}
