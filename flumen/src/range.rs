//! Timestamp generation for a frequency over a time window.
//!
//! [`generate_range`] is the single entry point used by the calendar store.
//! Every returned range is ascending and in UTC.
//!
//! # Arithmetic frequencies
//!
//! Generated on the wall clock of a source timezone (UTC unless the caller
//! says otherwise), then converted to UTC:
//!
//! | Unit | First timestamp                          | Step            |
//! |------|------------------------------------------|-----------------|
//! | S T H D | `start`                               | `step × unit`   |
//! | W    | next Sunday on or after `start`          | `step` weeks    |
//! | M    | last day of `start`'s month              | `step` months   |
//! | Q    | last day of `start`'s quarter            | `3 × step` months |
//! | Y    | December 31 of `start`'s year            | `step` years    |
//!
//! Anchored units keep the time of day of `start`. Results are restricted to
//! the closed window `[start, end]`.
//!
//! # Market frequencies
//!
//! Market windows are date-granular: every exchange trading date from the
//! UTC date of `start` through the UTC date of `end` is covered, whatever the
//! time of day of either bound. Daily market units take every `step`-th
//! trading day (as local midnight). Sub-daily market units expand each
//! session at the cadence with right-closed bars (see [`Session::expand`]).
//!
//! [`Session::expand`]: crate::trading::Session::expand

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use chrono_tz::Tz;

use crate::error::{Result, TradingCalendarError};
use crate::frequency::{Frequency, FrequencyUnit};
use crate::trading::{TradingCalendar, localize};

/// Generates the timestamps of `freq` within `[start, end]`.
///
/// `source_tz` is the timezone whose wall clock arithmetic frequencies are
/// laid out on; it does not affect market frequencies, which use the
/// exchange's timezone.
///
/// # Errors
///
/// Returns [`TradingCalendarError`] if a market frequency names an exchange
/// the calendar does not know.
pub fn generate_range(
    freq: &Frequency,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    source_tz: Tz,
    calendar: &dyn TradingCalendar,
) -> Result<Vec<DateTime<Utc>>> {
    if end < start {
        return Ok(Vec::new());
    }
    if freq.is_market() {
        market_range(freq, start, end, calendar)
    } else {
        Ok(arithmetic_range(freq, start, end, source_tz))
    }
}

/// Generates an arithmetic frequency on the wall clock of `tz`.
///
/// Wall-clock times that do not exist in `tz` are skipped; ambiguous ones
/// resolve to the earlier instant. Market frequencies yield nothing.
pub fn arithmetic_range(
    freq: &Frequency,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    tz: Tz,
) -> Vec<DateTime<Utc>> {
    let local_start = start.with_timezone(&tz).naive_local();
    let local_end = end.with_timezone(&tz).naive_local();
    let step = freq.step();

    let naive: Vec<NaiveDateTime> = match freq.unit() {
        FrequencyUnit::Week => {
            let first = roll_to_sunday(local_start);
            fixed_steps(first, local_end, TimeDelta::weeks(i64::from(step)))
        }
        FrequencyUnit::Month => month_end_steps(local_start, local_end, 1, step),
        FrequencyUnit::Quarter => month_end_steps(local_start, local_end, 3, step),
        FrequencyUnit::Year => month_end_steps(local_start, local_end, 12, step),
        unit if unit.is_market() => Vec::new(),
        _ => match freq.cadence() {
            Some(cadence) => fixed_steps(local_start, local_end, cadence),
            None => Vec::new(),
        },
    };

    naive
        .into_iter()
        .filter_map(|t| localize(&tz, t))
        .filter(|t| *t >= start && *t <= end)
        .collect()
}

/// Expands a market frequency against `calendar`.
///
/// # Errors
///
/// Returns [`TradingCalendarError`] if the exchange is unknown or the
/// cadence has no fixed length.
pub fn market_range(
    freq: &Frequency,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    calendar: &dyn TradingCalendar,
) -> Result<Vec<DateTime<Utc>>> {
    let exchange = freq.unit().market_exchange()?;
    let cadence = freq
        .cadence()
        .ok_or_else(|| TradingCalendarError::UnsupportedCadence {
            exchange: exchange.to_string(),
            cadence: freq.canonical_unit_string(),
        })?;

    let first_day = start.date_naive();
    let last_day = end.date_naive();

    let stamps = if cadence >= TimeDelta::days(1) {
        let step = usize::try_from(freq.step()).unwrap_or(1).max(1);
        calendar
            .valid_days(exchange, first_day, last_day)?
            .into_iter()
            .step_by(step)
            .collect()
    } else {
        calendar
            .schedule(exchange, first_day, last_day)?
            .iter()
            .flat_map(|s| s.expand(cadence))
            .collect()
    };
    Ok(stamps)
}

fn fixed_steps(first: NaiveDateTime, end: NaiveDateTime, step: TimeDelta) -> Vec<NaiveDateTime> {
    let mut out = Vec::new();
    if step <= TimeDelta::zero() {
        return out;
    }
    let mut t = first;
    while t <= end {
        out.push(t);
        match t.checked_add_signed(step) {
            Some(next) => t = next,
            None => break,
        }
    }
    out
}

fn roll_to_sunday(t: NaiveDateTime) -> NaiveDateTime {
    let ahead = (7 - t.weekday().num_days_from_sunday()) % 7;
    t + TimeDelta::days(i64::from(ahead))
}

/// Month-end anchored steps. `span` is the anchor period in months: 1 for
/// months, 3 for quarters (ending Mar/Jun/Sep/Dec), 12 for years.
fn month_end_steps(
    start: NaiveDateTime,
    end: NaiveDateTime,
    span: u32,
    step: u32,
) -> Vec<NaiveDateTime> {
    let mut out = Vec::new();
    let time = start.time();

    // Months since year 0, pointing at the first anchor month on or after start.
    let month0 = start.month0();
    let anchor_month0 = (month0 / span) * span + (span - 1);
    let mut index = i64::from(start.year()) * 12 + i64::from(anchor_month0);
    let stride = i64::from(span) * i64::from(step);

    while let Some(date) = month_end(index) {
        let t = date.and_time(time);
        if t > end {
            break;
        }
        if t >= start {
            out.push(t);
        }
        index += stride;
    }
    out
}

/// Last day of the month `index` months after January of year 0.
fn month_end(index: i64) -> Option<NaiveDate> {
    let year = i32::try_from(index.div_euclid(12)).ok()?;
    let month = u32::try_from(index.rem_euclid(12)).ok()? + 1;
    NaiveDate::from_ymd_opt(year, month, 1)?
        .checked_add_months(Months::new(1))?
        .pred_opt()
}
