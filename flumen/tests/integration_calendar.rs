//! Integration tests for calendar generation and the calendar store.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use flumen::error::StoreError;
use flumen::range::generate_range;
use flumen::{
    CalendarStore, ExchangeConfig, FlumenError, Frequency, PositionSeries, SessionCalendar,
};
use tempfile::tempdir;

fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

fn daily() -> Frequency {
    Frequency::parse("D").unwrap()
}

/// A fresh daily reference range over `[start, end]`.
fn reference(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    generate_range(
        &daily(),
        start,
        end,
        chrono_tz::UTC,
        &SessionCalendar::with_presets(),
    )
    .unwrap()
}

fn created(root: &std::path::Path) -> CalendarStore {
    let mut store = CalendarStore::open(root).unwrap();
    store.create(&daily(), date(2020, 1, 1), date(2020, 1, 31)).unwrap();
    store
}

#[test]
fn test_create_and_reopen() {
    let temp_dir = tempdir().unwrap();
    {
        let store = created(temp_dir.path());
        assert_eq!(store.len(&daily()).unwrap(), 31);
    }

    let store = CalendarStore::open(temp_dir.path()).unwrap();
    let calendar = store.calendar(&daily()).unwrap();
    assert_eq!(calendar.keys(), &reference(date(2020, 1, 1), date(2020, 1, 31))[..]);
}

#[test]
fn test_get_returns_positions_four_through_nine() {
    let temp_dir = tempdir().unwrap();
    let store = created(temp_dir.path());

    let window = store
        .get(&daily(), date(2020, 1, 5), date(2020, 1, 10))
        .unwrap();
    assert_eq!(window.keys(), reference(date(2020, 1, 5), date(2020, 1, 10)));
    assert_eq!(window.first().unwrap().1, 4);
    assert_eq!(window.last().unwrap().1, 9);
    assert_eq!(
        window,
        PositionSeries::from_keys(&reference(date(2020, 1, 5), date(2020, 1, 10)), 4)
    );
}

#[test]
fn test_double_create_fails() {
    let temp_dir = tempdir().unwrap();
    let mut store = created(temp_dir.path());

    let err = store
        .create(&daily(), date(2020, 1, 1), date(2020, 1, 31))
        .unwrap_err();
    assert!(matches!(
        err,
        FlumenError::Store(StoreError::AlreadyExists { .. })
    ));
}

#[test]
fn test_extend_to_matches_fresh_reference() {
    let temp_dir = tempdir().unwrap();
    let mut store = CalendarStore::open(temp_dir.path()).unwrap();
    store.create(&daily(), date(2020, 1, 5), date(2020, 1, 10)).unwrap();

    store.extend_to(&daily(), date(2020, 1, 15)).unwrap();
    assert_eq!(
        store.calendar(&daily()).unwrap().keys(),
        &reference(date(2020, 1, 5), date(2020, 1, 15))[..]
    );
}

#[test]
fn test_extend_to_must_move_forward() {
    let temp_dir = tempdir().unwrap();
    let mut store = created(temp_dir.path());

    for end in [date(2020, 1, 1), date(2020, 1, 31)] {
        let err = store.extend_to(&daily(), end).unwrap_err();
        assert!(matches!(
            err,
            FlumenError::Store(StoreError::NotAfterLastTimestamp { .. })
        ));
    }
    assert_eq!(store.len(&daily()).unwrap(), 31);
}

#[test]
fn test_ensure_on_missing_calendar_creates_it() {
    let temp_dir = tempdir().unwrap();
    let mut store = CalendarStore::open(temp_dir.path()).unwrap();

    store.ensure(&daily(), date(2020, 1, 1), date(2020, 1, 31)).unwrap();
    assert_eq!(
        store.calendar(&daily()).unwrap().keys(),
        &reference(date(2020, 1, 1), date(2020, 1, 31))[..]
    );
}

#[test]
fn test_drop_removes_file() {
    let temp_dir = tempdir().unwrap();
    let mut store = created(temp_dir.path());
    let path = store.calendar_path(&daily());
    assert!(path.is_file());

    store.drop(&daily()).unwrap();
    assert!(!store.contains(&daily()));
    assert!(!path.exists());

    let err = store.drop(&daily()).unwrap_err();
    assert!(matches!(err, FlumenError::Store(StoreError::NotFound { .. })));
}

#[test]
fn test_market_minute_calendar() {
    let temp_dir = tempdir().unwrap();
    let mut sse = ExchangeConfig::sse();
    sse.holidays = vec![NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()];
    let trading = Arc::new(SessionCalendar::new([sse]));

    let mut store = CalendarStore::open_with(temp_dir.path(), trading).unwrap();
    let minutes = Frequency::parse("1SSET").unwrap();
    store.create(&minutes, date(2020, 1, 1), date(2020, 1, 2)).unwrap();

    assert_eq!(store.len(&minutes).unwrap(), 4 * 60);
    assert!(temp_dir.path().join("CalendarStore/1SSET.calendar").is_file());

    // Extending by a day appends one more full session.
    store.extend_to(&minutes, date(2020, 1, 3)).unwrap();
    assert_eq!(store.len(&minutes).unwrap(), 2 * 4 * 60);
}

#[test]
fn test_market_daily_calendar_excludes_holidays() {
    let temp_dir = tempdir().unwrap();
    let mut hkex = ExchangeConfig::hkex();
    hkex.holidays = vec![
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2020, 1, 6).unwrap(),
    ];
    let trading = Arc::new(SessionCalendar::new([hkex]));

    let mut store = CalendarStore::open_with(temp_dir.path(), trading).unwrap();
    let days = Frequency::parse("HKEXD").unwrap();
    store.create(&days, date(2020, 1, 1), date(2020, 1, 10)).unwrap();

    let local: Vec<_> = store
        .calendar(&days)
        .unwrap()
        .keys()
        .iter()
        .map(|t| t.with_timezone(&chrono_tz::Asia::Hong_Kong).date_naive())
        .collect();
    let expected: Vec<_> = [2, 3, 7, 8, 9, 10]
        .into_iter()
        .map(|d| NaiveDate::from_ymd_opt(2020, 1, d).unwrap())
        .collect();
    assert_eq!(local, expected);
}
