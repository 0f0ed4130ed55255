//! Integration tests for the storage primitives.
//!
//! These tests go through the public API only and check that data written by
//! one handle is what a fresh handle reads back from disk.

use chrono::{DateTime, TimeZone, Utc};
use flumen::error::StorageError;
use flumen::{
    DurableMap, FixedRecordArray, FlumenError, Locator, PositionSeries, Span,
    StreamingRecordArray, TimestampIndex,
};
use tempfile::tempdir;

fn ts(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2022, 1, day, 0, 0, 0).unwrap()
}

#[test]
fn test_fixed_array_save_load_round_trip() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("values.arr");

    {
        let mut array = FixedRecordArray::<f64>::open(&path).unwrap();
        array.extend(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        array.delete(0).unwrap();
        array.save().unwrap();
    }

    let array = FixedRecordArray::<f64>::open(&path).unwrap();
    assert_eq!(array.as_slice(), &[2.0, 3.0, 4.0, 5.0]);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 4 * 8);
}

#[test]
fn test_streaming_append_then_read_all() {
    let temp_dir = tempdir().unwrap();
    let array = StreamingRecordArray::<f32>::new(temp_dir.path().join("values.field"));

    let values: Vec<f32> = (0..1000).map(|i| i as f32 * 0.5).collect();
    for chunk in values.chunks(100) {
        array.extend(chunk).unwrap();
    }

    assert_eq!(array.len().unwrap(), 1000);
    assert_eq!(array.get_range(0..1000).unwrap(), values);
    assert_eq!(array.get_range(Span::all()).unwrap(), values);
    assert_eq!(array.get_range(990..).unwrap(), values[990..].to_vec());

    // A second handle on the same file sees the same data.
    let other = StreamingRecordArray::<f32>::new(array.path());
    assert_eq!(other.get(-1).unwrap(), 499.5);
}

#[test]
fn test_streaming_delete_shifts_reads_down() {
    let temp_dir = tempdir().unwrap();
    let array = StreamingRecordArray::<i64>::new(temp_dir.path().join("ints.arr"));
    array.extend(&[10, 20, 30, 40]).unwrap();

    assert_eq!(array.delete(0).unwrap(), 10);
    assert_eq!(array.get(0).unwrap(), 20);
    assert_eq!(array.get_range(0..3).unwrap(), vec![20, 30, 40]);

    let err = array.get(3).unwrap_err();
    assert!(matches!(
        err,
        FlumenError::Storage(StorageError::IndexOutOfBounds { index: 3, len: 3 })
    ));
}

#[test]
fn test_timestamp_index_persists_and_reindexes() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("D.calendar");

    {
        let mut index = TimestampIndex::open(&path).unwrap();
        index.insert(Locator::Key(ts(1)), &[ts(1), ts(2), ts(3)]).unwrap();
        index.save().unwrap();
    }

    let mut index = TimestampIndex::open(&path).unwrap();
    assert_eq!(index.series(), PositionSeries::from_keys(&[ts(1), ts(2), ts(3)], 0));

    let err = index.insert(Locator::Key(ts(9)), &[ts(4)]).unwrap_err();
    assert!(matches!(
        err,
        FlumenError::Storage(StorageError::UnresolvableKey { .. })
    ));

    let err = index
        .insert(Locator::KeyRange(ts(1), ts(2)), &[ts(4)])
        .unwrap_err();
    assert!(matches!(
        err,
        FlumenError::Storage(StorageError::InvalidLocator { .. })
    ));

    index.delete(Locator::Position(0)).unwrap();
    assert_eq!(index.position_of(&ts(2)).unwrap(), 0);
}

#[test]
fn test_durable_map_round_trip() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("map.json");

    {
        let mut map = DurableMap::<String, (i64, i64)>::open(&path).unwrap();
        map.insert("a".to_string(), (1, 2));
        map.insert("b".to_string(), (3, 4));
        map.save().unwrap();
    }

    let map = DurableMap::<String, (i64, i64)>::open(&path).unwrap();
    let entries: Vec<_> = map.iter().map(|(k, v)| (k.clone(), *v)).collect();
    assert_eq!(
        entries,
        vec![("a".to_string(), (1, 2)), ("b".to_string(), (3, 4))]
    );
}

#[test]
fn test_empty_map_file_loads_empty() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("map.json");
    std::fs::write(&path, b"").unwrap();

    let map = DurableMap::<String, i64>::open(&path).unwrap();
    assert!(map.is_empty());
}
