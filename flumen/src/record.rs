//! Fixed-width record codecs.
//!
//! Every array file in flumen is a flat run of equally sized records with no
//! header and no framing. A record's byte offset is therefore always
//! `position * Record::SIZE`, which is what lets the streaming array seek
//! straight to the bytes it needs.
//!
//! All encodings are little-endian:
//!
//! | Type            | Size | Encoding                              |
//! |-----------------|------|---------------------------------------|
//! | `f32`           | 4    | IEEE-754 single                       |
//! | `f64`           | 8    | IEEE-754 double                       |
//! | `i64`           | 8    | two's complement                      |
//! | `DateTime<Utc>` | 8    | `i64` nanoseconds since the Unix epoch|
//!
//! Timestamps outside the `i64` nanosecond range (before 1677-09-21 or after
//! 2262-04-11) have no encoding and are rejected before any byte is written.

use chrono::{DateTime, Utc};

use crate::error::StorageError;

/// A value with a fixed-width binary encoding.
pub trait Record: Copy + PartialEq + std::fmt::Debug {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Writes the encoding into `buf`, which is exactly `SIZE` bytes long.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::TimestampOutOfRange`] if the value has no
    /// encoding.
    fn encode(&self, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Reads a value back from `buf`, which is exactly `SIZE` bytes long.
    fn decode(buf: &[u8]) -> Self;
}

macro_rules! le_record {
    ($ty:ty, $size:expr) => {
        impl Record for $ty {
            const SIZE: usize = $size;

            #[inline]
            fn encode(&self, buf: &mut [u8]) -> Result<(), StorageError> {
                buf.copy_from_slice(&self.to_le_bytes());
                Ok(())
            }

            #[inline]
            fn decode(buf: &[u8]) -> Self {
                let mut bytes = [0u8; $size];
                bytes.copy_from_slice(buf);
                <$ty>::from_le_bytes(bytes)
            }
        }
    };
}

le_record!(f32, 4);
le_record!(f64, 8);
le_record!(i64, 8);

impl Record for DateTime<Utc> {
    const SIZE: usize = 8;

    #[inline]
    fn encode(&self, buf: &mut [u8]) -> Result<(), StorageError> {
        let nanos = self
            .timestamp_nanos_opt()
            .ok_or(StorageError::TimestampOutOfRange { timestamp: *self })?;
        nanos.encode(buf)
    }

    #[inline]
    fn decode(buf: &[u8]) -> Self {
        DateTime::from_timestamp_nanos(i64::decode(buf))
    }
}

/// Encodes a slice of records into one contiguous buffer.
///
/// # Errors
///
/// Returns the first encoding error; nothing is returned for partial input.
pub fn encode_all<T: Record>(values: &[T]) -> Result<Vec<u8>, StorageError> {
    let mut bytes = vec![0u8; values.len() * T::SIZE];
    for (chunk, value) in bytes.chunks_exact_mut(T::SIZE).zip(values) {
        value.encode(chunk)?;
    }
    Ok(bytes)
}

/// Decodes a buffer into records. A trailing partial record is ignored.
pub fn decode_all<T: Record>(bytes: &[u8]) -> Vec<T> {
    bytes.chunks_exact(T::SIZE).map(T::decode).collect()
}
