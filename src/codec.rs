//! Record, key, and value codecs.
//!
//! Three contracts cover everything the store and the tree serialize:
//!
//! - [`RecordCodec`]: whole-record encode/decode, what a [`RecordStore`]
//!   consumes. Node records and the root-reference record implement this.
//! - [`KeyCodec`]: encodes a *window* of a node's key-slot array. The codec
//!   receives `start`/`end` bounds so sentinel slots never hit the stream,
//!   and sees all keys of a node at once, which is what makes delta
//!   compression possible.
//! - [`ValueCodec`]: single-value encode/decode for leaf payloads and for
//!   outside-node value records.
//!
//! A key codec may require a specific ordering (delta codecs only work with
//! the natural order of the underlying integers); the tree checks this at
//! construction.
//!
//! [`RecordStore`]: crate::store::RecordStore

use std::sync::Arc;

use crate::error::{Result, TreeError};
use crate::order::{KeyOrder, Natural};
use crate::pack::{pack_u64, ByteReader};

// ============================================================================
//  Contracts
// ============================================================================

/// Binary codec for one record type stored under a recid.
pub trait RecordCodec<T>: Send + Sync {
    /// Append the encoded form of `value` to `out`.
    fn serialize(&self, out: &mut Vec<u8>, value: &T) -> Result<()>;

    /// Decode one value from the reader.
    fn deserialize(&self, input: &mut ByteReader<'_>) -> Result<T>;

    /// Encoded size when every record is the same length, `None` otherwise.
    fn fixed_size(&self) -> Option<usize> {
        None
    }
}

/// Codec for the key slots of one tree node.
///
/// `keys` is the node's full slot array including sentinel (`None`) slots;
/// only `keys[start..end]` is written, and those slots are guaranteed
/// non-sentinel. `deserialize` rebuilds a slot array of length `size` with
/// `None` outside the window.
pub trait KeyCodec<K>: Send + Sync {
    /// Write `keys[start..end]` to `out`.
    fn serialize(&self, out: &mut Vec<u8>, keys: &[Option<K>], start: usize, end: usize)
        -> Result<()>;

    /// Read `end - start` keys and place them at `[start..end)` of a
    /// `size`-slot array.
    fn deserialize(
        &self,
        input: &mut ByteReader<'_>,
        start: usize,
        end: usize,
        size: usize,
    ) -> Result<Vec<Option<K>>>;

    /// Ordering this codec's stream format depends on, if any.
    fn required_order(&self) -> Option<Arc<dyn KeyOrder<K>>> {
        None
    }
}

/// Binary codec for one leaf value.
pub trait ValueCodec<V>: Send + Sync {
    /// Append the encoded form of `value` to `out`.
    fn serialize(&self, out: &mut Vec<u8>, value: &V) -> Result<()>;

    /// Decode one value; the reader's `remaining()` bounds the read.
    fn deserialize(&self, input: &mut ByteReader<'_>) -> Result<V>;
}

/// Expect a `Some` key inside the serialized window.
fn expect_key<'a, K>(keys: &'a [Option<K>], i: usize) -> Result<&'a K> {
    keys[i]
        .as_ref()
        .ok_or_else(|| TreeError::Serialization(format!("sentinel key inside window at slot {i}")))
}

// ============================================================================
//  Key codecs
// ============================================================================

/// Delta-compressed codec for `u64` keys.
///
/// Writes the first key packed, then packed differences. Differences are
/// non-negative because node keys are non-decreasing in the window (equal
/// only where a split duplicated the high-key). Requires natural ordering.
#[derive(Debug, Clone, Copy, Default)]
pub struct U64DeltaKeyCodec;

impl KeyCodec<u64> for U64DeltaKeyCodec {
    fn serialize(
        &self,
        out: &mut Vec<u8>,
        keys: &[Option<u64>],
        start: usize,
        end: usize,
    ) -> Result<()> {
        if start >= end {
            return Ok(());
        }
        let mut prev = *expect_key(keys, start)?;
        pack_u64(out, prev);
        for i in start + 1..end {
            let curr = *expect_key(keys, i)?;
            let delta = curr.checked_sub(prev).ok_or_else(|| {
                TreeError::Serialization(format!("keys out of order at slot {i}"))
            })?;
            pack_u64(out, delta);
            prev = curr;
        }
        Ok(())
    }

    fn deserialize(
        &self,
        input: &mut ByteReader<'_>,
        start: usize,
        end: usize,
        size: usize,
    ) -> Result<Vec<Option<u64>>> {
        let mut keys = vec![None; size];
        if start < end {
            let mut prev = input.unpack_u64()?;
            keys[start] = Some(prev);
            for slot in keys.iter_mut().take(end).skip(start + 1) {
                prev = prev
                    .checked_add(input.unpack_u64()?)
                    .ok_or_else(|| TreeError::Serialization("key delta overflow".into()))?;
                *slot = Some(prev);
            }
        }
        Ok(keys)
    }

    fn required_order(&self) -> Option<Arc<dyn KeyOrder<u64>>> {
        Some(Arc::new(Natural))
    }
}

/// Length-prefixed UTF-8 codec for `String` keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8KeyCodec;

impl KeyCodec<String> for Utf8KeyCodec {
    fn serialize(
        &self,
        out: &mut Vec<u8>,
        keys: &[Option<String>],
        start: usize,
        end: usize,
    ) -> Result<()> {
        for i in start..end {
            let key = expect_key(keys, i)?;
            pack_u64(out, key.len() as u64);
            out.extend_from_slice(key.as_bytes());
        }
        Ok(())
    }

    fn deserialize(
        &self,
        input: &mut ByteReader<'_>,
        start: usize,
        end: usize,
        size: usize,
    ) -> Result<Vec<Option<String>>> {
        let mut keys = vec![None; size];
        for slot in keys.iter_mut().take(end).skip(start) {
            let len = usize::try_from(input.unpack_u64()?)
                .map_err(|_| TreeError::Serialization("key length overflow".into()))?;
            let bytes = input.read_exact(len)?;
            let key = std::str::from_utf8(bytes)
                .map_err(|e| TreeError::Serialization(format!("invalid UTF-8 key: {e}")))?;
            *slot = Some(key.to_owned());
        }
        Ok(keys)
    }
}

// ============================================================================
//  Value codecs
// ============================================================================

/// Packed-varint codec for `u64` values.
#[derive(Debug, Clone, Copy, Default)]
pub struct U64ValueCodec;

impl ValueCodec<u64> for U64ValueCodec {
    fn serialize(&self, out: &mut Vec<u8>, value: &u64) -> Result<()> {
        pack_u64(out, *value);
        Ok(())
    }

    fn deserialize(&self, input: &mut ByteReader<'_>) -> Result<u64> {
        input.unpack_u64()
    }
}

/// Length-prefixed UTF-8 codec for `String` values.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8ValueCodec;

impl ValueCodec<String> for Utf8ValueCodec {
    fn serialize(&self, out: &mut Vec<u8>, value: &String) -> Result<()> {
        pack_u64(out, value.len() as u64);
        out.extend_from_slice(value.as_bytes());
        Ok(())
    }

    fn deserialize(&self, input: &mut ByteReader<'_>) -> Result<String> {
        let len = usize::try_from(input.unpack_u64()?)
            .map_err(|_| TreeError::Serialization("value length overflow".into()))?;
        let bytes = input.read_exact(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|e| TreeError::Serialization(format!("invalid UTF-8 value: {e}")))
    }
}

/// Length-prefixed codec for raw byte values.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesValueCodec;

impl ValueCodec<Vec<u8>> for BytesValueCodec {
    fn serialize(&self, out: &mut Vec<u8>, value: &Vec<u8>) -> Result<()> {
        pack_u64(out, value.len() as u64);
        out.extend_from_slice(value);
        Ok(())
    }

    fn deserialize(&self, input: &mut ByteReader<'_>) -> Result<Vec<u8>> {
        let len = usize::try_from(input.unpack_u64()?)
            .map_err(|_| TreeError::Serialization("value length overflow".into()))?;
        Ok(input.read_exact(len)?.to_vec())
    }
}

// ============================================================================
//  Record codecs
// ============================================================================

/// Record codec for a bare recid, used by the root-reference record.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecidCodec;

impl RecordCodec<u64> for RecidCodec {
    fn serialize(&self, out: &mut Vec<u8>, value: &u64) -> Result<()> {
        pack_u64(out, *value);
        Ok(())
    }

    fn deserialize(&self, input: &mut ByteReader<'_>) -> Result<u64> {
        input.unpack_u64()
    }
}

/// Record codec that stores one value through a [`ValueCodec`].
///
/// Used for outside-node value records.
pub struct ValueRecordCodec<V> {
    codec: Arc<dyn ValueCodec<V>>,
}

impl<V> ValueRecordCodec<V> {
    /// Wrap a value codec.
    #[must_use]
    pub fn new(codec: Arc<dyn ValueCodec<V>>) -> Self {
        Self { codec }
    }
}

impl<V: Send + Sync> RecordCodec<V> for ValueRecordCodec<V> {
    fn serialize(&self, out: &mut Vec<u8>, value: &V) -> Result<()> {
        self.codec.serialize(out, value)
    }

    fn deserialize(&self, input: &mut ByteReader<'_>) -> Result<V> {
        self.codec.deserialize(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_codec_roundtrip_with_duplicated_high_key() {
        // Split duplicates the high key, so the last delta may be zero.
        let keys = vec![None, Some(3u64), Some(9), Some(9)];
        let codec = U64DeltaKeyCodec;

        let mut buf = Vec::new();
        codec.serialize(&mut buf, &keys, 1, 4).unwrap();

        let mut reader = ByteReader::new(&buf);
        let back = codec.deserialize(&mut reader, 1, 4, 4).unwrap();
        assert_eq!(back, keys);
    }

    #[test]
    fn delta_codec_empty_window() {
        let keys: Vec<Option<u64>> = vec![None, None];
        let codec = U64DeltaKeyCodec;

        let mut buf = Vec::new();
        codec.serialize(&mut buf, &keys, 1, 1).unwrap();
        assert!(buf.is_empty());

        let mut reader = ByteReader::new(&buf);
        let back = codec.deserialize(&mut reader, 1, 1, 2).unwrap();
        assert_eq!(back, keys);
    }

    #[test]
    fn delta_codec_rejects_disorder() {
        let keys = vec![Some(9u64), Some(3)];
        let mut buf = Vec::new();
        assert!(U64DeltaKeyCodec.serialize(&mut buf, &keys, 0, 2).is_err());
    }

    #[test]
    fn utf8_key_codec_roundtrip() {
        let keys = vec![None, Some("alpha".to_owned()), Some("beta".to_owned()), None];
        let codec = Utf8KeyCodec;

        let mut buf = Vec::new();
        codec.serialize(&mut buf, &keys, 1, 3).unwrap();

        let mut reader = ByteReader::new(&buf);
        let back = codec.deserialize(&mut reader, 1, 3, 4).unwrap();
        assert_eq!(back, keys);
    }

    #[test]
    fn value_codecs_roundtrip() {
        let mut buf = Vec::new();
        Utf8ValueCodec.serialize(&mut buf, &"hello".to_owned()).unwrap();
        U64ValueCodec.serialize(&mut buf, &77).unwrap();
        BytesValueCodec.serialize(&mut buf, &vec![1, 2, 3]).unwrap();

        let mut reader = ByteReader::new(&buf);
        assert_eq!(Utf8ValueCodec.deserialize(&mut reader).unwrap(), "hello");
        assert_eq!(U64ValueCodec.deserialize(&mut reader).unwrap(), 77);
        assert_eq!(BytesValueCodec.deserialize(&mut reader).unwrap(), vec![1, 2, 3]);
        assert_eq!(reader.remaining(), 0);
    }
}
