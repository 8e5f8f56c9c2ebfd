//! The composite `(entity, bucket)` grouping key.
//!
//! Encoded as a vlong length prefix, the UTF-8 entity bytes, then the bucket
//! as a 4-byte big-endian `i32`. [`compare_encoded`] orders encoded keys the
//! same way [`Ord`] orders decoded ones, reading only the length prefix to
//! find where the bucket starts.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec;
use crate::errors::{Error, Result};

/// Multiplier used to fold the entity hash into the bucket hash.
const HASH_MULTIPLIER: i32 = 163;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompositeKey {
    pub entity_id: String,
    pub bucket: i32,
}

impl CompositeKey {
    pub fn new(entity_id: impl Into<String>, bucket: i32) -> Self {
        Self {
            entity_id: entity_id.into(),
            bucket,
        }
    }

    pub fn encoded_len(&self) -> usize {
        let id_len = self.entity_id.len();
        codec::vlong_size(id_len as i64) + id_len + 4
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    pub fn encode_into<B: BufMut>(&self, buf: &mut B) {
        codec::put_vlong(buf, self.entity_id.len() as i64);
        buf.put_slice(self.entity_id.as_bytes());
        buf.put_i32(self.bucket);
    }

    /// Decodes a key produced by [`CompositeKey::encode`]. The whole buffer
    /// must be consumed.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let (id, bucket, consumed) = split_encoded(buf)?;
        if consumed != buf.len() {
            return Err(Error::serialization(format!(
                "{} trailing bytes after composite key",
                buf.len() - consumed
            )));
        }
        let entity_id = std::str::from_utf8(id).map_err(Error::serialization)?;
        Ok(Self::new(entity_id, bucket))
    }

    /// Stable hash of the key: the entity hash scaled by a constant plus the
    /// bucket. Matches the hash codes of the writable types the encoding
    /// mirrors, so partitions line up with a JVM substrate.
    pub fn hash_code(&self) -> i32 {
        let id_hash = self
            .entity_id
            .as_bytes()
            .iter()
            .fold(1i32, |h, &b| h.wrapping_mul(31).wrapping_add(b as i8 as i32));
        id_hash
            .wrapping_mul(HASH_MULTIPLIER)
            .wrapping_add(self.bucket)
    }
}

impl Ord for CompositeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.entity_id
            .as_bytes()
            .cmp(other.entity_id.as_bytes())
            .then(self.bucket.cmp(&other.bucket))
    }
}

impl PartialOrd for CompositeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for CompositeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_i32(self.hash_code());
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.entity_id, self.bucket)
    }
}

/// Splits an encoded key into its raw entity bytes and bucket, returning
/// how many bytes the key occupied.
fn split_encoded(buf: &[u8]) -> Result<(&[u8], i32, usize)> {
    let mut cursor = buf;
    let id_len = codec::get_vlong(&mut cursor)?;
    let id_len = usize::try_from(id_len)
        .map_err(|_| Error::serialization(format!("negative entity length {id_len}")))?;
    let prefix = buf.len() - cursor.len();
    if cursor.len() < id_len {
        return Err(Error::serialization(format!(
            "entity length {id_len} exceeds the {} bytes left",
            cursor.len()
        )));
    }
    let (id, mut rest) = cursor.split_at(id_len);
    let bucket = codec::get_i32(&mut rest)?;
    Ok((id, bucket, prefix + id_len + 4))
}

/// The entity bytes and bucket of a buffer holding exactly one key.
fn key_fields(buf: &[u8]) -> Option<(&[u8], i32)> {
    match split_encoded(buf) {
        Ok((id, bucket, consumed)) if consumed == buf.len() => Some((id, bucket)),
        _ => None,
    }
}

/// Raw comparator over encoded keys.
///
/// Entity bytes compare lexicographically (the length prefix is skipped, so
/// `"b"` still sorts after `"aa"`), ties are broken numerically on the
/// bucket. Buffers that do not hold exactly one key sort after every key,
/// in byte order among themselves, so the order stays total; decoding them
/// later reports the corruption.
pub fn compare_encoded(a: &[u8], b: &[u8]) -> Ordering {
    match (key_fields(a), key_fields(b)) {
        (Some((id_a, bucket_a)), Some((id_b, bucket_b))) => {
            id_a.cmp(id_b).then(bucket_a.cmp(&bucket_b))
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}
