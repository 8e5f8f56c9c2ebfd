//! Mergeable `(total, count)` partial aggregates.

use std::iter::Sum;

use bytes::{Bytes, BytesMut};

use crate::codec;
use crate::errors::{Error, Result};

/// One or more raw metric observations folded together.
///
/// [`PartialObservation::merge`] is associative and commutative with
/// [`PartialObservation::default`] as identity, so partials may be combined
/// in any grouping before the final reduce.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PartialObservation {
    pub total: u64,
    pub count: u64,
}

impl PartialObservation {
    pub fn new(total: u64, count: u64) -> Self {
        Self { total, count }
    }

    /// A single observation of `metric`.
    pub fn single(metric: u64) -> Self {
        Self::new(metric, 1)
    }

    /// Saturates instead of wrapping; saturating addition on `u64` keeps the
    /// merge associative.
    pub fn merge(self, other: Self) -> Self {
        Self {
            total: self.total.saturating_add(other.total),
            count: self.count.saturating_add(other.count),
        }
    }

    pub fn average(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.total as f64 / self.count as f64)
        }
    }

    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(18);
        codec::put_vlong_unsigned(&mut buf, self.total)?;
        codec::put_vlong_unsigned(&mut buf, self.count)?;
        Ok(buf.freeze())
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut cursor = buf;
        let total = codec::get_vlong_unsigned(&mut cursor)?;
        let count = codec::get_vlong_unsigned(&mut cursor)?;
        if !cursor.is_empty() {
            return Err(Error::serialization(format!(
                "{} trailing bytes after partial observation",
                cursor.len()
            )));
        }
        Ok(Self { total, count })
    }
}

impl Sum for PartialObservation {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Self::merge)
    }
}

impl FromIterator<PartialObservation> for PartialObservation {
    fn from_iter<I: IntoIterator<Item = PartialObservation>>(iter: I) -> Self {
        iter.into_iter().sum()
    }
}
