//! Utility functions shared by workloads and the engine.
//!

use anyhow::Result;
use bytes::Bytes;

/// Convert a [`String`] to [`Bytes`].
#[inline]
pub fn string_to_bytes(s: String) -> Bytes {
    Bytes::from(s)
}

/// Encodes a split's byte offset as the map input key.
#[inline]
pub fn offset_to_bytes(offset: u64) -> Bytes {
    Bytes::copy_from_slice(&offset.to_be_bytes())
}

/// Inverse of [`offset_to_bytes`].
pub fn offset_from_bytes(buf: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = buf
        .try_into()
        .map_err(|_| anyhow::anyhow!("offset key must be 8 bytes, got {}", buf.len()))?;
    Ok(u64::from_be_bytes(raw))
}

/// Formats a float as plain decimal text that always carries a fractional
/// part (`2.0`, not `2`; `0.00001`, not `1e-5`), using the shortest digits
/// that round-trip.
pub fn format_decimal(value: f64) -> String {
    let mut text = value.to_string();
    if value.is_finite() && !text.contains('.') {
        text.push_str(".0");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_roundtrip() {
        assert_eq!(offset_from_bytes(&offset_to_bytes(0)).unwrap(), 0);
        assert_eq!(offset_from_bytes(&offset_to_bytes(1 << 40)).unwrap(), 1 << 40);
        assert!(offset_from_bytes(b"short").is_err());
    }

    #[test]
    fn decimals_keep_fraction() {
        assert_eq!(format_decimal(2.0), "2.0");
        assert_eq!(format_decimal(0.0), "0.0");
        assert_eq!(format_decimal(1.5), "1.5");
        assert_eq!(format_decimal(1e-5), "0.00001");
        assert_eq!(format_decimal(1e17), "100000000000000000.0");
        assert_eq!(format_decimal(1.0 / 3.0), "0.3333333333333333");
    }

    #[test]
    fn string_to_bytes_keeps_utf8() {
        assert_eq!(string_to_bytes("héllo".to_string()).as_ref(), "héllo".as_bytes());
    }
}
