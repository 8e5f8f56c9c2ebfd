//! Binary encodings for intermediate keys and values.
//!
//! Integers use the zero-compressed variable-length layout of Hadoop
//! writables: values in `-112..=127` take a single byte, anything else is a
//! marker byte (carrying sign and length) followed by up to eight big-endian
//! magnitude bytes.

use bytes::{Buf, BufMut};

use crate::errors::{Error, Result};

const ONE_BYTE_MIN: i64 = -112;
const ONE_BYTE_MAX: i64 = 127;

/// Number of bytes `value` occupies once encoded with [`put_vlong`].
pub fn vlong_size(value: i64) -> usize {
    if (ONE_BYTE_MIN..=ONE_BYTE_MAX).contains(&value) {
        return 1;
    }
    let magnitude = (if value < 0 { !value } else { value }) as u64;
    let data_bytes = 8 - (magnitude.leading_zeros() as usize) / 8;
    1 + data_bytes
}

/// Total encoded size (marker included) announced by the first byte of a vlong.
#[inline]
pub fn decode_vint_size(first: u8) -> usize {
    let first = first as i8 as i64;
    if first >= ONE_BYTE_MIN {
        1
    } else if first < -120 {
        (-119 - first) as usize
    } else {
        (-111 - first) as usize
    }
}

#[inline]
fn is_negative_vint(first: u8) -> bool {
    let first = first as i8 as i64;
    first < -120 || (ONE_BYTE_MIN..0).contains(&first)
}

pub fn put_vlong<B: BufMut>(buf: &mut B, value: i64) {
    if (ONE_BYTE_MIN..=ONE_BYTE_MAX).contains(&value) {
        buf.put_i8(value as i8);
        return;
    }
    let (magnitude, base) = if value < 0 {
        ((!value) as u64, -120i64)
    } else {
        (value as u64, -112i64)
    };
    let data_bytes = vlong_size(value) - 1;
    buf.put_i8((base - data_bytes as i64) as i8);
    for idx in (0..data_bytes).rev() {
        buf.put_u8((magnitude >> (idx * 8)) as u8);
    }
}

pub fn get_vlong<B: Buf>(buf: &mut B) -> Result<i64> {
    if !buf.has_remaining() {
        return Err(Error::serialization("unexpected end of buffer reading vlong"));
    }
    let first = buf.get_u8();
    let size = decode_vint_size(first);
    if size == 1 {
        return Ok(first as i8 as i64);
    }
    if buf.remaining() < size - 1 {
        return Err(Error::serialization(format!(
            "vlong needs {} more bytes, {} left",
            size - 1,
            buf.remaining()
        )));
    }
    let mut magnitude: u64 = 0;
    for _ in 1..size {
        magnitude = (magnitude << 8) | buf.get_u8() as u64;
    }
    let value = magnitude as i64;
    Ok(if is_negative_vint(first) { !value } else { value })
}

/// Reads a vlong that must fit a non-negative `u64` field.
pub fn get_vlong_unsigned<B: Buf>(buf: &mut B) -> Result<u64> {
    let value = get_vlong(buf)?;
    u64::try_from(value).map_err(|_| Error::serialization(format!("negative value {value}")))
}

/// Writes a non-negative `u64`. Values above `i64::MAX` cannot be represented.
pub fn put_vlong_unsigned<B: BufMut>(buf: &mut B, value: u64) -> Result<()> {
    let value = i64::try_from(value)
        .map_err(|_| Error::serialization(format!("{value} exceeds the vlong range")))?;
    put_vlong(buf, value);
    Ok(())
}

pub fn get_i32<B: Buf>(buf: &mut B) -> Result<i32> {
    if buf.remaining() < 4 {
        return Err(Error::serialization("unexpected end of buffer reading i32"));
    }
    Ok(buf.get_i32())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use proptest::prelude::*;

    fn encode(value: i64) -> Vec<u8> {
        let mut buf = BytesMut::new();
        put_vlong(&mut buf, value);
        buf.to_vec()
    }

    #[test]
    fn small_values_take_one_byte() {
        assert_eq!(encode(0), vec![0]);
        assert_eq!(encode(127), vec![127]);
        assert_eq!(encode(-112), vec![0x90]);
    }

    #[test]
    fn matches_hadoop_layout() {
        // 128 -> marker -113, one data byte
        assert_eq!(encode(128), vec![0x8f, 0x80]);
        // 300 -> marker -114, two data bytes
        assert_eq!(encode(300), vec![0x8e, 0x01, 0x2c]);
        // -113 -> complement 112, marker -121
        assert_eq!(encode(-113), vec![0x87, 0x70]);
    }

    #[test]
    fn size_agrees_with_marker() {
        for value in [0, 127, 128, 255, 256, 65_536, -113, -1_000_000, i64::MAX, i64::MIN] {
            let bytes = encode(value);
            assert_eq!(bytes.len(), vlong_size(value), "value {value}");
            assert_eq!(decode_vint_size(bytes[0]), bytes.len(), "value {value}");
        }
    }

    #[test]
    fn truncated_input_is_an_error() {
        let bytes = encode(1_000_000);
        let mut short = &bytes[..bytes.len() - 1];
        assert!(matches!(get_vlong(&mut short), Err(Error::Serialization(_))));

        let mut empty: &[u8] = &[];
        assert!(get_vlong(&mut empty).is_err());
        assert!(get_i32(&mut &[0u8, 1][..]).is_err());
    }

    #[test]
    fn unsigned_rejects_out_of_range() {
        let mut buf = BytesMut::new();
        assert!(put_vlong_unsigned(&mut buf, u64::MAX).is_err());

        let bytes = encode(-5);
        assert!(get_vlong_unsigned(&mut &bytes[..]).is_err());
    }

    proptest! {
        #[test]
        fn vlong_roundtrip(value in any::<i64>()) {
            let bytes = encode(value);
            let mut cursor = &bytes[..];
            prop_assert_eq!(get_vlong(&mut cursor).unwrap(), value);
            prop_assert!(cursor.is_empty());
        }
    }
}
