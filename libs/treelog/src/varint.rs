//! Base-128 varints and zigzag mapping.
//!
//! Unsigned integers are split into 7-bit groups, least significant group
//! first. Every byte except the last has the high bit set. Signed integers are
//! zigzag-mapped first so that small negative numbers stay short:
//! `0 → 0, -1 → 1, 1 → 2, -2 → 3, ...`.
//!
//! This is the same encoding protobuf uses, so chunk headers and record
//! payloads share one set of primitives.

use crate::error::{Result, StreamError};

/// Longest encoding of a `u64`.
pub const MAX_VARINT_LEN: usize = 10;

#[inline]
pub fn encode_varint(mut value: u64, out: &mut Vec<u8>) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

#[inline]
pub fn encoded_len(value: u64) -> usize {
    // One byte per started group of 7 bits, at least one byte.
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Decode a varint from the front of `buf`.
///
/// Returns `Ok(None)` when `buf` ends before the varint does, so a streaming
/// caller can fetch more bytes and retry. Returns `(value, consumed)` on
/// success.
pub fn decode_varint(buf: &[u8]) -> Result<Option<(u64, usize)>> {
    let mut value = 0u64;
    for (i, &byte) in buf.iter().enumerate().take(MAX_VARINT_LEN) {
        if i == MAX_VARINT_LEN - 1 && byte > 0x01 {
            return Err(StreamError::Corrupt("varint overflows 64 bits".into()));
        }
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }
    if buf.len() >= MAX_VARINT_LEN {
        return Err(StreamError::Corrupt("varint longer than 10 bytes".into()));
    }
    Ok(None)
}

/// Decode a varint from a byte cursor, advancing it. Running out of bytes is
/// a truncation error.
pub fn read_varint(buf: &mut &[u8]) -> Result<u64> {
    match decode_varint(buf)? {
        Some((value, n)) => {
            *buf = &buf[n..];
            Ok(value)
        }
        None => Err(StreamError::Truncated("varint")),
    }
}

/// Zigzag-decoding counterpart of [`read_varint`].
pub fn read_signed(buf: &mut &[u8]) -> Result<i64> {
    read_varint(buf).map(zigzag_decode)
}

pub fn write_signed(value: i64, out: &mut Vec<u8>) {
    encode_varint(zigzag_encode(value), out);
}

#[inline]
pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

#[inline]
pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

#[inline]
pub fn zigzag_encode32(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

#[inline]
pub fn zigzag_decode32(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}
