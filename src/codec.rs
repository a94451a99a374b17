//! Low-level byte encoding for the field types in spec.md §4.1.
//!
//! Each function operates on a slice already sized exactly to the field's
//! on-disk width (the derive macro computes and slices the offsets); these
//! functions only know how to turn one value into bytes and back, the way
//! `byteorder` primitives do for plain integers.

use byteorder::{ByteOrder, LittleEndian};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

use crate::schema::Enum32;

pub fn write_i32_le(buf: &mut [u8], v: &i32) {
    LittleEndian::write_i32(buf, *v);
}

pub fn read_i32_le(buf: &[u8]) -> i32 {
    LittleEndian::read_i32(buf)
}

pub fn write_bool(buf: &mut [u8], v: &bool) {
    buf[0] = if *v { 0x01 } else { 0x00 };
}

pub fn read_bool(buf: &[u8]) -> bool {
    buf[0] != 0x00
}

/// `rust_decimal`'s serialized form is four little-endian `u32` words
/// (flags, lo, mid, hi) — exactly the "128-bit decimal" layout in
/// spec.md §4.1.
pub fn write_decimal(buf: &mut [u8], v: &Decimal) {
    buf[..16].copy_from_slice(&v.serialize());
}

pub fn read_decimal(buf: &[u8]) -> Decimal {
    let mut raw = [0u8; 16];
    raw.copy_from_slice(&buf[..16]);
    Decimal::deserialize(raw)
}

const TICKS_PER_SECOND: i64 = 10_000_000;

/// Persists as UTC ticks (100ns intervals since the Unix epoch); `kind` is
/// always UTC on read, per spec.md §3.
pub fn write_timestamp(buf: &mut [u8], v: &DateTime<Utc>) {
    let ticks = v.timestamp() * TICKS_PER_SECOND + i64::from(v.timestamp_subsec_nanos()) / 100;
    LittleEndian::write_i64(buf, ticks);
}

pub fn read_timestamp(buf: &[u8]) -> DateTime<Utc> {
    let ticks = LittleEndian::read_i64(buf);
    let secs = ticks.div_euclid(TICKS_PER_SECOND);
    let nanos = (ticks.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
    Utc.timestamp_opt(secs, nanos)
        .single()
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().expect("epoch is valid"))
}

pub fn write_enum32<E: Enum32>(buf: &mut [u8], v: &E) {
    LittleEndian::write_i32(buf, v.to_i32());
}

pub fn read_enum32<E: Enum32>(buf: &[u8]) -> E {
    E::from_i32(LittleEndian::read_i32(buf))
}

/// Truncates `s` at the greatest UTF-8 character boundary that still fits
/// in `buf`, zero-pads the remainder. The engine's only lossy operation,
/// performed silently per spec.md §4.1.
pub fn write_string_field(buf: &mut [u8], v: &String) {
    let max_len = buf.len();
    let cut = floor_char_boundary(v, max_len);
    let bytes = &v.as_bytes()[..cut];
    buf[..cut].copy_from_slice(bytes);
    for b in &mut buf[cut..] {
        *b = 0;
    }
}

/// Reads bytes up to (not including) the first `0x00`.
pub fn read_string_field(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut idx = index;
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
