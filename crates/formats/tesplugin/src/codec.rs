//! Reinterpretation of raw little-endian bytes as fixed-width values.
//!
//! Every function here is total: the inputs are fixed-size arrays, so there is
//! nothing to fail on. Use the [`Cursor`](crate::cursor::Cursor) for reads
//! that need bounds checking.

pub fn to_u16(b: [u8; 2]) -> u16 {
    u16::from_le_bytes(b)
}

pub fn to_i16(b: [u8; 2]) -> i16 {
    i16::from_le_bytes(b)
}

pub fn to_u32(b: [u8; 4]) -> u32 {
    u32::from_le_bytes(b)
}

pub fn to_i32(b: [u8; 4]) -> i32 {
    i32::from_le_bytes(b)
}

pub fn to_f32(b: [u8; 4]) -> f32 {
    f32::from_le_bytes(b)
}

pub fn from_u16(v: u16) -> [u8; 2] {
    v.to_le_bytes()
}

pub fn from_i16(v: i16) -> [u8; 2] {
    v.to_le_bytes()
}

pub fn from_u32(v: u32) -> [u8; 4] {
    v.to_le_bytes()
}

pub fn from_i32(v: i32) -> [u8; 4] {
    v.to_le_bytes()
}

pub fn from_f32(v: f32) -> [u8; 4] {
    v.to_le_bytes()
}

/// Copy the first two bytes of `slice` into an array, or `None` if too short.
pub fn take2(slice: &[u8]) -> Option<[u8; 2]> {
    slice.get(..2)?.try_into().ok()
}

/// Copy the first four bytes of `slice` into an array, or `None` if too short.
pub fn take4(slice: &[u8]) -> Option<[u8; 4]> {
    slice.get(..4)?.try_into().ok()
}
