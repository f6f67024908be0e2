//! zlib handling for compressed record payloads.
//!
//! Payloads are stored as a u32 uncompressed size followed by a zlib stream.
//! Some vendor-produced files carry a wrong Adler-32 trailer on otherwise
//! valid streams; those are accepted with a warning. Everything else that
//! goes wrong while inflating is fatal for the file.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};
use tracing::warn;

/// Largest inflate-to-deflate size ratio reserved up front; the buffer grows
/// past it only as data actually arrives.
const RESERVE_RATIO: usize = 16;

/// Reusable decompression buffer, owned by whoever drives a parse.
#[derive(Debug, Default)]
pub struct Scratch {
    buf: Vec<u8>,
}

impl Scratch {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Why an inflate attempt failed.
#[derive(Debug)]
pub enum InflateFailure {
    /// The stream is not zlib or the deflate data is corrupt.
    Corrupt(String),
    /// The stream decoded to a different length than the record declared.
    Length { actual: usize },
}

/// Outcome of a successful inflate.
#[derive(Debug, PartialEq, Eq)]
pub enum Checksum {
    Valid,
    /// The Adler-32 trailer was missing or disagreed with the data.
    Mismatch,
}

/// Inflate a zlib stream into `scratch`, expecting exactly `expected` bytes.
///
/// Returns the inflated bytes (borrowed from `scratch`) and the checksum
/// verdict. Checksum mismatches are reported, not rejected.
pub fn inflate<'s>(
    input: &[u8],
    expected: usize,
    scratch: &'s mut Scratch,
) -> Result<(&'s [u8], Checksum), InflateFailure> {
    if input.len() < 2 {
        return Err(InflateFailure::Corrupt("stream shorter than zlib header".into()));
    }
    let (cmf, flg) = (input[0], input[1]);
    if cmf & 0x0F != 8 || (u16::from(cmf) << 8 | u16::from(flg)) % 31 != 0 {
        return Err(InflateFailure::Corrupt(format!(
            "bad zlib header {cmf:02X} {flg:02X}"
        )));
    }
    if flg & 0x20 != 0 {
        return Err(InflateFailure::Corrupt("preset dictionary not supported".into()));
    }

    // Raw deflate over the body so the trailer can be checked by hand.
    let body = &input[2..];
    let mut decoder = Decompress::new(false);
    scratch.buf.clear();
    // One byte past `expected` is enough to notice an overlong stream.
    let limit = expected.saturating_add(1);
    let mut room = expected.min(body.len().saturating_mul(RESERVE_RATIO)).saturating_add(1);
    loop {
        scratch.buf.reserve(room);
        let consumed = decoder.total_in() as usize;
        let status = decoder
            .decompress_vec(body.get(consumed..).unwrap_or_default(), &mut scratch.buf, FlushDecompress::Finish)
            .map_err(|e| InflateFailure::Corrupt(e.to_string()))?;
        let len = scratch.buf.len();
        match status {
            Status::StreamEnd => break,
            _ if len > expected => return Err(InflateFailure::Length { actual: len }),
            _ if len < scratch.buf.capacity() => {
                return Err(InflateFailure::Corrupt("truncated deflate stream".into()));
            }
            _ => room = len.max(1).min(limit - len),
        }
    }
    if scratch.buf.len() != expected {
        return Err(InflateFailure::Length {
            actual: scratch.buf.len(),
        });
    }

    let consumed = decoder.total_in() as usize;
    let checksum = match body.get(consumed..consumed + 4) {
        Some(trailer) if trailer == adler2::adler32_slice(&scratch.buf).to_be_bytes() => Checksum::Valid,
        _ => {
            warn!(
                len = expected,
                "zlib checksum mismatch in compressed record; keeping inflated data"
            );
            Checksum::Mismatch
        }
    };
    Ok((&scratch.buf, checksum))
}

/// Compress `data` into a zlib stream.
pub fn deflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inflate_round_trip() {
        let data: Vec<u8> = (0..4000u32).map(|i| (i % 7) as u8).collect();
        let packed = deflate(&data).unwrap();
        let mut scratch = Scratch::new();
        let (out, checksum) = inflate(&packed, data.len(), &mut scratch).unwrap();
        assert_eq!(out, &data[..]);
        assert_eq!(checksum, Checksum::Valid);
    }

    #[test]
    fn bad_trailer_is_tolerated() {
        let data = b"some record payload".to_vec();
        let mut packed = deflate(&data).unwrap();
        let n = packed.len();
        packed[n - 1] ^= 0xFF;
        let mut scratch = Scratch::new();
        let (out, checksum) = inflate(&packed, data.len(), &mut scratch).unwrap();
        assert_eq!(out, &data[..]);
        assert_eq!(checksum, Checksum::Mismatch);
    }

    #[test]
    fn corrupt_stream_is_fatal() {
        let mut scratch = Scratch::new();
        assert!(matches!(
            inflate(&[0x78, 0x9C, 0xFF, 0xFF, 0xFF], 10, &mut scratch),
            Err(InflateFailure::Corrupt(_))
        ));
        assert!(matches!(
            inflate(&[0x00, 0x00], 10, &mut scratch),
            Err(InflateFailure::Corrupt(_))
        ));
    }

    #[test]
    fn output_grows_past_the_initial_reservation() {
        let data = vec![0u8; 256 * 1024];
        let packed = deflate(&data).unwrap();
        assert!(packed.len() * RESERVE_RATIO < data.len());
        let mut scratch = Scratch::new();
        let (out, checksum) = inflate(&packed, data.len(), &mut scratch).unwrap();
        assert_eq!(out.len(), data.len());
        assert_eq!(checksum, Checksum::Valid);
    }

    #[test]
    fn huge_declared_length_is_not_reserved() {
        let packed = deflate(b"abcdef").unwrap();
        let mut scratch = Scratch::new();
        assert!(matches!(
            inflate(&packed, u32::MAX as usize, &mut scratch),
            Err(InflateFailure::Length { actual: 6 })
        ));
        assert!(scratch.buf.capacity() < 4096);
    }

    #[test]
    fn wrong_declared_length_is_fatal() {
        let packed = deflate(b"abcdef").unwrap();
        let mut scratch = Scratch::new();
        assert!(matches!(
            inflate(&packed, 3, &mut scratch),
            Err(InflateFailure::Length { .. })
        ));
    }
}
