use crate::codec;
use crate::error::{Error, Result};

/// Forward-only read cursor over a byte slice. All reads are little-endian.
#[derive(Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    /// Absolute offset of `data[0]` in the enclosing file, for error messages.
    base: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            base: 0,
        }
    }

    /// A cursor over a detached buffer (e.g. an inflated record payload)
    /// that reports offsets relative to `base`.
    pub fn with_base(data: &'a [u8], base: usize) -> Self {
        Self { data, pos: 0, base }
    }

    /// Current byte position within this cursor's data.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Absolute position, including the base offset.
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    /// Whether we've reached the end.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Remaining bytes from current position.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Skip `n` bytes forward.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.ensure(n)?;
        self.pos += n;
        Ok(())
    }

    /// Read a slice of `n` bytes without copying.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.ensure(n)?;
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Look at the next `n` bytes without consuming them.
    pub fn peek_bytes(&self, n: usize) -> Result<&'a [u8]> {
        self.ensure(n)?;
        Ok(&self.data[self.pos..self.pos + n])
    }

    /// Read a 4-byte tag.
    pub fn read_tag(&mut self) -> Result<[u8; 4]> {
        let bytes = self.read_bytes(4)?;
        let mut tag = [0u8; 4];
        tag.copy_from_slice(bytes);
        Ok(tag)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        let v = self.data[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(codec::to_u16(self.read_array()?))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(codec::to_i16(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(codec::to_u32(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(codec::to_i32(self.read_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(codec::to_f32(self.read_array()?))
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn ensure(&self, n: usize) -> Result<()> {
        if self.pos + n > self.data.len() {
            return Err(Error::UnexpectedEof {
                offset: self.offset(),
                need: n,
                have: self.remaining(),
            });
        }
        Ok(())
    }
}

/// Writer that builds a byte buffer. All writes are little-endian.
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap),
        }
    }

    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_tag(&mut self, tag: &[u8; 4]) {
        self.buf.extend_from_slice(tag);
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&codec::from_u16(v));
    }

    pub fn write_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&codec::from_i16(v));
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&codec::from_u32(v));
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&codec::from_i32(v));
    }

    pub fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&codec::from_f32(v));
    }

    pub fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Write a null-terminated string.
    pub fn write_zstring(&mut self, s: &str) {
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
    }

    /// Patch a u16 at a specific position (for backpatching lengths).
    pub fn patch_u16(&mut self, pos: usize, v: u16) {
        self.buf[pos..pos + 2].copy_from_slice(&codec::from_u16(v));
    }

    /// Patch a u32 at a specific position (for backpatching sizes).
    pub fn patch_u32(&mut self, pos: usize, v: u32) {
        self.buf[pos..pos + 4].copy_from_slice(&codec::from_u32(v));
    }

    /// Drop everything written from `pos` on.
    pub fn truncate(&mut self, pos: usize) {
        self.buf.truncate(pos);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}
