//! Little-endian wire buffers.
//!
//! [`NetWriter`] appends primitives to a growable byte vector; [`NetReader`]
//! reads them back from a borrowed slice. Every read is bounds-checked and
//! fails with [`ReadError`] instead of panicking on truncated input.

/// Errors produced while reading from a [`NetReader`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadError {
    /// Fewer bytes remain than the read requires.
    #[error("buffer underrun: needed {needed} bytes, {remaining} remaining")]
    Underrun {
        /// Bytes the read needed.
        needed: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// A length-prefixed string was not valid UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    /// A kind tag used a width selector outside `0..=3`.
    #[error("invalid kind tag width selector {0}")]
    InvalidWidth(u8),
}

/// Growable little-endian output buffer.
#[derive(Debug, Default, Clone)]
pub struct NetWriter {
    buf: Vec<u8>,
}

impl NetWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty writer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Appends one byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Appends a little-endian `u16`.
    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Appends a little-endian `u32`.
    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Appends a little-endian `u64`.
    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Appends a little-endian `i32`.
    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes an `(x, y)` pair as two `i32`s.
    pub fn write_point(&mut self, x: i32, y: i32) {
        self.write_i32(x);
        self.write_i32(y);
    }

    /// Writes a `u32` byte length followed by the UTF-8 bytes.
    pub fn write_str(&mut self, value: &str) {
        self.write_u32(value.len() as u32);
        self.buf.extend_from_slice(value.as_bytes());
    }

    /// Appends raw bytes without a length prefix.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of bytes written.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes written so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the writer and returns its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Bounds-checked little-endian reader over a byte slice.
#[derive(Debug, Clone)]
pub struct NetReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> NetReader<'a> {
    /// Starts reading at the beginning of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Current read offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Takes the next `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ReadError> {
        if len > self.remaining() {
            return Err(ReadError::Underrun {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Takes every byte left in the buffer.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let bytes = &self.buf[self.pos..];
        self.pos = self.buf.len();
        bytes
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ReadError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> Result<u8, ReadError> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Reads a little-endian `u16`.
    pub fn read_u16(&mut self) -> Result<u16, ReadError> {
        self.read_array().map(u16::from_le_bytes)
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32, ReadError> {
        self.read_array().map(u32::from_le_bytes)
    }

    /// Reads a little-endian `u64`.
    pub fn read_u64(&mut self) -> Result<u64, ReadError> {
        self.read_array().map(u64::from_le_bytes)
    }

    /// Reads a little-endian `i32`.
    pub fn read_i32(&mut self) -> Result<i32, ReadError> {
        self.read_array().map(i32::from_le_bytes)
    }

    /// Reads an `(x, y)` pair of `i32`s.
    pub fn read_point(&mut self) -> Result<(i32, i32), ReadError> {
        Ok((self.read_i32()?, self.read_i32()?))
    }

    /// Reads a `u32`-length-prefixed UTF-8 string.
    pub fn read_str(&mut self) -> Result<&'a str, ReadError> {
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes).map_err(|_| ReadError::InvalidUtf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives_are_little_endian() {
        let mut w = NetWriter::new();
        w.write_u16(0x0102);
        w.write_i32(-2);
        assert_eq!(w.as_slice(), &[0x02, 0x01, 0xFE, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_mixed_sequence_reads_back() {
        let mut w = NetWriter::new();
        w.write_u8(7);
        w.write_point(-5, 9);
        w.write_u64(u64::MAX);
        w.write_str("héllo");
        w.write_bytes(&[1, 2, 3]);
        let bytes = w.into_bytes();

        let mut r = NetReader::new(&bytes);
        assert_eq!(r.read_u8().unwrap(), 7);
        assert_eq!(r.read_point().unwrap(), (-5, 9));
        assert_eq!(r.read_u64().unwrap(), u64::MAX);
        assert_eq!(r.read_str().unwrap(), "héllo");
        assert_eq!(r.read_rest(), &[1, 2, 3]);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_truncated_read_fails_without_consuming() {
        let mut r = NetReader::new(&[1, 2, 3]);
        assert_eq!(
            r.read_u32(),
            Err(ReadError::Underrun {
                needed: 4,
                remaining: 3
            })
        );
        assert_eq!(r.position(), 0);
        assert_eq!(r.read_u16().unwrap(), 0x0201);
    }

    #[test]
    fn test_string_length_beyond_buffer_is_rejected() {
        let mut w = NetWriter::new();
        w.write_u32(100);
        w.write_bytes(b"short");
        let bytes = w.into_bytes();
        assert!(matches!(
            NetReader::new(&bytes).read_str(),
            Err(ReadError::Underrun { .. })
        ));
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        let mut w = NetWriter::new();
        w.write_u32(2);
        w.write_bytes(&[0xC3, 0x28]);
        let bytes = w.into_bytes();
        assert_eq!(NetReader::new(&bytes).read_str(), Err(ReadError::InvalidUtf8));
    }
}
