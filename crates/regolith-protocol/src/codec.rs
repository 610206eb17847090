//! Little-endian byte reader/writer primitives.

use glam::{Quat, Vec3};

/// Errors raised while decoding a datagram. Every error means "drop the
/// packet"; none of them are fatal.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    /// The datagram ended before the declared field.
    #[error("datagram truncated at byte {at}")]
    UnexpectedEnd {
        /// Read position when the data ran out.
        at: usize,
    },

    /// A length-prefixed string was not valid UTF-8.
    #[error("string field is not valid UTF-8")]
    BadString,

    /// The header names a packet type this build does not know.
    #[error("unknown packet type {packet_type} for mode {mode}")]
    UnknownPacketType {
        /// Sender mode byte.
        mode: u8,
        /// Type byte.
        packet_type: u8,
    },

    /// The header's size field disagrees with the datagram length.
    #[error("declared size {declared} but datagram is {actual} bytes")]
    SizeMismatch {
        /// Size from the header.
        declared: u32,
        /// Bytes actually received.
        actual: usize,
    },

    /// The mode byte is neither client nor server.
    #[error("unknown packet mode {0}")]
    UnknownMode(u8),
}

/// Append-only little-endian writer.
#[derive(Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a writer with reserved capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// `true` if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consumes the writer, returning the datagram bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_vec3(&mut self, value: Vec3) {
        self.write_f32(value.x);
        self.write_f32(value.y);
        self.write_f32(value.z);
    }

    pub fn write_quat(&mut self, value: Quat) {
        self.write_f32(value.x);
        self.write_f32(value.y);
        self.write_f32(value.z);
        self.write_f32(value.w);
    }

    /// Length-prefixed (u32) UTF-8 string.
    pub fn write_string(&mut self, value: &str) {
        self.write_u32(value.len() as u32);
        self.buf.extend_from_slice(value.as_bytes());
    }

    pub fn write_bytes(&mut self, value: &[u8]) {
        self.buf.extend_from_slice(value);
    }

    /// Patches a previously written u32 in place (used to back-fill the
    /// header's size field once the body length is known).
    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        self.buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
}

/// Bounds-checked little-endian reader over a received datagram.
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Wraps a datagram.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Total datagram length.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` for an empty datagram.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.pos + n > self.data.len() {
            return Err(CodecError::UnexpectedEnd { at: self.pos });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        let bytes = self.take(4)?;
        Ok(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_vec3(&mut self) -> Result<Vec3, CodecError> {
        Ok(Vec3::new(self.read_f32()?, self.read_f32()?, self.read_f32()?))
    }

    pub fn read_quat(&mut self) -> Result<Quat, CodecError> {
        Ok(Quat::from_xyzw(
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
        ))
    }

    /// Length-prefixed (u32) UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::BadString)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        self.take(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_roundtrip() {
        let mut w = ByteWriter::new();
        w.write_u8(0xAB);
        w.write_u16(0xBEEF);
        w.write_u32(0xDEAD_BEEF);
        w.write_u64(0x0123_4567_89AB_CDEF);
        w.write_f32(-1.5);
        let bytes = w.into_bytes();

        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_u8().unwrap(), 0xAB);
        assert_eq!(r.read_u16().unwrap(), 0xBEEF);
        assert_eq!(r.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(r.read_u64().unwrap(), 0x0123_4567_89AB_CDEF);
        assert_eq!(r.read_f32().unwrap(), -1.5);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_little_endian_layout() {
        let mut w = ByteWriter::new();
        w.write_u32(0x0403_0201);
        assert_eq!(w.into_bytes(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_string_roundtrip() {
        let mut w = ByteWriter::new();
        w.write_string("saska");
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_string().unwrap(), "saska");
    }

    #[test]
    fn test_truncated_read_fails() {
        let bytes = vec![1, 2];
        let mut r = ByteReader::new(&bytes);
        assert!(matches!(
            r.read_u32(),
            Err(CodecError::UnexpectedEnd { .. })
        ));
    }

    #[test]
    fn test_bad_utf8_fails() {
        let mut w = ByteWriter::new();
        w.write_u32(2);
        w.write_bytes(&[0xFF, 0xFE]);
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_string(), Err(CodecError::BadString));
    }

    #[test]
    fn test_patch_u32() {
        let mut w = ByteWriter::new();
        w.write_u32(0);
        w.write_u8(9);
        w.patch_u32(0, 77);
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_u32().unwrap(), 77);
    }

    #[test]
    fn test_vec3_quat_roundtrip() {
        let mut w = ByteWriter::new();
        w.write_vec3(Vec3::new(1.0, -2.0, 3.5));
        w.write_quat(Quat::from_xyzw(0.0, 0.707, 0.0, 0.707));
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_vec3().unwrap(), Vec3::new(1.0, -2.0, 3.5));
        let q = r.read_quat().unwrap();
        assert_eq!((q.x, q.y, q.z, q.w), (0.0, 0.707, 0.0, 0.707));
    }
}
