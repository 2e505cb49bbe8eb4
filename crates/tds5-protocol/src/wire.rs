//! Byte-level read and write helpers.
//!
//! All multi-byte integers in the TDS 5.0 body are little-endian; only the
//! packet header is big-endian. The [`Reader`] works on a borrowed slice
//! and reports exhaustion as [`ProtocolError::UnexpectedEof`], which
//! streaming consumers use to wait for more packets and retry the parse.

use bytes::BufMut;

use crate::error::ProtocolError;

/// A cursor over a byte slice with checked reads.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Create a reader over a slice.
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes consumed so far.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Whether all input has been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Read `n` raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnexpectedEof`] if fewer bytes remain.
    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.remaining() < n {
            return Err(ProtocolError::UnexpectedEof);
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Read a single byte.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnexpectedEof`] on exhausted input.
    pub fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.bytes(1)?[0])
    }

    /// Read a signed byte.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnexpectedEof`] on exhausted input.
    pub fn i8(&mut self) -> Result<i8, ProtocolError> {
        Ok(self.u8()? as i8)
    }

    /// Read a little-endian u16.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnexpectedEof`] on exhausted input.
    pub fn u16_le(&mut self) -> Result<u16, ProtocolError> {
        let bs = self.bytes(2)?;
        Ok(u16::from_le_bytes([bs[0], bs[1]]))
    }

    /// Read a little-endian u32.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnexpectedEof`] on exhausted input.
    pub fn u32_le(&mut self) -> Result<u32, ProtocolError> {
        let bs = self.bytes(4)?;
        Ok(u32::from_le_bytes([bs[0], bs[1], bs[2], bs[3]]))
    }

    /// Read a little-endian i32.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnexpectedEof`] on exhausted input.
    pub fn i32_le(&mut self) -> Result<i32, ProtocolError> {
        Ok(self.u32_le()? as i32)
    }

    /// Read a little-endian u64.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnexpectedEof`] on exhausted input.
    pub fn u64_le(&mut self) -> Result<u64, ProtocolError> {
        let bs = self.bytes(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(bs);
        Ok(u64::from_le_bytes(arr))
    }

    /// Read `n` bytes as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns an error on exhausted input or invalid UTF-8.
    pub fn string(&mut self, n: usize, context: &'static str) -> Result<String, ProtocolError> {
        let bs = self.bytes(n)?;
        String::from_utf8(bs.to_vec()).map_err(|_| ProtocolError::MalformedUtf8(context))
    }

    /// Read a string prefixed with a u8 length.
    ///
    /// # Errors
    ///
    /// Returns an error on exhausted input or invalid UTF-8.
    pub fn u8_string(&mut self, context: &'static str) -> Result<String, ProtocolError> {
        let len = self.u8()? as usize;
        self.string(len, context)
    }

    /// Read a string prefixed with a little-endian u16 length.
    ///
    /// # Errors
    ///
    /// Returns an error on exhausted input or invalid UTF-8.
    pub fn u16_string(&mut self, context: &'static str) -> Result<String, ProtocolError> {
        let len = self.u16_le()? as usize;
        self.string(len, context)
    }
}

/// Write a string prefixed with a u8 length.
///
/// # Errors
///
/// Returns [`ProtocolError::TooLong`] for strings above 255 bytes.
pub fn put_u8_string(
    buf: &mut impl BufMut,
    s: &str,
    context: &'static str,
) -> Result<(), ProtocolError> {
    let len = u8::try_from(s.len()).map_err(|_| ProtocolError::TooLong {
        context,
        length: s.len(),
        max: u8::MAX as usize,
    })?;
    buf.put_u8(len);
    buf.put_slice(s.as_bytes());
    Ok(())
}

/// Write a string prefixed with a little-endian u16 length.
///
/// # Errors
///
/// Returns [`ProtocolError::TooLong`] for strings above 65535 bytes.
pub fn put_u16_string(
    buf: &mut impl BufMut,
    s: &str,
    context: &'static str,
) -> Result<(), ProtocolError> {
    let len = u16::try_from(s.len()).map_err(|_| ProtocolError::TooLong {
        context,
        length: s.len(),
        max: u16::MAX as usize,
    })?;
    buf.put_u16_le(len);
    buf.put_slice(s.as_bytes());
    Ok(())
}

/// Write a string into a fixed-width field, zero padded, followed by the
/// actual length as a trailing byte. This is the layout of all strings in
/// the classic login record.
///
/// # Errors
///
/// Returns [`ProtocolError::TooLong`] if the string exceeds the field.
pub fn put_padded_string(
    buf: &mut impl BufMut,
    s: &str,
    width: usize,
    context: &'static str,
) -> Result<(), ProtocolError> {
    if s.len() > width {
        return Err(ProtocolError::TooLong {
            context,
            length: s.len(),
            max: width,
        });
    }
    buf.put_slice(s.as_bytes());
    buf.put_bytes(0, width - s.len());
    buf.put_u8(s.len() as u8);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_reader_integers() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];
        let mut reader = Reader::new(&data);

        assert_eq!(reader.u8().unwrap(), 0x01);
        assert_eq!(reader.u16_le().unwrap(), 0x0302);
        assert_eq!(reader.u32_le().unwrap(), 0x0706_0504);
        assert!(reader.is_empty());
        assert!(reader.u8().unwrap_err().is_incomplete());
    }

    #[test]
    fn test_u8_string_round_trip() {
        let mut buf = BytesMut::new();
        put_u8_string(&mut buf, "pubs2", "db").unwrap();

        let mut reader = Reader::new(&buf);
        assert_eq!(reader.u8_string("db").unwrap(), "pubs2");
    }

    #[test]
    fn test_padded_string() {
        let mut buf = BytesMut::new();
        put_padded_string(&mut buf, "sa", 30, "username").unwrap();

        assert_eq!(buf.len(), 31);
        assert_eq!(&buf[..2], b"sa");
        assert!(buf[2..30].iter().all(|b| *b == 0));
        assert_eq!(buf[30], 2);
    }

    #[test]
    fn test_padded_string_too_long() {
        let mut buf = BytesMut::new();
        let long = "x".repeat(31);
        assert!(put_padded_string(&mut buf, &long, 30, "username").is_err());
    }
}
