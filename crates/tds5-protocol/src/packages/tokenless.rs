//! Raw payloads without token structure.
//!
//! The login record is the one message a client sends without a leading
//! token. On the receiving side a tokenless package also soaks up message
//! remainders behind tokens this driver does not interpret.

use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::wire::Reader;

/// An uninterpreted byte payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TokenlessPackage {
    /// The raw bytes.
    pub data: Vec<u8>,
}

impl TokenlessPackage {
    /// Wrap raw bytes.
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Consume the rest of the message.
    ///
    /// # Errors
    ///
    /// Infallible in practice; kept for interface symmetry.
    pub fn read_from(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        let data = reader.bytes(reader.remaining())?.to_vec();
        Ok(Self { data })
    }

    /// Write the raw bytes.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.data);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_consumes_remainder() {
        let mut reader = Reader::new(&[1, 2, 3]);
        let pkg = TokenlessPackage::read_from(&mut reader).unwrap();
        assert_eq!(pkg.data, vec![1, 2, 3]);
        assert!(reader.is_empty());
    }
}
