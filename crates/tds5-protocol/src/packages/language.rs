//! LANGUAGE, a SQL text command.

use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::wire::Reader;

bitflags::bitflags! {
    /// Status bits of a LANGUAGE package.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LanguageStatus: u8 {
        /// Parameters follow the command.
        const HAS_ARGS = 0x1;
        /// Parameters are batched.
        const BATCH_PARAMS = 0x4;
    }
}

/// A SQL command sent as plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguagePackage {
    /// Status bits.
    pub status: LanguageStatus,
    /// The SQL text.
    pub cmd: String,
}

impl LanguagePackage {
    /// Create a language command without parameters.
    #[must_use]
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            status: LanguageStatus::empty(),
            cmd: cmd.into(),
        }
    }

    /// Read the body following the token byte.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated input.
    pub fn read_from(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        let length = reader.u32_le()? as usize;
        let status = LanguageStatus::from_bits_truncate(reader.u8()?);
        let cmd = reader.string(length - 1, "language command")?;
        Ok(Self { status, cmd })
    }

    /// Write the body following the token byte.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u32_le(1 + self.cmd.len() as u32);
        buf.put_u8(self.status.bits());
        buf.put_slice(self.cmd.as_bytes());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let lang = LanguagePackage::new("select 1");

        let mut buf = BytesMut::new();
        lang.write_to(&mut buf);
        assert_eq!(buf.len(), 4 + 1 + 8);

        let mut reader = Reader::new(&buf);
        assert_eq!(LanguagePackage::read_from(&mut reader).unwrap(), lang);
        assert!(reader.is_empty());
    }
}
