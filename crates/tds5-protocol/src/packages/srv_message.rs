//! ERROR and INFO, the pre-EED server message packages.
//!
//! Both tokens share one body; the token decides whether the message is an
//! error or informational.

use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::wire::{self, Reader};

/// A server message delivered through the ERROR or INFO token.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SrvMessagePackage {
    /// Server message number.
    pub number: i32,
    /// Error state.
    pub state: u8,
    /// Severity class.
    pub class: u8,
    /// Message text.
    pub msg: String,
    /// Name of the reporting server.
    pub server_name: String,
    /// Name of the reporting procedure, may be empty.
    pub proc_name: String,
    /// Line number the message refers to.
    pub line_nr: u16,
}

impl SrvMessagePackage {
    /// Read the body following the token byte.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated input or a length mismatch.
    pub fn read_from(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        let length = reader.u16_le()? as usize;
        let start = reader.position();

        let pkg = Self {
            number: reader.i32_le()?,
            state: reader.u8()?,
            class: reader.u8()?,
            msg: reader.u16_string("server message")?,
            server_name: reader.u8_string("server name")?,
            proc_name: reader.u8_string("proc name")?,
            line_nr: reader.u16_le()?,
        };

        let consumed = reader.position() - start;
        if consumed != length {
            return Err(ProtocolError::LengthMismatch {
                context: "server message package",
                declared: length,
                consumed,
            });
        }
        Ok(pkg)
    }

    /// Write the body following the token byte.
    ///
    /// # Errors
    ///
    /// Returns an error for over-long strings.
    pub fn write_to(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let length = 12 + self.msg.len() + self.server_name.len() + self.proc_name.len();
        buf.put_u16_le(length as u16);

        buf.put_i32_le(self.number);
        buf.put_u8(self.state);
        buf.put_u8(self.class);
        wire::put_u16_string(buf, &self.msg, "server message")?;
        wire::put_u8_string(buf, &self.server_name, "server name")?;
        wire::put_u8_string(buf, &self.proc_name, "proc name")?;
        buf.put_u16_le(self.line_nr);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let msg = SrvMessagePackage {
            number: 102,
            state: 1,
            class: 15,
            msg: "Incorrect syntax near ';'".into(),
            server_name: "ASE1".into(),
            proc_name: String::new(),
            line_nr: 1,
        };

        let mut buf = BytesMut::new();
        msg.write_to(&mut buf).unwrap();

        let mut reader = Reader::new(&buf);
        assert_eq!(SrvMessagePackage::read_from(&mut reader).unwrap(), msg);
        assert!(reader.is_empty());
    }
}
