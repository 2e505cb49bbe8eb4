//! EED, the extended error data package.

use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::packages::done::TranState;
use crate::wire::{self, Reader};

bitflags::bitflags! {
    /// Status bits of an EED package.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EedStatus: u8 {
        /// More EED packages follow for the same event.
        const FOLLOWS = 0x1;
        /// The message is informational rather than an error.
        const INFO = 0x2;
    }
}

/// Extended error data: the structured server message format ASE uses in
/// place of the old ERROR token.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EedPackage {
    /// Server message number.
    pub msg_number: u32,
    /// Error state.
    pub state: u8,
    /// Severity class.
    pub class: u8,
    /// ANSI SQLSTATE, may be empty.
    pub sql_state: Vec<u8>,
    /// Status bits.
    pub status: EedStatus,
    /// Transaction state.
    pub tran_state: TranState,
    /// Message text.
    pub msg: String,
    /// Name of the reporting server.
    pub server_name: String,
    /// Name of the reporting procedure, may be empty.
    pub proc_name: String,
    /// Line number the message refers to.
    pub line_nr: u16,
}

impl EedPackage {
    /// Whether the message is informational.
    #[must_use]
    pub fn is_info(&self) -> bool {
        self.status.contains(EedStatus::INFO)
    }

    /// Read the body following the token byte.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated input or a length mismatch.
    pub fn read_from(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        let length = reader.u16_le()? as usize;
        let start = reader.position();

        let msg_number = reader.u32_le()?;
        let state = reader.u8()?;
        let class = reader.u8()?;

        let sql_state_len = reader.u8()? as usize;
        let sql_state = reader.bytes(sql_state_len)?.to_vec();

        let status = EedStatus::from_bits_truncate(reader.u8()?);
        let tran_state = TranState::from(reader.u16_le()?);

        let msg = reader.u16_string("eed message")?;
        let server_name = reader.u8_string("eed server name")?;
        let proc_name = reader.u8_string("eed proc name")?;
        let line_nr = reader.u16_le()?;

        let consumed = reader.position() - start;
        if consumed != length {
            return Err(ProtocolError::LengthMismatch {
                context: "eed package",
                declared: length,
                consumed,
            });
        }

        Ok(Self {
            msg_number,
            state,
            class,
            sql_state,
            status,
            tran_state,
            msg,
            server_name,
            proc_name,
            line_nr,
        })
    }

    /// Write the body following the token byte.
    ///
    /// # Errors
    ///
    /// Returns an error for over-long strings.
    pub fn write_to(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let length =
            16 + self.sql_state.len() + self.msg.len() + self.server_name.len() + self.proc_name.len();
        buf.put_u16_le(length as u16);

        buf.put_u32_le(self.msg_number);
        buf.put_u8(self.state);
        buf.put_u8(self.class);
        buf.put_u8(self.sql_state.len() as u8);
        buf.put_slice(&self.sql_state);
        buf.put_u8(self.status.bits());
        buf.put_u16_le(self.tran_state as u16);
        wire::put_u16_string(buf, &self.msg, "eed message")?;
        wire::put_u8_string(buf, &self.server_name, "eed server name")?;
        wire::put_u8_string(buf, &self.proc_name, "eed proc name")?;
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
        let eed = EedPackage {
            msg_number: 2628,
            state: 1,
            class: 14,
            sql_state: b"ZZZZZ".to_vec(),
            status: EedStatus::empty(),
            tran_state: TranState::StmtFail,
            msg: "Table 'foo' not found".into(),
            server_name: "ASE1".into(),
            proc_name: String::new(),
            line_nr: 3,
        };

        let mut buf = BytesMut::new();
        eed.write_to(&mut buf).unwrap();

        let mut reader = Reader::new(&buf);
        assert_eq!(EedPackage::read_from(&mut reader).unwrap(), eed);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_info_status() {
        let mut eed = EedPackage::default();
        assert!(!eed.is_info());
        eed.status = EedStatus::INFO;
        assert!(eed.is_info());
    }
}
