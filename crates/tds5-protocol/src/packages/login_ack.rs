//! LOGINACK, the server's answer to a login record.

use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::login::LoginAckStatus;
use crate::wire::{self, Reader};

/// Acknowledgement of a login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAckPackage {
    /// Outcome of the login.
    pub status: LoginAckStatus,
    /// TDS version the server selected.
    pub tds_version: [u8; 4],
    /// Server program name.
    pub program_name: String,
    /// Server program version.
    pub program_version: [u8; 4],
}

impl LoginAckPackage {
    /// Read the body following the token byte.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated input or an unknown status.
    pub fn read_from(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        let _length = reader.u16_le()?;

        let status = LoginAckStatus::try_from(reader.u8()?)?;

        let mut tds_version = [0u8; 4];
        tds_version.copy_from_slice(reader.bytes(4)?);

        let program_name = reader.u8_string("program name")?;

        let mut program_version = [0u8; 4];
        program_version.copy_from_slice(reader.bytes(4)?);

        Ok(Self {
            status,
            tds_version,
            program_name,
            program_version,
        })
    }

    /// Write the body following the token byte.
    ///
    /// # Errors
    ///
    /// Returns an error for an over-long program name.
    pub fn write_to(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let length = 10 + self.program_name.len();
        buf.put_u16_le(length as u16);

        buf.put_u8(self.status as u8);
        buf.put_slice(&self.tds_version);
        wire::put_u8_string(buf, &self.program_name, "program name")?;
        buf.put_slice(&self.program_version);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let ack = LoginAckPackage {
            status: LoginAckStatus::Succeed,
            tds_version: [5, 0, 0, 0],
            program_name: "Adaptive Server Enterprise".into(),
            program_version: [16, 0, 2, 0],
        };

        let mut buf = BytesMut::new();
        ack.write_to(&mut buf).unwrap();

        let mut reader = Reader::new(&buf);
        assert_eq!(LoginAckPackage::read_from(&mut reader).unwrap(), ack);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_unknown_status_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u16_le(10);
        buf.put_u8(1);
        buf.put_slice(&[5, 0, 0, 0]);
        buf.put_u8(0);
        buf.put_slice(&[0, 0, 0, 0]);

        let mut reader = Reader::new(&buf);
        assert!(LoginAckPackage::read_from(&mut reader).is_err());
    }
}
