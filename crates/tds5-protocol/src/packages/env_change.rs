//! ENVCHANGE, server notifications of session environment changes.

use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::wire::{self, Reader};

/// Kind of environment that changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EnvChangeType {
    /// Current database.
    Database = 1,
    /// Session language.
    Language = 2,
    /// Character set.
    Charset = 3,
    /// Negotiated packet size.
    PacketSize = 4,
}

impl TryFrom<u8> for EnvChangeType {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, ProtocolError> {
        match byte {
            1 => Ok(Self::Database),
            2 => Ok(Self::Language),
            3 => Ok(Self::Charset),
            4 => Ok(Self::PacketSize),
            other => Err(ProtocolError::InvalidLogin(format!(
                "unknown env change type {other}"
            ))),
        }
    }
}

/// A single environment change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvChange {
    /// What changed.
    pub change_type: EnvChangeType,
    /// Value after the change.
    pub new_value: String,
    /// Value before the change, may be empty.
    pub old_value: String,
}

impl EnvChange {
    fn byte_length(&self) -> usize {
        3 + self.new_value.len() + self.old_value.len()
    }
}

/// An ENVCHANGE package, carrying one or more changes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnvChangePackage {
    /// The changes in wire order.
    pub changes: Vec<EnvChange>,
}

impl EnvChangePackage {
    /// Read the body following the token byte.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated input or a length mismatch.
    pub fn read_from(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        let length = reader.u16_le()? as usize;
        let end = reader.position() + length;

        let mut changes = Vec::new();
        while reader.position() < end {
            let change_type = EnvChangeType::try_from(reader.u8()?)?;
            let new_value = reader.u8_string("env change new value")?;
            let old_value = reader.u8_string("env change old value")?;
            changes.push(EnvChange {
                change_type,
                new_value,
                old_value,
            });
        }

        if reader.position() != end {
            return Err(ProtocolError::LengthMismatch {
                context: "env change package",
                declared: length,
                consumed: length + (reader.position() - end),
            });
        }

        Ok(Self { changes })
    }

    /// Write the body following the token byte.
    ///
    /// # Errors
    ///
    /// Returns an error for over-long values.
    pub fn write_to(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let length: usize = self.changes.iter().map(EnvChange::byte_length).sum();
        buf.put_u16_le(length as u16);

        for change in &self.changes {
            buf.put_u8(change.change_type as u8);
            wire::put_u8_string(buf, &change.new_value, "env change new value")?;
            wire::put_u8_string(buf, &change.old_value, "env change old value")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let pkg = EnvChangePackage {
            changes: vec![
                EnvChange {
                    change_type: EnvChangeType::Database,
                    new_value: "pubs2".into(),
                    old_value: "master".into(),
                },
                EnvChange {
                    change_type: EnvChangeType::PacketSize,
                    new_value: "2048".into(),
                    old_value: "512".into(),
                },
            ],
        };

        let mut buf = BytesMut::new();
        pkg.write_to(&mut buf).unwrap();

        let mut reader = Reader::new(&buf);
        assert_eq!(EnvChangePackage::read_from(&mut reader).unwrap(), pkg);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u16_le(3);
        buf.put_u8(9);
        buf.put_u8(0);
        buf.put_u8(0);

        let mut reader = Reader::new(&buf);
        assert!(EnvChangePackage::read_from(&mut reader).is_err());
    }
}
