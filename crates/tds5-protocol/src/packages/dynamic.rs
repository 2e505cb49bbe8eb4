//! DYNAMIC and DYNAMIC2, prepared statement operations.

use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::wire::{self, Reader};

bitflags::bitflags! {
    /// Operation bits of a DYNAMIC package.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DynamicOperation: u8 {
        /// Prepare a statement.
        const PREPARE = 0x01;
        /// Execute a prepared statement.
        const EXEC = 0x02;
        /// Deallocate a prepared statement.
        const DEALLOC = 0x04;
        /// Prepare and execute without keeping the statement.
        const EXEC_IMMED = 0x08;
        /// The id names a procedure.
        const PROCNAME = 0x10;
        /// Server acknowledgement of an operation.
        const ACK = 0x20;
        /// Describe the statement's input.
        const DESC_IN = 0x40;
        /// Describe the statement's output.
        const DESC_OUT = 0x80;
    }
}

bitflags::bitflags! {
    /// Status bits of a DYNAMIC package.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DynamicStatus: u8 {
        /// A PARAMFMT/PARAMS pair follows.
        const HAS_ARGS = 0x01;
        /// Suppress result formats the client already knows.
        const SUPPRESS_FMT = 0x02;
        /// Parameters are batched.
        const BATCH_PARAMS = 0x04;
        /// Suppress the parameter format answer.
        const SUPPRESS_PARAMFMT = 0x08;
    }
}

/// A prepared statement operation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DynamicPackage {
    /// Requested operation.
    pub operation: DynamicOperation,
    /// Status bits.
    pub status: DynamicStatus,
    /// Statement id, unique per connection.
    pub id: String,
    /// Statement text, only for prepare operations.
    pub stmt: String,
    /// Whether this is the DYNAMIC2 variant with 32 bit lengths.
    pub wide: bool,
}

impl DynamicPackage {
    /// Create a dynamic package.
    #[must_use]
    pub fn new(operation: DynamicOperation, id: impl Into<String>, stmt: impl Into<String>) -> Self {
        Self {
            operation,
            status: DynamicStatus::empty(),
            id: id.into(),
            stmt: stmt.into(),
            wide: false,
        }
    }

    fn carries_stmt(&self) -> bool {
        self.operation
            .intersects(DynamicOperation::PREPARE | DynamicOperation::EXEC_IMMED)
    }

    /// Read the body following the token byte.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated input or a length mismatch.
    pub fn read_from(reader: &mut Reader<'_>, wide: bool) -> Result<Self, ProtocolError> {
        let length = if wide {
            reader.u32_le()? as usize
        } else {
            reader.u16_le()? as usize
        };
        let start = reader.position();

        let operation = DynamicOperation::from_bits_truncate(reader.u8()?);
        let status = DynamicStatus::from_bits_truncate(reader.u8()?);
        let id = reader.u8_string("dynamic statement id")?;

        let mut pkg = Self {
            operation,
            status,
            id,
            stmt: String::new(),
            wide,
        };

        if pkg.carries_stmt() {
            let stmt_len = if wide {
                reader.u32_le()? as usize
            } else {
                reader.u16_le()? as usize
            };
            pkg.stmt = reader.string(stmt_len, "dynamic statement")?;
        }

        let consumed = reader.position() - start;
        if consumed != length {
            return Err(ProtocolError::LengthMismatch {
                context: "dynamic package",
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
    /// Returns an error for an over-long statement id.
    pub fn write_to(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let mut length = 3 + self.id.len();
        if self.carries_stmt() {
            length += if self.wide { 4 } else { 2 } + self.stmt.len();
        }

        if self.wide {
            buf.put_u32_le(length as u32);
        } else {
            buf.put_u16_le(length as u16);
        }

        buf.put_u8(self.operation.bits());
        buf.put_u8(self.status.bits());
        wire::put_u8_string(buf, &self.id, "dynamic statement id")?;

        if self.carries_stmt() {
            if self.wide {
                buf.put_u32_le(self.stmt.len() as u32);
            } else {
                buf.put_u16_le(self.stmt.len() as u16);
            }
            buf.put_slice(self.stmt.as_bytes());
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_round_trip() {
        let pkg = DynamicPackage::new(
            DynamicOperation::PREPARE,
            "stmt1",
            "select * from titles where price > ?",
        );

        let mut buf = BytesMut::new();
        pkg.write_to(&mut buf).unwrap();

        let mut reader = Reader::new(&buf);
        assert_eq!(DynamicPackage::read_from(&mut reader, false).unwrap(), pkg);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_exec_omits_stmt() {
        let mut pkg = DynamicPackage::new(DynamicOperation::EXEC, "stmt1", "ignored");
        pkg.status = DynamicStatus::HAS_ARGS;

        let mut buf = BytesMut::new();
        pkg.write_to(&mut buf).unwrap();
        // length + type + status + idlen + id, no statement
        assert_eq!(buf.len(), 2 + 3 + 5);

        let mut reader = Reader::new(&buf);
        let back = DynamicPackage::read_from(&mut reader, false).unwrap();
        assert!(back.stmt.is_empty());
        assert_eq!(back.status, DynamicStatus::HAS_ARGS);
    }

    #[test]
    fn test_wide_round_trip() {
        let mut pkg = DynamicPackage::new(DynamicOperation::EXEC_IMMED, "", "select 1");
        pkg.wide = true;

        let mut buf = BytesMut::new();
        pkg.write_to(&mut buf).unwrap();

        let mut reader = Reader::new(&buf);
        assert_eq!(DynamicPackage::read_from(&mut reader, true).unwrap(), pkg);
    }
}
