//! RETURNSTATUS, the integer result of a stored procedure.

use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::wire::Reader;

/// Return status of a procedure execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReturnStatusPackage {
    /// The value of the procedure's `return`.
    pub status: i32,
}

impl ReturnStatusPackage {
    /// Read the body following the token byte.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated input.
    pub fn read_from(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            status: reader.i32_le()?,
        })
    }

    /// Write the body following the token byte.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_i32_le(self.status);
    }
}
