//! MSG, the generic negotiation package.
//!
//! A MSG announces what the following PARAMFMT/PARAMS pair means, for
//! example an encrypted password or a symmetric session key.

use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::msg::MsgId;
use crate::wire::Reader;

/// Whether parameters follow the MSG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgStatus {
    /// No parameters follow.
    HasNoArgs = 0,
    /// A PARAMFMT/PARAMS pair follows.
    HasArgs = 1,
}

/// A MSG package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgPackage {
    /// Argument indicator.
    pub status: MsgStatus,
    /// What this message negotiates.
    pub msg_id: MsgId,
}

impl MsgPackage {
    /// Create a MSG package.
    #[must_use]
    pub fn new(status: MsgStatus, msg_id: MsgId) -> Self {
        Self { status, msg_id }
    }

    /// Read the body following the token byte.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated input or an unknown message id.
    pub fn read_from(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        let _length = reader.u8()?;

        let status = match reader.u8()? {
            0 => MsgStatus::HasNoArgs,
            _ => MsgStatus::HasArgs,
        };
        let msg_id = MsgId::try_from(reader.u16_le()?)?;

        Ok(Self { status, msg_id })
    }

    /// Write the body following the token byte.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(3);
        buf.put_u8(self.status as u8);
        buf.put_u16_le(self.msg_id as u16);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let msg = MsgPackage::new(MsgStatus::HasArgs, MsgId::SecLogPwd3);

        let mut buf = BytesMut::new();
        msg.write_to(&mut buf);
        assert_eq!(buf.len(), 4);
        assert_eq!(buf[0], 3);

        let mut reader = Reader::new(&buf);
        assert_eq!(MsgPackage::read_from(&mut reader).unwrap(), msg);
    }
}
