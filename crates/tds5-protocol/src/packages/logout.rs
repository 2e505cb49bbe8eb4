//! LOGOUT, an orderly session shutdown.

use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::wire::Reader;

/// A logout request. The only defined option value is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogoutPackage {
    /// Logout options.
    pub options: u8,
}

impl LogoutPackage {
    /// Read the body following the token byte.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated input or an unknown option.
    pub fn read_from(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        let options = reader.u8()?;
        if options != 0 {
            return Err(ProtocolError::InvalidLogin(format!(
                "unhandled logout option {options}"
            )));
        }
        Ok(Self { options })
    }

    /// Write the body following the token byte.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(self.options);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let logout = LogoutPackage::default();

        let mut buf = BytesMut::new();
        logout.write_to(&mut buf);

        let mut reader = Reader::new(&buf);
        assert_eq!(LogoutPackage::read_from(&mut reader).unwrap(), logout);
    }

    #[test]
    fn test_unknown_option_rejected() {
        let mut reader = Reader::new(&[7]);
        assert!(LogoutPackage::read_from(&mut reader).is_err());
    }
}
