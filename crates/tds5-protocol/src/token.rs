//! Token bytes tagging packages within a message.

use crate::error::ProtocolError;

/// TDS 5.0 token bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Token {
    CurDeclare3 = 0x10,
    ParamFmt2 = 0x20,
    Language = 0x21,
    OrderBy2 = 0x22,
    CurDeclare2 = 0x23,
    RowFmt2 = 0x61,
    Dynamic2 = 0x62,
    Msg = 0x65,
    Logout = 0x71,
    ReturnStatus = 0x79,
    CurClose = 0x80,
    CurDelete = 0x81,
    CurFetch = 0x82,
    CurInfo = 0x83,
    CurOpen = 0x84,
    CurDeclare = 0x86,
    OrderBy = 0xa9,
    Error = 0xaa,
    Info = 0xab,
    ReturnValue = 0xac,
    LoginAck = 0xad,
    Control = 0xae,
    Key = 0xca,
    Row = 0xd1,
    Params = 0xd7,
    Capability = 0xe2,
    EnvChange = 0xe3,
    Eed = 0xe5,
    DbRpc = 0xe6,
    Dynamic = 0xe7,
    ParamFmt = 0xec,
    RowFmt = 0xee,
    Done = 0xfd,
    DoneProc = 0xfe,
    DoneInProc = 0xff,
}

impl TryFrom<u8> for Token {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, ProtocolError> {
        let token = match byte {
            0x10 => Self::CurDeclare3,
            0x20 => Self::ParamFmt2,
            0x21 => Self::Language,
            0x22 => Self::OrderBy2,
            0x23 => Self::CurDeclare2,
            0x61 => Self::RowFmt2,
            0x62 => Self::Dynamic2,
            0x65 => Self::Msg,
            0x71 => Self::Logout,
            0x79 => Self::ReturnStatus,
            0x80 => Self::CurClose,
            0x81 => Self::CurDelete,
            0x82 => Self::CurFetch,
            0x83 => Self::CurInfo,
            0x84 => Self::CurOpen,
            0x86 => Self::CurDeclare,
            0xa9 => Self::OrderBy,
            0xaa => Self::Error,
            0xab => Self::Info,
            0xac => Self::ReturnValue,
            0xad => Self::LoginAck,
            0xae => Self::Control,
            0xca => Self::Key,
            0xd1 => Self::Row,
            0xd7 => Self::Params,
            0xe2 => Self::Capability,
            0xe3 => Self::EnvChange,
            0xe5 => Self::Eed,
            0xe6 => Self::DbRpc,
            0xe7 => Self::Dynamic,
            0xec => Self::ParamFmt,
            0xee => Self::RowFmt,
            0xfd => Self::Done,
            0xfe => Self::DoneProc,
            0xff => Self::DoneInProc,
            other => return Err(ProtocolError::UnknownToken(other)),
        };
        Ok(token)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        for byte in 0u8..=255 {
            if let Ok(token) = Token::try_from(byte) {
                assert_eq!(token as u8, byte);
            }
        }
    }

    #[test]
    fn test_unknown() {
        assert!(matches!(
            Token::try_from(0x42),
            Err(ProtocolError::UnknownToken(0x42))
        ));
    }
}
