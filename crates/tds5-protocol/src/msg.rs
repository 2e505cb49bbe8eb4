//! Message ids carried by MSG packages.
//!
//! Only the security negotiation ids are interpreted by this driver; the
//! rest of the table is carried for completeness and diagnostics.

use crate::error::ProtocolError;

/// Message ids of the MSG package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
#[allow(missing_docs)]
pub enum MsgId {
    SecEncrypt = 1,
    SecLogPwd = 2,
    SecRemPwd = 3,
    SecChallenge = 4,
    SecResponse = 5,
    SecGetLabel = 6,
    SecLabel = 7,
    SqlTblName = 8,
    GwReserved = 9,
    OmniCapabilities = 10,
    SecOpaque = 11,
    HaFailover = 12,
    Empty = 13,
    SecEncrypt2 = 14,
    SecLogPwd2 = 15,
    SecSupCipher2 = 16,
    MigReq = 17,
    MigSync = 18,
    MigCont = 19,
    MigIgn = 20,
    MigFail = 21,
    SecRemPwd2 = 22,
    MigResume = 23,
    Hello = 24,
    LoginParams = 25,
    GridMigReq = 26,
    GridQuiesce = 27,
    GridUnquiesce = 28,
    GridEvent = 29,
    SecEncrypt3 = 30,
    SecLogPwd3 = 31,
    SecRemPwd3 = 32,
    DrMap = 33,
    SecSymKey = 34,
    SecEncrypt4 = 35,
}

impl TryFrom<u16> for MsgId {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self, ProtocolError> {
        if value == 0 || value > 35 {
            return Err(ProtocolError::InvalidLogin(format!(
                "unknown message id {value}"
            )));
        }
        // Values are contiguous from 1.
        let id = match value {
            1 => Self::SecEncrypt,
            2 => Self::SecLogPwd,
            3 => Self::SecRemPwd,
            4 => Self::SecChallenge,
            5 => Self::SecResponse,
            6 => Self::SecGetLabel,
            7 => Self::SecLabel,
            8 => Self::SqlTblName,
            9 => Self::GwReserved,
            10 => Self::OmniCapabilities,
            11 => Self::SecOpaque,
            12 => Self::HaFailover,
            13 => Self::Empty,
            14 => Self::SecEncrypt2,
            15 => Self::SecLogPwd2,
            16 => Self::SecSupCipher2,
            17 => Self::MigReq,
            18 => Self::MigSync,
            19 => Self::MigCont,
            20 => Self::MigIgn,
            21 => Self::MigFail,
            22 => Self::SecRemPwd2,
            23 => Self::MigResume,
            24 => Self::Hello,
            25 => Self::LoginParams,
            26 => Self::GridMigReq,
            27 => Self::GridQuiesce,
            28 => Self::GridUnquiesce,
            29 => Self::GridEvent,
            30 => Self::SecEncrypt3,
            31 => Self::SecLogPwd3,
            32 => Self::SecRemPwd3,
            33 => Self::DrMap,
            34 => Self::SecSymKey,
            _ => Self::SecEncrypt4,
        };
        Ok(id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_security_ids() {
        assert_eq!(MsgId::try_from(31).unwrap(), MsgId::SecLogPwd3);
        assert_eq!(MsgId::try_from(32).unwrap(), MsgId::SecRemPwd3);
        assert_eq!(MsgId::try_from(34).unwrap(), MsgId::SecSymKey);
        assert_eq!(MsgId::try_from(35).unwrap(), MsgId::SecEncrypt4);
        assert!(MsgId::try_from(0).is_err());
        assert!(MsgId::try_from(36).is_err());
    }
}
