//! Token-tagged packages and the codec dispatching on them.
//!
//! A message is a sequence of packages, each introduced by a token byte.
//! Most packages are self-delimiting; ROW and PARAMS are not and borrow
//! the formats of the PARAMFMT or ROWFMT seen earlier in the stream. The
//! [`PackageContext`] carries those formats between `read` calls.

pub mod cursor;
pub mod data;
pub mod done;
pub mod dynamic;
pub mod eed;
pub mod env_change;
pub mod fmt;
pub mod language;
pub mod login_ack;
pub mod logout;
pub mod msg;
pub mod order_by;
pub mod return_status;
pub mod srv_message;
pub mod tokenless;

use std::sync::Arc;

use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::capability::CapabilityPackage;
use crate::field::FieldFmt;
use crate::token::Token;
use crate::wire::Reader;

pub use cursor::{
    CurClosePackage, CurDeclarePackage, CurFetchPackage, CurInfoPackage, CurOpenPackage,
    CursorCloseOption, CursorFetchType, CursorInfoCommand, CursorInfoStatus, CursorOption,
    CursorStatus,
};
pub use data::{DataPackage, ParamsPackage, RowPackage};
pub use done::{DonePackage, DoneStatus, TranState};
pub use dynamic::{DynamicOperation, DynamicPackage, DynamicStatus};
pub use eed::{EedPackage, EedStatus};
pub use env_change::{EnvChange, EnvChangePackage, EnvChangeType};
pub use fmt::{ParamFmtPackage, RowFmtPackage};
pub use language::{LanguagePackage, LanguageStatus};
pub use login_ack::LoginAckPackage;
pub use logout::LogoutPackage;
pub use msg::{MsgPackage, MsgStatus};
pub use order_by::OrderByPackage;
pub use return_status::ReturnStatusPackage;
pub use srv_message::SrvMessagePackage;
pub use tokenless::TokenlessPackage;

/// Formats carried between packages of one message stream.
#[derive(Debug, Clone, Default)]
pub struct PackageContext {
    /// Formats of the last PARAMFMT.
    pub param_formats: Option<Arc<Vec<FieldFmt>>>,
    /// Formats of the last ROWFMT.
    pub row_formats: Option<Arc<Vec<FieldFmt>>>,
}

impl PackageContext {
    /// Drop all remembered formats, e.g. when a request completes.
    pub fn reset(&mut self) {
        self.param_formats = None;
        self.row_formats = None;
    }
}

/// Any package this driver can put on or take off the wire.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum Package {
    Capability(CapabilityPackage),
    CurClose(CurClosePackage),
    CurDeclare(CurDeclarePackage),
    CurFetch(CurFetchPackage),
    CurInfo(CurInfoPackage),
    CurOpen(CurOpenPackage),
    Done(DonePackage),
    DoneProc(DonePackage),
    DoneInProc(DonePackage),
    Dynamic(DynamicPackage),
    Eed(EedPackage),
    EnvChange(EnvChangePackage),
    Error(SrvMessagePackage),
    Info(SrvMessagePackage),
    Language(LanguagePackage),
    LoginAck(LoginAckPackage),
    Logout(LogoutPackage),
    Msg(MsgPackage),
    OrderBy(OrderByPackage),
    ParamFmt(ParamFmtPackage),
    Params(ParamsPackage),
    ReturnStatus(ReturnStatusPackage),
    Row(RowPackage),
    RowFmt(RowFmtPackage),
    /// A raw payload, used for the login record and for tokens this
    /// driver does not interpret.
    Tokenless(TokenlessPackage),
}

impl Package {
    /// Read one package from the stream.
    ///
    /// On [`ProtocolError::UnexpectedEof`] the reader position is
    /// meaningless and the caller retries the parse once more packet data
    /// arrived.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated or malformed input, or when a data
    /// package arrives without a preceding format.
    pub fn read(reader: &mut Reader<'_>, ctx: &mut PackageContext) -> Result<Self, ProtocolError> {
        let token_byte = reader.u8()?;
        let token = Token::try_from(token_byte)?;

        let pkg = match token {
            Token::Capability => Self::Capability(CapabilityPackage::read_from(reader)?),
            Token::CurClose => Self::CurClose(CurClosePackage::read_from(reader)?),
            Token::CurDeclare => Self::CurDeclare(CurDeclarePackage::read_from(reader)?),
            Token::CurFetch => Self::CurFetch(CurFetchPackage::read_from(reader)?),
            Token::CurInfo => Self::CurInfo(CurInfoPackage::read_from(reader)?),
            Token::CurOpen => Self::CurOpen(CurOpenPackage::read_from(reader)?),
            Token::Done => Self::Done(DonePackage::read_from(reader)?),
            Token::DoneProc => Self::DoneProc(DonePackage::read_from(reader)?),
            Token::DoneInProc => Self::DoneInProc(DonePackage::read_from(reader)?),
            Token::Dynamic => Self::Dynamic(DynamicPackage::read_from(reader, false)?),
            Token::Dynamic2 => Self::Dynamic(DynamicPackage::read_from(reader, true)?),
            Token::Eed => Self::Eed(EedPackage::read_from(reader)?),
            Token::EnvChange => Self::EnvChange(EnvChangePackage::read_from(reader)?),
            Token::Error => Self::Error(SrvMessagePackage::read_from(reader)?),
            Token::Info => Self::Info(SrvMessagePackage::read_from(reader)?),
            Token::Language => Self::Language(LanguagePackage::read_from(reader)?),
            Token::LoginAck => Self::LoginAck(LoginAckPackage::read_from(reader)?),
            Token::Logout => Self::Logout(LogoutPackage::read_from(reader)?),
            Token::Msg => Self::Msg(MsgPackage::read_from(reader)?),
            Token::OrderBy => Self::OrderBy(OrderByPackage::read_from(reader)?),
            Token::OrderBy2 => Self::OrderBy(OrderByPackage::read_from_wide(reader)?),
            Token::ParamFmt => {
                let pkg = ParamFmtPackage::read_from(reader, false)?;
                ctx.param_formats = Some(Arc::clone(&pkg.fields));
                Self::ParamFmt(pkg)
            }
            Token::ParamFmt2 => {
                let pkg = ParamFmtPackage::read_from(reader, true)?;
                ctx.param_formats = Some(Arc::clone(&pkg.fields));
                Self::ParamFmt(pkg)
            }
            Token::Params => {
                let formats = ctx
                    .param_formats
                    .as_ref()
                    .ok_or(ProtocolError::MissingFormat(Token::Params))?;
                Self::Params(DataPackage::read_from(reader, formats)?)
            }
            Token::ReturnStatus => Self::ReturnStatus(ReturnStatusPackage::read_from(reader)?),
            Token::Row => {
                let formats = ctx
                    .row_formats
                    .as_ref()
                    .ok_or(ProtocolError::MissingFormat(Token::Row))?;
                Self::Row(DataPackage::read_from(reader, formats)?)
            }
            Token::RowFmt => {
                let pkg = RowFmtPackage::read_from(reader, false)?;
                ctx.row_formats = Some(Arc::clone(&pkg.fields));
                Self::RowFmt(pkg)
            }
            Token::RowFmt2 => {
                let pkg = RowFmtPackage::read_from(reader, true)?;
                ctx.row_formats = Some(Arc::clone(&pkg.fields));
                Self::RowFmt(pkg)
            }
            // Tokens without a structured codec soak up the rest of the
            // message, token byte included.
            Token::Control
            | Token::Key
            | Token::DbRpc
            | Token::ReturnValue
            | Token::CurDelete
            | Token::CurDeclare2
            | Token::CurDeclare3 => {
                let mut data = vec![token_byte];
                data.extend_from_slice(reader.bytes(reader.remaining())?);
                Self::Tokenless(TokenlessPackage::new(data))
            }
        };

        Ok(pkg)
    }

    /// Write the package, token byte included.
    ///
    /// # Errors
    ///
    /// Returns an error if a field does not fit its wire representation.
    pub fn write_to(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        if let Some(token) = self.token() {
            buf.put_u8(token as u8);
        }

        match self {
            Self::Capability(pkg) => pkg.write_to(buf),
            Self::CurClose(pkg) => pkg.write_to(buf)?,
            Self::CurDeclare(pkg) => pkg.write_to(buf)?,
            Self::CurFetch(pkg) => pkg.write_to(buf)?,
            Self::CurInfo(pkg) => pkg.write_to(buf)?,
            Self::CurOpen(pkg) => pkg.write_to(buf)?,
            Self::Done(pkg) | Self::DoneProc(pkg) | Self::DoneInProc(pkg) => pkg.write_to(buf),
            Self::Dynamic(pkg) => pkg.write_to(buf)?,
            Self::Eed(pkg) => pkg.write_to(buf)?,
            Self::EnvChange(pkg) => pkg.write_to(buf)?,
            Self::Error(pkg) | Self::Info(pkg) => pkg.write_to(buf)?,
            Self::Language(pkg) => pkg.write_to(buf),
            Self::LoginAck(pkg) => pkg.write_to(buf)?,
            Self::Logout(pkg) => pkg.write_to(buf),
            Self::Msg(pkg) => pkg.write_to(buf),
            Self::OrderBy(pkg) => pkg.write_to(buf),
            Self::ParamFmt(pkg) => pkg.write_to(buf)?,
            Self::Params(pkg) | Self::Row(pkg) => pkg.write_to(buf)?,
            Self::ReturnStatus(pkg) => pkg.write_to(buf),
            Self::RowFmt(pkg) => pkg.write_to(buf)?,
            Self::Tokenless(pkg) => pkg.write_to(buf),
        }
        Ok(())
    }

    /// The token tagging this package; `None` for raw payloads.
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        let token = match self {
            Self::Capability(_) => Token::Capability,
            Self::CurClose(_) => Token::CurClose,
            Self::CurDeclare(_) => Token::CurDeclare,
            Self::CurFetch(_) => Token::CurFetch,
            Self::CurInfo(_) => Token::CurInfo,
            Self::CurOpen(_) => Token::CurOpen,
            Self::Done(_) => Token::Done,
            Self::DoneProc(_) => Token::DoneProc,
            Self::DoneInProc(_) => Token::DoneInProc,
            Self::Dynamic(pkg) => {
                if pkg.wide {
                    Token::Dynamic2
                } else {
                    Token::Dynamic
                }
            }
            Self::Eed(_) => Token::Eed,
            Self::EnvChange(_) => Token::EnvChange,
            Self::Error(_) => Token::Error,
            Self::Info(_) => Token::Info,
            Self::Language(_) => Token::Language,
            Self::LoginAck(_) => Token::LoginAck,
            Self::Logout(_) => Token::Logout,
            Self::Msg(_) => Token::Msg,
            Self::OrderBy(pkg) => {
                if pkg.wide {
                    Token::OrderBy2
                } else {
                    Token::OrderBy
                }
            }
            Self::ParamFmt(pkg) => {
                if pkg.wide {
                    Token::ParamFmt2
                } else {
                    Token::ParamFmt
                }
            }
            Self::Params(_) => Token::Params,
            Self::ReturnStatus(_) => Token::ReturnStatus,
            Self::Row(_) => Token::Row,
            Self::RowFmt(pkg) => {
                if pkg.wide {
                    Token::RowFmt2
                } else {
                    Token::RowFmt
                }
            }
            Self::Tokenless(_) => return None,
        };
        Some(token)
    }

    /// Whether this package completes a request or a part of it.
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_) | Self::DoneProc(_) | Self::DoneInProc(_))
    }

    /// Whether this package carries a server error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        match self {
            Self::Error(_) => true,
            Self::Eed(pkg) => !pkg.is_info(),
            _ => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ase_types::{DataType, Value};

    fn row_fmt() -> RowFmtPackage {
        let mut id = FieldFmt::named(DataType::IntN, "id");
        id.max_length = 4;
        RowFmtPackage::new(vec![id])
    }

    #[test]
    fn test_stream_with_formats() {
        let fmt = row_fmt();
        let row = DataPackage::from_values(Arc::clone(&fmt.fields), vec![Value::Int(1)]).unwrap();
        let done = DonePackage {
            status: DoneStatus::COUNT,
            tran_state: TranState::NotInTran,
            count: 1,
        };

        let mut buf = BytesMut::new();
        Package::RowFmt(fmt).write_to(&mut buf).unwrap();
        Package::Row(row).write_to(&mut buf).unwrap();
        Package::Done(done).write_to(&mut buf).unwrap();

        let mut ctx = PackageContext::default();
        let mut reader = Reader::new(&buf);

        assert!(matches!(
            Package::read(&mut reader, &mut ctx).unwrap(),
            Package::RowFmt(_)
        ));
        match Package::read(&mut reader, &mut ctx).unwrap() {
            Package::Row(row) => assert_eq!(row.values(), vec![Value::Int(1)]),
            other => panic!("expected row, got {other:?}"),
        }
        match Package::read(&mut reader, &mut ctx).unwrap() {
            Package::Done(done) => assert_eq!(done.count, 1),
            other => panic!("expected done, got {other:?}"),
        }
        assert!(reader.is_empty());
    }

    #[test]
    fn test_row_without_format_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u8(Token::Row as u8);

        let mut ctx = PackageContext::default();
        let mut reader = Reader::new(&buf);
        assert!(matches!(
            Package::read(&mut reader, &mut ctx),
            Err(ProtocolError::MissingFormat(Token::Row))
        ));
    }

    #[test]
    fn test_consecutive_rows_share_format() {
        let fmt = row_fmt();
        let rows: Vec<_> = (0..3)
            .map(|i| {
                DataPackage::from_values(Arc::clone(&fmt.fields), vec![Value::Int(i)]).unwrap()
            })
            .collect();

        let mut buf = BytesMut::new();
        Package::RowFmt(fmt).write_to(&mut buf).unwrap();
        for row in rows {
            Package::Row(row).write_to(&mut buf).unwrap();
        }

        let mut ctx = PackageContext::default();
        let mut reader = Reader::new(&buf);
        Package::read(&mut reader, &mut ctx).unwrap();

        for i in 0..3 {
            match Package::read(&mut reader, &mut ctx).unwrap() {
                Package::Row(row) => assert_eq!(row.values(), vec![Value::Int(i)]),
                other => panic!("expected row, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_unhandled_token_becomes_tokenless() {
        let mut buf = BytesMut::new();
        buf.put_u8(Token::Control as u8);
        buf.put_slice(&[1, 2, 3]);

        let mut ctx = PackageContext::default();
        let mut reader = Reader::new(&buf);
        match Package::read(&mut reader, &mut ctx).unwrap() {
            Package::Tokenless(pkg) => {
                assert_eq!(pkg.data, vec![Token::Control as u8, 1, 2, 3]);
            }
            other => panic!("expected tokenless, got {other:?}"),
        }
        assert!(reader.is_empty());
    }
}
