//! DONE, DONEPROC and DONEINPROC packages.

use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::wire::Reader;

bitflags::bitflags! {
    /// Status bits of a DONE package. An empty value marks the final
    /// completion of a request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DoneStatus: u16 {
        /// More results follow.
        const MORE = 0x1;
        /// The command raised an error.
        const ERROR = 0x2;
        /// A transaction is in progress.
        const IN_XACT = 0x4;
        /// Completion of a stored procedure.
        const PROC = 0x8;
        /// The count field is valid.
        const COUNT = 0x10;
        /// Acknowledges an attention request.
        const ATTN = 0x20;
        /// Completion of an event.
        const EVENT = 0x40;
        /// The count is cumulative.
        const CUMULATIVE = 0x80;
    }
}

/// Transaction state reported alongside a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u16)]
pub enum TranState {
    /// Not in a transaction.
    #[default]
    NotInTran = 0,
    /// A transaction is in progress.
    InProgress = 1,
    /// The transaction completed.
    Completed = 2,
    /// The transaction failed.
    Fail = 3,
    /// The statement failed inside the transaction.
    StmtFail = 4,
}

impl From<u16> for TranState {
    fn from(value: u16) -> Self {
        match value {
            1 => Self::InProgress,
            2 => Self::Completed,
            3 => Self::Fail,
            4 => Self::StmtFail,
            _ => Self::NotInTran,
        }
    }
}

/// Completion of a command or a part of it.
///
/// The same body serves DONE, DONEPROC and DONEINPROC; which token carried
/// it is tracked by the package enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DonePackage {
    /// Status bits.
    pub status: DoneStatus,
    /// Transaction state.
    pub tran_state: TranState,
    /// Affected row count, valid with [`DoneStatus::COUNT`].
    pub count: i32,
}

impl DonePackage {
    /// A final completion with no further results.
    #[must_use]
    pub fn final_done() -> Self {
        Self::default()
    }

    /// Whether further results follow this completion.
    #[must_use]
    pub fn more_follows(&self) -> bool {
        self.status.contains(DoneStatus::MORE)
    }

    /// Read the body following the token byte.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated input.
    pub fn read_from(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            status: DoneStatus::from_bits_truncate(reader.u16_le()?),
            tran_state: TranState::from(reader.u16_le()?),
            count: reader.i32_le()?,
        })
    }

    /// Write the body following the token byte.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.status.bits());
        buf.put_u16_le(self.tran_state as u16);
        buf.put_i32_le(self.count);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let done = DonePackage {
            status: DoneStatus::MORE | DoneStatus::COUNT,
            tran_state: TranState::Completed,
            count: 42,
        };

        let mut buf = BytesMut::new();
        done.write_to(&mut buf);
        assert_eq!(buf.len(), 8);

        let mut reader = Reader::new(&buf);
        assert_eq!(DonePackage::read_from(&mut reader).unwrap(), done);
    }

    #[test]
    fn test_final_done() {
        let done = DonePackage::final_done();
        assert!(!done.more_follows());
        assert_eq!(done.status, DoneStatus::empty());
    }
}
