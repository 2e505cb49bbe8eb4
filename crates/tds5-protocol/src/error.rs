//! Protocol error types.

use thiserror::Error;

use crate::token::Token;

/// Errors that can occur while encoding or decoding TDS 5.0 structures.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The input ended before the structure was complete.
    ///
    /// Streaming consumers treat this as "wait for more packets and retry"
    /// rather than as a hard failure.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// A token byte outside the known table.
    #[error("unknown token byte: 0x{0:02x}")]
    UnknownToken(u8),

    /// A packet type byte outside the known table.
    #[error("unknown packet type: 0x{0:02x}")]
    UnknownPacketType(u8),

    /// A packet header announcing less than the header size.
    #[error("invalid packet length {0}")]
    InvalidPacketLength(u16),

    /// A declared length did not match the bytes actually consumed.
    #[error("length mismatch in {context}: declared {declared}, consumed {consumed}")]
    LengthMismatch {
        /// Structure being parsed.
        context: &'static str,
        /// Length declared on the wire.
        declared: usize,
        /// Bytes actually consumed.
        consumed: usize,
    },

    /// A data package arrived without a preceding format package.
    #[error("{0:?} package requires a preceding format package")]
    MissingFormat(Token),

    /// Value conversion failed.
    #[error(transparent)]
    Type(#[from] ase_types::TypeError),

    /// Text on the wire was not valid UTF-8.
    #[error("malformed utf-8 in {0}")]
    MalformedUtf8(&'static str),

    /// The server zeroed out an entire requested capability group.
    #[error("server rejected all capabilities of type {0}")]
    CapabilityMismatch(u8),

    /// A cryptographic step of the login handshake failed.
    #[error("login crypto failure: {0}")]
    Crypto(String),

    /// The login payload or negotiation response was malformed.
    #[error("invalid login exchange: {0}")]
    InvalidLogin(String),

    /// A field value too large for its wire representation.
    #[error("{context} of {length} bytes exceeds the wire limit {max}")]
    TooLong {
        /// What was being written.
        context: &'static str,
        /// Actual byte length.
        length: usize,
        /// Maximum the wire format allows.
        max: usize,
    },
}

impl ProtocolError {
    /// Whether this error only signals that more input is needed.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::UnexpectedEof)
    }
}
