//! Codec layer errors.

use tds5_protocol::ProtocolError;

/// Errors of the framing and channel layer.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// An IO error on the underlying stream.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A protocol level error while parsing or serializing.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A packet exceeded the negotiated packet size.
    #[error("packet of {size} bytes exceeds maximum of {max}")]
    PacketTooLarge {
        /// Size of the offending packet.
        size: usize,
        /// Negotiated maximum.
        max: usize,
    },

    /// The logical channel has been closed.
    #[error("channel {0} is closed")]
    ChannelClosed(u16),

    /// A packet arrived for a channel that is not registered.
    #[error("received packet for unknown channel {0}")]
    UnknownChannel(u16),

    /// A channel id is already in use.
    #[error("channel {0} already exists")]
    ChannelExists(u16),

    /// The connection's reader task has stopped.
    #[error("connection closed")]
    ConnectionClosed,
}

impl CodecError {
    /// Whether the error is a retriable short read at the protocol level.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Protocol(err) if err.is_incomplete())
    }
}
