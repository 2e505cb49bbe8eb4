//! Client error types.

use tds5_protocol::packages::EedPackage;
use thiserror::Error;

/// Errors that can occur during client operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The login handshake failed.
    #[error("login failed: {0}")]
    Login(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] tds5_protocol::ProtocolError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] ase_codec::CodecError),

    /// Type conversion error.
    #[error("type error: {0}")]
    Type(#[from] ase_types::TypeError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The server reported an error.
    #[error("server error {number}: {message}")]
    Server {
        /// Server message number.
        number: u32,
        /// Severity class.
        class: u8,
        /// Error state.
        state: u8,
        /// Message text; multiple messages are joined with "; ".
        message: String,
        /// Name of the reporting server.
        server: Option<String>,
        /// Name of the reporting procedure.
        procedure: Option<String>,
        /// Line number the message refers to.
        line: u16,
    },

    /// A query failed without a structured server message.
    #[error("query error: {0}")]
    Query(String),

    /// A response contained a package the operation cannot handle.
    #[error("unexpected package: {0}")]
    UnexpectedPackage(&'static str),

    /// An operation was attempted in the wrong state.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    /// Build a server error from the messages collected during a failed
    /// request. The first message supplies the structured fields.
    #[must_use]
    pub fn from_eeds(eeds: Vec<EedPackage>) -> Self {
        let Some(first) = eeds.first() else {
            return Self::Query("query failed with errors".into());
        };

        let message = eeds
            .iter()
            .map(|eed| eed.msg.trim_end())
            .collect::<Vec<_>>()
            .join("; ");

        Self::Server {
            number: first.msg_number,
            class: first.class,
            state: first.state,
            message,
            server: (!first.server_name.is_empty()).then(|| first.server_name.clone()),
            procedure: (!first.proc_name.is_empty()).then(|| first.proc_name.clone()),
            line: first.line_nr,
        }
    }

    /// Check if this is a server error with a specific message number.
    #[must_use]
    pub fn is_server_error(&self, number: u32) -> bool {
        matches!(self, Self::Server { number: n, .. } if *n == number)
    }

    /// Get the severity class if this is a server error.
    #[must_use]
    pub fn class(&self) -> Option<u8> {
        match self {
            Self::Server { class, .. } => Some(*class),
            _ => None,
        }
    }

    /// Alias for `class()` - returns error severity.
    #[must_use]
    pub fn severity(&self) -> Option<u8> {
        self.class()
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_eeds_joins_messages() {
        let eeds = vec![
            EedPackage {
                msg_number: 2628,
                class: 14,
                msg: "first message".into(),
                server_name: "ASE1".into(),
                ..EedPackage::default()
            },
            EedPackage {
                msg_number: 2628,
                msg: "second message".into(),
                ..EedPackage::default()
            },
        ];

        let err = Error::from_eeds(eeds);
        assert!(err.is_server_error(2628));
        assert_eq!(err.class(), Some(14));
        match err {
            Error::Server {
                message, server, ..
            } => {
                assert_eq!(message, "first message; second message");
                assert_eq!(server.as_deref(), Some("ASE1"));
            }
            other => panic!("expected server error, got {other:?}"),
        }
    }

    #[test]
    fn test_from_empty_eeds() {
        assert!(matches!(Error::from_eeds(Vec::new()), Error::Query(_)));
    }
}
