//! # tds5-protocol
//!
//! Pure implementation of the TDS 5.0 wire protocol spoken by Sybase/SAP
//! ASE servers.
//!
//! This crate is intentionally IO-agnostic. It contains no networking logic
//! and makes no assumptions about the async runtime. Higher-level crates
//! build upon this foundation to provide framing and async I/O.
//!
//! The central abstractions are:
//!
//! - [`packet::PacketHeader`]: the 8 byte header framing every packet,
//! - [`token::Token`]: the token byte tagging every package in a message,
//! - [`package::Package`]: the parsed packages themselves, with a single
//!   token-to-constructor registry in [`package::Package::read`],
//! - [`field::FieldFmt`]/[`field::FieldData`]: column and parameter formats
//!   built from composable codec strategies,
//! - [`login::LoginConfig`] and [`crypto`]: the login record and the
//!   on-demand encryption handshake primitives.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod capability;
pub mod crypto;
pub mod error;
pub mod field;
pub mod login;
pub mod msg;
pub mod packet;
pub mod packages;
pub mod token;
pub mod wire;

pub use error::ProtocolError;
pub use packet::{
    DEFAULT_PACKET_SIZE, MAX_PACKET_SIZE, MIN_PACKET_SIZE, PACKET_HEADER_SIZE, PacketHeader,
    PacketStatus, PacketType,
};
pub use token::Token;

/// The package module is re-exported at the crate root for brevity.
pub use packages as package;
