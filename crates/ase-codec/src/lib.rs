//! # ase-codec
//!
//! Async framing and channel multiplexing for the TDS 5.0 protocol.
//!
//! This crate turns a raw byte stream into packets and packets into
//! parsed packages, handling reassembly across packet boundaries and
//! the logical channel multiplexing TDS 5.0 offers.
//!
//! ## Features
//!
//! - Packet framing through tokio-util's codec framework
//! - Logical channels with per-channel package streams
//! - Packet size renegotiation applied mid-connection
//! - Environment change and server message hooks
//!
//! ## Architecture
//!
//! ```text
//! TCP Stream → Tds5Codec (packet framing) → Connection (routing) → Channel (packages)
//! ```
//!
//! The connection splits the stream into read and write halves. A
//! background task routes incoming packets to the channel named in
//! their header, so sending an attention packet works even while a
//! channel is blocked reading a large result set.
//!
//! ```rust,ignore
//! use ase_codec::Connection;
//!
//! let conn = Connection::new(tcp_stream);
//! let mut channel = conn.main_channel()?;
//! channel.send_package(&package).await?;
//! let response = channel.next_package().await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod channel;
pub mod connection;
pub mod error;
pub mod packet_codec;

pub use channel::{Channel, is_final_done};
pub use connection::{Connection, EedHook, EnvChangeHook};
pub use error::CodecError;
pub use packet_codec::{Packet, Tds5Codec};
