//! # ase-client
//!
//! Async client for Sybase/SAP Adaptive Server Enterprise speaking
//! TDS 5.0.
//!
//! ## Features
//!
//! - Login with optional RSA/AES password encryption negotiation
//! - SQL commands with streamed, multi-set results
//! - Server-side cursors with batched fetches
//! - Prepared statements with typed parameters
//! - Command cancellation through attention requests
//!
//! ## Example
//!
//! ```rust,ignore
//! use ase_client::{Config, Connection};
//!
//! let config = Config::new("localhost", "sa", "secret").database("pubs2");
//! let mut conn = Connection::connect(config).await?;
//!
//! let mut rows = conn.query("select au_id, au_lname from authors").await?;
//! while let Some(row) = rows.next_row().await? {
//!     println!("{:?}", row.get(0));
//! }
//! rows.close().await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod cursor;
pub mod dynamic;
pub mod error;
mod login;
pub mod rows;

pub use ase_types::Value;
pub use config::Config;
pub use connection::Connection;
pub use cursor::Cursor;
pub use dynamic::Statement;
pub use error::{Error, Result};
pub use rows::{ExecResult, Row, Rows};
