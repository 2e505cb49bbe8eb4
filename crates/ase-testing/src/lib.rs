//! # ase-testing
//!
//! Test infrastructure for ASE driver development.
//!
//! This crate provides a mock TDS 5.0 server for unit testing the driver
//! without a real ASE instance. The mock speaks the real packet and
//! package codecs, so client tests exercise the full wire path.
//!
//! ## Features
//!
//! - Mock ASE server with scripted per-query responses
//! - Plaintext and RSA-encrypted login handshakes
//! - Cursor and prepared-statement emulation with per-connection state
//! - Attention handling for cancellation tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use ase_testing::{MockAseServer, MockResponse, MockResultSet};
//! use ase_types::Value;
//!
//! #[tokio::test]
//! async fn test_with_mock_server() {
//!     let server = MockAseServer::builder()
//!         .with_response(
//!             "select id, name from users",
//!             MockResponse::rows(
//!                 vec![
//!                     MockResultSet::int_column("id"),
//!                     MockResultSet::varchar_column("name"),
//!                 ],
//!                 vec![vec![Value::Int(1), Value::Chars("Alice".into())]],
//!             ),
//!         )
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     // Connect your client to server.host() / server.port()...
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod mock_server;

pub use mock_server::{
    MockAseServer, MockResponse, MockResultSet, MockServerBuilder, MockServerConfig,
    MockServerError,
};
