//! # ase-types
//!
//! Data type registry and value model for the Sybase/SAP ASE dialect of the
//! TDS 5.0 protocol.
//!
//! This crate is IO-agnostic. It knows the wire representation of every ASE
//! data type (the raw data bytes, without the length prefixes added by the
//! field codec) and converts between those bytes and the [`Value`] model.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ase_types::{DataType, Value};
//!
//! let value = Value::decode(DataType::Int4, &4711i32.to_le_bytes())?;
//! assert_eq!(value, Value::Int(4711));
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod datatype;
pub mod decimal;
pub mod error;
pub mod time;
pub mod value;

pub use datatype::{DataType, LengthKind};
pub use decimal::Decimal;
pub use error::TypeError;
pub use value::Value;
