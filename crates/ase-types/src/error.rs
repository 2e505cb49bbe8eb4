//! Type conversion error types.

use thiserror::Error;

/// Errors that can occur while converting between wire bytes and values.
#[derive(Debug, Error)]
pub enum TypeError {
    /// The type byte is not a known ASE data type.
    #[error("unknown data type byte: 0x{0:02x}")]
    UnknownDataType(u8),

    /// The raw data does not have a valid length for the type.
    #[error("invalid data length {length} for {datatype}")]
    InvalidLength {
        /// Name of the data type being decoded.
        datatype: &'static str,
        /// Length of the raw data.
        length: usize,
    },

    /// Precision outside the supported 1..=38 range.
    #[error("precision {0} out of range (1..=38)")]
    PrecisionOutOfRange(u8),

    /// Scale larger than precision.
    #[error("scale {scale} exceeds precision {precision}")]
    ScaleOutOfRange {
        /// Declared precision.
        precision: u8,
        /// Declared scale.
        scale: u8,
    },

    /// A decimal literal could not be parsed.
    #[error("invalid decimal literal: {0}")]
    InvalidDecimal(String),

    /// The value variant cannot be encoded as the requested data type.
    #[error("cannot encode {value} as {datatype}")]
    ValueMismatch {
        /// Variant name of the value.
        value: &'static str,
        /// Name of the target data type.
        datatype: &'static str,
    },

    /// A date or time value is outside the representable range.
    #[error("date/time value out of range for {0}")]
    DateTimeOutOfRange(&'static str),

    /// UTF-8 or UTF-16 data on the wire was malformed.
    #[error("malformed {encoding} data: {detail}")]
    MalformedText {
        /// Source encoding name.
        encoding: &'static str,
        /// Description of the defect.
        detail: String,
    },
}
