//! ASE data type registry.
//!
//! Every column and parameter on the wire is tagged with one of these type
//! bytes. The registry also records how the data portion of a field is
//! framed: fixed width, one length byte, or a four byte length (large
//! object types).

use crate::error::TypeError;

/// ASE data type bytes as used in TDS 5.0 format tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum DataType {
    Void = 0x1f,
    Image = 0x22,
    Text = 0x23,
    Blob = 0x24,
    VarBinary = 0x25,
    IntN = 0x26,
    VarChar = 0x27,
    Binary = 0x2d,
    Interval = 0x2e,
    Char = 0x2f,
    Int1 = 0x30,
    Date = 0x31,
    Bit = 0x32,
    Time = 0x33,
    Int2 = 0x34,
    Int4 = 0x38,
    ShortDate = 0x3a,
    Flt4 = 0x3b,
    Money = 0x3c,
    DateTime = 0x3d,
    Flt8 = 0x3e,
    Uint2 = 0x41,
    Uint4 = 0x42,
    Uint8 = 0x43,
    UintN = 0x44,
    Sensitivity = 0x67,
    Boundary = 0x68,
    DecN = 0x6a,
    NumN = 0x6c,
    FltN = 0x6d,
    MoneyN = 0x6e,
    DateTimeN = 0x6f,
    ShortMoney = 0x7a,
    DateN = 0x7b,
    TimeN = 0x93,
    Xml = 0xa3,
    UniText = 0xae,
    LongChar = 0xaf,
    Sint1 = 0xb0,
    BigDateTimeN = 0xbb,
    BigTimeN = 0xbc,
    Int8 = 0xbf,
    LongBinary = 0xe1,
}

/// How the data portion of a field is framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthKind {
    /// Fixed width, no length prefix.
    Fixed(usize),
    /// Single length byte precedes the data.
    Length1,
    /// Four byte length precedes the data (large object types).
    Length4,
}

impl DataType {
    /// Parse a data type byte.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::UnknownDataType`] for bytes outside the table.
    pub fn from_byte(byte: u8) -> Result<Self, TypeError> {
        let dt = match byte {
            0x1f => Self::Void,
            0x22 => Self::Image,
            0x23 => Self::Text,
            0x24 => Self::Blob,
            0x25 => Self::VarBinary,
            0x26 => Self::IntN,
            0x27 => Self::VarChar,
            0x2d => Self::Binary,
            0x2e => Self::Interval,
            0x2f => Self::Char,
            0x30 => Self::Int1,
            0x31 => Self::Date,
            0x32 => Self::Bit,
            0x33 => Self::Time,
            0x34 => Self::Int2,
            0x38 => Self::Int4,
            0x3a => Self::ShortDate,
            0x3b => Self::Flt4,
            0x3c => Self::Money,
            0x3d => Self::DateTime,
            0x3e => Self::Flt8,
            0x41 => Self::Uint2,
            0x42 => Self::Uint4,
            0x43 => Self::Uint8,
            0x44 => Self::UintN,
            0x67 => Self::Sensitivity,
            0x68 => Self::Boundary,
            0x6a => Self::DecN,
            0x6c => Self::NumN,
            0x6d => Self::FltN,
            0x6e => Self::MoneyN,
            0x6f => Self::DateTimeN,
            0x7a => Self::ShortMoney,
            0x7b => Self::DateN,
            0x93 => Self::TimeN,
            0xa3 => Self::Xml,
            0xae => Self::UniText,
            0xaf => Self::LongChar,
            0xb0 => Self::Sint1,
            0xbb => Self::BigDateTimeN,
            0xbc => Self::BigTimeN,
            0xbf => Self::Int8,
            0xe1 => Self::LongBinary,
            other => return Err(TypeError::UnknownDataType(other)),
        };
        Ok(dt)
    }

    /// How the data portion of this type is framed.
    #[must_use]
    pub fn length_kind(self) -> LengthKind {
        match self {
            Self::Void => LengthKind::Fixed(0),
            Self::Int1 | Self::Sint1 | Self::Bit => LengthKind::Fixed(1),
            Self::Int2 | Self::Uint2 => LengthKind::Fixed(2),
            Self::Int4 | Self::Uint4 | Self::Flt4 | Self::Date | Self::Time
            | Self::ShortDate | Self::ShortMoney | Self::Interval => LengthKind::Fixed(4),
            Self::Int8 | Self::Uint8 | Self::Flt8 | Self::DateTime | Self::Money => {
                LengthKind::Fixed(8)
            }
            Self::Image
            | Self::Text
            | Self::UniText
            | Self::Xml
            | Self::LongChar
            | Self::LongBinary
            | Self::Blob => LengthKind::Length4,
            _ => LengthKind::Length1,
        }
    }

    /// Whether this is a nullable (`*N`) type where a zero data length
    /// stands for NULL.
    #[must_use]
    pub fn is_nullable(self) -> bool {
        matches!(
            self,
            Self::IntN
                | Self::UintN
                | Self::FltN
                | Self::MoneyN
                | Self::DateTimeN
                | Self::DateN
                | Self::TimeN
                | Self::BigDateTimeN
                | Self::BigTimeN
                | Self::DecN
                | Self::NumN
        )
    }

    /// Whether the format token carries precision and scale for this type.
    #[must_use]
    pub fn has_precision(self) -> bool {
        matches!(self, Self::DecN | Self::NumN)
    }

    /// Whether the data is transmitted behind a text pointer
    /// (txtptr + timestamp + four byte length).
    #[must_use]
    pub fn uses_text_pointer(self) -> bool {
        matches!(
            self,
            Self::Image | Self::Text | Self::UniText | Self::Xml
        )
    }

    /// Whether the data is transmitted as a chunked serialized blob.
    #[must_use]
    pub fn is_blob(self) -> bool {
        matches!(self, Self::Blob)
    }

    /// Stable lowercase name, used in error messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Image => "image",
            Self::Text => "text",
            Self::Blob => "blob",
            Self::VarBinary => "varbinary",
            Self::IntN => "intn",
            Self::VarChar => "varchar",
            Self::Binary => "binary",
            Self::Interval => "interval",
            Self::Char => "char",
            Self::Int1 => "int1",
            Self::Date => "date",
            Self::Bit => "bit",
            Self::Time => "time",
            Self::Int2 => "int2",
            Self::Int4 => "int4",
            Self::ShortDate => "shortdate",
            Self::Flt4 => "flt4",
            Self::Money => "money",
            Self::DateTime => "datetime",
            Self::Flt8 => "flt8",
            Self::Uint2 => "uint2",
            Self::Uint4 => "uint4",
            Self::Uint8 => "uint8",
            Self::UintN => "uintn",
            Self::Sensitivity => "sensitivity",
            Self::Boundary => "boundary",
            Self::DecN => "decn",
            Self::NumN => "numn",
            Self::FltN => "fltn",
            Self::MoneyN => "moneyn",
            Self::DateTimeN => "datetimen",
            Self::ShortMoney => "shortmoney",
            Self::DateN => "daten",
            Self::TimeN => "timen",
            Self::Xml => "xml",
            Self::UniText => "unitext",
            Self::LongChar => "longchar",
            Self::Sint1 => "sint1",
            Self::BigDateTimeN => "bigdatetimen",
            Self::BigTimeN => "bigtimen",
            Self::Int8 => "int8",
            Self::LongBinary => "longbinary",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for DataType {
    type Error = TypeError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Self::from_byte(byte)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_round_trip() {
        for byte in 0u8..=255 {
            if let Ok(dt) = DataType::from_byte(byte) {
                assert_eq!(dt as u8, byte);
            }
        }
    }

    #[test]
    fn test_unknown_byte() {
        assert!(matches!(
            DataType::from_byte(0x00),
            Err(TypeError::UnknownDataType(0x00))
        ));
    }

    #[test]
    fn test_length_kinds() {
        assert_eq!(DataType::Int4.length_kind(), LengthKind::Fixed(4));
        assert_eq!(DataType::Money.length_kind(), LengthKind::Fixed(8));
        assert_eq!(DataType::VarChar.length_kind(), LengthKind::Length1);
        assert_eq!(DataType::IntN.length_kind(), LengthKind::Length1);
        assert_eq!(DataType::Text.length_kind(), LengthKind::Length4);
        assert_eq!(DataType::LongBinary.length_kind(), LengthKind::Length4);
    }

    #[test]
    fn test_classifications() {
        assert!(DataType::IntN.is_nullable());
        assert!(!DataType::Int4.is_nullable());
        assert!(DataType::DecN.has_precision());
        assert!(DataType::Text.uses_text_pointer());
        assert!(!DataType::LongBinary.uses_text_pointer());
        assert!(DataType::Blob.is_blob());
    }
}
