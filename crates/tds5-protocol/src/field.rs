//! Column and parameter field codecs.
//!
//! Format packages (PARAMFMT, ROWFMT and their wide variants) describe
//! fields; data packages (PARAMS, ROW) carry values against those formats.
//! Rather than one codec per data type, a [`FieldFmt`] combines a small set
//! of strategies derived from the data type:
//!
//! - the length strategy (fixed width, one length byte, four length bytes),
//! - optional extras in the format (scale, precision and scale, blob class
//!   info, text pointer table name),
//! - the data strategy (plain, chunked blob, text pointer).

use bytes::{BufMut, BytesMut};

use ase_types::{DataType, LengthKind, Value};

use crate::error::ProtocolError;
use crate::wire::{self, Reader};

bitflags::bitflags! {
    /// Status bits of a field format.
    ///
    /// PARAMFMT and ROWFMT interpret some bits differently; the shared bits
    /// are the ones this driver acts on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FmtStatus: u32 {
        /// Parameter is a return value (PARAMFMT).
        const RETURN = 0x1;
        /// Column is part of a key (ROWFMT).
        const KEY = 0x2;
        /// Column is versioned (ROWFMT).
        const VERSION = 0x4;
        /// Each data field carries a leading status byte.
        const COLUMN_STATUS = 0x8;
        /// Column is updatable (ROWFMT).
        const UPDATABLE = 0x10;
        /// NULL values are allowed.
        const NULL_ALLOWED = 0x20;
        /// Column is an identity column (ROWFMT).
        const IDENTITY = 0x40;
        /// Column is padded with spaces (ROWFMT).
        const PADCHAR = 0x80;
    }
}

bitflags::bitflags! {
    /// Status byte preceding a data field when
    /// [`FmtStatus::COLUMN_STATUS`] is negotiated.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DataStatus: u8 {
        /// The value is NULL.
        const NULL = 0x1;
        /// Zero length but not NULL.
        const ZERO_LENGTH_NON_NULL = 0x2;
    }
}

/// Extra fields a format carries after the length, derived from the data
/// type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FmtExtras {
    None,
    Scale,
    PrecisionScale,
    Blob,
    TextPointer,
}

fn extras_for(datatype: DataType) -> FmtExtras {
    match datatype {
        DataType::DecN | DataType::NumN => FmtExtras::PrecisionScale,
        DataType::BigDateTimeN | DataType::BigTimeN => FmtExtras::Scale,
        DataType::Blob => FmtExtras::Blob,
        dt if dt.uses_text_pointer() => FmtExtras::TextPointer,
        _ => FmtExtras::None,
    }
}

/// Class of a serialized blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum BlobClass {
    FullClassName = 0x01,
    DbIdClassDef = 0x02,
    Char = 0x03,
    Binary = 0x04,
    Unichar = 0x05,
    LocatorChar = 0x06,
    LocatorBinary = 0x07,
    LocatorUnichar = 0x08,
}

impl TryFrom<u8> for BlobClass {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, ProtocolError> {
        let class = match byte {
            0x01 => Self::FullClassName,
            0x02 => Self::DbIdClassDef,
            0x03 => Self::Char,
            0x04 => Self::Binary,
            0x05 => Self::Unichar,
            0x06 => Self::LocatorChar,
            0x07 => Self::LocatorBinary,
            0x08 => Self::LocatorUnichar,
            other => {
                return Err(ProtocolError::InvalidLogin(format!(
                    "unknown blob class {other}"
                )));
            }
        };
        Ok(class)
    }
}

impl BlobClass {
    fn has_class_id(self) -> bool {
        matches!(self, Self::FullClassName | Self::DbIdClassDef)
    }

    fn has_locator(self) -> bool {
        matches!(
            self,
            Self::LocatorChar | Self::LocatorBinary | Self::LocatorUnichar
        )
    }
}

/// The format of one column or parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFmt {
    /// The data type of the field.
    pub datatype: DataType,
    /// Column or parameter name. May be empty.
    pub name: String,
    /// Format status bits.
    pub status: FmtStatus,
    /// Application-defined user type.
    pub usertype: i32,
    /// Locale information string. Usually empty.
    pub locale_info: String,
    /// Maximum data length for variable types.
    pub max_length: u64,
    /// Precision for decimal types.
    pub precision: u8,
    /// Scale for decimal types and microsecond types.
    pub scale: u8,
    /// Blob class for serialized blobs.
    pub blob_class: BlobClass,
    /// Java class id for class blobs.
    pub class_id: String,
    /// Table name for text pointer types.
    pub table_name: String,
    /// Column label (ROWFMT2 only).
    pub column_label: String,
    /// Catalogue name (ROWFMT2 only).
    pub catalogue: String,
    /// Schema name (ROWFMT2 only).
    pub schema: String,
    /// Table name (ROWFMT2 only).
    pub table: String,
}

impl FieldFmt {
    /// Create a format for the given data type with sensible defaults.
    #[must_use]
    pub fn new(datatype: DataType) -> Self {
        let max_length = match datatype {
            DataType::VarChar => 255,
            DataType::LongBinary => i32::MAX as u64,
            _ => 0,
        };

        Self {
            datatype,
            name: String::new(),
            status: FmtStatus::empty(),
            usertype: 0,
            locale_info: String::new(),
            max_length,
            precision: 0,
            scale: 0,
            blob_class: BlobClass::Binary,
            class_id: String::new(),
            table_name: String::new(),
            column_label: String::new(),
            catalogue: String::new(),
            schema: String::new(),
            table: String::new(),
        }
    }

    /// Create a named format.
    #[must_use]
    pub fn named(datatype: DataType, name: impl Into<String>) -> Self {
        let mut fmt = Self::new(datatype);
        fmt.name = name.into();
        fmt
    }

    /// Whether the data type has a fixed width on the wire.
    #[must_use]
    pub fn is_fixed_length(&self) -> bool {
        matches!(self.datatype.length_kind(), LengthKind::Fixed(_))
    }

    /// Read the type-specific tail of a format: the maximum length for
    /// variable types followed by the extras of the type.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated or malformed input.
    pub fn read_type_info(&mut self, reader: &mut Reader<'_>) -> Result<(), ProtocolError> {
        match self.datatype.length_kind() {
            LengthKind::Fixed(_) => {}
            LengthKind::Length1 => self.max_length = u64::from(reader.u8()?),
            LengthKind::Length4 => self.max_length = u64::from(reader.u32_le()?),
        }

        match extras_for(self.datatype) {
            FmtExtras::None => {}
            FmtExtras::Scale => self.scale = reader.u8()?,
            FmtExtras::PrecisionScale => {
                self.precision = reader.u8()?;
                self.scale = reader.u8()?;
            }
            FmtExtras::Blob => {
                self.blob_class = BlobClass::try_from(reader.u8()?)?;
                if self.blob_class.has_class_id() {
                    self.class_id = reader.u16_string("blob class id")?;
                }
            }
            FmtExtras::TextPointer => {
                self.table_name = reader.u16_string("table name")?;
            }
        }

        Ok(())
    }

    /// Write the type-specific tail of a format.
    ///
    /// # Errors
    ///
    /// Returns an error for over-long strings.
    pub fn write_type_info(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        match self.datatype.length_kind() {
            LengthKind::Fixed(_) => {}
            LengthKind::Length1 => buf.put_u8(self.max_length as u8),
            LengthKind::Length4 => buf.put_u32_le(self.max_length as u32),
        }

        match extras_for(self.datatype) {
            FmtExtras::None => {}
            FmtExtras::Scale => buf.put_u8(self.scale),
            FmtExtras::PrecisionScale => {
                buf.put_u8(self.precision);
                buf.put_u8(self.scale);
            }
            FmtExtras::Blob => {
                buf.put_u8(self.blob_class as u8);
                if self.blob_class.has_class_id() {
                    wire::put_u16_string(buf, &self.class_id, "blob class id")?;
                }
            }
            FmtExtras::TextPointer => {
                wire::put_u16_string(buf, &self.table_name, "table name")?;
            }
        }

        Ok(())
    }

    /// Whether data fields carry a leading status byte.
    #[must_use]
    pub fn has_column_status(&self) -> bool {
        self.status.contains(FmtStatus::COLUMN_STATUS)
    }
}

/// A decoded data field: the value plus transport details that must
/// survive a round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldData {
    /// The decoded value.
    pub value: Value,
    /// Data status byte, present when the format negotiated column status.
    pub status: DataStatus,
    /// Text pointer for text pointer types.
    pub txt_ptr: Vec<u8>,
    /// Timestamp for text pointer types.
    pub timestamp: Vec<u8>,
}

impl FieldData {
    /// Wrap a plain value.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        Self {
            value,
            status: DataStatus::empty(),
            txt_ptr: Vec::new(),
            timestamp: vec![0; 8],
        }
    }

    /// Read a data field against its format.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated or malformed input.
    pub fn read(fmt: &FieldFmt, reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        let status = if fmt.has_column_status() {
            DataStatus::from_bits_truncate(reader.u8()?)
        } else {
            DataStatus::empty()
        };

        if fmt.datatype.is_blob() {
            return Self::read_blob(fmt, reader, status);
        }
        if fmt.datatype.uses_text_pointer() {
            return Self::read_text_pointer(fmt, reader, status);
        }

        let length = match fmt.datatype.length_kind() {
            LengthKind::Fixed(len) => len,
            LengthKind::Length1 => reader.u8()? as usize,
            LengthKind::Length4 => reader.u32_le()? as usize,
        };
        let data = reader.bytes(length)?;
        let value = Value::decode(fmt.datatype, fmt.precision, fmt.scale, data)?;

        Ok(Self {
            value,
            status,
            txt_ptr: Vec::new(),
            timestamp: Vec::new(),
        })
    }

    fn read_text_pointer(
        fmt: &FieldFmt,
        reader: &mut Reader<'_>,
        status: DataStatus,
    ) -> Result<Self, ProtocolError> {
        let ptr_len = reader.u8()? as usize;
        if ptr_len == 0 {
            // No text pointer means NULL.
            return Ok(Self {
                value: Value::Null,
                status,
                txt_ptr: Vec::new(),
                timestamp: Vec::new(),
            });
        }

        let txt_ptr = reader.bytes(ptr_len)?.to_vec();
        let timestamp = reader.bytes(8)?.to_vec();
        let data_len = reader.u32_le()? as usize;
        let data = reader.bytes(data_len)?;
        let value = Value::decode(fmt.datatype, fmt.precision, fmt.scale, data)?;

        Ok(Self {
            value,
            status,
            txt_ptr,
            timestamp,
        })
    }

    fn read_blob(
        fmt: &FieldFmt,
        reader: &mut Reader<'_>,
        status: DataStatus,
    ) -> Result<Self, ProtocolError> {
        // Serialization type byte; only interpreted for unichar blobs.
        let _serialization = reader.u8()?;

        if fmt.blob_class.has_class_id() {
            let _sub_class_id = reader.u16_string("blob subclass id")?;
        } else if fmt.blob_class.has_locator() {
            let _locator = reader.u16_string("blob locator")?;
        }

        let mut data = Vec::new();
        loop {
            let chunk_len = reader.u32_le()?;
            // High bit terminates the chunk stream.
            if chunk_len & BLOB_HIGH_BIT == BLOB_HIGH_BIT {
                break;
            }
            if chunk_len == 0 {
                continue;
            }
            data.extend_from_slice(reader.bytes(chunk_len as usize)?);
        }

        let value = Value::decode(fmt.datatype, fmt.precision, fmt.scale, &data)?;
        Ok(Self {
            value,
            status,
            txt_ptr: Vec::new(),
            timestamp: Vec::new(),
        })
    }

    /// Write a data field against its format.
    ///
    /// # Errors
    ///
    /// Returns an error if the value does not fit the format.
    pub fn write(&self, fmt: &FieldFmt, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        if fmt.has_column_status() {
            buf.put_u8(self.status.bits());
        }

        if fmt.datatype.is_blob() {
            return self.write_blob(fmt, buf);
        }
        if fmt.datatype.uses_text_pointer() {
            return self.write_text_pointer(fmt, buf);
        }

        let data = self.value.encode(fmt.datatype)?;
        match fmt.datatype.length_kind() {
            LengthKind::Fixed(len) => {
                if data.len() != len {
                    return Err(ProtocolError::LengthMismatch {
                        context: "fixed-length field data",
                        declared: len,
                        consumed: data.len(),
                    });
                }
            }
            LengthKind::Length1 => buf.put_u8(data.len() as u8),
            LengthKind::Length4 => buf.put_u32_le(data.len() as u32),
        }
        buf.put_slice(&data);
        Ok(())
    }

    fn write_text_pointer(&self, fmt: &FieldFmt, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        if self.value.is_null() {
            buf.put_u8(0);
            return Ok(());
        }

        buf.put_u8(self.txt_ptr.len() as u8);
        buf.put_slice(&self.txt_ptr);
        debug_assert_eq!(self.timestamp.len(), 8);
        buf.put_slice(&self.timestamp);

        let data = self.value.encode(fmt.datatype)?;
        buf.put_u32_le(data.len() as u32);
        buf.put_slice(&data);
        Ok(())
    }

    fn write_blob(&self, fmt: &FieldFmt, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.put_u8(0);
        if fmt.blob_class.has_class_id() {
            wire::put_u16_string(buf, &self.txt_ptr_as_str(), "blob subclass id")?;
        } else if fmt.blob_class.has_locator() {
            wire::put_u16_string(buf, "", "blob locator")?;
        }

        let data = self.value.encode(fmt.datatype)?;
        for chunk in data.chunks(BLOB_CHUNK_SIZE) {
            buf.put_u32_le(chunk.len() as u32);
            buf.put_slice(chunk);
        }
        // Terminating length with the high bit set and no data.
        buf.put_u32_le(BLOB_HIGH_BIT);
        Ok(())
    }

    fn txt_ptr_as_str(&self) -> String {
        String::from_utf8(self.txt_ptr.clone()).unwrap_or_default()
    }
}

const BLOB_HIGH_BIT: u32 = 0x8000_0000;
const BLOB_CHUNK_SIZE: usize = 1024;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ase_types::Decimal;

    fn round_trip(fmt: &FieldFmt, value: Value) -> Value {
        let mut buf = BytesMut::new();
        FieldData::from_value(value).write(fmt, &mut buf).unwrap();

        let mut reader = Reader::new(&buf);
        let data = FieldData::read(fmt, &mut reader).unwrap();
        assert!(reader.is_empty(), "trailing bytes after field data");
        data.value
    }

    #[test]
    fn test_fixed_field() {
        let fmt = FieldFmt::new(DataType::Int4);
        assert_eq!(round_trip(&fmt, Value::Int(-7)), Value::Int(-7));
    }

    #[test]
    fn test_variable_field() {
        let fmt = FieldFmt::new(DataType::VarChar);
        let value = Value::Chars("hello ase".into());
        assert_eq!(round_trip(&fmt, value.clone()), value);
    }

    #[test]
    fn test_nullable_field() {
        let fmt = FieldFmt::new(DataType::IntN);
        assert_eq!(round_trip(&fmt, Value::Null), Value::Null);
        assert_eq!(round_trip(&fmt, Value::Int(99)), Value::Int(99));
    }

    #[test]
    fn test_decimal_field() {
        let mut fmt = FieldFmt::new(DataType::NumN);
        fmt.precision = 12;
        fmt.scale = 3;

        let value = Value::Decimal(Decimal::from_str(12, 3, "-123.456").unwrap());
        assert_eq!(round_trip(&fmt, value.clone()), value);
    }

    #[test]
    fn test_column_status() {
        let mut fmt = FieldFmt::new(DataType::Int4);
        fmt.status = FmtStatus::COLUMN_STATUS;

        let mut buf = BytesMut::new();
        FieldData::from_value(Value::Int(1)).write(&fmt, &mut buf).unwrap();
        // 1 status byte + 4 data bytes
        assert_eq!(buf.len(), 5);

        let mut reader = Reader::new(&buf);
        let data = FieldData::read(&fmt, &mut reader).unwrap();
        assert_eq!(data.value, Value::Int(1));
    }

    #[test]
    fn test_text_pointer_field() {
        let fmt = FieldFmt::new(DataType::Text);
        let mut field = FieldData::from_value(Value::Chars("some text".into()));
        field.txt_ptr = vec![0xab; 16];
        field.timestamp = vec![0x01; 8];

        let mut buf = BytesMut::new();
        field.write(&fmt, &mut buf).unwrap();

        let mut reader = Reader::new(&buf);
        let back = FieldData::read(&fmt, &mut reader).unwrap();
        assert_eq!(back.value, Value::Chars("some text".into()));
        assert_eq!(back.txt_ptr, vec![0xab; 16]);
    }

    #[test]
    fn test_text_pointer_null() {
        let fmt = FieldFmt::new(DataType::Text);
        assert_eq!(round_trip(&fmt, Value::Null), Value::Null);
    }

    #[test]
    fn test_blob_chunking() {
        let fmt = FieldFmt::new(DataType::Blob);
        let payload: Vec<u8> = (0..3000u32).map(|i| i as u8).collect();
        let value = Value::Binary(payload.clone());

        let mut buf = BytesMut::new();
        FieldData::from_value(value).write(&fmt, &mut buf).unwrap();

        let mut reader = Reader::new(&buf);
        let back = FieldData::read(&fmt, &mut reader).unwrap();
        assert_eq!(back.value, Value::Binary(payload));
        assert!(reader.is_empty());
    }

    #[test]
    fn test_fmt_type_info_round_trip() {
        let mut fmt = FieldFmt::new(DataType::DecN);
        fmt.max_length = 10;
        fmt.precision = 18;
        fmt.scale = 4;

        let mut buf = BytesMut::new();
        fmt.write_type_info(&mut buf).unwrap();

        let mut back = FieldFmt::new(DataType::DecN);
        let mut reader = Reader::new(&buf);
        back.read_type_info(&mut reader).unwrap();

        assert_eq!(back.max_length, 10);
        assert_eq!(back.precision, 18);
        assert_eq!(back.scale, 4);
    }

    #[test]
    fn test_incomplete_field_data() {
        let fmt = FieldFmt::new(DataType::Int8);
        let mut reader = Reader::new(&[0x01, 0x02]);
        assert!(FieldData::read(&fmt, &mut reader).unwrap_err().is_incomplete());
    }
}
