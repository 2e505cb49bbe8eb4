//! PARAMFMT and ROWFMT packages and their wide variants.
//!
//! A format package describes the fields of the PARAMS or ROW packages
//! that follow it. The wide variants use a 32 bit package length and
//! 32 bit field status; wide row formats additionally name label,
//! catalogue, schema and table per column.

use std::sync::Arc;

use bytes::{BufMut, BytesMut};

use ase_types::DataType;

use crate::error::ProtocolError;
use crate::field::{FieldFmt, FmtStatus};
use crate::wire::{self, Reader};

fn read_common_field(
    reader: &mut Reader<'_>,
    wide: bool,
) -> Result<FieldFmt, ProtocolError> {
    let name = reader.u8_string("field name")?;
    let status = if wide {
        reader.u32_le()?
    } else {
        u32::from(reader.u8()?)
    };
    let usertype = reader.i32_le()?;
    let datatype = DataType::try_from(reader.u8()?).map_err(ProtocolError::Type)?;

    let mut fmt = FieldFmt::named(datatype, name);
    fmt.status = FmtStatus::from_bits_truncate(status);
    fmt.usertype = usertype;
    fmt.read_type_info(reader)?;
    fmt.locale_info = reader.u8_string("locale info")?;
    Ok(fmt)
}

fn write_common_field(
    buf: &mut BytesMut,
    fmt: &FieldFmt,
    wide: bool,
) -> Result<(), ProtocolError> {
    wire::put_u8_string(buf, &fmt.name, "field name")?;
    if wide {
        buf.put_u32_le(fmt.status.bits());
    } else {
        buf.put_u8(fmt.status.bits() as u8);
    }
    buf.put_i32_le(fmt.usertype);
    buf.put_u8(fmt.datatype as u8);
    fmt.write_type_info(buf)?;
    wire::put_u8_string(buf, &fmt.locale_info, "locale info")?;
    Ok(())
}

fn read_length(reader: &mut Reader<'_>, wide: bool) -> Result<usize, ProtocolError> {
    if wide {
        Ok(reader.u32_le()? as usize)
    } else {
        Ok(reader.u16_le()? as usize)
    }
}

fn write_framed(buf: &mut BytesMut, body: &BytesMut, wide: bool) {
    if wide {
        buf.put_u32_le(body.len() as u32);
    } else {
        buf.put_u16_le(body.len() as u16);
    }
    buf.put_slice(body);
}

/// Format of the parameters in a following PARAMS package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamFmtPackage {
    /// Field formats, shared with the data packages reading against them.
    pub fields: Arc<Vec<FieldFmt>>,
    /// Whether this is the PARAMFMT2 variant.
    pub wide: bool,
}

impl ParamFmtPackage {
    /// Create a parameter format package.
    #[must_use]
    pub fn new(fields: Vec<FieldFmt>) -> Self {
        Self {
            fields: Arc::new(fields),
            wide: false,
        }
    }

    /// Read the body following the token byte.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated or malformed input.
    pub fn read_from(reader: &mut Reader<'_>, wide: bool) -> Result<Self, ProtocolError> {
        let length = read_length(reader, wide)?;
        let start = reader.position();

        let count = reader.u16_le()? as usize;
        let mut fields = Vec::with_capacity(count);
        for _ in 0..count {
            fields.push(read_common_field(reader, wide)?);
        }

        let consumed = reader.position() - start;
        if consumed != length {
            return Err(ProtocolError::LengthMismatch {
                context: "param format package",
                declared: length,
                consumed,
            });
        }

        Ok(Self {
            fields: Arc::new(fields),
            wide,
        })
    }

    /// Write the body following the token byte.
    ///
    /// # Errors
    ///
    /// Returns an error for over-long names.
    pub fn write_to(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let mut body = BytesMut::new();
        body.put_u16_le(self.fields.len() as u16);
        for fmt in self.fields.iter() {
            write_common_field(&mut body, fmt, self.wide)?;
        }
        write_framed(buf, &body, self.wide);
        Ok(())
    }
}

/// Format of the columns in following ROW packages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFmtPackage {
    /// Column formats, shared with the row packages reading against them.
    pub fields: Arc<Vec<FieldFmt>>,
    /// Whether this is the ROWFMT2 variant.
    pub wide: bool,
}

impl RowFmtPackage {
    /// Create a row format package.
    #[must_use]
    pub fn new(fields: Vec<FieldFmt>) -> Self {
        Self {
            fields: Arc::new(fields),
            wide: false,
        }
    }

    /// Read the body following the token byte.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated or malformed input.
    pub fn read_from(reader: &mut Reader<'_>, wide: bool) -> Result<Self, ProtocolError> {
        let length = read_length(reader, wide)?;
        let start = reader.position();

        let count = reader.u16_le()? as usize;
        let mut fields = Vec::with_capacity(count);
        for _ in 0..count {
            let (label, catalogue, schema, table) = if wide {
                (
                    reader.u8_string("column label")?,
                    reader.u8_string("catalogue")?,
                    reader.u8_string("schema")?,
                    reader.u8_string("table")?,
                )
            } else {
                Default::default()
            };

            let mut fmt = read_common_field(reader, wide)?;
            fmt.column_label = label;
            fmt.catalogue = catalogue;
            fmt.schema = schema;
            fmt.table = table;
            fields.push(fmt);
        }

        let consumed = reader.position() - start;
        if consumed != length {
            return Err(ProtocolError::LengthMismatch {
                context: "row format package",
                declared: length,
                consumed,
            });
        }

        Ok(Self {
            fields: Arc::new(fields),
            wide,
        })
    }

    /// Write the body following the token byte.
    ///
    /// # Errors
    ///
    /// Returns an error for over-long names.
    pub fn write_to(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let mut body = BytesMut::new();
        body.put_u16_le(self.fields.len() as u16);
        for fmt in self.fields.iter() {
            if self.wide {
                wire::put_u8_string(&mut body, &fmt.column_label, "column label")?;
                wire::put_u8_string(&mut body, &fmt.catalogue, "catalogue")?;
                wire::put_u8_string(&mut body, &fmt.schema, "schema")?;
                wire::put_u8_string(&mut body, &fmt.table, "table")?;
            }
            write_common_field(&mut body, fmt, self.wide)?;
        }
        write_framed(buf, &body, self.wide);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_fields() -> Vec<FieldFmt> {
        let mut int_col = FieldFmt::named(DataType::IntN, "id");
        int_col.max_length = 4;

        let mut char_col = FieldFmt::named(DataType::VarChar, "name");
        char_col.max_length = 64;
        char_col.status = FmtStatus::NULL_ALLOWED;

        let mut dec_col = FieldFmt::named(DataType::NumN, "price");
        dec_col.max_length = 17;
        dec_col.precision = 18;
        dec_col.scale = 2;

        vec![int_col, char_col, dec_col]
    }

    #[test]
    fn test_param_fmt_round_trip() {
        let pkg = ParamFmtPackage::new(sample_fields());

        let mut buf = BytesMut::new();
        pkg.write_to(&mut buf).unwrap();

        let mut reader = Reader::new(&buf);
        let back = ParamFmtPackage::read_from(&mut reader, false).unwrap();
        assert!(reader.is_empty());
        assert_eq!(back.fields, pkg.fields);
    }

    #[test]
    fn test_row_fmt_round_trip() {
        let pkg = RowFmtPackage::new(sample_fields());

        let mut buf = BytesMut::new();
        pkg.write_to(&mut buf).unwrap();

        let mut reader = Reader::new(&buf);
        let back = RowFmtPackage::read_from(&mut reader, false).unwrap();
        assert!(reader.is_empty());
        assert_eq!(back.fields, pkg.fields);
    }

    #[test]
    fn test_wide_row_fmt_round_trip() {
        let mut fields = sample_fields();
        for fmt in &mut fields {
            fmt.schema = "dbo".into();
            fmt.table = "titles".into();
        }
        let pkg = RowFmtPackage {
            fields: Arc::new(fields),
            wide: true,
        };

        let mut buf = BytesMut::new();
        pkg.write_to(&mut buf).unwrap();

        let mut reader = Reader::new(&buf);
        let back = RowFmtPackage::read_from(&mut reader, true).unwrap();
        assert!(reader.is_empty());
        assert_eq!(back.fields, pkg.fields);
        assert_eq!(back.fields[0].table, "titles");
    }

    #[test]
    fn test_truncated_fmt_is_incomplete() {
        let pkg = RowFmtPackage::new(sample_fields());
        let mut buf = BytesMut::new();
        pkg.write_to(&mut buf).unwrap();

        let mut reader = Reader::new(&buf[..buf.len() - 3]);
        assert!(
            RowFmtPackage::read_from(&mut reader, false)
                .unwrap_err()
                .is_incomplete()
        );
    }
}
