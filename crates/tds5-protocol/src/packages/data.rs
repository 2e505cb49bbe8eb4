//! ROW and PARAMS, the data packages.
//!
//! A data package has no length prefix of its own; it can only be decoded
//! against the formats of the PARAMFMT or ROWFMT that preceded it in the
//! stream.

use std::sync::Arc;

use bytes::BytesMut;

use ase_types::Value;

use crate::error::ProtocolError;
use crate::field::{FieldData, FieldFmt};
use crate::wire::Reader;

/// One row or parameter set, decoded against its format.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPackage {
    /// The decoded fields in column order.
    pub fields: Vec<FieldData>,
    /// The formats the fields were decoded against.
    pub formats: Arc<Vec<FieldFmt>>,
}

/// A ROW package.
pub type RowPackage = DataPackage;
/// A PARAMS package.
pub type ParamsPackage = DataPackage;

impl DataPackage {
    /// Build a data package from plain values. The value count must match
    /// the format count.
    ///
    /// # Errors
    ///
    /// Returns a length mismatch error if the counts differ.
    pub fn from_values(
        formats: Arc<Vec<FieldFmt>>,
        values: Vec<Value>,
    ) -> Result<Self, ProtocolError> {
        if values.len() != formats.len() {
            return Err(ProtocolError::LengthMismatch {
                context: "data package values",
                declared: formats.len(),
                consumed: values.len(),
            });
        }
        Ok(Self {
            fields: values.into_iter().map(FieldData::from_value).collect(),
            formats,
        })
    }

    /// The decoded values in column order.
    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        self.fields.iter().map(|f| f.value.clone()).collect()
    }

    /// Read the body following the token byte against known formats.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated or malformed input.
    pub fn read_from(
        reader: &mut Reader<'_>,
        formats: &Arc<Vec<FieldFmt>>,
    ) -> Result<Self, ProtocolError> {
        let mut fields = Vec::with_capacity(formats.len());
        for fmt in formats.iter() {
            fields.push(FieldData::read(fmt, reader)?);
        }
        Ok(Self {
            fields,
            formats: Arc::clone(formats),
        })
    }

    /// Write the body following the token byte.
    ///
    /// # Errors
    ///
    /// Returns an error if a value does not fit its format.
    pub fn write_to(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        for (field, fmt) in self.fields.iter().zip(self.formats.iter()) {
            field.write(fmt, buf)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ase_types::DataType;

    fn formats() -> Arc<Vec<FieldFmt>> {
        let mut id = FieldFmt::named(DataType::IntN, "id");
        id.max_length = 4;
        let mut name = FieldFmt::named(DataType::VarChar, "name");
        name.max_length = 32;
        Arc::new(vec![id, name])
    }

    #[test]
    fn test_round_trip() {
        let formats = formats();
        let pkg = DataPackage::from_values(
            Arc::clone(&formats),
            vec![Value::Int(7), Value::Chars("au_id".into())],
        )
        .unwrap();

        let mut buf = BytesMut::new();
        pkg.write_to(&mut buf).unwrap();

        let mut reader = Reader::new(&buf);
        let back = DataPackage::read_from(&mut reader, &formats).unwrap();
        assert!(reader.is_empty());
        assert_eq!(back.values(), vec![Value::Int(7), Value::Chars("au_id".into())]);
    }

    #[test]
    fn test_value_count_mismatch() {
        assert!(DataPackage::from_values(formats(), vec![Value::Int(1)]).is_err());
    }

    #[test]
    fn test_truncated_row_is_incomplete() {
        let formats = formats();
        let pkg = DataPackage::from_values(
            Arc::clone(&formats),
            vec![Value::Int(7), Value::Chars("abcdef".into())],
        )
        .unwrap();

        let mut buf = BytesMut::new();
        pkg.write_to(&mut buf).unwrap();

        let mut reader = Reader::new(&buf[..buf.len() - 2]);
        assert!(
            DataPackage::read_from(&mut reader, &formats)
                .unwrap_err()
                .is_incomplete()
        );
    }
}
