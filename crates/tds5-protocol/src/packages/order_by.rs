//! ORDERBY and ORDERBY2, the column order of a sorted result set.
//!
//! ORDERBY2 carries the same information with 16 bit column numbers for
//! result sets wider than 255 columns.

use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::wire::Reader;

/// Column order of a sorted result set, 1-based column numbers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrderByPackage {
    /// Columns in sort order.
    pub column_order: Vec<u16>,
    /// Whether this came through the wide token.
    pub wide: bool,
}

impl OrderByPackage {
    /// Read a narrow ORDERBY body following the token byte.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated input.
    pub fn read_from(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        let count = reader.u16_le()? as usize;
        let mut column_order = Vec::with_capacity(count);
        for _ in 0..count {
            column_order.push(u16::from(reader.u8()?));
        }
        Ok(Self {
            column_order,
            wide: false,
        })
    }

    /// Read a wide ORDERBY2 body following the token byte.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated input or a length mismatch.
    pub fn read_from_wide(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        let length = reader.u32_le()? as usize;
        let start = reader.position();

        let count = reader.u16_le()? as usize;
        let mut column_order = Vec::with_capacity(count);
        for _ in 0..count {
            column_order.push(reader.u16_le()?);
        }

        let consumed = reader.position() - start;
        if consumed != length {
            return Err(ProtocolError::LengthMismatch {
                context: "order by package",
                declared: length,
                consumed,
            });
        }
        Ok(Self {
            column_order,
            wide: true,
        })
    }

    /// Write the body following the token byte.
    pub fn write_to(&self, buf: &mut BytesMut) {
        if self.wide {
            buf.put_u32_le(2 + 2 * self.column_order.len() as u32);
            buf.put_u16_le(self.column_order.len() as u16);
            for col in &self.column_order {
                buf.put_u16_le(*col);
            }
        } else {
            buf.put_u16_le(self.column_order.len() as u16);
            for col in &self.column_order {
                buf.put_u8(*col as u8);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_narrow_round_trip() {
        let pkg = OrderByPackage {
            column_order: vec![2, 1, 3],
            wide: false,
        };

        let mut buf = BytesMut::new();
        pkg.write_to(&mut buf);

        let mut reader = Reader::new(&buf);
        assert_eq!(OrderByPackage::read_from(&mut reader).unwrap(), pkg);
    }

    #[test]
    fn test_wide_round_trip() {
        let pkg = OrderByPackage {
            column_order: vec![300, 1],
            wide: true,
        };

        let mut buf = BytesMut::new();
        pkg.write_to(&mut buf);

        let mut reader = Reader::new(&buf);
        assert_eq!(OrderByPackage::read_from_wide(&mut reader).unwrap(), pkg);
        assert!(reader.is_empty());
    }
}
