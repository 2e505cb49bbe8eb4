//! The value model and its wire conversions.
//!
//! [`Value::decode`] and [`Value::encode`] convert between the raw data
//! bytes of a field (without any length prefix) and typed values. Length
//! framing, text pointers and blob chunking are the field codec's job; this
//! module only ever sees the payload.

use bytes::{Buf, BufMut};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::datatype::DataType;
use crate::decimal::{
    Decimal, MONEY_PRECISION, MONEY_SCALE, SHORTMONEY_PRECISION, SHORTMONEY_SCALE,
};
use crate::error::TypeError;
use crate::time as asetime;

/// A single ASE value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// `bit`.
    Bit(bool),
    /// `tinyint` (unsigned on the wire).
    TinyInt(u8),
    /// `signed tinyint`.
    SignedTinyInt(i8),
    /// `smallint`.
    SmallInt(i16),
    /// `unsigned smallint`.
    UnsignedSmallInt(u16),
    /// `int`.
    Int(i32),
    /// `unsigned int`.
    UnsignedInt(u32),
    /// `bigint`.
    BigInt(i64),
    /// `unsigned bigint`.
    UnsignedBigInt(u64),
    /// `real`.
    Real(f32),
    /// `float`.
    Float(f64),
    /// `decimal`, `numeric`, `money` and `smallmoney`.
    Decimal(Decimal),
    /// Character data (`char`, `varchar`, `text`, `unitext`, ...).
    Chars(String),
    /// Binary data (`binary`, `varbinary`, `image`, ...).
    Binary(Vec<u8>),
    /// `date`.
    Date(NaiveDate),
    /// `time` or `bigtime`.
    Time(NaiveTime),
    /// `datetime`, `smalldatetime` or `bigdatetime`.
    DateTime(NaiveDateTime),
}

impl Value {
    /// Variant name, used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bit(_) => "bit",
            Self::TinyInt(_) => "tinyint",
            Self::SignedTinyInt(_) => "signed tinyint",
            Self::SmallInt(_) => "smallint",
            Self::UnsignedSmallInt(_) => "unsigned smallint",
            Self::Int(_) => "int",
            Self::UnsignedInt(_) => "unsigned int",
            Self::BigInt(_) => "bigint",
            Self::UnsignedBigInt(_) => "unsigned bigint",
            Self::Real(_) => "real",
            Self::Float(_) => "float",
            Self::Decimal(_) => "decimal",
            Self::Chars(_) => "chars",
            Self::Binary(_) => "binary",
            Self::Date(_) => "date",
            Self::Time(_) => "time",
            Self::DateTime(_) => "datetime",
        }
    }

    /// Whether this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Decode the raw data bytes of a field.
    ///
    /// `precision` and `scale` are only consulted for `decimal`/`numeric`
    /// data. Empty data for a nullable type decodes to [`Value::Null`].
    ///
    /// # Errors
    ///
    /// Returns a [`TypeError`] for malformed or mis-sized data.
    pub fn decode(
        datatype: DataType,
        precision: u8,
        scale: u8,
        data: &[u8],
    ) -> Result<Self, TypeError> {
        if data.is_empty() && (datatype.is_nullable() || datatype == DataType::Void) {
            return Ok(Self::Null);
        }

        let mut buf = data;
        let value = match datatype {
            DataType::Void => Self::Null,
            DataType::Bit => {
                expect_len(datatype, data, 1)?;
                Self::Bit(buf.get_u8() != 0)
            }
            DataType::Int1 => {
                expect_len(datatype, data, 1)?;
                Self::TinyInt(buf.get_u8())
            }
            DataType::Sint1 => {
                expect_len(datatype, data, 1)?;
                Self::SignedTinyInt(buf.get_i8())
            }
            DataType::Int2 => {
                expect_len(datatype, data, 2)?;
                Self::SmallInt(buf.get_i16_le())
            }
            DataType::Uint2 => {
                expect_len(datatype, data, 2)?;
                Self::UnsignedSmallInt(buf.get_u16_le())
            }
            DataType::Int4 => {
                expect_len(datatype, data, 4)?;
                Self::Int(buf.get_i32_le())
            }
            DataType::Uint4 => {
                expect_len(datatype, data, 4)?;
                Self::UnsignedInt(buf.get_u32_le())
            }
            DataType::Int8 => {
                expect_len(datatype, data, 8)?;
                Self::BigInt(buf.get_i64_le())
            }
            DataType::Uint8 => {
                expect_len(datatype, data, 8)?;
                Self::UnsignedBigInt(buf.get_u64_le())
            }
            DataType::Flt4 => {
                expect_len(datatype, data, 4)?;
                Self::Real(buf.get_f32_le())
            }
            DataType::Flt8 => {
                expect_len(datatype, data, 8)?;
                Self::Float(buf.get_f64_le())
            }
            DataType::IntN => match data.len() {
                1 => Self::TinyInt(buf.get_u8()),
                2 => Self::SmallInt(buf.get_i16_le()),
                4 => Self::Int(buf.get_i32_le()),
                8 => Self::BigInt(buf.get_i64_le()),
                length => return Err(TypeError::InvalidLength { datatype: "intn", length }),
            },
            DataType::UintN => match data.len() {
                1 => Self::TinyInt(buf.get_u8()),
                2 => Self::UnsignedSmallInt(buf.get_u16_le()),
                4 => Self::UnsignedInt(buf.get_u32_le()),
                8 => Self::UnsignedBigInt(buf.get_u64_le()),
                length => return Err(TypeError::InvalidLength { datatype: "uintn", length }),
            },
            DataType::FltN => match data.len() {
                4 => Self::Real(buf.get_f32_le()),
                8 => Self::Float(buf.get_f64_le()),
                length => return Err(TypeError::InvalidLength { datatype: "fltn", length }),
            },
            DataType::Money => {
                expect_len(datatype, data, 8)?;
                decode_money(&mut buf)?
            }
            DataType::ShortMoney => {
                expect_len(datatype, data, 4)?;
                decode_shortmoney(&mut buf)?
            }
            DataType::MoneyN => match data.len() {
                4 => decode_shortmoney(&mut buf)?,
                8 => decode_money(&mut buf)?,
                length => return Err(TypeError::InvalidLength { datatype: "moneyn", length }),
            },
            DataType::Date | DataType::DateN => {
                expect_len(datatype, data, 4)?;
                Self::Date(asetime::date_from_days_1900(buf.get_i32_le())?)
            }
            DataType::Time | DataType::TimeN => {
                expect_len(datatype, data, 4)?;
                Self::Time(asetime::time_from_ticks(buf.get_u32_le())?)
            }
            DataType::ShortDate => {
                expect_len(datatype, data, 4)?;
                decode_shortdate(&mut buf)?
            }
            DataType::DateTime => {
                expect_len(datatype, data, 8)?;
                decode_datetime(&mut buf)?
            }
            DataType::DateTimeN => match data.len() {
                4 => decode_shortdate(&mut buf)?,
                8 => decode_datetime(&mut buf)?,
                length => {
                    return Err(TypeError::InvalidLength { datatype: "datetimen", length })
                }
            },
            DataType::BigDateTimeN => {
                expect_len(datatype, data, 8)?;
                Self::DateTime(asetime::bigdatetime_from_micros(buf.get_u64_le())?)
            }
            DataType::BigTimeN => {
                expect_len(datatype, data, 8)?;
                Self::Time(asetime::time_from_micros(buf.get_u64_le())?)
            }
            DataType::DecN | DataType::NumN => {
                Self::Decimal(Decimal::from_wire_bytes(precision, scale, data)?)
            }
            DataType::Char
            | DataType::VarChar
            | DataType::LongChar
            | DataType::Text
            | DataType::Xml
            | DataType::Sensitivity
            | DataType::Boundary => Self::Chars(
                String::from_utf8(data.to_vec()).map_err(|e| TypeError::MalformedText {
                    encoding: "utf-8",
                    detail: e.to_string(),
                })?,
            ),
            DataType::UniText => Self::Chars(decode_utf16le(data)?),
            DataType::Binary
            | DataType::VarBinary
            | DataType::LongBinary
            | DataType::Image
            | DataType::Blob
            | DataType::Interval => Self::Binary(data.to_vec()),
        };

        Ok(value)
    }

    /// Encode the value as the raw data bytes of the given type.
    ///
    /// [`Value::Null`] encodes to no bytes; the field codec writes the zero
    /// length for nullable types.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::ValueMismatch`] if the variant does not fit the
    /// type, or a conversion error for out-of-range values.
    pub fn encode(&self, datatype: DataType) -> Result<Vec<u8>, TypeError> {
        let mut out = Vec::new();

        match (self, datatype) {
            (Self::Null, _) => {}
            (Self::Bit(b), DataType::Bit) => out.put_u8(u8::from(*b)),
            (Self::TinyInt(v), DataType::Int1 | DataType::IntN | DataType::UintN) => {
                out.put_u8(*v);
            }
            (Self::SignedTinyInt(v), DataType::Sint1) => out.put_i8(*v),
            (Self::SmallInt(v), DataType::Int2 | DataType::IntN) => out.put_i16_le(*v),
            (Self::UnsignedSmallInt(v), DataType::Uint2 | DataType::UintN) => {
                out.put_u16_le(*v);
            }
            (Self::Int(v), DataType::Int4 | DataType::IntN) => out.put_i32_le(*v),
            (Self::UnsignedInt(v), DataType::Uint4 | DataType::UintN) => out.put_u32_le(*v),
            (Self::BigInt(v), DataType::Int8 | DataType::IntN) => out.put_i64_le(*v),
            (Self::UnsignedBigInt(v), DataType::Uint8 | DataType::UintN) => {
                out.put_u64_le(*v);
            }
            (Self::Real(v), DataType::Flt4 | DataType::FltN) => out.put_f32_le(*v),
            (Self::Float(v), DataType::Flt8 | DataType::FltN) => out.put_f64_le(*v),
            (Self::Decimal(dec), DataType::DecN | DataType::NumN) => {
                out.extend_from_slice(&dec.to_wire_bytes()?);
            }
            (Self::Decimal(dec), DataType::Money) => {
                let raw = i64::try_from(dec.unscaled()).map_err(|_| {
                    TypeError::ValueMismatch { value: "decimal", datatype: "money" }
                })?;
                out.put_u32_le((raw >> 32) as u32);
                out.put_u32_le(raw as u32);
            }
            (Self::Decimal(dec), DataType::ShortMoney) => {
                let raw = i32::try_from(dec.unscaled()).map_err(|_| {
                    TypeError::ValueMismatch { value: "decimal", datatype: "shortmoney" }
                })?;
                out.put_i32_le(raw);
            }
            (Self::Date(date), DataType::Date | DataType::DateN) => {
                out.put_i32_le(asetime::days_since_1900(*date));
            }
            (Self::Time(time), DataType::Time | DataType::TimeN) => {
                out.put_u32_le(asetime::ticks_of_day(*time));
            }
            (Self::Time(time), DataType::BigTimeN) => {
                out.put_u64_le(asetime::micros_of_day(*time));
            }
            (Self::DateTime(dt), DataType::ShortDate) => {
                let days = asetime::days_since_1900(dt.date());
                let days = u16::try_from(days)
                    .map_err(|_| TypeError::DateTimeOutOfRange("shortdate"))?;
                let minutes =
                    (asetime::micros_of_day(dt.time()) / 60_000_000) as u16;
                out.put_u16_le(days);
                out.put_u16_le(minutes);
            }
            (Self::DateTime(dt), DataType::DateTime | DataType::DateTimeN) => {
                out.put_i32_le(asetime::days_since_1900(dt.date()));
                out.put_u32_le(asetime::ticks_of_day(dt.time()));
            }
            (Self::DateTime(dt), DataType::BigDateTimeN) => {
                out.put_u64_le(asetime::bigdatetime_micros(*dt));
            }
            (
                Self::Chars(s),
                DataType::Char
                | DataType::VarChar
                | DataType::LongChar
                | DataType::Text
                | DataType::Xml,
            ) => out.extend_from_slice(s.as_bytes()),
            (Self::Chars(s), DataType::UniText) => {
                for unit in s.encode_utf16() {
                    out.put_u16_le(unit);
                }
            }
            (
                Self::Binary(b),
                DataType::Binary
                | DataType::VarBinary
                | DataType::LongBinary
                | DataType::Image
                | DataType::Blob,
            ) => out.extend_from_slice(b),
            (value, datatype) => {
                return Err(TypeError::ValueMismatch {
                    value: value.kind(),
                    datatype: datatype.name(),
                });
            }
        }

        Ok(out)
    }
}

fn expect_len(datatype: DataType, data: &[u8], expected: usize) -> Result<(), TypeError> {
    if data.len() == expected {
        Ok(())
    } else {
        Err(TypeError::InvalidLength {
            datatype: datatype.name(),
            length: data.len(),
        })
    }
}

fn decode_money(buf: &mut &[u8]) -> Result<Value, TypeError> {
    let high = buf.get_u32_le();
    let low = buf.get_u32_le();
    let raw = (i64::from(high as i32) << 32) | i64::from(low);
    let dec = Decimal::from_unscaled(MONEY_PRECISION, MONEY_SCALE, i128::from(raw))?;
    Ok(Value::Decimal(dec))
}

fn decode_shortmoney(buf: &mut &[u8]) -> Result<Value, TypeError> {
    let raw = buf.get_i32_le();
    let dec = Decimal::from_unscaled(SHORTMONEY_PRECISION, SHORTMONEY_SCALE, i128::from(raw))?;
    Ok(Value::Decimal(dec))
}

fn decode_shortdate(buf: &mut &[u8]) -> Result<Value, TypeError> {
    let days = buf.get_u16_le();
    let minutes = buf.get_u16_le();
    let date = asetime::date_from_days_1900(i32::from(days))?;
    let time = asetime::time_from_micros(u64::from(minutes) * 60_000_000)?;
    Ok(Value::DateTime(NaiveDateTime::new(date, time)))
}

fn decode_datetime(buf: &mut &[u8]) -> Result<Value, TypeError> {
    let days = buf.get_i32_le();
    let ticks = buf.get_u32_le();
    let date = asetime::date_from_days_1900(days)?;
    let time = asetime::time_from_ticks(ticks)?;
    Ok(Value::DateTime(NaiveDateTime::new(date, time)))
}

fn decode_utf16le(data: &[u8]) -> Result<String, TypeError> {
    if data.len() % 2 != 0 {
        return Err(TypeError::MalformedText {
            encoding: "utf-16le",
            detail: format!("odd byte count {}", data.len()),
        });
    }

    let mut units: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    // Servers pad unitext with trailing NULs.
    while units.last() == Some(&0) {
        units.pop();
    }

    char::decode_utf16(units.into_iter())
        .collect::<Result<String, _>>()
        .map_err(|e| TypeError::MalformedText {
            encoding: "utf-16le",
            detail: e.to_string(),
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_int_round_trip() {
        let cases = [
            (Value::TinyInt(200), DataType::Int1),
            (Value::SignedTinyInt(-5), DataType::Sint1),
            (Value::SmallInt(-1234), DataType::Int2),
            (Value::Int(7_654_321), DataType::Int4),
            (Value::BigInt(-9_000_000_000), DataType::Int8),
            (Value::UnsignedSmallInt(65_000), DataType::Uint2),
            (Value::UnsignedInt(4_000_000_000), DataType::Uint4),
            (Value::UnsignedBigInt(u64::MAX), DataType::Uint8),
            (Value::Real(1.5), DataType::Flt4),
            (Value::Float(-2.25), DataType::Flt8),
            (Value::Bit(true), DataType::Bit),
        ];

        for (value, datatype) in cases {
            let wire = value.encode(datatype).unwrap();
            let back = Value::decode(datatype, 0, 0, &wire).unwrap();
            assert_eq!(back, value, "{datatype}");
        }
    }

    #[test]
    fn test_nullable_by_length() {
        let wire = Value::Int(42).encode(DataType::IntN).unwrap();
        assert_eq!(wire.len(), 4);
        assert_eq!(Value::decode(DataType::IntN, 0, 0, &wire).unwrap(), Value::Int(42));

        assert_eq!(Value::decode(DataType::IntN, 0, 0, &[]).unwrap(), Value::Null);
        assert!(Value::decode(DataType::IntN, 0, 0, &[1, 2, 3]).is_err());
    }

    #[test]
    fn test_money() {
        let dec = Decimal::from_str(MONEY_PRECISION, MONEY_SCALE, "-12.3456").unwrap();
        let wire = Value::Decimal(dec).encode(DataType::Money).unwrap();
        assert_eq!(wire.len(), 8);

        let back = Value::decode(DataType::Money, 0, 0, &wire).unwrap();
        match back {
            Value::Decimal(d) => assert_eq!(d.to_string(), "-12.3456"),
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn test_shortmoney() {
        let dec =
            Decimal::from_str(SHORTMONEY_PRECISION, SHORTMONEY_SCALE, "99.99").unwrap();
        let wire = Value::Decimal(dec).encode(DataType::ShortMoney).unwrap();
        assert_eq!(wire.len(), 4);

        let back = Value::decode(DataType::ShortMoney, 0, 0, &wire).unwrap();
        match back {
            Value::Decimal(d) => assert_eq!(d.to_string(), "99.99"),
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn test_datetime_round_trip() {
        let dt = NaiveDate::from_ymd_opt(2023, 7, 1)
            .unwrap()
            .and_hms_opt(8, 30, 15)
            .unwrap();

        let wire = Value::DateTime(dt).encode(DataType::DateTime).unwrap();
        assert_eq!(wire.len(), 8);
        assert_eq!(
            Value::decode(DataType::DateTime, 0, 0, &wire).unwrap(),
            Value::DateTime(dt)
        );
    }

    #[test]
    fn test_shortdate() {
        let dt = NaiveDate::from_ymd_opt(2000, 1, 2)
            .unwrap()
            .and_hms_opt(10, 45, 0)
            .unwrap();

        let wire = Value::DateTime(dt).encode(DataType::ShortDate).unwrap();
        assert_eq!(wire.len(), 4);
        assert_eq!(
            Value::decode(DataType::ShortDate, 0, 0, &wire).unwrap(),
            Value::DateTime(dt)
        );
    }

    #[test]
    fn test_bigdatetime() {
        let dt = NaiveDate::from_ymd_opt(2024, 12, 31)
            .unwrap()
            .and_hms_micro_opt(23, 59, 59, 999_999)
            .unwrap();

        let wire = Value::DateTime(dt).encode(DataType::BigDateTimeN).unwrap();
        assert_eq!(
            Value::decode(DataType::BigDateTimeN, 0, 0, &wire).unwrap(),
            Value::DateTime(dt)
        );
    }

    #[test]
    fn test_unitext() {
        let value = Value::Chars("grüße 🦀".to_string());
        let wire = value.encode(DataType::UniText).unwrap();
        assert_eq!(Value::decode(DataType::UniText, 0, 0, &wire).unwrap(), value);
    }

    #[test]
    fn test_unitext_trailing_nul() {
        let mut wire = Value::Chars("ab".to_string()).encode(DataType::UniText).unwrap();
        wire.extend_from_slice(&[0, 0, 0, 0]);
        assert_eq!(
            Value::decode(DataType::UniText, 0, 0, &wire).unwrap(),
            Value::Chars("ab".to_string())
        );
    }

    #[test]
    fn test_decimal_via_numn() {
        let dec = Decimal::from_str(18, 6, "123.456789").unwrap();
        let wire = Value::Decimal(dec).encode(DataType::NumN).unwrap();
        assert_eq!(
            Value::decode(DataType::NumN, 18, 6, &wire).unwrap(),
            Value::Decimal(dec)
        );
    }

    #[test]
    fn test_mismatch() {
        assert!(Value::Bit(true).encode(DataType::Int4).is_err());
        assert!(Value::Chars("x".into()).encode(DataType::Binary).is_err());
    }
}
