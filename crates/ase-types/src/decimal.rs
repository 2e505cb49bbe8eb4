//! Decimal, numeric and money value carrier.
//!
//! A [`Decimal`] only carries enough information to display and transport
//! the value; it is not an arithmetic type. ASE caps decimals at 38 digits,
//! which fits an `i128` unscaled integer.

use crate::error::TypeError;

/// Highest precision ASE supports for decimal and numeric columns.
pub const MAX_DECIMAL_DIGITS: u8 = 38;

/// Default precision for decimal columns.
pub const DEFAULT_PRECISION: u8 = 18;
/// Default scale for decimal columns.
pub const DEFAULT_SCALE: u8 = 0;

/// Precision of the fixed `money` type.
pub const MONEY_PRECISION: u8 = 20;
/// Scale of the fixed `money` type.
pub const MONEY_SCALE: u8 = 4;

/// Precision of the fixed `smallmoney` type.
pub const SHORTMONEY_PRECISION: u8 = 10;
/// Scale of the fixed `smallmoney` type.
pub const SHORTMONEY_SCALE: u8 = 4;

// Bytes required to store the unscaled integer of a decimal, indexed by
// precision.
const NUM_BYTES: [u8; 39] = [
    1, //
    2, 2, 3, 3, 4, 4, 4, //
    5, 5, 6, 6, 6, //
    7, 7, 8, 8, 9, 9, 9, //
    10, 10, 11, 11, 11, //
    12, 12, 13, 13, 14, 14, 14, //
    15, 15, 16, 16, 16, //
    17, 17,
];

/// Bytes required to store the unscaled integer of a decimal with the
/// given precision, not counting the sign byte.
///
/// # Errors
///
/// Returns [`TypeError::PrecisionOutOfRange`] if the precision exceeds
/// [`MAX_DECIMAL_DIGITS`].
pub fn decimal_byte_size(precision: u8) -> Result<usize, TypeError> {
    NUM_BYTES
        .get(precision as usize)
        .map(|b| *b as usize)
        .ok_or(TypeError::PrecisionOutOfRange(precision))
}

/// A decimal value with fixed precision and scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decimal {
    /// Total number of digits.
    pub precision: u8,
    /// Digits right of the decimal point.
    pub scale: u8,
    unscaled: i128,
}

impl Decimal {
    /// Create a zero-valued decimal with the given precision and scale.
    ///
    /// # Errors
    ///
    /// Returns an error for precision above 38 or a scale larger than the
    /// precision.
    pub fn new(precision: u8, scale: u8) -> Result<Self, TypeError> {
        if precision > MAX_DECIMAL_DIGITS {
            return Err(TypeError::PrecisionOutOfRange(precision));
        }
        if scale > precision {
            return Err(TypeError::ScaleOutOfRange { precision, scale });
        }
        Ok(Self {
            precision,
            scale,
            unscaled: 0,
        })
    }

    /// Create a decimal from a string literal such as `"-12.345"`.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid precision/scale or an unparseable
    /// literal.
    pub fn from_str(precision: u8, scale: u8, s: &str) -> Result<Self, TypeError> {
        let mut dec = Self::new(precision, scale)?;
        dec.set_string(s)?;
        Ok(dec)
    }

    /// Create a decimal directly from an unscaled integer.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid precision/scale combination.
    pub fn from_unscaled(precision: u8, scale: u8, unscaled: i128) -> Result<Self, TypeError> {
        let mut dec = Self::new(precision, scale)?;
        dec.unscaled = unscaled;
        Ok(dec)
    }

    /// The unscaled integer representation.
    #[must_use]
    pub fn unscaled(&self) -> i128 {
        self.unscaled
    }

    /// Whether the value is negative.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.unscaled < 0
    }

    /// Number of bytes the unscaled integer occupies on the wire.
    ///
    /// # Errors
    ///
    /// Returns an error if the precision is out of range.
    pub fn byte_size(&self) -> Result<usize, TypeError> {
        decimal_byte_size(self.precision)
    }

    /// Parse a literal into the unscaled integer, keeping precision and
    /// scale untouched. The literal may carry fewer fractional digits than
    /// the scale; it is shifted up accordingly.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::InvalidDecimal`] for unparseable literals.
    pub fn set_string(&mut self, s: &str) -> Result<(), TypeError> {
        let s = s.trim();
        let (left, right) = match s.split_once('.') {
            Some((l, r)) => (l, r),
            None => (s, ""),
        };

        let joined: String = format!("{left}{right}");
        let mut unscaled: i128 = joined
            .parse()
            .map_err(|_| TypeError::InvalidDecimal(s.to_string()))?;

        // Shift up to the declared scale.
        if self.scale as usize > right.len() {
            let shift = self.scale as usize - right.len();
            for _ in 0..shift {
                unscaled = unscaled
                    .checked_mul(10)
                    .ok_or_else(|| TypeError::InvalidDecimal(s.to_string()))?;
            }
        }

        self.unscaled = unscaled;
        Ok(())
    }

    /// Encode as wire bytes: sign byte (0x01 when negative) followed by the
    /// big-endian unscaled magnitude, zero-padded to the precision's byte
    /// size.
    ///
    /// # Errors
    ///
    /// Returns an error if the precision is out of range.
    pub fn to_wire_bytes(&self) -> Result<Vec<u8>, TypeError> {
        let size = self.byte_size()?;
        let mut out = vec![0u8; 1 + size];
        if self.is_negative() {
            out[0] = 0x01;
        }

        let magnitude = self.unscaled.unsigned_abs();
        let be = magnitude.to_be_bytes();
        // Keep the low `size` bytes of the 16 byte big-endian image. A
        // precision-38 value occupies at most 16 significant bytes, so the
        // 17th wire byte stays zero.
        let copy = size.min(be.len());
        out[1 + size - copy..].copy_from_slice(&be[be.len() - copy..]);

        Ok(out)
    }

    /// Decode from wire bytes: sign byte followed by big-endian magnitude.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid precision/scale or a magnitude that does
    /// not fit the precision.
    pub fn from_wire_bytes(precision: u8, scale: u8, bytes: &[u8]) -> Result<Self, TypeError> {
        let mut dec = Self::new(precision, scale)?;
        if bytes.is_empty() {
            return Err(TypeError::InvalidLength {
                datatype: "decimal",
                length: 0,
            });
        }

        let negative = bytes[0] & 0x01 == 0x01;
        let magnitude = &bytes[1..];
        if magnitude.len() > 17 {
            return Err(TypeError::InvalidLength {
                datatype: "decimal",
                length: bytes.len(),
            });
        }

        let mut value: u128 = 0;
        for &b in magnitude {
            value = value
                .checked_mul(256)
                .and_then(|v| v.checked_add(u128::from(b)))
                .ok_or(TypeError::InvalidLength {
                    datatype: "decimal",
                    length: bytes.len(),
                })?;
        }
        if value > i128::MAX as u128 {
            return Err(TypeError::InvalidDecimal(format!(
                "magnitude too large for precision {precision}"
            )));
        }

        dec.unscaled = if negative {
            -(value as i128)
        } else {
            value as i128
        };
        Ok(dec)
    }
}

impl std::fmt::Display for Decimal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let digits = format!(
            "{:0>width$}",
            self.unscaled.unsigned_abs(),
            width = self.precision as usize
        );
        let split = digits.len() - self.scale as usize;

        let mut left = digits[..split].trim_start_matches('0');
        if left.is_empty() {
            left = "0";
        }
        let mut right = digits[split..].trim_end_matches('0');
        if right.is_empty() {
            right = "0";
        }

        let neg = if self.is_negative() { "-" } else { "" };
        write!(f, "{neg}{left}.{right}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_size_table() {
        assert_eq!(decimal_byte_size(0).unwrap(), 1);
        assert_eq!(decimal_byte_size(1).unwrap(), 2);
        assert_eq!(decimal_byte_size(18).unwrap(), 9);
        assert_eq!(decimal_byte_size(36).unwrap(), 16);
        assert_eq!(decimal_byte_size(37).unwrap(), 17);
        assert_eq!(decimal_byte_size(38).unwrap(), 17);
        assert!(decimal_byte_size(39).is_err());
    }

    #[test]
    fn test_byte_size_covers_every_precision() {
        let mut previous = 0;
        for precision in 0..=MAX_DECIMAL_DIGITS {
            let size = decimal_byte_size(precision).unwrap();
            assert!(size >= previous, "table must not shrink at {precision}");
            previous = size;
        }
        assert_eq!(previous, 17);
    }

    #[test]
    fn test_from_str() {
        let dec = Decimal::from_str(10, 4, "12.3").unwrap();
        assert_eq!(dec.unscaled(), 123_000);

        let dec = Decimal::from_str(10, 2, "-1.25").unwrap();
        assert_eq!(dec.unscaled(), -125);

        let dec = Decimal::from_str(5, 0, "42").unwrap();
        assert_eq!(dec.unscaled(), 42);
    }

    #[test]
    fn test_display() {
        let dec = Decimal::from_unscaled(10, 4, 123_000).unwrap();
        assert_eq!(dec.to_string(), "12.3");

        let dec = Decimal::from_unscaled(10, 2, -125).unwrap();
        assert_eq!(dec.to_string(), "-1.25");

        let dec = Decimal::from_unscaled(5, 0, 42).unwrap();
        assert_eq!(dec.to_string(), "42.0");

        let dec = Decimal::from_unscaled(5, 2, 0).unwrap();
        assert_eq!(dec.to_string(), "0.0");
    }

    #[test]
    fn test_wire_round_trip() {
        let dec = Decimal::from_str(18, 4, "-9876.5432").unwrap();
        let wire = dec.to_wire_bytes().unwrap();
        assert_eq!(wire.len(), 1 + 9);
        assert_eq!(wire[0], 0x01);

        let back = Decimal::from_wire_bytes(18, 4, &wire).unwrap();
        assert_eq!(back, dec);
        assert_eq!(back.to_string(), "-9876.5432");
    }

    #[test]
    fn test_wire_max_precision() {
        let dec =
            Decimal::from_unscaled(38, 0, 99_999_999_999_999_999_999_999_999_999_999_999_999)
                .unwrap();
        let wire = dec.to_wire_bytes().unwrap();
        assert_eq!(wire.len(), 1 + 17);
        let back = Decimal::from_wire_bytes(38, 0, &wire).unwrap();
        assert_eq!(back, dec);
    }

    #[test]
    fn test_invalid_combinations() {
        assert!(Decimal::new(39, 0).is_err());
        assert!(Decimal::new(10, 11).is_err());
        assert!(Decimal::from_str(10, 2, "not a number").is_err());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn wire_round_trip(unscaled in any::<i64>(), scale in 0u8..=18) {
            let dec = Decimal::from_unscaled(18, scale, i128::from(unscaled)).unwrap();
            let wire = dec.to_wire_bytes().unwrap();
            prop_assert_eq!(wire.len(), 1 + decimal_byte_size(18).unwrap());
            prop_assert_eq!(Decimal::from_wire_bytes(18, scale, &wire).unwrap(), dec);
        }

        #[test]
        fn display_parse_round_trip(
            unscaled in -999_999_999_999_999_999i64..=999_999_999_999_999_999,
            scale in 1u8..=6,
        ) {
            let dec = Decimal::from_unscaled(18, scale, i128::from(unscaled)).unwrap();
            let back = Decimal::from_str(18, scale, &dec.to_string()).unwrap();
            prop_assert_eq!(back, dec);
        }
    }
}
