use std::fmt;
use std::str::FromStr;

use crate::binary::BinaryError;

/// Largest scale any decimal column may carry.
pub const MAX_SCALE: u8 = 76;

/// 256-bit two's-complement integer stored as four little-endian 64-bit limbs.
///
/// Only the handful of operations decimal codecs need are implemented: sign handling,
/// multiply-add and division by small factors, and sign-extending byte conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
struct Int256([u64; 4]);

impl Int256 {
    const ZERO: Self = Self([0; 4]);

    fn from_i128(v: i128) -> Self {
        let ext = if v < 0 { u64::MAX } else { 0 };
        Self([v as u64, (v >> 64) as u64, ext, ext])
    }

    fn from_le_bytes(bytes: &[u8]) -> Self {
        let negative = bytes.last().is_some_and(|b| b & 0x80 != 0);
        let mut full = [if negative { 0xff } else { 0 }; 32];
        let n = bytes.len().min(32);
        full[..n].copy_from_slice(&bytes[..n]);

        let mut limbs = [0u64; 4];
        for (i, limb) in limbs.iter_mut().enumerate() {
            let mut word = [0u8; 8];
            word.copy_from_slice(&full[i * 8..i * 8 + 8]);
            *limb = u64::from_le_bytes(word);
        }
        Self(limbs)
    }

    fn to_le_bytes(self) -> [u8; 32] {
        let mut out = [0u8; 32];
        for (i, limb) in self.0.iter().enumerate() {
            out[i * 8..i * 8 + 8].copy_from_slice(&limb.to_le_bytes());
        }
        out
    }

    fn is_negative(&self) -> bool {
        self.0[3] >> 63 == 1
    }

    fn is_zero(&self) -> bool {
        self.0 == [0; 4]
    }

    fn wrapping_neg(self) -> Self {
        let mut out = [0u64; 4];
        let mut carry = true;
        for (dst, limb) in out.iter_mut().zip(self.0) {
            let (v, c) = (!limb).overflowing_add(u64::from(carry));
            *dst = v;
            carry = c;
        }
        Self(out)
    }

    /// Magnitude reinterpreted as an unsigned 256-bit value.
    fn unsigned_abs(self) -> Self {
        if self.is_negative() {
            self.wrapping_neg()
        } else {
            self
        }
    }

    /// Unsigned `self * mul + add`, or `None` when the result needs more than 256 bits.
    fn checked_mul_add(self, mul: u64, add: u64) -> Option<Self> {
        let mut out = [0u64; 4];
        let mut carry = u128::from(add);
        for (dst, limb) in out.iter_mut().zip(self.0) {
            let product = u128::from(limb) * u128::from(mul) + carry;
            *dst = product as u64;
            carry = product >> 64;
        }
        (carry == 0).then_some(Self(out))
    }

    /// Unsigned division by a small divisor, returning quotient and remainder.
    fn div_rem_small(self, divisor: u64) -> (Self, u64) {
        let mut out = [0u64; 4];
        let mut rem = 0u128;
        for i in (0..4).rev() {
            let cur = (rem << 64) | u128::from(self.0[i]);
            out[i] = (cur / u128::from(divisor)) as u64;
            rem = cur % u128::from(divisor);
        }
        (Self(out), rem as u64)
    }

    /// Whether the value survives truncation to `width` bytes and sign extension back.
    fn fits_in(&self, width: usize) -> bool {
        let bytes = self.to_le_bytes();
        Self::from_le_bytes(&bytes[..width]) == *self
    }

    fn to_i128(self) -> Option<i128> {
        if !self.fits_in(16) {
            return None;
        }
        Some((u128::from(self.0[0]) | (u128::from(self.0[1]) << 64)) as i128)
    }
}

/// Fixed-point decimal: an unscaled 256-bit integer and a decimal scale.
///
/// Equality is structural, so `1.0` and `1.00` compare unequal. Use [`Decimal::rescale`]
/// to compare values of different scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Decimal {
    unscaled: Int256,
    scale: u8,
}

impl Decimal {
    /// Builds a decimal equal to `unscaled * 10^-scale`.
    pub fn new(unscaled: i128, scale: u8) -> Self {
        Self {
            unscaled: Int256::from_i128(unscaled),
            scale,
        }
    }

    /// Decodes a little-endian two's-complement integer of any width up to 32 bytes.
    pub fn from_le_bytes(bytes: &[u8], scale: u8) -> Self {
        Self {
            unscaled: Int256::from_le_bytes(bytes),
            scale,
        }
    }

    /// Encodes the unscaled integer in `width` bytes, failing when it does not fit.
    pub fn to_le_bytes(&self, width: usize) -> Result<Vec<u8>, BinaryError> {
        if width > 32 || !self.unscaled.fits_in(width) {
            return Err(BinaryError::malformed(format!(
                "decimal {self} does not fit in {} bits",
                width * 8
            )));
        }
        Ok(self.unscaled.to_le_bytes()[..width].to_vec())
    }

    pub fn scale(&self) -> u8 {
        self.scale
    }

    pub fn is_negative(&self) -> bool {
        self.unscaled.is_negative()
    }

    /// The unscaled integer, when it fits in 128 bits.
    pub fn unscaled_i128(&self) -> Option<i128> {
        self.unscaled.to_i128()
    }

    /// Changes the scale. Dropped digits round half away from zero.
    pub fn rescale(&self, scale: u8) -> Result<Self, BinaryError> {
        let negative = self.is_negative();
        let mut magnitude = self.unscaled.unsigned_abs();

        if scale >= self.scale {
            for _ in self.scale..scale {
                magnitude = magnitude
                    .checked_mul_add(10, 0)
                    .ok_or_else(|| BinaryError::malformed(format!("decimal {self} overflows at scale {scale}")))?;
            }
        } else {
            let mut last = 0;
            for _ in scale..self.scale {
                let (q, r) = magnitude.div_rem_small(10);
                magnitude = q;
                last = r;
            }
            if last >= 5 {
                magnitude = magnitude
                    .checked_mul_add(1, 1)
                    .ok_or_else(|| BinaryError::malformed("decimal overflow while rounding"))?;
            }
        }

        if magnitude.is_negative() {
            return Err(BinaryError::malformed(format!("decimal {self} overflows 256 bits")));
        }
        let unscaled = if negative {
            magnitude.wrapping_neg()
        } else {
            magnitude
        };
        Ok(Self { unscaled, scale })
    }

    /// Lossy conversion for display and projection into floats.
    pub fn to_f64(&self) -> f64 {
        self.to_string().parse().unwrap_or(f64::NAN)
    }

    /// Exact decimal form of a finite float.
    pub fn from_f64(v: f64) -> Result<Self, BinaryError> {
        if !v.is_finite() {
            return Err(BinaryError::malformed(format!("{v} is not a finite decimal")));
        }
        v.to_string().parse()
    }
}

impl From<i64> for Decimal {
    fn from(v: i64) -> Self {
        Self::new(i128::from(v), 0)
    }
}

impl FromStr for Decimal {
    type Err = BinaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let (negative, digits) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(BinaryError::malformed(format!("invalid decimal {s:?}")));
        }
        if frac_part.len() > usize::from(MAX_SCALE) {
            return Err(BinaryError::malformed(format!("decimal {s:?} has too many fractional digits")));
        }

        let mut magnitude = Int256::ZERO;
        for ch in int_part.chars().chain(frac_part.chars()) {
            let digit = ch
                .to_digit(10)
                .ok_or_else(|| BinaryError::malformed(format!("invalid decimal {s:?}")))?;
            magnitude = magnitude
                .checked_mul_add(10, u64::from(digit))
                .ok_or_else(|| BinaryError::malformed(format!("decimal {s:?} overflows 256 bits")))?;
        }
        if magnitude.is_negative() {
            return Err(BinaryError::malformed(format!("decimal {s:?} overflows 256 bits")));
        }

        let unscaled = if negative {
            magnitude.wrapping_neg()
        } else {
            magnitude
        };
        Ok(Self {
            unscaled,
            scale: frac_part.len() as u8,
        })
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut magnitude = self.unscaled.unsigned_abs();
        let mut digits = Vec::new();
        while !magnitude.is_zero() {
            let (q, r) = magnitude.div_rem_small(10);
            digits.push(b'0' + r as u8);
            magnitude = q;
        }

        let scale = usize::from(self.scale);
        while digits.len() < scale + 1 {
            digits.push(b'0');
        }
        digits.reverse();

        let mut out = String::with_capacity(digits.len() + 2);
        if self.is_negative() {
            out.push('-');
        }
        let point = digits.len() - scale;
        out.push_str(&String::from_utf8_lossy(&digits[..point]));
        if scale > 0 {
            out.push('.');
            out.push_str(&String::from_utf8_lossy(&digits[point..]));
        }
        f.write_str(&out)
    }
}
