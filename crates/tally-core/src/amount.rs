//! Fixed-point values for amounts and ratios.
//!
//! Every monetary value and every ratio is a scaled integer with
//! [`DECIMALS`] decimal places. On the wire a value is a bare numeric
//! literal in the shortest decimal form the verifier would print for the
//! same number: trailing zeros trimmed, and exponent form (`1.5e-7`) below
//! `10^-6`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;
use std::fmt;
use std::str::FromStr;

use crate::constants::{COIN, DECIMALS, EXPONENT_FORM_BELOW_UNITS};
use crate::error::AmountError;

/// A non-negative fixed-point number with 8 decimal places.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fixed(u64);

/// A monetary amount.
pub type Amount = Fixed;

/// A proportion where [`Fixed::ONE`] is 100%.
pub type Ratio = Fixed;

impl Fixed {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(COIN);
    pub const MAX: Self = Self(u64::MAX);

    /// Create a value from raw scaled units.
    pub const fn from_units(units: u64) -> Self {
        Self(units)
    }

    /// Raw scaled units.
    pub const fn units(self) -> u64 {
        self.0
    }

    /// Create a value from whole coins. Returns `None` on overflow.
    pub fn from_coins(coins: u64) -> Option<Self> {
        coins.checked_mul(COIN).map(Self)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// `self * num / den`, rounded down. `None` if `den` is zero or the
    /// result does not fit.
    pub fn mul_div(self, num: Self, den: Self) -> Option<Self> {
        if den.0 == 0 {
            return None;
        }
        let wide = (self.0 as u128) * (num.0 as u128) / (den.0 as u128);
        u64::try_from(wide).ok().map(Self)
    }

    /// Scale by a ratio, rounded down.
    pub fn mul_ratio(self, ratio: Ratio) -> Self {
        // ratio <= ONE keeps this in range; larger ratios saturate.
        self.mul_div(ratio, Self::ONE).unwrap_or(Self::MAX)
    }

    /// Sum an iterator of values, `None` on overflow.
    pub fn checked_sum<I: IntoIterator<Item = Self>>(values: I) -> Option<Self> {
        values
            .into_iter()
            .try_fold(Self::ZERO, |acc, v| acc.checked_add(v))
    }

    /// The numeric literal written by the canonical encoder.
    pub fn to_wire_literal(self) -> String {
        if self.0 != 0 && self.0 < EXPONENT_FORM_BELOW_UNITS {
            let digits = self.0.to_string();
            let exp = digits.len() as i32 - 1 - DECIMALS as i32;
            let (head, tail) = digits.split_at(1);
            let tail = tail.trim_end_matches('0');
            if tail.is_empty() {
                format!("{head}e{exp}")
            } else {
                format!("{head}.{tail}e{exp}")
            }
        } else {
            self.to_string()
        }
    }
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / COIN;
        let frac = self.0 % COIN;
        if frac == 0 {
            return write!(f, "{whole}");
        }
        let frac = format!("{frac:08}");
        write!(f, "{whole}.{}", frac.trim_end_matches('0'))
    }
}

impl FromStr for Fixed {
    type Err = AmountError;

    /// Parse a decimal literal, with optional exponent, exactly.
    ///
    /// Literals with more precision than [`DECIMALS`] are rejected rather
    /// than rounded.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AmountError::Empty);
        }
        if s.starts_with('-') {
            return Err(AmountError::Negative(s.to_string()));
        }
        let literal = s.strip_prefix('+').unwrap_or(s);
        let invalid = || AmountError::InvalidLiteral(s.to_string());

        let (mantissa, exp) = match literal.find(['e', 'E']) {
            Some(i) => {
                let exp: i64 = literal[i + 1..].parse().map_err(|_| invalid())?;
                (&literal[..i], exp)
            }
            None => (literal, 0),
        };
        let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let digits = format!("{int_part}{frac_part}");
        let digits = digits.trim_start_matches('0');
        if digits.is_empty() {
            return Ok(Self::ZERO);
        }

        let too_precise = || AmountError::TooPrecise {
            literal: s.to_string(),
            max: DECIMALS,
        };
        let frac_len = i64::try_from(frac_part.len()).map_err(|_| too_precise())?;
        let shift = exp
            .checked_sub(frac_len)
            .and_then(|e| e.checked_add(i64::from(DECIMALS)))
            .ok_or_else(|| if exp < 0 { too_precise() } else { AmountError::Overflow })?;
        let kept = if shift >= 0 {
            digits
        } else {
            let cut = usize::try_from(shift.unsigned_abs()).map_err(|_| too_precise())?;
            if cut >= digits.len() {
                return Err(too_precise());
            }
            let (kept, dropped) = digits.split_at(digits.len() - cut);
            if dropped.bytes().any(|b| b != b'0') {
                return Err(too_precise());
            }
            kept
        };

        let base: u128 = kept.parse().map_err(|_| AmountError::Overflow)?;
        let scale = u32::try_from(shift.max(0))
            .ok()
            .and_then(|p| 10u128.checked_pow(p))
            .ok_or(AmountError::Overflow)?;
        let units = base.checked_mul(scale).ok_or(AmountError::Overflow)?;
        u64::try_from(units)
            .map(Self)
            .map_err(|_| AmountError::Overflow)
    }
}

impl Serialize for Fixed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let raw = RawValue::from_string(self.to_wire_literal()).map_err(serde::ser::Error::custom)?;
        raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Fixed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Box::<RawValue>::deserialize(deserializer)?;
        let text = raw.get();
        let text = text
            .strip_prefix('"')
            .and_then(|t| t.strip_suffix('"'))
            .unwrap_or(text);
        text.parse().map_err(serde::de::Error::custom)
    }
}
