//! Exact decimal values
//!
//! Stored and compared without floating-point rounding: an integer digit
//! string plus a fractional-digit count. This layer never does arithmetic on
//! decimals; they round-trip through storage as canonical strings.

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// An exact decimal number: `digits` scaled down by 10^`scale`
#[derive(Debug, Clone, Copy)]
pub struct Decimal {
    digits: i128,
    scale: u32,
}

impl Decimal {
    pub fn new(digits: i128, scale: u32) -> Self {
        Self { digits, scale }
    }

    pub fn digits(&self) -> i128 {
        self.digits
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn is_zero(&self) -> bool {
        self.digits == 0
    }

    /// Strip trailing fractional zeros so equal values share one form
    fn normalized(&self) -> (i128, u32) {
        let mut digits = self.digits;
        let mut scale = self.scale;
        while scale > 0 && digits % 10 == 0 {
            digits /= 10;
            scale -= 1;
        }
        (digits, scale)
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for Decimal {}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.digits);
        }
        // split the digit string at the scale; 10^scale stops fitting
        // in u128 once the scale passes 38
        let sign = if self.digits < 0 { "-" } else { "" };
        let digits = self.digits.unsigned_abs().to_string();
        let scale = self.scale as usize;
        if digits.len() > scale {
            let (whole, frac) = digits.split_at(digits.len() - scale);
            write!(f, "{}{}.{}", sign, whole, frac)
        } else {
            write!(f, "{}0.{:0>width$}", sign, digits, width = scale)
        }
    }
}

impl FromStr for Decimal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let text = s.trim();
        let (sign, body) = match text.strip_prefix('-') {
            Some(rest) => (-1i128, rest),
            None => (1i128, text.strip_prefix('+').unwrap_or(text)),
        };
        let (whole, frac) = match body.split_once('.') {
            Some((w, f)) => (w, f),
            None => (body, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(Error::Codec(format!("invalid decimal literal: {s:?}")));
        }
        let mut digits: i128 = 0;
        for c in whole.chars().chain(frac.chars()) {
            let d = c
                .to_digit(10)
                .ok_or_else(|| Error::Codec(format!("invalid decimal literal: {s:?}")))?;
            digits = digits
                .checked_mul(10)
                .and_then(|v| v.checked_add(d as i128))
                .ok_or_else(|| Error::Codec(format!("decimal literal out of range: {s:?}")))?;
        }
        Ok(Self { digits: sign * digits, scale: frac.len() as u32 })
    }
}
