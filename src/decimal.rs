/// Arbitrary-precision decimal values
///
/// The wire representation for NUMERIC parameters and columns is always a
/// decimal string, so this type is a canonical-string newtype rather than a
/// binary decimal implementation. Canonicalization normalizes exponents,
/// sign and leading zeros so that equal values compare equal as strings.
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// How far below the decimal point a value may sit before the canonical
/// form falls back to exponent notation.
const MIN_PLAIN_EXPONENT: i64 = -4;

/// Maximum digits-before-the-point for which trailing zeros are written out
/// instead of an exponent suffix.
const MAX_PLAIN_EXPONENT: i64 = 8;

/// An arbitrary-precision decimal in canonical string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Decimal(String);

impl Decimal {
    /// Parse and canonicalize a decimal string.
    ///
    /// Accepts an optional sign, digits with an optional fraction, and an
    /// optional `e`/`E` exponent.
    pub fn new(input: &str) -> Result<Self> {
        let (negative, digits, exponent) = parse(input)?;
        Ok(Decimal(render(negative, &digits, exponent)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Decimal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Decimal::new(s)
    }
}

impl From<i64> for Decimal {
    fn from(v: i64) -> Self {
        Decimal(v.to_string())
    }
}

impl From<u64> for Decimal {
    fn from(v: u64) -> Self {
        Decimal(v.to_string())
    }
}

/// Decompose the input into (negative, significant digits, exponent).
///
/// The digit string has no leading or trailing zeros; the value is
/// `0.<digits> × 10^exponent`. Zero comes back as an empty digit string.
fn parse(input: &str) -> Result<(bool, String, i64)> {
    let bad = || Error::DecimalFormat {
        input: input.to_string(),
    };

    let s = input.trim();
    let (negative, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };

    let (mantissa, exp_part) = match s.find(['e', 'E']) {
        Some(pos) => (&s[..pos], Some(&s[pos + 1..])),
        None => (s, None),
    };

    let mut exponent: i64 = match exp_part {
        Some(e) if !e.is_empty() => e.parse().map_err(|_| bad())?,
        Some(_) => return Err(bad()),
        None => 0,
    };

    let (int_part, frac_part) = match mantissa.find('.') {
        Some(pos) => (&mantissa[..pos], &mantissa[pos + 1..]),
        None => (mantissa, ""),
    };

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(bad());
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(bad());
    }

    // Point sits after the integer digits: value = 0.<int><frac> × 10^len(int).
    exponent = exponent.checked_add(int_part.len() as i64).ok_or_else(bad)?;

    let mut digits = String::with_capacity(int_part.len() + frac_part.len());
    digits.push_str(int_part);
    digits.push_str(frac_part);

    // Strip leading zeros, moving the exponent with them.
    let lead = digits.bytes().take_while(|&b| b == b'0').count();
    digits.drain(..lead);
    exponent = exponent.checked_sub(lead as i64).ok_or_else(bad)?;

    // Trailing zeros are not significant.
    let trail = digits.bytes().rev().take_while(|&b| b == b'0').count();
    digits.truncate(digits.len() - trail);

    if digits.is_empty() {
        exponent = 0;
    }
    Ok((negative, digits, exponent))
}

/// Render the canonical form, suppressing scientific notation within the
/// plain-exponent bounds.
fn render(negative: bool, digits: &str, exponent: i64) -> String {
    if digits.is_empty() {
        return "0".to_string();
    }

    let sign = if negative { "-" } else { "" };
    let ndigits = digits.len() as i64;

    if exponent <= 0 {
        if exponent >= MIN_PLAIN_EXPONENT {
            let zeros = "0".repeat((-exponent) as usize);
            format!("{sign}0.{zeros}{digits}")
        } else {
            format!("{sign}0.{digits}e{exponent}")
        }
    } else if exponent < ndigits {
        let (int, frac) = digits.split_at(exponent as usize);
        format!("{sign}{int}.{frac}")
    } else {
        let zeros = exponent - ndigits;
        if exponent <= MAX_PLAIN_EXPONENT {
            format!("{sign}{digits}{}", "0".repeat(zeros as usize))
        } else {
            format!("{sign}{digits}e+{zeros}")
        }
    }
}
