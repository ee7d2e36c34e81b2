use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced when parsing a monetary amount.
///
/// All variants mean "invalid amount"; they differ only in the message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,
    #[error("amount '{0}' is not a decimal number")]
    NotANumber(String),
    #[error("amount '{0}' must have up to 2 decimal places")]
    TooManyDecimals(String),
    #[error("amount '{0}' is negative")]
    Negative(String),
    #[error("amount '{0}' exceeds 9999999999.99")]
    OutOfRange(String),
}

/// Fixed-point decimal with 2 decimal places, backed by `rust_decimal`.
///
/// Amounts parsed from text are never negative; negative values only appear
/// as signed deltas built with [`Neg`](std::ops::Neg).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(Decimal);

impl Amount {
    pub const SCALE: u32 = 2;
    pub const ZERO: Amount = Amount(Decimal::ZERO);

    /// Largest value a balance column can hold, in cents.
    const MAX_CENTS: i64 = 999_999_999_999;
    /// Digits allowed before the decimal point.
    const MAX_WHOLE_DIGITS: usize = 10;

    /// Parse a base-10 decimal string with at most 2 fractional digits.
    ///
    /// Accepts `"10"`, `"10.5"`, `"10.50"`, `".5"` and `"10."`. Rejects signs
    /// other than a leading `-` (reported as negative), exponents, whitespace
    /// and anything with 3 or more fractional digits, including `"10.100"`.
    pub fn parse(text: &str) -> Result<Self, AmountError> {
        if text.is_empty() {
            return Err(AmountError::Empty);
        }

        let (negative, unsigned) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };

        let (whole, frac) = match unsigned.split_once('.') {
            Some((whole, frac)) => (whole, frac),
            None => (unsigned, ""),
        };

        let is_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if (whole.is_empty() && frac.is_empty()) || !is_digits(whole) || !is_digits(frac) {
            return Err(AmountError::NotANumber(text.to_string()));
        }

        if frac.len() > Self::SCALE as usize {
            return Err(AmountError::TooManyDecimals(text.to_string()));
        }

        let significant = whole.trim_start_matches('0');
        if significant.len() > Self::MAX_WHOLE_DIGITS {
            return Err(AmountError::OutOfRange(text.to_string()));
        }

        // at most 10 + 2 digits, fits comfortably in an i64
        let digits = |s: &str| s.bytes().fold(0i64, |acc, b| acc * 10 + i64::from(b - b'0'));
        let frac_cents = match frac.len() {
            0 => 0,
            1 => digits(frac) * 10,
            _ => digits(frac),
        };
        let cents = digits(significant) * 100 + frac_cents;

        if negative && cents != 0 {
            return Err(AmountError::Negative(text.to_string()));
        }

        Ok(Amount::from_cents(cents))
    }

    pub fn from_cents(cents: i64) -> Self {
        Amount(Decimal::new(cents, Self::SCALE))
    }

    /// Wrap a decimal read back from storage, normalizing it to 2 places.
    pub fn from_decimal(value: Decimal) -> Self {
        let mut normalized = value;
        normalized.rescale(Self::SCALE);
        Amount(normalized)
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn max() -> Self {
        Amount::from_cents(Self::MAX_CENTS)
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Add `rhs`, returning `None` when the result leaves the storable range
    /// on the upper side. Negative results are returned as-is so callers can
    /// report insufficient funds.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        let sum = self.0.checked_add(rhs.0)?;
        let sum = Amount::from_decimal(sum);
        if sum > Self::max() { None } else { Some(sum) }
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Amount::parse(s)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl std::ops::Neg for Amount {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Amount(-self.0)
    }
}
