use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed-point amount with two fractional digits, stored as cents.
///
/// All credit arithmetic happens on the integer cent count, so comparisons
/// are exact.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

/// Error returned when an amount does not fit in an `i64` cent count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("amount overflows the supported range")]
pub struct AmountOverflow;

/// Error returned when a decimal string is not a valid two-digit amount.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid amount '{input}': expected a decimal with at most 2 fractional digits")]
pub struct ParseMoneyError {
    input: String,
}

impl Money {
    /// Creates an amount from cents.
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Creates an amount from a whole number of units.
    pub const fn from_units(units: i64) -> Self {
        Self(units.saturating_mul(100))
    }

    pub const fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in cents.
    pub const fn cents(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies a unit price by a quantity, failing on overflow.
    pub fn checked_times(self, quantity: u32) -> Result<Money, AmountOverflow> {
        self.0
            .checked_mul(i64::from(quantity))
            .map(Money)
            .ok_or(AmountOverflow)
    }

    pub fn checked_add(self, rhs: Money) -> Result<Money, AmountOverflow> {
        self.0.checked_add(rhs.0).map(Money).ok_or(AmountOverflow)
    }

    /// Clamps the amount to be no lower than zero.
    pub fn floor_zero(self) -> Money {
        self.max(Money::zero())
    }
}

impl std::str::FromStr for Money {
    type Err = ParseMoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseMoneyError {
            input: s.to_string(),
        };
        let trimmed = s.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty()
            || fraction.len() > 2
            || !whole.bytes().all(|b| b.is_ascii_digit())
            || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(err());
        }

        let whole: i64 = whole.parse().map_err(|_| err())?;
        let fraction: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().map_err(|_| err())? * 10,
            _ => fraction.parse().map_err(|_| err())?,
        };
        let cents = whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(fraction))
            .ok_or_else(err)?;

        Ok(Money(if negative { -cents } else { cents }))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

// Operators saturate at the `i64` bounds. Use the `checked_*` methods where an
// overflow must be reported.
impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl std::ops::SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 = self.0.saturating_sub(rhs.0);
    }
}
