use std::{
    fmt,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
    str::FromStr,
};

use crate::LedgerError;

/// Signed money amount represented as **integer minor units**.
///
/// Use this type for all monetary values (amounts, budget limits, summary
/// totals) to avoid floating-point drift.
///
/// The value is signed:
/// - positive = income / increase
/// - negative = expense / decrease
///
/// # Examples
///
/// ```rust
/// use ledger::Money;
///
/// let amount = Money::new(12_34);
/// assert_eq!(amount.minor(), 1234);
/// assert_eq!(amount.to_string(), "12.34");
/// ```
///
/// Parsing from user input (accepts `.` or `,` as decimal separator; rejects
/// more than 2 decimals):
///
/// ```rust
/// use ledger::Money;
///
/// assert_eq!("10".parse::<Money>().unwrap().minor(), 1000);
/// assert_eq!("10,5".parse::<Money>().unwrap().minor(), 1050);
/// assert!("12.345".parse::<Money>().is_err());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Creates a new amount from integer minor units.
    #[must_use]
    pub const fn new(minor: i64) -> Self {
        Self(minor)
    }

    /// Returns the raw value in minor units.
    #[must_use]
    pub const fn minor(self) -> i64 {
        self.0
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Absolute value, saturating at `i64::MAX`.
    #[must_use]
    pub const fn abs(self) -> Money {
        Money(self.0.saturating_abs())
    }

    /// Checked addition (returns `None` on overflow).
    #[must_use]
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    /// Checked subtraction (returns `None` on overflow).
    #[must_use]
    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Money)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl FromStr for Money {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.is_empty() {
            return Err(LedgerError::InvalidAmount("empty amount".to_string()));
        }

        let (negative, raw) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };

        let normalized = raw.replace(',', ".");
        let (major, frac) = match normalized.split_once('.') {
            Some((major, frac)) => (major, frac),
            None => (normalized.as_str(), ""),
        };

        if frac.len() > 2 {
            return Err(LedgerError::InvalidAmount(format!(
                "too many decimals: {s}"
            )));
        }
        if major.is_empty() && frac.is_empty() {
            return Err(LedgerError::InvalidAmount(format!("invalid amount: {s}")));
        }

        let major: i64 = if major.is_empty() {
            0
        } else {
            major
                .parse()
                .map_err(|_| LedgerError::InvalidAmount(format!("invalid amount: {s}")))?
        };
        let frac: i64 = if frac.is_empty() {
            0
        } else {
            let padded = format!("{frac:0<2}");
            padded
                .parse()
                .map_err(|_| LedgerError::InvalidAmount(format!("invalid amount: {s}")))?
        };

        let minor = major
            .checked_mul(100)
            .and_then(|v| v.checked_add(frac))
            .ok_or_else(|| LedgerError::InvalidAmount(format!("amount out of range: {s}")))?;

        Ok(Money(if negative { -minor } else { minor }))
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_major_and_minor() {
        assert_eq!("0".parse::<Money>().unwrap(), Money::ZERO);
        assert_eq!("7".parse::<Money>().unwrap().minor(), 700);
        assert_eq!("7.5".parse::<Money>().unwrap().minor(), 750);
        assert_eq!("7.05".parse::<Money>().unwrap().minor(), 705);
        assert_eq!("-3,20".parse::<Money>().unwrap().minor(), -320);
        assert_eq!(".5".parse::<Money>().unwrap().minor(), 50);
    }

    #[test]
    fn rejects_garbage() {
        assert!("".parse::<Money>().is_err());
        assert!("abc".parse::<Money>().is_err());
        assert!("1.234".parse::<Money>().is_err());
        assert!(".".parse::<Money>().is_err());
    }

    #[test]
    fn formats_with_two_decimals() {
        assert_eq!(Money::new(1050).to_string(), "10.50");
        assert_eq!(Money::new(-5).to_string(), "-0.05");
        assert_eq!(Money::ZERO.to_string(), "0.00");
    }

    #[test]
    fn checked_ops() {
        assert_eq!(
            Money::new(i64::MAX).checked_add(Money::new(1)),
            None
        );
        assert_eq!(
            Money::new(100).checked_sub(Money::new(30)),
            Some(Money::new(70))
        );
    }
}
