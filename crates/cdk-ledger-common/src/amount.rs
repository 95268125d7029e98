//! Ledger Amount
//!
//! Integer amount in the smallest unit of the wallet

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Amount Error
#[derive(Debug, Error)]
pub enum Error {
    /// Amount overflow
    #[error("Amount Overflow")]
    AmountOverflow,
    /// Invalid amount
    #[error("Invalid Amount: {0}")]
    InvalidAmount(String),
}

/// Amount can be any unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(u64);

impl FromStr for Amount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .parse::<u64>()
            .map_err(|_| Error::InvalidAmount(s.to_owned()))?;
        Ok(Amount(value))
    }
}

impl Amount {
    /// Amount zero
    pub const ZERO: Amount = Amount(0);

    /// Amount one
    pub const ONE: Amount = Amount(1);

    /// Checked addition for Amount. Returns None if overflow occurs.
    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    /// Checked subtraction for Amount. Returns None if overflow occurs.
    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Saturating addition, used for derived views such as balances
    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }

    /// Saturating subtraction
    pub fn saturating_sub(self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }

    /// Try sum to check for overflow
    pub fn try_sum<I>(iter: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = Self>,
    {
        iter.into_iter().try_fold(Amount::ZERO, |acc, x| {
            acc.checked_add(x).ok_or(Error::AmountOverflow)
        })
    }

    /// Convert to u64
    pub fn to_u64(self) -> u64 {
        self.0
    }

    /// Is zero
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for Amount {
    fn default() -> Self {
        Amount::ZERO
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(width) = f.width() {
            write!(f, "{:width$}", self.0, width = width)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<&u64> for Amount {
    fn from(value: &u64) -> Self {
        Self(*value)
    }
}

impl From<Amount> for u64 {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl AsRef<u64> for Amount {
    fn as_ref(&self) -> &u64 {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_amount_addition() {
        let amount_one: Amount = u64::MAX.into();
        let amount_two: Amount = 1.into();

        let total = Amount::try_sum(vec![amount_one, amount_two]);
        assert!(matches!(total, Err(Error::AmountOverflow)));

        let total = Amount::try_sum(vec![Amount::from(10000), Amount::from(1)]).unwrap();
        assert_eq!(total, 10001.into());
    }

    #[test]
    fn test_try_sum_empty_is_zero() {
        let total = Amount::try_sum(Vec::<Amount>::new()).unwrap();
        assert_eq!(total, Amount::ZERO);
        assert!(total.is_zero());
    }

    #[test]
    fn test_checked_sub_underflow() {
        assert_eq!(Amount::from(1).checked_sub(Amount::from(2)), None);
        assert_eq!(
            Amount::from(5).checked_sub(Amount::from(2)),
            Some(Amount::from(3))
        );
    }

    #[test]
    fn test_saturating_ops() {
        assert_eq!(
            Amount::from(u64::MAX).saturating_add(Amount::ONE),
            Amount::from(u64::MAX)
        );
        assert_eq!(Amount::ONE.saturating_sub(Amount::from(3)), Amount::ZERO);
    }

    #[test]
    fn test_amount_from_str() {
        assert_eq!(Amount::from_str("21").unwrap(), Amount::from(21));
        assert!(Amount::from_str("-1").is_err());
        assert!(Amount::from_str("abc").is_err());
    }

    #[test]
    fn test_amount_serde_transparent() {
        let json = serde_json::to_string(&Amount::from(42)).unwrap();
        assert_eq!(json, "42");
        let amount: Amount = serde_json::from_str("8").unwrap();
        assert_eq!(amount, Amount::from(8));
    }
}
