//! Denomination amounts
//!
//! Every token carries a value that is an exact power of two. Arbitrary
//! values are represented as a list of power-of-two parts.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Amount Error
#[derive(Debug, Error)]
pub enum Error {
    /// Amount overflow
    #[error("Amount overflow")]
    AmountOverflow,
    /// Cannot convert units
    #[error("Cannot convert units")]
    CannotConvertUnits,
}

/// Amount in the smallest denomination of the wallet unit
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    /// Amount zero
    pub const ZERO: Amount = Amount(0);

    /// Amount one
    pub const ONE: Amount = Amount(1);

    /// Split into parts that are powers of two, largest first
    pub fn split(&self) -> Vec<Self> {
        let value = self.0;
        (0_u64..64)
            .rev()
            .filter_map(|bit| {
                let part = 1 << bit;
                ((value & part) == part).then_some(Self(part))
            })
            .collect()
    }

    /// Split into the given target parts
    ///
    /// The caller supplies an explicit list of power-of-two parts; the parts
    /// must sum to the amount.
    pub fn split_with_target(&self, target: &[Amount]) -> Result<Vec<Self>, Error> {
        if Amount::try_sum(target.iter().copied())? != *self {
            return Err(Error::CannotConvertUnits);
        }
        Ok(target.to_vec())
    }

    /// Checked addition. Returns [None] on overflow.
    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    /// Checked subtraction. Returns [None] on underflow.
    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Try to sum amounts, erroring on overflow
    pub fn try_sum<I>(iter: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = Self>,
    {
        iter.into_iter().try_fold(Amount::ZERO, |acc, x| {
            acc.checked_add(x).ok_or(Error::AmountOverflow)
        })
    }

    /// Amount as a `u64`
    pub fn to_u64(self) -> u64 {
        self.0
    }

    /// Whether the amount is an exact power of two
    pub fn is_power_of_two(&self) -> bool {
        self.0.is_power_of_two()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
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

impl std::ops::Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Self::Output {
        Amount(self.0.checked_add(rhs.0).expect("Addition overflow"))
    }
}

impl std::ops::AddAssign for Amount {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::ops::Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Amount) -> Self::Output {
        Amount(self.0 - rhs.0)
    }
}

impl std::ops::SubAssign for Amount {
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl core::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        let value: u64 = iter.map(|amt| amt.0).sum();
        Amount::from(value)
    }
}

/// String wrapper for an [Amount]
///
/// Used for `keys` maps on the wire where the amount is a JSON object key and
/// therefore a string. Ordering is numeric, not lexical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AmountStr(Amount);

impl AmountStr {
    pub(crate) fn from(amount: Amount) -> Self {
        Self(amount)
    }
}

impl PartialOrd for AmountStr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AmountStr {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl From<AmountStr> for Amount {
    fn from(value: AmountStr) -> Self {
        value.0
    }
}

impl<'de> Deserialize<'de> for AmountStr {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        u64::from_str(&s)
            .map(Amount)
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

impl Serialize for AmountStr {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_amount() {
        assert_eq!(Amount::from(1).split(), vec![Amount::from(1)]);
        assert_eq!(Amount::from(2).split(), vec![Amount::from(2)]);
        assert_eq!(
            Amount::from(3).split(),
            vec![Amount::from(2), Amount::from(1)]
        );
        let amounts: Vec<Amount> = [8, 2, 1].iter().map(|a| Amount::from(*a)).collect();
        assert_eq!(Amount::from(11).split(), amounts);
        let amounts: Vec<Amount> = [128, 64, 32, 16, 8, 4, 2, 1]
            .iter()
            .map(|a| Amount::from(*a))
            .collect();
        assert_eq!(Amount::from(255).split(), amounts);
    }

    #[test]
    fn test_split_with_target() {
        let amount = Amount::from(4);
        let target = [Amount::from(2), Amount::from(1), Amount::from(1)];

        assert_eq!(amount.split_with_target(&target).unwrap(), target.to_vec());

        let bad_target = [Amount::from(2), Amount::from(1)];
        assert!(amount.split_with_target(&bad_target).is_err());
    }

    #[test]
    fn test_try_sum_overflow() {
        assert!(Amount::try_sum([Amount::from(u64::MAX), Amount::ONE]).is_err());
        assert_eq!(
            Amount::try_sum([Amount::from(2), Amount::from(3)]).unwrap(),
            Amount::from(5)
        );
    }
}
