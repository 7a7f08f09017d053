//! Monetary amounts in base units, bounded by the money supply.

use std::fmt;

use thiserror::Error;

use crate::{MeridianDeserialize, MeridianSerialize, SerializationError};

/// Base units per MRD.
pub const COIN: u64 = 100_000_000;

/// The upper bound on the total money supply, in base units.
///
/// Every amount and every sum of amounts must stay in `[0, MAX_MONEY]`.
pub const MAX_MONEY: u64 = 2_100_000_000_000_000;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount {0} exceeds MAX_MONEY")]
    OutOfRange(u64),
    #[error("amount arithmetic overflowed")]
    Overflow,
    #[error("amount arithmetic underflowed")]
    Underflow,
}

/// An amount of Meridian, counted in base units.
///
/// The contained value is always within `[0, MAX_MONEY]`; arithmetic is
/// checked and re-validates the bound.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);
    pub const MAX: Amount = Amount(MAX_MONEY);

    pub fn from_units(units: u64) -> Result<Amount, AmountError> {
        if units > MAX_MONEY {
            return Err(AmountError::OutOfRange(units));
        }
        Ok(Amount(units))
    }

    pub const fn units(self) -> u64 {
        self.0
    }

    pub fn checked_add(self, rhs: Amount) -> Result<Amount, AmountError> {
        let sum = self.0.checked_add(rhs.0).ok_or(AmountError::Overflow)?;
        Amount::from_units(sum)
    }

    pub fn checked_sub(self, rhs: Amount) -> Result<Amount, AmountError> {
        let diff = self.0.checked_sub(rhs.0).ok_or(AmountError::Underflow)?;
        Ok(Amount(diff))
    }

    /// Sum an iterator of amounts with overflow and supply-bound checks.
    pub fn sum<I: IntoIterator<Item = Amount>>(amounts: I) -> Result<Amount, AmountError> {
        amounts
            .into_iter()
            .try_fold(Amount::ZERO, Amount::checked_add)
    }
}

impl fmt::Display for Amount {
    /// Formats the amount as a decimal number of MRD, e.g. `12.34567890`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:08}", self.0 / COIN, self.0 % COIN)
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Amount").field(&self.0).finish()
    }
}

impl MeridianSerialize for Amount {
    fn mrd_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        self.0.mrd_serialize(target)
    }
}

impl MeridianDeserialize for Amount {
    fn mrd_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        let units = u64::mrd_deserialize(reader)?;
        Amount::from_units(units).map_err(|_| SerializationError::Parse("amount exceeds MAX_MONEY"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_are_enforced() {
        meridian_test::init();

        assert!(Amount::from_units(MAX_MONEY).is_ok());
        assert_eq!(
            Amount::from_units(MAX_MONEY + 1),
            Err(AmountError::OutOfRange(MAX_MONEY + 1))
        );

        let nearly_all = Amount::from_units(MAX_MONEY).unwrap();
        assert_eq!(
            nearly_all.checked_add(Amount::from_units(1).unwrap()),
            Err(AmountError::OutOfRange(MAX_MONEY + 1))
        );
        assert_eq!(
            Amount::ZERO.checked_sub(Amount::from_units(1).unwrap()),
            Err(AmountError::Underflow)
        );
    }

    #[test]
    fn display_is_fixed_point() {
        meridian_test::init();

        let amount = Amount::from_units(12 * COIN + 34_567_890).unwrap();
        assert_eq!(amount.to_string(), "12.34567890");
        assert_eq!(Amount::ZERO.to_string(), "0.00000000");
    }

    #[test]
    fn wire_amount_above_supply_is_rejected() {
        meridian_test::init();

        let bytes = (MAX_MONEY + 1).to_le_bytes();
        assert!(Amount::mrd_deserialize(&bytes[..]).is_err());
    }
}
