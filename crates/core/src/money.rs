//! Single-currency monetary amounts.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// A non-negative decimal amount in the engine's configured currency.
///
/// Compared by value; there is no currency tag because the engine runs in a
/// single currency.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Build an amount, rejecting negatives.
    pub fn new(amount: Decimal) -> DomainResult<Self> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(DomainError::validation("amount cannot be negative"));
        }
        Ok(Self(amount))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Amount in minor units (cents) as gateways usually expect it.
    pub fn minor_units(&self) -> DomainResult<i64> {
        let scaled = self
            .0
            .checked_mul(Decimal::ONE_HUNDRED)
            .ok_or_else(|| DomainError::validation("amount does not fit in minor units"))?
            .round_dp(0);
        i64::try_from(scaled)
            .map_err(|_| DomainError::validation("amount does not fit in minor units"))
    }

    /// `unit_price * quantity`, rejecting overflow.
    pub fn times(self, quantity: i64) -> DomainResult<Self> {
        self.0
            .checked_mul(Decimal::from(quantity))
            .map(Self)
            .ok_or_else(|| DomainError::validation(format!("{self} x {quantity} overflows")))
    }

    pub fn checked_add(self, rhs: Money) -> DomainResult<Self> {
        self.0
            .checked_add(rhs.0)
            .map(Self)
            .ok_or_else(|| DomainError::validation(format!("{self} + {rhs} overflows")))
    }

    /// Sum of `amounts`, rejecting overflow.
    pub fn total<I>(amounts: I) -> DomainResult<Self>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts.into_iter().try_fold(Money::ZERO, Money::checked_add)
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}
