use crate::error::{MarketError, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub};

/// A monetary value held as an integer count of minor units (cents).
///
/// Decimal input is accepted at the edges and converted exactly; anything
/// with more than two fractional digits is rejected rather than rounded.
/// Serialized as a decimal string with two fractional digits. Magnitudes
/// are capped at [`Money::MAX`], so sums over any realistic listing fit in
/// an `i64`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(i64);

impl Money {
    pub const ZERO: Self = Self(0);
    /// The processor's per-charge ceiling: 99,999,999.99.
    pub const MAX: Self = Self(9_999_999_999);

    pub fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub fn from_decimal(value: Decimal) -> Result<Self> {
        if value.normalize().scale() > 2 {
            return Err(MarketError::BadRequest(format!(
                "amount {value} has more than two decimal places"
            )));
        }
        value
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|cents| cents.to_i64())
            .map(Self)
            .filter(|money| money.within_limit())
            .ok_or_else(|| MarketError::BadRequest(format!("amount {value} is out of range")))
    }

    /// `|self| <= Money::MAX`.
    pub fn within_limit(self) -> bool {
        self.0.checked_abs().is_some_and(|abs| abs <= Self::MAX.0)
    }

    pub fn minor(self) -> i64 {
        self.0
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Applies `rate` and rounds half-up to whole cents.
    pub fn apply_rate(self, rate: Decimal) -> Result<Self> {
        (Decimal::from(self.0) * rate)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .map(Self)
            .ok_or_else(|| MarketError::BadRequest(format!("amount {self} is out of range")))
    }
}

impl TryFrom<Decimal> for Money {
    type Error = MarketError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::from_decimal(value)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.to_decimal()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

/// ISO-4217 code, stored lower-case the way the payment processor expects it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn new(code: &str) -> Result<Self> {
        let code = code.trim().to_ascii_lowercase();
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(code))
        } else {
            Err(MarketError::BadRequest(format!(
                "'{code}' is not a three-letter currency code"
            )))
        }
    }

    pub fn eur() -> Self {
        Self("eur".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Currency {
    type Error = MarketError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Platform cut applied to every gross payment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommissionRate(Decimal);

/// The two halves of a gross amount. `commission + expert_amount == gross`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split {
    pub commission: Money,
    pub expert_amount: Money,
}

impl CommissionRate {
    /// The marketplace's standard five percent.
    pub const STANDARD: Self = Self(dec!(0.05));

    pub fn new(rate: Decimal) -> Result<Self> {
        if rate < Decimal::ZERO || rate >= Decimal::ONE {
            return Err(MarketError::BadRequest(format!(
                "commission rate {rate} must be in [0, 1)"
            )));
        }
        Ok(Self(rate))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn split(&self, gross: Money) -> Result<Split> {
        let commission = gross.apply_rate(self.0)?;
        Ok(Split {
            commission,
            expert_amount: gross - commission,
        })
    }
}
