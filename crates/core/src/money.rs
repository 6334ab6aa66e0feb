use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Neg, Sub};

/// A currency amount held at 2 decimal places.
///
/// All rounding is half-to-even ("banker's rounding") so repeated
/// normalization of the same figure never drifts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(Decimal);

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Money(Decimal::from(cents) / Decimal::from(100))
    }

    pub fn to_cents(self) -> i64 {
        (self.0 * Decimal::from(100)).to_i64().unwrap_or(0)
    }

    pub fn from_decimal(decimal: Decimal) -> Self {
        Money(decimal.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven))
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }

    pub fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn is_positive(self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }

    /// Absolute difference between two amounts.
    pub fn diff(self, other: Money) -> Money {
        Money((self.0 - other.0).abs())
    }

    /// Relative difference `|self − other| / |other|`, or `None` when
    /// `other` is zero.
    pub fn relative_diff(self, other: Money) -> Option<Decimal> {
        if other.0.is_zero() {
            return None;
        }
        Some((self.0 - other.0).abs() / other.0.abs())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.2}", self.0)
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn rounds_half_to_even() {
        assert_eq!(Money::from_decimal(dec("1.005")).to_cents(), 100);
        assert_eq!(Money::from_decimal(dec("1.015")).to_cents(), 102);
        assert_eq!(Money::from_decimal(dec("2.675")).to_cents(), 268);
    }

    #[test]
    fn cents_round_trip() {
        assert_eq!(Money::from_cents(12345).to_cents(), 12345);
        assert_eq!(Money::from_cents(-50).to_cents(), -50);
    }

    #[test]
    fn sign_queries() {
        assert!(Money::from_cents(-1).is_negative());
        assert!(Money::from_cents(1).is_positive());
        assert!(!Money::zero().is_negative());
        assert!(!Money::zero().is_positive());
    }

    #[test]
    fn diff_is_symmetric() {
        let a = Money::from_cents(5000);
        let b = Money::from_cents(5001);
        assert_eq!(a.diff(b), b.diff(a));
        assert_eq!(a.diff(b).to_cents(), 1);
    }

    #[test]
    fn relative_diff_against_zero_is_none() {
        assert!(Money::from_cents(100).relative_diff(Money::zero()).is_none());
    }

    #[test]
    fn relative_diff_ten_percent() {
        let r = Money::from_cents(1100)
            .relative_diff(Money::from_cents(1000))
            .unwrap();
        assert_eq!(r, dec("0.1"));
    }
}
