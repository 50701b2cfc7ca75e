//! Precision-safe decimal price type.
//!
//! Strikes, quotes and strike spacings all go through `Price` so that
//! ladder arithmetic never accumulates floating-point error. Arithmetic is
//! checked: feed text can carry values near the decimal range limits, and an
//! overflow yields `None` instead of a panic.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Price with exact decimal precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(pub Decimal);

impl Price {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Round to the nearest multiple of `step`.
    ///
    /// Exact midpoints round away from zero (24150 with step 100 gives 24200),
    /// which keeps the result inside the half-open band
    /// `[result - step/2, result + step/2)` for every positive input.
    /// A zero step returns the price unchanged; `None` on overflow.
    #[inline]
    pub fn round_to_multiple(&self, step: Price) -> Option<Self> {
        if step.is_zero() {
            return Some(*self);
        }
        let units = self
            .0
            .checked_div(step.0)?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        Some(Self(units.checked_mul(step.0)?.normalize()))
    }

    #[inline]
    pub fn checked_add(&self, rhs: Price) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    #[inline]
    pub fn checked_sub(&self, rhs: Price) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    #[inline]
    pub fn checked_mul(&self, rhs: Decimal) -> Option<Self> {
        self.0.checked_mul(rhs).map(Self)
    }

    #[inline]
    pub fn checked_div(&self, rhs: Decimal) -> Option<Self> {
        self.0.checked_div(rhs).map(Self)
    }

    /// Strip trailing zeros so `24100.00` and `24100` display identically.
    #[inline]
    pub fn normalize(&self) -> Self {
        Self(self.0.normalize())
    }

    /// Parse a raw feed value, returning `None` for empty or malformed text.
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        trimmed.parse().ok()
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Price {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<Decimal> for Price {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_to_multiple_nearest() {
        let step = Price::new(dec!(100));

        let round = |v| Price::new(v).round_to_multiple(step).unwrap().0;

        assert_eq!(round(dec!(24110)), dec!(24100));
        assert_eq!(round(dec!(24151)), dec!(24200));
        assert_eq!(round(dec!(24149.95)), dec!(24100));
    }

    #[test]
    fn test_round_to_multiple_midpoint_rounds_up() {
        let step = Price::new(dec!(100));

        let round = |v| Price::new(v).round_to_multiple(step).unwrap().0;

        assert_eq!(round(dec!(24150)), dec!(24200));
        // banker's rounding would give 24000 here
        assert_eq!(round(dec!(24050)), dec!(24100));
    }

    #[test]
    fn test_round_to_multiple_fractional_step() {
        let step = Price::new(dec!(50.0));
        let rounded = Price::new(dec!(47612.3)).round_to_multiple(step).unwrap();

        assert_eq!(rounded.0, dec!(47600));
        assert_eq!(rounded.to_string(), "47600");
    }

    #[test]
    fn test_round_to_multiple_zero_step() {
        let price = Price::new(dec!(123.45));
        assert_eq!(price.round_to_multiple(Price::ZERO), Some(price));
    }

    #[test]
    fn test_round_to_multiple_overflow_is_none() {
        let huge = Price::new(Decimal::MAX);
        assert_eq!(huge.round_to_multiple(Price::new(dec!(0.05))), None);
        // 7e28 / 4.5e28 rounds to 2 units, and 9e28 is out of range
        let large = Price::new(dec!(70000000000000000000000000000));
        let wide = Price::new(dec!(45000000000000000000000000000));
        assert_eq!(large.round_to_multiple(wide), None);
    }

    #[test]
    fn test_checked_arithmetic() {
        let a = Price::new(dec!(24100));
        let b = Price::new(dec!(50));
        assert_eq!(a.checked_add(b), Some(Price::new(dec!(24150))));
        assert_eq!(a.checked_sub(b), Some(Price::new(dec!(24050))));
        assert_eq!(b.checked_mul(dec!(3)), Some(Price::new(dec!(150))));
        assert_eq!(b.checked_div(Decimal::TWO), Some(Price::new(dec!(25))));

        let max = Price::new(Decimal::MAX);
        assert_eq!(max.checked_add(b), None);
        assert_eq!(Price::new(Decimal::MIN).checked_sub(b), None);
        assert_eq!(max.checked_mul(dec!(2)), None);
        assert_eq!(a.checked_div(Decimal::ZERO), None);
    }

    #[test]
    fn test_parse_lenient() {
        assert_eq!(Price::parse_lenient(" 105.50 "), Some(Price::new(dec!(105.5))));
        assert_eq!(Price::parse_lenient(""), None);
        assert_eq!(Price::parse_lenient("abc"), None);
    }
}
