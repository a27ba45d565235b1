//! Percentage - Bounded decimal wrapper for ownership shares
//!
//! Every ownership share in Tranche lies in `0..=100`. Shares keep whatever
//! precision the source of truth reports, so sums are exact and never need an
//! epsilon. Amounts proposed for a transfer carry at most [`PERCENT_SCALE`]
//! decimal places.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum number of decimal places a transfer amount may carry.
pub const PERCENT_SCALE: u32 = 6;

/// Errors that can occur when working with percentages
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PercentageError {
    #[error("Percentage cannot be negative: {0}")]
    Negative(Decimal),

    #[error("Percentage cannot exceed 100: {0}")]
    AboveHundred(Decimal),

    #[error("Percentage {0} has more than {PERCENT_SCALE} decimal places")]
    TooPrecise(Decimal),

    #[error("Transfer percentage must be greater than zero")]
    Zero,

    #[error("Invalid percentage: {0}")]
    Parse(String),
}

/// A decimal share in `0..=100`.
///
/// # Example
/// ```
/// use tranche_core::Percentage;
/// use rust_decimal::Decimal;
///
/// let share = Percentage::new(Decimal::new(30, 0)).unwrap();
/// assert_eq!(share.value(), Decimal::new(30, 0));
///
/// assert!(Percentage::new(Decimal::new(101, 0)).is_err());
/// assert!(Percentage::new(Decimal::new(-1, 0)).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Percentage(Decimal);

impl Percentage {
    pub const ZERO: Self = Self(Decimal::ZERO);
    pub const HUNDRED: Self = Self(Decimal::ONE_HUNDRED);

    /// Create a percentage in `0..=100`, at any precision.
    pub fn new(value: Decimal) -> Result<Self, PercentageError> {
        if value < Decimal::ZERO {
            return Err(PercentageError::Negative(value));
        }
        if value > Decimal::ONE_HUNDRED {
            return Err(PercentageError::AboveHundred(value));
        }
        Ok(Self(value.normalize()))
    }

    /// Create a percentage that can be moved by a transfer:
    /// `0 < p <= 100` with at most [`PERCENT_SCALE`] decimal places.
    pub fn transferable(value: Decimal) -> Result<Self, PercentageError> {
        let pct = Self::new(value)?;
        if pct.is_zero() {
            return Err(PercentageError::Zero);
        }
        if pct.0.scale() > PERCENT_SCALE {
            return Err(PercentageError::TooPrecise(value));
        }
        Ok(pct)
    }

    #[inline]
    pub const fn value(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Addition that stays within `0..=100`
    pub fn checked_add(&self, other: &Percentage) -> Option<Percentage> {
        Self::new(self.0.checked_add(other.0)?).ok()
    }

    /// Subtraction - returns None if the result would be negative
    pub fn checked_sub(&self, other: &Percentage) -> Option<Percentage> {
        Self::new(self.0.checked_sub(other.0)?).ok()
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Percentage {
    type Err = PercentageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim().trim_end_matches('%'))
            .map_err(|_| PercentageError::Parse(s.to_string()))?;
        Self::new(value)
    }
}

impl TryFrom<Decimal> for Percentage {
    type Error = PercentageError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Percentage> for Decimal {
    fn from(pct: Percentage) -> Self {
        pct.0
    }
}

impl Default for Percentage {
    fn default() -> Self {
        Self::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_bounds() {
        assert!(Percentage::new(dec!(0)).is_ok());
        assert!(Percentage::new(dec!(100)).is_ok());
        assert!(matches!(
            Percentage::new(dec!(-0.5)),
            Err(PercentageError::Negative(_))
        ));
        assert!(matches!(
            Percentage::new(dec!(100.000001)),
            Err(PercentageError::AboveHundred(_))
        ));
    }

    #[test]
    fn test_transferable_rejects_zero() {
        assert_eq!(Percentage::transferable(dec!(0)), Err(PercentageError::Zero));
        assert!(Percentage::transferable(dec!(0.000001)).is_ok());
    }

    #[test]
    fn test_precision_limit_applies_to_transfers_only() {
        assert!(Percentage::transferable(dec!(33.333333)).is_ok());
        assert!(matches!(
            Percentage::transferable(dec!(33.3333333)),
            Err(PercentageError::TooPrecise(_))
        ));
        // Trailing zeros do not count against the scale
        assert!(Percentage::transferable(dec!(12.50000000)).is_ok());

        // Stored shares keep full precision
        assert_eq!(Percentage::new(dec!(33.3333334)).unwrap().value(), dec!(33.3333334));
    }

    #[test]
    fn test_checked_arithmetic() {
        let seventy = Percentage::new(dec!(70)).unwrap();
        let thirty = Percentage::new(dec!(30)).unwrap();
        let forty = Percentage::new(dec!(40)).unwrap();

        assert_eq!(seventy.checked_add(&thirty), Some(Percentage::HUNDRED));
        assert!(seventy.checked_add(&forty).is_none());
        assert_eq!(seventy.checked_sub(&thirty).unwrap().value(), dec!(40));
        assert!(thirty.checked_sub(&forty).is_none());
    }

    #[test]
    fn test_parse() {
        assert_eq!("30".parse::<Percentage>().unwrap().value(), dec!(30));
        assert_eq!("12.5%".parse::<Percentage>().unwrap().value(), dec!(12.5));
        assert!(matches!(
            "abc".parse::<Percentage>(),
            Err(PercentageError::Parse(_))
        ));
    }

    #[test]
    fn test_serde_as_string() {
        let pct = Percentage::new(dec!(12.5)).unwrap();
        let json = serde_json::to_string(&pct).unwrap();
        assert_eq!(json, "\"12.5\"");
        let parsed: Percentage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, pct);

        assert!(serde_json::from_str::<Percentage>("\"120\"").is_err());
    }
}
