//! Fixed-point prices and share quantities.
//!
//! Prices are carried as integer hundredths so that comparisons inside the
//! lock-free book are exact and identical on every thread.

use core::fmt;

/// Limit price in hundredths: `Price(10850)` is 108.50.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Price(pub u64);

impl Price {
    /// Hundredths per whole unit.
    pub const SCALE: u64 = 100;

    /// Whole units to hundredths, saturating.
    #[inline(always)]
    pub const fn from_units(units: u64) -> Self {
        Self(units.saturating_mul(Self::SCALE))
    }

    #[inline(always)]
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    #[inline(always)]
    pub const fn from_raw(hundredths: u64) -> Self {
        Self(hundredths)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / Self::SCALE, self.0 % Self::SCALE)
    }
}

/// Share count.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Quantity(pub u64);

impl Quantity {
    pub const ZERO: Self = Self(0);

    #[inline(always)]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Used when summing a book; a sum never wraps.
    #[inline(always)]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_units() {
        assert_eq!(Price::from_units(110).as_raw(), 11_000);
        assert_eq!(Price::from_units(u64::MAX), Price(u64::MAX));
        assert!(Price::from_raw(10_850) < Price::from_units(110));
    }

    #[test]
    fn test_price_display() {
        assert_eq!(Price::from_raw(10_850).to_string(), "108.50");
        assert_eq!(Price::from_raw(12_305).to_string(), "123.05");
        assert_eq!(Price::default().to_string(), "0.00");
    }

    #[test]
    fn test_quantity_sum_saturates() {
        assert_eq!(Quantity(100).saturating_add(Quantity(60)), Quantity(160));
        assert_eq!(Quantity(u64::MAX).saturating_add(Quantity(1)), Quantity(u64::MAX));
        assert!(Quantity::ZERO.is_zero());
        assert_eq!(Quantity(42).to_string(), "42");
    }
}
