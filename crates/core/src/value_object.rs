//! Value objects: equality by value, not identity.

use core::iter::Sum;
use core::ops::{Add, AddAssign, Sub, SubAssign};
use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. To "modify" one,
/// build a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// An exact, decimal quantity of goods.
///
/// Backed by a fixed-point decimal so that fractional quantities (e.g. `12.5`
/// kg) add and subtract without rounding drift. The scale the user typed is
/// preserved for display (`"40.0"` stays `40.0`), while comparisons are
/// numeric (`40.0 == 40`).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(Decimal);

impl ValueObject for Quantity {}

impl Quantity {
    pub const ZERO: Quantity = Quantity(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Number of significant digits after the decimal point (`"1.50"` -> 1).
    pub fn fraction_digits(&self) -> u32 {
        self.0.normalize().scale()
    }

    /// Parse user input.
    ///
    /// Surrounding whitespace is ignored; plain (`12.5`, `.5`, `-3`) and
    /// scientific (`1e2`, `2.5E-1`) notation are accepted. The value is taken
    /// exactly as typed: input that a decimal cannot hold without rounding
    /// (more than 28 fraction digits, more than 96 bits of digits) is
    /// `NotANumber`, as is anything else (empty, `NaN`, `inf`, `1_0`).
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        parse_exact(input.trim())
            .map(Self)
            .ok_or_else(|| ValidationError::NotANumber {
                input: input.to_string(),
            })
    }
}

/// Largest scale a `Decimal` can carry.
const MAX_SCALE: usize = 28;

/// Build a decimal digit by digit so that nothing is ever rounded.
fn parse_exact(text: &str) -> Option<Decimal> {
    let (mantissa, exponent) = match text.split_once(['e', 'E']) {
        Some((mantissa, exponent)) => (mantissa, exponent.parse::<i64>().ok()?),
        None => (text, 0),
    };

    let (negative, unsigned) = match mantissa.as_bytes().first() {
        Some(b'-') => (true, &mantissa[1..]),
        Some(b'+') => (false, &mantissa[1..]),
        _ => (false, mantissa),
    };
    let (int, mut frac) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    if int.is_empty() && frac.is_empty() {
        return None;
    }
    if !int.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }

    // Trailing zeros past the representable scale carry no value.
    while frac.len() > MAX_SCALE && frac.ends_with('0') {
        frac = &frac[..frac.len() - 1];
    }

    let digits = format!("{int}{frac}");
    let digits = digits.trim_start_matches('0');
    let mut units: i128 = if digits.is_empty() { 0 } else { digits.parse().ok()? };

    let mut scale = i64::try_from(frac.len()).ok()?.checked_sub(exponent)?;
    if scale < 0 {
        let factor = 10i128.checked_pow(u32::try_from(-scale).ok()?)?;
        units = units.checked_mul(factor)?;
        scale = 0;
    }
    if negative {
        units = -units;
    }

    // Fails when the scale exceeds 28 or the digits exceed 96 bits.
    Decimal::try_from_i128_with_scale(units, u32::try_from(scale).ok()?).ok()
}

impl FromStr for Quantity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Decimal> for Quantity {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl From<i64> for Quantity {
    fn from(value: i64) -> Self {
        Self(Decimal::from(value))
    }
}

impl From<Quantity> for Decimal {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Quantity {
        Quantity(self.0 + rhs.0)
    }
}

impl Sub for Quantity {
    type Output = Quantity;

    fn sub(self, rhs: Quantity) -> Quantity {
        Quantity(self.0 - rhs.0)
    }
}

impl AddAssign for Quantity {
    fn add_assign(&mut self, rhs: Quantity) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Quantity {
    fn sub_assign(&mut self, rhs: Quantity) {
        self.0 -= rhs.0;
    }
}

impl Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Quantity {
        iter.fold(Quantity::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Quantity> for Quantity {
    fn sum<I: Iterator<Item = &'a Quantity>>(iter: I) -> Quantity {
        iter.copied().sum()
    }
}
