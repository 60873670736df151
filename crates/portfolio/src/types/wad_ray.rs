//! Fixed-point integer conversions.
//!
//! Upstream balances arrive as unscaled integers (`rawBalance / 10^decimals`)
//! and interest rates as RAY-scaled integers (27 decimals). Both are split
//! into an integer quotient and a remainder on the `U256` before entering
//! `Decimal`, so no digit passes through a float.

use alloy::primitives::{uint, U256};
use rust_decimal::Decimal;
use std::fmt;

use crate::constants::RAY_PERCENT_DECIMALS;

/// Largest scale `Decimal` can hold.
const MAX_DECIMAL_SCALE: u32 = 28;

// ---------------------------------------------------------------------------
// RAY (1e27): Aave interest rates
// ---------------------------------------------------------------------------

/// RAY-scaled value (27 decimals). Used for Aave interest rates.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ray(pub U256);

impl Ray {
    pub const ONE: Ray = Ray(uint!(1_000_000_000_000_000_000_000_000_000_U256));
    pub const ZERO: Ray = Ray(U256::ZERO);

    /// Parse a base-10 integer string. `None` for anything else.
    pub fn parse(raw: &str) -> Option<Self> {
        parse_raw_amount(raw).map(Self)
    }

    /// Rate as a fraction (`1e27` → `1`).
    pub fn to_decimal(self) -> Decimal {
        units_to_decimal(self.0, crate::constants::RAY_DECIMALS).unwrap_or_default()
    }

    /// Rate as an annual percentage (`3e25` → `3`).
    pub fn to_apr_percent(self) -> Decimal {
        units_to_decimal(self.0, RAY_PERCENT_DECIMALS).unwrap_or_default()
    }
}

impl fmt::Debug for Ray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ray({})", self.to_decimal())
    }
}

impl fmt::Display for Ray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl From<U256> for Ray {
    fn from(val: U256) -> Self {
        Self(val)
    }
}

// ---------------------------------------------------------------------------
// Free-standing conversion helpers
// ---------------------------------------------------------------------------

/// Scale an unsigned integer amount down by `10^decimals`.
///
/// Returns `None` when the integer part does not fit in a `Decimal`
/// (roughly 7.9e28). Scales above 28 drop the excess low-order digits.
pub fn units_to_decimal(raw: U256, decimals: u32) -> Option<Decimal> {
    let (raw, decimals) = if decimals > MAX_DECIMAL_SCALE {
        let excess = pow10(decimals - MAX_DECIMAL_SCALE)?;
        (raw / excess, MAX_DECIMAL_SCALE)
    } else {
        (raw, decimals)
    };

    let divisor = pow10(decimals)?;
    let whole = u128::try_from(raw / divisor).ok()?;
    let frac = u128::try_from(raw % divisor).ok()?;

    let whole = Decimal::try_from_i128_with_scale(i128::try_from(whole).ok()?, 0).ok()?;
    let frac = Decimal::try_from_i128_with_scale(i128::try_from(frac).ok()?, decimals).ok()?;

    whole.checked_add(frac).map(|d| d.normalize())
}

/// Inverse of [`units_to_decimal`] for a human-unit decimal string:
/// `"1.5"` with 6 decimals → `1_500_000`.
///
/// Fractional digits beyond `decimals` are truncated. Signs, exponents and
/// empty input yield `None`.
pub fn parse_units(value: &str, decimals: u32) -> Option<U256> {
    let value = value.trim();
    let (int_part, frac_part) = value.split_once('.').unwrap_or((value, ""));

    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }

    let width = decimals as usize;
    let mut digits = String::with_capacity(int_part.len() + width);
    digits.push_str(int_part);
    if frac_part.len() >= width {
        digits.push_str(&frac_part[..width]);
    } else {
        digits.push_str(frac_part);
        digits.extend(std::iter::repeat('0').take(width - frac_part.len()));
    }

    if digits.is_empty() {
        return Some(U256::ZERO);
    }
    U256::from_str_radix(&digits, 10).ok()
}

/// Parse a base-10 integer string into a `U256`.
pub fn parse_raw_amount(raw: &str) -> Option<U256> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    U256::from_str_radix(raw, 10).ok()
}

fn pow10(exp: u32) -> Option<U256> {
    U256::from(10u64).checked_pow(U256::from(exp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ray_one_is_one() {
        assert_eq!(Ray::ONE.to_decimal(), dec!(1));
    }

    #[test]
    fn test_ray_to_apr() {
        // 3% APR in RAY = 0.03 * 1e27 = 3e25
        let rate = Ray(U256::from(30_000_000_000_000_000_000_000_000u128));
        assert_eq!(rate.to_apr_percent(), dec!(3));
    }

    #[test]
    fn test_ray_to_apr_keeps_fraction_digits() {
        let rate = Ray::parse("31709791983764586504854009").unwrap();
        let pct = rate.to_apr_percent();
        assert!(pct > dec!(3.1709) && pct < dec!(3.1710), "got {pct}");
    }

    #[test]
    fn test_ray_parse_rejects_garbage() {
        assert!(Ray::parse("").is_none());
        assert!(Ray::parse("-5").is_none());
        assert!(Ray::parse("1.5").is_none());
        assert!(Ray::parse("abc").is_none());
    }

    #[test]
    fn test_units_to_decimal_usdc() {
        // 1234.567891 USDC (6 decimals)
        let raw = U256::from(1_234_567_891u64);
        assert_eq!(units_to_decimal(raw, 6), Some(dec!(1234.567891)));
    }

    #[test]
    fn test_units_to_decimal_weth() {
        let raw = U256::from(2_500_000_000_000_000_000u128);
        assert_eq!(units_to_decimal(raw, 18), Some(dec!(2.5)));
    }

    #[test]
    fn test_units_to_decimal_zero_decimals() {
        assert_eq!(units_to_decimal(U256::from(42u64), 0), Some(dec!(42)));
    }

    #[test]
    fn test_units_to_decimal_tiny_amount() {
        // 1 wei
        assert_eq!(
            units_to_decimal(U256::from(1u64), 18),
            Some(dec!(0.000000000000000001))
        );
    }

    #[test]
    fn test_units_to_decimal_overflow_is_none() {
        assert!(units_to_decimal(U256::MAX, 0).is_none());
    }

    #[test]
    fn test_units_to_decimal_excess_scale() {
        // 30 decimals: low two digits are dropped
        let raw = U256::from(1_500_000_000_000_000_000_000_000_000_000u128);
        assert_eq!(units_to_decimal(raw, 30), Some(dec!(1.5)));
    }

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_units("1.5", 6), Some(U256::from(1_500_000u64)));
        assert_eq!(parse_units("100", 2), Some(U256::from(10_000u64)));
        assert_eq!(parse_units(".25", 2), Some(U256::from(25u64)));
        assert_eq!(parse_units("0.123456789", 6), Some(U256::from(123_456u64)));
    }

    #[test]
    fn test_parse_units_rejects_non_numeric() {
        assert!(parse_units("", 6).is_none());
        assert!(parse_units("-1", 6).is_none());
        assert!(parse_units("1e5", 6).is_none());
        assert!(parse_units("1,000", 6).is_none());
    }

    #[test]
    fn test_parse_raw_amount() {
        assert_eq!(parse_raw_amount("1000"), Some(U256::from(1000u64)));
        assert!(parse_raw_amount("0x10").is_none());
        assert!(parse_raw_amount("12.5").is_none());
        assert!(parse_raw_amount("").is_none());
    }
}
