//! Display formatting with precision tiers.
//!
//! Every formatter takes anything implementing [`DisplayNumber`] (`Decimal`,
//! `f64`, `str`, `String`) and never fails: input that does not parse renders
//! as that formatter's zero value.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;
use tracing::debug;

use crate::constants::{
    COMPACT_BALANCE_THRESHOLD, INFINITE_HEALTH_FACTOR, INFINITY_SYMBOL, MIN_DISPLAY_PERCENT,
    MIN_DISPLAY_USD, SCIENTIFIC_BALANCE_THRESHOLD, USD_DECIMALS,
};
use crate::types::HealthFactor;

const ZERO_CURRENCY: &str = "$0.00";
const ZERO_PERCENT: &str = "0%";
const ZERO_BALANCE: &str = "0";
const ZERO_HEALTH_FACTOR: &str = "0.00";

/// Digits kept for balances below one unit.
const SUB_UNIT_BALANCE_DECIMALS: u32 = 6;

// ---------------------------------------------------------------------------
// Input coercion
// ---------------------------------------------------------------------------

/// Lossy conversion to `Decimal` for display purposes.
pub trait DisplayNumber {
    fn to_decimal_lossy(&self) -> Option<Decimal>;
}

impl DisplayNumber for Decimal {
    fn to_decimal_lossy(&self) -> Option<Decimal> {
        Some(*self)
    }
}

impl DisplayNumber for f64 {
    fn to_decimal_lossy(&self) -> Option<Decimal> {
        Decimal::from_f64(*self)
    }
}

impl DisplayNumber for str {
    fn to_decimal_lossy(&self) -> Option<Decimal> {
        parse_decimal(self)
    }
}

impl DisplayNumber for String {
    fn to_decimal_lossy(&self) -> Option<Decimal> {
        parse_decimal(self)
    }
}

impl<T: DisplayNumber + ?Sized> DisplayNumber for &T {
    fn to_decimal_lossy(&self) -> Option<Decimal> {
        (**self).to_decimal_lossy()
    }
}

/// Parse a plain (`"12.5"`) or scientific (`"1.2e-5"`) decimal string.
pub fn parse_decimal(s: &str) -> Option<Decimal> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

fn coerce<V: DisplayNumber + ?Sized>(value: &V, formatter: &'static str) -> Option<Decimal> {
    let parsed = value.to_decimal_lossy();
    if parsed.is_none() {
        debug!(formatter, "unparseable display value, rendering zero");
    }
    parsed
}

// ---------------------------------------------------------------------------
// Currency
// ---------------------------------------------------------------------------

/// USD with two decimals: `$1,234.50`.
pub fn format_currency<V: DisplayNumber + ?Sized>(value: &V) -> String {
    format_currency_with(value, USD_DECIMALS)
}

/// USD with a fixed number of decimals and thousands separators.
///
/// Zero renders as `$0.00`; non-zero magnitudes below one cent as `<$0.01`,
/// or `-<$0.01` when negative.
pub fn format_currency_with<V: DisplayNumber + ?Sized>(value: &V, decimals: u32) -> String {
    let Some(v) = coerce(value, "currency") else {
        return ZERO_CURRENCY.to_string();
    };
    if v.is_zero() {
        return ZERO_CURRENCY.to_string();
    }
    if v.abs() < MIN_DISPLAY_USD {
        let sign = if v.is_sign_negative() { "-" } else { "" };
        return format!("{sign}<${MIN_DISPLAY_USD}");
    }
    let body = group_thousands(&fixed(v.abs(), decimals));
    if v.is_sign_negative() {
        format!("-${body}")
    } else {
        format!("${body}")
    }
}

/// USD with K/M/B suffixes above one thousand, plain currency below.
pub fn format_compact_currency<V: DisplayNumber + ?Sized>(value: &V) -> String {
    let Some(v) = coerce(value, "compact_currency") else {
        return ZERO_CURRENCY.to_string();
    };
    match compact(v.abs()) {
        Some(body) if v.is_sign_negative() => format!("-${body}"),
        Some(body) => format!("${body}"),
        None => format_currency(&v),
    }
}

// ---------------------------------------------------------------------------
// Percentage
// ---------------------------------------------------------------------------

/// Percent with two decimals: `4.12%`. Tiny non-zero values render `<0.01%`
/// (`-<0.01%` below zero).
pub fn format_percentage<V: DisplayNumber + ?Sized>(value: &V) -> String {
    let Some(v) = coerce(value, "percentage") else {
        return ZERO_PERCENT.to_string();
    };
    if v.is_zero() {
        return ZERO_PERCENT.to_string();
    }
    if v.abs() < MIN_DISPLAY_PERCENT {
        let sign = if v.is_sign_negative() { "-" } else { "" };
        return format!("{sign}<{MIN_DISPLAY_PERCENT}%");
    }
    format!("{}%", fixed(v, 2))
}

// ---------------------------------------------------------------------------
// Token balance
// ---------------------------------------------------------------------------

/// Options for [`format_balance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceFormat {
    pub max_decimals: u32,
    pub min_decimals: u32,
    /// K/M/B suffixes at and above 10,000.
    pub compact: bool,
}

impl Default for BalanceFormat {
    fn default() -> Self {
        Self {
            max_decimals: 4,
            min_decimals: 0,
            compact: false,
        }
    }
}

impl BalanceFormat {
    pub fn max_decimals(max_decimals: u32) -> Self {
        Self {
            max_decimals,
            ..Self::default()
        }
    }
}

/// Token balance with precision tiers:
///
/// | magnitude      | rendering                          |
/// |----------------|------------------------------------|
/// | 0              | `0`                                |
/// | < 0.0001       | scientific, `1.23e-5`              |
/// | < 1            | up to 6 fractional digits          |
/// | >= 10,000      | `12.5K` when `compact`             |
/// | otherwise      | grouped, `min..=max` fractional    |
pub fn format_balance<V: DisplayNumber + ?Sized>(value: &V, opts: BalanceFormat) -> String {
    let Some(v) = coerce(value, "balance") else {
        return ZERO_BALANCE.to_string();
    };
    if v.is_zero() {
        return ZERO_BALANCE.to_string();
    }

    let sign = if v.is_sign_negative() { "-" } else { "" };
    let abs = v.abs();

    if abs < SCIENTIFIC_BALANCE_THRESHOLD {
        return format!("{sign}{}", scientific(abs));
    }
    if abs < Decimal::ONE {
        let r = abs
            .round_dp_with_strategy(SUB_UNIT_BALANCE_DECIMALS, RoundingStrategy::MidpointAwayFromZero)
            .normalize();
        return format!("{sign}{r}");
    }
    if opts.compact && abs >= COMPACT_BALANCE_THRESHOLD {
        if let Some(body) = compact(abs) {
            return format!("{sign}{body}");
        }
    }

    let max = opts.max_decimals.max(opts.min_decimals);
    let mut r = abs
        .round_dp_with_strategy(max, RoundingStrategy::MidpointAwayFromZero)
        .normalize();
    if r.scale() < opts.min_decimals {
        r.rescale(opts.min_decimals);
    }
    format!("{sign}{}", group_thousands(&r.to_string()))
}

// ---------------------------------------------------------------------------
// Health factor
// ---------------------------------------------------------------------------

/// Health factor with tiered precision; absent renders `∞`.
///
/// Above 1,000,000 renders `∞`; `>= 100` has no decimals, `>= 10` one,
/// otherwise two.
pub fn format_health_factor<V: DisplayNumber + ?Sized>(value: Option<&V>) -> String {
    let Some(value) = value else {
        return INFINITY_SYMBOL.to_string();
    };
    let Some(v) = coerce(value, "health_factor") else {
        return ZERO_HEALTH_FACTOR.to_string();
    };
    if v > INFINITE_HEALTH_FACTOR {
        return INFINITY_SYMBOL.to_string();
    }
    let decimals = if v >= Decimal::ONE_HUNDRED {
        0
    } else if v >= Decimal::TEN {
        1
    } else {
        2
    };
    fixed(v, decimals)
}

/// [`format_health_factor`] for a typed [`HealthFactor`].
pub fn format_health(hf: &HealthFactor) -> String {
    match hf {
        HealthFactor::NoDebt => INFINITY_SYMBOL.to_string(),
        HealthFactor::Value(v) => format_health_factor(Some(v)),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Round half away from zero and pad to exactly `decimals` places.
fn fixed(v: Decimal, decimals: u32) -> String {
    let mut r = v.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero);
    r.rescale(decimals);
    r.to_string()
}

/// Insert `,` every three digits of the integer part.
fn group_thousands(s: &str) -> String {
    let (sign, rest) = match s.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", s),
    };
    let (int_part, frac_part) = match rest.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (rest, None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    match frac_part {
        Some(f) => format!("{sign}{grouped}.{f}"),
        None => format!("{sign}{grouped}"),
    }
}

/// `1.23e-5` style, two fractional digits in the mantissa. `abs` must be
/// positive.
fn scientific(abs: Decimal) -> String {
    let mut mantissa = abs;
    let mut exponent: i32 = 0;
    while mantissa < Decimal::ONE {
        mantissa *= Decimal::TEN;
        exponent -= 1;
    }
    while mantissa >= Decimal::TEN {
        mantissa /= Decimal::TEN;
        exponent += 1;
    }

    let mut rounded = mantissa.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    if rounded >= Decimal::TEN {
        rounded /= Decimal::TEN;
        exponent += 1;
    }
    rounded.rescale(2);
    format!("{rounded}e{exponent}")
}

/// `12.5K`, `3.2M`, `1.05B`. `None` below one thousand.
fn compact(abs: Decimal) -> Option<String> {
    const STEPS: [(Decimal, &str); 3] = [
        (Decimal::from_parts(1_000_000_000, 0, 0, false, 0), "B"),
        (Decimal::from_parts(1_000_000, 0, 0, false, 0), "M"),
        (Decimal::from_parts(1_000, 0, 0, false, 0), "K"),
    ];
    STEPS.iter().find(|(div, _)| abs >= *div).map(|(div, suffix)| {
        let scaled = (abs / *div)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
            .normalize();
        format!("{scaled}{suffix}")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    // -----------------------------------------------------------------------
    // Currency
    // -----------------------------------------------------------------------

    #[test]
    fn test_currency_zero_and_dust() {
        assert_eq!(format_currency(&dec!(0)), "$0.00");
        assert_eq!(format_currency(&dec!(0.005)), "<$0.01");
        assert_eq!(format_currency(&0.005f64), "<$0.01");
        assert_eq!(format_currency("0.005"), "<$0.01");
    }

    #[test]
    fn test_negative_dust_keeps_sign() {
        assert_eq!(format_currency(&dec!(-0.004)), "-<$0.01");
        assert_eq!(format_currency("-0.009"), "-<$0.01");
        assert_eq!(format_percentage(&dec!(-0.005)), "-<0.01%");
    }

    #[test]
    fn test_currency_grouping_and_sign() {
        assert_eq!(format_currency(&dec!(1234.5)), "$1,234.50");
        assert_eq!(format_currency(&dec!(-1234.5)), "-$1,234.50");
        assert_eq!(format_currency("1000000"), "$1,000,000.00");
        assert_eq!(format_currency(&dec!(999.999)), "$1,000.00");
        assert_eq!(format_currency(&dec!(0.01)), "$0.01");
    }

    #[test]
    fn test_currency_custom_decimals() {
        assert_eq!(format_currency_with(&dec!(1234.5678), 4), "$1,234.5678");
        assert_eq!(format_currency_with(&dec!(1234.5), 0), "$1,235");
    }

    #[test]
    fn test_currency_unparseable_is_zero() {
        assert_eq!(format_currency("abc"), "$0.00");
        assert_eq!(format_currency(""), "$0.00");
        assert_eq!(format_currency(&f64::NAN), "$0.00");
    }

    #[test]
    fn test_compact_currency() {
        assert_eq!(format_compact_currency(&dec!(1_250_000)), "$1.25M");
        assert_eq!(format_compact_currency(&dec!(-45_600)), "-$45.6K");
        assert_eq!(format_compact_currency(&dec!(3_100_000_000)), "$3.1B");
        assert_eq!(format_compact_currency(&dec!(999.5)), "$999.50");
    }

    // -----------------------------------------------------------------------
    // Percentage
    // -----------------------------------------------------------------------

    #[test]
    fn test_percentage_tiers() {
        assert_eq!(format_percentage(&dec!(0)), "0%");
        assert_eq!(format_percentage(&dec!(0.005)), "<0.01%");
        assert_eq!(format_percentage(&dec!(4.125)), "4.13%");
        assert_eq!(format_percentage(&dec!(-1)), "-1.00%");
        assert_eq!(format_percentage("not a rate"), "0%");
    }

    // -----------------------------------------------------------------------
    // Balance
    // -----------------------------------------------------------------------

    #[test]
    fn test_balance_zero() {
        assert_eq!(format_balance(&dec!(0), BalanceFormat::default()), "0");
        assert_eq!(format_balance("garbage", BalanceFormat::default()), "0");
    }

    #[test]
    fn test_balance_scientific() {
        assert_eq!(format_balance(&dec!(0.0000123), BalanceFormat::default()), "1.23e-5");
        assert_eq!(format_balance(&dec!(0.00009999), BalanceFormat::default()), "1.00e-4");
        assert_eq!(format_balance("-0.000005", BalanceFormat::default()), "-5.00e-6");
    }

    #[test]
    fn test_balance_sub_unit() {
        assert_eq!(format_balance(&dec!(0.1234567), BalanceFormat::default()), "0.123457");
        assert_eq!(format_balance(&dec!(0.5), BalanceFormat::default()), "0.5");
        assert_eq!(format_balance(&dec!(0.0001), BalanceFormat::default()), "0.0001");
    }

    #[test]
    fn test_balance_grouped() {
        let opts = BalanceFormat::max_decimals(4);
        assert_eq!(format_balance(&dec!(450334.623456), opts), "450,334.6235");
        assert_eq!(format_balance(&dec!(12), opts), "12");

        let opts = BalanceFormat {
            max_decimals: 4,
            min_decimals: 2,
            compact: false,
        };
        assert_eq!(format_balance(&dec!(12), opts), "12.00");
        assert_eq!(format_balance(&dec!(1234.5), opts), "1,234.50");
    }

    #[test]
    fn test_balance_compact() {
        let opts = BalanceFormat {
            compact: true,
            ..BalanceFormat::default()
        };
        assert_eq!(format_balance(&dec!(12_500), opts), "12.5K");
        assert_eq!(format_balance(&dec!(9_999), opts), "9,999");
        assert_eq!(format_balance(&dec!(2_000_000), opts), "2M");
    }

    // -----------------------------------------------------------------------
    // Health factor
    // -----------------------------------------------------------------------

    #[test]
    fn test_health_factor_tiers() {
        assert_eq!(format_health_factor::<str>(None), "∞");
        assert_eq!(format_health_factor(Some("1500000")), "∞");
        assert_eq!(format_health_factor(Some("2.5")), "2.50");
        assert_eq!(format_health_factor(Some(&dec!(12.34))), "12.3");
        assert_eq!(format_health_factor(Some(&dec!(150.6))), "151");
        assert_eq!(format_health_factor(Some(&dec!(1_000_000))), "1000000");
        assert_eq!(format_health_factor(Some("n/a")), "0.00");
    }

    #[test]
    fn test_format_health_typed() {
        assert_eq!(format_health(&HealthFactor::NoDebt), "∞");
        assert_eq!(format_health(&HealthFactor::Value(dec!(1.456))), "1.46");
    }

    #[test]
    fn test_parse_decimal_accepts_scientific() {
        assert_eq!(parse_decimal("1.5e-3"), Some(dec!(0.0015)));
        assert_eq!(parse_decimal(" 42 "), Some(dec!(42)));
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("1,000"), None);
    }

    proptest! {
        #[test]
        fn prop_currency_never_panics(s in "\\PC*") {
            let out = format_currency(s.as_str());
            prop_assert!(out.contains('$'));
        }

        #[test]
        fn prop_nonzero_currency_never_renders_zero(cents in 1i64..1_000_000_000) {
            let v = Decimal::new(cents, 4);
            prop_assert_ne!(format_currency(&v), "$0.00");
        }

        #[test]
        fn prop_balance_never_panics(mantissa in any::<i64>(), scale in 0u32..28) {
            let v = Decimal::new(mantissa, scale);
            let out = format_balance(&v, BalanceFormat::default());
            prop_assert!(!out.is_empty());
        }
    }
}
