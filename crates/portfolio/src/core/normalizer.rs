use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, warn};

use crate::constants::USD_DECIMALS;
use crate::core::format::parse_decimal;
use crate::core::rates::ray_rate_to_apy_percent;
use crate::types::wad_ray::{parse_raw_amount, units_to_decimal};
use crate::types::{Position, PositionSide, RawPortfolio, RawPositionRecord};

/// Map one upstream record onto a [`Position`].
///
/// Returns `None` when the raw balance is absent, unparseable or zero, so
/// only active positions reach the aggregator. A pre-formatted APY wins over
/// the RAY rate; an upstream USD value wins over `balance * price`.
pub fn normalize(record: &RawPositionRecord, side: PositionSide) -> Option<Position> {
    let raw_balance = match record.raw_balance.as_deref().map(parse_raw_amount) {
        Some(Some(raw)) if !raw.is_zero() => raw,
        Some(Some(_)) => return None,
        Some(None) => {
            debug!(
                symbol = %record.symbol,
                raw = record.raw_balance.as_deref().unwrap_or_default(),
                "unparseable raw balance, skipping record"
            );
            return None;
        }
        None => return None,
    };

    let Some(balance) = units_to_decimal(raw_balance, record.decimals) else {
        warn!(
            symbol = %record.symbol,
            decimals = record.decimals,
            "balance out of decimal range, skipping record"
        );
        return None;
    };

    if !is_valid_address(record.underlying_asset.trim()) {
        debug!(
            symbol = %record.symbol,
            asset = %record.underlying_asset,
            "non-standard asset address, keeping as reported"
        );
    }

    let apy = match record.formatted_apy.as_deref().and_then(parse_decimal) {
        Some(apy) => apy,
        None => record
            .raw_rate
            .as_deref()
            .map(ray_rate_to_apy_percent)
            .unwrap_or_default(),
    };

    let price = record.price_usd.as_deref().and_then(parse_decimal);
    let value = record.value_usd.as_deref().and_then(parse_decimal);

    let balance_usd = match (value, price) {
        (Some(value), _) => value,
        (None, Some(price)) => balance.checked_mul(price).unwrap_or_else(|| {
            warn!(symbol = %record.symbol, "USD value overflow, using 0");
            Decimal::ZERO
        }),
        (None, None) => {
            debug!(symbol = %record.symbol, "no price or USD value reported");
            Decimal::ZERO
        }
    };
    let price_usd = price
        .or_else(|| value.and_then(|v| v.checked_div(balance)))
        .unwrap_or_default();

    Some(Position {
        symbol: record.symbol.clone(),
        name: record.name.clone(),
        underlying_asset: normalize_address(&record.underlying_asset),
        decimals: record.decimals,
        raw_balance,
        balance,
        price_usd,
        balance_usd: balance_usd
            .round_dp_with_strategy(USD_DECIMALS, RoundingStrategy::MidpointAwayFromZero),
        apy,
        side,
    })
}

/// Normalize both sides of an upstream response.
pub fn normalize_portfolio<R: RawPortfolio + ?Sized>(raw: &R) -> (Vec<Position>, Vec<Position>) {
    let supplies = raw
        .supply_records()
        .iter()
        .filter_map(|r| normalize(r, PositionSide::Supply))
        .collect();
    let borrows = raw
        .borrow_records()
        .iter()
        .filter_map(|r| normalize(r, PositionSide::Borrow))
        .collect();
    (supplies, borrows)
}

/// Lower-case, trimmed form used as a position key.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

/// `0x` followed by exactly 40 hex digits.
pub fn is_valid_address(address: &str) -> bool {
    address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .is_some_and(|hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    fn record(raw_balance: Option<&str>) -> RawPositionRecord {
        RawPositionRecord {
            underlying_asset: "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2".into(),
            symbol: "WETH".into(),
            name: "Wrapped Ether".into(),
            decimals: 18,
            raw_balance: raw_balance.map(String::from),
            raw_rate: Some("31709791983764586504854009".into()),
            formatted_apy: None,
            price_usd: Some("2000.50".into()),
            value_usd: None,
        }
    }

    #[test]
    fn test_normalize_from_price() {
        let p = normalize(&record(Some("1500000000000000000")), PositionSide::Supply).unwrap();
        assert_eq!(p.underlying_asset, "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");
        assert_eq!(p.raw_balance, U256::from(1_500_000_000_000_000_000u128));
        assert_eq!(p.balance, dec!(1.5));
        assert_eq!(p.balance_usd, dec!(3000.75));
        assert_eq!(p.price_usd, dec!(2000.50));
        assert_eq!(p.apy.round_dp(2), dec!(3.17));
        assert_eq!(p.side, PositionSide::Supply);
    }

    #[test]
    fn test_skips_zero_absent_and_garbage_balances() {
        assert!(normalize(&record(Some("0")), PositionSide::Supply).is_none());
        assert!(normalize(&record(None), PositionSide::Supply).is_none());
        assert!(normalize(&record(Some("1.5")), PositionSide::Supply).is_none());
        assert!(normalize(&record(Some("lots")), PositionSide::Borrow).is_none());
        assert!(normalize(&record(Some("")), PositionSide::Borrow).is_none());
    }

    #[test]
    fn test_formatted_apy_preferred_over_ray() {
        let mut r = record(Some("1000000000000000000"));
        r.formatted_apy = Some("4.12".into());
        let p = normalize(&r, PositionSide::Supply).unwrap();
        assert_eq!(p.apy, dec!(4.12));
    }

    #[test]
    fn test_unparseable_formatted_apy_falls_back_to_ray() {
        let mut r = record(Some("1000000000000000000"));
        r.formatted_apy = Some("n/a".into());
        let p = normalize(&r, PositionSide::Supply).unwrap();
        assert_eq!(p.apy.round_dp(2), dec!(3.17));
    }

    #[test]
    fn test_missing_rates_yield_zero_apy() {
        let mut r = record(Some("1000000000000000000"));
        r.raw_rate = None;
        let p = normalize(&r, PositionSide::Borrow).unwrap();
        assert_eq!(p.apy, Decimal::ZERO);
    }

    #[test]
    fn test_upstream_value_preferred_and_price_derived() {
        let mut r = record(Some("2000000000000000000"));
        r.price_usd = None;
        r.value_usd = Some("4001.234".into());
        let p = normalize(&r, PositionSide::Supply).unwrap();
        assert_eq!(p.balance_usd, dec!(4001.23));
        assert_eq!(p.price_usd, dec!(2000.617));
    }

    #[test]
    fn test_no_price_information() {
        let mut r = record(Some("2000000000000000000"));
        r.price_usd = Some("garbage".into());
        let p = normalize(&r, PositionSide::Supply).unwrap();
        assert_eq!(p.balance_usd, Decimal::ZERO);
        assert_eq!(p.price_usd, Decimal::ZERO);
    }

    // -----------------------------------------------------------------------
    // Address helpers
    // -----------------------------------------------------------------------

    #[test]
    fn test_is_valid_address() {
        assert!(is_valid_address("0x87870Bca3F3fD6335C3F4ce8392D69350B4fA4E2"));
        assert!(is_valid_address("0x87870bca3f3fd6335c3f4ce8392d69350b4fa4e2"));
    }

    #[test]
    fn test_is_valid_address_rejects() {
        assert!(!is_valid_address(""));
        assert!(!is_valid_address("87870Bca3F3fD6335C3F4ce8392D69350B4fA4E2"));
        assert!(!is_valid_address("0x87870Bca3F3fD6335C3F"));
        assert!(!is_valid_address("0xZZZZ0Bca3F3fD6335C3F4ce8392D69350B4fA4E2"));
    }

    #[test]
    fn test_normalize_address() {
        assert_eq!(
            normalize_address("  0xAbC0000000000000000000000000000000000DeF "),
            "0xabc0000000000000000000000000000000000def"
        );
    }

    /// Raw amounts below 1e28 always fit a `Decimal` mantissa.
    const MAX_EXACT_RAW: u128 = 10_000_000_000_000_000_000_000_000_000;

    #[test]
    fn test_balance_beyond_decimal_range_is_skipped() {
        let mut r = record(Some(&u128::MAX.to_string()));
        r.decimals = 0;
        assert!(normalize(&r, PositionSide::Supply).is_none());

        // Same integer, scaled into range.
        r.decimals = 18;
        let p = normalize(&r, PositionSide::Supply).unwrap();
        assert_eq!(p.balance.trunc(), dec!(340282366920938463463));
    }

    #[test]
    fn test_price_overflow_values_position_at_zero() {
        let mut r = record(Some(&MAX_EXACT_RAW.to_string()));
        r.decimals = 0;
        r.price_usd = Some("100".into());
        let p = normalize(&r, PositionSide::Supply).unwrap();
        assert_eq!(p.balance_usd, Decimal::ZERO);
        assert_eq!(p.price_usd, dec!(100));
    }

    proptest! {
        #[test]
        fn prop_balance_round_trips_through_strings(
            raw in 1u128..MAX_EXACT_RAW,
            decimals in 0u32..=18,
            price_cents in 0i64..10_000_000,
        ) {
            let mut r = record(Some(&raw.to_string()));
            r.decimals = decimals;
            r.price_usd = Some(Decimal::new(price_cents, 2).to_string());
            let p = normalize(&r, PositionSide::Supply);
            prop_assert!(p.is_some(), "positive in-range balance {} dropped", raw);
            let p = p.unwrap();
            let balance = Decimal::from_str(&p.balance.to_string()).unwrap();
            let usd = Decimal::from_str(&p.balance_usd.to_string()).unwrap();
            prop_assert_eq!(balance, p.balance);
            prop_assert_eq!(usd, p.balance_usd);
            prop_assert!(p.balance_usd.scale() <= USD_DECIMALS);
        }

        #[test]
        fn prop_non_positive_balances_never_normalize(s in "(0|-[0-9]{1,10}|[a-z]{1,8})") {
            prop_assert!(normalize(&record(Some(&s)), PositionSide::Supply).is_none());
        }
    }
}
