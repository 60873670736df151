//! GHO and sGHO (savings GHO) figures.
//!
//! The sGHO rate is not exposed by the upstream API, so it comes from
//! `savings.json` and carries its own freshness date.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;

use crate::config::SavingsConfig;
use crate::constants::GHO_SYMBOL;
use crate::errors::PortfolioError;
use crate::types::aave::SavingsBalance;
use crate::types::{Portfolio, PositionSide};

/// Manually maintained sGHO APY. An approximation, not a live rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavingsApy {
    /// Percent, e.g. `5.85`.
    pub apy: Decimal,
    pub last_updated: NaiveDate,
    pub source: String,
    pub stale_after_days: i64,
}

impl SavingsApy {
    /// Fails when the configured APY is missing or not a decimal.
    pub fn from_config(config: &SavingsConfig) -> Result<Self, PortfolioError> {
        let raw = config
            .sgho_apy
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PortfolioError::Config("sGHO APY is not configured".into()))?;
        let apy = Decimal::from_str(raw.trim())
            .map_err(|e| PortfolioError::Config(format!("sGHO APY '{raw}' is invalid: {e}")))?;

        Ok(Self {
            apy,
            last_updated: config.last_updated,
            source: config.source.clone(),
            stale_after_days: config.stale_after_days,
        })
    }

    /// Whole days since the value was last refreshed.
    pub fn age_days(&self, today: NaiveDate) -> i64 {
        (today - self.last_updated).num_days()
    }

    /// Unrefreshed for more than `stale_after_days`.
    pub fn is_stale(&self, today: NaiveDate) -> bool {
        self.age_days(today) > self.stale_after_days
    }

    /// Human-readable provenance for the value.
    pub fn label(&self) -> String {
        format!(
            "approximate, manually updated {} ({})",
            self.last_updated, self.source
        )
    }
}

/// GHO supply/borrow plus sGHO holdings for one account.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GhoSummary {
    #[serde(with = "rust_decimal::serde::str")]
    pub supply_balance: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub supply_usd: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub supply_apy: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub borrow_balance: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub borrow_usd: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub borrow_apy: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub savings_balance: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub savings_usd: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub savings_apy: Decimal,
    pub savings_apy_stale: bool,
    pub savings_apy_last_updated: NaiveDate,
}

impl GhoSummary {
    /// `None` when the account has no GHO supply, no GHO debt and no sGHO.
    pub fn from_portfolio(
        portfolio: &Portfolio,
        savings: Option<&SavingsBalance>,
        savings_apy: &SavingsApy,
        today: NaiveDate,
    ) -> Option<Self> {
        let supply = portfolio.find_symbol(PositionSide::Supply, GHO_SYMBOL);
        let borrow = portfolio.find_symbol(PositionSide::Borrow, GHO_SYMBOL);
        let savings_balance = savings.map(SavingsBalance::balance).unwrap_or_default();

        if supply.is_none() && borrow.is_none() && savings_balance.is_zero() {
            return None;
        }

        Some(Self {
            supply_balance: supply.map(|p| p.balance).unwrap_or_default(),
            supply_usd: supply.map(|p| p.balance_usd).unwrap_or_default(),
            supply_apy: supply.map(|p| p.apy).unwrap_or_default(),
            borrow_balance: borrow.map(|p| p.balance).unwrap_or_default(),
            borrow_usd: borrow.map(|p| p.balance_usd).unwrap_or_default(),
            borrow_apy: borrow.map(|p| p.apy).unwrap_or_default(),
            savings_balance,
            savings_usd: savings.map(SavingsBalance::balance_usd).unwrap_or_default(),
            savings_apy: savings_apy.apy,
            savings_apy_stale: savings_apy.is_stale(today),
            savings_apy_last_updated: savings_apy.last_updated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::aggregator::aggregate;
    use crate::types::aave::ApiDecimalValue;
    use crate::types::Position;
    use alloy::primitives::U256;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn savings_apy() -> SavingsApy {
        SavingsApy {
            apy: dec!(5.85),
            last_updated: date(2025, 10, 31),
            source: "https://app.aave.com/sgho/".into(),
            stale_after_days: 7,
        }
    }

    fn gho(side: PositionSide, balance: Decimal, apy: Decimal) -> Position {
        Position {
            symbol: "GHO".into(),
            name: "Gho Token".into(),
            underlying_asset: "0x40d16fc0246ad3160ccc09b8d0d3a2cd28ae6c2f".into(),
            decimals: 18,
            raw_balance: U256::from(1u64),
            balance,
            price_usd: dec!(1),
            balance_usd: balance,
            apy,
            side,
        }
    }

    fn sgho(value: &str) -> SavingsBalance {
        SavingsBalance {
            usd_per_token: Some("1.0".into()),
            amount: ApiDecimalValue {
                raw: None,
                value: Some(value.into()),
                decimals: Some(18),
            },
            usd: None,
        }
    }

    #[test]
    fn test_staleness_boundary() {
        let apy = savings_apy();
        assert!(!apy.is_stale(date(2025, 11, 7)));
        assert!(apy.is_stale(date(2025, 11, 8)));
        assert_eq!(apy.age_days(date(2025, 11, 8)), 8);
    }

    #[test]
    fn test_from_config_requires_apy() {
        let mut config = SavingsConfig {
            sgho_apy: None,
            last_updated: date(2025, 10, 31),
            source: "manual".into(),
            stale_after_days: 7,
            sgho_contract: crate::constants::SGHO_CONTRACT_ADDRESS.into(),
        };
        assert!(matches!(
            SavingsApy::from_config(&config),
            Err(PortfolioError::Config(_))
        ));

        config.sgho_apy = Some("5.85".into());
        assert_eq!(SavingsApy::from_config(&config).unwrap().apy, dec!(5.85));

        config.sgho_apy = Some("high".into());
        assert!(SavingsApy::from_config(&config).is_err());
    }

    #[test]
    fn test_summary_absent_without_gho() {
        let portfolio = aggregate(vec![], vec![]);
        let today = date(2025, 11, 1);
        assert!(GhoSummary::from_portfolio(&portfolio, None, &savings_apy(), today).is_none());
        assert!(
            GhoSummary::from_portfolio(&portfolio, Some(&sgho("0")), &savings_apy(), today)
                .is_none()
        );
    }

    #[test]
    fn test_summary_from_positions_and_savings() {
        let portfolio = aggregate(
            vec![gho(PositionSide::Supply, dec!(1000), dec!(4.12))],
            vec![gho(PositionSide::Borrow, dec!(250), dec!(6.5))],
        );
        let summary = GhoSummary::from_portfolio(
            &portfolio,
            Some(&sgho("300")),
            &savings_apy(),
            date(2025, 12, 1),
        )
        .unwrap();

        assert_eq!(summary.supply_balance, dec!(1000));
        assert_eq!(summary.supply_apy, dec!(4.12));
        assert_eq!(summary.borrow_usd, dec!(250));
        assert_eq!(summary.borrow_apy, dec!(6.5));
        assert_eq!(summary.savings_balance, dec!(300));
        assert_eq!(summary.savings_usd, dec!(300));
        assert_eq!(summary.savings_apy, dec!(5.85));
        assert!(summary.savings_apy_stale);
    }

    #[test]
    fn test_summary_with_only_savings() {
        let portfolio = aggregate(vec![], vec![]);
        let summary = GhoSummary::from_portfolio(
            &portfolio,
            Some(&sgho("12.5")),
            &savings_apy(),
            date(2025, 11, 2),
        )
        .unwrap();
        assert_eq!(summary.supply_balance, Decimal::ZERO);
        assert_eq!(summary.savings_balance, dec!(12.5));
        assert!(!summary.savings_apy_stale);
    }
}
