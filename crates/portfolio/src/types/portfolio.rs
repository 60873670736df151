use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::health::HealthFactor;
use super::position::{Position, PositionSide};
use crate::core::savings::GhoSummary;

/// The account being watched. A change of either field is a new identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountContext {
    pub account: String,
    pub chain_id: u64,
}

impl AccountContext {
    pub fn new(account: impl Into<String>, chain_id: u64) -> Self {
        Self {
            account: account.into(),
            chain_id,
        }
    }
}

impl fmt::Display for AccountContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.account, self.chain_id)
    }
}

/// One account's positions and totals at one point in time.
///
/// Rebuilt on every fetch; never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    pub supplies: Vec<Position>,
    pub borrows: Vec<Position>,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_supply_usd: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_borrow_usd: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub net_worth_usd: Decimal,
    pub health_factor: HealthFactor,
    #[serde(with = "rust_decimal::serde::str")]
    pub available_borrows_usd: Decimal,
    /// Borrow / supply, as a percentage.
    #[serde(with = "rust_decimal::serde::str")]
    pub current_ltv: Decimal,
    /// USD-weighted supply APY, percent.
    #[serde(with = "rust_decimal::serde::str")]
    pub avg_supply_apy: Decimal,
    /// USD-weighted borrow APY, percent.
    #[serde(with = "rust_decimal::serde::str")]
    pub avg_borrow_apy: Decimal,
}

impl Portfolio {
    /// No supplies and no borrows.
    pub fn is_empty(&self) -> bool {
        self.supplies.is_empty() && self.borrows.is_empty()
    }

    pub fn positions(&self, side: PositionSide) -> &[Position] {
        match side {
            PositionSide::Supply => &self.supplies,
            PositionSide::Borrow => &self.borrows,
        }
    }

    /// First position on `side` whose symbol matches, case-insensitively.
    pub fn find_symbol(&self, side: PositionSide, symbol: &str) -> Option<&Position> {
        self.positions(side)
            .iter()
            .find(|p| p.symbol.eq_ignore_ascii_case(symbol))
    }
}

/// Yield figures derived from a [`Portfolio`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedMetrics {
    /// Net yield on supplied capital, percent. Negative when borrow cost
    /// exceeds supply yield.
    #[serde(with = "rust_decimal::serde::str")]
    pub net_apy: Decimal,
    /// `net_worth_usd * net_apy / 100`.
    #[serde(with = "rust_decimal::serde::str")]
    pub estimated_annual_earnings: Decimal,
}

/// Everything published for one successful fetch cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSnapshot {
    pub account: AccountContext,
    pub portfolio: Portfolio,
    pub metrics: DerivedMetrics,
    /// Present only when the account holds GHO or sGHO.
    pub gho: Option<GhoSummary>,
    pub fetched_at: DateTime<Utc>,
}
