use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::DisplayConfig;
use crate::core::format::{
    format_balance, format_compact_currency, format_currency_with, format_health,
    format_percentage, BalanceFormat,
};
use crate::core::savings::GhoSummary;
use crate::errors::PortfolioError;
use crate::types::{HealthStatus, PortfolioSnapshot, Position};

/// What the presentation layer should render. Exactly one applies.
#[derive(Debug, Clone, Copy)]
pub enum ViewState<'a> {
    /// No account connected.
    ConnectWallet,
    /// First fetch for this account still in flight.
    Loading,
    /// Fetch failed and there is no earlier data to show.
    Error(&'a PortfolioError),
    /// Fetch succeeded; the account has no lending positions. The snapshot
    /// may still carry sGHO holdings.
    Empty(&'a PortfolioSnapshot),
    Positions(&'a PortfolioSnapshot),
}

impl ViewState<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConnectWallet => "connect_wallet",
            Self::Loading => "loading",
            Self::Error(_) => "error",
            Self::Empty(_) => "empty",
            Self::Positions(_) => "positions",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedPosition {
    pub symbol: String,
    pub name: String,
    pub underlying_asset: String,
    pub balance: String,
    pub balance_usd: String,
    pub apy: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedGho {
    pub supply_balance: String,
    pub supply_usd: String,
    pub supply_apy: String,
    pub borrow_balance: String,
    pub borrow_usd: String,
    pub borrow_apy: String,
    pub savings_balance: String,
    pub savings_usd: String,
    pub savings_apy: String,
    pub savings_apy_stale: bool,
}

/// Display strings for one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedPortfolio {
    pub account: String,
    pub chain_id: u64,
    pub supplies: Vec<FormattedPosition>,
    pub borrows: Vec<FormattedPosition>,
    pub total_supply_usd: String,
    pub total_borrow_usd: String,
    pub net_worth_usd: String,
    pub health_factor: String,
    pub health_status: HealthStatus,
    pub health_label: &'static str,
    pub available_borrows_usd: String,
    pub current_ltv: String,
    pub avg_supply_apy: String,
    pub avg_borrow_apy: String,
    pub net_apy: String,
    pub estimated_annual_earnings: String,
    pub gho: Option<FormattedGho>,
}

impl FormattedPortfolio {
    pub fn from_snapshot(snapshot: &PortfolioSnapshot, display: &DisplayConfig) -> Self {
        let portfolio = &snapshot.portfolio;
        let balance_opts = BalanceFormat::max_decimals(display.balance_max_decimals);
        let usd = |v: Decimal| format_currency_with(&v, display.currency_decimals);
        let total = |v: Decimal| {
            if display.compact_totals {
                format_compact_currency(&v)
            } else {
                usd(v)
            }
        };
        let position = |p: &Position| FormattedPosition {
            symbol: p.symbol.clone(),
            name: p.name.clone(),
            underlying_asset: p.underlying_asset.clone(),
            balance: format_balance(&p.balance, balance_opts),
            balance_usd: usd(p.balance_usd),
            apy: format_percentage(&p.apy),
        };
        let status = portfolio.health_factor.status();

        Self {
            account: snapshot.account.account.clone(),
            chain_id: snapshot.account.chain_id,
            supplies: portfolio.supplies.iter().map(position).collect(),
            borrows: portfolio.borrows.iter().map(position).collect(),
            total_supply_usd: total(portfolio.total_supply_usd),
            total_borrow_usd: total(portfolio.total_borrow_usd),
            net_worth_usd: total(portfolio.net_worth_usd),
            health_factor: format_health(&portfolio.health_factor),
            health_status: status,
            health_label: status.label(),
            available_borrows_usd: total(portfolio.available_borrows_usd),
            current_ltv: format_percentage(&portfolio.current_ltv),
            avg_supply_apy: format_percentage(&portfolio.avg_supply_apy),
            avg_borrow_apy: format_percentage(&portfolio.avg_borrow_apy),
            net_apy: format_percentage(&snapshot.metrics.net_apy),
            estimated_annual_earnings: usd(snapshot.metrics.estimated_annual_earnings),
            gho: snapshot
                .gho
                .as_ref()
                .map(|g| format_gho(g, balance_opts, display.currency_decimals)),
        }
    }
}

fn format_gho(gho: &GhoSummary, opts: BalanceFormat, currency_decimals: u32) -> FormattedGho {
    FormattedGho {
        supply_balance: format_balance(&gho.supply_balance, opts),
        supply_usd: format_currency_with(&gho.supply_usd, currency_decimals),
        supply_apy: format_percentage(&gho.supply_apy),
        borrow_balance: format_balance(&gho.borrow_balance, opts),
        borrow_usd: format_currency_with(&gho.borrow_usd, currency_decimals),
        borrow_apy: format_percentage(&gho.borrow_apy),
        savings_balance: format_balance(&gho.savings_balance, opts),
        savings_usd: format_currency_with(&gho.savings_usd, currency_decimals),
        savings_apy: format_percentage(&gho.savings_apy),
        savings_apy_stale: gho.savings_apy_stale,
    }
}
