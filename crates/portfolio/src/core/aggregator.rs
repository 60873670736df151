use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::config::AggregationConfig;
use crate::constants::UPSTREAM_DRIFT_TOLERANCE;
use crate::core::normalizer::normalize_portfolio;
use crate::core::savings::{GhoSummary, SavingsApy};
use crate::types::{
    AccountContext, DerivedMetrics, HealthFactor, Portfolio, PortfolioSnapshot, Position,
    RawPortfolio, UpstreamAccountState,
};

/// Fold positions into a [`Portfolio`] using only local figures and the
/// default fallback parameters.
pub fn aggregate(supplies: Vec<Position>, borrows: Vec<Position>) -> Portfolio {
    aggregate_with(supplies, borrows, None, &AggregationConfig::default())
}

/// Fold positions into a [`Portfolio`].
///
/// Upstream account figures, when present, take precedence for the health
/// factor (if `params.use_upstream_health_factor`) and available borrows.
/// Otherwise the health factor is `supply / borrow` and available borrows are
/// approximated as `max(0, supply * fallback_ltv - borrow)`. The flat LTV is
/// an approximation: real collateral factors vary per asset.
///
/// All arithmetic is checked. A position whose USD value cannot be added to
/// its side's total is revalued at zero, and a derived figure that overflows
/// falls back to zero, each with a `warn!`.
pub fn aggregate_with(
    supplies: Vec<Position>,
    borrows: Vec<Position>,
    upstream: Option<&UpstreamAccountState>,
    params: &AggregationConfig,
) -> Portfolio {
    let mut supplies = merge_by_asset(supplies);
    let mut borrows = merge_by_asset(borrows);

    let total_supply_usd = total_usd(&mut supplies);
    let total_borrow_usd = total_usd(&mut borrows);

    let upstream_hf = upstream
        .filter(|_| params.use_upstream_health_factor)
        .and_then(|u| u.health_factor);
    let health_factor = match upstream_hf {
        Some(hf) => HealthFactor::Value(hf),
        None => HealthFactor::from_ratio(total_supply_usd, total_borrow_usd),
    };

    let available_borrows_usd = upstream
        .and_then(|u| u.available_borrows_usd)
        .unwrap_or_else(|| {
            or_zero(
                total_supply_usd
                    .checked_mul(params.fallback_ltv)
                    .and_then(|capacity| capacity.checked_sub(total_borrow_usd)),
                "available_borrows_usd",
            )
        })
        .max(Decimal::ZERO);

    let current_ltv = if total_supply_usd.is_zero() {
        Decimal::ZERO
    } else {
        total_borrow_usd
            .checked_div(total_supply_usd)
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            .unwrap_or_else(|| {
                warn!(
                    supply = %total_supply_usd,
                    borrow = %total_borrow_usd,
                    "LTV out of range, capping"
                );
                Decimal::MAX
            })
    };

    Portfolio {
        avg_supply_apy: weighted_apy(&supplies, total_supply_usd),
        avg_borrow_apy: weighted_apy(&borrows, total_borrow_usd),
        net_worth_usd: or_zero(total_supply_usd.checked_sub(total_borrow_usd), "net_worth_usd"),
        supplies,
        borrows,
        total_supply_usd,
        total_borrow_usd,
        health_factor,
        available_borrows_usd,
        current_ltv,
    }
}

/// Net APY and projected annual earnings.
///
/// `net_apy = (S * aS/100 - B * aB/100) / S * 100`, zero without supply.
/// Evaluated as `aS - (B / S) * aB`.
pub fn derive_metrics(portfolio: &Portfolio) -> DerivedMetrics {
    let s = portfolio.total_supply_usd;
    let b = portfolio.total_borrow_usd;

    let net_apy = if s.is_zero() {
        Decimal::ZERO
    } else {
        or_zero(
            b.checked_div(s)
                .and_then(|leverage| leverage.checked_mul(portfolio.avg_borrow_apy))
                .and_then(|cost| portfolio.avg_supply_apy.checked_sub(cost)),
            "net_apy",
        )
    };

    let estimated_annual_earnings = or_zero(
        portfolio
            .net_worth_usd
            .checked_mul(net_apy)
            .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED)),
        "estimated_annual_earnings",
    );

    DerivedMetrics {
        net_apy,
        estimated_annual_earnings,
    }
}

/// Normalize, aggregate and derive everything published for one cycle.
pub fn build_snapshot<R: RawPortfolio + ?Sized>(
    account: AccountContext,
    raw: &R,
    params: &AggregationConfig,
    savings_apy: &SavingsApy,
    fetched_at: DateTime<Utc>,
) -> PortfolioSnapshot {
    let (supplies, borrows) = normalize_portfolio(raw);
    let upstream = raw.account_state();
    let portfolio = aggregate_with(supplies, borrows, upstream.as_ref(), params);
    let metrics = derive_metrics(&portfolio);
    let gho = GhoSummary::from_portfolio(
        &portfolio,
        raw.savings_balance(),
        savings_apy,
        fetched_at.date_naive(),
    );

    if let Some(upstream) = &upstream {
        for drift in upstream_drift(&portfolio, &metrics, upstream) {
            debug!(
                account = %account,
                figure = drift.figure,
                local = %drift.local,
                upstream = %drift.upstream,
                "local figure differs from upstream"
            );
        }
    }

    debug!(
        account = %account,
        supplies = portfolio.supplies.len(),
        borrows = portfolio.borrows.len(),
        upstream_state = upstream.is_some(),
        "portfolio aggregated"
    );

    PortfolioSnapshot {
        account,
        portfolio,
        metrics,
        gho,
        fetched_at,
    }
}

/// One account figure where the local value and upstream's disagree.
#[derive(Debug, Clone, PartialEq)]
pub struct FigureDrift {
    pub figure: &'static str,
    pub local: Decimal,
    pub upstream: Decimal,
}

/// Figures further than [`UPSTREAM_DRIFT_TOLERANCE`] from upstream's own.
///
/// Upstream collateral only counts collateral-enabled supplies, so some
/// supply drift is normal.
pub fn upstream_drift(
    portfolio: &Portfolio,
    metrics: &DerivedMetrics,
    upstream: &UpstreamAccountState,
) -> Vec<FigureDrift> {
    [
        ("total_supply_usd", portfolio.total_supply_usd, upstream.total_collateral_usd),
        ("total_borrow_usd", portfolio.total_borrow_usd, upstream.total_debt_usd),
        ("net_worth_usd", portfolio.net_worth_usd, upstream.net_worth_usd),
        ("net_apy", metrics.net_apy, upstream.net_apy),
    ]
    .into_iter()
    .filter_map(|(figure, local, reported)| {
        let reported = reported?;
        let apart = local
            .checked_sub(reported)
            .map_or(true, |d| d.abs() > UPSTREAM_DRIFT_TOLERANCE);
        apart.then_some(FigureDrift {
            figure,
            local,
            upstream: reported,
        })
    })
    .collect()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn or_zero(value: Option<Decimal>, figure: &'static str) -> Decimal {
    value.unwrap_or_else(|| {
        warn!(figure, "decimal overflow, using 0");
        Decimal::ZERO
    })
}

/// Side total. A position that would overflow it is revalued at zero.
fn total_usd(positions: &mut [Position]) -> Decimal {
    let mut total = Decimal::ZERO;
    for p in positions.iter_mut() {
        match total.checked_add(p.balance_usd) {
            Some(sum) => total = sum,
            None => {
                warn!(
                    symbol = %p.symbol,
                    usd = %p.balance_usd,
                    "USD total overflow, valuing position at 0"
                );
                p.balance_usd = Decimal::ZERO;
            }
        }
    }
    total
}

/// `balance_usd / total * apy`.
fn weighted_term(balance_usd: Decimal, total: Decimal, apy: Decimal) -> Option<Decimal> {
    balance_usd.checked_div(total)?.checked_mul(apy)
}

/// `Σ(balance_usd / total * apy)`, zero when `total` is zero. Terms that
/// overflow are left out.
fn weighted_apy(positions: &[Position], total: Decimal) -> Decimal {
    if total.is_zero() {
        return Decimal::ZERO;
    }
    positions.iter().fold(Decimal::ZERO, |acc, p| {
        match weighted_term(p.balance_usd, total, p.apy).and_then(|t| acc.checked_add(t)) {
            Some(next) => next,
            None => {
                warn!(symbol = %p.symbol, apy = %p.apy, "APY weighting overflow, skipping position");
                acc
            }
        }
    })
}

/// Merge records that share an `underlying_asset`, keeping first-seen order.
///
/// Balances and USD values add; the APY becomes the USD-weighted mean. A
/// duplicate whose amounts cannot be added is dropped.
fn merge_by_asset(positions: Vec<Position>) -> Vec<Position> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(positions.len());
    let mut merged: Vec<Position> = Vec::with_capacity(positions.len());

    for p in positions {
        let Some(&i) = index.get(&p.underlying_asset) else {
            index.insert(p.underlying_asset.clone(), merged.len());
            merged.push(p);
            continue;
        };

        let existing = &mut merged[i];
        debug!(asset = %p.underlying_asset, symbol = %p.symbol, "merging duplicate position");
        let sums = existing
            .balance_usd
            .checked_add(p.balance_usd)
            .zip(existing.balance.checked_add(p.balance));
        let Some((combined_usd, combined_balance)) = sums else {
            warn!(
                asset = %p.underlying_asset,
                symbol = %p.symbol,
                "amount overflow merging duplicate position, dropping it"
            );
            continue;
        };

        if !combined_usd.is_zero() {
            let apy = weighted_term(existing.balance_usd, combined_usd, existing.apy)
                .zip(weighted_term(p.balance_usd, combined_usd, p.apy))
                .and_then(|(a, b)| a.checked_add(b));
            match apy {
                Some(apy) => existing.apy = apy,
                None => warn!(symbol = %p.symbol, "APY merge overflow, keeping first rate"),
            }
        }
        existing.raw_balance = existing.raw_balance.saturating_add(p.raw_balance);
        existing.balance = combined_balance;
        existing.balance_usd = combined_usd;
    }
    merged
}
