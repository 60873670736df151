use std::path::PathBuf;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use aave_portfolio::config::{self, DisplayConfig};
use aave_portfolio::core::poller::{AppContext, PollerHandle, PortfolioState};
use aave_portfolio::core::view::{FormattedPortfolio, ViewState};
use aave_portfolio::execution::aave_client::AaveApiClient;
use aave_portfolio::logging;
use aave_portfolio::types::AccountContext;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignore if missing).
    let _ = dotenvy::dotenv();

    let config_dir = std::env::var("PORTFOLIO_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config"));

    let config = config::load_config(&config_dir)?;

    // Hold the guard for the process lifetime.
    let _guard = logging::init_tracing(&config.app.logging)?;

    info!(
        markets = config.markets.chains.len(),
        interval_ms = config.polling.interval_ms,
        graphql_url = %config.markets.graphql_url,
        "portfolio watcher starting"
    );

    let account = account_from_env()?;
    match &account {
        Some(account) => info!(account = %account, "watching account from environment"),
        None => warn!("PORTFOLIO_ACCOUNT not set, nothing to watch"),
    }

    let client = AaveApiClient::new(&config.markets).context("failed to build Aave API client")?;
    if let Some(account) = &account {
        let market = client
            .market(account.chain_id)
            .with_context(|| format!("no Aave market configured for {account}"))?;
        info!(market = %market.name, pool = %market.pool, "market resolved");
    }
    let display = config.app.display.clone();
    let ctx = AppContext::new(config, client).context("invalid savings configuration")?;
    info!(
        sgho_apy = %ctx.savings_apy.apy,
        contract = %ctx.config.savings.sgho_contract,
        provenance = %ctx.savings_apy.label(),
        "sGHO APY loaded"
    );

    let shutdown = CancellationToken::new();
    let (_identity_tx, identity_rx) = watch::channel(account);
    let poller = PollerHandle::spawn(ctx, identity_rx, &shutdown);
    let mut state_rx = poller.subscribe();

    info!("poller running, press Ctrl+C to stop");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl+C")?;
                info!("shutdown signal received, stopping");
                break;
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    error!("poller stopped unexpectedly");
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                report(&state, &display);
            }
        }
    }

    shutdown.cancel();
    poller.shutdown().await;
    info!("shutdown complete");
    Ok(())
}

/// Read `PORTFOLIO_ACCOUNT` and `PORTFOLIO_CHAIN_ID` (default 1).
fn account_from_env() -> Result<Option<AccountContext>> {
    let Some(raw) = std::env::var("PORTFOLIO_ACCOUNT")
        .ok()
        .filter(|v| !v.trim().is_empty())
    else {
        return Ok(None);
    };
    let address: Address = raw
        .trim()
        .parse()
        .context("failed to parse PORTFOLIO_ACCOUNT")?;

    let chain_id = match std::env::var("PORTFOLIO_CHAIN_ID")
        .ok()
        .filter(|v| !v.trim().is_empty())
    {
        Some(v) => v
            .trim()
            .parse::<u64>()
            .context("failed to parse PORTFOLIO_CHAIN_ID")?,
        None => 1,
    };

    Ok(Some(AccountContext::new(address.to_string(), chain_id)))
}

fn report(state: &PortfolioState, display: &DisplayConfig) {
    match state.view() {
        ViewState::Positions(snapshot) => {
            let view = FormattedPortfolio::from_snapshot(snapshot, display);
            info!(
                account = %snapshot.account,
                supplies = view.supplies.len(),
                borrows = view.borrows.len(),
                total_supply = %view.total_supply_usd,
                total_borrow = %view.total_borrow_usd,
                net_worth = %view.net_worth_usd,
                health_factor = %view.health_factor,
                health = view.health_label,
                net_apy = %view.net_apy,
                stale_error = state.error.is_some(),
                "portfolio"
            );
            for p in view.supplies.iter().chain(&view.borrows) {
                info!(symbol = %p.symbol, balance = %p.balance, usd = %p.balance_usd, apy = %p.apy, "position");
            }
            report_gho(&view);
        }
        ViewState::Empty(snapshot) => {
            info!(account = %snapshot.account, "no active Aave positions");
            report_gho(&FormattedPortfolio::from_snapshot(snapshot, display));
        }
        ViewState::Error(e) => warn!(error = %e, "portfolio unavailable"),
        ViewState::Loading | ViewState::ConnectWallet => {}
    }
}

fn report_gho(view: &FormattedPortfolio) {
    if let Some(gho) = &view.gho {
        info!(
            supply = %gho.supply_balance,
            borrow = %gho.borrow_balance,
            savings = %gho.savings_balance,
            savings_usd = %gho.savings_usd,
            savings_apy = %gho.savings_apy,
            stale = gho.savings_apy_stale,
            "GHO"
        );
    }
}
