pub mod types;
pub mod validate;

pub use types::*;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Load and merge all config JSON files into a single [`PortfolioConfig`],
/// then apply environment variable overrides and validate.
///
/// Expected directory layout:
/// ```text
/// config/
///   app.json
///   markets.json
///   savings.json
///   polling.json       (optional)
///   aggregation.json   (optional)
/// ```
///
/// # Environment variable overrides
///
/// | Env Var                       | Config Field                   |
/// |-------------------------------|--------------------------------|
/// | `PORTFOLIO_POLL_INTERVAL_MS`  | `polling.interval_ms`          |
/// | `AAVE_GRAPHQL_URL`            | `markets.graphql_url`          |
/// | `SGHO_APY`                    | `savings.sgho_apy`             |
/// | `SGHO_APY_LAST_UPDATED`       | `savings.last_updated`         |
/// | `PORTFOLIO_FALLBACK_LTV`      | `aggregation.fallback_ltv`     |
pub fn load_config(config_dir: &Path) -> Result<PortfolioConfig> {
    let read = |name: &str| -> Result<String> {
        let path = config_dir.join(name);
        std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {}", path.display()))
    };

    let app: AppConfig = serde_json::from_str(&read("app.json")?).context("parsing app.json")?;

    let markets: MarketsConfig =
        serde_json::from_str(&read("markets.json")?).context("parsing markets.json")?;

    let savings: SavingsConfig =
        serde_json::from_str(&read("savings.json")?).context("parsing savings.json")?;

    let polling: PollingConfig = match read("polling.json") {
        Ok(contents) => serde_json::from_str(&contents).context("parsing polling.json")?,
        Err(_) => PollingConfig::default(),
    };

    let aggregation: AggregationConfig = match read("aggregation.json") {
        Ok(contents) => serde_json::from_str(&contents).context("parsing aggregation.json")?,
        Err(_) => AggregationConfig::default(),
    };

    let mut config = PortfolioConfig {
        app,
        markets,
        polling,
        aggregation,
        savings,
    };

    apply_env_overrides(&mut config);
    validate::validate_config(&config)?;

    Ok(config)
}

// ---------------------------------------------------------------------------
// Environment variable overrides
// ---------------------------------------------------------------------------

/// Only non-empty env vars take effect. Parse failures are skipped and the
/// JSON value remains.
fn apply_env_overrides(config: &mut PortfolioConfig) {
    if let Some(val) = env_parse::<u64>("PORTFOLIO_POLL_INTERVAL_MS") {
        info!(val, "env override: PORTFOLIO_POLL_INTERVAL_MS");
        config.polling.interval_ms = val;
    }

    if let Some(val) = env_string("AAVE_GRAPHQL_URL") {
        info!("env override: AAVE_GRAPHQL_URL");
        config.markets.graphql_url = val;
    }

    if let Some(val) = env_decimal("PORTFOLIO_FALLBACK_LTV") {
        info!(%val, "env override: PORTFOLIO_FALLBACK_LTV");
        config.aggregation.fallback_ltv = val;
    }

    // -- Savings -------------------------------------------------------------
    if let Some(val) = env_decimal("SGHO_APY") {
        info!(%val, "env override: SGHO_APY");
        config.savings.sgho_apy = Some(val.to_string());
    }

    if let Some(val) = env_parse::<NaiveDate>("SGHO_APY_LAST_UPDATED") {
        info!(%val, "env override: SGHO_APY_LAST_UPDATED");
        config.savings.last_updated = val;
    }
}

/// Read a non-empty env var as a `String`.
fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Read a non-empty env var and parse it as `T`.
fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}

fn env_decimal(key: &str) -> Option<Decimal> {
    env_string(key).and_then(|v| Decimal::from_str(&v).ok())
}
