use anyhow::{bail, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;

use tracing_subscriber::EnvFilter;

use super::types::{ConsoleFormat, PortfolioConfig};

/// Validate invariants across the merged config that serde alone cannot enforce.
///
/// Called automatically by [`super::load_config`]. A misconfigured deployment
/// fails here rather than silently defaulting.
pub fn validate_config(config: &PortfolioConfig) -> Result<()> {
    let mut errors: Vec<String> = Vec::new();

    validate_logging_config(config, &mut errors);
    validate_markets_config(config, &mut errors);
    validate_polling_config(config, &mut errors);
    validate_aggregation_config(config, &mut errors);
    validate_savings_config(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        let msg = format!(
            "Configuration validation failed ({} error{}):\n  - {}",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" },
            errors.join("\n  - ")
        );
        bail!("{msg}");
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

fn validate_logging_config(config: &PortfolioConfig, errors: &mut Vec<String>) {
    let logging = &config.app.logging;

    match logging.log_dir.as_deref() {
        Some("") => errors.push("app.logging: log_dir is empty when set".into()),
        Some(_) if logging.file_name.is_empty() => {
            errors.push("app.logging: file_name is empty".into());
        }
        None if logging.console_format == ConsoleFormat::Off => {
            errors.push("app.logging: console output is off and no log_dir is set".into());
        }
        _ => {}
    }

    if let Err(e) = EnvFilter::try_new(&logging.default_filter) {
        errors.push(format!(
            "app.logging: default_filter '{}' is invalid: {e}",
            logging.default_filter
        ));
    }
}

// ---------------------------------------------------------------------------
// Markets
// ---------------------------------------------------------------------------

fn validate_markets_config(config: &PortfolioConfig, errors: &mut Vec<String>) {
    let markets = &config.markets;

    if markets.graphql_url.is_empty() {
        errors.push("markets: graphql_url is empty".into());
    }

    if markets.request_timeout_seconds == 0 {
        errors.push("markets: request_timeout_seconds must be > 0".into());
    }

    if markets.chains.is_empty() {
        errors.push("markets.chains: must have at least one market".into());
    }

    for (chain, market) in &markets.chains {
        if chain.parse::<u64>().is_err() {
            errors.push(format!("markets.chains.{chain}: key must be a numeric chain id"));
        }
        if let Err(e) = validate_address(&market.pool) {
            errors.push(format!("markets.chains.{chain}.pool: {e}"));
        }
        if let Some(url) = &market.subgraph_url {
            if url.is_empty() {
                errors.push(format!("markets.chains.{chain}.subgraph_url: empty when set"));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Polling
// ---------------------------------------------------------------------------

fn validate_polling_config(config: &PortfolioConfig, errors: &mut Vec<String>) {
    if config.polling.interval_ms < 1_000 {
        errors.push(format!(
            "polling: interval_ms ({}) must be >= 1000",
            config.polling.interval_ms
        ));
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

fn validate_aggregation_config(config: &PortfolioConfig, errors: &mut Vec<String>) {
    let ltv = config.aggregation.fallback_ltv;
    if ltv <= Decimal::ZERO || ltv > dec!(1) {
        errors.push(format!("aggregation: fallback_ltv ({ltv}) must be in (0, 1]"));
    }
}

// ---------------------------------------------------------------------------
// Savings
// ---------------------------------------------------------------------------

fn validate_savings_config(config: &PortfolioConfig, errors: &mut Vec<String>) {
    let savings = &config.savings;

    match savings.sgho_apy.as_deref() {
        None | Some("") => errors.push("savings: sgho_apy is required".into()),
        Some(raw) => match Decimal::from_str(raw) {
            Ok(apy) if apy < Decimal::ZERO => {
                errors.push(format!("savings: sgho_apy ({apy}) must be >= 0"));
            }
            Ok(_) => {}
            Err(_) => errors.push(format!("savings: sgho_apy '{raw}' is not a decimal")),
        },
    }

    if savings.stale_after_days <= 0 {
        errors.push("savings: stale_after_days must be > 0".into());
    }

    if let Err(e) = validate_address(&savings.sgho_contract) {
        errors.push(format!("savings.sgho_contract: {e}"));
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Validate an Ethereum-style address string: must be 0x-prefixed and 42 chars
/// of hex.
fn validate_address(addr: &str) -> Result<(), String> {
    if addr.is_empty() {
        return Err("address is empty".into());
    }
    if !addr.starts_with("0x") && !addr.starts_with("0X") {
        return Err(format!("address '{addr}' must start with 0x"));
    }
    if addr.len() != 42 {
        return Err(format!(
            "address '{addr}' has length {} (expected 42)",
            addr.len()
        ));
    }
    if !addr[2..].chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("address '{addr}' contains non-hex characters"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{
        AggregationConfig, AppConfig, DisplayConfig, LoggingConfig, MarketConfig, MarketsConfig,
        PollingConfig, SavingsConfig,
    };
    use chrono::NaiveDate;
    use std::collections::HashMap;

    fn valid_config() -> PortfolioConfig {
        let mut chains = HashMap::new();
        chains.insert(
            "1".to_string(),
            MarketConfig {
                name: "AaveV3Ethereum".into(),
                pool: "0x87870Bca3F3fD6335C3F4ce8392D69350B4fA4E2".into(),
                subgraph_url: None,
            },
        );
        PortfolioConfig {
            app: AppConfig {
                logging: LoggingConfig {
                    log_dir: Some("logs".into()),
                    file_name: "portfolio.log".into(),
                    default_filter: "info".into(),
                    console_format: ConsoleFormat::Compact,
                },
                display: DisplayConfig::default(),
            },
            markets: MarketsConfig {
                graphql_url: "https://api.v3.aave.com/graphql".into(),
                request_timeout_seconds: 10,
                chains,
            },
            polling: PollingConfig::default(),
            aggregation: AggregationConfig::default(),
            savings: SavingsConfig {
                sgho_apy: Some("5.85".into()),
                last_updated: NaiveDate::from_ymd_opt(2025, 10, 31).unwrap(),
                source: "https://app.aave.com/".into(),
                stale_after_days: 7,
                sgho_contract: "0x1a88Df1cFe15Af22B3c4c783D4e6F7F9e0C1885d".into(),
            },
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_sgho_apy_is_fatal() {
        let mut config = valid_config();
        config.savings.sgho_apy = None;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("sgho_apy is required"), "got: {err}");
    }

    #[test]
    fn test_non_decimal_sgho_apy_rejected() {
        let mut config = valid_config();
        config.savings.sgho_apy = Some("about six".into());
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("not a decimal"), "got: {err}");
    }

    #[test]
    fn test_empty_markets_rejected() {
        let mut config = valid_config();
        config.markets.chains.clear();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("at least one market"), "got: {err}");
    }

    #[test]
    fn test_fallback_ltv_bounds() {
        let mut config = valid_config();
        config.aggregation.fallback_ltv = dec!(1.2);
        assert!(validate_config(&config).is_err());
        config.aggregation.fallback_ltv = Decimal::ZERO;
        assert!(validate_config(&config).is_err());
        config.aggregation.fallback_ltv = dec!(0.75);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_polling_interval_floor() {
        let mut config = valid_config();
        config.polling.interval_ms = 250;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("interval_ms"), "got: {err}");
    }

    #[test]
    fn test_errors_are_collected() {
        let mut config = valid_config();
        config.polling.interval_ms = 0;
        config.savings.sgho_apy = None;
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("2 errors"), "got: {err}");
    }

    #[test]
    fn test_logging_needs_some_output() {
        let mut config = valid_config();
        config.app.logging.log_dir = None;
        config.app.logging.console_format = ConsoleFormat::Off;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("no log_dir"), "got: {err}");

        config.app.logging.console_format = ConsoleFormat::Json;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_log_filter_rejected() {
        let mut config = valid_config();
        config.app.logging.default_filter = "aave_portfolio=loud".into();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("default_filter"), "got: {err}");
    }

    #[test]
    fn test_validate_address_valid() {
        assert!(validate_address("0x87870Bca3F3fD6335C3F4ce8392D69350B4fA4E2").is_ok());
    }

    #[test]
    fn test_validate_address_no_prefix() {
        let err = validate_address("87870Bca3F3fD6335C3F4ce8392D69350B4fA4E2").unwrap_err();
        assert!(err.contains("must start with 0x"));
    }

    #[test]
    fn test_validate_address_wrong_length() {
        let err = validate_address("0x87870Bca3F3fD6335C3F").unwrap_err();
        assert!(err.contains("length"));
    }
}
