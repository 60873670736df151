use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;

use crate::constants::{
    AAVE_GRAPHQL_API, DEFAULT_APY_STALE_AFTER_DAYS, DEFAULT_FALLBACK_LTV, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_REQUEST_TIMEOUT_SECONDS, SGHO_CONTRACT_ADDRESS,
};

// ---------------------------------------------------------------------------
// Top-level aggregate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct PortfolioConfig {
    pub app: AppConfig,
    pub markets: MarketsConfig,
    pub polling: PollingConfig,
    pub aggregation: AggregationConfig,
    pub savings: SavingsConfig,
}

// ---------------------------------------------------------------------------
// app.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Daily-rolled JSON log files go here. No file output when unset.
    #[serde(default)]
    pub log_dir: Option<String>,
    #[serde(default = "default_log_file_name")]
    pub file_name: String,
    /// Used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub default_filter: String,
    #[serde(default)]
    pub console_format: ConsoleFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleFormat {
    #[default]
    Compact,
    Json,
    Off,
}

fn default_log_file_name() -> String {
    "portfolio.log".into()
}

fn default_log_filter() -> String {
    "aave_portfolio=info,warn".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    pub currency_decimals: u32,
    pub balance_max_decimals: u32,
    pub compact_totals: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            currency_decimals: 2,
            balance_max_decimals: 4,
            compact_totals: false,
        }
    }
}

// ---------------------------------------------------------------------------
// markets.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct MarketsConfig {
    #[serde(default = "default_graphql_url")]
    pub graphql_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Keyed by chain id (JSON object keys are strings).
    pub chains: HashMap<String, MarketConfig>,
}

fn default_graphql_url() -> String {
    AAVE_GRAPHQL_API.into()
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECONDS
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    pub name: String,
    pub pool: String,
    /// When set, positions are read from this subgraph instead of the typed API.
    #[serde(default)]
    pub subgraph_url: Option<String>,
}

impl MarketsConfig {
    /// Market for `chain_id`, if one is configured.
    pub fn market(&self, chain_id: u64) -> Option<&MarketConfig> {
        self.chains.get(&chain_id.to_string())
    }
}

// ---------------------------------------------------------------------------
// polling.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

// ---------------------------------------------------------------------------
// aggregation.json
// ---------------------------------------------------------------------------

/// Fallback parameters for values the upstream did not supply.
#[derive(Debug, Clone, Deserialize)]
pub struct AggregationConfig {
    /// Flat LTV for the available-borrows approximation.
    #[serde(with = "rust_decimal::serde::str", default = "default_fallback_ltv")]
    pub fallback_ltv: Decimal,
    /// Prefer the upstream health factor over the local collateral/debt ratio.
    #[serde(default = "default_true")]
    pub use_upstream_health_factor: bool,
}

fn default_fallback_ltv() -> Decimal {
    DEFAULT_FALLBACK_LTV
}

fn default_true() -> bool {
    true
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            fallback_ltv: DEFAULT_FALLBACK_LTV,
            use_upstream_health_factor: true,
        }
    }
}

// ---------------------------------------------------------------------------
// savings.json
// ---------------------------------------------------------------------------

/// Manually maintained sGHO APY. The upstream API does not expose it.
#[derive(Debug, Clone, Deserialize)]
pub struct SavingsConfig {
    /// Percentage string, e.g. `"5.85"`. Required.
    pub sgho_apy: Option<String>,
    pub last_updated: NaiveDate,
    pub source: String,
    #[serde(default = "default_stale_days")]
    pub stale_after_days: i64,
    #[serde(default = "default_sgho_contract")]
    pub sgho_contract: String,
}

fn default_stale_days() -> i64 {
    DEFAULT_APY_STALE_AFTER_DAYS
}

fn default_sgho_contract() -> String {
    SGHO_CONTRACT_ADDRESS.into()
}
