//! Upstream response shapes and the adapter that flattens them.
//!
//! Two shapes are in circulation: the subgraph's per-reserve list
//! (`{"user": {"reserves": [...]}}`) and the typed market API's
//! supplies/borrows/market-state triple. Both are projected onto
//! [`RawPositionRecord`] through the [`RawPortfolio`] trait so the normalizer
//! has a single input type.

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::constants::DEFAULT_TOKEN_DECIMALS;
use crate::core::format::parse_decimal;
use crate::errors::PortfolioError;
use crate::types::wad_ray::parse_units;

// ---------------------------------------------------------------------------
// Flattened record
// ---------------------------------------------------------------------------

/// One upstream position record before normalization.
///
/// Every numeric field stays a string until the normalizer parses it, so a
/// single malformed field cannot fail deserialization of the whole response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPositionRecord {
    pub underlying_asset: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u32,
    /// Unscaled integer balance.
    pub raw_balance: Option<String>,
    /// RAY-encoded annual rate.
    pub raw_rate: Option<String>,
    /// Annual percentage already converted upstream, e.g. `"3.17"`.
    pub formatted_apy: Option<String>,
    pub price_usd: Option<String>,
    pub value_usd: Option<String>,
}

/// Account-level figures reported by upstream, all in USD.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpstreamAccountState {
    /// `None` when upstream reports no health factor (no debt).
    pub health_factor: Option<Decimal>,
    pub available_borrows_usd: Option<Decimal>,
    pub total_collateral_usd: Option<Decimal>,
    pub total_debt_usd: Option<Decimal>,
    pub net_worth_usd: Option<Decimal>,
    /// Percent.
    pub net_apy: Option<Decimal>,
}

/// Common view over both upstream shapes.
pub trait RawPortfolio {
    fn supply_records(&self) -> Vec<RawPositionRecord>;

    fn borrow_records(&self) -> Vec<RawPositionRecord>;

    /// Upstream-computed account figures, when the shape carries them.
    fn account_state(&self) -> Option<UpstreamAccountState> {
        None
    }

    /// sGHO holdings, when the shape carries them.
    fn savings_balance(&self) -> Option<&SavingsBalance> {
        None
    }
}

// ---------------------------------------------------------------------------
// Response-shape discriminator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum RawPortfolioResponse {
    Subgraph(SubgraphResponse),
    MarketApi(MarketApiResponse),
}

impl RawPortfolioResponse {
    /// Select the shape from the GraphQL `data` object.
    ///
    /// A `user` key selects the subgraph shape; any of `userSupplies`,
    /// `userBorrows` or `userMarketState` selects the typed API shape.
    pub fn from_json(data: Value) -> Result<Self, PortfolioError> {
        let obj = data.as_object().ok_or_else(|| PortfolioError::MalformedResponse {
            reason: "response data is not an object".into(),
        })?;

        if obj.contains_key("user") {
            return Ok(Self::Subgraph(serde_json::from_value(data)?));
        }
        if ["userSupplies", "userBorrows", "userMarketState"]
            .iter()
            .any(|k| obj.contains_key(*k))
        {
            return Ok(Self::MarketApi(serde_json::from_value(data)?));
        }

        Err(PortfolioError::MalformedResponse {
            reason: format!(
                "unrecognised response shape (keys: {})",
                obj.keys().cloned().collect::<Vec<_>>().join(", ")
            ),
        })
    }

    pub fn shape(&self) -> &'static str {
        match self {
            Self::Subgraph(_) => "subgraph",
            Self::MarketApi(_) => "market_api",
        }
    }
}

impl RawPortfolio for RawPortfolioResponse {
    fn supply_records(&self) -> Vec<RawPositionRecord> {
        match self {
            Self::Subgraph(r) => r.supply_records(),
            Self::MarketApi(r) => r.supply_records(),
        }
    }

    fn borrow_records(&self) -> Vec<RawPositionRecord> {
        match self {
            Self::Subgraph(r) => r.borrow_records(),
            Self::MarketApi(r) => r.borrow_records(),
        }
    }

    fn account_state(&self) -> Option<UpstreamAccountState> {
        match self {
            Self::Subgraph(r) => r.account_state(),
            Self::MarketApi(r) => r.account_state(),
        }
    }

    fn savings_balance(&self) -> Option<&SavingsBalance> {
        match self {
            Self::Subgraph(r) => r.savings_balance(),
            Self::MarketApi(r) => r.savings_balance(),
        }
    }
}

// ---------------------------------------------------------------------------
// Subgraph shape
// ---------------------------------------------------------------------------

/// `user` is null for an address that never touched the market.
#[derive(Debug, Clone, Deserialize)]
pub struct SubgraphResponse {
    pub user: Option<SubgraphUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubgraphUser {
    pub id: String,
    #[serde(default)]
    pub reserves: Vec<SubgraphUserReserve>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubgraphUserReserve {
    pub reserve: SubgraphReserve,
    #[serde(rename = "currentATokenBalance", default, deserialize_with = "lenient::opt_string")]
    pub current_a_token_balance: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub current_variable_debt: Option<String>,
    /// User-level rate snapshot; falls back to the reserve rate when absent.
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub liquidity_rate: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub variable_borrow_rate: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubgraphReserve {
    pub symbol: String,
    pub name: String,
    #[serde(default = "default_token_decimals", deserialize_with = "lenient::u32_value")]
    pub decimals: u32,
    pub underlying_asset: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub liquidity_rate: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub variable_borrow_rate: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub price_in_usd: Option<String>,
}

impl SubgraphResponse {
    fn records(
        &self,
        balance: impl Fn(&SubgraphUserReserve) -> Option<String>,
        rate: impl Fn(&SubgraphUserReserve) -> Option<String>,
    ) -> Vec<RawPositionRecord> {
        let Some(user) = &self.user else {
            return Vec::new();
        };
        user.reserves
            .iter()
            .map(|ur| RawPositionRecord {
                underlying_asset: ur.reserve.underlying_asset.clone(),
                symbol: ur.reserve.symbol.clone(),
                name: ur.reserve.name.clone(),
                decimals: ur.reserve.decimals,
                raw_balance: balance(ur),
                raw_rate: rate(ur),
                formatted_apy: None,
                price_usd: ur.reserve.price_in_usd.clone(),
                value_usd: None,
            })
            .collect()
    }
}

impl RawPortfolio for SubgraphResponse {
    fn supply_records(&self) -> Vec<RawPositionRecord> {
        self.records(
            |ur| ur.current_a_token_balance.clone(),
            |ur| {
                ur.liquidity_rate
                    .clone()
                    .or_else(|| ur.reserve.liquidity_rate.clone())
            },
        )
    }

    fn borrow_records(&self) -> Vec<RawPositionRecord> {
        self.records(
            |ur| ur.current_variable_debt.clone(),
            |ur| {
                ur.variable_borrow_rate
                    .clone()
                    .or_else(|| ur.reserve.variable_borrow_rate.clone())
            },
        )
    }
}

// ---------------------------------------------------------------------------
// Typed market API shape
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketApiResponse {
    #[serde(default, deserialize_with = "lenient::vec_or_null")]
    pub user_supplies: Vec<ApiUserSupply>,
    #[serde(default, deserialize_with = "lenient::vec_or_null")]
    pub user_borrows: Vec<ApiUserBorrow>,
    #[serde(default)]
    pub user_market_state: Option<ApiUserMarketState>,
    #[serde(default)]
    pub savings_gho_balance: Option<SavingsBalance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiCurrency {
    pub symbol: String,
    pub name: String,
    pub address: String,
    #[serde(default = "default_token_decimals", deserialize_with = "lenient::u32_value")]
    pub decimals: u32,
}

/// `{ raw, value, decimals }` token amount. `raw` is unscaled, `value` human.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiDecimalValue {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub raw: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub value: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    pub decimals: Option<u32>,
}

impl ApiDecimalValue {
    /// Unscaled integer balance, reconstructed from `value` when `raw` is
    /// not reported.
    pub fn raw_units(&self, fallback_decimals: u32) -> Option<String> {
        if let Some(raw) = &self.raw {
            return Some(raw.clone());
        }
        let decimals = self.decimals.unwrap_or(fallback_decimals);
        self.value
            .as_deref()
            .and_then(|v| parse_units(v, decimals))
            .map(|u| u.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiTokenAmount {
    pub amount: ApiDecimalValue,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub usd: Option<String>,
}

/// `{ raw, decimals, value, formatted }` percentage. `value` is a fraction
/// (`0.0317`), `formatted` is already a percent (`"3.17"`).
#[derive(Debug, Clone, Deserialize)]
pub struct ApiPercentValue {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub raw: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    pub decimals: Option<u32>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub value: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub formatted: Option<String>,
}

impl ApiPercentValue {
    /// Percentage string, preferring `formatted` over `value * 100`.
    pub fn percent(&self) -> Option<String> {
        if let Some(f) = &self.formatted {
            let trimmed = f.trim().trim_end_matches('%').trim();
            if parse_decimal(trimmed).is_some() {
                return Some(trimmed.to_string());
            }
        }
        self.value
            .as_deref()
            .and_then(parse_decimal)
            .and_then(|v| v.checked_mul(Decimal::ONE_HUNDRED))
            .map(|v| v.normalize().to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiUserSupply {
    pub currency: ApiCurrency,
    pub balance: ApiTokenAmount,
    #[serde(default)]
    pub apy: Option<ApiPercentValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiUserBorrow {
    pub currency: ApiCurrency,
    pub debt: ApiTokenAmount,
    #[serde(default)]
    pub apy: Option<ApiPercentValue>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiUserMarketState {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub net_worth: Option<String>,
    #[serde(rename = "netAPY", default)]
    pub net_apy: Option<ApiPercentValue>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub health_factor: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub total_collateral_base: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub total_debt_base: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub available_borrows_base: Option<String>,
}

/// sGHO holdings from the `savingsGhoBalance` query.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsBalance {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub usd_per_token: Option<String>,
    pub amount: ApiDecimalValue,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub usd: Option<String>,
}

impl SavingsBalance {
    /// Human-unit balance, `0` when unparseable.
    pub fn balance(&self) -> Decimal {
        self.amount
            .value
            .as_deref()
            .and_then(parse_decimal)
            .unwrap_or_default()
    }

    /// USD value, derived from `usd_per_token` when `usd` is missing.
    pub fn balance_usd(&self) -> Decimal {
        self.usd
            .as_deref()
            .and_then(parse_decimal)
            .or_else(|| {
                self.usd_per_token
                    .as_deref()
                    .and_then(parse_decimal)
                    .and_then(|p| p.checked_mul(self.balance()))
            })
            .unwrap_or_default()
    }
}

fn default_token_decimals() -> u32 {
    DEFAULT_TOKEN_DECIMALS
}

fn api_record(
    currency: &ApiCurrency,
    amount: &ApiTokenAmount,
    apy: Option<&ApiPercentValue>,
) -> RawPositionRecord {
    RawPositionRecord {
        underlying_asset: currency.address.clone(),
        symbol: currency.symbol.clone(),
        name: currency.name.clone(),
        decimals: currency.decimals,
        raw_balance: amount.amount.raw_units(currency.decimals),
        raw_rate: None,
        formatted_apy: apy.and_then(ApiPercentValue::percent),
        price_usd: None,
        value_usd: amount.usd.clone(),
    }
}

impl RawPortfolio for MarketApiResponse {
    fn supply_records(&self) -> Vec<RawPositionRecord> {
        self.user_supplies
            .iter()
            .map(|s| api_record(&s.currency, &s.balance, s.apy.as_ref()))
            .collect()
    }

    fn borrow_records(&self) -> Vec<RawPositionRecord> {
        self.user_borrows
            .iter()
            .map(|b| api_record(&b.currency, &b.debt, b.apy.as_ref()))
            .collect()
    }

    fn account_state(&self) -> Option<UpstreamAccountState> {
        let state = self.user_market_state.as_ref()?;
        let num = |v: &Option<String>| v.as_deref().and_then(parse_decimal);
        Some(UpstreamAccountState {
            health_factor: num(&state.health_factor),
            available_borrows_usd: num(&state.available_borrows_base),
            total_collateral_usd: num(&state.total_collateral_base),
            total_debt_usd: num(&state.total_debt_base),
            net_worth_usd: num(&state.net_worth),
            net_apy: state
                .net_apy
                .as_ref()
                .and_then(ApiPercentValue::percent)
                .as_deref()
                .and_then(parse_decimal),
        })
    }

    fn savings_balance(&self) -> Option<&SavingsBalance> {
        self.savings_gho_balance.as_ref()
    }
}

/// Accept JSON strings or numbers where upstream is inconsistent.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    pub fn opt_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    pub fn u32_value<'de, D>(deserializer: D) -> Result<u32, D::Error>
    where
        D: Deserializer<'de>,
    {
        opt_u32(deserializer)?.ok_or_else(|| serde::de::Error::custom("expected u32 decimals"))
    }

    pub fn vec_or_null<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
    }
}
