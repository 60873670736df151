//! Aave GraphQL client.
//!
//! Two upstream shapes are supported per market:
//! - the typed Aave API (`userSupplies`, `userBorrows`, `userMarketState`,
//!   `savingsGhoBalance`), queried in parallel and merged into one data object;
//! - a subgraph `user(id)` query, used when the market sets `subgraph_url`.
//!
//! Either way the caller gets a [`RawPortfolioResponse`]; shape detection
//! happens there, not here.

use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::{MarketConfig, MarketsConfig};
use crate::core::poller::PortfolioFetcher;
use crate::errors::PortfolioError;
use crate::types::{AccountContext, RawPortfolioResponse};

const USER_SUPPLIES_QUERY: &str = r#"
query GetUserSupplies($marketAddress: EvmAddress!, $chainId: ChainId!, $userAddress: EvmAddress!) {
  userSupplies(request: { markets: [{ address: $marketAddress, chainId: $chainId }], user: $userAddress }) {
    currency { symbol name address decimals }
    balance { amount { raw value decimals } usd }
    apy { raw decimals value formatted }
  }
}"#;

const USER_BORROWS_QUERY: &str = r#"
query GetUserBorrows($marketAddress: EvmAddress!, $chainId: ChainId!, $userAddress: EvmAddress!) {
  userBorrows(request: { markets: [{ address: $marketAddress, chainId: $chainId }], user: $userAddress }) {
    currency { symbol name address decimals }
    debt { amount { raw value decimals } usd }
    apy { raw decimals value formatted }
  }
}"#;

const USER_MARKET_STATE_QUERY: &str = r#"
query GetUserMarketState($marketAddress: EvmAddress!, $chainId: ChainId!, $userAddress: EvmAddress!) {
  userMarketState(request: { market: $marketAddress, chainId: $chainId, user: $userAddress }) {
    netWorth
    netAPY { raw decimals value formatted }
    healthFactor
    totalCollateralBase
    totalDebtBase
    availableBorrowsBase
  }
}"#;

const SAVINGS_GHO_BALANCE_QUERY: &str = r#"
query GetSavingsGhoBalance($userAddress: EvmAddress!) {
  savingsGhoBalance(request: { user: $userAddress }) {
    usdPerToken
    amount { raw value decimals }
    usd
  }
}"#;

const SUBGRAPH_USER_QUERY: &str = r#"
query GetUserAccount($userAddress: String!) {
  user(id: $userAddress) {
    id
    reserves {
      currentATokenBalance
      currentVariableDebt
      reserve {
        symbol
        name
        decimals
        underlyingAsset
        liquidityRate
        variableBorrowRate
        priceInUsd
      }
    }
  }
}"#;

/// Read-only client for Aave position data.
pub struct AaveApiClient {
    http: Client,
    graphql_url: String,
    markets: MarketsConfig,
}

impl AaveApiClient {
    pub fn new(markets: &MarketsConfig) -> Result<Self, PortfolioError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(markets.request_timeout_seconds))
            .build()?;
        Ok(Self {
            http,
            graphql_url: markets.graphql_url.clone(),
            markets: markets.clone(),
        })
    }

    /// Market configured for `chain_id`.
    pub fn market(&self, chain_id: u64) -> Result<&MarketConfig, PortfolioError> {
        self.markets
            .market(chain_id)
            .ok_or(PortfolioError::UnsupportedChain { chain_id })
    }

    /// Fetch everything needed to build one snapshot for `account`.
    pub async fn fetch_portfolio(
        &self,
        account: &AccountContext,
    ) -> Result<RawPortfolioResponse, PortfolioError> {
        let market = self.market(account.chain_id)?;

        let data = match &market.subgraph_url {
            Some(url) => self.fetch_subgraph(url, account).await?,
            None => self.fetch_market_api(market, account).await?,
        };
        let response = RawPortfolioResponse::from_json(data)?;
        debug!(account = %account, shape = response.shape(), "upstream response received");
        Ok(response)
    }

    async fn fetch_market_api(
        &self,
        market: &MarketConfig,
        account: &AccountContext,
    ) -> Result<Value, PortfolioError> {
        let variables = json!({
            "marketAddress": market.pool,
            "chainId": account.chain_id,
            "userAddress": account.account,
        });
        let url = self.graphql_url.as_str();

        let (supplies, borrows, state, savings) = tokio::try_join!(
            self.query(url, "userSupplies", USER_SUPPLIES_QUERY, &variables),
            self.query(url, "userBorrows", USER_BORROWS_QUERY, &variables),
            self.query(url, "userMarketState", USER_MARKET_STATE_QUERY, &variables),
            self.savings_balance(account),
        )?;

        Ok(merge_market_api_data([supplies, borrows, state], savings))
    }

    /// sGHO is optional: a failure here never fails the snapshot.
    async fn savings_balance(
        &self,
        account: &AccountContext,
    ) -> Result<Option<Value>, PortfolioError> {
        let variables = json!({ "userAddress": account.account });
        match self
            .query(
                &self.graphql_url,
                "savingsGhoBalance",
                SAVINGS_GHO_BALANCE_QUERY,
                &variables,
            )
            .await
        {
            Ok(data) => Ok(Some(data)),
            Err(e) => {
                warn!(account = %account, error = %e, "sGHO balance unavailable");
                Ok(None)
            }
        }
    }

    async fn fetch_subgraph(
        &self,
        url: &str,
        account: &AccountContext,
    ) -> Result<Value, PortfolioError> {
        // Subgraph ids are lower-case.
        let variables = json!({ "userAddress": account.account.to_ascii_lowercase() });
        self.query(url, "user", SUBGRAPH_USER_QUERY, &variables).await
    }

    async fn query(
        &self,
        url: &str,
        operation: &str,
        query: &str,
        variables: &Value,
    ) -> Result<Value, PortfolioError> {
        let resp = self
            .http
            .post(url)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| PortfolioError::Transport {
                reason: format!("{operation}: {e}"),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PortfolioError::UpstreamStatus {
                endpoint: operation.to_string(),
                status: status.as_u16(),
            });
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| PortfolioError::MalformedResponse {
                reason: format!("{operation}: {e}"),
            })?;
        extract_data(operation, body)
    }
}

impl PortfolioFetcher for AaveApiClient {
    async fn fetch(&self, account: &AccountContext) -> Result<RawPortfolioResponse, PortfolioError> {
        self.fetch_portfolio(account).await
    }
}

/// Unwrap a GraphQL envelope. The first reported error wins over any
/// partial data.
fn extract_data(operation: &str, mut body: Value) -> Result<Value, PortfolioError> {
    if let Some(first) = body
        .get("errors")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first())
    {
        let message = first
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(PortfolioError::GraphQl {
            message: format!("{operation}: {message}"),
        });
    }

    match body.get_mut("data").map(Value::take) {
        Some(data @ Value::Object(_)) => Ok(data),
        _ => Err(PortfolioError::MalformedResponse {
            reason: format!("{operation}: response has no data object"),
        }),
    }
}

/// Fold the per-query data objects into the single object the typed-API
/// response expects.
fn merge_market_api_data<const N: usize>(parts: [Value; N], savings: Option<Value>) -> Value {
    let mut merged = Map::new();
    for part in parts.into_iter().chain(savings) {
        if let Value::Object(fields) = part {
            merged.extend(fields);
        }
    }
    Value::Object(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn markets() -> MarketsConfig {
        MarketsConfig {
            graphql_url: "http://127.0.0.1:9/graphql".into(),
            request_timeout_seconds: 1,
            chains: HashMap::from([(
                "1".to_string(),
                MarketConfig {
                    name: "AaveV3Ethereum".into(),
                    pool: "0x87870Bca3F3fD6335C3F4ce8392D69350B4fA4E2".into(),
                    subgraph_url: None,
                },
            )]),
        }
    }

    #[test]
    fn test_extract_data_returns_data_object() {
        let body = json!({ "data": { "userSupplies": [] } });
        let data = extract_data("userSupplies", body).unwrap();
        assert_eq!(data, json!({ "userSupplies": [] }));
    }

    #[test]
    fn test_extract_data_surfaces_first_graphql_error() {
        let body = json!({
            "data": null,
            "errors": [
                { "message": "Invalid EvmAddress" },
                { "message": "second" }
            ]
        });
        match extract_data("userBorrows", body) {
            Err(PortfolioError::GraphQl { message }) => {
                assert_eq!(message, "userBorrows: Invalid EvmAddress");
            }
            other => panic!("expected GraphQl error, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_data_ignores_empty_error_list() {
        let body = json!({ "data": { "user": null }, "errors": [] });
        assert!(extract_data("user", body).is_ok());
    }

    #[test]
    fn test_extract_data_requires_data_object() {
        for body in [json!({}), json!({ "data": null }), json!({ "data": [1, 2] })] {
            assert!(matches!(
                extract_data("user", body),
                Err(PortfolioError::MalformedResponse { .. })
            ));
        }
    }

    #[test]
    fn test_merged_market_api_data_is_detected() {
        let merged = merge_market_api_data(
            [
                json!({ "userSupplies": [] }),
                json!({ "userBorrows": null }),
                json!({ "userMarketState": null }),
            ],
            None,
        );
        assert_eq!(merged.as_object().unwrap().len(), 3);
        let response = RawPortfolioResponse::from_json(merged).unwrap();
        assert_eq!(response.shape(), "market_api");
    }

    #[test]
    fn test_merge_includes_savings_when_present() {
        let merged = merge_market_api_data(
            [json!({ "userSupplies": [] })],
            Some(json!({ "savingsGhoBalance": { "amount": { "value": "1" } } })),
        );
        assert!(merged.get("savingsGhoBalance").is_some());
    }

    #[test]
    fn test_market_lookup() {
        let client = AaveApiClient::new(&markets()).unwrap();
        assert_eq!(client.market(1).unwrap().name, "AaveV3Ethereum");
        assert!(matches!(
            client.market(137),
            Err(PortfolioError::UnsupportedChain { chain_id: 137 })
        ));
    }

    #[tokio::test]
    async fn test_unknown_chain_is_rejected_before_any_request() {
        let client = AaveApiClient::new(&markets()).unwrap();
        let result = client
            .fetch_portfolio(&AccountContext::new("0xabc", 11155111))
            .await;
        assert!(matches!(
            result,
            Err(PortfolioError::UnsupportedChain { chain_id: 11155111 })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_transient() {
        let client = AaveApiClient::new(&markets()).unwrap();
        let err = client
            .fetch_portfolio(&AccountContext::new("0xabc", 1))
            .await
            .unwrap_err();
        assert!(err.is_transient(), "unexpected error: {err}");
    }
}
