use alloy::primitives::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which side of the lending book a position sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    /// Deposited collateral, earning the supply rate.
    Supply,
    /// Variable debt, accruing the borrow rate.
    Borrow,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supply => "supply",
            Self::Borrow => "borrow",
        }
    }
}

/// One side of one asset held by one account.
///
/// `balance` keeps full precision; display rounding happens in
/// [`crate::core::format`]. `underlying_asset` is lower-cased and unique per
/// side within a portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub symbol: String,
    pub name: String,
    pub underlying_asset: String,
    pub decimals: u32,
    #[serde(with = "u256_dec_str")]
    pub raw_balance: U256,
    #[serde(with = "rust_decimal::serde::str")]
    pub balance: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub price_usd: Decimal,
    /// `balance * price_usd`, rounded to cents.
    #[serde(with = "rust_decimal::serde::str")]
    pub balance_usd: Decimal,
    /// Annual percentage, e.g. `3.17` for 3.17%.
    #[serde(with = "rust_decimal::serde::str")]
    pub apy: Decimal,
    pub side: PositionSide,
}

/// Decimal-string encode/decode for raw `U256` amounts.
mod u256_dec_str {
    use alloy::primitives::U256;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        U256::from_str_radix(&s, 10).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_position_serializes_canonical_strings() {
        let position = Position {
            symbol: "USDC".into(),
            name: "USD Coin".into(),
            underlying_asset: "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48".into(),
            decimals: 6,
            raw_balance: U256::from(1_500_250_000u64),
            balance: dec!(1500.25),
            price_usd: dec!(1.0001),
            balance_usd: dec!(1500.40),
            apy: dec!(4.12),
            side: PositionSide::Supply,
        };

        let json = serde_json::to_value(&position).unwrap();
        assert_eq!(json["rawBalance"], "1500250000");
        assert_eq!(json["balance"], "1500.25");
        assert_eq!(json["balanceUsd"], "1500.40");
        assert_eq!(json["side"], "supply");

        let back: Position = serde_json::from_value(json).unwrap();
        assert_eq!(back, position);
    }
}
