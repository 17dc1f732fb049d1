use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::chain::{Chain, ChainId};

/// Merge identity of a token: (symbol, chain)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenKey {
    pub chain: ChainId,
    pub symbol: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub symbol: String,
    pub name: String,
    /// None for the chain's native currency
    pub contract_address: Option<String>,
    pub chain: ChainId,
    pub decimals: u8,
    /// Zero means "price unknown"
    pub price_usd: Decimal,
    pub price_change_24h: Decimal,
    /// Price API coin identifier (e.g., "usd-coin")
    #[serde(default)]
    pub coingecko_id: Option<String>,
}

impl Token {
    pub fn new(symbol: &str, name: &str, chain: ChainId, contract_address: Option<String>, decimals: u8) -> Self {
        Self {
            symbol: symbol.to_string(),
            name: name.to_string(),
            contract_address,
            chain,
            decimals,
            price_usd: Decimal::ZERO,
            price_change_24h: Decimal::ZERO,
            coingecko_id: None,
        }
    }

    pub fn native(chain: &Chain) -> Self {
        Self::new(&chain.native_symbol, &chain.native_name, chain.id, None, chain.native_decimals)
    }

    pub fn with_coingecko_id(mut self, id: &str) -> Self {
        self.coingecko_id = Some(id.to_string());
        self
    }

    pub fn with_price(mut self, price_usd: Decimal) -> Self {
        self.price_usd = price_usd;
        self
    }

    pub fn is_native(&self) -> bool {
        self.contract_address.is_none()
    }

    pub fn key(&self) -> TokenKey {
        TokenKey {
            chain: self.chain,
            symbol: self.symbol.to_uppercase(),
        }
    }
}

/// Holding of one token by one wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub token: Token,
    pub wallet_address: String,
    /// Quantity in token units (already scaled by decimals)
    pub balance: Decimal,
    pub last_updated: DateTime<Utc>,
}

impl TokenBalance {
    pub fn new(token: Token, wallet_address: &str, balance: Decimal) -> Self {
        Self {
            token,
            wallet_address: wallet_address.to_string(),
            balance,
            last_updated: Utc::now(),
        }
    }

    pub fn value_usd(&self) -> Decimal {
        self.balance * self.token.price_usd
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
