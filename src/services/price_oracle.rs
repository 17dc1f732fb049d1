use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::token::{Token, TokenKey};

/// Price and 24h change for one token
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub price: Decimal,
    pub change_24h: Decimal,
}

/// Token price source.
///
/// Lookups never fail: anything that cannot be resolved comes back as zero,
/// which callers must read as "unknown".
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn price_of(&self, symbol: &str, currency: &str) -> Decimal;

    /// Price using the token's own coin id when it has one
    async fn price_of_token(&self, token: &Token, currency: &str) -> Decimal;

    async fn prices_of(&self, tokens: &[Token], currency: &str) -> HashMap<TokenKey, Decimal> {
        self.quotes_of(tokens, currency)
            .await
            .into_iter()
            .map(|(key, quote)| (key, quote.price))
            .collect()
    }

    async fn prices_of_symbols(&self, symbols: &[String], currency: &str) -> HashMap<String, Decimal>;

    /// Batch price plus 24h change, one entry per input token
    async fn quotes_of(&self, tokens: &[Token], currency: &str) -> HashMap<TokenKey, PriceQuote>;

    /// Percent change over the last `days` days
    async fn price_change_percent(&self, symbol: &str, days: u32) -> Decimal;
}
