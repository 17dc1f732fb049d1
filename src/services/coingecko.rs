use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{CacheSettings, CoinGeckoSettings};
use crate::error::{ConfigError, PriceError};
use crate::models::token::{Token, TokenKey};
use crate::services::cache::Cache;
use crate::services::price_oracle::{PriceOracle, PriceQuote};
use crate::services::rate_limiter::RateLimiter;

/// Rate limiter resource name for the price API
pub const COINGECKO_RESOURCE: &str = "coingecko";

const COIN_LIST_KEY: &str = "coingecko:coin_list";

/// Price oracle backed by the CoinGecko API
#[derive(Clone)]
pub struct CoinGeckoService {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    cache: Cache,
    rate_limiter: RateLimiter,
    price_ttl: Duration,
    coin_list_ttl: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinListEntry {
    pub id: String,
    pub symbol: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct MarketChartResponse {
    prices: Vec<(i64, f64)>,
}

/// `/simple/price` body: coin id -> {"usd": 1.0, "usd_24h_change": -0.1}
type SimplePriceResponse = HashMap<String, HashMap<String, Option<f64>>>;

impl CoinGeckoService {
    pub fn new(
        settings: &CoinGeckoSettings,
        cache_settings: &CacheSettings,
        cache: Cache,
        rate_limiter: RateLimiter,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(15)).build()?,
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            cache,
            rate_limiter,
            price_ttl: cache_settings.price_ttl,
            coin_list_ttl: cache_settings.coin_list_ttl,
        })
    }

    /// All coins known to the API (symbol directory), cached for hours
    pub async fn coin_list(&self) -> Result<Vec<CoinListEntry>, PriceError> {
        self.cache
            .get_or_set(COIN_LIST_KEY, Some(self.coin_list_ttl), || async {
                info!("Fetching coin list from CoinGecko");
                let coins: Vec<CoinListEntry> = self.get_json("/coins/list", &[]).await?;
                info!("Fetched {} coins from CoinGecko", coins.len());
                Ok(coins)
            })
            .await
    }

    /// Resolve a symbol to a CoinGecko coin id
    pub async fn coin_id_for_symbol(&self, symbol: &str) -> Option<String> {
        let symbol = symbol.trim().to_lowercase();
        if let Some(id) = preferred_coin_id(&symbol) {
            return Some(id.to_string());
        }

        // Empty string records "no such coin"
        let cache_key = format!("coinId:{}", symbol);
        if let Some(id) = self.cache.get::<String>(&cache_key).await {
            return (!id.is_empty()).then_some(id);
        }

        let coins = match self.coin_list().await {
            Ok(coins) => coins,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Could not load coin list");
                return None;
            }
        };

        let id = coins
            .iter()
            .find(|coin| coin.symbol.eq_ignore_ascii_case(&symbol))
            .map(|coin| coin.id.clone());

        self.cache
            .set(&cache_key, &id.clone().unwrap_or_default(), Some(self.coin_list_ttl))
            .await;

        id
    }

    /// Historical prices as (timestamp_ms, price) pairs
    pub async fn market_chart(
        &self,
        coin_id: &str,
        currency: &str,
        days: u32,
    ) -> Result<Vec<(i64, f64)>, PriceError> {
        let cache_key = format!("marketChart:{}:{}:{}", coin_id, currency, days);

        self.cache
            .get_or_set(&cache_key, Some(self.price_ttl), || async {
                debug!("Fetching market chart for {} from CoinGecko", coin_id);
                let path = format!("/coins/{}/market_chart", coin_id);
                let data: MarketChartResponse = self
                    .get_json(&path, &[("vs_currency", currency.to_string()), ("days", days.to_string())])
                    .await?;
                Ok(data.prices)
            })
            .await
    }

    /// Quotes for a set of coin ids in one request
    async fn quotes_by_id(
        &self,
        ids: &BTreeSet<String>,
        currency: &str,
    ) -> Result<HashMap<String, PriceQuote>, PriceError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let joined = ids.iter().cloned().collect::<Vec<_>>().join(",");
        let cache_key = format!("quotes:{}:{}", joined, currency);

        self.cache
            .get_or_set(&cache_key, Some(self.price_ttl), || async {
                debug!("Fetching {} prices from CoinGecko", ids.len());
                let response: SimplePriceResponse = self
                    .get_json(
                        "/simple/price",
                        &[
                            ("ids", joined.clone()),
                            ("vs_currencies", currency.to_string()),
                            ("include_24hr_change", "true".to_string()),
                        ],
                    )
                    .await?;
                Ok(parse_quotes(response, currency))
            })
            .await
    }

    async fn resolve_token_id(&self, token: &Token) -> Option<String> {
        match &token.coingecko_id {
            Some(id) => Some(id.clone()),
            None => self.coin_id_for_symbol(&token.symbol).await,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, PriceError> {
        let url = format!("{}{}", self.base_url, path);

        self.rate_limiter
            .execute(COINGECKO_RESOURCE, || async {
                let mut request = self
                    .client
                    .get(&url)
                    .header("accept", "application/json")
                    .query(query);

                if let Some(key) = &self.api_key {
                    let header = if self.base_url.contains("pro-api") {
                        "x-cg-pro-api-key"
                    } else {
                        "x-cg-demo-api-key"
                    };
                    request = request.header(header, key);
                }

                let response = request.send().await?;

                if !response.status().is_success() {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    return Err(PriceError::Upstream { status, body });
                }

                Ok::<T, PriceError>(response.json::<T>().await?)
            })
            .await
    }
}

#[async_trait]
impl PriceOracle for CoinGeckoService {
    async fn price_of(&self, symbol: &str, currency: &str) -> Decimal {
        let currency = currency.to_lowercase();
        let Some(coin_id) = self.coin_id_for_symbol(symbol).await else {
            debug!("No CoinGecko id for symbol {}", symbol);
            return Decimal::ZERO;
        };

        let ids = BTreeSet::from([coin_id.clone()]);
        match self.quotes_by_id(&ids, &currency).await {
            Ok(quotes) => quotes.get(&coin_id).map(|q| q.price).unwrap_or_default(),
            Err(e) => {
                warn!(symbol, error = %e, "Price lookup failed");
                Decimal::ZERO
            }
        }
    }

    async fn price_of_token(&self, token: &Token, currency: &str) -> Decimal {
        if let Some(coin_id) = &token.coingecko_id {
            let ids = BTreeSet::from([coin_id.clone()]);
            match self.quotes_by_id(&ids, &currency.to_lowercase()).await {
                Ok(quotes) => {
                    if let Some(quote) = quotes.get(coin_id) {
                        return quote.price;
                    }
                }
                Err(e) => {
                    warn!(coin_id = %coin_id, error = %e, "Price lookup by id failed");
                }
            }
        }
        self.price_of(&token.symbol, currency).await
    }

    async fn prices_of_symbols(&self, symbols: &[String], currency: &str) -> HashMap<String, Decimal> {
        let currency = currency.to_lowercase();

        let mut resolved: Vec<(String, Option<String>)> = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            resolved.push((symbol.clone(), self.coin_id_for_symbol(symbol).await));
        }

        let ids: BTreeSet<String> = resolved.iter().filter_map(|(_, id)| id.clone()).collect();
        let quotes = self.quotes_by_id(&ids, &currency).await.unwrap_or_else(|e| {
            warn!(error = %e, "Batch price lookup failed");
            HashMap::new()
        });

        resolved
            .into_iter()
            .map(|(symbol, id)| {
                let price = id
                    .and_then(|id| quotes.get(&id).map(|q| q.price))
                    .unwrap_or_default();
                (symbol, price)
            })
            .collect()
    }

    async fn quotes_of(&self, tokens: &[Token], currency: &str) -> HashMap<TokenKey, PriceQuote> {
        let currency = currency.to_lowercase();

        let mut resolved: Vec<(TokenKey, Option<String>)> = Vec::with_capacity(tokens.len());
        for token in tokens {
            resolved.push((token.key(), self.resolve_token_id(token).await));
        }

        let ids: BTreeSet<String> = resolved.iter().filter_map(|(_, id)| id.clone()).collect();
        let quotes = self.quotes_by_id(&ids, &currency).await.unwrap_or_else(|e| {
            warn!(error = %e, "Batch quote lookup failed");
            HashMap::new()
        });

        resolved
            .into_iter()
            .map(|(key, id)| {
                let quote = id.and_then(|id| quotes.get(&id).copied()).unwrap_or_default();
                (key, quote)
            })
            .collect()
    }

    async fn price_change_percent(&self, symbol: &str, days: u32) -> Decimal {
        let Some(coin_id) = self.coin_id_for_symbol(symbol).await else {
            return Decimal::ZERO;
        };

        match self.market_chart(&coin_id, "usd", days).await {
            Ok(prices) => percent_change(&prices),
            Err(e) => {
                warn!(symbol, days, error = %e, "Price change lookup failed");
                Decimal::ZERO
            }
        }
    }
}

/// CoinGecko ids for symbols whose directory entry is ambiguous
fn preferred_coin_id(symbol: &str) -> Option<&'static str> {
    let id = match symbol {
        "eth" => "ethereum",
        "weth" => "weth",
        "btc" => "bitcoin",
        "wbtc" => "wrapped-bitcoin",
        "usdc" | "usdc.e" => "usd-coin",
        "usdt" => "tether",
        "dai" => "dai",
        "matic" => "matic-network",
        "pol" => "polygon-ecosystem-token",
        "bnb" => "binancecoin",
        "wbnb" => "wbnb",
        "avax" => "avalanche-2",
        "ftm" => "fantom",
        "link" => "chainlink",
        "uni" => "uniswap",
        "aave" => "aave",
        "steth" => "staked-ether",
        _ => return None,
    };
    Some(id)
}

fn parse_quotes(response: SimplePriceResponse, currency: &str) -> HashMap<String, PriceQuote> {
    let change_key = format!("{}_24h_change", currency);
    response
        .into_iter()
        .map(|(id, fields)| {
            let field = |name: &str| {
                fields
                    .get(name)
                    .copied()
                    .flatten()
                    .and_then(Decimal::from_f64)
                    .unwrap_or_default()
            };
            let quote = PriceQuote {
                price: field(currency),
                change_24h: field(&change_key),
            };
            (id, quote)
        })
        .collect()
}

/// Percent move from the first to the last point of a price series
fn percent_change(prices: &[(i64, f64)]) -> Decimal {
    let (Some(first), Some(last)) = (prices.first(), prices.last()) else {
        return Decimal::ZERO;
    };
    if prices.len() < 2 || first.1 == 0.0 {
        return Decimal::ZERO;
    }
    Decimal::from_f64((last.1 - first.1) * 100.0 / first.1).unwrap_or_default()
}
