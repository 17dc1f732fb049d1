//! EVM chain provider
//!
//! Balances and token metadata come from JSON-RPC contract calls; the set of
//! tokens a wallet holds is discovered from the block explorer's token
//! transfer history. RPC and explorer calls are throttled as two separate
//! rate-limiter resources per chain.

use alloy::{
    primitives::{Address, U256, utils::format_units},
    providers::{Provider, ProviderBuilder, RootProvider},
    sol,
    transports::http::{Client, Http},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{ChainSettings, RateLimitSettings};
use crate::error::{ChainError, ConfigError};
use crate::models::chain::Chain;
use crate::models::token::{Token, TokenBalance, TokenKey};
use crate::models::yield_position::YieldPosition;
use crate::services::chain_provider::{ChainProvider, is_valid_evm_address};
use crate::services::price_oracle::{PriceOracle, PriceQuote};
use crate::services::protocols::{is_receipt_token, tracked_pools};
use crate::services::rate_limiter::RateLimiter;

/// Upper bound on distinct contracts inspected per wallet (most recent first)
const MAX_DISCOVERED_TOKENS: usize = 50;

const MAX_TRACKED_POSITIONS: u64 = 100_000;
const POSITION_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 24 * 3600);

const GWEI_DECIMALS: u8 = 9;

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function balanceOf(address owner) external view returns (uint256);
    }
}

/// Etherscan-style explorer envelope
#[derive(Debug, Deserialize)]
struct ExplorerResponse {
    status: String,
    message: String,
    result: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenTransfer {
    contract_address: String,
    #[serde(default)]
    token_name: String,
    #[serde(default)]
    token_symbol: String,
    #[serde(default)]
    token_decimal: String,
}

pub struct EvmChainProvider {
    chain: Chain,
    provider: RootProvider<Http<Client>>,
    http: reqwest::Client,
    explorer_api_url: String,
    explorer_api_key: Option<String>,
    oracle: Arc<dyn PriceOracle>,
    rate_limiter: RateLimiter,
    rpc_resource: String,
    explorer_resource: String,
    /// (wallet, pool) -> (position id, first time the position was seen)
    first_seen: moka::sync::Cache<String, (String, DateTime<Utc>)>,
}

impl EvmChainProvider {
    pub fn new(
        settings: &ChainSettings,
        limits: &RateLimitSettings,
        oracle: Arc<dyn PriceOracle>,
        rate_limiter: RateLimiter,
    ) -> Result<Self, ConfigError> {
        let chain = settings.chain.descriptor();

        let provider = ProviderBuilder::new().on_http(settings.rpc_url.parse().map_err(|_| {
            ConfigError::InvalidValue {
                key: format!("{}_RPC_URL", chain.id.slug().to_uppercase()),
                value: settings.rpc_url.clone(),
            }
        })?);

        let rpc_resource = format!("{}-rpc", chain.id.slug());
        let explorer_resource = format!("{}-explorer", chain.id.slug());
        rate_limiter.configure(&rpc_resource, limits.rpc_per_sec);
        rate_limiter.configure(&explorer_resource, limits.explorer_per_sec);

        info!(chain = %chain.id, "Initialized {} provider", chain.name);

        Ok(Self {
            chain,
            provider,
            http: reqwest::Client::builder().timeout(Duration::from_secs(15)).build()?,
            explorer_api_url: settings.explorer_api_url.clone(),
            explorer_api_key: settings.explorer_api_key.clone(),
            oracle,
            rate_limiter,
            rpc_resource,
            explorer_resource,
            first_seen: moka::sync::Cache::builder()
                .max_capacity(MAX_TRACKED_POSITIONS)
                .time_to_idle(POSITION_IDLE_TIMEOUT)
                .build(),
        })
    }

    fn parse_address(&self, address: &str) -> Result<Address, ChainError> {
        self.ensure_valid_address(address)?;
        Address::from_str(address).map_err(|_| ChainError::invalid_address(self.chain.id, address))
    }

    async fn balance_of(
        &self,
        wallet: &str,
        owner: Address,
        contract: Address,
        operation: &'static str,
    ) -> Result<U256, ChainError> {
        let erc20 = IERC20::new(contract, &self.provider);
        self.rate_limiter
            .execute(&self.rpc_resource, || async { erc20.balanceOf(owner).call().await })
            .await
            .map(|r| r._0)
            .map_err(|e| {
                ChainError::provider(self.chain.id, wallet, operation, e).with_contract(&format!("{:?}", contract))
            })
    }

    async fn decimals_of(&self, wallet: &str, contract: Address, operation: &'static str) -> Result<u8, ChainError> {
        let erc20 = IERC20::new(contract, &self.provider);
        self.rate_limiter
            .execute(&self.rpc_resource, || async { erc20.decimals().call().await })
            .await
            .map(|r| r._0)
            .map_err(|e| {
                ChainError::provider(self.chain.id, wallet, operation, e).with_contract(&format!("{:?}", contract))
            })
    }

    /// ERC20 name/symbol/decimals, unpriced
    async fn read_token_metadata(&self, contract_address: &str) -> Result<Token, ChainError> {
        let contract = self.parse_address(contract_address)?;
        let erc20 = IERC20::new(contract, &self.provider);
        let context = |e: alloy::contract::Error| {
            ChainError::provider(self.chain.id, "-", "token_info", e).with_contract(contract_address)
        };

        let symbol = self
            .rate_limiter
            .execute(&self.rpc_resource, || async { erc20.symbol().call().await })
            .await
            .map(|r| r._0)
            .map_err(context)?;

        let decimals = self.decimals_of("-", contract, "token_info").await?;

        let name = self
            .rate_limiter
            .execute(&self.rpc_resource, || async { erc20.name().call().await })
            .await
            .map(|r| r._0)
            .unwrap_or_else(|e| {
                debug!(contract = contract_address, error = %e, "Token has no readable name");
                symbol.clone()
            });

        Ok(Token::new(&symbol, &name, self.chain.id, Some(contract_address.to_string()), decimals))
    }

    async fn token_transfers(&self, address: &str) -> Result<Vec<TokenTransfer>, ChainError> {
        let mut query = vec![
            ("module", "account".to_string()),
            ("action", "tokentx".to_string()),
            ("address", address.to_string()),
            ("startblock", "0".to_string()),
            ("endblock", "99999999".to_string()),
            ("sort", "desc".to_string()),
        ];
        if let Some(key) = &self.explorer_api_key {
            query.push(("apikey", key.clone()));
        }

        let response = self
            .rate_limiter
            .execute(&self.explorer_resource, || async {
                let response = self.http.get(&self.explorer_api_url).query(&query).send().await?;
                response.error_for_status()?.json::<ExplorerResponse>().await
            })
            .await
            .map_err(|e| ChainError::provider(self.chain.id, address, "all_token_balances", e.without_url()))?;

        parse_token_transfers(response)
            .map_err(|message| ChainError::provider(self.chain.id, address, "all_token_balances", message))
    }

    /// Balance of one discovered contract; `None` when the wallet holds none
    async fn discovered_balance(
        &self,
        address: &str,
        owner: Address,
        transfer: &TokenTransfer,
    ) -> Result<Option<TokenBalance>, ChainError> {
        let token = match token_from_transfer(&self.chain, transfer) {
            Some(token) => token,
            None => self.read_token_metadata(&transfer.contract_address).await?,
        };

        let contract = self.parse_address(&transfer.contract_address)?;
        let raw = self.balance_of(address, owner, contract, "all_token_balances").await?;
        if raw.is_zero() {
            return Ok(None);
        }

        let balance = units_to_decimal(raw, token.decimals).map_err(|e| {
            ChainError::provider(self.chain.id, address, "all_token_balances", e)
                .with_contract(&transfer.contract_address)
        })?;

        Ok(Some(TokenBalance::new(token, address, balance)))
    }

    /// Stable id and entry time for a position, fixed the first time it is
    /// seen and forgotten once the position goes unread for a month
    fn position_identity(&self, wallet: &str, pool_address: &str) -> (String, DateTime<Utc>) {
        let key = format!("{}:{}", wallet.to_lowercase(), pool_address.to_lowercase());
        self.first_seen
            .get_with(key, || (Uuid::new_v4().to_string(), Utc::now()))
    }

    async fn price_balances<'a>(&self, balances: impl IntoIterator<Item = &'a mut TokenBalance>) {
        let mut balances: Vec<&mut TokenBalance> = balances.into_iter().collect();
        if balances.is_empty() {
            return;
        }

        let tokens: Vec<Token> = balances.iter().map(|b| b.token.clone()).collect();
        let quotes = self.oracle.quotes_of(&tokens, "usd").await;
        apply_quotes(balances.iter_mut().map(|b| &mut **b), &quotes);
    }
}

#[async_trait]
impl ChainProvider for EvmChainProvider {
    fn chain(&self) -> &Chain {
        &self.chain
    }

    fn is_valid_address(&self, address: &str) -> bool {
        is_valid_evm_address(address)
    }

    async fn native_balance(&self, address: &str) -> Result<Decimal, ChainError> {
        let owner = self.parse_address(address)?;

        let raw = self
            .rate_limiter
            .execute(&self.rpc_resource, || async { self.provider.get_balance(owner).await })
            .await
            .map_err(|e| ChainError::provider(self.chain.id, address, "native_balance", e))?;

        units_to_decimal(raw, self.chain.native_decimals)
            .map_err(|e| ChainError::provider(self.chain.id, address, "native_balance", e))
    }

    async fn token_balance(&self, address: &str, contract_address: &str) -> Result<Decimal, ChainError> {
        let owner = self.parse_address(address)?;
        let contract = self.parse_address(contract_address)?;

        let raw = self.balance_of(address, owner, contract, "token_balance").await?;
        let decimals = self.decimals_of(address, contract, "token_balance").await?;

        units_to_decimal(raw, decimals).map_err(|e| {
            ChainError::provider(self.chain.id, address, "token_balance", e).with_contract(contract_address)
        })
    }

    async fn all_token_balances(&self, address: &str) -> Result<Vec<TokenBalance>, ChainError> {
        let owner = self.parse_address(address)?;
        let mut balances = Vec::new();

        let native = self.native_balance(address).await?;
        if !native.is_zero() {
            balances.push(TokenBalance::new(self.chain.native_token(), address, native));
        }

        // Receipt tokens of tracked pools are reported by `yield_positions`
        let transfers = self
            .token_transfers(address)
            .await?
            .into_iter()
            .filter(|t| !is_receipt_token(self.chain.id, &t.contract_address))
            .collect();
        let discovered = distinct_contracts(transfers);
        debug!(
            chain = %self.chain.id,
            wallet = %address,
            contracts = discovered.len(),
            "Discovered token contracts"
        );

        let lookups = discovered.iter().map(|transfer| async move {
            (transfer, self.discovered_balance(address, owner, transfer).await)
        });

        for (transfer, result) in join_all(lookups).await {
            match result {
                Ok(Some(balance)) => balances.push(balance),
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        chain = %self.chain.id,
                        contract = %transfer.contract_address,
                        error = %e,
                        "Skipping token"
                    );
                }
            }
        }

        self.price_balances(balances.iter_mut()).await;
        Ok(balances)
    }

    async fn token_info(&self, contract_address: &str) -> Result<Token, ChainError> {
        let token = self.read_token_metadata(contract_address).await?;
        let quote = self
            .oracle
            .quotes_of(std::slice::from_ref(&token), "usd")
            .await
            .remove(&token.key())
            .unwrap_or_default();

        Ok(Token {
            price_usd: quote.price,
            price_change_24h: quote.change_24h,
            ..token
        })
    }

    async fn yield_positions(&self, address: &str) -> Result<Vec<YieldPosition>, ChainError> {
        let owner = self.parse_address(address)?;
        let mut positions = Vec::new();

        for pool in tracked_pools(self.chain.id) {
            let receipt = self.parse_address(&pool.receipt_token)?;
            let raw = self.balance_of(address, owner, receipt, "yield_positions").await?;
            if raw.is_zero() {
                continue;
            }

            // Receipt tokens share the underlying asset's decimals
            let balance = units_to_decimal(raw, pool.underlying.decimals).map_err(|e| {
                ChainError::provider(self.chain.id, address, "yield_positions", e).with_contract(&pool.receipt_token)
            })?;

            let (id, entry_time) = self.position_identity(address, &pool.receipt_token);
            positions.push(YieldPosition {
                id,
                wallet_address: address.to_string(),
                apy: pool.protocol.category.default_apy(),
                protocol: pool.protocol,
                pool_name: pool.pool_name,
                pool_address: pool.receipt_token,
                deposited_tokens: vec![TokenBalance::new(pool.underlying, address, balance)],
                entry_time,
                last_updated: Utc::now(),
            });
        }

        self.price_balances(positions.iter_mut().flat_map(|p| p.deposited_tokens.iter_mut()))
            .await;

        info!(
            chain = %self.chain.id,
            wallet = %address,
            positions = positions.len(),
            "Found yield positions"
        );
        Ok(positions)
    }

    async fn gas_price(&self) -> Result<Decimal, ChainError> {
        let wei = self
            .rate_limiter
            .execute(&self.rpc_resource, || async { self.provider.get_gas_price().await })
            .await
            .map_err(|e| ChainError::provider(self.chain.id, "-", "gas_price", e))?;

        units_to_decimal(U256::from(wei), GWEI_DECIMALS)
            .map_err(|e| ChainError::provider(self.chain.id, "-", "gas_price", e))
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        self.rate_limiter
            .execute(&self.rpc_resource, || async { self.provider.get_block_number().await })
            .await
            .map_err(|e| ChainError::provider(self.chain.id, "-", "block_number", e))
    }
}

/// Scale a raw integer amount by `decimals`
fn units_to_decimal(raw: U256, decimals: u8) -> Result<Decimal, String> {
    let formatted = format_units(raw, decimals).map_err(|e| e.to_string())?;
    Decimal::from_str(&formatted)
        .map(|d| d.normalize())
        .map_err(|e| format!("amount {} out of range: {}", formatted, e))
}

fn parse_token_transfers(response: ExplorerResponse) -> Result<Vec<TokenTransfer>, String> {
    if response.status == "1" {
        return serde_json::from_value(response.result).map_err(|e| format!("Malformed explorer result: {}", e));
    }

    let empty_result = response.result.as_array().is_some_and(|a| a.is_empty());
    if empty_result || response.message.starts_with("No transactions found") {
        return Ok(Vec::new());
    }

    let detail = response
        .result
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| response.result.to_string());
    Err(format!("Explorer error: {} ({})", response.message, detail))
}

/// One entry per contract, keeping the first (most recent) transfer
fn distinct_contracts(transfers: Vec<TokenTransfer>) -> Vec<TokenTransfer> {
    let mut seen = HashSet::new();
    transfers
        .into_iter()
        .filter(|t| seen.insert(t.contract_address.to_lowercase()))
        .take(MAX_DISCOVERED_TOKENS)
        .collect()
}

/// Explorer metadata, when it is complete enough to skip the RPC lookup
fn token_from_transfer(chain: &Chain, transfer: &TokenTransfer) -> Option<Token> {
    let symbol = transfer.token_symbol.trim();
    let decimals: u8 = transfer.token_decimal.trim().parse().ok()?;
    if symbol.is_empty() {
        return None;
    }

    let name = match transfer.token_name.trim() {
        "" => symbol,
        name => name,
    };
    Some(Token::new(symbol, name, chain.id, Some(transfer.contract_address.clone()), decimals))
}

fn apply_quotes<'a>(balances: impl Iterator<Item = &'a mut TokenBalance>, quotes: &HashMap<TokenKey, PriceQuote>) {
    for balance in balances {
        if let Some(quote) = quotes.get(&balance.token.key()) {
            balance.token.price_usd = quote.price;
            balance.token.price_change_24h = quote.change_24h;
        }
    }
}
